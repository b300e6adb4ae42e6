//! Value types shared between the Obscura node's components.
//!
//! This crate deliberately stays free of chain-state access: it defines the
//! transaction model (transparent inputs/outputs plus the Sprout, Sapling and
//! Orchard shielded bundles), the coins model used by UTXO views, and the thin
//! consensus predicates that higher layers treat as given.

mod amount;
pub mod coins;
pub mod consensus;
mod merkle;
mod transaction;

pub use self::amount::{Amount, COIN};
pub use self::coins::{Coins, CoinsCache, CoinsView};
pub use self::merkle::IncrementalMerkleTree;
pub use self::transaction::{
    JoinSplit, OrchardBundle, OutPoint, SaplingSpend, Script, ScriptType, Transaction, TxIn, TxOut,
};

use std::fmt;

/// Fake block height stamped on coins synthesised from unconfirmed
/// transactions.
pub const MEMPOOL_HEIGHT: u32 = 0x7FFF_FFFF;

/// Minimum block distance between a coinbase and any transaction spending it.
pub const COINBASE_MATURITY: u32 = 100;

/// Version of the running client, recorded in data files it writes.
pub const CLIENT_VERSION: i32 = 2_000_050;

/// Network the node is running on.
///
/// The pool only distinguishes regtest (test-only notification plumbing is
/// asserted to that network), but the full set keeps call-sites honest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Main,
    Test,
    Regtest,
}

/// The shielded value protocols. Each maintains an independent nullifier
/// domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShieldedProtocol {
    Sprout,
    Sapling,
    Orchard,
}

macro_rules! digest_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Byte-reversed hex, matching the conventional display order
                // for transaction hashes.
                let mut bytes = self.0;
                bytes.reverse();
                f.write_str(&hex::encode(bytes))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }
    };
}

digest_newtype! {
    /// Transaction id: double SHA-256 of the canonical transaction encoding.
    TxId
}

digest_newtype! {
    /// Per-shielded-spend tag that marks a note as spent.
    Nullifier
}

digest_newtype! {
    /// Merkle root committing to the note-commitment set at some height.
    Anchor
}

/// 20-byte address hash embedded in a standard script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AddressHash(pub [u8; 20]);
