//! The coins model: unspent outputs of one transaction, the read view over a
//! UTXO store, and a mutable scratch layer for dependency-ordered validation.

use crate::{
    Anchor, IncrementalMerkleTree, Nullifier, ShieldedProtocol, Transaction, TxId, TxOut,
};

use std::collections::HashMap;

/// The unspent transparent outputs of a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coins {
    /// `None` marks a spent output.
    pub outputs: Vec<Option<TxOut>>,
    pub height: u32,
    pub is_coinbase: bool,
}

impl Coins {
    pub fn from_tx(tx: &Transaction, height: u32) -> Self {
        Self {
            outputs: tx.outputs.iter().cloned().map(Some).collect(),
            height,
            is_coinbase: tx.is_coinbase(),
        }
    }

    pub fn is_available(&self, n: u32) -> bool {
        self.outputs
            .get(n as usize)
            .map(Option::is_some)
            .unwrap_or(false)
    }

    pub fn spend(&mut self, n: u32) {
        if let Some(slot) = self.outputs.get_mut(n as usize) {
            *slot = None;
        }
    }

    /// All outputs spent; such an entry carries no information.
    pub fn is_pruned(&self) -> bool {
        self.outputs.iter().all(Option::is_none)
    }
}

/// Read access to a UTXO store and the shielded state alongside it.
pub trait CoinsView {
    fn get_coins(&self, txid: &TxId) -> Option<Coins>;

    fn have_coins(&self, txid: &TxId) -> bool {
        self.get_coins(txid).is_some()
    }

    /// Whether the nullifier has been published on-chain under the protocol.
    fn get_nullifier(&self, nullifier: &Nullifier, protocol: ShieldedProtocol) -> bool;

    /// The Sprout commitment tree whose root is `root`, if that root is a
    /// known anchor.
    fn sprout_anchor_at(&self, root: &Anchor) -> Option<IncrementalMerkleTree>;

    fn sapling_anchor_exists(&self, root: &Anchor) -> bool;

    /// Height of the chain tip this view reflects.
    fn best_height(&self) -> u32;
}

/// A write-through scratch layer over a base view.
///
/// Lets the integrity checker replay the pool's transactions in dependency
/// order without touching the base store.
pub struct CoinsCache<'a> {
    base: &'a dyn CoinsView,
    coins: HashMap<TxId, Coins>,
}

impl<'a> CoinsCache<'a> {
    pub fn new(base: &'a dyn CoinsView) -> Self {
        Self {
            base,
            coins: HashMap::new(),
        }
    }

    pub fn get_coins(&self, txid: &TxId) -> Option<Coins> {
        self.coins
            .get(txid)
            .cloned()
            .or_else(|| self.base.get_coins(txid))
    }

    /// All transparent inputs of `tx` resolve to available outputs.
    pub fn have_inputs(&self, tx: &Transaction) -> bool {
        tx.inputs.iter().all(|input| {
            self.get_coins(&input.prevout.txid)
                .map(|coins| coins.is_available(input.prevout.n))
                .unwrap_or(false)
        })
    }

    /// Apply `tx`: spend its inputs and add its outputs at `height`.
    pub fn update_coins(&mut self, tx: &Transaction, height: u32) {
        for input in &tx.inputs {
            let mut coins = self
                .get_coins(&input.prevout.txid)
                .expect("spent output must exist in the scratch view");
            coins.spend(input.prevout.n);
            self.coins.insert(input.prevout.txid, coins);
        }
        self.coins.insert(tx.txid(), Coins::from_tx(tx, height));
    }

    pub fn best_height(&self) -> u32 {
        self.base.best_height()
    }
}
