//! The Obscura transaction model.
//!
//! A transaction carries transparent inputs and outputs plus zero or more
//! shielded bundles: Sprout joinsplits, Sapling spend descriptions, and an
//! optional Orchard bundle. The canonical encoding defined here feeds both the
//! transaction id (double SHA-256) and the serialized size used for fee rates.

use crate::{Amount, Anchor, Nullifier, TxId};

use sha2::{Digest, Sha256};
use std::mem;

/// Per-input offset excluded by the fee-neutral priority size: the fixed input
/// overhead plus up to 110 bytes of signature data.
const MODIFIED_SIZE_INPUT_OFFSET: usize = 41;
const MODIFIED_SIZE_SCRIPT_CAP: usize = 110;

/// A reference to a specific output of a specific transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutPoint {
    pub txid: TxId,
    pub n: u32,
}

impl OutPoint {
    pub const fn new(txid: TxId, n: u32) -> Self {
        Self { txid, n }
    }

    /// The null reference used by coinbase inputs.
    pub fn null() -> Self {
        Self {
            txid: TxId::default(),
            n: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        *self == Self::null()
    }
}

/// Script classification used by the insight indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScriptType {
    PayToPubkeyHash,
    PayToScriptHash,
    Unknown,
}

/// A raw output script.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Script(Vec<u8>);

impl Script {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// A minimal pay-to-pubkey-hash script for the given address hash.
    pub fn pay_to_pubkey_hash(hash: crate::AddressHash) -> Self {
        let mut bytes = Vec::with_capacity(25);
        bytes.extend_from_slice(&[0x76, 0xa9, 0x14]);
        bytes.extend_from_slice(&hash.0);
        bytes.extend_from_slice(&[0x88, 0xac]);
        Self(bytes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn script_type(&self) -> ScriptType {
        let b = &self.0;
        // OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG
        if b.len() == 25
            && b[0] == 0x76
            && b[1] == 0xa9
            && b[2] == 0x14
            && b[23] == 0x88
            && b[24] == 0xac
        {
            ScriptType::PayToPubkeyHash
        } else if b.len() == 23 && b[0] == 0xa9 && b[1] == 0x14 && b[22] == 0x87 {
            ScriptType::PayToScriptHash
        } else {
            ScriptType::Unknown
        }
    }

    /// The 20-byte hash a standard script pays to, if it is standard.
    pub fn address_hash(&self) -> Option<crate::AddressHash> {
        let payload = match self.script_type() {
            ScriptType::PayToPubkeyHash => &self.0[3..23],
            ScriptType::PayToScriptHash => &self.0[2..22],
            ScriptType::Unknown => return None,
        };
        let mut hash = [0u8; 20];
        hash.copy_from_slice(payload);
        Some(crate::AddressHash(hash))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: Amount,
    pub script_pubkey: Script,
}

/// A Sprout joinsplit description: spends notes under `anchor`, publishing
/// their nullifiers, and commits to new notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSplit {
    pub anchor: Anchor,
    pub nullifiers: Vec<Nullifier>,
    pub commitments: Vec<[u8; 32]>,
}

/// A Sapling spend description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaplingSpend {
    pub anchor: Anchor,
    pub nullifier: Nullifier,
}

/// An Orchard bundle; nullifiers share one domain per transaction bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchardBundle {
    pub anchor: Anchor,
    pub nullifiers: Vec<Nullifier>,
}

/// A value-transfer record.
///
/// Callers that need the id repeatedly should hold on to `txid()`; it hashes
/// the canonical encoding on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
    pub expiry_height: u32,
    pub joinsplits: Vec<JoinSplit>,
    pub sapling_spends: Vec<SaplingSpend>,
    pub orchard: Option<OrchardBundle>,
}

impl Default for Transaction {
    fn default() -> Self {
        Self {
            version: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
            expiry_height: 0,
            joinsplits: Vec::new(),
            sapling_spends: Vec::new(),
            orchard: None,
        }
    }
}

fn write_compact_size(out: &mut Vec<u8>, n: usize) {
    let n = n as u64;
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

impl Transaction {
    /// The transaction id: double SHA-256 over the canonical encoding.
    pub fn txid(&self) -> TxId {
        let first = Sha256::digest(self.encode());
        TxId(Sha256::digest(first).into())
    }

    /// Canonical byte encoding. Vector lengths use the compact-size prefix.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(&self.version.to_le_bytes());

        write_compact_size(&mut out, self.inputs.len());
        for input in &self.inputs {
            out.extend_from_slice(input.prevout.txid.as_bytes());
            out.extend_from_slice(&input.prevout.n.to_le_bytes());
            write_compact_size(&mut out, input.script_sig.len());
            out.extend_from_slice(input.script_sig.as_bytes());
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }

        write_compact_size(&mut out, self.outputs.len());
        for output in &self.outputs {
            out.extend_from_slice(&output.value.zat().to_le_bytes());
            write_compact_size(&mut out, output.script_pubkey.len());
            out.extend_from_slice(output.script_pubkey.as_bytes());
        }

        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out.extend_from_slice(&self.expiry_height.to_le_bytes());

        write_compact_size(&mut out, self.joinsplits.len());
        for js in &self.joinsplits {
            out.extend_from_slice(js.anchor.as_bytes());
            write_compact_size(&mut out, js.nullifiers.len());
            for nf in &js.nullifiers {
                out.extend_from_slice(nf.as_bytes());
            }
            write_compact_size(&mut out, js.commitments.len());
            for cm in &js.commitments {
                out.extend_from_slice(cm);
            }
        }

        write_compact_size(&mut out, self.sapling_spends.len());
        for spend in &self.sapling_spends {
            out.extend_from_slice(spend.anchor.as_bytes());
            out.extend_from_slice(spend.nullifier.as_bytes());
        }

        match &self.orchard {
            None => out.push(0),
            Some(bundle) => {
                out.push(1);
                out.extend_from_slice(bundle.anchor.as_bytes());
                write_compact_size(&mut out, bundle.nullifiers.len());
                for nf in &bundle.nullifiers {
                    out.extend_from_slice(nf.as_bytes());
                }
            }
        }

        out
    }

    pub fn serialized_size(&self) -> usize {
        self.encode().len()
    }

    /// Size after the fee-neutral priority adjustment, which excludes the
    /// per-input signature overhead so that larger signatures do not cost
    /// priority.
    pub fn modified_size(&self, tx_size: usize) -> usize {
        let mut size = tx_size;
        for input in &self.inputs {
            let offset = MODIFIED_SIZE_INPUT_OFFSET + input.script_sig.len().min(MODIFIED_SIZE_SCRIPT_CAP);
            if size > offset {
                size -= offset;
            }
        }
        size
    }

    /// Sum of transparent output values.
    pub fn value_out(&self) -> Amount {
        self.outputs.iter().map(|out| out.value).sum()
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// Nullifiers published by the Orchard bundle, empty when there is none.
    pub fn orchard_nullifiers(&self) -> &[Nullifier] {
        self.orchard
            .as_ref()
            .map(|bundle| bundle.nullifiers.as_slice())
            .unwrap_or(&[])
    }

    /// Approximate deep heap footprint of the owned buffers.
    pub fn dynamic_usage(&self) -> usize {
        let mut usage = self.inputs.capacity() * mem::size_of::<TxIn>();
        for input in &self.inputs {
            usage += input.script_sig.len();
        }
        usage += self.outputs.capacity() * mem::size_of::<TxOut>();
        for output in &self.outputs {
            usage += output.script_pubkey.len();
        }
        usage += self.joinsplits.capacity() * mem::size_of::<JoinSplit>();
        for js in &self.joinsplits {
            usage += js.nullifiers.capacity() * mem::size_of::<Nullifier>();
            usage += js.commitments.capacity() * mem::size_of::<[u8; 32]>();
        }
        usage += self.sapling_spends.capacity() * mem::size_of::<SaplingSpend>();
        if let Some(bundle) = &self.orchard {
            usage += bundle.nullifiers.capacity() * mem::size_of::<Nullifier>();
        }
        usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_in_one_out() -> Transaction {
        Transaction {
            inputs: vec![
                TxIn {
                    prevout: OutPoint::new(TxId([1; 32]), 0),
                    script_sig: Script::new(vec![0xab; 72]),
                    sequence: u32::MAX,
                },
                TxIn {
                    prevout: OutPoint::new(TxId([2; 32]), 1),
                    script_sig: Script::new(vec![0xcd; 200]),
                    sequence: u32::MAX,
                },
            ],
            outputs: vec![TxOut {
                value: Amount::from_zat(50_000),
                script_pubkey: Script::pay_to_pubkey_hash(crate::AddressHash([7; 20])),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn txid_is_stable_and_content_addressed() {
        let tx = two_in_one_out();
        assert_eq!(tx.txid(), tx.clone().txid());

        let mut other = two_in_one_out();
        other.lock_time = 99;
        assert_ne!(tx.txid(), other.txid());
    }

    #[test]
    fn modified_size_excludes_signature_overhead() {
        let tx = two_in_one_out();
        let size = tx.serialized_size();
        // First input: 41 + 72; second input capped at 41 + 110.
        assert_eq!(tx.modified_size(size), size - (41 + 72) - (41 + 110));
    }

    #[test]
    fn script_classification() {
        let p2pkh = Script::pay_to_pubkey_hash(crate::AddressHash([9; 20]));
        assert_eq!(p2pkh.script_type(), ScriptType::PayToPubkeyHash);
        assert_eq!(p2pkh.address_hash(), Some(crate::AddressHash([9; 20])));

        let mut p2sh_bytes = vec![0xa9, 0x14];
        p2sh_bytes.extend_from_slice(&[3; 20]);
        p2sh_bytes.push(0x87);
        let p2sh = Script::new(p2sh_bytes);
        assert_eq!(p2sh.script_type(), ScriptType::PayToScriptHash);
        assert_eq!(p2sh.address_hash(), Some(crate::AddressHash([3; 20])));

        assert_eq!(Script::new(vec![0x6a]).script_type(), ScriptType::Unknown);
        assert_eq!(Script::new(vec![0x6a]).address_hash(), None);
    }

    #[test]
    fn orchard_nullifiers_empty_without_bundle() {
        let tx = two_in_one_out();
        assert!(tx.orchard_nullifiers().is_empty());
    }
}
