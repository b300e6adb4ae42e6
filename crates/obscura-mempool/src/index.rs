//! Insight indexes: per-address deltas and spent-output lookups for pool
//! members.
//!
//! Both indexes keep a reverse map from txid to the keys it inserted, so a
//! removal tears down exactly its own entries in O(k).

use obscura_primitives::{AddressHash, Amount, OutPoint, ScriptType, TxId};

use std::collections::{BTreeMap, HashMap};

/// Key into the address-delta index. Field order matters: the per-address
/// range scan relies on `(script_type, address)` being the leading fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AddressDeltaKey {
    pub script_type: ScriptType,
    pub address: AddressHash,
    pub txid: TxId,
    /// Input or output index, depending on `spending`.
    pub index: u32,
    pub spending: bool,
}

/// Value change an entry causes for one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressDelta {
    /// Admission time of the causing entry.
    pub time: i64,
    /// Negative for spends.
    pub amount: Amount,
    /// The output consumed, for spending deltas.
    pub prevout: Option<OutPoint>,
}

#[derive(Default)]
pub struct AddressIndex {
    deltas: BTreeMap<AddressDeltaKey, AddressDelta>,
    inserted: HashMap<TxId, Vec<AddressDeltaKey>>,
}

impl AddressIndex {
    pub fn insert(&mut self, txid: TxId, entries: Vec<(AddressDeltaKey, AddressDelta)>) {
        let keys = entries.iter().map(|(key, _)| *key).collect();
        for (key, delta) in entries {
            self.deltas.insert(key, delta);
        }
        self.inserted.insert(txid, keys);
    }

    pub fn remove(&mut self, txid: &TxId) {
        if let Some(keys) = self.inserted.remove(txid) {
            for key in keys {
                self.deltas.remove(&key);
            }
        }
    }

    /// All deltas touching any of `addresses`, in key order.
    pub fn search(
        &self,
        addresses: &[(ScriptType, AddressHash)],
    ) -> Vec<(AddressDeltaKey, AddressDelta)> {
        let mut results = Vec::new();
        for &(script_type, address) in addresses {
            let from = AddressDeltaKey {
                script_type,
                address,
                txid: TxId([0x00; 32]),
                index: 0,
                spending: false,
            };
            let to = AddressDeltaKey {
                script_type,
                address,
                txid: TxId([0xff; 32]),
                index: u32::MAX,
                spending: true,
            };
            for (key, delta) in self.deltas.range(from..=to) {
                results.push((*key, delta.clone()));
            }
        }
        results
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn clear(&mut self) {
        self.deltas.clear();
        self.inserted.clear();
    }

    /// Estimated heap footprint of both maps.
    pub fn dynamic_usage(&self) -> usize {
        crate::memusage::btree_map_usage(&self.deltas)
            + crate::memusage::hash_map_usage(&self.inserted)
    }
}

/// Value of the spent-output index: which pool member consumes an outpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpentIndexValue {
    pub txid: TxId,
    pub input_index: u32,
    /// Always unconfirmed here.
    pub block_height: i32,
    /// Value of the consumed output.
    pub amount: Amount,
    pub script_type: ScriptType,
    pub address: AddressHash,
}

#[derive(Default)]
pub struct SpentIndex {
    spends: BTreeMap<OutPoint, SpentIndexValue>,
    inserted: HashMap<TxId, Vec<OutPoint>>,
}

impl SpentIndex {
    pub fn insert(&mut self, txid: TxId, entries: Vec<(OutPoint, SpentIndexValue)>) {
        let keys = entries.iter().map(|(key, _)| *key).collect();
        for (key, value) in entries {
            self.spends.insert(key, value);
        }
        self.inserted.insert(txid, keys);
    }

    pub fn remove(&mut self, txid: &TxId) {
        if let Some(keys) = self.inserted.remove(txid) {
            for key in keys {
                self.spends.remove(&key);
            }
        }
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&SpentIndexValue> {
        self.spends.get(outpoint)
    }

    pub fn len(&self) -> usize {
        self.spends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spends.is_empty()
    }

    pub fn clear(&mut self) {
        self.spends.clear();
        self.inserted.clear();
    }

    /// Estimated heap footprint of both maps.
    pub fn dynamic_usage(&self) -> usize {
        crate::memusage::btree_map_usage(&self.spends)
            + crate::memusage::hash_map_usage(&self.inserted)
    }
}
