//! Slotmap-backed storage for pool entries with a score-ordered secondary
//! index.
//!
//! The score index keys are derived from entry fields, so every mutation that
//! affects the score must go through the modify protocol: remove the old key,
//! mutate, reinsert. `modify_fee_delta` is the only such mutation.

use crate::types::FeeRate;
use obscura_primitives::{Amount, Transaction, TxId};

use slotmap::{DefaultKey, SlotMap};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::mem;
use std::sync::Arc;

/// Handle to an entry in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(DefaultKey);

/// Per-transaction metadata kept while the transaction sits in the pool.
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    txid: TxId,
    tx: Arc<Transaction>,
    fee: Amount,
    tx_size: usize,
    mod_size: usize,
    usage_size: usize,
    time: i64,
    priority: f64,
    height: u32,
    had_no_dependencies: bool,
    spends_coinbase: bool,
    sigop_count: u32,
    branch_id: u32,
    fee_delta: Amount,
}

impl MempoolEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tx: Arc<Transaction>,
        fee: Amount,
        time: i64,
        priority: f64,
        height: u32,
        had_no_dependencies: bool,
        spends_coinbase: bool,
        sigop_count: u32,
        branch_id: u32,
    ) -> Self {
        let tx_size = tx.serialized_size();
        let mod_size = tx.modified_size(tx_size);
        // The transaction is heap-allocated behind the Arc, so its own size
        // counts toward the deep footprint alongside the buffers it owns.
        let usage_size = tx.dynamic_usage() + mem::size_of::<Transaction>();
        Self {
            txid: tx.txid(),
            tx,
            fee,
            tx_size,
            mod_size,
            usage_size,
            time,
            priority,
            height,
            had_no_dependencies,
            spends_coinbase,
            sigop_count,
            branch_id,
            fee_delta: Amount::ZERO,
        }
    }

    pub fn txid(&self) -> TxId {
        self.txid
    }

    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    pub fn shared_tx(&self) -> Arc<Transaction> {
        Arc::clone(&self.tx)
    }

    pub fn fee(&self) -> Amount {
        self.fee
    }

    /// Base fee plus the prioritisation delta; this is what the score uses.
    pub fn modified_fee(&self) -> Amount {
        self.fee + self.fee_delta
    }

    pub fn fee_delta(&self) -> Amount {
        self.fee_delta
    }

    pub fn fee_rate(&self) -> FeeRate {
        FeeRate::new(self.fee, self.tx_size)
    }

    pub fn tx_size(&self) -> usize {
        self.tx_size
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn had_no_dependencies(&self) -> bool {
        self.had_no_dependencies
    }

    pub fn spends_coinbase(&self) -> bool {
        self.spends_coinbase
    }

    pub fn sigop_count(&self) -> u32 {
        self.sigop_count
    }

    pub fn branch_id(&self) -> u32 {
        self.branch_id
    }

    /// Entry priority aged to `current_height`: value moved gains priority
    /// with confirmations of its inputs.
    pub fn priority_at(&self, current_height: u32) -> f64 {
        let value_in = (self.tx.value_out() + self.fee).zat() as f64;
        let delta = f64::from(current_height.saturating_sub(self.height)) * value_in
            / self.mod_size as f64;
        self.priority + delta
    }

    /// Deep memory footprint attributed to this entry.
    pub fn dynamic_usage(&self) -> usize {
        self.usage_size
    }

    fn score_key(&self) -> ScoreKey {
        ScoreKey {
            modified_fee: self.modified_fee(),
            tx_size: self.tx_size,
            txid: self.txid,
        }
    }

    fn set_fee_delta(&mut self, fee_delta: Amount) {
        self.fee_delta = fee_delta;
    }
}

/// Ordering key over (effective fee-rate desc, size asc, txid asc).
///
/// Fee rates compare exactly by cross-multiplication, never through floats.
/// Ascending iteration over the score index therefore yields the
/// highest-paying entries first.
#[derive(Debug, Clone, Copy)]
struct ScoreKey {
    modified_fee: Amount,
    tx_size: usize,
    txid: TxId,
}

impl Ord for ScoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let ours = self.modified_fee.zat() as i128 * other.tx_size as i128;
        let theirs = other.modified_fee.zat() as i128 * self.tx_size as i128;
        theirs
            .cmp(&ours)
            .then_with(|| self.tx_size.cmp(&other.tx_size))
            .then_with(|| self.txid.cmp(&other.txid))
    }
}

impl PartialOrd for ScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScoreKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoreKey {}

/// The primary index: entries by id, with score-ordered iteration.
#[derive(Default)]
pub struct TxArena {
    entries: SlotMap<DefaultKey, MempoolEntry>,
    by_txid: HashMap<TxId, EntryId>,
    by_score: BTreeSet<(ScoreKey, EntryId)>,
}

impl TxArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. The caller guarantees the id is not already present.
    pub fn insert(&mut self, entry: MempoolEntry) -> EntryId {
        let txid = entry.txid();
        debug_assert!(!self.by_txid.contains_key(&txid), "duplicate pool entry");
        let key = entry.score_key();
        let id = EntryId(self.entries.insert(entry));
        self.by_txid.insert(txid, id);
        self.by_score.insert((key, id));
        id
    }

    pub fn remove(&mut self, txid: &TxId) -> Option<MempoolEntry> {
        let id = self.by_txid.remove(txid)?;
        let entry = self.entries.remove(id.0).expect("index and slotmap agree");
        self.by_score.remove(&(entry.score_key(), id));
        Some(entry)
    }

    pub fn get(&self, txid: &TxId) -> Option<&MempoolEntry> {
        let id = self.by_txid.get(txid)?;
        self.entries.get(id.0)
    }

    pub fn contains(&self, txid: &TxId) -> bool {
        self.by_txid.contains_key(txid)
    }

    /// Update the prioritisation delta, re-sorting the score index.
    pub fn modify_fee_delta(&mut self, txid: &TxId, fee_delta: Amount) {
        let Some(&id) = self.by_txid.get(txid) else {
            return;
        };
        let entry = &mut self.entries[id.0];
        let old_key = entry.score_key();
        self.by_score.remove(&(old_key, id));
        entry.set_fee_delta(fee_delta);
        let new_key = entry.score_key();
        self.by_score.insert((new_key, id));
    }

    /// Entries in score order: highest effective fee-rate first.
    pub fn iter_by_score(&self) -> impl Iterator<Item = &MempoolEntry> {
        self.by_score.iter().map(|(_, id)| &self.entries[id.0])
    }

    /// Entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &MempoolEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_txid.clear();
        self.by_score.clear();
    }

    /// Whether `a` sorts ahead of `b`. Ids missing from the pool sort last;
    /// historically named after a comparator that also considered depth.
    pub fn compare_depth_and_score(&self, a: &TxId, b: &TxId) -> bool {
        let Some(entry_a) = self.get(a) else {
            return false;
        };
        let Some(entry_b) = self.get(b) else {
            return true;
        };
        entry_a.score_key() < entry_b.score_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obscura_primitives::{OutPoint, Script, TxIn, TxOut};

    fn entry(input_byte: u8, fee: i64) -> MempoolEntry {
        let tx = Transaction {
            inputs: vec![TxIn {
                prevout: OutPoint::new(TxId([input_byte; 32]), 0),
                script_sig: Script::default(),
                sequence: u32::MAX,
            }],
            outputs: vec![TxOut {
                value: Amount::from_zat(1000),
                script_pubkey: Script::default(),
            }],
            ..Default::default()
        };
        MempoolEntry::new(
            Arc::new(tx),
            Amount::from_zat(fee),
            0,
            0.0,
            100,
            true,
            false,
            1,
            0x76b8_09bb,
        )
    }

    #[test]
    fn score_order_is_fee_rate_descending() {
        let mut arena = TxArena::new();
        let low = entry(1, 100);
        let high = entry(2, 10_000);
        let low_id = low.txid();
        let high_id = high.txid();
        arena.insert(low);
        arena.insert(high);

        let order: Vec<TxId> = arena.iter_by_score().map(|e| e.txid()).collect();
        assert_eq!(order, vec![high_id, low_id]);
        assert!(arena.compare_depth_and_score(&high_id, &low_id));
        assert!(!arena.compare_depth_and_score(&low_id, &high_id));
    }

    #[test]
    fn modify_fee_delta_resorts() {
        let mut arena = TxArena::new();
        let a = entry(1, 100);
        let b = entry(2, 10_000);
        let a_id = a.txid();
        arena.insert(a);
        arena.insert(b);

        arena.modify_fee_delta(&a_id, Amount::from_zat(1_000_000));
        assert_eq!(arena.iter_by_score().next().unwrap().txid(), a_id);
        assert_eq!(arena.get(&a_id).unwrap().fee_delta(), Amount::from_zat(1_000_000));
    }

    #[test]
    fn remove_clears_all_indexes() {
        let mut arena = TxArena::new();
        let e = entry(1, 100);
        let txid = e.txid();
        arena.insert(e);

        let removed = arena.remove(&txid).unwrap();
        assert_eq!(removed.txid(), txid);
        assert!(arena.is_empty());
        assert_eq!(arena.iter_by_score().count(), 0);
        assert!(arena.remove(&txid).is_none());
    }

    #[test]
    fn missing_ids_sort_last() {
        let mut arena = TxArena::new();
        let e = entry(1, 100);
        let txid = e.txid();
        arena.insert(e);

        let missing = TxId([0xee; 32]);
        assert!(arena.compare_depth_and_score(&txid, &missing));
        assert!(!arena.compare_depth_and_score(&missing, &txid));
    }
}
