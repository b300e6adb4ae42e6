//! # Obscura transaction pool
//!
//! The in-memory staging area between relay and block production. The pool
//! accepts transactions that callers have already validated, detects
//! double-spends of transparent outpoints and shielded nullifiers, services
//! lookups, tears members down when blocks connect or the chain reorganises,
//! and enforces a cost-weighted size bound with probabilistic eviction.
//!
//! One `RwLock` around the inner state orders every observable transition;
//! cross-index invariants hold at each release point. Internal calls (the
//! removal engine, estimator hooks, index teardown) all run on the locked
//! inner state, so the lock is only ever taken at this facade.

mod arena;
mod coins_view;
mod estimator;
mod index;
mod inner;
mod limit;
mod memusage;
mod options;
#[cfg(test)]
mod tests;
mod types;

pub use self::arena::{EntryId, MempoolEntry, TxArena};
pub use self::coins_view::CoinsViewMemPool;
pub use self::estimator::{EstimatesFileError, FeeEstimator, FEE_ESTIMATES_VERSION_REQUIRED};
pub use self::index::{AddressDelta, AddressDeltaKey, SpentIndexValue};
pub use self::inner::SpentBy;
pub use self::limit::{
    RecentlyEvictedList, TxWeight, WeightedTxTree, EVICTION_MEMORY_ENTRIES, LOW_FEE_PENALTY,
    LOW_FEE_THRESHOLD, MIN_TX_COST,
};
pub use self::options::{
    MempoolOptions, DEFAULT_EVICTION_MEMORY_SECONDS, DEFAULT_MEMPOOL_TOTAL_COST_LIMIT,
};
pub use self::types::{FeeRate, TxMempoolInfo};

use self::inner::MemPoolInner;

use obscura_primitives::coins::{Coins, CoinsView};
use obscura_primitives::{
    AddressHash, Amount, Anchor, Network, Nullifier, OutPoint, ScriptType, ShieldedProtocol,
    Transaction, TxId,
};

use rand::Rng;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

fn now_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

/// The unconfirmed-transaction pool.
pub struct MemPool {
    options: MempoolOptions,
    pub(crate) inner: RwLock<MemPoolInner>,
    /// Probability numerator (over 2^32) that [`MemPool::check`] runs.
    check_frequency: AtomicU32,
}

impl MemPool {
    pub fn new(options: MempoolOptions, estimator: Box<dyn FeeEstimator>) -> Self {
        let inner = MemPoolInner::new(&options, estimator);
        Self {
            options,
            inner: RwLock::new(inner),
            // Sanity checks default off: with them on, admission is O(n^2) in
            // the pool size.
            check_frequency: AtomicU32::new(0),
        }
    }

    pub fn options(&self) -> &MempoolOptions {
        &self.options
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemPoolInner> {
        self.inner.read().expect("mempool lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemPoolInner> {
        self.inner.write().expect("mempool lock poisoned")
    }

    /// Admit a validated transaction. The pool performs no verification of
    /// its own.
    pub fn add_unchecked(&self, entry: MempoolEntry, is_current_estimate: bool) -> bool {
        self.write().add_unchecked(entry, is_current_estimate)
    }

    /// Remove `tx` and, when `recursive`, all resident descendants. Removed
    /// transactions are appended to `removed`.
    pub fn remove(&self, tx: &Transaction, removed: &mut Vec<Arc<Transaction>>, recursive: bool) {
        self.write().remove(tx, removed, recursive);
    }

    /// Remove members invalidated by a chain reorganisation.
    pub fn remove_for_reorg(
        &self,
        coins: &dyn CoinsView,
        mempool_height: u32,
        lock_cutoff_time: i64,
    ) {
        let check_frequency = self.check_frequency.load(Ordering::Relaxed);
        self.write()
            .remove_for_reorg(coins, mempool_height, lock_cutoff_time, check_frequency);
    }

    /// Remove members anchored on an invalidated note-commitment root.
    /// Panics for [`ShieldedProtocol::Orchard`], which invalidates anchors
    /// through its own mechanism.
    pub fn remove_with_anchor(&self, invalid_root: &Anchor, protocol: ShieldedProtocol) {
        self.write().remove_with_anchor(invalid_root, protocol);
    }

    /// Remove members conflicting with `tx` over a transparent outpoint or a
    /// shielded nullifier. `tx` itself is never removed.
    pub fn remove_conflicts(&self, tx: &Transaction, removed: &mut Vec<Arc<Transaction>>) {
        self.write().remove_conflicts(tx, removed);
    }

    /// Remove members expired at `height`; returns their ids.
    pub fn remove_expired(&self, height: u32) -> Vec<TxId> {
        self.write().remove_expired(height)
    }

    /// Remove members whose validation branch differs from `branch_id`.
    pub fn remove_without_branch_id(&self, branch_id: u32) {
        self.write().remove_without_branch_id(branch_id)
    }

    /// A block at `height` carrying `vtx` connected. Unconfirmed
    /// double-spends of the block's transactions land in `conflicts`.
    pub fn remove_for_block(
        &self,
        vtx: &[Transaction],
        height: u32,
        conflicts: &mut Vec<Arc<Transaction>>,
        is_current_estimate: bool,
    ) {
        self.write()
            .remove_for_block(vtx, height, conflicts, is_current_estimate);
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Spend, in `coins`, every output of `txid` already consumed by a pool
    /// member.
    pub fn prune_spent(&self, txid: &TxId, coins: &mut Coins) {
        self.read().prune_spent(txid, coins);
    }

    pub fn exists(&self, txid: &TxId) -> bool {
        self.read().arena.contains(txid)
    }

    pub fn get(&self, txid: &TxId) -> Option<Arc<Transaction>> {
        self.read().arena.get(txid).map(MempoolEntry::shared_tx)
    }

    pub fn info(&self, txid: &TxId) -> Option<TxMempoolInfo> {
        self.read().info(txid)
    }

    /// All member ids, highest score first.
    pub fn query_hashes(&self) -> Vec<TxId> {
        self.read().query_hashes()
    }

    /// Snapshots of all members, in [`MemPool::query_hashes`] order.
    pub fn info_all(&self) -> Vec<TxMempoolInfo> {
        self.read().info_all()
    }

    /// Whether `a` sorts ahead of `b`. Kept under its historical name; only
    /// the score is compared.
    pub fn compare_depth_and_score(&self, a: &TxId, b: &TxId) -> bool {
        self.read().arena.compare_depth_and_score(a, b)
    }

    pub fn prioritise_transaction(&self, txid: TxId, priority_delta: f64, fee_delta: Amount) {
        self.write()
            .prioritise_transaction(txid, priority_delta, fee_delta);
    }

    /// Add any registered deltas for `txid` into the provided accumulators.
    pub fn apply_deltas(&self, txid: &TxId, priority_delta: &mut f64, fee_delta: &mut Amount) {
        self.read().apply_deltas(txid, priority_delta, fee_delta);
    }

    pub fn clear_prioritisation(&self, txid: &TxId) {
        self.write().clear_prioritisation(txid);
    }

    pub fn nullifier_exists(&self, nullifier: &Nullifier, protocol: ShieldedProtocol) -> bool {
        self.read().nullifier_exists(nullifier, protocol)
    }

    /// True iff no transparent input of `tx` spends an output of a pool
    /// member.
    pub fn has_no_inputs_of(&self, tx: &Transaction) -> bool {
        self.read().has_no_inputs_of(tx)
    }

    /// Take the not-yet-notified admissions and the current sequence number.
    pub fn drain_recently_added(&self) -> (Vec<Arc<Transaction>>, u64) {
        self.write().drain_recently_added()
    }

    /// Test-only notification bookkeeping; regtest asserts keep it out of
    /// production paths.
    pub fn set_notified_sequence(&self, sequence: u64) {
        assert_eq!(self.options.network, Network::Regtest);
        self.write().notified_seq = sequence;
    }

    pub fn is_fully_notified(&self) -> bool {
        assert_eq!(self.options.network, Network::Regtest);
        let inner = self.read();
        inner.recently_added_seq == inner.notified_seq
    }

    /// Replace the eviction machinery with fresh instances bound to the given
    /// limit and retention window.
    pub fn set_mempool_cost_limit(&self, total_cost_limit: i64, memory_seconds: i64) {
        self.write()
            .set_mempool_cost_limit(total_cost_limit, memory_seconds);
    }

    /// Whether eviction dropped `txid` within the retention window; admission
    /// paths consult this to stop churn.
    pub fn is_recently_evicted(&self, txid: &TxId) -> bool {
        self.write().recently_evicted.contains(txid, now_seconds())
    }

    /// Evict weighted-random members until the pool's summed cost fits its
    /// limit.
    pub fn ensure_size_limit(&self) {
        self.write()
            .ensure_size_limit(&mut rand::thread_rng(), now_seconds());
    }

    pub fn estimate_fee(&self, blocks: usize) -> FeeRate {
        self.read().estimator.estimate_fee(blocks)
    }

    pub fn estimate_priority(&self, blocks: usize) -> f64 {
        self.read().estimator.estimate_priority(blocks)
    }

    /// Write the fee-estimator state. I/O failure is non-fatal and logged.
    pub fn write_fee_estimates(&self, out: &mut dyn Write) -> bool {
        match estimator::write_estimates(self.read().estimator.as_ref(), out) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("Unable to write fee estimates (non-fatal): {err}");
                false
            }
        }
    }

    /// Restore the fee-estimator state. Failure is non-fatal and logged.
    pub fn read_fee_estimates(&self, input: &mut dyn Read) -> bool {
        let mut inner = self.write();
        match estimator::read_estimates(inner.estimator.as_mut(), input) {
            Ok(()) => true,
            Err(err @ EstimatesFileError::UpVersion { .. }) => {
                tracing::error!("{err}");
                false
            }
            Err(err) => {
                tracing::warn!("Unable to read fee estimates (non-fatal): {err}");
                false
            }
        }
    }

    /// Verify every cross-index invariant against `base`, with probability
    /// `check_frequency / 2^32`. Inconsistencies abort the process.
    pub fn check(&self, base: &dyn CoinsView) {
        let frequency = self.check_frequency.load(Ordering::Relaxed);
        if frequency == 0 {
            return;
        }
        if rand::thread_rng().gen::<u32>() >= frequency {
            return;
        }
        self.read().check(base);
    }

    pub fn set_check_frequency(&self, frequency: u32) {
        self.check_frequency.store(frequency, Ordering::Relaxed);
    }

    pub fn transactions_updated(&self) -> u64 {
        self.read().transactions_updated
    }

    pub fn add_transactions_updated(&self, n: u64) {
        self.write().transactions_updated += n;
    }

    pub fn size(&self) -> usize {
        self.read().arena.len()
    }

    pub fn total_tx_size(&self) -> u64 {
        self.read().total_tx_size
    }

    pub fn dynamic_memory_usage(&self) -> usize {
        self.read().dynamic_memory_usage()
    }

    /// Record the insight address deltas for a resident transaction.
    ///
    /// Prevouts are resolved through `view` before the pool lock is taken;
    /// `view` may be a [`CoinsViewMemPool`] over this pool.
    pub fn add_address_index(&self, txid: &TxId, view: &dyn CoinsView) {
        if !self.options.address_index {
            return;
        }
        let Some((tx, time)) = self
            .read()
            .arena
            .get(txid)
            .map(|entry| (entry.shared_tx(), entry.time()))
        else {
            return;
        };
        let resolved = inner::resolve_address_deltas(*txid, &tx, time, view);
        self.write().add_address_index(*txid, resolved);
    }

    pub fn remove_address_index(&self, txid: &TxId) {
        self.write().address_index.remove(txid);
    }

    /// All address deltas for the given addresses, in index order.
    pub fn get_address_index(
        &self,
        addresses: &[(ScriptType, AddressHash)],
    ) -> Vec<(AddressDeltaKey, AddressDelta)> {
        self.read().address_index.search(addresses)
    }

    /// Record the insight spent-output entries for a resident transaction.
    pub fn add_spent_index(&self, txid: &TxId, view: &dyn CoinsView) {
        if !self.options.spent_index {
            return;
        }
        let Some(tx) = self.get(txid) else {
            return;
        };
        let resolved = inner::resolve_spent_entries(*txid, &tx, view);
        self.write().add_spent_index(*txid, resolved);
    }

    pub fn remove_spent_index(&self, txid: &TxId) {
        self.write().spent_index.remove(txid);
    }

    pub fn get_spent_index(&self, outpoint: &OutPoint) -> Option<SpentIndexValue> {
        self.read().spent_index.get(outpoint).cloned()
    }
}
