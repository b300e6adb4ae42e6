//! Pool state behind the facade lock.
//!
//! Every container the pool owns lives here, so that one `&mut MemPoolInner`
//! is enough for any driver: the removal engine, the estimator hooks and the
//! insight-index teardown never need to re-enter the facade.

use crate::arena::{MempoolEntry, TxArena};
use crate::estimator::FeeEstimator;
use crate::index::{AddressDelta, AddressDeltaKey, AddressIndex, SpentIndex, SpentIndexValue};
use crate::limit::{RecentlyEvictedList, TxWeight, WeightedTxTree};
use crate::memusage;
use crate::options::MempoolOptions;
use crate::types::TxMempoolInfo;

use obscura_primitives::coins::{Coins, CoinsCache, CoinsView};
use obscura_primitives::consensus;
use obscura_primitives::{
    Amount, Anchor, IncrementalMerkleTree, Nullifier, OutPoint, ScriptType, ShieldedProtocol,
    Transaction, TxId, COINBASE_MATURITY,
};

use indexmap::IndexMap;
use rand::Rng;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::mem;
use std::sync::Arc;

/// Synthetic height used when replaying pool members onto the scratch view.
const CHECK_REPLAY_HEIGHT: u32 = 1_000_000;

/// Which input of which pool member spends an outpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpentBy {
    pub txid: TxId,
    pub input_index: u32,
}

pub(crate) struct MemPoolInner {
    pub(crate) arena: TxArena,

    /// Every transparent outpoint spent by a pool member, and by whom.
    pub(crate) map_next_tx: BTreeMap<OutPoint, SpentBy>,

    /// Published nullifiers per shielded protocol.
    pub(crate) sprout_nullifiers: HashMap<Nullifier, TxId>,
    pub(crate) sapling_nullifiers: HashMap<Nullifier, TxId>,
    pub(crate) orchard_nullifiers: HashMap<Nullifier, TxId>,

    /// Priority/fee adjustments; may reference ids not (yet) in the pool.
    pub(crate) map_deltas: HashMap<TxId, (f64, Amount)>,

    /// Admissions not yet drained by the wallet-notification plumbing.
    pub(crate) recently_added: IndexMap<TxId, Arc<Transaction>>,
    pub(crate) recently_added_seq: u64,
    pub(crate) notified_seq: u64,

    pub(crate) address_index: AddressIndex,
    pub(crate) spent_index: SpentIndex,
    address_index_enabled: bool,
    spent_index_enabled: bool,

    pub(crate) weighted_tree: WeightedTxTree,
    pub(crate) recently_evicted: RecentlyEvictedList,

    pub(crate) total_tx_size: u64,
    pub(crate) cached_inner_usage: usize,
    pub(crate) transactions_updated: u64,

    pub(crate) estimator: Box<dyn FeeEstimator>,
}

impl MemPoolInner {
    pub(crate) fn new(options: &MempoolOptions, estimator: Box<dyn FeeEstimator>) -> Self {
        Self {
            arena: TxArena::new(),
            map_next_tx: BTreeMap::new(),
            sprout_nullifiers: HashMap::new(),
            sapling_nullifiers: HashMap::new(),
            orchard_nullifiers: HashMap::new(),
            map_deltas: HashMap::new(),
            recently_added: IndexMap::new(),
            recently_added_seq: 0,
            notified_seq: 0,
            address_index: AddressIndex::default(),
            spent_index: SpentIndex::default(),
            address_index_enabled: options.address_index,
            spent_index_enabled: options.spent_index,
            weighted_tree: WeightedTxTree::new(options.total_cost_limit),
            recently_evicted: RecentlyEvictedList::new(options.eviction_memory_seconds),
            total_tx_size: 0,
            cached_inner_usage: 0,
            transactions_updated: 0,
            estimator,
        }
    }

    /// Admit an already validated transaction. The caller has done every
    /// check; this only wires up the indexes.
    pub(crate) fn add_unchecked(&mut self, entry: MempoolEntry, is_current_estimate: bool) -> bool {
        let txid = entry.txid();
        let tx = entry.shared_tx();

        self.weighted_tree
            .add(txid, TxWeight::for_tx(entry.tx_size(), entry.fee()));

        let tx_size = entry.tx_size();
        self.cached_inner_usage += entry.dynamic_usage();
        self.arena.insert(entry);

        self.recently_added.insert(txid, Arc::clone(&tx));
        self.recently_added_seq += 1;

        for (i, input) in tx.inputs.iter().enumerate() {
            self.map_next_tx.insert(
                input.prevout,
                SpentBy {
                    txid,
                    input_index: i as u32,
                },
            );
        }
        for joinsplit in &tx.joinsplits {
            for nullifier in &joinsplit.nullifiers {
                self.sprout_nullifiers.insert(*nullifier, txid);
            }
        }
        for spend in &tx.sapling_spends {
            self.sapling_nullifiers.insert(spend.nullifier, txid);
        }
        for nullifier in tx.orchard_nullifiers() {
            self.orchard_nullifiers.insert(*nullifier, txid);
        }

        // A prioritisation may predate admission; fold its fee delta into the
        // score now.
        if let Some(&(_, fee_delta)) = self.map_deltas.get(&txid) {
            if fee_delta != Amount::ZERO {
                self.arena.modify_fee_delta(&txid, fee_delta);
            }
        }

        self.transactions_updated += 1;
        self.total_tx_size += tx_size as u64;
        let entry = self.arena.get(&txid).expect("just inserted");
        self.estimator.process_transaction(entry, is_current_estimate);

        true
    }

    /// Remove `origin` and, when `recursive`, every pool member that
    /// transitively spends one of its outputs. Removed transactions are
    /// appended to `removed`.
    pub(crate) fn remove(
        &mut self,
        origin: &Transaction,
        removed: &mut Vec<Arc<Transaction>>,
        recursive: bool,
    ) {
        let origin_id = origin.txid();
        let mut queue: VecDeque<TxId> = VecDeque::new();
        queue.push_back(origin_id);

        if recursive && !self.arena.contains(&origin_id) {
            // The origin may already be gone (reorged out without
            // re-admission); its children can still be resident.
            for n in 0..origin.outputs.len() as u32 {
                if let Some(spent_by) = self.map_next_tx.get(&OutPoint::new(origin_id, n)) {
                    queue.push_back(spent_by.txid);
                }
            }
        }

        while let Some(txid) = queue.pop_front() {
            if !self.arena.contains(&txid) {
                continue;
            }
            if recursive {
                let outputs = self.arena.get(&txid).expect("checked above").tx().outputs.len();
                for n in 0..outputs as u32 {
                    if let Some(spent_by) = self.map_next_tx.get(&OutPoint::new(txid, n)) {
                        queue.push_back(spent_by.txid);
                    }
                }
            }

            let entry = self.arena.remove(&txid).expect("checked above");
            let tx = entry.shared_tx();

            self.recently_added.shift_remove(&txid);
            for input in &tx.inputs {
                self.map_next_tx.remove(&input.prevout);
            }
            for joinsplit in &tx.joinsplits {
                for nullifier in &joinsplit.nullifiers {
                    self.sprout_nullifiers.remove(nullifier);
                }
            }
            for spend in &tx.sapling_spends {
                self.sapling_nullifiers.remove(&spend.nullifier);
            }
            for nullifier in tx.orchard_nullifiers() {
                self.orchard_nullifiers.remove(nullifier);
            }

            self.total_tx_size -= entry.tx_size() as u64;
            self.cached_inner_usage -= entry.dynamic_usage();
            self.transactions_updated += 1;
            self.estimator.remove_tx(&txid);

            if self.address_index_enabled {
                self.address_index.remove(&txid);
            }
            if self.spent_index_enabled {
                self.spent_index.remove(&txid);
            }

            removed.push(tx);
        }

        for tx in removed.iter() {
            self.weighted_tree.remove(&tx.txid());
        }
    }

    /// Drop members invalidated by a reorg: no-longer-final transactions, and
    /// coinbase spends whose source has become immature at `mempool_height`.
    pub(crate) fn remove_for_reorg(
        &mut self,
        coins: &dyn CoinsView,
        mempool_height: u32,
        lock_cutoff_time: i64,
        check_frequency: u32,
    ) {
        let mut to_remove: Vec<Arc<Transaction>> = Vec::new();
        for entry in self.arena.iter() {
            let tx = entry.tx();
            if !consensus::is_final_tx(tx, mempool_height, lock_cutoff_time) {
                to_remove.push(entry.shared_tx());
            } else if entry.spends_coinbase() {
                for input in &tx.inputs {
                    // Parents still in the pool are handled by recursion when
                    // they themselves fall out.
                    if self.arena.contains(&input.prevout.txid) {
                        continue;
                    }
                    let parent_coins = coins.get_coins(&input.prevout.txid);
                    if check_frequency != 0 {
                        assert!(
                            parent_coins.is_some(),
                            "missing coins for input of {} during reorg",
                            entry.txid()
                        );
                    }
                    let immature = match &parent_coins {
                        None => true,
                        Some(c) => {
                            c.is_coinbase
                                && i64::from(mempool_height) - i64::from(c.height)
                                    < i64::from(COINBASE_MATURITY)
                        }
                    };
                    if immature {
                        to_remove.push(entry.shared_tx());
                        break;
                    }
                }
            }
        }
        for tx in to_remove {
            let mut removed = Vec::new();
            self.remove(&tx, &mut removed, true);
        }
    }

    /// Drop members spending from a note-commitment root that is no longer on
    /// the active chain.
    pub(crate) fn remove_with_anchor(&mut self, invalid_root: &Anchor, protocol: ShieldedProtocol) {
        let mut to_remove: Vec<Arc<Transaction>> = Vec::new();
        for entry in self.arena.iter() {
            let tx = entry.tx();
            let hit = match protocol {
                ShieldedProtocol::Sprout => {
                    tx.joinsplits.iter().any(|js| js.anchor == *invalid_root)
                }
                ShieldedProtocol::Sapling => {
                    tx.sapling_spends.iter().any(|spend| spend.anchor == *invalid_root)
                }
                ShieldedProtocol::Orchard => {
                    panic!("anchor-based removal is not defined for Orchard")
                }
            };
            if hit {
                to_remove.push(entry.shared_tx());
            }
        }
        for tx in to_remove {
            let mut removed = Vec::new();
            self.remove(&tx, &mut removed, true);
        }
    }

    /// Remove every member that double-spends an outpoint or re-publishes a
    /// nullifier of `tx`. `tx` itself is never a candidate.
    pub(crate) fn remove_conflicts(
        &mut self,
        tx: &Transaction,
        removed: &mut Vec<Arc<Transaction>>,
    ) {
        let txid = tx.txid();

        for input in &tx.inputs {
            let conflict = match self.map_next_tx.get(&input.prevout) {
                Some(spent_by) if spent_by.txid != txid => spent_by.txid,
                _ => continue,
            };
            if let Some(entry) = self.arena.get(&conflict) {
                let conflict_tx = entry.shared_tx();
                self.remove(&conflict_tx, removed, true);
            }
        }

        let mut shielded_conflicts: Vec<TxId> = Vec::new();
        for joinsplit in &tx.joinsplits {
            for nullifier in &joinsplit.nullifiers {
                if let Some(&owner) = self.sprout_nullifiers.get(nullifier) {
                    if owner != txid {
                        shielded_conflicts.push(owner);
                    }
                }
            }
        }
        for spend in &tx.sapling_spends {
            if let Some(&owner) = self.sapling_nullifiers.get(&spend.nullifier) {
                if owner != txid {
                    shielded_conflicts.push(owner);
                }
            }
        }
        for nullifier in tx.orchard_nullifiers() {
            if let Some(&owner) = self.orchard_nullifiers.get(nullifier) {
                if owner != txid {
                    shielded_conflicts.push(owner);
                }
            }
        }
        for conflict in shielded_conflicts {
            if let Some(entry) = self.arena.get(&conflict) {
                let conflict_tx = entry.shared_tx();
                self.remove(&conflict_tx, removed, true);
            }
        }
    }

    /// Drop members that can no longer be mined at `height`.
    pub(crate) fn remove_expired(&mut self, height: u32) -> Vec<TxId> {
        let mut to_remove: Vec<Arc<Transaction>> = Vec::new();
        for entry in self.arena.iter() {
            if consensus::is_expired_tx(entry.tx(), height) {
                to_remove.push(entry.shared_tx());
            }
        }
        let mut ids = Vec::with_capacity(to_remove.len());
        for tx in to_remove {
            let mut removed = Vec::new();
            self.remove(&tx, &mut removed, true);
            let txid = tx.txid();
            tracing::debug!("Removing expired txid: {txid}");
            ids.push(txid);
        }
        ids
    }

    /// Drop members validated under a different consensus branch.
    pub(crate) fn remove_without_branch_id(&mut self, branch_id: u32) {
        let mut to_remove: Vec<Arc<Transaction>> = Vec::new();
        for entry in self.arena.iter() {
            if entry.branch_id() != branch_id {
                to_remove.push(entry.shared_tx());
            }
        }
        for tx in to_remove {
            let mut removed = Vec::new();
            self.remove(&tx, &mut removed, true);
        }
    }

    /// A block at `height` connected carrying `vtx`. Confirmed members leave
    /// non-recursively (their outputs stay spendable); their unconfirmed
    /// double-spends land in `conflicts`.
    pub(crate) fn remove_for_block(
        &mut self,
        vtx: &[Transaction],
        height: u32,
        conflicts: &mut Vec<Arc<Transaction>>,
        is_current_estimate: bool,
    ) {
        let entries: Vec<MempoolEntry> = vtx
            .iter()
            .filter_map(|tx| self.arena.get(&tx.txid()).cloned())
            .collect();

        for tx in vtx {
            let mut confirmed = Vec::new();
            self.remove(tx, &mut confirmed, false);
            self.remove_conflicts(tx, conflicts);
            self.map_deltas.remove(&tx.txid());
        }

        self.estimator
            .process_block(height, &entries, is_current_estimate);
    }

    /// Empty the pool. Prioritisations, the recently-evicted window and the
    /// weighted tree survive; the eviction loop tolerates ids the arena no
    /// longer knows.
    pub(crate) fn clear(&mut self) {
        self.arena.clear();
        self.map_next_tx.clear();
        self.sprout_nullifiers.clear();
        self.sapling_nullifiers.clear();
        self.orchard_nullifiers.clear();
        self.recently_added.clear();
        self.address_index.clear();
        self.spent_index.clear();
        self.total_tx_size = 0;
        self.cached_inner_usage = 0;
        self.transactions_updated += 1;
    }

    /// Spend, in `coins`, every output of `txid` that a pool member already
    /// consumes.
    pub(crate) fn prune_spent(&self, txid: &TxId, coins: &mut Coins) {
        let from = OutPoint::new(*txid, 0);
        let to = OutPoint::new(*txid, u32::MAX);
        for (outpoint, _) in self.map_next_tx.range(from..=to) {
            coins.spend(outpoint.n);
        }
    }

    pub(crate) fn info(&self, txid: &TxId) -> Option<TxMempoolInfo> {
        self.arena.get(txid).map(|entry| TxMempoolInfo {
            tx: entry.shared_tx(),
            time: entry.time(),
            fee_rate: entry.fee_rate(),
        })
    }

    /// All ids, best score first.
    pub(crate) fn query_hashes(&self) -> Vec<TxId> {
        self.arena.iter_by_score().map(|entry| entry.txid()).collect()
    }

    pub(crate) fn info_all(&self) -> Vec<TxMempoolInfo> {
        self.arena
            .iter_by_score()
            .map(|entry| TxMempoolInfo {
                tx: entry.shared_tx(),
                time: entry.time(),
                fee_rate: entry.fee_rate(),
            })
            .collect()
    }

    pub(crate) fn prioritise_transaction(
        &mut self,
        txid: TxId,
        priority_delta: f64,
        fee_delta: Amount,
    ) {
        let deltas = self.map_deltas.entry(txid).or_insert((0.0, Amount::ZERO));
        deltas.0 += priority_delta;
        deltas.1 += fee_delta;
        let total_fee_delta = deltas.1;
        self.arena.modify_fee_delta(&txid, total_fee_delta);
        tracing::info!(
            "PrioritiseTransaction: {txid} priority += {priority_delta}, fee += {fee_delta}"
        );
    }

    pub(crate) fn apply_deltas(
        &self,
        txid: &TxId,
        priority_delta: &mut f64,
        fee_delta: &mut Amount,
    ) {
        if let Some(&(priority, fee)) = self.map_deltas.get(txid) {
            *priority_delta += priority;
            *fee_delta += fee;
        }
    }

    pub(crate) fn clear_prioritisation(&mut self, txid: &TxId) {
        self.map_deltas.remove(txid);
    }

    pub(crate) fn nullifier_exists(&self, nullifier: &Nullifier, protocol: ShieldedProtocol) -> bool {
        match protocol {
            ShieldedProtocol::Sprout => self.sprout_nullifiers.contains_key(nullifier),
            ShieldedProtocol::Sapling => self.sapling_nullifiers.contains_key(nullifier),
            ShieldedProtocol::Orchard => self.orchard_nullifiers.contains_key(nullifier),
        }
    }

    pub(crate) fn has_no_inputs_of(&self, tx: &Transaction) -> bool {
        tx.inputs
            .iter()
            .all(|input| !self.arena.contains(&input.prevout.txid))
    }

    pub(crate) fn drain_recently_added(&mut self) -> (Vec<Arc<Transaction>>, u64) {
        let txs = self.recently_added.values().cloned().collect();
        self.recently_added.clear();
        (txs, self.recently_added_seq)
    }

    pub(crate) fn set_mempool_cost_limit(&mut self, total_cost_limit: i64, memory_seconds: i64) {
        tracing::info!(
            "Setting mempool cost limit: (limit={total_cost_limit}, time={memory_seconds})"
        );
        self.weighted_tree = WeightedTxTree::new(total_cost_limit);
        self.recently_evicted = RecentlyEvictedList::new(memory_seconds);
    }

    /// Evict weighted-random members until the summed cost fits the limit.
    pub(crate) fn ensure_size_limit<R: Rng + ?Sized>(&mut self, rng: &mut R, now: i64) {
        while let Some(victim) = self.weighted_tree.maybe_drop_random(rng) {
            self.recently_evicted.add(victim, now);
            let Some(entry) = self.arena.get(&victim) else {
                continue;
            };
            let tx = entry.shared_tx();
            let mut removed = Vec::new();
            self.remove(&tx, &mut removed, true);
        }
    }

    pub(crate) fn add_address_index(&mut self, txid: TxId, resolved: Vec<(AddressDeltaKey, AddressDelta)>) {
        // The entry may have been removed between resolution and this call;
        // inserting then would leave keys with no teardown owner.
        if !self.arena.contains(&txid) {
            return;
        }
        self.address_index.insert(txid, resolved);
    }

    pub(crate) fn add_spent_index(&mut self, txid: TxId, resolved: Vec<(OutPoint, SpentIndexValue)>) {
        if !self.arena.contains(&txid) {
            return;
        }
        self.spent_index.insert(txid, resolved);
    }

    /// Estimated bytes of heap held by the pool's containers.
    pub(crate) fn dynamic_memory_usage(&self) -> usize {
        // The arena's slotmap and both side indexes are approximated as nine
        // pointers of bookkeeping per entry; the containers below are
        // measured individually.
        let mut total = memusage::malloc_usage(
            mem::size_of::<MempoolEntry>() + 9 * mem::size_of::<usize>(),
        ) * self.arena.len();

        total += memusage::btree_map_usage(&self.map_next_tx);
        total += memusage::hash_map_usage(&self.map_deltas);

        total += self.cached_inner_usage;

        total += memusage::malloc_usage(
            self.recently_added.len() * (mem::size_of::<TxId>() + mem::size_of::<Arc<Transaction>>()),
        );

        total += memusage::hash_map_usage(&self.sprout_nullifiers);
        total += memusage::hash_map_usage(&self.sapling_nullifiers);
        total += memusage::hash_map_usage(&self.orchard_nullifiers);

        total += self.recently_evicted.dynamic_usage();
        total += self.weighted_tree.dynamic_usage();

        total += self.address_index.dynamic_usage();
        total += self.spent_index.dynamic_usage();

        total
    }

    /// Cross-check every index against the others and replay all members on a
    /// scratch view over `base`. Any inconsistency is fatal.
    pub(crate) fn check(&self, base: &dyn CoinsView) {
        tracing::debug!(
            "Checking mempool with {} transactions and {} inputs",
            self.arena.len(),
            self.map_next_tx.len()
        );

        let mut check_total: u64 = 0;
        let mut inner_usage: usize = 0;

        let mut scratch = CoinsCache::new(base);
        let spend_height = base.best_height() + 1;

        let mut waiting_on_dependants: VecDeque<&MempoolEntry> = VecDeque::new();
        for entry in self.arena.iter() {
            check_total += entry.tx_size() as u64;
            inner_usage += entry.dynamic_usage();
            let tx = entry.tx();

            let mut depends_wait = false;
            for (i, input) in tx.inputs.iter().enumerate() {
                if let Some(parent) = self.arena.get(&input.prevout.txid) {
                    // Parent is itself unconfirmed; defer the spend check.
                    let parent_tx = parent.tx();
                    assert!(
                        parent_tx.outputs.len() > input.prevout.n as usize,
                        "pool member spends a nonexistent output of a pool parent"
                    );
                    depends_wait = true;
                } else {
                    let coins = base
                        .get_coins(&input.prevout.txid)
                        .unwrap_or_else(|| panic!("missing coins for input of {}", entry.txid()));
                    assert!(
                        coins.is_available(input.prevout.n),
                        "pool member spends an unavailable output"
                    );
                }

                let spent_by = self
                    .map_next_tx
                    .get(&input.prevout)
                    .expect("every input is registered in the outpoint map");
                assert_eq!(spent_by.txid, entry.txid());
                assert_eq!(spent_by.input_index, i as u32);
            }

            // Joinsplits within one transaction may chain: each may anchor on
            // an intermediate root produced by its predecessors.
            let mut intermediates: HashMap<Anchor, IncrementalMerkleTree> = HashMap::new();
            for joinsplit in &tx.joinsplits {
                for nullifier in &joinsplit.nullifiers {
                    assert!(
                        !base.get_nullifier(nullifier, ShieldedProtocol::Sprout),
                        "pool member re-publishes an on-chain Sprout nullifier"
                    );
                }
                let mut tree = intermediates
                    .get(&joinsplit.anchor)
                    .cloned()
                    .or_else(|| base.sprout_anchor_at(&joinsplit.anchor))
                    .expect("joinsplit anchors on an unknown root");
                for commitment in &joinsplit.commitments {
                    tree.append(*commitment);
                }
                intermediates.insert(tree.root(), tree);
            }
            for spend in &tx.sapling_spends {
                assert!(
                    base.sapling_anchor_exists(&spend.anchor),
                    "Sapling spend anchors on an unknown root"
                );
                assert!(
                    !base.get_nullifier(&spend.nullifier, ShieldedProtocol::Sapling),
                    "pool member re-publishes an on-chain Sapling nullifier"
                );
            }

            if depends_wait {
                waiting_on_dependants.push_back(entry);
            } else {
                assert!(
                    consensus::check_tx_inputs(tx, &scratch, spend_height).is_ok(),
                    "pool member fails input checks against the scratch view"
                );
                scratch.update_coins(tx, CHECK_REPLAY_HEIGHT);
            }
        }

        let mut steps_since_last_remove = 0;
        while let Some(entry) = waiting_on_dependants.pop_front() {
            if !scratch.have_inputs(entry.tx()) {
                waiting_on_dependants.push_back(entry);
                steps_since_last_remove += 1;
                assert!(
                    steps_since_last_remove < waiting_on_dependants.len(),
                    "dependency cycle among pool members"
                );
            } else {
                assert!(
                    consensus::check_tx_inputs(entry.tx(), &scratch, spend_height).is_ok(),
                    "pool member fails input checks against the scratch view"
                );
                scratch.update_coins(entry.tx(), CHECK_REPLAY_HEIGHT);
                steps_since_last_remove = 0;
            }
        }

        for (outpoint, spent_by) in &self.map_next_tx {
            let entry = self
                .arena
                .get(&spent_by.txid)
                .expect("outpoint map references a pool member");
            let tx = entry.tx();
            assert!(tx.inputs.len() > spent_by.input_index as usize);
            assert_eq!(tx.inputs[spent_by.input_index as usize].prevout, *outpoint);
        }

        self.check_nullifiers(ShieldedProtocol::Sprout);
        self.check_nullifiers(ShieldedProtocol::Sapling);
        self.check_nullifiers(ShieldedProtocol::Orchard);

        assert_eq!(self.total_tx_size, check_total);
        assert_eq!(self.cached_inner_usage, inner_usage);
    }

    fn check_nullifiers(&self, protocol: ShieldedProtocol) {
        let map = match protocol {
            ShieldedProtocol::Sprout => &self.sprout_nullifiers,
            ShieldedProtocol::Sapling => &self.sapling_nullifiers,
            ShieldedProtocol::Orchard => &self.orchard_nullifiers,
        };
        for (nullifier, txid) in map {
            let entry = self
                .arena
                .get(txid)
                .expect("nullifier map references a pool member");
            let tx = entry.tx();
            let published = match protocol {
                ShieldedProtocol::Sprout => tx
                    .joinsplits
                    .iter()
                    .any(|js| js.nullifiers.contains(nullifier)),
                ShieldedProtocol::Sapling => tx
                    .sapling_spends
                    .iter()
                    .any(|spend| spend.nullifier == *nullifier),
                ShieldedProtocol::Orchard => tx.orchard_nullifiers().contains(nullifier),
            };
            assert!(published, "nullifier map entry no longer published by its owner");
        }
    }
}

/// Resolve the insight address deltas for `tx` against `view`.
///
/// Performed outside the pool lock: `view` is typically the pool-overlay view,
/// which takes the lock itself for every lookup.
pub(crate) fn resolve_address_deltas(
    txid: TxId,
    tx: &Transaction,
    time: i64,
    view: &dyn CoinsView,
) -> Vec<(AddressDeltaKey, AddressDelta)> {
    let mut resolved = Vec::new();
    for (j, input) in tx.inputs.iter().enumerate() {
        let Some(prevout) = output_for(view, &input.prevout) else {
            continue;
        };
        let script_type = prevout.script_pubkey.script_type();
        if script_type == ScriptType::Unknown {
            continue;
        }
        let address = prevout
            .script_pubkey
            .address_hash()
            .expect("standard scripts carry an address hash");
        resolved.push((
            AddressDeltaKey {
                script_type,
                address,
                txid,
                index: j as u32,
                spending: true,
            },
            AddressDelta {
                time,
                amount: -prevout.value,
                prevout: Some(input.prevout),
            },
        ));
    }
    for (j, output) in tx.outputs.iter().enumerate() {
        let script_type = output.script_pubkey.script_type();
        if script_type == ScriptType::Unknown {
            continue;
        }
        let address = output
            .script_pubkey
            .address_hash()
            .expect("standard scripts carry an address hash");
        resolved.push((
            AddressDeltaKey {
                script_type,
                address,
                txid,
                index: j as u32,
                spending: false,
            },
            AddressDelta {
                time,
                amount: output.value,
                prevout: None,
            },
        ));
    }
    resolved
}

/// Resolve the spent-index records for `tx` against `view`.
pub(crate) fn resolve_spent_entries(
    txid: TxId,
    tx: &Transaction,
    view: &dyn CoinsView,
) -> Vec<(OutPoint, SpentIndexValue)> {
    let mut resolved = Vec::new();
    for (j, input) in tx.inputs.iter().enumerate() {
        let Some(prevout) = output_for(view, &input.prevout) else {
            continue;
        };
        resolved.push((
            input.prevout,
            SpentIndexValue {
                txid,
                input_index: j as u32,
                block_height: -1,
                amount: prevout.value,
                script_type: prevout.script_pubkey.script_type(),
                address: prevout
                    .script_pubkey
                    .address_hash()
                    .unwrap_or_default(),
            },
        ));
    }
    resolved
}

fn output_for(
    view: &dyn CoinsView,
    outpoint: &OutPoint,
) -> Option<obscura_primitives::TxOut> {
    view.get_coins(&outpoint.txid)
        .and_then(|coins| coins.outputs.get(outpoint.n as usize).cloned().flatten())
}
