//! Cost-bounded eviction machinery.
//!
//! `WeightedTxTree` keeps one weight record per pool member in an implicit
//! binary tree over a vector, with per-node subtree sums, so a weighted random
//! draw and both updates are O(log n). `RecentlyEvictedList` is the bounded
//! memory of ids dropped by eviction, consulted on re-admission.

use obscura_primitives::{Amount, TxId};

use rand::Rng;
use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Add;

/// Floor on the cost attributed to any transaction, so that very small
/// transactions cannot flood the pool for free.
pub const MIN_TX_COST: i64 = 4_000;

/// Extra eviction weight carried by transactions paying less than
/// [`LOW_FEE_THRESHOLD`], making them proportionally likelier victims.
pub const LOW_FEE_PENALTY: i64 = 16_000;

/// Fee below which the low-fee penalty applies.
pub const LOW_FEE_THRESHOLD: Amount = Amount::from_zat(10_000);

/// Hard cap on remembered evictions, bounding the window's footprint.
pub const EVICTION_MEMORY_ENTRIES: usize = 40_000;

/// Eviction weight of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxWeight {
    /// Counts toward the pool's cost ceiling.
    pub cost: i64,
    /// Governs the random eviction draw; `cost` plus any low-fee penalty.
    pub eviction_weight: i64,
}

impl TxWeight {
    pub fn new(cost: i64, eviction_weight: i64) -> Self {
        Self {
            cost,
            eviction_weight,
        }
    }

    /// Weight of a transaction of `tx_size` serialized bytes paying `fee`.
    pub fn for_tx(tx_size: usize, fee: Amount) -> Self {
        let cost = (tx_size as i64).max(MIN_TX_COST);
        let penalty = if fee < LOW_FEE_THRESHOLD {
            LOW_FEE_PENALTY
        } else {
            0
        };
        Self {
            cost,
            eviction_weight: cost + penalty,
        }
    }
}

impl Add for TxWeight {
    type Output = TxWeight;

    fn add(self, rhs: TxWeight) -> TxWeight {
        TxWeight {
            cost: self.cost + rhs.cost,
            eviction_weight: self.eviction_weight + rhs.eviction_weight,
        }
    }
}

/// Weighted random selector over the pool's members.
///
/// Nodes live at vector index `i` with children at `2i + 1` and `2i + 2`;
/// `subtree[i]` holds the weight sum of the subtree rooted at `i`.
pub struct WeightedTxTree {
    capacity: i64,
    nodes: Vec<(TxId, TxWeight)>,
    subtree: Vec<TxWeight>,
    index_of: HashMap<TxId, usize>,
}

impl WeightedTxTree {
    pub fn new(capacity: i64) -> Self {
        Self {
            capacity,
            nodes: Vec::new(),
            subtree: Vec::new(),
            index_of: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> i64 {
        self.capacity
    }

    /// Summed cost of all tracked transactions.
    pub fn total_cost(&self) -> i64 {
        self.subtree.first().map(|w| w.cost).unwrap_or(0)
    }

    fn total_weight(&self) -> TxWeight {
        self.subtree.first().copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, txid: &TxId) -> bool {
        self.index_of.contains_key(txid)
    }

    /// Recompute subtree sums from `index` to the root.
    fn resum_path_to_root(&mut self, mut index: usize) {
        loop {
            let mut sum = self.nodes[index].1;
            let left = 2 * index + 1;
            let right = 2 * index + 2;
            if left < self.subtree.len() {
                sum = sum + self.subtree[left];
            }
            if right < self.subtree.len() {
                sum = sum + self.subtree[right];
            }
            self.subtree[index] = sum;
            if index == 0 {
                break;
            }
            index = (index - 1) / 2;
        }
    }

    /// Track `txid` with `weight`. Re-adding a tracked id is a no-op.
    pub fn add(&mut self, txid: TxId, weight: TxWeight) {
        if self.index_of.contains_key(&txid) {
            return;
        }
        let index = self.nodes.len();
        self.nodes.push((txid, weight));
        self.subtree.push(TxWeight::default());
        self.index_of.insert(txid, index);
        self.resum_path_to_root(index);
    }

    /// Stop tracking `txid`. Absent ids are a no-op.
    pub fn remove(&mut self, txid: &TxId) {
        let Some(index) = self.index_of.remove(txid) else {
            return;
        };
        let last = self.nodes.len() - 1;
        if index != last {
            let moved = self.nodes[last];
            self.nodes[index] = moved;
            self.index_of.insert(moved.0, index);
        }
        self.nodes.pop();
        self.subtree.pop();

        // Both the vacated slot's path and the removed tail's path are stale;
        // recompute deeper nodes first so parents see fresh children.
        let mut stale: Vec<usize> = Vec::new();
        if index < self.nodes.len() {
            stale.push(index);
        }
        if last > 0 {
            let tail_parent = (last - 1) / 2;
            if tail_parent < self.nodes.len() {
                stale.push(tail_parent);
            }
        }
        stale.sort_unstable_by(|a, b| b.cmp(a));
        for start in stale {
            self.resum_path_to_root(start);
        }
    }

    /// Estimated heap footprint of the tree's backing storage.
    pub fn dynamic_usage(&self) -> usize {
        crate::memusage::malloc_usage(
            self.nodes.capacity() * std::mem::size_of::<(TxId, TxWeight)>()
                + self.subtree.capacity() * std::mem::size_of::<TxWeight>(),
        ) + crate::memusage::hash_map_usage(&self.index_of)
    }

    /// If the summed cost exceeds the capacity, remove and return one id,
    /// chosen with probability proportional to its eviction weight.
    pub fn maybe_drop_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<TxId> {
        if self.total_cost() <= self.capacity {
            return None;
        }
        let mut target = rng.gen_range(0..self.total_weight().eviction_weight);
        let mut index = 0;
        let victim = loop {
            let left = 2 * index + 1;
            if left < self.subtree.len() && target < self.subtree[left].eviction_weight {
                index = left;
                continue;
            }
            if left < self.subtree.len() {
                target -= self.subtree[left].eviction_weight;
            }
            let own = self.nodes[index].1.eviction_weight;
            if target < own {
                break self.nodes[index].0;
            }
            target -= own;
            index = 2 * index + 2;
        };
        self.remove(&victim);
        Some(victim)
    }
}

/// Time-bounded memory of recently evicted ids.
pub struct RecentlyEvictedList {
    memory_seconds: i64,
    /// Insertion-ordered, so the front is always the oldest entry.
    queue: VecDeque<(TxId, i64)>,
    members: HashSet<TxId>,
}

impl RecentlyEvictedList {
    pub fn new(memory_seconds: i64) -> Self {
        Self {
            memory_seconds,
            queue: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    fn prune(&mut self, now: i64) {
        while let Some(&(txid, added)) = self.queue.front() {
            if added + self.memory_seconds > now {
                break;
            }
            self.queue.pop_front();
            self.members.remove(&txid);
        }
    }

    pub fn add(&mut self, txid: TxId, now: i64) {
        self.prune(now);
        if !self.members.insert(txid) {
            return;
        }
        if self.queue.len() == EVICTION_MEMORY_ENTRIES {
            let (oldest, _) = self.queue.pop_front().expect("queue is non-empty");
            self.members.remove(&oldest);
        }
        self.queue.push_back((txid, now));
    }

    pub fn contains(&mut self, txid: &TxId, now: i64) -> bool {
        self.prune(now);
        self.members.contains(txid)
    }

    /// Estimated heap footprint of the window.
    pub fn dynamic_usage(&self) -> usize {
        crate::memusage::malloc_usage(
            self.queue.capacity() * std::mem::size_of::<(TxId, i64)>(),
        ) + crate::memusage::hash_set_usage(&self.members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn id(byte: u8) -> TxId {
        TxId([byte; 32])
    }

    #[test]
    fn weight_formula() {
        let cheap = TxWeight::for_tx(1_000, Amount::from_zat(1));
        assert_eq!(cheap.cost, MIN_TX_COST);
        assert_eq!(cheap.eviction_weight, MIN_TX_COST + LOW_FEE_PENALTY);

        let paying = TxWeight::for_tx(12_000, LOW_FEE_THRESHOLD);
        assert_eq!(paying.cost, 12_000);
        assert_eq!(paying.eviction_weight, 12_000);
    }

    #[test]
    fn no_drop_under_capacity() {
        let mut tree = WeightedTxTree::new(100_000);
        let mut rng = StdRng::seed_from_u64(1);
        tree.add(id(1), TxWeight::new(50_000, 50_000));
        assert_eq!(tree.total_cost(), 50_000);
        assert_eq!(tree.maybe_drop_random(&mut rng), None);
    }

    #[test]
    fn drops_until_under_capacity() {
        let mut tree = WeightedTxTree::new(10_000);
        let mut rng = StdRng::seed_from_u64(7);
        for byte in 0..10u8 {
            tree.add(id(byte), TxWeight::new(4_000, 4_000));
        }
        let mut dropped = Vec::new();
        while let Some(victim) = tree.maybe_drop_random(&mut rng) {
            assert!(!dropped.contains(&victim));
            dropped.push(victim);
        }
        assert!(tree.total_cost() <= 10_000);
        assert_eq!(tree.len(), 10 - dropped.len());
    }

    #[test]
    fn remove_keeps_sums_consistent() {
        let mut tree = WeightedTxTree::new(0);
        for byte in 0..20u8 {
            tree.add(id(byte), TxWeight::new(i64::from(byte) + 1, i64::from(byte) + 1));
        }
        let full: i64 = (1..=20).sum();
        assert_eq!(tree.total_cost(), full);

        // Remove interior, head and tail positions.
        for byte in [5u8, 0, 19] {
            tree.remove(&id(byte));
        }
        assert_eq!(tree.total_cost(), full - 6 - 1 - 20);
        tree.remove(&id(5));
        assert_eq!(tree.len(), 17);
    }

    #[test]
    fn draw_is_proportional_to_eviction_weight() {
        // One id carries 3/4 of the total weight; its empirical eviction
        // frequency over independent trials must converge accordingly.
        let trials = 4_000u64;
        let mut heavy_wins = 0u64;
        for seed in 0..trials {
            let mut tree = WeightedTxTree::new(0);
            tree.add(id(1), TxWeight::new(30_000, 30_000));
            tree.add(id(2), TxWeight::new(5_000, 5_000));
            tree.add(id(3), TxWeight::new(5_000, 5_000));
            let mut rng = StdRng::seed_from_u64(seed);
            if tree.maybe_drop_random(&mut rng) == Some(id(1)) {
                heavy_wins += 1;
            }
        }
        let frequency = heavy_wins as f64 / trials as f64;
        assert!((frequency - 0.75).abs() < 0.03, "frequency was {frequency}");
    }

    #[test]
    fn eviction_memory_expires() {
        let mut list = RecentlyEvictedList::new(100);
        list.add(id(1), 1_000);
        assert!(list.contains(&id(1), 1_050));
        assert!(list.contains(&id(1), 1_099));
        assert!(!list.contains(&id(1), 1_100));
    }

    #[test]
    fn eviction_memory_is_bounded() {
        let mut list = RecentlyEvictedList::new(1_000_000);
        for n in 0..EVICTION_MEMORY_ENTRIES as u32 + 10 {
            let mut bytes = [0u8; 32];
            bytes[..4].copy_from_slice(&n.to_le_bytes());
            list.add(TxId(bytes), 0);
        }
        // The first ten fell off the front.
        assert!(!list.contains(&TxId({
            let mut bytes = [0u8; 32];
            bytes[..4].copy_from_slice(&0u32.to_le_bytes());
            bytes
        }), 0));
        assert_eq!(list.queue.len(), EVICTION_MEMORY_ENTRIES);
    }
}
