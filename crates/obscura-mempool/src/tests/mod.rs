//! Shared fixtures: a deterministic coins view, a fluent transaction builder
//! and a recording estimator.


use crate::{FeeEstimator, FeeRate, MemPool, MempoolEntry, MempoolOptions};

use obscura_primitives::coins::{Coins, CoinsView};
use obscura_primitives::{
    Amount, Anchor, IncrementalMerkleTree, JoinSplit, Nullifier, OrchardBundle, OutPoint,
    SaplingSpend, Script, ShieldedProtocol, Transaction, TxId, TxIn, TxOut,
};

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

/// Consensus branch id used by fixtures unless a test overrides it.
pub const TEST_BRANCH_ID: u32 = 0x76b8_09bb;

#[derive(Default)]
pub struct MockCoinsView {
    pub coins: HashMap<TxId, Coins>,
    pub sprout_anchors: HashMap<Anchor, IncrementalMerkleTree>,
    pub sapling_anchors: HashSet<Anchor>,
    pub sprout_nullifiers: HashSet<Nullifier>,
    pub sapling_nullifiers: HashSet<Nullifier>,
    pub orchard_nullifiers: HashSet<Nullifier>,
    pub height: u32,
}

impl MockCoinsView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a funding transaction with one plain output per value.
    pub fn fund(&mut self, txid: TxId, values: &[i64]) {
        self.fund_at(txid, values, 1, false);
    }

    pub fn fund_at(&mut self, txid: TxId, values: &[i64], height: u32, is_coinbase: bool) {
        self.coins.insert(
            txid,
            Coins {
                outputs: values
                    .iter()
                    .map(|&value| {
                        Some(TxOut {
                            value: Amount::from_zat(value),
                            script_pubkey: Script::default(),
                        })
                    })
                    .collect(),
                height,
                is_coinbase,
            },
        );
    }

    /// Register an empty Sprout tree and return its anchor.
    pub fn add_sprout_anchor(&mut self) -> Anchor {
        let tree = IncrementalMerkleTree::new();
        let root = tree.root();
        self.sprout_anchors.insert(root, tree);
        root
    }
}

impl CoinsView for MockCoinsView {
    fn get_coins(&self, txid: &TxId) -> Option<Coins> {
        self.coins.get(txid).cloned()
    }

    fn get_nullifier(&self, nullifier: &Nullifier, protocol: ShieldedProtocol) -> bool {
        match protocol {
            ShieldedProtocol::Sprout => self.sprout_nullifiers.contains(nullifier),
            ShieldedProtocol::Sapling => self.sapling_nullifiers.contains(nullifier),
            ShieldedProtocol::Orchard => self.orchard_nullifiers.contains(nullifier),
        }
    }

    fn sprout_anchor_at(&self, root: &Anchor) -> Option<IncrementalMerkleTree> {
        self.sprout_anchors.get(root).cloned()
    }

    fn sapling_anchor_exists(&self, root: &Anchor) -> bool {
        self.sapling_anchors.contains(root)
    }

    fn best_height(&self) -> u32 {
        self.height
    }
}

/// Everything the pool told the estimator, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EstimatorEvent {
    Processed(TxId),
    Removed(TxId),
    Block { height: u32, entries: usize },
}

pub struct RecordingEstimator {
    pub events: Arc<Mutex<Vec<EstimatorEvent>>>,
    pub state: Vec<u8>,
}

impl RecordingEstimator {
    pub fn new() -> (Self, Arc<Mutex<Vec<EstimatorEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                events: Arc::clone(&events),
                state: vec![0xe5],
            },
            events,
        )
    }
}

impl FeeEstimator for RecordingEstimator {
    fn process_transaction(&mut self, entry: &MempoolEntry, _current_estimate: bool) {
        self.events
            .lock()
            .unwrap()
            .push(EstimatorEvent::Processed(entry.txid()));
    }

    fn process_block(&mut self, height: u32, entries: &[MempoolEntry], _current_estimate: bool) {
        self.events.lock().unwrap().push(EstimatorEvent::Block {
            height,
            entries: entries.len(),
        });
    }

    fn remove_tx(&mut self, txid: &TxId) {
        self.events
            .lock()
            .unwrap()
            .push(EstimatorEvent::Removed(*txid));
    }

    fn estimate_fee(&self, blocks: usize) -> FeeRate {
        FeeRate::from_zat_per_kb(Amount::from_zat(1_000 * blocks as i64))
    }

    fn estimate_priority(&self, blocks: usize) -> f64 {
        blocks as f64
    }

    fn write(&self, out: &mut dyn Write) -> std::io::Result<()> {
        out.write_all(&[self.state.len() as u8])?;
        out.write_all(&self.state)
    }

    fn read(&mut self, input: &mut dyn Read) -> std::io::Result<()> {
        let mut len = [0u8; 1];
        input.read_exact(&mut len)?;
        let mut state = vec![0u8; len[0] as usize];
        input.read_exact(&mut state)?;
        self.state = state;
        Ok(())
    }
}

pub fn test_pool() -> (MemPool, Arc<Mutex<Vec<EstimatorEvent>>>) {
    test_pool_with(MempoolOptions::default())
}

pub fn test_pool_with(options: MempoolOptions) -> (MemPool, Arc<Mutex<Vec<EstimatorEvent>>>) {
    let (estimator, events) = RecordingEstimator::new();
    (MemPool::new(options, Box::new(estimator)), events)
}

/// Fluent transaction builder.
#[derive(Default)]
pub struct TxBuilder {
    tx: Transaction,
}

impl TxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, outpoint: OutPoint) -> Self {
        self.tx.inputs.push(TxIn {
            prevout: outpoint,
            script_sig: Script::default(),
            sequence: u32::MAX,
        });
        self
    }

    pub fn input_with_script(mut self, outpoint: OutPoint, script_len: usize) -> Self {
        self.tx.inputs.push(TxIn {
            prevout: outpoint,
            script_sig: Script::new(vec![0x51; script_len]),
            sequence: u32::MAX,
        });
        self
    }

    pub fn sequence(mut self, sequence: u32) -> Self {
        self.tx
            .inputs
            .last_mut()
            .expect("sequence applies to the last input")
            .sequence = sequence;
        self
    }

    pub fn output(mut self, value: i64) -> Self {
        self.tx.outputs.push(TxOut {
            value: Amount::from_zat(value),
            script_pubkey: Script::default(),
        });
        self
    }

    pub fn output_to(mut self, value: i64, script: Script) -> Self {
        self.tx.outputs.push(TxOut {
            value: Amount::from_zat(value),
            script_pubkey: script,
        });
        self
    }

    pub fn joinsplit(mut self, anchor: Anchor, nullifiers: &[Nullifier]) -> Self {
        self.tx.joinsplits.push(JoinSplit {
            anchor,
            nullifiers: nullifiers.to_vec(),
            commitments: Vec::new(),
        });
        self
    }

    pub fn joinsplit_with_commitments(
        mut self,
        anchor: Anchor,
        nullifiers: &[Nullifier],
        commitments: &[[u8; 32]],
    ) -> Self {
        self.tx.joinsplits.push(JoinSplit {
            anchor,
            nullifiers: nullifiers.to_vec(),
            commitments: commitments.to_vec(),
        });
        self
    }

    pub fn sapling_spend(mut self, anchor: Anchor, nullifier: Nullifier) -> Self {
        self.tx.sapling_spends.push(SaplingSpend { anchor, nullifier });
        self
    }

    pub fn orchard(mut self, anchor: Anchor, nullifiers: &[Nullifier]) -> Self {
        self.tx.orchard = Some(OrchardBundle {
            anchor,
            nullifiers: nullifiers.to_vec(),
        });
        self
    }

    pub fn lock_time(mut self, lock_time: u32) -> Self {
        self.tx.lock_time = lock_time;
        self
    }

    pub fn expiry_height(mut self, expiry_height: u32) -> Self {
        self.tx.expiry_height = expiry_height;
        self
    }

    pub fn build(self) -> Transaction {
        self.tx
    }
}

/// A pool entry for `tx` with the given fee and otherwise neutral metadata.
pub fn entry_for(tx: &Transaction, fee: i64) -> MempoolEntry {
    entry_at_height(tx, fee, 100)
}

pub fn entry_at_height(tx: &Transaction, fee: i64, height: u32) -> MempoolEntry {
    MempoolEntry::new(
        Arc::new(tx.clone()),
        Amount::from_zat(fee),
        0,
        0.0,
        height,
        true,
        false,
        1,
        TEST_BRANCH_ID,
    )
}

pub fn coinbase_spend_entry(tx: &Transaction, fee: i64, height: u32) -> MempoolEntry {
    MempoolEntry::new(
        Arc::new(tx.clone()),
        Amount::from_zat(fee),
        0,
        0.0,
        height,
        true,
        true,
        1,
        TEST_BRANCH_ID,
    )
}

pub fn txid(byte: u8) -> TxId {
    TxId([byte; 32])
}

pub fn nullifier(byte: u8) -> Nullifier {
    Nullifier([byte; 32])
}

#[track_caller]
pub fn assert_in_pool(pool: &MemPool, txid: &TxId) {
    assert!(pool.exists(txid), "expected {txid} to be in the pool");
}

#[track_caller]
pub fn assert_not_in_pool(pool: &MemPool, txid: &TxId) {
    assert!(!pool.exists(txid), "expected {txid} to NOT be in the pool");
}

#[track_caller]
pub fn assert_pool_size(pool: &MemPool, expected: usize) {
    assert_eq!(pool.size(), expected, "unexpected pool size");
}

/// The weighted tree tracks exactly the pool's members.
#[track_caller]
pub fn assert_tree_matches_pool(pool: &MemPool) {
    let inner = pool.inner.read().unwrap();
    assert_eq!(inner.weighted_tree.len(), inner.arena.len());
    for entry in inner.arena.iter() {
        assert!(inner.weighted_tree.contains(&entry.txid()));
    }
}

/// Run the integrity checker unconditionally.
pub fn run_check(pool: &MemPool, view: &MockCoinsView) {
    pool.inner.read().unwrap().check(view);
}
