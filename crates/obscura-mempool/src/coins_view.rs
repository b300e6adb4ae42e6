//! Read-through coins view that shadows a base UTXO store with pool contents.

use crate::MemPool;

use obscura_primitives::coins::{Coins, CoinsView};
use obscura_primitives::{Anchor, IncrementalMerkleTree, Nullifier, ShieldedProtocol, TxId, MEMPOOL_HEIGHT};

/// A [`CoinsView`] in which unconfirmed outputs exist at [`MEMPOOL_HEIGHT`].
///
/// Pool entries take precedence over the base: they can never conflict with
/// it, and they are whole transactions, so they cannot be pruned. Checking the
/// base first could return a pruned record instead.
pub struct CoinsViewMemPool<'a> {
    base: &'a dyn CoinsView,
    mempool: &'a MemPool,
}

impl<'a> CoinsViewMemPool<'a> {
    pub fn new(base: &'a dyn CoinsView, mempool: &'a MemPool) -> Self {
        Self { base, mempool }
    }
}

impl CoinsView for CoinsViewMemPool<'_> {
    fn get_coins(&self, txid: &TxId) -> Option<Coins> {
        if let Some(tx) = self.mempool.get(txid) {
            return Some(Coins::from_tx(&tx, MEMPOOL_HEIGHT));
        }
        self.base.get_coins(txid).filter(|coins| !coins.is_pruned())
    }

    fn have_coins(&self, txid: &TxId) -> bool {
        self.mempool.exists(txid) || self.base.have_coins(txid)
    }

    fn get_nullifier(&self, nullifier: &Nullifier, protocol: ShieldedProtocol) -> bool {
        self.mempool.nullifier_exists(nullifier, protocol)
            || self.base.get_nullifier(nullifier, protocol)
    }

    fn sprout_anchor_at(&self, root: &Anchor) -> Option<IncrementalMerkleTree> {
        self.base.sprout_anchor_at(root)
    }

    fn sapling_anchor_exists(&self, root: &Anchor) -> bool {
        self.base.sapling_anchor_exists(root)
    }

    fn best_height(&self) -> u32 {
        self.base.best_height()
    }
}
