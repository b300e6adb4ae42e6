//! Thin consensus predicates.
//!
//! The pool treats these as external collaborators: it calls them but never
//! reimplements their policy. Script and proof verification live elsewhere
//! entirely.

use crate::coins::CoinsCache;
use crate::{Amount, Transaction, COINBASE_MATURITY};

/// Lock times below this threshold are block heights, above it unix times.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Inputs with this sequence opt out of lock-time enforcement.
pub const SEQUENCE_FINAL: u32 = u32::MAX;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TxError {
    #[error("input {index} spends a missing or already spent output")]
    MissingInputs { index: usize },

    #[error("input {index} spends an immature coinbase (depth {depth})")]
    ImmatureCoinbase { index: usize, depth: i64 },

    #[error("transparent value in below value out")]
    ValueInBelowValueOut,
}

/// Whether `tx` is final for a block at `height` whose lock-time cutoff is
/// `cutoff_time`.
pub fn is_final_tx(tx: &Transaction, height: u32, cutoff_time: i64) -> bool {
    if tx.lock_time == 0 {
        return true;
    }
    let threshold = if tx.lock_time < LOCKTIME_THRESHOLD {
        i64::from(height)
    } else {
        cutoff_time
    };
    if i64::from(tx.lock_time) < threshold {
        return true;
    }
    tx.inputs.iter().all(|input| input.sequence == SEQUENCE_FINAL)
}

/// Whether `tx` can no longer be mined at `height`.
pub fn is_expired_tx(tx: &Transaction, height: u32) -> bool {
    if tx.expiry_height == 0 || tx.is_coinbase() {
        return false;
    }
    height > tx.expiry_height
}

/// Check `tx`'s transparent inputs against `view` for a spend at
/// `spend_height`: every input must resolve to an available output, coinbase
/// outputs must be mature, and for fully transparent transactions the input
/// value must cover the output value.
pub fn check_tx_inputs(
    tx: &Transaction,
    view: &CoinsCache<'_>,
    spend_height: u32,
) -> Result<(), TxError> {
    let mut value_in = Amount::ZERO;
    for (index, input) in tx.inputs.iter().enumerate() {
        let coins = view
            .get_coins(&input.prevout.txid)
            .ok_or(TxError::MissingInputs { index })?;
        if !coins.is_available(input.prevout.n) {
            return Err(TxError::MissingInputs { index });
        }
        if coins.is_coinbase {
            let depth = i64::from(spend_height) - i64::from(coins.height);
            if depth < i64::from(COINBASE_MATURITY) {
                return Err(TxError::ImmatureCoinbase { index, depth });
            }
        }
        value_in += coins.outputs[input.prevout.n as usize]
            .as_ref()
            .expect("availability checked above")
            .value;
    }

    // Shielded bundles can carry value into the transparent pool, so the
    // balance rule only binds fully transparent transactions.
    let fully_transparent =
        tx.joinsplits.is_empty() && tx.sapling_spends.is_empty() && tx.orchard.is_none();
    if fully_transparent && value_in < tx.value_out() {
        return Err(TxError::ValueInBelowValueOut);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coins::CoinsView;
    use crate::{
        Anchor, Coins, IncrementalMerkleTree, Nullifier, OutPoint, Script, ShieldedProtocol, TxId,
        TxIn, TxOut,
    };
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapView {
        coins: HashMap<TxId, Coins>,
        height: u32,
    }

    impl CoinsView for MapView {
        fn get_coins(&self, txid: &TxId) -> Option<Coins> {
            self.coins.get(txid).cloned()
        }

        fn get_nullifier(&self, _nf: &Nullifier, _protocol: ShieldedProtocol) -> bool {
            false
        }

        fn sprout_anchor_at(&self, _root: &Anchor) -> Option<IncrementalMerkleTree> {
            None
        }

        fn sapling_anchor_exists(&self, _root: &Anchor) -> bool {
            false
        }

        fn best_height(&self) -> u32 {
            self.height
        }
    }

    fn spend_of(txid: TxId, n: u32, value_out: i64) -> Transaction {
        Transaction {
            inputs: vec![TxIn {
                prevout: OutPoint::new(txid, n),
                script_sig: Script::default(),
                sequence: SEQUENCE_FINAL,
            }],
            outputs: vec![TxOut {
                value: Amount::from_zat(value_out),
                script_pubkey: Script::default(),
            }],
            ..Default::default()
        }
    }

    fn coin(value: i64, height: u32, is_coinbase: bool) -> Coins {
        Coins {
            outputs: vec![Some(TxOut {
                value: Amount::from_zat(value),
                script_pubkey: Script::default(),
            })],
            height,
            is_coinbase,
        }
    }

    #[test]
    fn finality() {
        let mut tx = spend_of(TxId([1; 32]), 0, 50);
        assert!(is_final_tx(&tx, 100, 0));

        tx.lock_time = 200;
        assert!(!is_final_tx(&tx, 100, 0));
        assert!(is_final_tx(&tx, 201, 0));

        // Final sequences override an unreached lock time.
        tx.inputs[0].sequence = SEQUENCE_FINAL;
        assert!(is_final_tx(&tx, 100, 0));

        tx.inputs[0].sequence = 0;
        tx.lock_time = LOCKTIME_THRESHOLD + 500;
        assert!(!is_final_tx(&tx, 100, i64::from(LOCKTIME_THRESHOLD)));
        assert!(is_final_tx(&tx, 100, i64::from(LOCKTIME_THRESHOLD) + 501));
    }

    #[test]
    fn expiry() {
        let mut tx = spend_of(TxId([1; 32]), 0, 50);
        assert!(!is_expired_tx(&tx, 1_000));

        tx.expiry_height = 90;
        assert!(!is_expired_tx(&tx, 90));
        assert!(is_expired_tx(&tx, 91));
    }

    #[test]
    fn input_checks() {
        let parent_id = TxId([9; 32]);
        let mut view = MapView::default();
        view.coins.insert(parent_id, coin(100, 10, false));
        let cache = CoinsCache::new(&view);

        assert_eq!(check_tx_inputs(&spend_of(parent_id, 0, 90), &cache, 200), Ok(()));
        assert_eq!(
            check_tx_inputs(&spend_of(parent_id, 0, 110), &cache, 200),
            Err(TxError::ValueInBelowValueOut)
        );
        assert_eq!(
            check_tx_inputs(&spend_of(TxId([8; 32]), 0, 1), &cache, 200),
            Err(TxError::MissingInputs { index: 0 })
        );
    }

    #[test]
    fn coinbase_maturity_enforced() {
        let coinbase_id = TxId([7; 32]);
        let mut view = MapView::default();
        view.coins.insert(coinbase_id, coin(100, 50, true));
        let cache = CoinsCache::new(&view);

        let spend = spend_of(coinbase_id, 0, 90);
        assert!(matches!(
            check_tx_inputs(&spend, &cache, 50 + COINBASE_MATURITY - 1),
            Err(TxError::ImmatureCoinbase { .. })
        ));
        assert_eq!(check_tx_inputs(&spend, &cache, 50 + COINBASE_MATURITY), Ok(()));
    }

    #[test]
    fn shielded_inflow_relaxes_balance() {
        let mut tx = spend_of(TxId([1; 32]), 0, 50);
        tx.inputs.clear();
        tx.joinsplits.push(crate::JoinSplit {
            anchor: Anchor([0; 32]),
            nullifiers: vec![Nullifier([1; 32])],
            commitments: vec![[2; 32]],
        });
        let view = MapView::default();
        let cache = CoinsCache::new(&view);
        assert_eq!(check_tx_inputs(&tx, &cache, 100), Ok(()));
    }
}
