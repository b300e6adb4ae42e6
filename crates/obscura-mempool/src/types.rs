//! Core type definitions for the pool.

use obscura_primitives::{Amount, Transaction};

use std::sync::Arc;

/// Fee rate in zatoshis per kilobyte of serialized transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct FeeRate(Amount);

impl FeeRate {
    pub fn from_zat_per_kb(zat_per_kb: Amount) -> Self {
        Self(zat_per_kb)
    }

    /// Rate implied by paying `fee` for `size` serialized bytes.
    pub fn new(fee: Amount, size: usize) -> Self {
        if size == 0 {
            return Self(Amount::ZERO);
        }
        Self(Amount::from_zat(fee.zat() * 1000 / size as i64))
    }

    pub fn zat_per_kb(&self) -> Amount {
        self.0
    }

    /// Fee this rate charges for `size` bytes.
    pub fn fee_for(&self, size: usize) -> Amount {
        Amount::from_zat(self.0.zat() * size as i64 / 1000)
    }
}

impl std::fmt::Display for FeeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/kB", self.0)
    }
}

/// Snapshot of one pool member returned by the info queries.
#[derive(Debug, Clone)]
pub struct TxMempoolInfo {
    pub tx: Arc<Transaction>,
    /// Admission time in seconds since the epoch.
    pub time: i64,
    /// Fee rate at the base fee, deltas excluded.
    pub fee_rate: FeeRate,
}
