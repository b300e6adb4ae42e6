use obscura_primitives::Network;

/// Default total-cost ceiling for the pool.
pub const DEFAULT_MEMPOOL_TOTAL_COST_LIMIT: i64 = 80_000_000;

/// Default number of seconds an evicted id is remembered.
pub const DEFAULT_EVICTION_MEMORY_SECONDS: i64 = 60 * 60;

/// Configuration for the transaction pool.
#[derive(Debug, Clone)]
pub struct MempoolOptions {
    /// Network the node runs on; the notification test plumbing asserts
    /// regtest.
    pub network: Network,

    /// Maintain the insight address-delta index.
    pub address_index: bool,

    /// Maintain the insight spent-output index.
    pub spent_index: bool,

    /// Initial weighted-cost ceiling.
    pub total_cost_limit: i64,

    /// Initial recently-evicted retention window in seconds.
    pub eviction_memory_seconds: i64,
}

impl Default for MempoolOptions {
    fn default() -> Self {
        Self {
            network: Network::Main,
            address_index: false,
            spent_index: false,
            total_cost_limit: DEFAULT_MEMPOOL_TOTAL_COST_LIMIT,
            eviction_memory_seconds: DEFAULT_EVICTION_MEMORY_SECONDS,
        }
    }
}
