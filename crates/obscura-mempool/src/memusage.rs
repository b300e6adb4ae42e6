//! Rough dynamic-memory accounting for the pool's containers.
//!
//! These are estimates in the same spirit as the allocator-overhead tables
//! other nodes ship: close enough to drive the size limit, not an exact
//! measurement.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::mem;

/// Allocator granularity assumed for small heap blocks.
const MALLOC_ALIGNMENT: usize = 16;

/// Usable size an allocation of `bytes` actually occupies.
pub fn malloc_usage(bytes: usize) -> usize {
    if bytes == 0 {
        return 0;
    }
    (bytes + MALLOC_ALIGNMENT - 1) / MALLOC_ALIGNMENT * MALLOC_ALIGNMENT
}

pub fn hash_map_usage<K, V>(map: &HashMap<K, V>) -> usize {
    // Control bytes plus the key/value slots, at the table's capacity.
    malloc_usage(map.capacity() * (mem::size_of::<K>() + mem::size_of::<V>() + 1))
}

pub fn hash_set_usage<K>(set: &HashSet<K>) -> usize {
    malloc_usage(set.capacity() * (mem::size_of::<K>() + 1))
}

pub fn btree_map_usage<K, V>(map: &BTreeMap<K, V>) -> usize {
    // B-tree nodes amortise to roughly the payload plus two words of
    // per-element structure.
    map.len() * malloc_usage(mem::size_of::<K>() + mem::size_of::<V>() + 2 * mem::size_of::<usize>())
}
