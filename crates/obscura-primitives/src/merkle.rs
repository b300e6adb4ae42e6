//! Append-only note-commitment tree.
//!
//! Stores only the left/right frontier and one optional node per level, the
//! standard incremental representation. The integrity checker uses it to chain
//! the intermediate roots of consecutive joinsplits inside one transaction.

use crate::Anchor;

use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Depth of the Sprout note-commitment tree.
const TREE_DEPTH: usize = 29;

fn combine(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Root of an empty subtree at each level. Level 0 is the uncommitted leaf.
fn empty_root(level: usize) -> [u8; 32] {
    static ROOTS: OnceLock<Vec<[u8; 32]>> = OnceLock::new();
    ROOTS.get_or_init(|| {
        let mut roots = vec![[0u8; 32]];
        for level in 1..=TREE_DEPTH {
            let below = roots[level - 1];
            roots.push(combine(&below, &below));
        }
        roots
    })[level]
}

#[derive(Debug, Clone, Default)]
pub struct IncrementalMerkleTree {
    left: Option<[u8; 32]>,
    right: Option<[u8; 32]>,
    // parents[i] is the root of a completed subtree at level i + 1, pending a
    // right sibling.
    parents: Vec<Option<[u8; 32]>>,
}

impl IncrementalMerkleTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, commitment: [u8; 32]) {
        if self.left.is_none() {
            self.left = Some(commitment);
            return;
        }
        if self.right.is_none() {
            self.right = Some(commitment);
            return;
        }

        // Leaf pair is full: carry its root upward and restart the frontier.
        let mut carry = combine(&self.left.take().unwrap(), &self.right.take().unwrap());
        self.left = Some(commitment);

        for parent in self.parents.iter_mut() {
            match parent.take() {
                Some(sibling) => carry = combine(&sibling, &carry),
                None => {
                    *parent = Some(carry);
                    return;
                }
            }
        }
        assert!(self.parents.len() < TREE_DEPTH - 1, "note-commitment tree is full");
        self.parents.push(Some(carry));
    }

    pub fn root(&self) -> Anchor {
        let left = self.left.unwrap_or_else(|| empty_root(0));
        let right = self.right.unwrap_or_else(|| empty_root(0));
        let mut root = combine(&left, &right);
        for (level, parent) in self.parents.iter().enumerate() {
            root = match parent {
                Some(sibling) => combine(sibling, &root),
                None => combine(&root, &empty_root(level + 1)),
            };
        }
        for level in self.parents.len() + 1..TREE_DEPTH {
            root = combine(&root, &empty_root(level));
        }
        Anchor(root)
    }
}
