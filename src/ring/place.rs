//! Consistent-hash placement of keys onto the ring.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::{Ring, RingMember};

/// Hashes a string key to its position in a ring coordinate space of the
/// given size. Stable within one process, which is all placement needs:
/// lookups always go through a ring snapshot local to this node.
pub fn hash_key(key: &str, ring_space: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish() % ring_space
}

// Ring replica-set resolution
impl Ring {
    /// Resolves the replica set of a key: the first member whose position
    /// is >= the key's position (wrapping to the ring head when the key
    /// hashes past the last member), followed by its two ring successors.
    /// Returns an empty vector when the ring has fewer than 3 members;
    /// callers must treat that as "operation cannot currently be served".
    pub fn find_nodes(&self, key: &str) -> Vec<RingMember> {
        if self.members.len() < 3 {
            return Vec::new();
        }
        self.replicas_for_pos(hash_key(key, self.space))
    }

    /// Replica set for an explicit ring position.
    pub(crate) fn replicas_for_pos(&self, pos: u64) -> Vec<RingMember> {
        let n = self.members.len();
        if n < 3 {
            return Vec::new();
        }
        // if pos falls at or before the head, or past the tail, the
        // primary wraps to the ring head
        let head = if pos <= self.members[0].pos
            || pos > self.members[n - 1].pos
        {
            0
        } else {
            (1..n)
                .find(|&i| pos <= self.members[i].pos)
                .unwrap_or(0)
        };
        (0..3)
            .map(|step| self.members[(head + step) % n].clone())
            .collect()
    }
}
