//! RingKv -- replicated ring key-value store node core structures.
//!
//! Each node owns a shard of the keyspace under consistent hashing over a
//! dynamic membership ring, replicates every key to its two ring
//! successors, and reaches per-operation consistency via 2-of-3 quorums.
//! Membership, transport, and audit logging are external collaborators;
//! nodes are single-threaded actors driven by an outside scheduling tick.

#[macro_use]
pub mod utils;

pub mod external;
pub mod node;
pub mod ring;

pub use crate::external::{
    LogObserver, MemNet, MemObserver, OpEvent, OpObserver, Transport,
};
pub use crate::node::{
    KvMsg, KvNode, LocalStore, NodeConfig, OpKind, ReplicaRole, Tick, Xid,
};
pub use crate::ring::{hash_key, Ring, RingMember};
pub use crate::utils::print::{logger_init, ME};
pub use crate::utils::RingKvError;
