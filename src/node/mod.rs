//! Replicated ring KV node: per-node actor state and ring maintenance.

mod ledger;
mod messages;
mod request;
mod stabilize;
mod storage;

pub use ledger::{OpKind, Tick, Xid, QUORUM_NEEDED};
pub use messages::{KvMsg, ReplicaRole};
pub use storage::LocalStore;

use std::collections::VecDeque;
use std::net::SocketAddr;

use crate::external::{OpObserver, Transport};
use crate::ring::{Ring, RingMember};
use crate::utils::RingKvError;

use ledger::{QuorumLedger, XidGen};

use serde::Deserialize;

/// Configuration parameters struct.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Size of the consistent-hash coordinate space.
    pub ring_space: u64,

    /// Logical ticks after which a pending transaction is abandoned.
    pub reply_timeout: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            ring_space: 512,
            reply_timeout: 10,
        }
    }
}

impl NodeConfig {
    /// Parses a config from an optional TOML string over defaults.
    pub fn from_toml(config_str: Option<&str>) -> Result<Self, RingKvError> {
        let config = parsed_config!(config_str => NodeConfig;
                                    ring_space, reply_timeout)?;
        if config.ring_space == 0 {
            return logged_err!(
                "invalid config.ring_space '{}'",
                config.ring_space
            );
        }
        Ok(config)
    }
}

/// One key-value store node participating in the ring. Owns exclusive,
/// non-shared state, reachable only through its inbound queue and the
/// client-side CRUD APIs. Single-threaded run-to-completion: an external
/// driver pushes raw inbound payloads with `enqueue()` and calls
/// `check_messages()` once per scheduling tick.
pub struct KvNode {
    /// My own address.
    addr: SocketAddr,

    /// Configuration parameters struct.
    config: NodeConfig,

    /// Current ring snapshot.
    ring: Ring,

    /// Ring cardinality as of the last build or stabilization; a
    /// cardinality delta on refresh is the topology-change trigger.
    ring_size: usize,

    /// My two current ring successors, i.e. the nodes expected to hold
    /// replicas of my shard.
    has_my_replicas: Vec<RingMember>,

    /// Local shard.
    store: LocalStore,

    /// Pending-transaction quorum tables.
    ledger: QuorumLedger,

    /// Transaction-id generator.
    xids: XidGen,

    /// Inbound message queue, drained to empty per tick.
    inbox: VecDeque<Vec<u8>>,

    /// Fire-and-forget outbound transport.
    transport: Box<dyn Transport>,

    /// Per-operation outcome log sink.
    observer: Box<dyn OpObserver>,
}

impl KvNode {
    /// Creates a new node with an empty shard and no ring yet.
    pub fn new(
        addr: SocketAddr,
        config: NodeConfig,
        transport: Box<dyn Transport>,
        observer: Box<dyn OpObserver>,
    ) -> Self {
        KvNode {
            addr,
            config,
            ring: Ring::default(),
            ring_size: 0,
            has_my_replicas: Vec::new(),
            store: LocalStore::new(),
            ledger: QuorumLedger::new(),
            xids: XidGen::new(),
            inbox: VecDeque::new(),
            transport,
            observer,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of key-value pairs held in the local shard.
    pub fn shard_len(&self) -> usize {
        self.store.len()
    }

    /// Rebuilds the ring wholesale from a fresh membership snapshot.
    /// Until the node has seen a ring of at least 3 members containing
    /// itself, builds only record state; afterwards, any build whose
    /// cardinality differs from the previous one triggers the
    /// stabilization protocol. Returns whether the topology changed.
    pub fn update_ring(
        &mut self,
        snapshot: &[SocketAddr],
    ) -> Result<bool, RingKvError> {
        self.ring = Ring::build(snapshot, self.config.ring_space);

        if self.has_my_replicas.is_empty() {
            // initial setup: remember who should hold my replicas
            if self.ring.len() >= 3 && self.ring.position_of(self.addr).is_some()
            {
                let (succ1, succ2) = self.ring.successors_of(self.addr)?;
                self.has_my_replicas = vec![succ1, succ2];
            }
            self.ring_size = self.ring.len();
            return Ok(false);
        }

        let changed = self.ring.len() != self.ring_size;
        if changed {
            self.stabilize()?;
        }
        Ok(changed)
    }

    /// Pushes one raw inbound payload onto the node's queue. Called by
    /// the external transport driver; processed on the next tick.
    pub fn enqueue(&mut self, raw: Vec<u8>) {
        self.inbox.push_back(raw);
    }
}

#[cfg(test)]
mod node_tests {
    use super::*;
    use crate::external::{MemNet, MemObserver};

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn test_node(port: u16) -> KvNode {
        KvNode::new(
            addr(port),
            NodeConfig::default(),
            Box::new(MemNet::new()),
            Box::new(MemObserver::default()),
        )
    }

    #[test]
    fn config_from_toml_str() -> Result<(), RingKvError> {
        let config = NodeConfig::from_toml(Some("reply_timeout = 5"))?;
        assert_eq!(config.reply_timeout, 5);
        assert_eq!(config.ring_space, 512);
        assert!(NodeConfig::from_toml(Some("ring_space = 0")).is_err());
        assert!(NodeConfig::from_toml(Some("bogus = 1")).is_err());
        Ok(())
    }

    #[test]
    fn first_build_records_successors() -> Result<(), RingKvError> {
        let mut node = test_node(7001);
        let snapshot: Vec<SocketAddr> =
            (1..=5).map(|p| addr(7000 + p)).collect();
        assert!(!node.update_ring(&snapshot)?);
        assert_eq!(node.has_my_replicas.len(), 2);
        let (succ1, succ2) = node.ring.successors_of(node.addr)?;
        assert_eq!(node.has_my_replicas, vec![succ1, succ2]);
        Ok(())
    }

    #[test]
    fn change_detection_by_cardinality_only() -> Result<(), RingKvError> {
        let mut node = test_node(7001);
        let five: Vec<SocketAddr> = (1..=5).map(|p| addr(7000 + p)).collect();
        node.update_ring(&five)?;

        // same count, different membership: not treated as a change
        let mut churned = five.clone();
        churned[4] = addr(7009);
        assert!(!node.update_ring(&churned)?);

        // count delta: change detected
        assert!(node.update_ring(&five[..4].to_vec())?);
        Ok(())
    }
}
