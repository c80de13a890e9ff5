//! Stabilization: re-replicating the local shard after membership churn.

use std::net::SocketAddr;

use super::ledger::OpKind;
use super::messages::{KvMsg, ReplicaRole};
use super::KvNode;
use crate::utils::RingKvError;

// KvNode stabilization protocol
impl KvNode {
    /// Runs after a ring-cardinality change: compares my expected
    /// successor pair against the actual one on the new ring and
    /// re-replicates the full local shard to whichever successors are
    /// newly assigned, so every key keeps 3 live copies.
    pub(super) fn stabilize(&mut self) -> Result<(), RingKvError> {
        self.ring_size = self.ring.len();
        if self.ring.len() < 3 {
            pf_warn!(
                "ring shrunk to {} members, skipping stabilization",
                self.ring.len()
            );
            return Ok(());
        }

        let (actual1, actual2) = self.ring.successors_of(self.addr)?;
        let expected1 = self.has_my_replicas[0].addr;
        let expected2 = self.has_my_replicas[1].addr;

        if expected1 == actual1.addr && expected2 == actual2.addr {
            return Ok(());
        }

        if expected1 == actual1.addr || expected2 == actual1.addr {
            // either only the second successor was replaced, or the first
            // failed and the old second slid into its place; in both
            // cases the new second successor is the only one missing my
            // shard
            pf_debug!("re-replicating shard to new successor {}", actual2.addr);
            self.replicate_shard_to(&[actual2.addr])?;
        } else {
            // both previous successors are gone
            pf_debug!(
                "re-replicating shard to new successors {} and {}",
                actual1.addr,
                actual2.addr
            );
            self.replicate_shard_to(&[actual1.addr, actual2.addr])?;
        }

        self.has_my_replicas = vec![actual1, actual2];
        Ok(())
    }

    /// Resends every locally held key-value pair as a SECONDARY-tagged
    /// CREATE to each target, all under one fresh burst transaction id.
    /// Bursts register no pending record, so any acks they trigger are
    /// discarded by the reply handler.
    fn replicate_shard_to(
        &mut self,
        targets: &[SocketAddr],
    ) -> Result<(), RingKvError> {
        let xid = self.xids.next(OpKind::Create);
        let shard: Vec<(String, String)> = self
            .store
            .entries()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in shard {
            let msg = KvMsg::Create {
                xid,
                from: self.addr,
                key,
                value,
                role: ReplicaRole::Secondary,
            };
            let payload = msg.to_bytes()?;
            for &target in targets {
                self.transport.send(self.addr, target, payload.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod stabilize_tests {
    use super::*;
    use crate::external::{MemNet, MemObserver};
    use crate::node::NodeConfig;
    use crate::ring::{Ring, RingMember};
    use std::collections::HashSet;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn member(port: u16, pos: u64) -> RingMember {
        RingMember {
            addr: addr(port),
            pos,
        }
    }

    /// Node A at position 10 holding two keys, expecting successors B, C.
    fn primed_node(net: &MemNet) -> KvNode {
        let mut node = KvNode::new(
            addr(1),
            NodeConfig::default(),
            Box::new(net.clone()),
            Box::new(MemObserver::default()),
        );
        node.store.create("k1", "v1");
        node.store.create("k2", "v2");
        node.has_my_replicas = vec![member(2, 20), member(3, 30)];
        node.ring_size = 5;
        node
    }

    fn burst_keys(net: &MemNet, to: SocketAddr) -> HashSet<(String, String)> {
        net.drain(to)
            .iter()
            .map(|raw| match KvMsg::from_bytes(raw) {
                Ok(KvMsg::Create {
                    key,
                    value,
                    role: ReplicaRole::Secondary,
                    ..
                }) => (key, value),
                other => panic!("unexpected burst message {:?}", other),
            })
            .collect()
    }

    #[test]
    fn second_successor_replaced() -> Result<(), RingKvError> {
        let net = MemNet::new();
        let mut node = primed_node(&net);
        // C failed: ring is now A, B, D, E
        node.ring = Ring::from_members(
            vec![
                member(1, 10),
                member(2, 20),
                member(4, 40),
                member(5, 50),
            ],
            512,
        );
        node.stabilize()?;

        let keys = burst_keys(&net, addr(4));
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&("k1".into(), "v1".into())));
        assert_eq!(net.pending(addr(2)), 0);
        assert_eq!(
            node.has_my_replicas,
            vec![member(2, 20), member(4, 40)]
        );
        Ok(())
    }

    #[test]
    fn first_failed_second_slides_up() -> Result<(), RingKvError> {
        let net = MemNet::new();
        let mut node = primed_node(&net);
        // B failed: actual successors become C, D; C already holds the
        // shard from its time as second successor
        node.ring = Ring::from_members(
            vec![
                member(1, 10),
                member(3, 30),
                member(4, 40),
                member(5, 50),
            ],
            512,
        );
        node.stabilize()?;

        assert_eq!(net.pending(addr(3)), 0);
        let keys = burst_keys(&net, addr(4));
        assert_eq!(keys.len(), 2);
        assert_eq!(
            node.has_my_replicas,
            vec![member(3, 30), member(4, 40)]
        );
        Ok(())
    }

    #[test]
    fn both_successors_failed() -> Result<(), RingKvError> {
        let net = MemNet::new();
        let mut node = primed_node(&net);
        // B and C both failed: actual successors are D, E
        node.ring = Ring::from_members(
            vec![member(1, 10), member(4, 40), member(5, 50)],
            512,
        );
        node.stabilize()?;

        assert_eq!(burst_keys(&net, addr(4)).len(), 2);
        assert_eq!(burst_keys(&net, addr(5)).len(), 2);
        assert_eq!(
            node.has_my_replicas,
            vec![member(4, 40), member(5, 50)]
        );
        Ok(())
    }

    #[test]
    fn unchanged_successors_do_nothing() -> Result<(), RingKvError> {
        let net = MemNet::new();
        let mut node = primed_node(&net);
        // a joiner behind me does not touch my successor pair
        node.ring = Ring::from_members(
            vec![
                member(1, 10),
                member(2, 20),
                member(3, 30),
                member(6, 60),
            ],
            512,
        );
        node.stabilize()?;

        for port in [2, 3, 6] {
            assert_eq!(net.pending(addr(port)), 0);
        }
        assert_eq!(
            node.has_my_replicas,
            vec![member(2, 20), member(3, 30)]
        );
        Ok(())
    }

    #[test]
    fn burst_shares_one_transaction_id() -> Result<(), RingKvError> {
        let net = MemNet::new();
        let mut node = primed_node(&net);
        node.ring = Ring::from_members(
            vec![member(1, 10), member(4, 40), member(5, 50)],
            512,
        );
        node.stabilize()?;

        let xids: HashSet<u64> = net
            .drain(addr(4))
            .iter()
            .map(|raw| match KvMsg::from_bytes(raw) {
                Ok(KvMsg::Create { xid, .. }) => xid,
                other => panic!("unexpected burst message {:?}", other),
            })
            .collect();
        assert_eq!(xids.len(), 1);
        let xid = *xids.iter().next().unwrap();
        assert_eq!(OpKind::of_xid(xid), Some(OpKind::Create));
        Ok(())
    }
}
