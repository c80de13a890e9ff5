//! KvNode client-side (coordinator) CRUD origination.

use super::ledger::{OpKind, Tick};
use super::messages::{KvMsg, ReplicaRole};
use super::KvNode;
use crate::ring::RingMember;
use crate::utils::RingKvError;

// KvNode coordinator-side request origination
impl KvNode {
    /// Originates a replicated create, acting as coordinator: sends a
    /// PRIMARY-tagged CREATE to all three replicas of the key and
    /// registers the pending quorum record.
    pub fn client_create(
        &mut self,
        key: &str,
        value: &str,
        now: Tick,
    ) -> Result<(), RingKvError> {
        let replicas = self.deliverable_replicas(key)?;
        let xid = self.xids.next(OpKind::Create);
        let msg = KvMsg::Create {
            xid,
            from: self.addr,
            key: key.into(),
            value: value.into(),
            role: ReplicaRole::Primary,
        };
        self.send_to_replicas(&msg, &replicas)?;
        self.ledger.begin_write(xid, key, value, now);
        Ok(())
    }

    /// Originates a replicated read: sends READ to all three replicas and
    /// registers the pending read record.
    pub fn client_read(&mut self, key: &str, now: Tick) -> Result<(), RingKvError> {
        let replicas = self.deliverable_replicas(key)?;
        let xid = self.xids.next(OpKind::Read);
        let msg = KvMsg::Read {
            xid,
            from: self.addr,
            key: key.into(),
        };
        self.send_to_replicas(&msg, &replicas)?;
        self.ledger.begin_read(xid, key, now);
        Ok(())
    }

    /// Originates a replicated update.
    pub fn client_update(
        &mut self,
        key: &str,
        value: &str,
        now: Tick,
    ) -> Result<(), RingKvError> {
        let replicas = self.deliverable_replicas(key)?;
        let xid = self.xids.next(OpKind::Update);
        let msg = KvMsg::Update {
            xid,
            from: self.addr,
            key: key.into(),
            value: value.into(),
        };
        self.send_to_replicas(&msg, &replicas)?;
        self.ledger.begin_write(xid, key, value, now);
        Ok(())
    }

    /// Originates a replicated delete.
    pub fn client_delete(&mut self, key: &str, now: Tick) -> Result<(), RingKvError> {
        let replicas = self.deliverable_replicas(key)?;
        let xid = self.xids.next(OpKind::Delete);
        let msg = KvMsg::Delete {
            xid,
            from: self.addr,
            key: key.into(),
        };
        self.send_to_replicas(&msg, &replicas)?;
        self.ledger.begin_write(xid, key, "", now);
        Ok(())
    }

    /// Resolves the key's replica set; an unresolvable set means the
    /// operation cannot currently be served.
    fn deliverable_replicas(
        &self,
        key: &str,
    ) -> Result<Vec<RingMember>, RingKvError> {
        let replicas = self.ring.find_nodes(key);
        if replicas.is_empty() {
            return logged_err!(
                "key '{}' undeliverable: ring has {} members",
                key,
                self.ring.len()
            );
        }
        Ok(replicas)
    }

    fn send_to_replicas(
        &mut self,
        msg: &KvMsg,
        replicas: &[RingMember],
    ) -> Result<(), RingKvError> {
        let payload = msg.to_bytes()?;
        for replica in replicas {
            self.transport.send(self.addr, replica.addr, payload.clone());
        }
        Ok(())
    }
}
