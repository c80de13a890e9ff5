//! Wire message schema and the node's message dispatcher.

use std::net::SocketAddr;

use super::ledger::{OpKind, ReadVerdict, Tick, WriteVerdict, Xid};
use super::KvNode;
use crate::utils::RingKvError;

use serde::{Deserialize, Serialize};

/// Role of a replica within a key's replica set, in ordinal order.
/// Informational metadata carried on CREATE messages; never gates quorum
/// logic.
#[derive(
    Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize,
)]
pub enum ReplicaRole {
    Primary,
    Secondary,
    Tertiary,
}

/// Messages exchanged between nodes, serialized with MessagePack on the
/// wire.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum KvMsg {
    /// Store a new key-value pair on the receiving replica.
    Create {
        xid: Xid,
        from: SocketAddr,
        key: String,
        value: String,
        role: ReplicaRole,
    },

    /// Read the value of a key from the receiving replica.
    Read {
        xid: Xid,
        from: SocketAddr,
        key: String,
    },

    /// Overwrite the value of an existing key on the receiving replica.
    Update {
        xid: Xid,
        from: SocketAddr,
        key: String,
        value: String,
    },

    /// Remove a key from the receiving replica.
    Delete {
        xid: Xid,
        from: SocketAddr,
        key: String,
    },

    /// Write acknowledgement carrying the replica-local outcome.
    Reply {
        xid: Xid,
        from: SocketAddr,
        success: bool,
    },

    /// Read reply carrying the replica's locally held value.
    ReadReply {
        xid: Xid,
        from: SocketAddr,
        key: String,
        value: String,
    },
}

impl KvMsg {
    /// Serializes into wire bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RingKvError> {
        Ok(rmp_serde::to_vec(self)?)
    }

    /// Deserializes from wire bytes.
    pub fn from_bytes(raw: &[u8]) -> Result<KvMsg, RingKvError> {
        Ok(rmp_serde::from_slice(raw)?)
    }
}

// KvNode message dispatching
impl KvNode {
    /// Drains the inbound queue to empty, handling every message
    /// run-to-completion, then runs the timeout sweeps: pending reads
    /// unconditionally, pending writes whenever any exist. Called once
    /// per scheduling tick by the external driver.
    pub fn check_messages(&mut self, now: Tick) {
        while let Some(raw) = self.inbox.pop_front() {
            match KvMsg::from_bytes(&raw) {
                Ok(msg) => {
                    if let Err(e) = self.handle_message(msg) {
                        pf_error!("error handling message: {}", e);
                    }
                }
                Err(e) => pf_warn!("discarding undecodable message: {}", e),
            }
        }

        self.sweep_expired_reads(now);
        if self.ledger.has_pending_writes() {
            self.sweep_expired_writes(now);
        }
    }

    /// Handles one inbound message: CRUD requests are served against the
    /// local shard (this node acting as replica); REPLY/READREPLY feed
    /// coordinator-side quorum aggregation.
    fn handle_message(&mut self, msg: KvMsg) -> Result<(), RingKvError> {
        match msg {
            KvMsg::Create {
                xid,
                from,
                key,
                value,
                ..
            } => self.handle_create(xid, from, &key, &value),
            KvMsg::Read { xid, from, key } => self.handle_read(xid, from, &key),
            KvMsg::Update {
                xid,
                from,
                key,
                value,
            } => self.handle_update(xid, from, &key, &value),
            KvMsg::Delete { xid, from, key } => {
                self.handle_delete(xid, from, &key)
            }
            KvMsg::Reply { xid, success, .. } => self.handle_reply(xid, success),
            KvMsg::ReadReply { xid, value, .. } => {
                self.handle_read_reply(xid, &value);
                Ok(())
            }
        }
    }

    /// Server-side CREATE: apply to the local shard, log the outcome, and
    /// ack the coordinator. Every replica acks; the role tag is metadata.
    fn handle_create(
        &mut self,
        xid: Xid,
        from: SocketAddr,
        key: &str,
        value: &str,
    ) -> Result<(), RingKvError> {
        let success = self.store.create(key, value);
        if success {
            self.observer.create_success(self.addr, false, xid, key, value);
        } else {
            self.observer.create_fail(self.addr, false, xid, key, value);
        }
        self.send_reply(from, xid, success)
    }

    /// Server-side READ: reply with the value when held locally; send
    /// nothing when absent, letting the coordinator's timeout take the
    /// missing vote.
    fn handle_read(
        &mut self,
        xid: Xid,
        from: SocketAddr,
        key: &str,
    ) -> Result<(), RingKvError> {
        match self.store.read(key) {
            Some(value) => {
                self.observer.read_success(self.addr, false, xid, key, &value);
                let reply = KvMsg::ReadReply {
                    xid,
                    from: self.addr,
                    key: key.into(),
                    value,
                };
                self.transport.send(self.addr, from, reply.to_bytes()?);
                Ok(())
            }
            None => {
                self.observer.read_fail(self.addr, false, xid, key);
                Ok(())
            }
        }
    }

    /// Server-side UPDATE: apply, log, always ack with the outcome.
    fn handle_update(
        &mut self,
        xid: Xid,
        from: SocketAddr,
        key: &str,
        value: &str,
    ) -> Result<(), RingKvError> {
        let success = self.store.update(key, value);
        if success {
            self.observer.update_success(self.addr, false, xid, key, value);
        } else {
            self.observer.update_fail(self.addr, false, xid, key, value);
        }
        self.send_reply(from, xid, success)
    }

    /// Server-side DELETE: apply, log, always ack with the outcome.
    fn handle_delete(
        &mut self,
        xid: Xid,
        from: SocketAddr,
        key: &str,
    ) -> Result<(), RingKvError> {
        let success = self.store.delete(key);
        if success {
            self.observer.delete_success(self.addr, false, xid, key);
        } else {
            self.observer.delete_fail(self.addr, false, xid, key);
        }
        self.send_reply(from, xid, success)
    }

    /// Coordinator-side write acknowledgement: the operation kind is
    /// re-derived purely from the transaction-id range. Replies to
    /// unknown (resolved, or stabilization-burst) transactions are
    /// discarded.
    fn handle_reply(
        &mut self,
        xid: Xid,
        success: bool,
    ) -> Result<(), RingKvError> {
        let kind = match OpKind::of_xid(xid) {
            Some(kind) if kind.is_write() => kind,
            _ => {
                pf_warn!("REPLY with non-write xid {}, discarding", xid);
                return Ok(());
            }
        };
        match self.ledger.record_write_reply(xid, kind, success) {
            None | Some(WriteVerdict::Pending) => {}
            Some(WriteVerdict::Committed { key, value }) => match kind {
                OpKind::Create => {
                    self.observer.create_success(self.addr, true, xid, &key, &value)
                }
                OpKind::Delete => {
                    self.observer.delete_success(self.addr, true, xid, &key)
                }
                OpKind::Update => {
                    self.observer.update_success(self.addr, true, xid, &key, &value)
                }
                OpKind::Read => {}
            },
            Some(WriteVerdict::Aborted { key, value }) => match kind {
                OpKind::Delete => {
                    self.observer.delete_fail(self.addr, true, xid, &key)
                }
                OpKind::Update => {
                    self.observer.update_fail(self.addr, true, xid, &key, &value)
                }
                // creates never abort on negative quorum
                _ => {}
            },
        }
        Ok(())
    }

    /// Coordinator-side read reply: first reply stores the value, a later
    /// matching one confirms the read quorum.
    fn handle_read_reply(&mut self, xid: Xid, value: &str) {
        if let Some(ReadVerdict::Confirmed { key, value }) =
            self.ledger.record_read_reply(xid, value)
        {
            self.observer.read_success(self.addr, true, xid, &key, &value);
        }
    }

    /// Logs and drops every pending read past the reply timeout.
    fn sweep_expired_reads(&mut self, now: Tick) {
        for (xid, record) in
            self.ledger.sweep_reads(now, self.config.reply_timeout)
        {
            self.observer.read_fail(self.addr, true, xid, &record.key);
        }
    }

    /// Logs and drops every pending write past the reply timeout.
    fn sweep_expired_writes(&mut self, now: Tick) {
        for (xid, record) in
            self.ledger.sweep_writes(now, self.config.reply_timeout)
        {
            match OpKind::of_xid(xid) {
                Some(OpKind::Create) => self.observer.create_fail(
                    self.addr,
                    true,
                    xid,
                    &record.key,
                    &record.value,
                ),
                Some(OpKind::Delete) => {
                    self.observer.delete_fail(self.addr, true, xid, &record.key)
                }
                Some(OpKind::Update) => self.observer.update_fail(
                    self.addr,
                    true,
                    xid,
                    &record.key,
                    &record.value,
                ),
                _ => {}
            }
        }
    }

    fn send_reply(
        &mut self,
        to: SocketAddr,
        xid: Xid,
        success: bool,
    ) -> Result<(), RingKvError> {
        let reply = KvMsg::Reply {
            xid,
            from: self.addr,
            success,
        };
        self.transport.send(self.addr, to, reply.to_bytes()?);
        Ok(())
    }
}
