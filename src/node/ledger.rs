//! Transaction-id bookkeeping and the per-transaction quorum ledger.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Transaction id. The numeric range an id falls in encodes the operation
/// kind, since reply messages do not carry one.
pub type Xid = u64;

/// Logical time tick supplied by the external driver. The sole basis for
/// timeout comparisons.
pub type Tick = u64;

/// Replies needed to confirm or fail an operation, out of 3 replicas.
pub const QUORUM_NEEDED: u8 = 2;

/// Operation kinds, each owning a transaction-id range.
#[derive(
    Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize,
)]
pub enum OpKind {
    Create,
    Delete,
    Read,
    Update,
}

impl OpKind {
    /// Inclusive transaction-id range owned by this kind. The single
    /// source of truth for range-keyed dispatch.
    pub const fn xid_range(self) -> (Xid, Xid) {
        match self {
            OpKind::Create => (0, 2000),
            OpKind::Delete => (2001, 4000),
            OpKind::Read => (4001, 6000),
            OpKind::Update => (6001, 8000),
        }
    }

    /// Recovers the operation kind of a transaction from which range its
    /// id falls in.
    pub fn of_xid(xid: Xid) -> Option<OpKind> {
        [OpKind::Create, OpKind::Delete, OpKind::Read, OpKind::Update]
            .into_iter()
            .find(|kind| {
                let (lo, hi) = kind.xid_range();
                xid >= lo && xid <= hi
            })
    }

    pub fn is_write(self) -> bool {
        !matches!(self, OpKind::Read)
    }
}

/// Per-kind monotonic transaction-id generator, wrapping within each
/// kind's range. Ids within one range stay collision-free as long as
/// fewer transactions are concurrently pending than the range width.
#[derive(Debug, Clone, Default)]
pub struct XidGen {
    next_off: [u64; 4],
}

impl XidGen {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(kind: OpKind) -> usize {
        match kind {
            OpKind::Create => 0,
            OpKind::Delete => 1,
            OpKind::Read => 2,
            OpKind::Update => 3,
        }
    }

    /// Yields the next transaction id in the kind's range.
    pub fn next(&mut self, kind: OpKind) -> Xid {
        let (lo, hi) = kind.xid_range();
        let span = hi - lo + 1;
        let slot = Self::slot(kind);
        let off = self.next_off[slot];
        self.next_off[slot] = (off + 1) % span;
        lo + off
    }
}

/// Pending write transaction state, kept in parallel positive and
/// negative ack tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// Acks accumulated so far in this table (0-3).
    pub acks: u8,

    pub key: String,
    pub value: String,

    /// Origination tick, for the timeout sweep.
    pub since: Tick,
}

/// Pending read transaction state. `value` holds the first-seen reply
/// value, `None` until one arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    pub key: String,
    pub value: Option<String>,
    pub since: Tick,
}

/// Outcome of feeding one write reply into the ledger.
#[derive(Debug, PartialEq, Eq)]
pub enum WriteVerdict {
    /// Not enough matching replies yet.
    Pending,

    /// Positive quorum reached; record resolved.
    Committed { key: String, value: String },

    /// Negative quorum reached; record resolved.
    Aborted { key: String, value: String },
}

/// Outcome of feeding one read reply into the ledger.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadVerdict {
    /// No matching second reply yet.
    Pending,

    /// Two replies agreed on the value; record resolved.
    Confirmed { key: String, value: String },
}

/// Per-transaction pending-state tables of one coordinator node.
#[derive(Debug, Default)]
pub struct QuorumLedger {
    /// Positive (success) ack counts per pending write.
    pos: HashMap<Xid, WriteRecord>,

    /// Negative (failure) ack counts per pending write.
    neg: HashMap<Xid, WriteRecord>,

    /// Pending reads awaiting two matching reply values.
    reads: HashMap<Xid, ReadRecord>,
}

impl QuorumLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly originated write in both ack tables.
    pub fn begin_write(&mut self, xid: Xid, key: &str, value: &str, now: Tick) {
        let record = WriteRecord {
            acks: 0,
            key: key.into(),
            value: value.into(),
            since: now,
        };
        self.pos.insert(xid, record.clone());
        self.neg.insert(xid, record);
    }

    /// Registers a freshly originated read.
    pub fn begin_read(&mut self, xid: Xid, key: &str, now: Tick) {
        self.reads.insert(
            xid,
            ReadRecord {
                key: key.into(),
                value: None,
                since: now,
            },
        );
    }

    /// Feeds one write acknowledgement into the quorum bookkeeping.
    /// Returns `None` when the transaction is unknown (already resolved
    /// or never originated here); otherwise steps the positive or
    /// negative counter by one and reports whether a quorum was reached.
    /// A resolved transaction is dropped from both tables. Negative
    /// quorums never resolve creates: those terminate only by positive
    /// quorum or by the timeout sweep.
    pub fn record_write_reply(
        &mut self,
        xid: Xid,
        kind: OpKind,
        success: bool,
    ) -> Option<WriteVerdict> {
        if !self.pos.contains_key(&xid) {
            return None;
        }
        let table = if success { &mut self.pos } else { &mut self.neg };
        let acks = {
            let record = table.get_mut(&xid)?;
            if record.acks < 3 {
                record.acks += 1;
            }
            record.acks
        };
        if acks != QUORUM_NEEDED {
            return Some(WriteVerdict::Pending);
        }

        if success {
            let record = self.resolve(xid)?;
            Some(WriteVerdict::Committed {
                key: record.key,
                value: record.value,
            })
        } else if kind != OpKind::Create {
            let record = self.resolve(xid)?;
            Some(WriteVerdict::Aborted {
                key: record.key,
                value: record.value,
            })
        } else {
            Some(WriteVerdict::Pending)
        }
    }

    /// Feeds one read reply into the quorum bookkeeping. The first reply
    /// stores its value; a later equal reply confirms the read quorum and
    /// resolves the record; an unequal one is ignored (no reconciliation).
    pub fn record_read_reply(
        &mut self,
        xid: Xid,
        value: &str,
    ) -> Option<ReadVerdict> {
        let record = self.reads.get_mut(&xid)?;
        match record.value {
            None => {
                record.value = Some(value.into());
                Some(ReadVerdict::Pending)
            }
            Some(ref first) if first == value => {
                let record = self.reads.remove(&xid)?;
                Some(ReadVerdict::Confirmed {
                    key: record.key,
                    value: value.into(),
                })
            }
            Some(_) => Some(ReadVerdict::Pending),
        }
    }

    /// Drops and returns every pending read older than the timeout, for
    /// failure logging. The only exit for a read whose replicas never
    /// agree or never reply.
    pub fn sweep_reads(
        &mut self,
        now: Tick,
        timeout: u64,
    ) -> Vec<(Xid, ReadRecord)> {
        let mut expired = Vec::new();
        self.reads.retain(|&xid, record| {
            if record.since + timeout < now {
                expired.push((xid, record.clone()));
                false
            } else {
                true
            }
        });
        expired
    }

    /// Drops and returns every pending write (any write kind) older than
    /// the timeout, clearing both ack tables.
    pub fn sweep_writes(
        &mut self,
        now: Tick,
        timeout: u64,
    ) -> Vec<(Xid, WriteRecord)> {
        let mut expired = Vec::new();
        self.pos.retain(|&xid, record| {
            if record.since + timeout < now {
                expired.push((xid, record.clone()));
                false
            } else {
                true
            }
        });
        for (xid, _) in &expired {
            self.neg.remove(xid);
        }
        expired
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.pos.is_empty()
    }

    pub fn pending_writes(&self) -> usize {
        self.pos.len()
    }

    pub fn pending_reads(&self) -> usize {
        self.reads.len()
    }

    /// Removes a resolved transaction from both ack tables.
    fn resolve(&mut self, xid: Xid) -> Option<WriteRecord> {
        let record = self.pos.remove(&xid);
        self.neg.remove(&xid);
        record
    }
}
