//! External collaborator seams: transport, outcome logging, emulated net.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use crate::node::{OpKind, Xid};

use rand::Rng;

/// Fire-and-forget message transport between nodes. Sends must never
/// block; delivery and ordering are not guaranteed. Replies, if any,
/// arrive later through the receiving node's inbound queue.
pub trait Transport {
    fn send(&mut self, from: SocketAddr, to: SocketAddr, payload: Vec<u8>);
}

/// Side-effect-only observer of per-operation outcomes (the audit log
/// sink). `coordinator` distinguishes replica-local outcomes from
/// coordinator-side quorum outcomes.
pub trait OpObserver {
    fn create_success(
        &mut self,
        at: SocketAddr,
        coordinator: bool,
        xid: Xid,
        key: &str,
        value: &str,
    );
    fn create_fail(
        &mut self,
        at: SocketAddr,
        coordinator: bool,
        xid: Xid,
        key: &str,
        value: &str,
    );
    fn read_success(
        &mut self,
        at: SocketAddr,
        coordinator: bool,
        xid: Xid,
        key: &str,
        value: &str,
    );
    fn read_fail(&mut self, at: SocketAddr, coordinator: bool, xid: Xid, key: &str);
    fn update_success(
        &mut self,
        at: SocketAddr,
        coordinator: bool,
        xid: Xid,
        key: &str,
        value: &str,
    );
    fn update_fail(
        &mut self,
        at: SocketAddr,
        coordinator: bool,
        xid: Xid,
        key: &str,
        value: &str,
    );
    fn delete_success(
        &mut self,
        at: SocketAddr,
        coordinator: bool,
        xid: Xid,
        key: &str,
    );
    fn delete_fail(&mut self, at: SocketAddr, coordinator: bool, xid: Xid, key: &str);
}

/// Default observer that writes outcomes to the crate logger.
#[derive(Debug, Clone, Default)]
pub struct LogObserver;

impl OpObserver for LogObserver {
    fn create_success(
        &mut self,
        at: SocketAddr,
        coordinator: bool,
        xid: Xid,
        key: &str,
        value: &str,
    ) {
        pf_info!(
            "create success at {} coord={} xid={} {}={}",
            at,
            coordinator,
            xid,
            key,
            value
        );
    }

    fn create_fail(
        &mut self,
        at: SocketAddr,
        coordinator: bool,
        xid: Xid,
        key: &str,
        value: &str,
    ) {
        pf_warn!(
            "create fail at {} coord={} xid={} {}={}",
            at,
            coordinator,
            xid,
            key,
            value
        );
    }

    fn read_success(
        &mut self,
        at: SocketAddr,
        coordinator: bool,
        xid: Xid,
        key: &str,
        value: &str,
    ) {
        pf_info!(
            "read success at {} coord={} xid={} {}={}",
            at,
            coordinator,
            xid,
            key,
            value
        );
    }

    fn read_fail(&mut self, at: SocketAddr, coordinator: bool, xid: Xid, key: &str) {
        pf_warn!(
            "read fail at {} coord={} xid={} {}",
            at,
            coordinator,
            xid,
            key
        );
    }

    fn update_success(
        &mut self,
        at: SocketAddr,
        coordinator: bool,
        xid: Xid,
        key: &str,
        value: &str,
    ) {
        pf_info!(
            "update success at {} coord={} xid={} {}={}",
            at,
            coordinator,
            xid,
            key,
            value
        );
    }

    fn update_fail(
        &mut self,
        at: SocketAddr,
        coordinator: bool,
        xid: Xid,
        key: &str,
        value: &str,
    ) {
        pf_warn!(
            "update fail at {} coord={} xid={} {}={}",
            at,
            coordinator,
            xid,
            key,
            value
        );
    }

    fn delete_success(
        &mut self,
        at: SocketAddr,
        coordinator: bool,
        xid: Xid,
        key: &str,
    ) {
        pf_info!(
            "delete success at {} coord={} xid={} {}",
            at,
            coordinator,
            xid,
            key
        );
    }

    fn delete_fail(&mut self, at: SocketAddr, coordinator: bool, xid: Xid, key: &str) {
        pf_warn!(
            "delete fail at {} coord={} xid={} {}",
            at,
            coordinator,
            xid,
            key
        );
    }
}

/// One recorded operation outcome, for deterministic assertions in tests
/// and emulation harnesses.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct OpEvent {
    pub kind: OpKind,
    pub success: bool,
    pub at: SocketAddr,
    pub coordinator: bool,
    pub xid: Xid,
    pub key: String,
    pub value: Option<String>,
}

/// Observer that records every outcome into a shared vector. Handles are
/// cheaply cloneable and share the same recording.
#[derive(Debug, Clone, Default)]
pub struct MemObserver {
    events: Arc<Mutex<Vec<OpEvent>>>,
}

impl MemObserver {
    /// Snapshot of all events recorded so far.
    pub fn events(&self) -> Vec<OpEvent> {
        self.events.lock().unwrap().clone()
    }

    fn record(
        &mut self,
        kind: OpKind,
        success: bool,
        at: SocketAddr,
        coordinator: bool,
        xid: Xid,
        key: &str,
        value: Option<&str>,
    ) {
        self.events.lock().unwrap().push(OpEvent {
            kind,
            success,
            at,
            coordinator,
            xid,
            key: key.into(),
            value: value.map(|v| v.into()),
        });
    }
}

impl OpObserver for MemObserver {
    fn create_success(
        &mut self,
        at: SocketAddr,
        coordinator: bool,
        xid: Xid,
        key: &str,
        value: &str,
    ) {
        self.record(OpKind::Create, true, at, coordinator, xid, key, Some(value));
    }

    fn create_fail(
        &mut self,
        at: SocketAddr,
        coordinator: bool,
        xid: Xid,
        key: &str,
        value: &str,
    ) {
        self.record(OpKind::Create, false, at, coordinator, xid, key, Some(value));
    }

    fn read_success(
        &mut self,
        at: SocketAddr,
        coordinator: bool,
        xid: Xid,
        key: &str,
        value: &str,
    ) {
        self.record(OpKind::Read, true, at, coordinator, xid, key, Some(value));
    }

    fn read_fail(&mut self, at: SocketAddr, coordinator: bool, xid: Xid, key: &str) {
        self.record(OpKind::Read, false, at, coordinator, xid, key, None);
    }

    fn update_success(
        &mut self,
        at: SocketAddr,
        coordinator: bool,
        xid: Xid,
        key: &str,
        value: &str,
    ) {
        self.record(OpKind::Update, true, at, coordinator, xid, key, Some(value));
    }

    fn update_fail(
        &mut self,
        at: SocketAddr,
        coordinator: bool,
        xid: Xid,
        key: &str,
        value: &str,
    ) {
        self.record(OpKind::Update, false, at, coordinator, xid, key, Some(value));
    }

    fn delete_success(
        &mut self,
        at: SocketAddr,
        coordinator: bool,
        xid: Xid,
        key: &str,
    ) {
        self.record(OpKind::Delete, true, at, coordinator, xid, key, None);
    }

    fn delete_fail(&mut self, at: SocketAddr, coordinator: bool, xid: Xid, key: &str) {
        self.record(OpKind::Delete, false, at, coordinator, xid, key, None);
    }
}

/// In-memory emulated network: one FIFO inbox of raw payloads per
/// address, with an optional uniform message-drop probability. Handles
/// are cheaply cloneable and share the same queues, so one `MemNet` can
/// serve as the transport of a whole emulated cluster while the driver
/// keeps a handle for delivery.
#[derive(Debug, Clone, Default)]
pub struct MemNet {
    inner: Arc<Mutex<MemNetInner>>,
}

#[derive(Debug, Default)]
struct MemNetInner {
    queues: HashMap<SocketAddr, VecDeque<Vec<u8>>>,
    drop_rate: f64,
}

impl MemNet {
    /// Creates a reliable (no-drop) emulated network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an emulated network dropping each message independently
    /// with the given probability.
    pub fn with_drop_rate(drop_rate: f64) -> Self {
        let net = Self::default();
        net.inner.lock().unwrap().drop_rate = drop_rate;
        net
    }

    /// Takes all payloads currently queued for the given address.
    pub fn drain(&self, addr: SocketAddr) -> Vec<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.queues.get_mut(&addr) {
            Some(queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Number of payloads currently queued for the given address.
    pub fn pending(&self, addr: SocketAddr) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.queues.get(&addr).map_or(0, |q| q.len())
    }
}

impl Transport for MemNet {
    fn send(&mut self, _from: SocketAddr, to: SocketAddr, payload: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap();
        if inner.drop_rate > 0.0 && rand::thread_rng().gen_bool(inner.drop_rate)
        {
            return; // message lost in the emulated network
        }
        inner.queues.entry(to).or_default().push_back(payload);
    }
}

#[cfg(test)]
mod external_tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn memnet_queues_per_address() {
        let mut net = MemNet::new();
        net.send(addr(1), addr(2), vec![1]);
        net.send(addr(1), addr(2), vec![2]);
        net.send(addr(1), addr(3), vec![3]);
        assert_eq!(net.pending(addr(2)), 2);
        assert_eq!(net.drain(addr(2)), vec![vec![1], vec![2]]);
        assert_eq!(net.pending(addr(2)), 0);
        assert_eq!(net.drain(addr(3)), vec![vec![3]]);
        assert!(net.drain(addr(4)).is_empty());
    }

    #[test]
    fn memnet_full_drop_loses_everything() {
        let mut net = MemNet::with_drop_rate(1.0);
        for i in 0..50 {
            net.send(addr(1), addr(2), vec![i]);
        }
        assert_eq!(net.pending(addr(2)), 0);
    }

    #[test]
    fn memobserver_shares_recording_across_handles() {
        let obs = MemObserver::default();
        let mut handle = obs.clone();
        handle.create_success(addr(1), true, 7, "k", "v");
        handle.delete_fail(addr(1), false, 2500, "k");
        let events = obs.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, OpKind::Create);
        assert!(events[0].success);
        assert_eq!(events[0].value, Some("v".into()));
        assert_eq!(events[1].kind, OpKind::Delete);
        assert!(!events[1].success);
        assert_eq!(events[1].value, None);
    }
}
