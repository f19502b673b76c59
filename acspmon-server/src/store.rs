//! Shared fleet state
//!
//! Two maps guard the run: the nodes set (every host that ever answered
//! a probe, used only to dedupe discovery) and the AP map (verified APs).
//! Each AP carries its own state mutex, so one poller writing never
//! blocks another AP's reader, and a reader always sees a whole poll
//! iteration at once.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use acspmon_core::Ap;

use crate::shell::ShellSession;

/// One AP's live record: its identity, its shell session and its state.
pub struct ApHandle {
    pub ip: Ipv4Addr,
    /// Discovery order, used as the default placement order
    pub seq: u64,
    pub session: ShellSession,
    pub state: Mutex<Ap>,
}

impl ApHandle {
    pub fn new(ip: Ipv4Addr, seq: u64, session: ShellSession) -> Self {
        ApHandle {
            ip,
            seq,
            session,
            state: Mutex::new(Ap::new(ip)),
        }
    }
}

/// The global maps, one mutex each.
pub struct ModelStore {
    nodes: Mutex<HashSet<Ipv4Addr>>,
    aps: Mutex<HashMap<Ipv4Addr, Arc<ApHandle>>>,
    next_seq: AtomicU64,
}

impl Default for ModelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelStore {
    pub fn new() -> Self {
        ModelStore {
            nodes: Mutex::new(HashSet::new()),
            aps: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Record a probe responder. Returns false when the host is already
    /// known, relying on IP stability for the run.
    pub fn note_node(&self, ip: Ipv4Addr) -> bool {
        self.nodes.lock().unwrap().insert(ip)
    }

    /// Drop a host from the known set so the scanner may pick it up
    /// again on a later sweep.
    pub fn forget_node(&self, ip: Ipv4Addr) {
        self.nodes.lock().unwrap().remove(&ip);
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Promote a verified AP into the monitored map. An AP that was
    /// already known (session loss and reacquisition) keeps its record.
    pub fn register(&self, handle: Arc<ApHandle>) {
        let mut aps = self.aps.lock().unwrap();
        if aps.contains_key(&handle.ip) {
            log::info!("AP {} back online", handle.ip);
            return;
        }
        log::info!("{} added to AP monitor list", handle.ip);
        aps.insert(handle.ip, handle);
    }

    /// Remove a host entirely (non-AP devices, first-contact parse
    /// failures).
    pub fn remove(&self, ip: Ipv4Addr) {
        self.aps.lock().unwrap().remove(&ip);
        self.forget_node(ip);
    }

    pub fn get(&self, ip: Ipv4Addr) -> Option<Arc<ApHandle>> {
        self.aps.lock().unwrap().get(&ip).cloned()
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.aps.lock().unwrap().contains_key(&ip)
    }

    pub fn len(&self) -> usize {
        self.aps.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.aps.lock().unwrap().is_empty()
    }

    /// All monitored APs in discovery order. The map lock is released
    /// before the caller touches any per-AP state.
    pub fn aps_snapshot(&self) -> Vec<Arc<ApHandle>> {
        let mut handles: Vec<Arc<ApHandle>> =
            self.aps.lock().unwrap().values().cloned().collect();
        handles.sort_by_key(|h| h.seq);
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::Credentials;

    fn handle(store: &ModelStore, last: u8) -> Arc<ApHandle> {
        let ip = Ipv4Addr::new(10, 0, 0, last);
        Arc::new(ApHandle::new(
            ip,
            store.next_seq(),
            ShellSession::new(ip, Credentials::default()),
        ))
    }

    #[test]
    fn test_note_node_dedupes() {
        let store = ModelStore::new();
        let ip = Ipv4Addr::new(10, 0, 0, 1);
        assert!(store.note_node(ip));
        assert!(!store.note_node(ip));
        store.forget_node(ip);
        assert!(store.note_node(ip));
    }

    #[test]
    fn test_register_and_remove() {
        let store = ModelStore::new();
        let h = handle(&store, 1);
        store.note_node(h.ip);
        store.register(h.clone());
        assert!(store.contains(h.ip));

        // Re-registering after a session drop keeps the original record
        store.register(h.clone());
        assert_eq!(store.len(), 1);

        store.remove(h.ip);
        assert!(!store.contains(h.ip));
        // and the node becomes discoverable again
        assert!(store.note_node(h.ip));
    }

    #[test]
    fn test_snapshot_in_discovery_order() {
        let store = ModelStore::new();
        let a = handle(&store, 3);
        let b = handle(&store, 1);
        let c = handle(&store, 2);
        store.register(c.clone());
        store.register(a.clone());
        store.register(b.clone());
        let ips: Vec<_> = store.aps_snapshot().iter().map(|h| h.ip).collect();
        assert_eq!(ips, vec![a.ip, b.ip, c.ip]);
    }
}
