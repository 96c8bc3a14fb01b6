//! Parent server contract (§6): the acceptor-owned object every connection
//! holds a reference to for shared counters, keepalive parameters, and
//! self-removal on disconnect. The acceptor loop itself is out of scope (§1).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::connection::ConnectionId;

/// Atomic byte counters shared across every connection of a server (§5: "must
/// be atomic in a faithful reimplementation").
#[derive(Debug, Default)]
pub struct ByteCounters {
    received: AtomicU64,
    sent: AtomicU64,
}

impl ByteCounters {
    pub fn add_received(&self, n: u64) {
        self.received.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_sent(&self, n: u64) {
        self.sent.fetch_add(n, Ordering::Relaxed);
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

/// What a connection needs from its owner: keepalive parameters, shared
/// counters, and a hook to drop itself from the owner's table (§4.6).
pub trait ParentServer: Send + Sync {
    fn header_size(&self) -> u32;
    fn keep_alive_interval(&self) -> std::time::Duration;
    fn keep_alive_time(&self) -> std::time::Duration;
    fn counters(&self) -> &ByteCounters;

    /// True while the owner is iterating its connection table (e.g. a
    /// broadcast); per §4.6 a connection must not remove itself mid-iteration.
    fn is_processing(&self) -> bool;

    fn remove_connection(&self, id: ConnectionId);
}

/// Minimal in-process `ParentServer`, standing in for the real acceptor loop
/// that is out of scope for this crate (§1). Used by integration tests and
/// as a template for embedding into a real server.
pub struct LocalServer {
    header_size: u32,
    keep_alive_interval: std::time::Duration,
    keep_alive_time: std::time::Duration,
    counters: ByteCounters,
    processing: AtomicBool,
    connections: std::sync::Mutex<Vec<ConnectionId>>,
}

impl LocalServer {
    pub fn new(
        header_size: u32,
        keep_alive_interval: std::time::Duration,
        keep_alive_time: std::time::Duration,
    ) -> Self {
        Self {
            header_size,
            keep_alive_interval,
            keep_alive_time,
            counters: ByteCounters::default(),
            processing: AtomicBool::new(false),
            connections: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn track(&self, id: ConnectionId) {
        self.connections.lock().expect("server lock poisoned").push(id);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().expect("server lock poisoned").len()
    }

    pub fn set_processing(&self, processing: bool) {
        self.processing.store(processing, Ordering::SeqCst);
    }
}

impl ParentServer for LocalServer {
    fn header_size(&self) -> u32 {
        self.header_size
    }

    fn keep_alive_interval(&self) -> std::time::Duration {
        self.keep_alive_interval
    }

    fn keep_alive_time(&self) -> std::time::Duration {
        self.keep_alive_time
    }

    fn counters(&self) -> &ByteCounters {
        &self.counters
    }

    fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    fn remove_connection(&self, id: ConnectionId) {
        if self.is_processing() {
            return;
        }
        self.connections.lock().expect("server lock poisoned").retain(|c| *c != id);
    }
}
