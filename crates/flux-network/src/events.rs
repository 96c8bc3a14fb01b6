//! Upstream listener contract (§4.6, §6). The application-level message
//! handlers that subscribe to these events are out of scope (§1); this is
//! just the seam they attach to.

use crate::registry::Message;

/// Fired by a `Connection` on state transitions and traffic. All three
/// callbacks are invoked synchronously on whichever pump thread produced the
/// event — implementations must not block.
pub trait ConnectionListener: Send + Sync {
    /// Fires at most once per transition (§4.6).
    fn on_state_change(&self, connected: bool);

    fn on_read(&self, msg: &dyn Message);

    /// `length` is the framed wire length (header + ciphertext); `raw` is the
    /// same ciphertext bytes that went out on the wire. Fires at submission
    /// time, not at wire time (§5) — it is not a delivery signal.
    fn on_write(&self, msg: &dyn Message, length: usize, raw: &[u8]);
}

/// No-op listener, useful as a default or in tests that don't care about events.
pub struct NullListener;

impl ConnectionListener for NullListener {
    fn on_state_change(&self, _connected: bool) {}
    fn on_read(&self, _msg: &dyn Message) {}
    fn on_write(&self, _msg: &dyn Message, _length: usize, _raw: &[u8]) {}
}
