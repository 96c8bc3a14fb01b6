//! Per-connection configuration: a flat, builder-free `Copy` struct in the
//! same shape as this workspace's other socket-tuning config types (e.g.
//! `TcpConnector`'s construction parameters).

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    /// Size of the pooled receive buffer posted for each read.
    pub socket_buffer_size: usize,
    /// Number of buffers kept warm in the shared `BufferPool`.
    pub buffer_pool_size: usize,
    /// Shared worker pool size; a connection only occupies a slot while it
    /// has queued work (§4.4/§4.5).
    pub worker_pool_size: usize,
    pub keep_alive_interval: Duration,
    pub keep_alive_time: Duration,
    /// §9: unbounded queues are flagged as a defect; this is the high-water
    /// mark applied to both the chunk queue and the send queue.
    pub queue_high_water_mark: usize,
    /// Polling interval for `send_blocking` (§4.5 specifies 10ms).
    pub send_blocking_poll_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            socket_buffer_size: 64 * 1024,
            buffer_pool_size: 128,
            worker_pool_size: 8,
            keep_alive_interval: Duration::from_secs(30),
            keep_alive_time: Duration::from_secs(120),
            queue_high_water_mark: 4096,
            send_blocking_poll_interval: Duration::from_millis(10),
        }
    }
}
