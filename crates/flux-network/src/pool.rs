//! Shared worker pool consuming dispatched pump tasks (§4.4/§4.5, §5).
//!
//! Both the receive pump's decoder task and the send pump's sender task are
//! dispatched here rather than getting a thread each: a connection only
//! occupies a worker while it actually has bytes to process, per the
//! `reading_packets`/`sending_packets` single-flight guards in `connection.rs`.

use crossbeam_channel::{Receiver, Sender, unbounded};
use flux_utils::{ThreadPriority, thread_boot};
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    sender: Sender<Job>,
}

impl WorkerPool {
    /// Spawns `workers` OS threads, each booted via [`thread_boot`] with
    /// `priority` and no pinned core (pump work is not latency-critical
    /// enough to justify reserving whole cores for it).
    pub fn new(workers: usize, priority: ThreadPriority) -> Self {
        let (sender, receiver) = unbounded::<Job>();

        for id in 0..workers.max(1) {
            let receiver: Receiver<Job> = receiver.clone();
            std::thread::Builder::new()
                .name(format!("flux-net-pool-{id}"))
                .spawn(move || {
                    thread_boot(None, priority);
                    for job in receiver {
                        job();
                    }
                    debug!(id, "worker pool thread exiting");
                })
                .expect("failed to spawn worker pool thread");
        }

        Self { sender }
    }

    /// Enqueues `job`. Never blocks: the channel is unbounded, matching the
    /// teacher's unbounded dispatch queues (§9 flags this for a high-water
    /// mark, applied at the pump level rather than here).
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) {
        if self.sender.send(Box::new(job)).is_err() {
            debug!("worker pool dispatch after shutdown, dropping job");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn dispatched_jobs_all_run() {
        let pool = WorkerPool::new(4, ThreadPriority::OSDefault);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let counter = counter.clone();
            pool.dispatch(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while counter.load(Ordering::SeqCst) < 100 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }
}
