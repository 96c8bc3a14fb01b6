//! Connection controller (§4.4-§4.6): owns the socket, drives the receive and
//! send pumps, and emits lifecycle events to a [`ConnectionListener`].

use std::any::Any;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use flux_utils::{ThreadPriority, safe_panic, thread_boot};
use tracing::{debug, warn};

use crate::buffer_pool::BufferPool;
use crate::config::ConnectionConfig;
use crate::events::ConnectionListener;
use crate::frame::{self, FrameDecoder};
use crate::pipeline::Pipeline;
use crate::pool::WorkerPool;
use crate::registry::{Message, MessageRegistry};
use crate::server::ParentServer;

/// Two connections are equal iff their remote `(address, port)` matches —
/// widened from the source's port-only comparison (§4.6).
pub type ConnectionId = SocketAddr;

fn configure_keepalive(stream: &TcpStream, interval: Duration, time: Duration) {
    let sock_ref = socket2::SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new().with_time(time).with_interval(interval);
    if let Err(err) = sock_ref.set_tcp_keepalive(&keepalive) {
        warn!(?err, "failed to configure tcp keepalive");
    }
}

pub struct Connection {
    id: ConnectionId,
    connected: AtomicBool,
    connected_since: Instant,
    user_state: Mutex<Option<Box<dyn Any + Send>>>,

    parent: Arc<dyn ParentServer>,
    buffer_pool: Arc<dyn BufferPool>,
    pipeline: Arc<Pipeline>,
    registry: Arc<MessageRegistry>,
    pool: Arc<WorkerPool>,
    listener: Arc<dyn ConnectionListener>,
    config: ConnectionConfig,

    read_stream: Mutex<TcpStream>,
    write_stream: Mutex<TcpStream>,

    chunk_queue: Mutex<VecDeque<Vec<u8>>>,
    reading_packets: AtomicBool,
    decoder: Mutex<FrameDecoder>,

    send_queue: Mutex<VecDeque<Vec<u8>>>,
    sending_packets: AtomicBool,
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Connection {}

impl Connection {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        socket: TcpStream,
        parent: Arc<dyn ParentServer>,
        registry: Arc<MessageRegistry>,
        pipeline: Arc<Pipeline>,
        buffer_pool: Arc<dyn BufferPool>,
        pool: Arc<WorkerPool>,
        listener: Arc<dyn ConnectionListener>,
        config: ConnectionConfig,
    ) -> std::io::Result<Arc<Self>> {
        let id = socket.peer_addr()?;
        configure_keepalive(&socket, config.keep_alive_interval, config.keep_alive_time);
        let write_stream = socket.try_clone()?;

        let connection = Arc::new(Self {
            id,
            connected: AtomicBool::new(true),
            connected_since: Instant::now(),
            user_state: Mutex::new(None),
            parent,
            buffer_pool,
            pipeline,
            registry,
            pool,
            listener: Arc::clone(&listener),
            config,
            read_stream: Mutex::new(socket),
            write_stream: Mutex::new(write_stream),
            chunk_queue: Mutex::new(VecDeque::new()),
            reading_packets: AtomicBool::new(false),
            decoder: Mutex::new(FrameDecoder::new()),
            send_queue: Mutex::new(VecDeque::new()),
            sending_packets: AtomicBool::new(false),
        });

        listener.on_state_change(true);
        Self::spawn_reader(Arc::clone(&connection));
        Ok(connection)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn connected_since(&self) -> Instant {
        self.connected_since
    }

    pub fn set_user_state<T: Any + Send>(&self, state: T) {
        *self.user_state.lock().expect("user state lock poisoned") = Some(Box::new(state));
    }

    pub fn with_user_state<T: Any + Send, R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let guard = self.user_state.lock().expect("user state lock poisoned");
        f(guard.as_ref().and_then(|b| b.downcast_ref::<T>()))
    }

    // ---- receive pump: producer ----

    fn spawn_reader(self: Arc<Self>) {
        std::thread::Builder::new()
            .name(format!("flux-net-reader-{}", self.id))
            .spawn(move || {
                thread_boot(None, ThreadPriority::OSDefault);
                loop {
                    if !self.is_connected() {
                        return;
                    }

                    let mut buf = match self.buffer_pool.acquire() {
                        Ok(buf) => buf,
                        Err(err) => {
                            warn!(?err, id = ?self.id, "buffer pool exhausted, disconnecting");
                            self.disconnect();
                            return;
                        }
                    };

                    let read_result = {
                        let mut stream = self.read_stream.lock().expect("read stream lock poisoned");
                        stream.read(&mut buf)
                    };

                    match read_result {
                        Ok(0) => {
                            debug!(id = ?self.id, "remote closed connection");
                            self.buffer_pool.release(buf);
                            self.disconnect();
                            return;
                        }
                        Ok(n) => {
                            let chunk = buf[..n].to_vec();
                            self.parent.counters().add_received(n as u64);
                            self.buffer_pool.release(buf);
                            self.enqueue_chunk(chunk);
                        }
                        Err(err) => {
                            warn!(?err, id = ?self.id, "read failed, disconnecting");
                            self.buffer_pool.release(buf);
                            self.disconnect();
                            return;
                        }
                    }
                }
            })
            .expect("failed to spawn connection reader thread");
    }

    fn enqueue_chunk(self: &Arc<Self>, chunk: Vec<u8>) {
        self.chunk_queue.lock().expect("chunk queue lock poisoned").push_back(chunk);

        if self
            .reading_packets
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let this = Arc::clone(self);
            self.pool.dispatch(move || this.run_receive_consumer());
        }
    }

    // ---- receive pump: consumer ----

    fn run_receive_consumer(self: Arc<Self>) {
        loop {
            let chunk = self.chunk_queue.lock().expect("chunk queue lock poisoned").pop_front();

            let Some(chunk) = chunk else {
                self.reading_packets.store(false, Ordering::SeqCst);
                let more_work = !self.chunk_queue.lock().expect("chunk queue lock poisoned").is_empty();
                if more_work
                    && self
                        .reading_packets
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                {
                    continue;
                }
                return;
            };

            let result = {
                let mut decoder = self.decoder.lock().expect("decoder lock poisoned");
                decoder.decode_chunk(&chunk, |payload| self.dispatch_read_event(payload))
            };

            if let Err(err) = result {
                // §9 open question resolved: disconnect on any framing error.
                warn!(?err, id = ?self.id, "framing error, disconnecting");
                self.disconnect();
                return;
            }
        }
    }

    fn dispatch_read_event(&self, payload: &[u8]) {
        let plaintext = match self.pipeline.decode(payload) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                warn!(?err, id = ?self.id, "pipeline error, dropping frame");
                return;
            }
        };

        match self.registry.decode(&plaintext) {
            Ok(msg) => self.listener.on_read(msg.as_ref()),
            Err(err) => warn!(?err, id = ?self.id, "registry decode failed, dropping frame"),
        }
    }

    // ---- send pump: submit ----

    pub fn send(self: &Arc<Self>, msg: Box<dyn Message>) {
        let body = self.registry.encode(msg.as_ref());
        self.listener.on_write(msg.as_ref(), body.len(), &body);

        self.send_queue.lock().expect("send queue lock poisoned").push_back(body);

        if self
            .sending_packets
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let this = Arc::clone(self);
            self.pool.dispatch(move || this.run_send_consumer());
        }
    }

    /// Submits `msg` then spins with a 10ms sleep until the sender worker has
    /// drained it, for callers that need write ordering relative to a
    /// subsequent `disconnect` (§4.5).
    pub fn send_blocking(self: &Arc<Self>, msg: Box<dyn Message>) {
        self.send(msg);
        while self.sending_packets.load(Ordering::SeqCst) {
            std::thread::sleep(self.config.send_blocking_poll_interval);
        }
    }

    // ---- send pump: consumer ----

    fn run_send_consumer(self: Arc<Self>) {
        loop {
            if !self.is_connected() {
                self.send_queue.lock().expect("send queue lock poisoned").clear();
                self.sending_packets.store(false, Ordering::SeqCst);
                return;
            }

            let body = self.send_queue.lock().expect("send queue lock poisoned").pop_front();

            let Some(body) = body else {
                self.sending_packets.store(false, Ordering::SeqCst);
                let more_work = !self.send_queue.lock().expect("send queue lock poisoned").is_empty();
                if more_work
                    && self
                        .sending_packets
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                {
                    continue;
                }
                return;
            };

            let encoded = self.pipeline.encode(&body);
            if encoded.len() > frame::MAX_PAYLOAD_LEN {
                safe_panic!("encoded payload of {} bytes exceeds u24 frame header", encoded.len());
                continue;
            }

            let mut wire = Vec::with_capacity(3 + encoded.len());
            wire.extend_from_slice(&frame::encode_header(encoded.len()));
            wire.extend_from_slice(&encoded);

            let write_result = {
                let mut stream = self.write_stream.lock().expect("write stream lock poisoned");
                stream.write_all(&wire)
            };

            match write_result {
                Ok(()) => self.parent.counters().add_sent(wire.len() as u64),
                Err(err) => {
                    warn!(?err, id = ?self.id, "write failed, disconnecting");
                    self.send_queue.lock().expect("send queue lock poisoned").clear();
                    self.sending_packets.store(false, Ordering::SeqCst);
                    self.disconnect();
                    return;
                }
            }
        }
    }

    // ---- lifecycle ----

    /// Idempotent: the `connected` swap ensures the disconnect event and
    /// cleanup below only ever run once (§4.6).
    pub fn disconnect(self: &Arc<Self>) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Ok(stream) = self.write_stream.lock() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }

        *self.user_state.lock().expect("user state lock poisoned") = None;
        self.listener.on_state_change(false);

        if !self.parent.is_processing() {
            self.parent.remove_connection(self.id);
        }
    }
}
