use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use flux_network::pipeline::{ChaCha20Poly1305Cipher, Pipeline, ZstdCompressor};
use flux_network::{
    Connection, ConnectionConfig, ConnectionListener, FixedBufferPool, LocalServer, Message, MessageRegistry,
    WorkerPool,
};
use flux_utils::ThreadPriority;

#[derive(Debug, Clone, PartialEq, Eq, wincode_derive::Encode, wincode_derive::Decode)]
struct Greeting {
    from: u32,
    text: String,
}

impl Message for Greeting {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Default)]
struct RecordingListener {
    reads: Mutex<Vec<Greeting>>,
    connected_events: Mutex<Vec<bool>>,
}

impl ConnectionListener for RecordingListener {
    fn on_state_change(&self, connected: bool) {
        self.connected_events.lock().unwrap().push(connected);
    }

    fn on_read(&self, msg: &dyn Message) {
        if let Some(greeting) = msg.as_any().downcast_ref::<Greeting>() {
            self.reads.lock().unwrap().push(greeting.clone());
        }
    }

    fn on_write(&self, _msg: &dyn Message, _length: usize, _raw: &[u8]) {}
}

fn shared_registry() -> Arc<MessageRegistry> {
    let registry = Arc::new(MessageRegistry::new());
    registry.register::<Greeting>();
    registry
}

fn shared_pipeline() -> Arc<Pipeline> {
    Arc::new(Pipeline::new(Box::new(ZstdCompressor::default()), Box::new(ChaCha20Poly1305Cipher::new(&[3u8; 32]))))
}

fn wait_for(pred: impl Fn() -> bool, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !pred() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(pred(), "timed out waiting for: {what}");
}

/// Full send -> compress -> encrypt -> frame -> socket -> unframe -> decrypt
/// -> decompress -> registry-decode -> on_read path, across several
/// concurrent connections sharing one worker pool and one server.
#[test]
fn multiple_connections_roundtrip_through_the_full_pipeline() {
    let tcp_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = tcp_listener.local_addr().unwrap();

    let registry = shared_registry();
    let pool = Arc::new(WorkerPool::new(4, ThreadPriority::OSDefault));
    let buffer_pool = Arc::new(FixedBufferPool::new(4096, 32));
    let server: Arc<LocalServer> =
        Arc::new(LocalServer::new(4, Duration::from_secs(30), Duration::from_secs(30)));

    let accept_server = server.clone();
    let accept_registry = registry.clone();
    let accept_pool = pool.clone();
    let accept_buffer_pool = buffer_pool.clone();
    let accepted_listener = Arc::new(RecordingListener::default());
    let accepted_for_thread = accepted_listener.clone();

    let acceptor = std::thread::spawn(move || {
        let mut accepted = Vec::new();
        for _ in 0..3 {
            let (socket, _) = tcp_listener.accept().unwrap();
            let conn = Connection::spawn(
                socket,
                accept_server.clone(),
                accept_registry.clone(),
                shared_pipeline(),
                accept_buffer_pool.clone(),
                accept_pool.clone(),
                accepted_for_thread.clone(),
                ConnectionConfig::default(),
            )
            .unwrap();
            accept_server.track(conn.id());
            accepted.push(conn);
        }
        accepted
    });

    let client_listener = Arc::new(RecordingListener::default());
    let mut clients = Vec::new();
    for i in 0..3 {
        let socket = TcpStream::connect(addr).unwrap();
        let conn = Connection::spawn(
            socket,
            server.clone(),
            registry.clone(),
            shared_pipeline(),
            buffer_pool.clone(),
            pool.clone(),
            client_listener.clone(),
            ConnectionConfig::default(),
        )
        .unwrap();
        conn.send(Box::new(Greeting { from: i, text: format!("hello from {i}") }));
        clients.push(conn);
    }

    let accepted = acceptor.join().unwrap();
    wait_for(|| accepted_listener.reads.lock().unwrap().len() == 3, "all greetings received");

    let mut got: Vec<u32> = accepted_listener.reads.lock().unwrap().iter().map(|g| g.from).collect();
    got.sort_unstable();
    assert_eq!(got, vec![0, 1, 2]);

    for conn in &clients {
        conn.disconnect();
    }
    for conn in &accepted {
        conn.disconnect();
    }

    wait_for(|| server.connection_count() == 0, "all connections removed from server on disconnect");
}

#[test]
fn send_blocking_returns_only_after_drain() {
    let tcp_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = tcp_listener.local_addr().unwrap();

    let registry = shared_registry();
    let pool = Arc::new(WorkerPool::new(2, ThreadPriority::OSDefault));
    let buffer_pool = Arc::new(FixedBufferPool::new(4096, 8));
    let server: Arc<LocalServer> =
        Arc::new(LocalServer::new(4, Duration::from_secs(30), Duration::from_secs(30)));

    let accept_server = server.clone();
    let accept_registry = registry.clone();
    let accept_pool = pool.clone();
    let accept_buffer_pool = buffer_pool.clone();
    let accepted_listener = Arc::new(RecordingListener::default());
    let accepted_for_thread = accepted_listener.clone();

    let acceptor = std::thread::spawn(move || {
        let (socket, _) = tcp_listener.accept().unwrap();
        Connection::spawn(
            socket,
            accept_server,
            accept_registry,
            shared_pipeline(),
            accept_buffer_pool,
            accept_pool,
            accepted_for_thread,
            ConnectionConfig::default(),
        )
        .unwrap()
    });

    let client_listener = Arc::new(RecordingListener::default());
    let socket = TcpStream::connect(addr).unwrap();
    let client = Connection::spawn(
        socket,
        server.clone(),
        registry,
        shared_pipeline(),
        buffer_pool,
        pool,
        client_listener,
        ConnectionConfig::default(),
    )
    .unwrap();

    client.send_blocking(Box::new(Greeting { from: 1, text: "blocking".into() }));

    let accepted = acceptor.join().unwrap();
    wait_for(|| accepted_listener.reads.lock().unwrap().len() == 1, "blocking send delivered");

    client.disconnect();
    accepted.disconnect();
}
