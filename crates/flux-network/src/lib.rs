//! Length-prefixed, encrypted, compressed, typed-message transport layered
//! over a connected TCP stream. See the crate's design notes for the
//! architecture of the receive/send pumps and the connection lifecycle.

pub mod buffer_pool;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod frame;
pub mod pipeline;
pub mod pool;
pub mod registry;
pub mod server;

pub use buffer_pool::{BufferPool, FixedBufferPool};
pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionId};
pub use events::ConnectionListener;
pub use frame::{FrameDecoder, MAX_PAYLOAD_LEN};
pub use pipeline::{ChaCha20Poly1305Cipher, Cipher, Compressor, Pipeline, ZstdCompressor};
pub use pool::WorkerPool;
pub use registry::{Message, MessageRegistry, UnknownMessage};
pub use server::{ByteCounters, LocalServer, ParentServer};
