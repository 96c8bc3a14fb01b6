use thiserror::Error;

/// Errors raised while advancing the frame codec's header/payload state machine.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    #[error("header decoded to a zero-length payload")]
    ZeroLengthPayload,
}

/// Errors raised while running a payload through the compress/encrypt pipeline.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineError {
    #[error("decrypt produced an empty output")]
    EmptyAfterDecrypt,
    #[error("decompress produced an empty output")]
    EmptyAfterDecompress,
}

/// Errors raised by the message registry during registration or dispatch.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tag frame truncated: need 4 bytes, got {0}")]
    TruncatedTag(usize),
}

/// Errors raised by a `BufferPool` implementation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    #[error("buffer pool exhausted")]
    PoolExhausted,
}

/// Fatal, connection-ending errors. Framing and pipeline errors are deliberately
/// not part of this enum: per spec they are swallowed at the pump boundary and
/// logged rather than propagated as a disconnect.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("socket io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("remote closed the connection")]
    RemoteClosed,
    #[error(transparent)]
    Resource(#[from] ResourceError),
}
