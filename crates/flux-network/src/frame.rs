//! Length-prefixed frame codec.
//!
//! Wire format is `⟨len: u24-LE⟩ ⟨payload: len bytes⟩` repeated, with no type
//! byte, checksum, or version (§4.1). The decoder is fed arbitrary-size chunks
//! and hands a completed payload to a callback as soon as one is assembled,
//! looping within a chunk so multiple frames in one delivery are all emitted.

use crate::error::FramingError;

const HEADER_LEN: usize = 3;
/// 2^24 - 1, the largest payload length a 3-byte LE header can express.
pub const MAX_PAYLOAD_LEN: usize = 0x00FF_FFFF;

#[derive(Debug)]
enum ReceivePhase {
    ReadingHeader,
    ReadingPayload,
}

/// Per-connection decoder scratch state. Touched only by the receive pump's
/// single consumer: no internal locking.
#[derive(Debug)]
pub struct FrameDecoder {
    phase: ReceivePhase,
    payload_len: usize,
    payload_buffer: Vec<u8>,
    write_offset: usize,
    temp_header: [u8; HEADER_LEN],
    temp_header_offset: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            phase: ReceivePhase::ReadingHeader,
            payload_len: 0,
            payload_buffer: Vec::new(),
            write_offset: 0,
            temp_header: [0; HEADER_LEN],
            temp_header_offset: 0,
        }
    }

    /// Feeds one chunk through the state machine, invoking `on_frame` for
    /// every payload fully assembled while draining it. Returns an error as
    /// soon as a header decodes to zero; per §7 the caller does not
    /// disconnect on this, it simply stops processing the current chunk.
    pub fn decode_chunk(
        &mut self,
        chunk: &[u8],
        mut on_frame: impl FnMut(&[u8]),
    ) -> Result<(), FramingError> {
        let mut cursor = 0usize;

        while cursor < chunk.len() {
            match self.phase {
                ReceivePhase::ReadingHeader => {
                    let readable = chunk.len() - cursor;
                    let need = HEADER_LEN - self.temp_header_offset;

                    if readable >= need {
                        self.temp_header[self.temp_header_offset..HEADER_LEN]
                            .copy_from_slice(&chunk[cursor..cursor + need]);
                        cursor += need;
                        self.temp_header_offset = 0;

                        let len = u32::from(self.temp_header[0])
                            | (u32::from(self.temp_header[1]) << 8)
                            | (u32::from(self.temp_header[2]) << 16);

                        if len == 0 {
                            return Err(FramingError::ZeroLengthPayload);
                        }

                        self.payload_len = len as usize;
                        self.payload_buffer = vec![0u8; self.payload_len];
                        self.write_offset = 0;
                        self.phase = ReceivePhase::ReadingPayload;
                    } else {
                        self.temp_header[self.temp_header_offset..self.temp_header_offset + readable]
                            .copy_from_slice(&chunk[cursor..]);
                        self.temp_header_offset += readable;
                        cursor += readable;
                    }
                }

                ReceivePhase::ReadingPayload => {
                    let readable = chunk.len() - cursor;
                    let remaining = self.payload_len - self.write_offset;
                    let take = readable.min(remaining);

                    self.payload_buffer[self.write_offset..self.write_offset + take]
                        .copy_from_slice(&chunk[cursor..cursor + take]);
                    self.write_offset += take;
                    cursor += take;

                    if self.write_offset == self.payload_len {
                        on_frame(&self.payload_buffer);

                        self.phase = ReceivePhase::ReadingHeader;
                        self.write_offset = 0;
                        self.payload_len = 0;
                        self.payload_buffer = Vec::new();
                    }
                }
            }
        }

        Ok(())
    }
}

/// Builds the 3-byte little-endian length header for `payload_len`.
///
/// # Panics
/// Panics if `payload_len` exceeds [`MAX_PAYLOAD_LEN`].
pub fn encode_header(payload_len: usize) -> [u8; HEADER_LEN] {
    assert!(payload_len <= MAX_PAYLOAD_LEN, "payload of {payload_len} bytes exceeds u24 header");
    let len = payload_len as u32;
    [len as u8, (len >> 8) as u8, (len >> 16) as u8]
}
