use crate::error::{Result, RpcError};

use super::http::content_length;

/// Marker between the head block and the body.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// One framed HTTP message: the raw head block and the exact body bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub head: String,
    pub body: Vec<u8>,
}

/// Per-connection accumulation buffer.
///
/// Bytes read off the socket are appended as they arrive; complete messages
/// are sliced off the front once the head and `Content-Length` body bytes
/// are both present. A single buffer may hold several pipelined messages;
/// repeated [`next_frame`](Self::next_frame) calls drain them in order.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends freshly read bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Slices the next complete message off the front of the buffer.
    ///
    /// Returns `Ok(None)` while the head or body is still partial. A head
    /// that is not UTF-8 or lacks a `Content-Length` is a parse error.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(middle) = find_terminator(&self.buf) else {
            return Ok(None);
        };

        let head = std::str::from_utf8(&self.buf[..middle])
            .map_err(|_| RpcError::Parse("Head block is not UTF-8".to_string()))?
            .to_string();
        let body_len = content_length(&head)?;

        let total = middle + HEADER_TERMINATOR.len() + body_len;
        if self.buf.len() < total {
            return Ok(None);
        }

        let body = self.buf[middle + HEADER_TERMINATOR.len()..total].to_vec();
        self.buf.drain(..total);
        Ok(Some(Frame { head, body }))
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}
