//! HTTP/1.1 transport utilities.
//!
//! The wire protocol is plain HTTP/1.1 over TCP with keep-alive: every call
//! is a `POST /<Class>/<Method>` carrying a JSON body, every reply is a
//! `200 OK` JSON body or a `504 Remote error` problem document. Framing is
//! done by hand against a per-connection byte buffer so that pipelined
//! messages on one socket are drained in order.
//!
//! # Components
//!
//! - [`http`] - request/response serialization and head parsing
//! - [`frame`] - the per-connection [`FrameBuffer`](frame::FrameBuffer)
//! - [`round_trip`] - synchronous send-and-receive used by the client

pub mod frame;
pub mod http;

pub use frame::{Frame, FrameBuffer};
pub use http::{
    build_error_response, build_ok_response, content_length, header_value, parse_request_line,
    parse_route, parse_status_line, HttpRequest, MAX_READ_CHUNK,
};

use std::io::Read;
use std::net::TcpStream;
use std::time::Duration;

use serde_json::Value;

use crate::error::{Result, RpcError};

/// Receive timeout applied to client sockets.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Sends one framed request and blocks until the matching response arrives.
///
/// Reads that hit the socket's receive timeout are retried transparently;
/// an EOF from the peer surfaces as [`RpcError::PeerClosed`]. Returns the
/// status code, the status reason and the parsed JSON body.
pub fn round_trip(stream: &mut TcpStream, request: &[u8]) -> Result<(u16, String, Value)> {
    use std::io::Write;

    stream.write_all(request)?;

    let mut frames = FrameBuffer::new();
    let mut chunk = [0u8; MAX_READ_CHUNK];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => return Err(RpcError::PeerClosed),
            Ok(received) => {
                frames.extend(&chunk[..received]);
                if let Some(frame) = frames.next_frame()? {
                    let (code, reason) = parse_status_line(&frame.head)?;
                    let payload = serde_json::from_slice(&frame.body)?;
                    return Ok((code, reason, payload));
                }
            }
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
}
