use std::time::{SystemTime, UNIX_EPOCH};

use mio::net::TcpStream;
use mio::Token;
use serde_json::{json, Value};

use nativerpc_common::transport::FrameBuffer;

/// Ceiling on simultaneous connections, active and closed together.
pub const MAX_CONNECTIONS: usize = 64;

/// Grace window during which closed connections stay observable via
/// `Metadata.getMetadata` before being reclaimed.
pub const CLOSED_GRACE_MS: i64 = 5_000;

/// Milliseconds since the UNIX epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

/// Per-peer bookkeeping for one TCP session.
///
/// A connection moves from active to closed on EOF, I/O error or protocol
/// error; once closed its socket is released (`closed` implies no socket).
#[derive(Debug)]
pub struct Connection {
    pub connection_id: u32,
    pub socket: Option<TcpStream>,
    pub peer_addr: (String, u16),
    pub started_at: i64,
    pub last_active_at: i64,
    pub frames: FrameBuffer,
    pub project_id: String,
    pub sender_id: String,
    pub call_id: String,
    pub process_id: String,
    pub parent_id: String,
    pub shell_id: String,
    pub entry_point: String,
    pub message_count: u64,
    pub closed: bool,
    pub error_code: i32,
}

impl Connection {
    pub fn new(
        connection_id: u32,
        socket: Option<TcpStream>,
        peer_addr: (String, u16),
        now: i64,
    ) -> Self {
        Self {
            connection_id,
            socket,
            peer_addr,
            started_at: now,
            last_active_at: now,
            frames: FrameBuffer::new(),
            project_id: "unknown".to_string(),
            sender_id: String::new(),
            call_id: String::new(),
            process_id: String::new(),
            parent_id: String::new(),
            shell_id: String::new(),
            entry_point: String::new(),
            message_count: 0,
            closed: false,
            error_code: 0,
        }
    }

    /// Poll token of this connection; token 0 belongs to the listener.
    pub fn token(&self) -> Token {
        Token(self.connection_id as usize)
    }

    /// The `clientInfos` record reported by `Metadata.getMetadata`.
    pub fn info(&self) -> Value {
        json!({
            "connectionId": self.connection_id,
            "address": [self.peer_addr.0, self.peer_addr.1],
            "readSize": self.frames.len(),
            "active": !self.closed,
            "closed": self.closed,
            "stime": self.started_at as f64 / 1000.0,
            "wtime": self.last_active_at as f64 / 1000.0,
            "projectId": self.project_id,
            "messageCount": self.message_count,
            "senderId": self.sender_id,
            "callId": self.call_id,
            "processId": self.process_id,
            "shellId": self.shell_id,
        })
    }
}

/// The server's connection table: active peers, recently closed peers and
/// the id counter. Ids start at 1 and increase in accept order.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    active: Vec<Connection>,
    closed: Vec<Connection>,
    next_id: u32,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_connection_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn insert(&mut self, connection: Connection) {
        self.active.push(connection);
    }

    pub fn active(&self) -> &[Connection] {
        &self.active
    }

    pub fn active_mut(&mut self, index: usize) -> &mut Connection {
        &mut self.active[index]
    }

    pub fn closed(&self) -> &[Connection] {
        &self.closed
    }

    pub fn total(&self) -> usize {
        self.active.len() + self.closed.len()
    }

    pub fn at_capacity(&self) -> bool {
        self.total() >= MAX_CONNECTIONS
    }

    pub fn index_of_token(&self, token: Token) -> Option<usize> {
        self.active.iter().position(|c| c.token() == token)
    }

    /// Moves an active connection to the closed list, releasing its socket.
    ///
    /// The socket is handed back to the caller so it can be deregistered
    /// from the poll before being dropped.
    pub fn close_at(&mut self, index: usize, error_code: i32, now: i64) -> Option<TcpStream> {
        let mut connection = self.active.remove(index);
        let socket = connection.socket.take();
        connection.closed = true;
        connection.error_code = error_code;
        connection.last_active_at = now;
        self.closed.push(connection);
        socket
    }

    /// Drops closed entries older than the grace window.
    pub fn reclaim(&mut self, now: i64) {
        self.closed
            .retain(|c| now - c.last_active_at <= CLOSED_GRACE_MS);
    }
}
