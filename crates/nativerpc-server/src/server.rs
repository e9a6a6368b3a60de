use std::cell::RefCell;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use serde_json::{json, Value};

use nativerpc_common::schema::{
    metadata_entries, SchemaEntry, Serializer, TypeRegistry, METADATA_CLASS, SYSTEM_PROJECT_ID,
};
use nativerpc_common::transport::{
    build_error_response, build_ok_response, header_value, parse_request_line, parse_route, Frame,
    MAX_READ_CHUNK,
};
use nativerpc_common::{process_identity, ProcessIdentity, Result, RpcError, ServerOptions};

use crate::connection::{now_millis, Connection, ConnectionTable};
use crate::service::{BuiltinMethod, MethodTable, MethodTarget, RpcService};

const LISTENER_TOKEN: Token = Token(0);
const POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// Error code recorded on a connection closed by the 504 path.
const ERROR_CODE_REMOTE: i32 = 50001;

/// The RPC server: listening socket, connection table and dispatch table,
/// driven by a single-threaded readiness loop.
///
/// Construction builds the schema registry (user entries plus the built-in
/// `Metadata` entries) and the route table; [`listen`](Self::listen) then
/// runs the loop forever. Method handlers are synchronous: while one runs,
/// no other connection is serviced.
pub struct Server {
    options: ServerOptions,
    registry: Rc<TypeRegistry>,
    serializer: Serializer,
    methods: MethodTable,
    table: ConnectionTable,
    identity: ProcessIdentity,
    current_connection: Option<u32>,
    poll: Poll,
    events: Events,
    listener: Option<TcpListener>,
    bound_port: u16,
    accept_pending: bool,
}

impl Server {
    /// Builds a server for `service`, registered under the class named in
    /// the options. The schema entries are the external parser's output for
    /// the project's message files.
    pub fn new(
        options: ServerOptions,
        schema: Vec<SchemaEntry>,
        service: Rc<RefCell<dyn RpcService>>,
    ) -> Result<Self> {
        let mut entries = schema;
        entries.extend(metadata_entries());
        let registry = Rc::new(TypeRegistry::from_entries(entries)?);
        let serializer = Serializer::new(registry.clone());

        let mut methods = MethodTable::new();
        for entry in registry.methods_of(METADATA_CLASS)? {
            let builtin = BuiltinMethod::from_name(&entry.method_name)
                .ok_or_else(|| RpcError::FailedToRoute(entry.route()))?;
            methods.insert(entry, MethodTarget::Builtin(builtin));
        }
        for entry in registry.methods_of(options.class_name())? {
            let target = MethodTarget::User {
                service: service.clone(),
                method_index: entry.method_index,
            };
            methods.insert(entry, target);
        }
        tracing::debug!(
            "Registered service: {} as {} ({} routes)",
            options.class_name(),
            options.registration_name(),
            methods.len()
        );

        Ok(Self {
            options,
            registry,
            serializer,
            methods,
            table: ConnectionTable::new(),
            identity: process_identity(),
            current_connection: None,
            poll: Poll::new()?,
            events: Events::with_capacity(256),
            listener: None,
            bound_port: 0,
            accept_pending: false,
        })
    }

    /// Port the listener is bound to; 0 before [`bind`](Self::bind).
    pub fn local_port(&self) -> u16 {
        self.bound_port
    }

    /// Connection id of the request currently being dispatched.
    pub fn current_connection(&self) -> Option<u32> {
        self.current_connection
    }

    /// Binds the listening socket. Idempotent; [`listen`](Self::listen)
    /// calls it on first use.
    pub fn bind(&mut self) -> Result<()> {
        if self.listener.is_some() {
            return Ok(());
        }
        let addr: SocketAddr = format!("{}:{}", self.options.bind_host(), self.options.port())
            .parse()
            .map_err(|_| {
                RpcError::Parse(format!(
                    "Bad bind address: {}:{}",
                    self.options.bind_host(),
                    self.options.port()
                ))
            })?;
        let mut listener = TcpListener::bind(addr)?;
        self.poll
            .registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        self.bound_port = listener.local_addr()?.port();
        tracing::info!(
            "Server running at http://{}:{}/",
            self.options.bind_host(),
            self.bound_port
        );
        self.listener = Some(listener);
        Ok(())
    }

    /// Runs the readiness loop forever.
    pub fn listen(&mut self) -> Result<()> {
        self.bind()?;
        loop {
            self.poll_once()?;
        }
    }

    /// One loop iteration: reclaim expired closed connections, wait up to
    /// 500 ms for readiness, then accept and read.
    pub fn poll_once(&mut self) -> Result<()> {
        self.table.reclaim(now_millis());

        if self.accept_pending && !self.table.at_capacity() {
            self.accept_ready()?;
        }

        self.poll.poll(&mut self.events, Some(POLL_TIMEOUT))?;
        let tokens: Vec<Token> = self.events.iter().map(|event| event.token()).collect();
        for token in tokens {
            if token == LISTENER_TOKEN {
                self.accept_ready()?;
            } else {
                self.read_ready(token)?;
            }
        }
        Ok(())
    }

    fn accept_ready(&mut self) -> Result<()> {
        self.accept_pending = false;
        loop {
            if self.table.at_capacity() {
                // Leave the remainder in the kernel backlog; retried once a
                // slot frees up.
                self.accept_pending = true;
                tracing::warn!("Connection ceiling reached, not accepting");
                return Ok(());
            }
            let Some(listener) = self.listener.as_ref() else {
                return Ok(());
            };
            match listener.accept() {
                Ok((mut socket, addr)) => {
                    let connection_id = self.table.next_connection_id();
                    self.poll.registry().register(
                        &mut socket,
                        Token(connection_id as usize),
                        Interest::READABLE,
                    )?;
                    let connection = Connection::new(
                        connection_id,
                        Some(socket),
                        (addr.ip().to_string(), addr.port()),
                        now_millis(),
                    );
                    self.table.insert(connection);
                    tracing::debug!(
                        "Adding client: {}, {} active, {} closed",
                        connection_id,
                        self.table.active().len(),
                        self.table.closed().len()
                    );
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn read_ready(&mut self, token: Token) -> Result<()> {
        let Some(index) = self.table.index_of_token(token) else {
            return Ok(());
        };

        let mut eof = false;
        let mut error_code = None;
        let mut chunk = [0u8; MAX_READ_CHUNK];
        loop {
            let connection = self.table.active_mut(index);
            let Some(socket) = connection.socket.as_mut() else {
                return Ok(());
            };
            match socket.read(&mut chunk) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(received) => connection.frames.extend(&chunk[..received]),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    error_code = Some(err.raw_os_error().unwrap_or(-1));
                    break;
                }
            }
        }

        if let Some(code) = error_code {
            tracing::warn!(
                "Failing client: {}, code={}",
                self.table.active()[index].connection_id,
                code
            );
            self.close_connection(index, code);
            return Ok(());
        }

        // Drain every fully framed request in arrival order before acting
        // on an EOF seen in the same readiness batch.
        loop {
            let frame = match self.table.active_mut(index).frames.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    self.respond_error(index, &err);
                    return Ok(());
                }
            };
            if !self.handle_frame(index, frame)? {
                return Ok(());
            }
        }

        if eof {
            tracing::debug!(
                "Removing client: {}, {} active, {} closed",
                self.table.active()[index].connection_id,
                self.table.active().len(),
                self.table.closed().len()
            );
            self.close_connection(index, 0);
        }
        Ok(())
    }

    /// Dispatches one framed request; returns whether the connection is
    /// still open afterwards.
    fn handle_frame(&mut self, index: usize, frame: Frame) -> Result<bool> {
        let route = parse_request_line(&frame.head).and_then(|(method, path)| {
            if method != "POST" {
                return Err(RpcError::BadRequestLine(format!(
                    "Only accepting POST: {method}"
                )));
            }
            Ok(path)
        });

        {
            let connection = self.table.active_mut(index);
            connection.last_active_at = now_millis();
            connection.message_count += 1;
            if let Some(sender_id) = header_value(&frame.head, "Sender-Id") {
                connection.sender_id = sender_id;
            }
            // Normally populated by connectClient.
            if let Some(project_id) = header_value(&frame.head, "Project-Id") {
                if !project_id.is_empty() {
                    connection.project_id = project_id;
                }
            }
            if let Ok(path) = &route {
                connection.call_id = path.clone();
            }
        }

        self.current_connection = Some(self.table.active()[index].connection_id);
        let result = route.and_then(|path| self.dispatch(index, &path, &frame.body));
        self.current_connection = None;

        match result {
            Ok(payload) => {
                let body = serde_json::to_vec(&payload)?;
                if let Err(err) = self.write_to(index, &build_ok_response(&body)) {
                    tracing::warn!(
                        "Failing client: {}, {}",
                        self.table.active()[index].connection_id,
                        err
                    );
                    self.close_connection(index, err.raw_os_error().unwrap_or(-1));
                    return Ok(false);
                }
                Ok(true)
            }
            Err(err) => {
                self.respond_error(index, &err);
                Ok(false)
            }
        }
    }

    /// Routes `POST /<Class>/<Method>` to its registered target.
    ///
    /// The request body is canonicalized through the request layout, the
    /// target is invoked, and the returned value is canonicalized through
    /// the response layout.
    fn dispatch(&mut self, index: usize, path: &str, body: &[u8]) -> Result<Value> {
        let (class_name, method_name) = parse_route(path)?;
        let route = format!("{class_name}.{method_name}");
        let (entry, target) = self
            .methods
            .lookup(&route)
            .cloned()
            .ok_or_else(|| RpcError::FailedToRoute(route))?;

        let payload: Value = serde_json::from_slice(body)?;
        let request_type = &entry.request_type.name;
        let mut request = self.serializer.create_instance(request_type)?;
        self.serializer.from_json(request_type, &payload, &mut request)?;
        let canonical = self.serializer.destroy_and_get(request_type, request)?;

        let returned = match target {
            MethodTarget::Builtin(BuiltinMethod::ConnectClient) => {
                self.connect_client(index, &canonical)?
            }
            MethodTarget::Builtin(BuiltinMethod::GetMetadata) => {
                self.get_metadata(index, &canonical)?
            }
            MethodTarget::Builtin(BuiltinMethod::CloseClient) => {
                self.close_client(index, &canonical)?
            }
            MethodTarget::User {
                service,
                method_index,
            } => service.borrow_mut().invoke(method_index, canonical)?,
        };

        let response_type = &entry.response_type.name;
        let mut response = self.serializer.create_instance(response_type)?;
        self.serializer
            .from_json(response_type, &returned, &mut response)?;
        self.serializer.destroy_and_get(response_type, response)
    }

    /// Records the client's identity on the current connection.
    fn connect_client(&mut self, index: usize, param: &Value) -> Result<Value> {
        let connection = self.table.active_mut(index);
        connection.process_id = str_field(param, "clientId");
        connection.parent_id = str_field(param, "parentId");
        connection.shell_id = str_field(param, "shellId");
        connection.entry_point = str_field(param, "entryPoint");
        connection.project_id = str_field(param, "projectId");
        let connection_id = connection.connection_id;
        tracing::debug!(
            "Client connected: {}, {}",
            connection_id,
            connection.project_id
        );

        Ok(json!({
            "projectId": self.identity.project_id,
            "connected": true,
            "port": self.bound_port,
            "connectionId": connection_id,
        }))
    }

    /// Reports the server's view of its peers and schema.
    ///
    /// Client listings exclude the runtime's own health probes, include
    /// both active and closed connections, and are ordered by connection id.
    fn get_metadata(&mut self, index: usize, _param: &Value) -> Result<Value> {
        self.table.reclaim(now_millis());

        let requester = &self.table.active()[index];
        if requester.project_id != SYSTEM_PROJECT_ID {
            tracing::debug!(
                "Responding to metadata: {}, {}",
                requester.connection_id,
                requester.project_id
            );
        }

        let mut peers: Vec<&Connection> = self
            .table
            .active()
            .iter()
            .chain(self.table.closed().iter())
            .filter(|c| c.project_id != SYSTEM_PROJECT_ID)
            .collect();
        peers.sort_by_key(|c| c.connection_id);
        let client_infos: Vec<Value> = peers.iter().map(|c| c.info()).collect();

        Ok(json!({
            "projectId": self.identity.project_id,
            "port": self.bound_port,
            "entryPoint": self.identity.entry_point,
            "clientCounts": [
                self.table.active().len(),
                self.table.closed().len(),
                client_infos.len(),
            ],
            "clientInfos": client_infos,
            "schemaList": self.registry.entries(),
        }))
    }

    /// Acknowledges a close request after checking the caller's identity.
    /// The socket itself is torn down by the EOF that follows.
    fn close_client(&mut self, index: usize, param: &Value) -> Result<Value> {
        let connection = &self.table.active()[index];
        let client_id = str_field(param, "clientId");
        let project_id = str_field(param, "projectId");
        if connection.process_id != client_id {
            return Err(RpcError::Parse(format!(
                "Mismatch in close: {}, {}, {}",
                connection.connection_id, connection.process_id, client_id
            )));
        }
        if connection.project_id != project_id {
            return Err(RpcError::Parse("Mismatch in project id".to_string()));
        }

        Ok(json!({
            "projectId": self.identity.project_id,
            "connected": false,
            "port": self.bound_port,
            "connectionId": connection.connection_id,
        }))
    }

    /// Packages a dispatch failure into a `504` reply and closes the
    /// connection.
    fn respond_error(&mut self, index: usize, err: &RpcError) {
        let reason = err.to_string();
        let body = json!({ "error": reason }).to_string();
        let bytes = build_error_response(&reason, body.as_bytes());
        if let Err(write_err) = self.write_to(index, &bytes) {
            tracing::warn!("Failed to send error reply: {write_err}");
        }
        tracing::warn!(
            "Errored client: {}, {}",
            self.table.active()[index].connection_id,
            reason
        );
        self.close_connection(index, ERROR_CODE_REMOTE);
    }

    fn write_to(&mut self, index: usize, bytes: &[u8]) -> std::io::Result<()> {
        let connection = self.table.active_mut(index);
        let Some(socket) = connection.socket.as_mut() else {
            return Err(std::io::ErrorKind::NotConnected.into());
        };
        write_all(socket, bytes)
    }

    fn close_connection(&mut self, index: usize, error_code: i32) {
        if let Some(mut socket) = self.table.close_at(index, error_code, now_millis()) {
            let _ = self.poll.registry().deregister(&mut socket);
        }
    }
}

fn str_field(param: &Value, name: &str) -> String {
    param
        .get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn write_all(socket: &mut TcpStream, mut bytes: &[u8]) -> std::io::Result<()> {
    while !bytes.is_empty() {
        match socket.write(bytes) {
            Ok(0) => return Err(std::io::ErrorKind::WriteZero.into()),
            Ok(written) => bytes = &bytes[written..],
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::yield_now();
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    socket.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl RpcService for Echo {
        fn invoke(&mut self, _method_index: usize, request: Value) -> Result<Value> {
            Ok(request)
        }
    }

    fn echo_server() -> Server {
        let entries = vec![SchemaEntry::method("Echo", "echo", "dict", "dict")];
        let options = ServerOptions::new("Echo", "EchoService", "127.0.0.1", 0);
        Server::new(options, entries, Rc::new(RefCell::new(Echo))).unwrap()
    }

    #[test]
    fn test_construction_registers_builtin_and_user_routes() {
        let server = echo_server();
        assert!(server.methods.lookup("Echo.echo").is_some());
        assert!(server.methods.lookup("Metadata.connectClient").is_some());
        assert!(server.methods.lookup("Metadata.getMetadata").is_some());
        assert!(server.methods.lookup("Metadata.closeClient").is_some());
        assert_eq!(server.methods.len(), 4);
    }

    #[test]
    fn test_unknown_service_class_fails_construction() {
        let options = ServerOptions::new("Ghost", "GhostService", "127.0.0.1", 0);
        let result = Server::new(options, Vec::new(), Rc::new(RefCell::new(Echo)));
        assert!(matches!(result, Err(RpcError::TypeNotFound(_))));
    }

    #[test]
    fn test_bind_assigns_ephemeral_port() {
        let mut server = echo_server();
        assert_eq!(server.local_port(), 0);
        server.bind().unwrap();
        assert_ne!(server.local_port(), 0);
    }
}
