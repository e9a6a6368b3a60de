use std::net::TcpStream;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use nativerpc_common::schema::{
    metadata_entries, MethodEntry, SchemaEntry, Serializer, TypeRegistry, METADATA_CLASS,
};
use nativerpc_common::transport::{round_trip, HttpRequest, RECV_TIMEOUT};
use nativerpc_common::{process_identity, ClientOptions, ProcessIdentity, Result, RpcError};

/// One keep-alive RPC connection with a typed proxy over the target class.
///
/// The proxy table records `(class, method, request type, response type)`
/// for every method of the class, in declaration order. Calls are strictly
/// request/response over the single connection; reads that hit the 1 s
/// receive timeout are retried until the peer answers or hangs up.
pub struct RpcClient {
    options: ClientOptions,
    serializer: Serializer,
    methods: Vec<MethodEntry>,
    metadata_methods: Vec<MethodEntry>,
    identity: ProcessIdentity,
    socket: Option<TcpStream>,
    connection_id: i64,
}

impl RpcClient {
    /// Connects and performs the `connectClient` handshake using the
    /// identity of the running process.
    pub fn connect(options: ClientOptions, schema: Vec<SchemaEntry>) -> Result<Self> {
        Self::connect_with_identity(options, schema, process_identity())
    }

    /// Connects with an explicit identity. Used by processes that manage
    /// several logical clients under different project ids.
    pub fn connect_with_identity(
        options: ClientOptions,
        schema: Vec<SchemaEntry>,
        identity: ProcessIdentity,
    ) -> Result<Self> {
        let mut entries = schema;
        entries.extend(metadata_entries());
        let registry = Rc::new(TypeRegistry::from_entries(entries)?);
        let serializer = Serializer::new(registry.clone());
        let methods = registry.methods_of(options.class_name())?;
        let metadata_methods = registry.methods_of(METADATA_CLASS)?;

        let socket = TcpStream::connect((options.host(), options.port())).map_err(|err| {
            RpcError::HandshakeFailed(format!(
                "Failed to connect to {}:{}: {err}",
                options.host(),
                options.port()
            ))
        })?;
        socket.set_read_timeout(Some(RECV_TIMEOUT))?;

        let mut client = Self {
            options,
            serializer,
            methods,
            metadata_methods,
            identity,
            socket: Some(socket),
            connection_id: -1,
        };
        client.handshake()?;
        Ok(client)
    }

    /// Connection id assigned by the server at handshake.
    pub fn connection_id(&self) -> i64 {
        self.connection_id
    }

    /// The proxy table: the target class's methods in declaration order.
    pub fn methods(&self) -> &[MethodEntry] {
        &self.methods
    }

    /// Calls a method of the target class with a JSON argument.
    ///
    /// The argument is canonicalized through the method's request layout
    /// before sending; the reply is canonicalized through the response
    /// layout. A non-200 reply raises [`RpcError::Remote`].
    pub fn call(&mut self, method_name: &str, request: Value) -> Result<Value> {
        let entry = self
            .methods
            .iter()
            .find(|m| m.method_name == method_name)
            .cloned()
            .ok_or_else(|| {
                RpcError::FailedToRoute(format!(
                    "{}.{method_name}",
                    self.options.class_name()
                ))
            })?;
        self.invoke(&entry, "call", request)
    }

    /// Typed variant of [`call`](Self::call): the argument and reply pass
    /// through serde on top of the layout canonicalization.
    pub fn call_as<Req, Resp>(&mut self, method_name: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let reply = self.call(method_name, serde_json::to_value(request)?)?;
        Ok(serde_json::from_value(reply)?)
    }

    /// Fetches the server's `Metadata.getMetadata` report.
    pub fn get_metadata(&mut self) -> Result<Value> {
        let entry = self.metadata_method("getMetadata")?;
        self.invoke(&entry, "call", json!({}))
    }

    /// Sends `closeClient` and releases the socket. Idempotent: a second
    /// close is a no-op. A failing close round-trip is logged and the
    /// socket is released regardless.
    pub fn close(&mut self) -> Result<()> {
        if self.socket.is_none() {
            return Ok(());
        }

        let mut payload = serde_json::to_value(&self.identity)?;
        payload["connectionId"] = json!(self.connection_id);
        let body = serde_json::to_vec(&payload)?;
        let result = self.request(METADATA_CLASS, "closeClient", "close", Some("close"), &body);
        self.socket = None;

        match result {
            Ok((200, ..)) => {
                tracing::debug!("Closed connection: {}", self.connection_id);
            }
            Ok((_, reason, _)) => {
                tracing::warn!("Failing to close cleanly: {reason}");
            }
            Err(err) => {
                tracing::warn!("Failing to close cleanly: {err}");
            }
        }
        Ok(())
    }

    fn handshake(&mut self) -> Result<()> {
        let body = serde_json::to_vec(&self.identity)?;
        let (code, reason, payload) = self
            .request(METADATA_CLASS, "connectClient", "connect", Some("connect"), &body)
            .map_err(|err| RpcError::HandshakeFailed(err.to_string()))?;
        if code != 200 {
            return Err(RpcError::HandshakeFailed(reason));
        }
        self.connection_id = payload
            .get("connectionId")
            .and_then(Value::as_i64)
            .unwrap_or(-1);
        tracing::debug!(
            "Connected to {}:{} as connection {}",
            self.options.host(),
            self.options.port(),
            self.connection_id
        );
        Ok(())
    }

    fn metadata_method(&self, method_name: &str) -> Result<MethodEntry> {
        self.metadata_methods
            .iter()
            .find(|m| m.method_name == method_name)
            .cloned()
            .ok_or_else(|| RpcError::FailedToRoute(format!("{METADATA_CLASS}.{method_name}")))
    }

    fn invoke(&mut self, entry: &MethodEntry, sender_id: &str, request: Value) -> Result<Value> {
        let request_type = &entry.request_type.name;
        let mut instance = self.serializer.create_instance(request_type)?;
        self.serializer
            .from_json(request_type, &request, &mut instance)?;
        let canonical = self.serializer.destroy_and_get(request_type, instance)?;
        let body = serde_json::to_vec(&canonical)?;

        let (code, reason, payload) =
            self.request(&entry.class_name, &entry.method_name, sender_id, None, &body)?;
        if code != 200 {
            return Err(RpcError::Remote(remote_reason(&reason, &payload)));
        }

        let response_type = &entry.response_type.name;
        let mut response = self.serializer.create_instance(response_type)?;
        self.serializer
            .from_json(response_type, &payload, &mut response)?;
        self.serializer.destroy_and_get(response_type, response)
    }

    fn request(
        &mut self,
        class_name: &str,
        method_name: &str,
        sender_id: &str,
        server_id: Option<&str>,
        body: &[u8],
    ) -> Result<(u16, String, Value)> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(RpcError::PeerClosed);
        };
        let bytes = HttpRequest {
            class_name,
            method_name,
            host: self.options.host(),
            port: self.options.port(),
            project_id: &self.identity.project_id,
            sender_id,
            server_id,
            body,
        }
        .to_bytes();
        round_trip(socket, &bytes)
    }
}

/// Error detail of a non-200 reply: the body's `error` field when present,
/// otherwise the status reason.
fn remote_reason(reason: &str, payload: &Value) -> String {
    payload
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| reason.to_string())
}
