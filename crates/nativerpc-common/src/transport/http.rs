use crate::error::{Result, RpcError};

/// Largest chunk read from a socket in one call.
pub const MAX_READ_CHUNK: usize = 10 * 1024;

/// An outgoing `POST /<Class>/<Method>` request.
///
/// Carries the identity headers alongside the standard keep-alive set.
/// `server_id` is only present on the connect/close handshakes.
#[derive(Debug, Clone)]
pub struct HttpRequest<'a> {
    pub class_name: &'a str,
    pub method_name: &'a str,
    pub host: &'a str,
    pub port: u16,
    pub project_id: &'a str,
    pub sender_id: &'a str,
    pub server_id: Option<&'a str>,
    pub body: &'a [u8],
}

impl HttpRequest<'_> {
    /// Serializes the request into its wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "POST /{}/{} HTTP/1.1\r\n\
             Host: {}:{}\r\n\
             Connection: keep-alive\r\n\
             Project-Id: {}\r\n\
             Sender-Id: {}\r\n",
            self.class_name, self.method_name, self.host, self.port, self.project_id,
            self.sender_id,
        );
        if let Some(server_id) = self.server_id {
            head.push_str(&format!("Server-Id: {server_id}\r\n"));
        }
        head.push_str(&format!(
            "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
            self.body.len()
        ));

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(self.body);
        bytes
    }
}

/// Serializes a `200 OK` response around a JSON body.
pub fn build_ok_response(body: &[u8]) -> Vec<u8> {
    let head = format!(
        "HTTP/1.1 200 OK\r\n\
         Connection: keep-alive\r\n\
         Content-Length: {}\r\n\
         Content-Type: application/json\r\n\r\n",
        body.len()
    );
    let mut bytes = head.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

/// Serializes a `504 Remote error` response.
///
/// The reason rides on the status line and must stay single-line; embedded
/// newlines are flattened to spaces.
pub fn build_error_response(reason: &str, body: &[u8]) -> Vec<u8> {
    let reason = reason.replace(['\r', '\n'], " ");
    let head = format!(
        "HTTP/1.1 504 Remote error: {reason}\r\n\
         Content-Length: {}\r\n\
         Content-Type: application/problem+json\r\n\r\n",
        body.len()
    );
    let mut bytes = head.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

/// Case-insensitive header lookup over a raw head block.
pub fn header_value(head: &str, name: &str) -> Option<String> {
    for line in head.lines().skip(1) {
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case(name) {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

/// Body length announced by the head block. Missing or malformed
/// `Content-Length` is a parse error.
pub fn content_length(head: &str) -> Result<usize> {
    let value = header_value(head, "Content-Length")
        .ok_or_else(|| RpcError::Parse("Missing Content-Length".to_string()))?;
    value
        .parse()
        .map_err(|_| RpcError::Parse(format!("Bad Content-Length: {value}")))
}

/// Splits a request head into `(method, path)`.
pub fn parse_request_line(head: &str) -> Result<(String, String)> {
    let first = head.lines().next().unwrap_or_default();
    let parts: Vec<&str> = first.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(RpcError::BadRequestLine(first.to_string()));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

/// Splits a `/<Class>/<Method>` path into its route tuple.
pub fn parse_route(path: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
    if parts.len() != 2 {
        return Err(RpcError::BadRequestLine(path.to_string()));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

/// Splits a response head into `(status_code, reason)`.
pub fn parse_status_line(head: &str) -> Result<(u16, String)> {
    let first = head.lines().next().unwrap_or_default();
    let mut parts = first.splitn(3, ' ');
    let _version = parts
        .next()
        .filter(|v| v.starts_with("HTTP/"))
        .ok_or_else(|| RpcError::Parse(format!("Bad status line: {first}")))?;
    let code = parts
        .next()
        .and_then(|c| c.parse().ok())
        .ok_or_else(|| RpcError::Parse(format!("Bad status line: {first}")))?;
    let reason = parts.next().unwrap_or_default().to_string();
    Ok((code, reason))
}
