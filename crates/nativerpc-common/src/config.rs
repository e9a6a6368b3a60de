//! Server and client options objects.
//!
//! Both ends are configured with a small JSON options object:
//!
//! ```json
//! { "service": ["Calc", "CalcService"], "host": ["127.0.0.1", 9301] }
//! ```
//!
//! The server variant names the service class and the registration name of
//! the instance serving it; the client variant names only the class it wants
//! a proxy for.

use serde::{Deserialize, Serialize};

/// Options for constructing a server.
///
/// `service` is the `[class_name, registration_name]` pair and `host` is the
/// `[bind_host, port]` pair from the options object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerOptions {
    pub service: (String, String),
    pub host: (String, u16),
}

impl ServerOptions {
    pub fn new(
        class_name: impl Into<String>,
        registration_name: impl Into<String>,
        bind_host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            service: (class_name.into(), registration_name.into()),
            host: (bind_host.into(), port),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.service.0
    }

    pub fn registration_name(&self) -> &str {
        &self.service.1
    }

    pub fn bind_host(&self) -> &str {
        &self.host.0
    }

    pub fn port(&self) -> u16 {
        self.host.1
    }
}

/// Options for constructing a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientOptions {
    pub service: String,
    pub host: (String, u16),
}

impl ClientOptions {
    pub fn new(class_name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            service: class_name.into(),
            host: (host.into(), port),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.service
    }

    pub fn host(&self) -> &str {
        &self.host.0
    }

    pub fn port(&self) -> u16 {
        self.host.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_options_from_json() {
        let options: ServerOptions = serde_json::from_value(json!({
            "service": ["Calc", "CalcService"],
            "host": ["127.0.0.1", 9301],
        }))
        .unwrap();

        assert_eq!(options.class_name(), "Calc");
        assert_eq!(options.registration_name(), "CalcService");
        assert_eq!(options.bind_host(), "127.0.0.1");
        assert_eq!(options.port(), 9301);
    }

    #[test]
    fn test_client_options_from_json() {
        let options: ClientOptions = serde_json::from_value(json!({
            "service": "Calc",
            "host": ["127.0.0.1", 9301],
        }))
        .unwrap();

        assert_eq!(options.class_name(), "Calc");
        assert_eq!(options.host(), "127.0.0.1");
        assert_eq!(options.port(), 9301);
    }

    #[test]
    fn test_options_round_trip() {
        let options = ServerOptions::new("Calc", "CalcService", "0.0.0.0", 9302);
        let encoded = serde_json::to_string(&options).unwrap();
        let decoded: ServerOptions = serde_json::from_str(&encoded).unwrap();
        assert_eq!(options, decoded);
    }
}
