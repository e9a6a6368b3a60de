use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Type not found: {0}")]
    TypeNotFound(String),

    #[error("No fields found: {0}")]
    EmptyComposite(String),

    #[error("Layout too large: {0} needs {1} bytes (max 1024)")]
    SizeExceedsCeiling(String, usize),

    #[error("Bad request line: {0}")]
    BadRequestLine(String),

    #[error("Failed to route: {0}")]
    FailedToRoute(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Peer closed connection")]
    PeerClosed,

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Connection error: {0}")]
    HandshakeFailed(String),
}

impl RpcError {
    /// OS error code of the underlying syscall failure, if any.
    pub fn os_code(&self) -> i32 {
        match self {
            RpcError::Io(err) => err.raw_os_error().unwrap_or(-1),
            _ => 0,
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_error_message() {
        let err = RpcError::FailedToRoute("Calc.missing".to_string());
        assert!(err.to_string().contains("Failed to route"));
    }

    #[test]
    fn test_io_error_code() {
        let err = RpcError::Io(std::io::Error::from_raw_os_error(104));
        assert_eq!(err.os_code(), 104);
        assert_eq!(RpcError::PeerClosed.os_code(), 0);
    }

    #[test]
    fn test_json_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: RpcError = parse_err.into();
        assert!(matches!(err, RpcError::Json(_)));
    }
}
