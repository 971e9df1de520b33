//! Transport error types.

use thiserror::Error;

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to bind to {address}: {source}")]
    BindError {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The MCP handshake could not be completed.
    #[error("Server initialization error: {0}")]
    InitError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The running rmcp service failed.
    #[error("Service error: {0}")]
    ServiceError(String),
}

impl TransportError {
    pub fn bind(address: impl Into<String>, source: std::io::Error) -> Self {
        Self::BindError {
            address: address.into(),
            source,
        }
    }

    pub fn init(msg: impl Into<String>) -> Self {
        Self::InitError(msg.into())
    }

    pub fn http(msg: impl Into<String>) -> Self {
        Self::HttpError(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_names_address() {
        let error = TransportError::bind(
            "127.0.0.1:8080",
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        );
        assert_eq!(error.to_string(), "Failed to bind to 127.0.0.1:8080: in use");
    }
}
