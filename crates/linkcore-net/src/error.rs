use thiserror::Error;

/// Failures that can surface from connect/resolve/bind — the only errors
/// the core returns directly. Everything past that point is a quiet state
/// transition, not a propagated error.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
