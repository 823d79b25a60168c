use std::net::SocketAddr;

use leak_limit::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("server terminated unexpectedly")]
    Serve(#[source] std::io::Error),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}
