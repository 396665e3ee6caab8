//! HTTP server configuration.

use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds to.
    pub listen: SocketAddr,
}
