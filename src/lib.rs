//! Proxy-aware connection dialer.
//!
//! Produces a byte stream to `host:port` tunneled through an HTTP CONNECT proxy,
//! a SOCKS5 proxy, or the stdio of an external command, ready for an SSH
//! handshake to run over it.
//!
//! ```no_run
//! use ssh_proxy_dialer::{CancellableDialer, Network, ProxyConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), ssh_proxy_dialer::DialError> {
//! let dialer = ProxyConfig::new("http")
//!     .with_address("proxy.internal", 3128)
//!     .with_credentials("alice", "secret")
//!     .create_proxy_dialer()?;
//!
//! let cancel = CancellationToken::new();
//! let conn = dialer.dial_with_cancel(&cancel, Network::Tcp, "db.internal:22").await?;
//! # drop(conn);
//! # Ok(())
//! # }
//! ```

pub mod async_tunnel;
pub mod command;
pub mod config;
pub mod context_dialer;
pub mod dialer;
pub mod error;
pub mod http_connect;
pub mod logging;
pub mod pipe;
pub mod socks5;

#[cfg(test)]
mod test_transport;

pub use command::{expand_proxy_command, CommandDialer};
pub use config::{Credentials, ProxyConfig, ProxyKind};
pub use context_dialer::ContextDialer;
pub use dialer::{BoxedConnection, CancellableDialer, Connection, Dialer, DirectDialer, Network};
pub use error::DialError;
pub use http_connect::HttpConnectDialer;
pub use socks5::Socks5Dialer;
