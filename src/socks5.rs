use std::sync::Arc;

use async_trait::async_trait;
use tokio_socks::tcp::Socks5Stream;
use tracing::debug;

use crate::config::{join_host_port, Credentials};
use crate::dialer::{BoxedConnection, Dialer, Network};
use crate::error::DialError;

/// Configures a SOCKS5 client; the handshake itself is run by `tokio-socks`.
pub struct Socks5Dialer {
    proxy_addr: String,
    auth: Option<Credentials>,
    forward: Arc<dyn Dialer>,
}

impl Socks5Dialer {
    pub fn new(
        address: &str,
        port: Option<u16>,
        auth: Option<Credentials>,
        forward: Arc<dyn Dialer>,
    ) -> Result<Self, DialError> {
        let host = address.trim();
        if host.is_empty() {
            return Err(DialError::invalid_address(address, "missing host"));
        }
        let proxy_addr = match port {
            Some(port) => join_host_port(host, port),
            None => authority_with_port(host)
                .ok_or_else(|| DialError::invalid_address(host, "missing port"))?,
        };

        Ok(Self {
            proxy_addr,
            auth,
            forward,
        })
    }

    pub fn proxy_addr(&self) -> &str {
        &self.proxy_addr
    }

    pub fn has_auth(&self) -> bool {
        self.auth.is_some()
    }
}

/// Accepts `host:port` or `[v6]:port` given as a single address.
fn authority_with_port(address: &str) -> Option<String> {
    let (host, port) = address.rsplit_once(':')?;
    port.parse::<u16>().ok()?;
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if bare.is_empty() || (bare.contains(':') && !host.starts_with('[')) {
        return None;
    }
    Some(address.to_string())
}

#[async_trait]
impl Dialer for Socks5Dialer {
    async fn dial(&self, network: Network, addr: &str) -> Result<BoxedConnection, DialError> {
        let socket = self.forward.dial(network, &self.proxy_addr).await?;

        let stream = match &self.auth {
            Some(auth) => {
                Socks5Stream::connect_with_password_and_socket(
                    socket,
                    addr,
                    auth.user(),
                    auth.password(),
                )
                .await?
            }
            None => Socks5Stream::connect_with_socket(socket, addr).await?,
        };

        debug!(
            proxy = %self.proxy_addr,
            dest = addr,
            auth = self.has_auth(),
            "socks5 tunnel established"
        );
        Ok(stream.into_inner())
    }
}
