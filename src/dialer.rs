use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::DialError;

/// Bidirectional byte stream handed back by every dialer.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Connection for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type BoxedConnection = Box<dyn Connection>;

/// Network kind passed to a dial, in the `tcp`/`tcp4`/`tcp6` spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Tcp,
    Tcp4,
    Tcp6,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Tcp4 => "tcp4",
            Network::Tcp6 => "tcp6",
        }
    }

    fn accepts(&self, addr: &SocketAddr) -> bool {
        match self {
            Network::Tcp => true,
            Network::Tcp4 => addr.is_ipv4(),
            Network::Tcp6 => addr.is_ipv6(),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = DialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Network::Tcp),
            "tcp4" => Ok(Network::Tcp4),
            "tcp6" => Ok(Network::Tcp6),
            other => Err(DialError::UnsupportedNetwork(other.to_string())),
        }
    }
}

/// Dial without a cancellation input.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, network: Network, addr: &str) -> Result<BoxedConnection, DialError>;

    /// Native cancellable dial, for dialers that have one.
    fn as_cancellable(&self) -> Option<&dyn CancellableDialer> {
        None
    }
}

/// Dial that gives up as soon as `cancel` fires.
#[async_trait]
pub trait CancellableDialer: Send + Sync {
    async fn dial_with_cancel(
        &self,
        cancel: &CancellationToken,
        network: Network,
        addr: &str,
    ) -> Result<BoxedConnection, DialError>;
}

#[async_trait]
impl<D> Dialer for Arc<D>
where
    D: Dialer + ?Sized,
{
    async fn dial(&self, network: Network, addr: &str) -> Result<BoxedConnection, DialError> {
        (**self).dial(network, addr).await
    }

    fn as_cancellable(&self) -> Option<&dyn CancellableDialer> {
        (**self).as_cancellable()
    }
}

/// Dialer used to reach a proxy when no forwarder is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectDialer;

impl DirectDialer {
    async fn connect(network: Network, addr: &str) -> Result<TcpStream, DialError> {
        let stream = match network {
            Network::Tcp => TcpStream::connect(addr).await?,
            family => {
                let candidates: Vec<SocketAddr> = lookup_host(addr)
                    .await?
                    .filter(|candidate| family.accepts(candidate))
                    .collect();

                let mut last_error = None;
                let mut connected = None;
                for candidate in candidates {
                    match TcpStream::connect(candidate).await {
                        Ok(stream) => {
                            connected = Some(stream);
                            break;
                        }
                        Err(e) => last_error = Some(e),
                    }
                }

                match (connected, last_error) {
                    (Some(stream), _) => stream,
                    (None, Some(e)) => return Err(e.into()),
                    (None, None) => {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::AddrNotAvailable,
                            format!("no {family} address found for {addr}"),
                        )
                        .into())
                    }
                }
            }
        };

        stream.set_nodelay(true)?;
        debug!(%network, addr, "direct connection established");
        Ok(stream)
    }
}

#[async_trait]
impl Dialer for DirectDialer {
    async fn dial(&self, network: Network, addr: &str) -> Result<BoxedConnection, DialError> {
        Ok(Box::new(Self::connect(network, addr).await?))
    }

    fn as_cancellable(&self) -> Option<&dyn CancellableDialer> {
        Some(self)
    }
}

#[async_trait]
impl CancellableDialer for DirectDialer {
    async fn dial_with_cancel(
        &self,
        cancel: &CancellationToken,
        network: Network,
        addr: &str,
    ) -> Result<BoxedConnection, DialError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DialError::Cancelled),
            stream = Self::connect(network, addr) => Ok(Box::new(stream?) as BoxedConnection),
        }
    }
}
