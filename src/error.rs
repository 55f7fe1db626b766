use std::time::Duration;

use thiserror::Error;

/// Errors produced while building a dialer or establishing a tunneled connection.
#[derive(Debug, Error)]
pub enum DialError {
    /// Proxy endpoint could not be turned into a usable address or URI.
    #[error("invalid proxy address `{address}`: {reason}")]
    InvalidProxyAddress { address: String, reason: String },

    /// Proxy type name that no dialer variant understands.
    #[error("unsupported proxy type `{0}`")]
    UnsupportedProxyType(String),

    #[error("unsupported network `{0}`")]
    UnsupportedNetwork(String),

    /// TCP level failure while reaching the proxy or the target.
    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),

    /// The HTTP proxy answered the CONNECT request with something other than 200.
    #[error("connect server using proxy failed, status code [{status}] {reason}")]
    ProxyStatus { status: u16, reason: String },

    #[error("malformed proxy response: {0}")]
    MalformedResponse(#[from] httparse::Error),

    /// A 2xx CONNECT response announced a body with a transfer coding.
    #[error("proxy answered CONNECT with a `{0}` encoded body")]
    UnexpectedBody(String),

    #[error("proxy response head exceeds {0} bytes")]
    ResponseTooLarge(usize),

    #[error("proxy closed the connection before completing the response")]
    ProxyClosed,

    #[error("socks5: {0}")]
    Socks(#[from] tokio_socks::Error),

    /// Proxy command could not be started.
    #[error("failed to start proxy command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dial cancelled")]
    Cancelled,

    #[error("dial timed out after {0:?}")]
    TimedOut(Duration),

    /// Background dial task ended without reporting a result.
    #[error("dial task failed: {0}")]
    DialTaskFailed(String),
}

impl DialError {
    /// True when the dial was abandoned by the caller rather than refused by the proxy.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, DialError::Cancelled | DialError::TimedOut(_))
    }

    /// Status code returned by an HTTP proxy, when the failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            DialError::ProxyStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        DialError::InvalidProxyAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }
}
