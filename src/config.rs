use std::fmt;
use std::net::Ipv6Addr;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::command::CommandDialer;
use crate::context_dialer::ContextDialer;
use crate::dialer::{Dialer, DirectDialer};
use crate::error::DialError;
use crate::http_connect::HttpConnectDialer;
use crate::socks5::Socks5Dialer;

/// Proxy flavours a configuration can select.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ProxyKind {
    Http,
    Https,
    Socks5,
    Command,
    /// Name nothing understands; produces a dialer that fails on first use.
    Unknown(String),
}

impl ProxyKind {
    pub fn as_str(&self) -> &str {
        match self {
            ProxyKind::Http => "http",
            ProxyKind::Https => "https",
            ProxyKind::Socks5 => "socks5",
            ProxyKind::Command => "command",
            ProxyKind::Unknown(name) => name,
        }
    }
}

impl From<&str> for ProxyKind {
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "http" => ProxyKind::Http,
            "https" => ProxyKind::Https,
            "socks" | "socks5" => ProxyKind::Socks5,
            "command" => ProxyKind::Command,
            _ => ProxyKind::Unknown(name.to_string()),
        }
    }
}

impl From<String> for ProxyKind {
    fn from(name: String) -> Self {
        ProxyKind::from(name.as_str())
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User and password pair; only exists when both halves are non-empty.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    pub fn new(user: &str, password: &str) -> Option<Self> {
        if user.is_empty() || password.is_empty() {
            return None;
        }
        Some(Self {
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `host:port`, bracketing IPv6 literals.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// How to reach a destination through an intermediary.
#[derive(Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(rename = "type")]
    pub kind: ProxyKind,

    #[serde(default, alias = "addr")]
    pub address: String,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Shell command for the `command` kind, placeholders already expanded.
    #[serde(default)]
    pub command: String,

    /// Dialer used to reach the proxy itself; direct TCP when unset.
    #[serde(skip)]
    pub forwarder: Option<Arc<dyn Dialer>>,
}

impl ProxyConfig {
    pub fn new(kind: impl Into<ProxyKind>) -> Self {
        Self {
            kind: kind.into(),
            address: String::new(),
            port: None,
            user: String::new(),
            password: String::new(),
            command: String::new(),
            forwarder: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>, port: u16) -> Self {
        self.address = address.into();
        self.port = Some(port);
        self
    }

    pub fn with_credentials(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_forwarder(mut self, forwarder: Arc<dyn Dialer>) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::new(&self.user, &self.password)
    }

    fn forwarder(&self) -> Arc<dyn Dialer> {
        self.forwarder
            .clone()
            .unwrap_or_else(|| Arc::new(DirectDialer))
    }

    /// Proxy URI for the HTTP kinds, with credentials embedded only when both are set.
    pub fn proxy_url(&self) -> Result<Url, DialError> {
        let host = self.address.trim();
        if host.is_empty() {
            return Err(DialError::invalid_address(&self.address, "missing host"));
        }

        // without a port the address may already be an authority such as `host:3128`
        let authority = match self.port {
            Some(port) => join_host_port(host, port),
            None if host.parse::<Ipv6Addr>().is_ok() => format!("[{host}]"),
            None => host.to_string(),
        };

        let mut url = Url::parse(&format!("{}://{authority}", self.kind))
            .map_err(|e| DialError::invalid_address(host, e.to_string()))?;

        if let Some(credentials) = self.credentials() {
            url.set_username(credentials.user())
                .and_then(|_| url.set_password(Some(credentials.password())))
                .map_err(|_| DialError::invalid_address(host, "cannot carry credentials"))?;
        }
        Ok(url)
    }

    fn create_http_proxy_dialer(&self) -> Result<HttpConnectDialer, DialError> {
        HttpConnectDialer::from_url(&self.proxy_url()?, self.forwarder())
    }

    fn create_socks5_proxy_dialer(&self) -> Result<Socks5Dialer, DialError> {
        Socks5Dialer::new(&self.address, self.port, self.credentials(), self.forwarder())
    }

    fn create_command_proxy_dialer(&self) -> CommandDialer {
        CommandDialer::new(self.command.clone())
    }

    /// Builds the dialer selected by `kind`, always behind a [`ContextDialer`].
    pub fn create_proxy_dialer(&self) -> Result<ContextDialer, DialError> {
        let dialer: Arc<dyn Dialer> = match &self.kind {
            ProxyKind::Http | ProxyKind::Https => Arc::new(self.create_http_proxy_dialer()?),
            ProxyKind::Socks5 => Arc::new(self.create_socks5_proxy_dialer()?),
            ProxyKind::Command => Arc::new(self.create_command_proxy_dialer()),
            ProxyKind::Unknown(name) => {
                warn!(kind = %name, "unknown proxy type, dialer left unset");
                return Ok(ContextDialer::unset(name.clone()));
            }
        };

        debug!(kind = %self.kind, forwarded = self.forwarder.is_some(), "proxy dialer created");
        Ok(ContextDialer::new(dialer))
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("kind", &self.kind)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &if self.password.is_empty() { "" } else { "<redacted>" })
            .field("command", &self.command)
            .field("forwarder", &self.forwarder.is_some())
            .finish()
    }
}
