use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ssh_proxy_dialer::async_tunnel::tunnel_until_cancelled;
use ssh_proxy_dialer::logging::{self, LogLevel};
use ssh_proxy_dialer::{
    expand_proxy_command, CancellableDialer, DialError, Network, ProxyConfig, ProxyKind,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Dials TARGET through a proxy and relays the connection over stdin/stdout.
///
/// Suitable as an OpenSSH `ProxyCommand`, e.g.
/// `ProxyCommand ssh-proxy-dial --type socks5 --address 127.0.0.1 --port 1080 %h:%p`.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON proxy configuration (`type`, `address`, `port`, `user`, `password`, `command`).
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Proxy type: http, https, socks5 (or socks), command.
    #[arg(long = "type", short = 't')]
    kind: Option<String>,

    #[arg(long, short = 'a')]
    address: Option<String>,

    #[arg(long, short = 'p')]
    port: Option<u16>,

    #[arg(long, short = 'u')]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Command for the `command` type; %h, %p and %r are expanded from TARGET.
    #[arg(long)]
    command: Option<String>,

    /// Give up dialing after this many seconds.
    #[arg(long)]
    timeout: Option<u64>,

    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,

    /// Destination as host:port.
    target: String,
}

impl Args {
    fn proxy_config(&self) -> Result<ProxyConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => serde_json::from_str::<ProxyConfig>(&std::fs::read_to_string(path)?)?,
            None => {
                let kind = self
                    .kind
                    .as_deref()
                    .ok_or("either --config or --type is required")?;
                ProxyConfig::new(kind)
            }
        };

        if let Some(kind) = &self.kind {
            config.kind = ProxyKind::from(kind.as_str());
        }
        if let Some(address) = &self.address {
            config.address = address.clone();
        }
        if self.port.is_some() {
            config.port = self.port;
        }
        if let Some(user) = &self.user {
            config.user = user.clone();
        }
        if let Some(password) = &self.password {
            config.password = password.clone();
        }
        if let Some(command) = &self.command {
            config.command = command.clone();
        }

        if config.kind == ProxyKind::Command {
            let (host, port) = split_target(&self.target)?;
            config.command = expand_proxy_command(&config.command, host, port, &config.user);
        }
        Ok(config)
    }
}

fn split_target(target: &str) -> Result<(&str, u16), Box<dyn Error>> {
    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| format!("target `{target}` is not host:port"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok((host, port.parse()?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    logging::init(args.log_level);

    let config = args.proxy_config()?;
    let dialer = config.create_proxy_dialer()?;
    info!(?config, target = %args.target, "dialing");

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let conn = match args.timeout {
        Some(secs) => {
            let timeout = Duration::from_secs(secs);
            tokio::select! {
                conn = dialer.dial_timeout(timeout, Network::Tcp, &args.target) => conn?,
                _ = cancel.cancelled() => return Err(DialError::Cancelled.into()),
            }
        }
        None => {
            dialer
                .dial_with_cancel(&cancel, Network::Tcp, &args.target)
                .await?
        }
    };

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    match tunnel_until_cancelled(conn, stdin, stdout, &cancel).await? {
        Some((sent, received)) => info!(sent, received, "session closed"),
        None => info!("session interrupted"),
    }
    Ok(())
}
