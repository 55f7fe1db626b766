use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream};
use tokio::process::{Child, ChildStderr, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::dialer::{BoxedConnection, CancellableDialer, Dialer, Network};
use crate::error::DialError;
use crate::pipe::{pipe, StdioBridge};

/// Tracing target carrying the proxy command's stderr lines.
pub const PROXY_COMMAND_TARGET: &str = "proxy_command";

#[cfg(unix)]
const DEFAULT_SHELL: (&str, &str) = ("sh", "-c");
#[cfg(windows)]
const DEFAULT_SHELL: (&str, &str) = ("cmd", "/C");

/// Uses the stdin/stdout of a spawned command as the connection (ProxyCommand style).
///
/// Every dial spawns its own process. The network and address passed to a dial
/// are ignored: the command line already names the target.
#[derive(Debug, Clone)]
pub struct CommandDialer {
    command: String,
    shell: String,
    shell_flag: String,
}

/// One running proxy command wired to the client end of a pipe.
struct TunnelProcess {
    child: Child,
    client: DuplexStream,
    bridge: StdioBridge,
}

impl CommandDialer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            shell: DEFAULT_SHELL.0.to_string(),
            shell_flag: DEFAULT_SHELL.1.to_string(),
        }
    }

    /// Runs the command through another shell, e.g. `("bash", "-c")`.
    pub fn with_shell(mut self, shell: impl Into<String>, flag: impl Into<String>) -> Self {
        self.shell = shell.into();
        self.shell_flag = flag.into();
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    fn spawn_error(&self, source: std::io::Error) -> DialError {
        DialError::Spawn {
            command: self.command.clone(),
            source,
        }
    }

    fn start(&self) -> Result<TunnelProcess, DialError> {
        let mut child = Command::new(&self.shell)
            .arg(&self.shell_flag)
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                return Err(self.spawn_error(std::io::Error::other(
                    "proxy command stdio was not captured",
                )))
            }
        };
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        let (client, server) = pipe();
        let bridge = StdioBridge::splice(server, stdin, stdout);
        debug!(pid = ?child.id(), command = %self.command, "proxy command started");

        Ok(TunnelProcess {
            child,
            client,
            bridge,
        })
    }
}

impl TunnelProcess {
    /// Hands out the client end; a watcher closes the server end once the process exits.
    fn into_connection(self) -> BoxedConnection {
        let Self {
            mut child,
            client,
            bridge,
        } = self;

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(%status, "proxy command exited"),
                Err(e) => debug!(error = %e, "failed to wait for proxy command"),
            }
            bridge.close().await;
        });

        Box::new(client)
    }

    /// Kills the process and reaps it. Safe to call after the process already exited.
    async fn terminate(mut self) -> Option<ExitStatus> {
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "proxy command already gone");
        }
        let status = self.child.wait().await.ok();
        self.bridge.abort();
        status
    }
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(target: PROXY_COMMAND_TARGET, "{line}");
    }
}

#[async_trait]
impl Dialer for CommandDialer {
    async fn dial(&self, _network: Network, _addr: &str) -> Result<BoxedConnection, DialError> {
        Ok(self.start()?.into_connection())
    }

    fn as_cancellable(&self) -> Option<&dyn CancellableDialer> {
        Some(self)
    }
}

#[async_trait]
impl CancellableDialer for CommandDialer {
    async fn dial_with_cancel(
        &self,
        cancel: &CancellationToken,
        _network: Network,
        _addr: &str,
    ) -> Result<BoxedConnection, DialError> {
        if cancel.is_cancelled() {
            return Err(DialError::Cancelled);
        }
        let process = self.start()?;

        if cancel.is_cancelled() {
            let status = process.terminate().await;
            debug!(?status, "proxy command terminated by cancellation");
            return Err(DialError::Cancelled);
        }

        Ok(process.into_connection())
    }
}

/// Expands the ssh-style `%h`, `%p`, `%r` and `%%` tokens of a ProxyCommand template.
pub fn expand_proxy_command(template: &str, host: &str, port: u16, user: &str) -> String {
    let mut expanded = String::with_capacity(template.len());
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            expanded.push(c);
            continue;
        }
        match chars.next() {
            Some('h') => expanded.push_str(host),
            Some('p') => expanded.push_str(&port.to_string()),
            Some('r') => expanded.push_str(user),
            Some('%') => expanded.push('%'),
            Some(other) => {
                expanded.push('%');
                expanded.push(other);
            }
            None => expanded.push('%'),
        }
    }
    expanded
}
