use std::io::Result;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const BUFFER_SIZE: usize = 65536; // 64KB

/// Copies `local_read` into `remote` and `remote` into `local_write` until either direction ends.
///
/// Returns the byte counts `(sent, received)`.
pub async fn tunnel_connect<C, R, W>(
    remote: C,
    mut local_read: R,
    mut local_write: W,
) -> Result<(u64, u64)>
where
    C: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (mut remote_read, mut remote_write) = tokio::io::split(remote);
    let mut sent = 0u64;
    let mut received = 0u64;

    {
        let local_to_remote = async {
            let mut buf = vec![0u8; BUFFER_SIZE];
            loop {
                match local_read.read(&mut buf).await {
                    Ok(0) => {
                        let _ = remote_write.shutdown().await;
                        break;
                    }
                    Ok(n) => {
                        if remote_write.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                        sent += n as u64;
                    }
                    Err(_) => break,
                }
            }
        };

        let remote_to_local = async {
            let mut buf = vec![0u8; BUFFER_SIZE];
            loop {
                match remote_read.read(&mut buf).await {
                    Ok(0) => {
                        let _ = local_write.shutdown().await;
                        break;
                    }
                    Ok(n) => {
                        if local_write.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                        if local_write.flush().await.is_err() {
                            break;
                        }
                        received += n as u64;
                    }
                    Err(_) => break,
                }
            }
        };

        // the remote closing ends the session; local EOF only half-closes it
        tokio::pin!(remote_to_local);
        tokio::select! {
            _ = local_to_remote => (&mut remote_to_local).await,
            _ = &mut remote_to_local => {},
        }
    }

    trace!(sent, received, "tunnel closed");
    Ok((sent, received))
}

/// [`tunnel_connect`] that stops as soon as `cancel` fires.
///
/// Returns `None` when the session was cut short by cancellation.
pub async fn tunnel_until_cancelled<C, R, W>(
    remote: C,
    local_read: R,
    local_write: W,
    cancel: &CancellationToken,
) -> Result<Option<(u64, u64)>>
where
    C: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("tunnel interrupted");
            Ok(None)
        }
        counts = tunnel_connect(remote, local_read, local_write) => counts.map(Some),
    }
}
