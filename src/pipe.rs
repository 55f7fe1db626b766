use tokio::io::{duplex, split, AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Bytes either end may have in flight before a writer has to wait for the reader.
pub const PIPE_CAPACITY: usize = 16 * 1024;

/// Two connected in-memory stream ends: what one writes, the other reads.
pub fn pipe() -> (DuplexStream, DuplexStream) {
    duplex(PIPE_CAPACITY)
}

/// Pumps bytes between the server end of a [`pipe`] and a child process' stdio.
pub struct StdioBridge {
    inbound: JoinHandle<()>,
    outbound: JoinHandle<()>,
}

impl StdioBridge {
    /// Server end reads feed `stdin`; `stdout` output is written back into the server end.
    pub fn splice<W, R>(server: DuplexStream, mut stdin: W, mut stdout: R) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (mut server_read, mut server_write) = split(server);

        let inbound = tokio::spawn(async move {
            match tokio::io::copy(&mut server_read, &mut stdin).await {
                Ok(bytes) => trace!(bytes, "pipe to process stdin reached EOF"),
                Err(e) => debug!(error = %e, "pipe to process stdin failed"),
            }
            let _ = stdin.shutdown().await;
        });

        let outbound = tokio::spawn(async move {
            match tokio::io::copy(&mut stdout, &mut server_write).await {
                Ok(bytes) => trace!(bytes, "process stdout reached EOF"),
                Err(e) => debug!(error = %e, "process stdout to pipe failed"),
            }
            let _ = server_write.shutdown().await;
        });

        Self { inbound, outbound }
    }

    /// Waits for stdout to drain into the pipe, then closes the server end.
    pub async fn close(self) {
        let _ = self.outbound.await;
        self.inbound.abort();
    }

    /// Closes the server end without waiting for pending output.
    pub fn abort(self) {
        self.inbound.abort();
        self.outbound.abort();
    }
}
