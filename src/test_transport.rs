use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dialer::{BoxedConnection, CancellableDialer, Dialer, DirectDialer, Network};
use crate::error::DialError;

/// Test-only dialer that always fails connection establishment
pub struct FailingDialer;

#[async_trait]
impl Dialer for FailingDialer {
    async fn dial(&self, _network: Network, _addr: &str) -> Result<BoxedConnection, DialError> {
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "simulated refusal").into())
    }
}

/// Test-only dialer whose dial never completes; reports when its dial future is dropped.
#[derive(Default)]
pub struct PendingDialer {
    dropped: Arc<Notify>,
}

impl PendingDialer {
    pub async fn dropped(&self) {
        self.dropped.notified().await
    }
}

struct DropSignal(Arc<Notify>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        self.0.notify_one();
    }
}

#[async_trait]
impl Dialer for PendingDialer {
    async fn dial(&self, _network: Network, _addr: &str) -> Result<BoxedConnection, DialError> {
        let _signal = DropSignal(Arc::clone(&self.dropped));
        std::future::pending::<()>().await;
        unreachable!()
    }
}

/// Test-only forwarder that records every address it is asked for and then dials directly.
#[derive(Default)]
pub struct RecordingDialer {
    calls: Mutex<Vec<String>>,
    cancellable_calls: AtomicUsize,
}

impl RecordingDialer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn cancellable_calls(&self) -> usize {
        self.cancellable_calls.load(Ordering::SeqCst)
    }

    fn record(&self, addr: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(addr.to_string());
        }
    }
}

#[async_trait]
impl Dialer for RecordingDialer {
    async fn dial(&self, network: Network, addr: &str) -> Result<BoxedConnection, DialError> {
        self.record(addr);
        DirectDialer.dial(network, addr).await
    }

    fn as_cancellable(&self) -> Option<&dyn CancellableDialer> {
        Some(self)
    }
}

#[async_trait]
impl CancellableDialer for RecordingDialer {
    async fn dial_with_cancel(
        &self,
        cancel: &CancellationToken,
        network: Network,
        addr: &str,
    ) -> Result<BoxedConnection, DialError> {
        self.cancellable_calls.fetch_add(1, Ordering::SeqCst);
        self.record(addr);
        DirectDialer.dial_with_cancel(cancel, network, addr).await
    }
}

/// Reads one HTTP request head, byte by byte, up to the blank line.
pub async fn read_request_head(sock: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = sock.read(&mut byte).await.unwrap();
        assert_eq!(n, 1, "client closed before finishing the request");
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

/// Fake HTTP proxy: answers one CONNECT with `response`, then collects `expect` bytes
/// (or reads once, when `expect` is zero, to observe whether the client hung up).
pub async fn fake_connect_proxy(
    response: &'static [u8],
    expect: usize,
) -> (SocketAddr, JoinHandle<(String, Vec<u8>)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let head = read_request_head(&mut sock).await;
        sock.write_all(response).await.unwrap();

        let mut data = vec![0u8; expect];
        if expect > 0 {
            sock.read_exact(&mut data).await.unwrap();
        } else {
            let mut probe = [0u8; 16];
            let n = sock.read(&mut probe).await.unwrap_or(0);
            data = probe[..n].to_vec();
        }
        (head, data)
    });

    (addr, handle)
}

/// What a [`fake_socks5`] server saw from its one client.
#[derive(Debug, Default)]
pub struct Handshake {
    pub methods: Vec<u8>,
    pub login: Option<(String, String)>,
    pub target: String,
    pub payload: Vec<u8>,
}

/// Minimal SOCKS5 server: negotiates, accepts one CONNECT, then reads 4 payload bytes.
pub async fn fake_socks5() -> (SocketAddr, JoinHandle<Handshake>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut seen = Handshake::default();

        let mut greeting = [0u8; 2];
        sock.read_exact(&mut greeting).await.unwrap();
        assert_eq!(greeting[0], 5);
        seen.methods = vec![0u8; greeting[1] as usize];
        sock.read_exact(&mut seen.methods).await.unwrap();

        if seen.methods.contains(&2) {
            sock.write_all(&[5, 2]).await.unwrap();
            let mut ver_ulen = [0u8; 2];
            sock.read_exact(&mut ver_ulen).await.unwrap();
            let mut user = vec![0u8; ver_ulen[1] as usize];
            sock.read_exact(&mut user).await.unwrap();
            let plen = sock.read_u8().await.unwrap();
            let mut pass = vec![0u8; plen as usize];
            sock.read_exact(&mut pass).await.unwrap();
            seen.login = Some((
                String::from_utf8(user).unwrap(),
                String::from_utf8(pass).unwrap(),
            ));
            sock.write_all(&[1, 0]).await.unwrap();
        } else {
            sock.write_all(&[5, 0]).await.unwrap();
        }

        let mut request = [0u8; 4];
        sock.read_exact(&mut request).await.unwrap();
        assert_eq!(&request[..3], &[5, 1, 0]);
        let host = match request[3] {
            3 => {
                let len = sock.read_u8().await.unwrap();
                let mut name = vec![0u8; len as usize];
                sock.read_exact(&mut name).await.unwrap();
                String::from_utf8(name).unwrap()
            }
            1 => {
                let mut ip = [0u8; 4];
                sock.read_exact(&mut ip).await.unwrap();
                std::net::Ipv4Addr::from(ip).to_string()
            }
            other => panic!("unexpected address type {other}"),
        };
        let port = sock.read_u16().await.unwrap();
        seen.target = format!("{host}:{port}");

        sock.write_all(&[5, 0, 0, 1, 127, 0, 0, 1, 0, 22]).await.unwrap();

        seen.payload = vec![0u8; 4];
        sock.read_exact(&mut seen.payload).await.unwrap();
        seen
    });

    (addr, handle)
}
