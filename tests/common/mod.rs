//! Common utilities for integration tests
#![allow(dead_code)]

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tcp_tls_tunnel::{server, Tunnel};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

/// Find an available port
pub fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to random port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// An address nothing is listening on
pub fn unreachable_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
    let addr = listener.local_addr().expect("Failed to get local addr");
    drop(listener);
    addr
}

/// Self-signed certificate for 127.0.0.1 / localhost
pub fn self_signed_cert() -> (CertificateDer<'static>, PrivateKeyDer<'static>) {
    let certified = rcgen::generate_simple_self_signed(vec![
        "127.0.0.1".to_string(),
        "localhost".to_string(),
    ])
    .expect("Failed to generate test certificate");
    let cert = certified.cert.der().clone();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        certified.signing_key.serialize_der(),
    ));
    (cert, key)
}

/// Write a self-signed certificate to a temporary PEM file
pub fn write_test_cert_pem() -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .expect("Failed to generate test certificate");
    let counter = COUNTER.fetch_add(1, Ordering::SeqCst);
    let path = std::env::temp_dir().join(format!(
        "tcp-tls-tunnel-test-cert-{}-{}.pem",
        std::process::id(),
        counter
    ));
    std::fs::write(&path, certified.cert.pem()).expect("Failed to write test certificate");
    path
}

pub fn test_acceptor() -> TlsAcceptor {
    let (cert, key) = self_signed_cert();
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .expect("Failed to build server TLS config");
    TlsAcceptor::from(Arc::new(config))
}

/// Start a TLS server that runs `handler` for every completed handshake
pub async fn start_tls_server<F, Fut>(handler: F) -> (SocketAddr, JoinHandle<()>)
where
    F: Fn(TlsStream<TcpStream>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TokioTcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind TLS server");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let acceptor = test_acceptor();
    let handler = Arc::new(handler);

    let handle = tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                // 握手失败（例如客户端拒绝证书）时直接放弃该连接
                if let Ok(stream) = acceptor.accept(socket).await {
                    (*handler)(stream).await;
                }
            });
        }
    });

    (addr, handle)
}

/// Echo every byte back until the client finishes, then close
pub async fn start_tls_echo_server() -> (SocketAddr, JoinHandle<()>) {
    start_tls_server(|mut stream| async move {
        let mut buf = vec![0u8; 8192];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if stream.write_all(&buf[..n]).await.is_err() {
                        return;
                    }
                }
                Err(_) => return,
            }
        }
        let _ = stream.shutdown().await;
    })
    .await
}

/// Start the accept loop in front of `remote`
pub async fn start_tunnel(remote: SocketAddr, strict_secure: bool) -> (SocketAddr, Arc<Tunnel>) {
    let tunnel = Arc::new(
        Tunnel::new(remote.to_string(), strict_secure).expect("Failed to create tunnel"),
    );
    let listener = server::bind_listener("127.0.0.1:0")
        .await
        .expect("Failed to bind tunnel listener");
    let addr = listener.local_addr().expect("Failed to get local addr");

    let serving = tunnel.clone();
    tokio::spawn(async move {
        server::serve(listener, serving).await.ok();
    });

    (addr, tunnel)
}

/// A connected (client, accepted) TCP pair for driving `Tunnel::handle` directly
pub async fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TokioTcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    (
        client.expect("Failed to connect"),
        accepted.expect("Failed to accept").0,
    )
}

/// Wait until the tunnel has no active connections
pub async fn wait_for_idle(tunnel: &Tunnel, max_wait: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + max_wait;
    while tokio::time::Instant::now() < deadline {
        if tunnel.active_connections() == 0 {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tunnel.active_connections() == 0
}

/// Wait for server to be ready
pub async fn wait_for_server(port: u16, max_attempts: u32) -> Option<TcpStream> {
    for _ in 0..max_attempts {
        if let Ok(stream) = TcpStream::connect(format!("127.0.0.1:{}", port)).await {
            return Some(stream);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    None
}

pub fn random_payload(len: usize) -> Vec<u8> {
    use rand::Rng;

    let mut payload = vec![0u8; len];
    rand::rng().fill(&mut payload[..]);
    payload
}

/// Cleanup function for test resources
pub struct TestCleanup {
    path: Option<PathBuf>,
}

impl TestCleanup {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }
}

impl Drop for TestCleanup {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}
