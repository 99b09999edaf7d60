//! 单连接隧道逻辑
//!
//! 每个被接受的本地 TCP 连接对应一次 [`Tunnel::handle`] 调用：
//! 拨号远端 TLS，双向转发，按各自方向的结束情况半关闭本地连接，
//! 两个方向都结束后关闭远端连接
use rustls::pki_types::ServerName;
use socket2::SockRef;
use std::net::Shutdown;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use crate::config::TunnelConfig;
use crate::error::{Result, TunnelError};
use crate::relay::{copy_counted, CopyOutcome, Direction};
use crate::stats::{ConnectionGuard, TunnelStats};
use crate::tls;

type RemoteStream = TlsStream<TcpStream>;

/// 一次连接结束时的传输统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSummary {
    /// 远端 -> 本地 的字节数
    pub bytes_read: u64,
    /// 本地 -> 远端 的字节数
    pub bytes_written: u64,
    pub elapsed: Duration,
}

/// TCP -> TLS 隧道
///
/// 创建后不再修改，可以通过 `Arc` 在所有连接任务之间共享
pub struct Tunnel {
    remote_addr: String,
    server_name: ServerName<'static>,
    connector: TlsConnector,
    stats: TunnelStats,
}

impl Tunnel {
    /// 以默认信任配置创建隧道：严格模式使用系统证书，否则跳过证书校验
    pub fn new(remote_addr: impl Into<String>, strict_secure: bool) -> Result<Self> {
        let remote_addr = remote_addr.into();
        if remote_addr.trim().is_empty() {
            return Err(TunnelError::config_error("remote address is empty"));
        }
        let tls_config = tls::build_client_config(strict_secure, None)?;
        let server_name = tls::server_name_for(&remote_addr, None)?;
        Ok(Self::with_client_config(remote_addr, server_name, tls_config))
    }

    /// 从完整配置创建隧道（支持自定义 CA 与 SNI）
    pub fn from_config(config: &TunnelConfig) -> Result<Self> {
        if config.remote_addr.trim().is_empty() {
            return Err(TunnelError::config_error("remote address is empty"));
        }
        let tls_config =
            tls::build_client_config(config.strict_secure, config.ca_cert_path.as_deref())?;
        let server_name =
            tls::server_name_for(&config.remote_addr, config.server_name.as_deref())?;
        Ok(Self::with_client_config(
            config.remote_addr.clone(),
            server_name,
            tls_config,
        ))
    }

    /// 使用现成的 rustls 客户端配置创建隧道
    pub fn with_client_config(
        remote_addr: String,
        server_name: ServerName<'static>,
        tls_config: Arc<rustls::ClientConfig>,
    ) -> Self {
        Self {
            remote_addr,
            server_name,
            connector: TlsConnector::from(tls_config),
            stats: TunnelStats::new(),
        }
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn stats(&self) -> &TunnelStats {
        &self.stats
    }

    pub fn active_connections(&self) -> u64 {
        self.stats.active_connections()
    }

    /// 连接远端并完成 TLS 握手，不做重试
    pub async fn dial(&self) -> Result<RemoteStream> {
        let tcp_stream = TcpStream::connect(&self.remote_addr)
            .await
            .map_err(|e| TunnelError::connection_failed(&self.remote_addr, e))?;

        if let Err(e) = tcp_stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        let tls_stream = self
            .connector
            .connect(self.server_name.clone(), tcp_stream)
            .await
            .map_err(|e| TunnelError::handshake_failed(&self.remote_addr, e))?;

        debug!(
            "TLS connection established to {} (handshake: {:?})",
            self.remote_addr,
            tls_stream.get_ref().1.handshake_kind()
        );
        Ok(tls_stream)
    }

    /// 处理一个本地连接直到两个方向都结束
    ///
    /// 拨号失败时本地连接被直接关闭并返回错误；
    /// 转发过程中的错误只记录日志，不会作为错误返回
    pub async fn handle(&self, local: TcpStream) -> Result<TransferSummary> {
        let start = Instant::now();
        let guard = ConnectionGuard::new(self.stats.clone());
        let id = guard.id();

        match local.peer_addr() {
            Ok(peer) => info!(
                "Connection #{} from {}, active connections: {}",
                id,
                peer,
                self.stats.active_connections()
            ),
            Err(_) => info!(
                "Connection #{}, active connections: {}",
                id,
                self.stats.active_connections()
            ),
        }

        let remote = match self.dial().await {
            Ok(remote) => remote,
            Err(e) => {
                warn!("Connection #{}: remote dial failed: {}", id, e);
                self.stats.dial_failed();
                drop(local);
                return Err(e);
            }
        };

        let (mut local_read, mut local_write) = local.into_split();
        let (mut remote_read, mut remote_write) = tokio::io::split(remote);

        // 本地 -> 远端：本地发送完毕后向远端发送 close_notify 并关闭 TCP 写端，
        // 远端连接本身保留给另一个方向继续读取
        let upstream = async move {
            let outcome = copy_counted(
                &mut local_read,
                &mut remote_write,
                Direction::Upstream,
                |n| self.stats.add_bytes_sent(n),
            )
            .await;
            if let Err(e) = remote_write.shutdown().await {
                debug!("Connection #{}: remote write shutdown failed: {}", id, e);
            }
            (outcome, local_read, remote_write)
        };

        let downstream = async move {
            let outcome = copy_counted(
                &mut remote_read,
                &mut local_write,
                Direction::Downstream,
                |n| self.stats.add_bytes_received(n),
            )
            .await;
            (outcome, remote_read, local_write)
        };

        tokio::pin!(upstream);
        tokio::pin!(downstream);

        // 两个方向的完成顺序不确定，先结束的先处理
        let ((up, local_read, remote_write), (down, remote_read, local_write)) = tokio::select! {
            up = &mut upstream => {
                self.upstream_finished(id, &up.0, &up.1);
                let mut down = (&mut downstream).await;
                self.downstream_finished(id, &down.0, &mut down.2).await;
                (up, down)
            }
            mut down = &mut downstream => {
                self.downstream_finished(id, &down.0, &mut down.2).await;
                let up = (&mut upstream).await;
                self.upstream_finished(id, &up.0, &up.1);
                (up, down)
            }
        };

        // 两个方向都已结束，远端连接只在这里关闭一次
        let remote = remote_read.unsplit(remote_write);
        drop(remote);
        drop(local_read);
        drop(local_write);

        drop(guard);
        let summary = TransferSummary {
            bytes_read: down.bytes,
            bytes_written: up.bytes,
            elapsed: start.elapsed(),
        };
        info!(
            "Connection #{} closed, active connections: {}, read: {}, write: {}, cost: {:?}",
            id,
            self.stats.active_connections(),
            summary.bytes_read,
            summary.bytes_written,
            summary.elapsed
        );
        Ok(summary)
    }

    /// 本地不再发送数据：关闭本地连接的读端
    fn upstream_finished(&self, id: u64, outcome: &CopyOutcome, local_read: &OwnedReadHalf) {
        log_copy_outcome(id, outcome);
        let stream: &TcpStream = local_read.as_ref();
        if let Err(e) = SockRef::from(stream).shutdown(Shutdown::Read) {
            debug!("Connection #{}: local read shutdown failed: {}", id, e);
        }
    }

    /// 远端不再发送数据：关闭本地连接的写端
    async fn downstream_finished(
        &self,
        id: u64,
        outcome: &CopyOutcome,
        local_write: &mut OwnedWriteHalf,
    ) {
        log_copy_outcome(id, outcome);
        if let Err(e) = local_write.shutdown().await {
            debug!("Connection #{}: local write shutdown failed: {}", id, e);
        }
    }
}

fn log_copy_outcome(id: u64, outcome: &CopyOutcome) {
    if outcome.is_clean() {
        debug!(
            "Connection #{}: {} finished, {} bytes",
            id, outcome.direction, outcome.bytes
        );
    } else if let Some(e) = &outcome.error {
        warn!(
            "Connection #{}: {} copy error after {} bytes: {}",
            id, outcome.direction, outcome.bytes, e
        );
    }
}
