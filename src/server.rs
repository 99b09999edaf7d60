use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::TunnelConfig;
use crate::stats::TunnelStats;
use crate::tunnel::Tunnel;

/// 解析本地地址并绑定监听器
pub async fn bind_listener(local_addr: &str) -> Result<TcpListener> {
    let addr: SocketAddr = tokio::net::lookup_host(local_addr)
        .await
        .with_context(|| format!("Failed to resolve local address: {}", local_addr))?
        .next()
        .with_context(|| format!("Local address resolved to nothing: {}", local_addr))?;

    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to listen on {}", addr))
}

/// 按配置运行隧道服务，正常情况下不会返回
pub async fn run_server(config: TunnelConfig) -> Result<()> {
    let listener = bind_listener(&config.local_addr).await?;
    let tunnel = Arc::new(Tunnel::from_config(&config).context("Failed to create tunnel")?);

    info!(
        "Serving on {} -> {} (strict secure: {})",
        listener.local_addr()?,
        tunnel.remote_addr(),
        config.strict_secure
    );

    if let Some(secs) = config.stats_interval_secs {
        spawn_stats_reporter(tunnel.stats().clone(), Duration::from_secs(secs));
    }

    serve(listener, tunnel).await
}

/// 接受连接并为每个连接启动独立任务
pub async fn serve(listener: TcpListener, tunnel: Arc<Tunnel>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((inbound, _peer_addr)) => {
                let tunnel = tunnel.clone();
                tokio::spawn(async move {
                    // 拨号失败已在 handle 内记录
                    let _ = tunnel.handle(inbound).await;
                });
            }
            Err(e) => {
                error!("Accept connection error: {}", e);
            }
        }
    }
}

fn spawn_stats_reporter(stats: TunnelStats, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // 第一次 tick 立即完成，跳过
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let snapshot = stats.snapshot();
            info!(
                "Stats: active={} total={} failed_dials={} sent={} received={}",
                snapshot.active_connections,
                snapshot.total_connections,
                snapshot.failed_dials,
                snapshot.bytes_sent,
                snapshot.bytes_received
            );
        }
    });
}
