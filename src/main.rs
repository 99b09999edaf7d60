use anyhow::Result;
use clap::Parser;
use tcp_tls_tunnel::{cli::Cli, server};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(cli.log_filter())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Display version information
    info!("TCP-TLS Tunnel v{}", env!("CARGO_PKG_VERSION"));

    // 配置错误、地址解析失败、监听失败都会从这里返回，进程以状态码 1 退出
    let config = cli.resolve_config()?;
    server::run_server(config).await
}
