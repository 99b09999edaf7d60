use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::config::{expand_path, TunnelConfig};

#[derive(Parser, Debug)]
#[command(name = "tcp-tls-tunnel")]
#[command(author, version, about = "Forward local TCP connections to a remote TLS endpoint", long_about = None)]
pub struct Cli {
    /// 本地监听地址 [默认: 127.0.0.1:21126]
    #[arg(short = 'l', value_name = "ADDR")]
    pub local_addr: Option<String>,

    /// 远端 TLS 地址（必填，可由配置文件提供）
    #[arg(short = 'r', value_name = "ADDR")]
    pub remote_addr: Option<String>,

    /// 严格模式，不跳过证书校验 [默认: true]
    #[arg(
        short = 's',
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub strict_secure: Option<bool>,

    /// TOML 配置文件路径（读取其中的 [tunnel] 表）
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<String>,

    /// 严格模式下信任的 CA 证书文件（PEM）
    #[arg(long = "ca-cert", value_name = "PATH")]
    pub ca_cert: Option<String>,

    /// TLS SNI 名称，默认取远端地址的主机部分
    #[arg(long = "sni", value_name = "NAME")]
    pub server_name: Option<String>,

    /// 周期性输出统计信息的间隔（秒）
    #[arg(long = "stats-interval", value_name = "SECS")]
    pub stats_interval: Option<u64>,

    /// 日志级别 (trace, debug, info, warn, error)，RUST_LOG 优先
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// 合并配置文件与命令行参数，命令行参数优先
    pub fn resolve_config(&self) -> Result<TunnelConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let path = expand_path(path)?;
                TunnelConfig::load(&path.to_string_lossy())?
            }
            None => TunnelConfig::default(),
        };

        if let Some(addr) = &self.local_addr {
            config.local_addr = addr.clone();
        }
        if let Some(addr) = &self.remote_addr {
            config.remote_addr = addr.clone();
        }
        if let Some(strict) = self.strict_secure {
            config.strict_secure = strict;
        }
        if let Some(path) = &self.ca_cert {
            config.ca_cert_path = Some(PathBuf::from(path));
        }
        if let Some(name) = &self.server_name {
            config.server_name = Some(name.clone());
        }
        if let Some(secs) = self.stats_interval {
            config.stats_interval_secs = Some(secs);
        }

        config.ca_cert_path = config
            .ca_cert_path
            .as_deref()
            .map(|path| expand_path(&path.to_string_lossy()))
            .transpose()?;

        config.validate()?;
        Ok(config)
    }

    /// 日志过滤规则
    pub fn log_filter(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.log_level.clone())
    }
}
