use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::warn;

/// 默认本地监听地址
pub const DEFAULT_LOCAL_ADDR: &str = "127.0.0.1:21126";

fn default_local_addr() -> String {
    DEFAULT_LOCAL_ADDR.to_string()
}

fn default_strict_secure() -> bool {
    true
}

/// 隧道配置
///
/// 可以来自 TOML 文件的 `[tunnel]` 表，也可以完全由命令行参数给出；
/// 两者同时存在时命令行参数逐项覆盖文件中的值
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TunnelConfig {
    /// 本地监听地址
    #[serde(default = "default_local_addr")]
    pub local_addr: String,
    /// 远端 TLS 地址（host:port）
    #[serde(default)]
    pub remote_addr: String,
    /// 严格模式：为 false 时完全跳过远端证书校验
    #[serde(default = "default_strict_secure")]
    pub strict_secure: bool,
    /// 严格模式下信任的 CA 证书（PEM），缺省使用系统证书
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,
    /// TLS SNI 名称，缺省取 remote_addr 的主机部分
    #[serde(default)]
    pub server_name: Option<String>,
    /// 周期性输出统计信息的间隔（秒），缺省不输出
    #[serde(default)]
    pub stats_interval_secs: Option<u64>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            local_addr: default_local_addr(),
            remote_addr: String::new(),
            strict_secure: default_strict_secure(),
            ca_cert_path: None,
            server_name: None,
            stats_interval_secs: None,
        }
    }
}

impl TunnelConfig {
    /// 从文件加载配置
    pub fn load(path: &str) -> anyhow::Result<Self> {
        #[derive(Deserialize)]
        struct TunnelConfigWrapper {
            #[serde(default)]
            tunnel: TunnelConfig,
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path))?;
        let wrapper: TunnelConfigWrapper =
            toml::from_str(&content).context("Failed to parse tunnel configuration")?;
        Ok(wrapper.tunnel)
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.local_addr.trim().is_empty() {
            bail!("local address cannot be empty");
        }

        if self.remote_addr.trim().is_empty() {
            bail!("remote address is empty");
        }

        if let Some(name) = &self.server_name {
            if name.trim().is_empty() {
                bail!("server_name cannot be empty when set");
            }
        }

        if self.stats_interval_secs == Some(0) {
            bail!("stats_interval_secs must be greater than 0");
        }

        if !self.strict_secure && self.ca_cert_path.is_some() {
            warn!("ca_cert_path has no effect when strict_secure is false");
        }

        Ok(())
    }
}

/// Expand path with tilde (~) and make it absolute
pub fn expand_path(path: &str) -> anyhow::Result<PathBuf> {
    let expanded = shellexpand::tilde(path);
    let path_buf = PathBuf::from(expanded.as_ref());

    if path_buf.is_absolute() {
        Ok(path_buf)
    } else {
        // Convert relative path to absolute
        Ok(std::env::current_dir()
            .context("Failed to get current directory")?
            .join(path_buf))
    }
}
