/// 自定义错误类型
///
/// 隧道核心（拨号、握手、配置）返回的精确错误类型，
/// 应用层胶水代码仍然使用 anyhow
use std::io;
use thiserror::Error;

/// TCP-TLS 隧道的主要错误类型
#[derive(Error, Debug)]
pub enum TunnelError {
    /// TCP 连接远端失败
    #[error("Failed to connect to {addr}: {source}")]
    ConnectionFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// TLS 握手失败（包括证书校验失败）
    #[error("TLS handshake with {addr} failed: {source}")]
    HandshakeFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 无法作为 TLS SNI 使用的服务器名称
    #[error("Invalid TLS server name: {0}")]
    InvalidServerName(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 其他错误（保留与 anyhow 的兼容性）
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, TunnelError>;

impl TunnelError {
    /// 创建连接失败错误
    pub fn connection_failed(addr: impl Into<String>, source: io::Error) -> Self {
        Self::ConnectionFailed {
            addr: addr.into(),
            source,
        }
    }

    /// 创建握手失败错误
    pub fn handshake_failed(addr: impl Into<String>, source: io::Error) -> Self {
        Self::HandshakeFailed {
            addr: addr.into(),
            source,
        }
    }

    /// 创建配置错误
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// 是否为远端拨号失败（TCP 连接或 TLS 握手）
    pub fn is_dial_failure(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::HandshakeFailed { .. }
        )
    }

    /// 检查是否为握手失败
    pub fn is_handshake_failed(&self) -> bool {
        matches!(self, Self::HandshakeFailed { .. })
    }

    /// 检查是否为配置错误
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failed() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err = TunnelError::connection_failed("127.0.0.1:443", io_err);
        assert!(err.is_dial_failure());
        assert!(!err.is_handshake_failed());
        assert!(err.to_string().contains("Failed to connect"));
        assert!(err.to_string().contains("127.0.0.1:443"));
    }

    #[test]
    fn test_handshake_failed() {
        let io_err = io::Error::new(io::ErrorKind::InvalidData, "invalid peer certificate");
        let err = TunnelError::handshake_failed("example.com:443", io_err);
        assert!(err.is_dial_failure());
        assert!(err.is_handshake_failed());
        assert_eq!(
            err.to_string(),
            "TLS handshake with example.com:443 failed: invalid peer certificate"
        );
    }

    #[test]
    fn test_error_is_checks() {
        let config_err = TunnelError::config_error("remote address is empty");
        let name_err = TunnelError::InvalidServerName("bad name".to_string());

        assert!(config_err.is_config_error());
        assert!(!config_err.is_dial_failure());
        assert!(!name_err.is_config_error());
        assert!(!name_err.is_dial_failure());
    }
}
