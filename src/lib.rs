/// TCP-TLS 隧道库入口
///
/// 将核心模块导出为库，方便测试和复用
pub mod cli;
pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod stats;
pub mod tls;
pub mod tunnel;

// 重新导出常用类型
pub use config::TunnelConfig;
pub use error::{Result, TunnelError};
pub use stats::{ConnectionGuard, StatsSnapshot, TunnelStats};
pub use tunnel::{TransferSummary, Tunnel};
