use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Point-in-time copy of the tunnel counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Connections currently being handled
    pub active_connections: u64,
    /// Connections accepted since startup
    pub total_connections: u64,
    /// Connections whose remote dial (TCP or TLS) failed
    pub failed_dials: u64,
    /// Bytes relayed local -> remote
    pub bytes_sent: u64,
    /// Bytes relayed remote -> local
    pub bytes_received: u64,
    /// Unix timestamp the tunnel was created at
    pub start_time: u64,
}

/// Statistics tracker shared by every connection task
#[derive(Debug, Clone)]
pub struct TunnelStats {
    active_connections: Arc<AtomicU64>,
    total_connections: Arc<AtomicU64>,
    failed_dials: Arc<AtomicU64>,
    bytes_sent: Arc<AtomicU64>,
    bytes_received: Arc<AtomicU64>,
    start_time: u64,
}

impl TunnelStats {
    pub fn new() -> Self {
        Self {
            active_connections: Arc::new(AtomicU64::new(0)),
            total_connections: Arc::new(AtomicU64::new(0)),
            failed_dials: Arc::new(AtomicU64::new(0)),
            bytes_sent: Arc::new(AtomicU64::new(0)),
            bytes_received: Arc::new(AtomicU64::new(0)),
            start_time: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        }
    }

    /// Increment active connections (called when connection starts).
    ///
    /// Returns the connection's sequence number.
    pub fn connection_started(&self) -> u64 {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrement active connections (called when connection ends)
    pub fn connection_ended(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn dial_failed(&self) {
        self.failed_dials.fetch_add(1, Ordering::Relaxed);
    }

    /// Add bytes sent
    pub fn add_bytes_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Add bytes received
    pub fn add_bytes_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get current snapshot of stats
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            active_connections: self.active_connections.load(Ordering::Relaxed),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            failed_dials: self.failed_dials.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            start_time: self.start_time,
        }
    }
}

impl Default for TunnelStats {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard: counts a connection as active for as long as it lives
pub struct ConnectionGuard {
    stats: TunnelStats,
    id: u64,
}

impl ConnectionGuard {
    pub fn new(stats: TunnelStats) -> Self {
        let id = stats.connection_started();
        Self { stats, id }
    }

    /// 连接序号（从 1 开始）
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.stats.connection_ended();
    }
}
