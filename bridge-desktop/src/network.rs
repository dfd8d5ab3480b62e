//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

const DEFAULT_PROBE_ADDR: &str = "api.themoviedb.org:443";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const CACHE_TTL: Duration = Duration::from_secs(2);

/// Desktop network monitor implementation
///
/// Detects connectivity by opening a TCP connection to the remote catalog
/// host. Results are cached briefly so that constraint polling does not open
/// a socket on every check.
pub struct DesktopNetworkMonitor {
    probe_addr: String,
    cached_info: Arc<Mutex<Option<(Instant, NetworkInfo)>>>,
}

impl DesktopNetworkMonitor {
    pub fn new() -> Self {
        Self::with_probe_addr(DEFAULT_PROBE_ADDR)
    }

    /// Probe a different `host:port` (e.g. a self-hosted catalog).
    pub fn with_probe_addr(addr: impl Into<String>) -> Self {
        Self {
            probe_addr: addr.into(),
            cached_info: Arc::new(Mutex::new(None)),
        }
    }

    async fn check_connectivity(&self) -> NetworkStatus {
        match tokio::time::timeout(
            PROBE_TIMEOUT,
            tokio::net::TcpStream::connect(self.probe_addr.as_str()),
        )
        .await
        {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(_)) | Err(_) => NetworkStatus::Disconnected,
        }
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let mut cached = self.cached_info.lock().await;
        if let Some((checked_at, info)) = cached.as_ref() {
            if checked_at.elapsed() < CACHE_TTL {
                return Ok(info.clone());
            }
        }

        let info = match self.check_connectivity().await {
            // Desktop can't tell WiFi from Ethernet without platform APIs
            NetworkStatus::Connected => NetworkInfo::connected(NetworkType::Other),
            _ => NetworkInfo::disconnected(),
        };

        *cached = Some((Instant::now(), info.clone()));
        debug!(status = ?info.status, "Network info updated");

        Ok(info)
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(DesktopNetworkChangeStream {
            monitor: Self::with_probe_addr(self.probe_addr.clone()),
            last_status: None,
        }))
    }
}

/// Network change stream that polls for changes
struct DesktopNetworkChangeStream {
    monitor: DesktopNetworkMonitor,
    last_status: Option<NetworkStatus>,
}

#[async_trait]
impl NetworkChangeStream for DesktopNetworkChangeStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        loop {
            if let Ok(info) = self.monitor.get_network_info().await {
                if self.last_status.as_ref() != Some(&info.status) {
                    self.last_status = Some(info.status);
                    return Some(info);
                }
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_probe_reports_disconnected() {
        // Port 9 on localhost (discard) is closed on test machines.
        let monitor = DesktopNetworkMonitor::with_probe_addr("127.0.0.1:9");
        let info = monitor.get_network_info().await.unwrap();

        assert_eq!(info.status, NetworkStatus::Disconnected);
        assert!(!monitor.is_connected().await);
    }

    #[tokio::test]
    async fn test_local_listener_reports_connected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let monitor = DesktopNetworkMonitor::with_probe_addr(addr.to_string());

        let info = monitor.get_network_info().await.unwrap();
        assert_eq!(info.status, NetworkStatus::Connected);
        assert!(!info.is_metered);
    }

    #[tokio::test]
    async fn test_change_stream_emits_initial_status() {
        let monitor = DesktopNetworkMonitor::with_probe_addr("127.0.0.1:9");
        let mut stream = monitor.subscribe_changes().await.unwrap();

        let info = stream.next().await.unwrap();
        assert_eq!(info.status, NetworkStatus::Disconnected);
    }
}
