//! # Core Configuration Module
//!
//! Provides configuration management for the library sync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all dependencies and settings for the core library.
//! It enforces fail-fast validation so that every required bridge is present
//! before initialization.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - Remote catalog requests (desktop default: reqwest)
//! - `SecureStore` - Session persistence (desktop default: OS keychain)
//! - `WorkScheduler` - Background retry of pushes (desktop default: Tokio tasks)
//!
//! ## Optional Dependencies
//!
//! - `NetworkMonitor` - Connectivity detection for the work scheduler's network
//!   precondition (desktop default: TCP reachability probe)
//! - `Clock` - Time source (default: system clock)
//!
//! When the `desktop-shims` feature is enabled, desktop implementations from
//! `bridge-desktop` are injected for any missing required bridge.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/library.db")
//!     .api_access_token(token)
//!     .http_client(Arc::new(MyHttpClient))
//!     .secure_store(Arc::new(MySecureStore))
//!     .work_scheduler(Arc::new(MyScheduler))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! Missing bridges produce [`Error::CapabilityMissing`] naming the capability;
//! inconsistent values produce [`Error::Config`] with an actionable message.

use crate::error::{Error, Result};
use bridge_traits::{
    background::MAX_BACKOFF_DELAY, Clock, HttpClient, NetworkMonitor, SecureStore, SystemClock,
    WorkScheduler,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default remote catalog endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.themoviedb.org/3";

/// Default linear backoff between background retries.
pub const DEFAULT_SYNC_BACKOFF: Duration = Duration::from_secs(10);

/// Default per-request timeout for remote catalog calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Core configuration for the library sync core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Base URL of the remote catalog API, without trailing slash
    pub api_base_url: String,

    /// Bearer token for the remote catalog API
    pub api_access_token: Option<String>,

    /// Linear backoff delay for background retries
    pub sync_backoff: Duration,

    /// Timeout applied to each remote request
    pub request_timeout: Duration,

    pub http_client: Arc<dyn HttpClient>,

    pub secure_store: Arc<dyn SecureStore>,

    pub work_scheduler: Arc<dyn WorkScheduler>,

    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    pub clock: Arc<dyn Clock>,

    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("api_base_url", &self.api_base_url)
            .field(
                "api_access_token",
                &self.api_access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("sync_backoff", &self.sync_backoff)
            .field("request_timeout", &self.request_timeout)
            .field("http_client", &"HttpClient { ... }")
            .field("secure_store", &"SecureStore { ... }")
            .field("work_scheduler", &"WorkScheduler { ... }")
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureFlags {
    /// Schedule a catch-up `sync_library` run when a restored session is found
    pub enable_background_sync: bool,

    /// Fail the build unless a NetworkMonitor is available. The default
    /// scheduler always receives the monitor when there is one.
    pub enable_network_awareness: bool,
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - API base URL is an http(s) URL
    /// - Backoff and timeout are positive and bounded
    /// - Feature flags are consistent with available bridges
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if !(self.api_base_url.starts_with("https://") || self.api_base_url.starts_with("http://"))
        {
            return Err(Error::Config(format!(
                "API base URL must start with http:// or https://, got '{}'",
                self.api_base_url
            )));
        }

        if self.api_base_url.ends_with('/') {
            return Err(Error::Config(
                "API base URL must not end with '/'".to_string(),
            ));
        }

        if self.sync_backoff.is_zero() || self.sync_backoff > MAX_BACKOFF_DELAY {
            return Err(Error::Config(format!(
                "Sync backoff must be between 1ms and {}s",
                MAX_BACKOFF_DELAY.as_secs()
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if matches!(&self.api_access_token, Some(token) if token.trim().is_empty()) {
            return Err(Error::Config(
                "API access token cannot be blank. Omit it instead.".to_string(),
            ));
        }

        if self.features.enable_network_awareness && self.network_monitor.is_none() {
            return Err(Error::Config(
                "Network awareness enabled but no NetworkMonitor provided. \
                 Disable the feature or inject a NetworkMonitor implementation."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, purpose: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: enable the 'desktop-shims' feature to use the bridge-desktop default. \
             Mobile: inject the platform-native implementation.",
            capability, purpose
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    let client = bridge_desktop::ReqwestHttpClient::with_timeout(timeout)?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(capability_missing("HttpClient", "remote catalog requests"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Ok(Arc::new(bridge_desktop::KeyringSecureStore::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(capability_missing("SecureStore", "session persistence"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_work_scheduler(
    monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn WorkScheduler>> {
    Ok(Arc::new(
        bridge_desktop::TokioWorkScheduler::with_network_monitor_and_clock(monitor, clock),
    ))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_work_scheduler(
    _monitor: Option<Arc<dyn NetworkMonitor>>,
    _clock: Arc<dyn Clock>,
) -> Result<Arc<dyn WorkScheduler>> {
    Err(capability_missing("WorkScheduler", "background retries"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_network_monitor() -> Option<Arc<dyn NetworkMonitor>> {
    Some(Arc::new(bridge_desktop::DesktopNetworkMonitor::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_network_monitor() -> Option<Arc<dyn NetworkMonitor>> {
    None
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    api_base_url: Option<String>,
    api_access_token: Option<String>,
    sync_backoff: Option<Duration>,
    request_timeout: Option<Duration>,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    work_scheduler: Option<Arc<dyn WorkScheduler>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Option<Arc<dyn Clock>>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    /// Sets the SQLite database path (required).
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Overrides the remote catalog base URL.
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn api_access_token(mut self, token: impl Into<String>) -> Self {
        self.api_access_token = Some(token.into());
        self
    }

    pub fn sync_backoff(mut self, backoff: Duration) -> Self {
        self.sync_backoff = Some(backoff);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn work_scheduler(mut self, scheduler: Arc<dyn WorkScheduler>) -> Self {
        self.work_scheduler = Some(scheduler);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn enable_background_sync(mut self, enabled: bool) -> Self {
        self.features.enable_background_sync = enabled;
        self
    }

    pub fn enable_network_awareness(mut self, enabled: bool) -> Self {
        self.features.enable_network_awareness = enabled;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds and validates the final `CoreConfig`.
    ///
    /// Missing bridges fall back to desktop defaults when the `desktop-shims`
    /// feature is enabled and fail with [`Error::CapabilityMissing`] otherwise.
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let network_monitor = self
            .network_monitor
            .or_else(provide_default_network_monitor);

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(request_timeout)?,
        };

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let work_scheduler = match self.work_scheduler {
            Some(scheduler) => scheduler,
            None => provide_default_work_scheduler(network_monitor.clone(), Arc::clone(&clock))?,
        };

        let config = CoreConfig {
            database_path,
            api_base_url: self
                .api_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            api_access_token: self.api_access_token,
            sync_backoff: self.sync_backoff.unwrap_or(DEFAULT_SYNC_BACKOFF),
            request_timeout,
            http_client,
            secure_store,
            work_scheduler,
            network_monitor,
            clock,
            features: self.features,
        };

        config.validate()?;

        Ok(config)
    }
}
