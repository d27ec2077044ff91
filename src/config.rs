//! Configuration types for engine-driven document conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Every knob lives in one struct so a
//! single value can be shared across concurrent conversions and logged.

use crate::error::ConvertError;
use crate::filters::FilterCatalog;
use crate::pipeline::resolver::RetryPolicy;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a document conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use oowrap::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .engine_path("/usr/bin/soffice")
///     .connect_attempts(5)
///     .connect_interval_ms(500)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Engine executable. `None` resolves through `engine-locate`
    /// (`OOWRAP_ENGINE`, well-known install paths, `PATH`).
    pub engine_path: Option<PathBuf>,

    /// Python interpreter for the UNO bridge helper. `None` resolves through
    /// `engine-locate` (`OOWRAP_PYTHON`, the engine's bundled interpreter,
    /// `python3` on `PATH`).
    pub python_path: Option<PathBuf>,

    /// Host the engine and its helper bind their listeners to. Default: `localhost`.
    pub host: String,

    /// Maximum control-connection attempts before giving up. Default: 20.
    ///
    /// A cold engine start with an empty profile commonly takes 2–6 s; 20
    /// attempts at the default interval cover slow CI machines.
    pub connect_attempts: u32,

    /// Pause between connection attempts in milliseconds. Default: 1000.
    pub connect_interval_ms: u64,

    /// Longest one connection attempt may take, handshake included, in
    /// milliseconds. A listener that accepts but never answers costs one
    /// attempt, not the whole conversion. Default: 2000.
    pub handshake_timeout_ms: u64,

    /// How long to wait for the engine to exit on its own after the terminate
    /// request before killing it, in milliseconds. Default: 500.
    pub shutdown_grace_ms: u64,

    /// Format → export-filter catalog. Default: the built-in Writer filters.
    pub filters: Arc<FilterCatalog>,

    /// Optional lifecycle observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            engine_path: None,
            python_path: None,
            host: "localhost".to_string(),
            connect_attempts: 20,
            connect_interval_ms: 1000,
            handshake_timeout_ms: 2000,
            shutdown_grace_ms: 500,
            filters: Arc::new(FilterCatalog::default()),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("engine_path", &self.engine_path)
            .field("python_path", &self.python_path)
            .field("host", &self.host)
            .field("connect_attempts", &self.connect_attempts)
            .field("connect_interval_ms", &self.connect_interval_ms)
            .field("handshake_timeout_ms", &self.handshake_timeout_ms)
            .field("shutdown_grace_ms", &self.shutdown_grace_ms)
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn connect_interval(&self) -> Duration {
        Duration::from_millis(self.connect_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// The resolver's retry budget.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect_attempts,
            interval: self.connect_interval(),
            attempt_timeout: self.handshake_timeout(),
        }
    }

    /// Resolve the engine executable, consulting `engine-locate` when no
    /// explicit path is configured.
    pub fn resolve_engine(&self) -> Result<PathBuf, ConvertError> {
        engine_locate::locate_engine(self.engine_path.as_deref()).map_err(|e| {
            ConvertError::Launch {
                engine: self.engine_path.clone().unwrap_or_default(),
                port: 0,
                reason: e.to_string(),
            }
        })
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn engine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.engine_path = Some(path.into());
        self
    }

    pub fn python_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.python_path = Some(path.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn connect_attempts(mut self, n: u32) -> Self {
        self.config.connect_attempts = n.max(1);
        self
    }

    pub fn connect_interval_ms(mut self, ms: u64) -> Self {
        self.config.connect_interval_ms = ms;
        self
    }

    /// Clamped to at least 10 ms.
    pub fn handshake_timeout_ms(mut self, ms: u64) -> Self {
        self.config.handshake_timeout_ms = ms.max(10);
        self
    }

    pub fn shutdown_grace_ms(mut self, ms: u64) -> Self {
        self.config.shutdown_grace_ms = ms;
        self
    }

    pub fn filters(mut self, catalog: FilterCatalog) -> Self {
        self.config.filters = Arc::new(catalog);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConvertError> {
        let c = &self.config;
        if c.connect_attempts == 0 {
            return Err(ConvertError::InvalidConfig(
                "connect attempts must be ≥ 1".into(),
            ));
        }
        if c.host.trim().is_empty() {
            return Err(ConvertError::InvalidConfig("host must not be empty".into()));
        }
        if c.filters.is_empty() {
            return Err(ConvertError::InvalidConfig(
                "filter catalog must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ConversionConfig::default();
        assert_eq!(c.host, "localhost");
        assert_eq!(c.connect_attempts, 20);
        assert_eq!(c.connect_interval(), Duration::from_secs(1));
        assert_eq!(c.shutdown_grace(), Duration::from_millis(500));
        assert_eq!(c.handshake_timeout(), Duration::from_secs(2));
        assert!(c.python_path.is_none());
        assert!(c.filters.contains("pdf"));
        assert!(c.engine_path.is_none());
    }

    #[test]
    fn builder_clamps_attempts() {
        let c = ConversionConfig::builder().connect_attempts(0).build().unwrap();
        assert_eq!(c.connect_attempts, 1);
    }

    #[test]
    fn retry_policy_carries_the_handshake_bound() {
        let c = ConversionConfig::builder()
            .connect_attempts(3)
            .connect_interval_ms(10)
            .handshake_timeout_ms(0)
            .build()
            .unwrap();
        let policy = c.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.interval, Duration::from_millis(10));
        assert_eq!(policy.attempt_timeout, Duration::from_millis(10));
        assert_eq!(
            ConversionConfig::default().retry_policy(),
            crate::pipeline::resolver::RetryPolicy::default()
        );
    }

    #[test]
    fn builder_rejects_empty_host() {
        assert!(ConversionConfig::builder().host("  ").build().is_err());
    }

    #[test]
    fn debug_hides_callback() {
        let cb: ProgressCallback = Arc::new(crate::progress::NoopProgressCallback);
        let c = ConversionConfig::builder().progress_callback(cb).build().unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("<dyn ConversionProgressCallback>"), "got: {dbg}");
    }

    #[test]
    fn resolve_engine_reports_missing_explicit_path() {
        let c = ConversionConfig::builder()
            .engine_path("/definitely/not/soffice")
            .build()
            .unwrap();
        match c.resolve_engine().unwrap_err() {
            ConvertError::Launch { engine, reason, .. } => {
                assert_eq!(engine, PathBuf::from("/definitely/not/soffice"));
                assert!(reason.contains("not found"), "got: {reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
