//! Progress-callback trait for conversion lifecycle events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to observe a
//! conversion as it moves through launch → connect → load → export →
//! teardown. The CLI drives its spinner from these events; tests use them to
//! learn the engine's pid and scratch directory.
//!
//! # Example
//!
//! ```rust
//! use oowrap::{ConversionConfig, ConversionProgressCallback, EngineLaunch};
//! use std::sync::Arc;
//!
//! struct LogLaunch;
//!
//! impl ConversionProgressCallback for LogLaunch {
//!     fn on_engine_launched(&self, launch: &EngineLaunch) {
//!         eprintln!("engine pid {} on port {}", launch.pid, launch.port);
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(LogLaunch))
//!     .build()
//!     .unwrap();
//! ```

use crate::bridge::DocumentKind;
use std::path::PathBuf;
use std::sync::Arc;

/// Facts about a freshly spawned engine process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineLaunch {
    pub engine: PathBuf,
    pub pid: u32,
    /// The engine's own acceptor port.
    pub port: u16,
    /// Port the control channel is dialled on. Equal to `port` when the
    /// bridge talks to the engine directly.
    pub control_port: u16,
    pub helper_pid: Option<u32>,
    /// Private profile/home directory handed to the engine.
    pub scratch_dir: PathBuf,
}

/// Called by the conversion pipeline at each lifecycle step.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync`: one callback
/// value may be shared by conversions running on different tasks.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once the request has passed validation, before anything is
    /// allocated.
    fn on_conversion_start(&self, format: &str) {
        let _ = format;
    }

    /// Called right after the engine process has been spawned.
    fn on_engine_launched(&self, launch: &EngineLaunch) {
        let _ = launch;
    }

    /// Called before each control-connection attempt (1-indexed).
    fn on_connect_attempt(&self, attempt: u32, max_attempts: u32) {
        let _ = (attempt, max_attempts);
    }

    /// Called when the control channel is up.
    fn on_connected(&self, attempts: u32) {
        let _ = attempts;
    }

    /// Called when the engine has loaded the source document.
    fn on_document_loaded(&self, kind: DocumentKind) {
        let _ = kind;
    }

    /// Called when the export finished and the sink was closed.
    fn on_export_complete(&self, bytes_written: u64) {
        let _ = bytes_written;
    }

    /// Called after the engine process is gone and the scratch directory has
    /// been released. Runs on success and on failure.
    fn on_teardown_complete(&self, exit_code: Option<i32>) {
        let _ = exit_code;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        attempts: AtomicU32,
        launched: AtomicUsize,
        teardowns: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_engine_launched(&self, _launch: &EngineLaunch) {
            self.launched.fetch_add(1, Ordering::SeqCst);
        }

        fn on_connect_attempt(&self, attempt: u32, _max_attempts: u32) {
            self.attempts.store(attempt, Ordering::SeqCst);
        }

        fn on_teardown_complete(&self, _exit_code: Option<i32>) {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_conversion_start("pdf");
        cb.on_engine_launched(&EngineLaunch {
            engine: PathBuf::from("/usr/bin/soffice"),
            pid: 42,
            port: 2002,
            control_port: 2003,
            helper_pid: Some(43),
            scratch_dir: PathBuf::from("/tmp/oowrap-x"),
        });
        cb.on_connect_attempt(1, 20);
        cb.on_connected(1);
        cb.on_document_loaded(DocumentKind::Text);
        cb.on_export_complete(1024);
        cb.on_teardown_complete(Some(0));
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_connect_attempt(1, 3);
        tracker.on_connect_attempt(2, 3);
        tracker.on_teardown_complete(None);

        assert_eq!(tracker.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.launched.load(Ordering::SeqCst), 0);
        assert_eq!(tracker.teardowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn ConversionProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_conversion_start("txt");
        cb.on_export_complete(0);
    }
}
