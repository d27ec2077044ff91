//! Error types for the oowrap library.
//!
//! Two distinct error types reflect two distinct channels:
//!
//! * [`ConvertError`], **primary**: the conversion failed (engine would not
//!   start, never answered, rejected the document, unknown format). Returned
//!   as `Err(ConvertError)` from the top-level `convert*` functions.
//!
//! * [`CleanupError`], **side channel**: tearing down the engine process or
//!   the scratch profile went wrong. These are logged and never returned, so
//!   a teardown hiccup can neither mask a real failure nor spoil a success.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the oowrap library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Engine lifecycle ──────────────────────────────────────────────────
    /// The engine process could not be spawned or died during startup.
    #[error("Failed to start engine '{engine}' on port {port}: {reason}")]
    Launch {
        engine: PathBuf,
        port: u16,
        reason: String,
    },

    /// The control channel never came up within the retry budget.
    #[error("Engine did not accept a control connection on port {port} after {attempts} attempts\nIncrease --connect-attempts if the engine is slow to start.")]
    ConnectTimeout { port: u16, attempts: u32 },

    /// Connecting failed for a reason other than "nobody listening yet".
    #[error("Control channel to port {port} failed: {detail}")]
    ControlChannel { port: u16, detail: String },

    // ── Request errors ────────────────────────────────────────────────────
    /// The target format has no filter in the catalog.
    #[error("Unsupported target format '{format}' (known: {known})")]
    UnsupportedFormat { format: String, known: String },

    /// The engine itself reported a failure. The message is passed through
    /// untouched; it is usually more precise than anything we could add.
    #[error("Engine error: {message}")]
    Engine { message: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading the source stream failed.
    #[error("Failed to read source document: {source}")]
    SourceRead {
        #[source]
        source: std::io::Error,
    },

    /// Writing exported bytes to the target failed.
    #[error("Failed to write converted output: {source}")]
    OutputWrite {
        #[source]
        source: std::io::Error,
    },

    /// Opening the source file failed.
    #[error("Cannot open source '{path}': {source}")]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Creating the target file failed.
    #[error("Cannot create target '{path}': {source}")]
    TargetOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine sent something the bridge does not understand, or hung up.
    #[error("Control protocol error: {detail}")]
    Protocol { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// Process exit code for this failure. Every conversion failure maps to 1;
    /// callers treat the target contents as undefined.
    pub fn exit_code(&self) -> i32 {
        1
    }

    pub(crate) fn protocol(detail: impl Into<String>) -> Self {
        ConvertError::Protocol {
            detail: detail.into(),
        }
    }
}

/// A non-fatal teardown failure. Logged, never propagated.
#[derive(Debug, Error)]
pub enum CleanupError {
    /// The scratch profile directory could not be removed.
    #[error("Failed to remove scratch directory '{path}': {source}")]
    RemoveScratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine process could not be killed.
    #[error("Failed to kill engine process {pid}: {source}")]
    Kill {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_timeout_display() {
        let e = ConvertError::ConnectTimeout {
            port: 40123,
            attempts: 20,
        };
        let msg = e.to_string();
        assert!(msg.contains("40123"), "got: {msg}");
        assert!(msg.contains("20 attempts"), "got: {msg}");
    }

    #[test]
    fn engine_message_is_verbatim() {
        let e = ConvertError::Engine {
            message: "SfxBaseModel::impl_store <private:stream> failed: 0xc10(Error Area:Io Class:Write Code:16)".into(),
        };
        assert!(e
            .to_string()
            .ends_with("failed: 0xc10(Error Area:Io Class:Write Code:16)"));
    }

    #[test]
    fn unsupported_format_lists_known() {
        let e = ConvertError::UnsupportedFormat {
            format: "xyz".into(),
            known: "doc, pdf".into(),
        };
        assert!(e.to_string().contains("'xyz'"));
        assert!(e.to_string().contains("doc, pdf"));
    }

    #[test]
    fn every_failure_exits_with_one() {
        let errors = [
            ConvertError::Internal("x".into()),
            ConvertError::protocol("eof"),
            ConvertError::ConnectTimeout {
                port: 1,
                attempts: 1,
            },
        ];
        for e in errors {
            assert_eq!(e.exit_code(), 1);
        }
    }

    #[test]
    fn open_errors_name_their_side() {
        let io = || std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let source = ConvertError::SourceOpen {
            path: PathBuf::from("in.odt"),
            source: io(),
        };
        let target = ConvertError::TargetOpen {
            path: PathBuf::from("out.pdf"),
            source: io(),
        };
        assert!(source.to_string().starts_with("Cannot open source 'in.odt'"));
        assert!(target.to_string().starts_with("Cannot create target 'out.pdf'"));
    }

    #[test]
    fn cleanup_error_display() {
        let e = CleanupError::RemoveScratch {
            path: PathBuf::from("/tmp/oowrap-abc"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(e.to_string().contains("/tmp/oowrap-abc"));
    }
}
