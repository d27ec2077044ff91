//! The result of a successful conversion.

use crate::bridge::DocumentKind;
use serde::{Deserialize, Serialize};

/// Facts about one finished conversion. The converted bytes themselves went
/// to the request's target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionReport {
    /// Catalog key the document was exported as.
    pub format: String,
    /// Engine filter name used for the export.
    pub filter: String,
    pub document_kind: DocumentKind,
    pub bytes_written: u64,
    /// Port the engine's control listener was bound to.
    pub port: u16,
    /// Connection attempts the resolver needed.
    pub connect_attempts: u32,
    /// Exit code the engine reported after terminating, if it exited within
    /// the grace period.
    pub engine_exit_code: Option<i32>,
    pub duration_ms: u64,
}
