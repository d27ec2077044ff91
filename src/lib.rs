//! # oowrap
//!
//! Convert documents between office formats by driving an external headless
//! office engine (LibreOffice or OpenOffice.org).
//!
//! The crate does no rendering of its own. For every conversion it starts a
//! private engine instance, pushes the source bytes in over a control
//! connection, asks for an export through the engine filter that matches the
//! target format, streams the result out, and tears the engine down again,
//! on success and on failure alike.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ConversionRequest
//!  │
//!  ├─ 1. Validate   format → filter name (nothing spawned for unknown formats)
//!  ├─ 2. Scratch    private profile dir (also the engine's HOME) + two free ports
//!  ├─ 3. Launch     engine --headless --accept=socket,…,port=<port>;urp
//!  │                + UNO bridge helper (engine's Python) serving <control_port>
//!  ├─ 4. Resolve    connect with bounded, time-limited retries while the engine boots
//!  ├─ 5. Exchange   upload → load (hidden) → refresh → store → close
//!  └─ 6. Teardown   terminate, wait with grace, kill the process group, remove scratch
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use oowrap::{convert_bytes, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::default();
//!     let (pdf, report) = convert_bytes(b"Hello, world".to_vec(), "pdf", &config).await?;
//!     std::fs::write("hello.pdf", pdf)?;
//!     eprintln!("{} document, {} bytes", report.document_kind, report.bytes_written);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `oowrap` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! oowrap = { version = "0.1", default-features = false }
//! ```
//!
//! ## Built-in Formats
//!
//! | Key    | Engine filter        |
//! |--------|----------------------|
//! | `doc`  | `MS Word 97`         |
//! | `docx` | `MS Word 2007 XML`   |
//! | `html` | `HTML (StarWriter)`  |
//! | `odt`  | `writer8`            |
//! | `pdf`  | `writer_pdf_Export`  |
//! | `rtf`  | `Rich Text Format`   |
//! | `txt`  | `Text (encoded)`     |
//!
//! Extend the table with [`FilterCatalog::builder`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod bridge;
pub mod config;
pub mod convert;
pub mod error;
pub mod filters;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod request;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use bridge::{
    ConnectFailure, ControlSession, Document, DocumentKind, EngineBridge, Endpoint, HelperCommand,
    LaunchContext, TcpBridge, UnoBridge,
};
pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{convert, convert_bytes, convert_file, convert_sync, convert_with};
pub use error::{CleanupError, ConvertError};
pub use filters::{FilterCatalog, FilterCatalogBuilder};
pub use output::ConversionReport;
pub use pipeline::sink::{SharedBuffer, SinkTarget};
pub use progress::{ConversionProgressCallback, EngineLaunch, NoopProgressCallback, ProgressCallback};
pub use request::{ConversionRequest, Location};
