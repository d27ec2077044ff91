//! The engine collaborator interface.
//!
//! The wrapper never renders anything itself; it drives an external engine
//! through a small set of remote operations. This module states that
//! contract as traits so the pipeline can run against the real binding
//! ([`uno::UnoBridge`]) or against a scripted fake in tests.
//!
//! The engine only speaks its own binary remote-object protocol (URP) on the
//! acceptor it is launched with. [`uno::UnoBridge`] starts a small helper
//! beside it, run by the engine's Python with its UNO bindings, which
//! connects to that acceptor and serves the framed protocol from [`wire`] on
//! a second port. [`tcp::TcpBridge`] is the client half of that protocol.
//!
//! ```text
//! oowrap ──frames──▶ helper (python + uno) ──URP──▶ soffice
//!        control_port                     engine port
//! ```
//!
//! ```text
//! EngineBridge::connect ──▶ ControlSession
//!                              ├─ create_input_stream(bytes) ─▶ InputStreamHandle
//!                              ├─ load(input, options)         ─▶ Document
//!                              ├─ refresh(&Document)            (optional capability)
//!                              ├─ store(&Document, filter, &mut dyn OutputStream)
//!                              ├─ close(Document)
//!                              └─ terminate()
//! ```

pub mod tcp;
pub mod uno;
pub mod wire;

use crate::error::ConvertError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

pub use tcp::TcpBridge;
pub use uno::UnoBridge;

/// Where the engine's control listener lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// What a bridge gets to know about a freshly launched engine.
#[derive(Debug, Clone, Copy)]
pub struct LaunchContext<'a> {
    pub engine: &'a Path,
    pub host: &'a str,
    /// Port of the engine's own acceptor.
    pub engine_port: u16,
    /// Port a helper should serve the control channel on.
    pub control_port: u16,
    pub scratch: &'a Path,
}

/// A side process a bridge needs running next to the engine.
///
/// It is spawned into the engine's process group and torn down with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(OsString, OsString)>,
}

/// Why a single connection attempt failed.
#[derive(Debug)]
pub enum ConnectFailure {
    /// Nobody is listening yet; the engine is probably still starting.
    NoListener(std::io::Error),
    /// Anything else. Retrying will not help.
    Fatal(String),
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectFailure::NoListener(e) => write!(f, "no listener: {e}"),
            ConnectFailure::Fatal(detail) => f.write_str(detail),
        }
    }
}

/// Engine-side object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

/// An engine-native input stream wrapping the uploaded source bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputStreamHandle(pub ObjectId);

/// Which kind of document the engine loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Text,
    Spreadsheet,
    Presentation,
    Drawing,
    Other,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentKind::Text => "text",
            DocumentKind::Spreadsheet => "spreadsheet",
            DocumentKind::Presentation => "presentation",
            DocumentKind::Drawing => "drawing",
            DocumentKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// A loaded document, tagged by variant.
///
/// Only some variants expose a content refresh (recomputing fields, indexes
/// and formulas before export); see [`Document::supports_refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Document {
    Text(ObjectId),
    Spreadsheet(ObjectId),
    Presentation(ObjectId),
    Drawing(ObjectId),
    Other(ObjectId),
}

impl Document {
    pub fn new(kind: DocumentKind, id: ObjectId) -> Self {
        match kind {
            DocumentKind::Text => Document::Text(id),
            DocumentKind::Spreadsheet => Document::Spreadsheet(id),
            DocumentKind::Presentation => Document::Presentation(id),
            DocumentKind::Drawing => Document::Drawing(id),
            DocumentKind::Other => Document::Other(id),
        }
    }

    pub fn id(&self) -> ObjectId {
        match self {
            Document::Text(id)
            | Document::Spreadsheet(id)
            | Document::Presentation(id)
            | Document::Drawing(id)
            | Document::Other(id) => *id,
        }
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            Document::Text(_) => DocumentKind::Text,
            Document::Spreadsheet(_) => DocumentKind::Spreadsheet,
            Document::Presentation(_) => DocumentKind::Presentation,
            Document::Drawing(_) => DocumentKind::Drawing,
            Document::Other(_) => DocumentKind::Other,
        }
    }

    /// Text documents (fields, indexes) and spreadsheets (formulas, links)
    /// can be refreshed. Everything else is exported as loaded.
    pub fn supports_refresh(&self) -> bool {
        matches!(self, Document::Text(_) | Document::Spreadsheet(_))
    }
}

/// Media-descriptor flags for loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Load into an invisible frame.
    pub hidden: bool,
    pub read_only: bool,
    /// Open templates as templates instead of creating a new document from them.
    pub as_template: bool,
    /// Allow the engine to show dialogs (macro warnings, filter options).
    pub interactive: bool,
}

impl LoadOptions {
    /// Invisible, non-interactive, no template substitution.
    pub fn hidden() -> Self {
        Self {
            hidden: true,
            read_only: true,
            as_template: false,
            interactive: false,
        }
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::hidden()
    }
}

/// The byte-output capability set the engine writes exported data into.
pub trait OutputStream: Send {
    fn write_bytes(&mut self, data: &[u8]) -> std::io::Result<()>;
    fn flush(&mut self) -> std::io::Result<()>;
    fn close_output(&mut self) -> std::io::Result<()>;
}

/// Opens control sessions to a running engine.
#[async_trait]
pub trait EngineBridge: Send + Sync {
    type Session: ControlSession;

    /// One connection attempt. Must not retry internally.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Session, ConnectFailure>;

    /// Helper process to start once the engine is running. When one is
    /// returned, [`connect`](Self::connect) is pointed at
    /// [`LaunchContext::control_port`] instead of the engine's port.
    fn helper(&self, _launch: &LaunchContext<'_>) -> Result<Option<HelperCommand>, ConvertError> {
        Ok(None)
    }
}

/// An established session with the engine's service registry.
#[async_trait]
pub trait ControlSession: Send {
    /// Upload `data` as an engine-side input stream.
    async fn create_input_stream(&mut self, data: Vec<u8>)
        -> Result<InputStreamHandle, ConvertError>;

    async fn load(
        &mut self,
        input: InputStreamHandle,
        options: LoadOptions,
    ) -> Result<Document, ConvertError>;

    /// Refresh a document. Callers check [`Document::supports_refresh`] first.
    async fn refresh(&mut self, document: &Document) -> Result<(), ConvertError>;

    /// Export `document` through `filter`, streaming bytes into `sink`.
    async fn store(
        &mut self,
        document: &Document,
        filter: &str,
        sink: &mut dyn OutputStream,
    ) -> Result<(), ConvertError>;

    async fn close(&mut self, document: Document) -> Result<(), ConvertError>;

    /// Ask the engine to shut its desktop down.
    async fn terminate(&mut self) -> Result<(), ConvertError>;
}
