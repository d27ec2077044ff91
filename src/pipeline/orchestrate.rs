//! The load → export → stream-out exchange over an established session.
//!
//! ```text
//! 1. read source to end           5. refresh (Text / Spreadsheet only)
//! 2. create_input_stream(bytes)   6. store(document, filter, sink)
//! 3. load(hidden)                 7. close(document)        ← always, once loaded
//! 4. look up filter               8. terminate()            ← always, swallowed
//! ```
//!
//! A failure in steps 1–6 aborts the exchange and becomes the result. Steps 7
//! and 8 still run and their own failures are only logged.

use crate::bridge::{ControlSession, Document, DocumentKind, LoadOptions, OutputStream};
use crate::error::ConvertError;
use crate::filters::FilterCatalog;
use crate::pipeline::sink::{OutputSink, SinkTarget};
use crate::progress::ProgressCallback;
use std::io::Read;
use tracing::{debug, info, warn};

/// What a successful exchange produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub kind: DocumentKind,
    pub bytes_written: u64,
}

/// Drive one conversion over `session`.
pub async fn run<S, T>(
    session: &mut S,
    source: Box<dyn Read + Send>,
    sink: &mut OutputSink<T>,
    format: &str,
    filters: &FilterCatalog,
    progress: Option<&ProgressCallback>,
) -> Result<Outcome, ConvertError>
where
    S: ControlSession + ?Sized,
    T: SinkTarget,
{
    let result = exchange(session, source, sink, format, filters, progress).await;

    if let Err(e) = session.terminate().await {
        debug!("Terminate request failed (ignored): {e}");
    }
    result
}

async fn exchange<S, T>(
    session: &mut S,
    source: Box<dyn Read + Send>,
    sink: &mut OutputSink<T>,
    format: &str,
    filters: &FilterCatalog,
    progress: Option<&ProgressCallback>,
) -> Result<Outcome, ConvertError>
where
    S: ControlSession + ?Sized,
    T: SinkTarget,
{
    // ── Step 1: Read source ──────────────────────────────────────────────
    let data = read_source(source).await?;
    debug!("Read {} source bytes", data.len());

    // ── Steps 2–3: Upload and load ───────────────────────────────────────
    let input = session.create_input_stream(data).await?;
    let document = session.load(input, LoadOptions::hidden()).await?;
    let kind = document.kind();
    info!("Engine loaded a {kind} document");
    if let Some(cb) = progress {
        cb.on_document_loaded(kind);
    }

    // ── Steps 4–6: Filter, refresh, export ───────────────────────────────
    let exported = export(session, &document, sink, format, filters).await;

    // ── Step 7: Close ────────────────────────────────────────────────────
    if let Err(e) = session.close(document).await {
        warn!("Closing the document failed: {e}");
    }

    exported?;
    let bytes_written = sink.bytes_written();
    info!("Exported {bytes_written} bytes as '{format}'");
    if let Some(cb) = progress {
        cb.on_export_complete(bytes_written);
    }
    Ok(Outcome {
        kind,
        bytes_written,
    })
}

async fn export<S, T>(
    session: &mut S,
    document: &Document,
    sink: &mut OutputSink<T>,
    format: &str,
    filters: &FilterCatalog,
) -> Result<(), ConvertError>
where
    S: ControlSession + ?Sized,
    T: SinkTarget,
{
    let filter = filters.resolve(format)?;

    if document.supports_refresh() {
        debug!("Refreshing {} document", document.kind());
        session.refresh(document).await?;
    }

    debug!("Storing through filter '{filter}'");
    session.store(document, filter, sink).await?;

    // The engine normally closes the stream itself; make sure it happened.
    sink.close_output()
        .map_err(|source| ConvertError::OutputWrite { source })
}

async fn read_source(mut source: Box<dyn Read + Send>) -> Result<Vec<u8>, ConvertError> {
    tokio::task::spawn_blocking(move || {
        let mut data = Vec::new();
        source.read_to_end(&mut data).map(|_| data)
    })
    .await
    .map_err(|e| ConvertError::Internal(format!("source reader task failed: {e}")))?
    .map_err(|source| ConvertError::SourceRead { source })
}
