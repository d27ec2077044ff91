//! Conversion entry points.
//!
//! Every entry point funnels into [`convert_with`], which owns the session
//! lifecycle:
//!
//! ```text
//! validate format ─▶ locate engine ─▶ scratch + launch + helper ─┬─▶ resolve ─▶ orchestrate
//!                                                                │
//!                                       teardown (always) ◀──────┘
//! ```
//!
//! Nothing is allocated or spawned for a request whose format is unknown.
//! Once the engine has been launched, teardown runs whatever happens next.

use crate::bridge::{EngineBridge, UnoBridge};
use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::output::ConversionReport;
use crate::pipeline::orchestrate::{self, Outcome};
use crate::pipeline::scratch;
use crate::pipeline::session::EngineSession;
use crate::pipeline::sink::{OutputSink, SharedBuffer, SinkTarget};
use crate::request::{ConversionRequest, Location};
use std::io::Read;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Convert one document, driving the engine through the UNO bridge helper.
///
/// # Example
/// ```rust,no_run
/// use oowrap::{convert, ConversionConfig, ConversionRequest};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = std::fs::File::open("letter.odt")?;
/// let target = std::fs::File::create("letter.pdf")?;
/// let report = convert(
///     ConversionRequest::new(source, target, "pdf"),
///     &ConversionConfig::default(),
/// )
/// .await?;
/// eprintln!("{} bytes in {}ms", report.bytes_written, report.duration_ms);
/// # Ok(())
/// # }
/// ```
pub async fn convert(
    request: ConversionRequest,
    config: &ConversionConfig,
) -> Result<ConversionReport, ConvertError> {
    convert_with(&UnoBridge::from_config(config), request, config).await
}

/// Convert one document, talking to the engine through `bridge`.
pub async fn convert_with<B: EngineBridge>(
    bridge: &B,
    request: ConversionRequest,
    config: &ConversionConfig,
) -> Result<ConversionReport, ConvertError> {
    let started = Instant::now();
    let ConversionRequest {
        source,
        target,
        format,
    } = request;
    let progress = config.progress_callback.as_ref();

    // ── Step 1: Validate before touching anything ────────────────────────
    let format = format.trim().to_ascii_lowercase();
    let filter = config.filters.resolve(&format)?.to_string();
    info!("Converting to '{format}' with filter '{filter}'");
    if let Some(cb) = progress {
        cb.on_conversion_start(&format);
    }

    // ── Step 2: Engine, scratch state, launch (and bridge helper) ────────
    let engine = config.resolve_engine()?;
    let scratch = scratch::allocate()?;
    let mut session = EngineSession::open(
        bridge,
        &engine,
        &config.host,
        scratch,
        config.shutdown_grace(),
    )
    .await?;
    let launch = session.launch_info();
    if let Some(cb) = progress {
        cb.on_engine_launched(&launch);
    }

    // ── Step 3: Resolve and run the exchange ─────────────────────────────
    let mut sink = OutputSink::new(target);
    let result = drive(bridge, &mut session, source, &mut sink, &format, config).await;
    drop(sink);

    // ── Step 4: Teardown, on every path ──────────────────────────────────
    let engine_exit_code = session.teardown(config.shutdown_grace()).await;
    if let Some(cb) = progress {
        cb.on_teardown_complete(engine_exit_code);
    }

    let (outcome, connect_attempts) = result?;
    let duration_ms = started.elapsed().as_millis() as u64;
    info!(
        "Conversion complete: {} bytes in {duration_ms}ms",
        outcome.bytes_written
    );
    Ok(ConversionReport {
        format,
        filter,
        document_kind: outcome.kind,
        bytes_written: outcome.bytes_written,
        port: launch.port,
        connect_attempts,
        engine_exit_code,
        duration_ms,
    })
}

async fn drive<B, T>(
    bridge: &B,
    session: &mut EngineSession<B::Session>,
    source: Box<dyn Read + Send>,
    sink: &mut OutputSink<T>,
    format: &str,
    config: &ConversionConfig,
) -> Result<(Outcome, u32), ConvertError>
where
    B: EngineBridge,
    T: SinkTarget,
{
    let policy = config.retry_policy();
    let progress = config.progress_callback.as_ref();
    let attempts = session
        .connect(bridge, &config.host, &policy, progress)
        .await?;
    let outcome = orchestrate::run(
        session.control()?,
        source,
        sink,
        format,
        &config.filters,
        progress,
    )
    .await?;
    Ok((outcome, attempts))
}

/// Convert an in-memory document and return the converted bytes.
pub async fn convert_bytes(
    source: impl Into<Vec<u8>>,
    format: &str,
    config: &ConversionConfig,
) -> Result<(Vec<u8>, ConversionReport), ConvertError> {
    let buffer = SharedBuffer::default();
    let request = ConversionRequest::new(
        std::io::Cursor::new(source.into()),
        buffer.clone(),
        format,
    );
    let report = convert(request, config).await?;
    Ok((buffer.into_inner(), report))
}

/// Convert `source` into `target`. The format is inferred from the target's
/// extension when `format` is `None`.
pub async fn convert_file(
    source: impl AsRef<Path>,
    target: impl AsRef<Path>,
    format: Option<&str>,
    config: &ConversionConfig,
) -> Result<ConversionReport, ConvertError> {
    let request = ConversionRequest::from_locations(
        &Location::Path(source.as_ref().to_path_buf()),
        &Location::Path(target.as_ref().to_path_buf()),
        format,
        &config.filters,
    )?;
    convert(request, config).await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally; do not call it from inside
/// an async context.
pub fn convert_sync(
    request: ConversionRequest,
    config: &ConversionConfig,
) -> Result<ConversionReport, ConvertError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(convert(request, config))
}
