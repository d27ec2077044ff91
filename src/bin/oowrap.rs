//! CLI binary for oowrap.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, opens SOURCE and TARGET, and reports the outcome.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use oowrap::{
    convert, ConversionConfig, ConversionProgressCallback, ConversionRequest, ConvertError,
    DocumentKind, EngineLaunch, FilterCatalog, Location, ProgressCallback,
};
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner on stderr that follows the engine through its lifecycle.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, format: &str) {
        self.bar.set_prefix("Launching");
        self.bar.set_message(format!("engine for a {} export", bold(format)));
    }

    fn on_engine_launched(&self, launch: &EngineLaunch) {
        self.bar.println(format!(
            "{} {}  {}",
            cyan("◆"),
            bold(&launch.engine.display().to_string()),
            dim(&format!("pid {}  port {}", launch.pid, launch.port)),
        ));
    }

    fn on_connect_attempt(&self, attempt: u32, max_attempts: u32) {
        self.bar.set_prefix("Connecting");
        self.bar
            .set_message(format!("attempt {attempt}/{max_attempts}"));
    }

    fn on_connected(&self, attempts: u32) {
        self.bar.set_prefix("Converting");
        self.bar.set_message(format!(
            "connected after {attempts} attempt{}",
            if attempts == 1 { "" } else { "s" }
        ));
    }

    fn on_document_loaded(&self, kind: DocumentKind) {
        self.bar.set_message(format!("exporting {kind} document"));
    }

    fn on_export_complete(&self, bytes_written: u64) {
        self.bar.set_prefix("Finishing");
        self.bar.set_message(format!("{bytes_written} bytes written"));
    }

    fn on_teardown_complete(&self, _exit_code: Option<i32>) {
        self.bar.finish_and_clear();
    }
}

impl Drop for CliProgressCallback {
    fn drop(&mut self) {
        // Failures before launch never reach on_teardown_complete.
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Format inferred from the target extension
  oowrap letter.odt letter.pdf

  # Pipe through stdin/stdout
  cat notes.txt | oowrap -f docx - - > notes.docx

  # Slow machine: give the engine more time to come up
  oowrap --connect-attempts 60 report.doc report.pdf

  # Add an export filter the built-in table lacks
  oowrap --filter xhtml="XHTML Writer File" page.odt page.xhtml

  # Machine-readable report on stderr
  oowrap --json --no-progress in.rtf out.pdf 2> report.json

ENVIRONMENT VARIABLES:
  OOWRAP_ENGINE             Engine executable (soffice); skips the search
  OOWRAP_PYTHON             Python with UNO bindings for the bridge helper
  OOWRAP_CONNECT_ATTEMPTS   Default for --connect-attempts
  RUST_LOG                  Log filter, e.g. oowrap=debug

EXIT STATUS:
  0  conversion succeeded (or the engine's own non-zero exit code, if it
     reported one after a successful conversion)
  1  conversion failed; TARGET contents are undefined
  2  usage error
"#;

/// Convert documents between office formats with a headless office engine.
#[derive(Parser, Debug)]
#[command(
    name = "oowrap",
    version,
    about = "Convert documents between office formats with a headless office engine",
    long_about = "Convert a document by launching a private, headless LibreOffice/OpenOffice \
instance, loading SOURCE into it and exporting it to TARGET through the engine filter \
matching the target format. The engine and its scratch profile are removed afterwards.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Source document path, or `-` for stdin.
    #[arg(required_unless_present = "list_formats")]
    source: Option<String>,

    /// Target path, or `-` for stdout.
    #[arg(required_unless_present = "list_formats")]
    target: Option<String>,

    /// Target format key (pdf, docx, odt, …). Inferred from TARGET's extension if omitted.
    #[arg(short, long)]
    format: Option<String>,

    /// Engine executable. Default: searched in well-known locations and PATH.
    #[arg(long, env = "OOWRAP_ENGINE")]
    engine: Option<std::path::PathBuf>,

    /// Python interpreter with the engine's UNO bindings, used to run the bridge helper.
    /// Default: the engine's bundled interpreter, else python3 on PATH.
    #[arg(long, env = "OOWRAP_PYTHON")]
    python: Option<std::path::PathBuf>,

    /// Control-connection attempts while the engine starts.
    #[arg(long, env = "OOWRAP_CONNECT_ATTEMPTS", default_value_t = 20,
          value_parser = clap::value_parser!(u32).range(1..))]
    connect_attempts: u32,

    /// Pause between connection attempts, in milliseconds.
    #[arg(long, env = "OOWRAP_CONNECT_INTERVAL_MS", default_value_t = 1000)]
    connect_interval_ms: u64,

    /// Longest a single connection attempt may wait for the handshake, in milliseconds.
    #[arg(long, env = "OOWRAP_HANDSHAKE_TIMEOUT_MS", default_value_t = 2000)]
    handshake_timeout_ms: u64,

    /// Time the engine gets to exit after terminate before it is killed, in milliseconds.
    #[arg(long, env = "OOWRAP_SHUTDOWN_GRACE_MS", default_value_t = 500)]
    shutdown_grace_ms: u64,

    /// Extra catalog entry KEY=FILTER (repeatable).
    #[arg(long = "filter", value_name = "KEY=FILTER")]
    filters: Vec<String>,

    /// Print the format catalog and exit.
    #[arg(long)]
    list_formats: bool,

    /// Print the conversion report as JSON on stderr.
    #[arg(long)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "OOWRAP_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OOWRAP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OOWRAP_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let code = e
                .chain()
                .find_map(|cause| cause.downcast_ref::<ConvertError>())
                .map_or(1, ConvertError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; keep INFO logs out of
    // its way unless asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let catalog = build_catalog(&cli.filters)?;

    // ── Catalog listing ──────────────────────────────────────────────────
    if cli.list_formats {
        for (key, filter) in catalog.iter() {
            println!("{key:<8} {filter}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    // Both are present: clap enforces them unless --list-formats was given.
    let source = Location::parse(cli.source.as_deref().unwrap_or("-"));
    let target = Location::parse(cli.target.as_deref().unwrap_or("-"));

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, catalog, progress_cb)?;

    // ── Run conversion ───────────────────────────────────────────────────
    let request =
        ConversionRequest::from_locations(&source, &target, cli.format.as_deref(), &config.filters)
            .with_context(|| format!("Cannot convert '{source}' to '{target}'"))?;
    let report = convert(request, &config)
        .await
        .context("Conversion failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        eprintln!("{json}");
    } else if !cli.quiet {
        eprintln!(
            "{}  {} → {}  {}  {}",
            green("✔"),
            source,
            bold(&target.to_string()),
            dim(&format!("{} {} bytes", report.format, report.bytes_written)),
            dim(&format!("{}ms", report.duration_ms)),
        );
    }

    Ok(exit_code(report.engine_exit_code))
}

fn build_catalog(entries: &[String]) -> Result<FilterCatalog> {
    entries
        .iter()
        .try_fold(FilterCatalog::builder(), |builder, entry| {
            builder.parse_entry(entry)
        })
        .and_then(|builder| builder.build())
        .context("Invalid --filter entry")
}

/// Map CLI args to `ConversionConfig`.
fn build_config(
    cli: &Cli,
    catalog: FilterCatalog,
    progress: Option<ProgressCallback>,
) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .connect_attempts(cli.connect_attempts)
        .connect_interval_ms(cli.connect_interval_ms)
        .handshake_timeout_ms(cli.handshake_timeout_ms)
        .shutdown_grace_ms(cli.shutdown_grace_ms)
        .filters(catalog);

    if let Some(ref engine) = cli.engine {
        builder = builder.engine_path(engine.clone());
    }
    if let Some(ref python) = cli.python {
        builder = builder.python_path(python.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// 0 unless the engine reported a non-zero exit code of its own.
fn exit_code(engine_exit_code: Option<i32>) -> ExitCode {
    match engine_exit_code {
        None | Some(0) => ExitCode::SUCCESS,
        Some(code) => u8::try_from(code).map(ExitCode::from).unwrap_or(ExitCode::FAILURE),
    }
}
