//! Conversion requests and the file/stdio plumbing that builds them.
//!
//! A [`ConversionRequest`] is three things: a finite byte source, a byte
//! target and a format key. Callers holding streams construct one with
//! [`ConversionRequest::new`]; the CLI goes through
//! [`ConversionRequest::from_locations`], where `-` stands for stdin/stdout.

use crate::error::ConvertError;
use crate::filters::FilterCatalog;
use crate::pipeline::sink::SinkTarget;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// One conversion's input, output and format.
pub struct ConversionRequest {
    pub source: Box<dyn Read + Send>,
    pub target: Box<dyn SinkTarget>,
    /// Catalog key, e.g. `pdf`.
    pub format: String,
}

impl fmt::Debug for ConversionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionRequest")
            .field("source", &"<dyn Read>")
            .field("target", &"<dyn SinkTarget>")
            .field("format", &self.format)
            .finish()
    }
}

impl ConversionRequest {
    pub fn new(
        source: impl Read + Send + 'static,
        target: impl SinkTarget + 'static,
        format: impl Into<String>,
    ) -> Self {
        Self {
            source: Box::new(source),
            target: Box::new(target),
            format: format.into(),
        }
    }

    /// Open `source` and `target` and settle the format.
    ///
    /// The format is resolved against `catalog` before anything is opened, so
    /// an unknown format never truncates an existing target file.
    pub fn from_locations(
        source: &Location,
        target: &Location,
        format: Option<&str>,
        catalog: &FilterCatalog,
    ) -> Result<Self, ConvertError> {
        let format = resolve_format(format, target, catalog)?;

        let source: Box<dyn Read + Send> = match source {
            Location::Stdio => Box::new(std::io::stdin()),
            Location::Path(path) => Box::new(File::open(path).map_err(|source| {
                ConvertError::SourceOpen {
                    path: path.clone(),
                    source,
                }
            })?),
        };
        let target: Box<dyn SinkTarget> = match target {
            Location::Stdio => Box::new(std::io::stdout()),
            Location::Path(path) => Box::new(File::create(path).map_err(|source| {
                ConvertError::TargetOpen {
                    path: path.clone(),
                    source,
                }
            })?),
        };

        Ok(Self {
            source,
            target,
            format,
        })
    }
}

/// A command-line source or target: a path, or `-` for the standard streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Stdio,
    Path(PathBuf),
}

impl Location {
    pub fn parse(arg: &str) -> Self {
        if arg == "-" {
            Location::Stdio
        } else {
            Location::Path(PathBuf::from(arg))
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Location::Stdio => None,
            Location::Path(p) => Some(p),
        }
    }
}

impl FromStr for Location {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Location::parse(s))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Stdio => f.write_str("-"),
            Location::Path(p) => write!(f, "{}", p.display()),
        }
    }
}

/// Pick the format key: the explicit one if given, else the target's
/// extension when that is a catalog key.
pub fn resolve_format(
    explicit: Option<&str>,
    target: &Location,
    catalog: &FilterCatalog,
) -> Result<String, ConvertError> {
    if let Some(format) = explicit {
        catalog.resolve(format)?;
        return Ok(format.trim().to_ascii_lowercase());
    }
    target
        .path()
        .and_then(|p| catalog.infer_from_path(p))
        .ok_or_else(|| {
            ConvertError::InvalidConfig(format!(
                "cannot infer the target format from '{target}'; pass --format (one of: {})",
                catalog.keys().collect::<Vec<_>>().join(", ")
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dash_means_stdio() {
        assert_eq!(Location::parse("-"), Location::Stdio);
        assert_eq!(
            Location::parse("out.pdf"),
            Location::Path(PathBuf::from("out.pdf"))
        );
        assert_eq!(Location::Stdio.to_string(), "-");
    }

    #[test]
    fn explicit_format_wins_over_extension() {
        let catalog = FilterCatalog::default();
        let target = Location::parse("out.pdf");
        assert_eq!(resolve_format(Some("DOCX"), &target, &catalog).unwrap(), "docx");
    }

    #[test]
    fn format_is_inferred_from_extension() {
        let catalog = FilterCatalog::default();
        assert_eq!(
            resolve_format(None, &Location::parse("report.RTF"), &catalog).unwrap(),
            "rtf"
        );
    }

    #[test]
    fn stdout_without_format_is_rejected() {
        let err = resolve_format(None, &Location::Stdio, &FilterCatalog::default()).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidConfig(_)));
        assert!(err.to_string().contains("pdf"));
    }

    #[test]
    fn unknown_explicit_format_is_unsupported() {
        let err = resolve_format(Some("xyz"), &Location::Stdio, &FilterCatalog::default())
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedFormat { .. }));
    }

    #[test]
    fn target_is_opened_at_target_path() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.txt");
        let target = dir.path().join("out.pdf");
        std::fs::write(&source, b"source stays intact").unwrap();

        let request = ConversionRequest::from_locations(
            &Location::Path(source.clone()),
            &Location::Path(target.clone()),
            None,
            &FilterCatalog::default(),
        )
        .unwrap();
        assert_eq!(request.format, "pdf");
        drop(request);

        assert_eq!(std::fs::read(&source).unwrap(), b"source stays intact");
        assert!(target.exists());
    }

    #[test]
    fn unknown_format_does_not_touch_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.txt");
        let target = dir.path().join("out.bin");
        std::fs::write(&source, b"x").unwrap();
        std::fs::write(&target, b"precious").unwrap();

        let err = ConversionRequest::from_locations(
            &Location::Path(source),
            &Location::Path(target.clone()),
            Some("xyz"),
            &FilterCatalog::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedFormat { .. }));
        assert_eq!(std::fs::read(&target).unwrap(), b"precious");
    }

    #[test]
    fn missing_source_is_source_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        let err = ConversionRequest::from_locations(
            &Location::Path(missing.clone()),
            &Location::Path(dir.path().join("out.pdf")),
            None,
            &FilterCatalog::default(),
        )
        .unwrap_err();
        match err {
            ConvertError::SourceOpen { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn uncreatable_target_is_target_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.txt");
        std::fs::write(&source, b"x").unwrap();
        let target = dir.path().join("no-such-dir").join("out.pdf");

        let err = ConversionRequest::from_locations(
            &Location::Path(source),
            &Location::Path(target.clone()),
            None,
            &FilterCatalog::default(),
        )
        .unwrap_err();
        match err {
            ConvertError::TargetOpen { path, .. } => assert_eq!(path, target),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
