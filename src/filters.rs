//! The filter catalog: target format key → engine export filter name.
//!
//! The catalog is a plain value. It is built once (usually
//! [`FilterCatalog::default`], optionally extended through
//! [`FilterCatalog::builder`]) and then shared read-only behind an `Arc` in
//! [`crate::config::ConversionConfig`]. Nothing mutates it after `build()`.

use crate::error::ConvertError;
use std::collections::BTreeMap;
use std::path::Path;

/// Built-in Writer export filters.
const BUILTIN: &[(&str, &str)] = &[
    ("doc", "MS Word 97"),
    ("docx", "MS Word 2007 XML"),
    ("odt", "writer8"),
    ("pdf", "writer_pdf_Export"),
    ("rtf", "Rich Text Format"),
    ("txt", "Text (encoded)"),
    ("html", "HTML (StarWriter)"),
];

/// Immutable format → filter mapping. Keys are lower-case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCatalog {
    entries: BTreeMap<String, String>,
}

impl Default for FilterCatalog {
    fn default() -> Self {
        Self {
            entries: BUILTIN
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl FilterCatalog {
    /// Start from the built-in entries.
    pub fn builder() -> FilterCatalogBuilder {
        FilterCatalogBuilder {
            entries: Self::default().entries,
        }
    }

    /// Look up the filter name for `format` (case-insensitive).
    pub fn get(&self, format: &str) -> Option<&str> {
        self.entries
            .get(&format.trim().to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Like [`get`](Self::get), but fails with [`ConvertError::UnsupportedFormat`].
    pub fn resolve(&self, format: &str) -> Result<&str, ConvertError> {
        self.get(format)
            .ok_or_else(|| ConvertError::UnsupportedFormat {
                format: format.to_string(),
                known: self.keys().collect::<Vec<_>>().join(", "),
            })
    }

    pub fn contains(&self, format: &str) -> bool {
        self.get(format).is_some()
    }

    /// Catalog keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// `(key, filter)` pairs in sorted key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Infer a format key from a path's extension, if the extension is a
    /// catalog key. `out.PDF` → `Some("pdf")`, `out` → `None`.
    pub fn infer_from_path(&self, path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.entries.contains_key(&ext).then_some(ext)
    }
}

/// Builder for [`FilterCatalog`].
#[derive(Debug)]
pub struct FilterCatalogBuilder {
    entries: BTreeMap<String, String>,
}

impl FilterCatalogBuilder {
    /// Start from an empty catalog instead of the built-ins.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Add or replace one entry.
    pub fn filter(mut self, format: impl AsRef<str>, filter_name: impl Into<String>) -> Self {
        self.entries.insert(
            format.as_ref().trim().to_ascii_lowercase(),
            filter_name.into(),
        );
        self
    }

    /// Parse a `key=Filter Name` entry as given on the command line.
    pub fn parse_entry(self, entry: &str) -> Result<Self, ConvertError> {
        let (key, name) = entry.split_once('=').ok_or_else(|| {
            ConvertError::InvalidConfig(format!("filter entry '{entry}' must look like KEY=FILTER"))
        })?;
        let (key, name) = (key.trim(), name.trim());
        if key.is_empty() || name.is_empty() {
            return Err(ConvertError::InvalidConfig(format!(
                "filter entry '{entry}' has an empty key or filter name"
            )));
        }
        Ok(self.filter(key, name))
    }

    pub fn build(self) -> Result<FilterCatalog, ConvertError> {
        if self.entries.is_empty() {
            return Err(ConvertError::InvalidConfig(
                "filter catalog must not be empty".into(),
            ));
        }
        Ok(FilterCatalog {
            entries: self.entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_common_formats() {
        let c = FilterCatalog::default();
        assert_eq!(c.get("pdf"), Some("writer_pdf_Export"));
        assert_eq!(c.get("docx"), Some("MS Word 2007 XML"));
        assert_eq!(c.get("txt"), Some("Text (encoded)"));
        assert_eq!(c.len(), 7);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let c = FilterCatalog::default();
        assert_eq!(c.get("PDF"), Some("writer_pdf_Export"));
        assert_eq!(c.get(" Odt "), Some("writer8"));
    }

    #[test]
    fn resolve_unknown_format() {
        let err = FilterCatalog::default().resolve("xyz").unwrap_err();
        match err {
            ConvertError::UnsupportedFormat { format, known } => {
                assert_eq!(format, "xyz");
                assert!(known.contains("pdf"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn infer_from_extension() {
        let c = FilterCatalog::default();
        assert_eq!(c.infer_from_path(Path::new("out/report.PDF")), Some("pdf".into()));
        assert_eq!(c.infer_from_path(Path::new("notes.txt")), Some("txt".into()));
        assert_eq!(c.infer_from_path(Path::new("archive.tar.gz")), None);
        assert_eq!(c.infer_from_path(Path::new("no_extension")), None);
        assert_eq!(c.infer_from_path(Path::new("-")), None);
    }

    #[test]
    fn builder_extends_and_overrides() {
        let c = FilterCatalog::builder()
            .filter("XLSX", "Calc MS Excel 2007 XML")
            .filter("html", "XHTML Writer File")
            .build()
            .unwrap();
        assert_eq!(c.get("xlsx"), Some("Calc MS Excel 2007 XML"));
        assert_eq!(c.get("html"), Some("XHTML Writer File"));
        assert_eq!(c.len(), 8);
    }

    #[test]
    fn parse_entry_from_cli_syntax() {
        let c = FilterCatalog::builder()
            .parse_entry("epub = EPUB")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(c.get("epub"), Some("EPUB"));

        assert!(FilterCatalog::builder().parse_entry("epub").is_err());
        assert!(FilterCatalog::builder().parse_entry("=EPUB").is_err());
    }

    #[test]
    fn empty_catalog_rejected() {
        assert!(FilterCatalogBuilder::empty().build().is_err());
    }
}
