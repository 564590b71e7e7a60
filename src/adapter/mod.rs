use std::path::Path;

use crate::error::{IntegrationError, Result};

pub mod delimited;
pub mod markup;
pub mod structured;

pub use delimited::DelimitedAdapter;
pub use markup::MarkupAdapter;
pub use structured::StructuredAdapter;

/// A flat field-name -> value record, format-agnostic.
///
/// Adapters return records in source order; later phases correlate stations
/// to localities by record position.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Fewer distinct field names than this in the first record signals the
/// wrong delimiter or encoding was used.
pub const MIN_DISTINCT_FIELDS: usize = 3;

/// Turns a raw per-region payload into an ordered sequence of flat records.
pub trait RecordAdapter: Send + Sync + std::fmt::Debug {
    fn adapt(&self, bytes: &[u8]) -> Result<Vec<Record>>;

    fn source_format(&self) -> &'static str;
}

/// Selects the adapter for a source file by its extension.
pub fn adapter_for_path(path: &Path) -> Result<Box<dyn RecordAdapter>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .ok_or_else(|| {
            IntegrationError::Format(format!(
                "Source file has no extension: {}",
                path.display()
            ))
        })?;

    match extension.as_str() {
        "csv" => Ok(Box::new(DelimitedAdapter)),
        "xml" => Ok(Box::new(MarkupAdapter)),
        "json" => Ok(Box::new(StructuredAdapter)),
        other => Err(IntegrationError::Format(format!(
            "Unsupported source format '{}'. Valid formats: csv, xml, json",
            other
        ))),
    }
}

/// Checks the first record carries enough distinct fields to be plausible.
pub(crate) fn ensure_min_fields(records: &[Record], format: &str) -> Result<()> {
    match records.first() {
        Some(first) if first.len() >= MIN_DISTINCT_FIELDS => Ok(()),
        Some(first) => Err(IntegrationError::Format(format!(
            "{} payload yields only {} distinct field(s) in the first record; \
             expected at least {}",
            format,
            first.len(),
            MIN_DISTINCT_FIELDS
        ))),
        None => Err(IntegrationError::Format(format!(
            "{} payload contains no records",
            format
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_adapter_by_extension() {
        assert_eq!(
            adapter_for_path(Path::new("data/stations.csv"))
                .unwrap()
                .source_format(),
            "CSV"
        );
        assert_eq!(
            adapter_for_path(Path::new("data/stations.XML"))
                .unwrap()
                .source_format(),
            "XML"
        );
        assert_eq!(
            adapter_for_path(Path::new("data/stations.json"))
                .unwrap()
                .source_format(),
            "JSON"
        );
    }

    #[test]
    fn rejects_unsupported_extension() {
        let err = adapter_for_path(Path::new("data/stations.xlsx")).unwrap_err();
        assert!(matches!(err, IntegrationError::Format(_)));
    }

    #[test]
    fn rejects_missing_extension() {
        let err = adapter_for_path(Path::new("data/stations")).unwrap_err();
        assert!(matches!(err, IntegrationError::Format(_)));
    }
}
