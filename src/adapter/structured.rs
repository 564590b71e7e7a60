use serde_json::Value;
use tracing::debug;

use super::{ensure_min_fields, Record, RecordAdapter};
use crate::error::{IntegrationError, Result};

/// Adapter for registry exports already shaped as an array of flat objects.
#[derive(Debug)]
pub struct StructuredAdapter;

impl RecordAdapter for StructuredAdapter {
    fn adapt(&self, bytes: &[u8]) -> Result<Vec<Record>> {
        let root: Value = serde_json::from_slice(bytes)?;

        let Value::Array(items) = root else {
            return Err(IntegrationError::Format(
                "JSON payload is not a top-level array of records".to_string(),
            ));
        };

        let mut records = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(map) => records.push(map),
                other => {
                    return Err(IntegrationError::Format(format!(
                        "JSON record {} is not an object: {}",
                        index, other
                    )))
                }
            }
        }

        ensure_min_fields(&records, "JSON")?;
        debug!(records = records.len(), "structured payload parsed");
        Ok(records)
    }

    fn source_format(&self) -> &'static str {
        "JSON"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_array_of_objects() {
        let json = r#"[
            {"PROVINCIA": "Valencia", "MUNICIPIO": "Silla", "C.POSTAL": "46460"},
            {"PROVINCIA": "Alicante", "MUNICIPIO": "Elche", "C.POSTAL": "03203"}
        ]"#;
        let records = StructuredAdapter.adapt(json.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["MUNICIPIO"], "Elche");
    }

    #[test]
    fn rejects_non_array_payload() {
        let err = StructuredAdapter.adapt(br#"{"not": "an array"}"#).unwrap_err();
        assert!(matches!(err, IntegrationError::Format(_)));
    }

    #[test]
    fn rejects_too_few_fields() {
        let err = StructuredAdapter
            .adapt(br#"[{"PROVINCIA": "Valencia"}]"#)
            .unwrap_err();
        assert!(matches!(err, IntegrationError::Format(_)));
    }
}
