use encoding_rs::{Encoding, ISO_8859_15, UTF_8, WINDOWS_1252};
use serde_json::Value;
use tracing::debug;

use super::{Record, RecordAdapter, MIN_DISTINCT_FIELDS};
use crate::error::{IntegrationError, Result};

/// Adapter for semicolon-delimited registry exports.
///
/// Regional authorities publish these files in a mix of legacy encodings, so
/// candidate encodings are tried in order and the first one that decodes
/// without replacement characters and parses into plausible records wins.
/// UTF-8 goes first: it rejects legacy single-byte sequences, while the
/// single-byte encodings accept almost anything and would mojibake UTF-8.
/// ISO-8859-1 bytes decode identically under its windows-1252 superset.
#[derive(Debug)]
pub struct DelimitedAdapter;

const CANDIDATE_ENCODINGS: [&Encoding; 3] = [UTF_8, WINDOWS_1252, ISO_8859_15];

const DELIMITER: u8 = b';';

impl RecordAdapter for DelimitedAdapter {
    fn adapt(&self, bytes: &[u8]) -> Result<Vec<Record>> {
        let mut structural_failure: Option<String> = None;

        for encoding in CANDIDATE_ENCODINGS {
            let (decoded, _, had_errors) = encoding.decode(bytes);
            if had_errors || decoded.contains('\u{FFFD}') {
                debug!(encoding = encoding.name(), "decoding produced replacement characters");
                continue;
            }

            match parse_records(&decoded) {
                Ok(records) => {
                    debug!(
                        encoding = encoding.name(),
                        records = records.len(),
                        "delimited payload parsed"
                    );
                    return Ok(records);
                }
                Err(reason) => {
                    debug!(encoding = encoding.name(), %reason, "candidate rejected");
                    structural_failure.get_or_insert(reason);
                }
            }
        }

        // A clean decode that still failed the field check means the content
        // itself is malformed, not the encoding.
        match structural_failure {
            Some(reason) => Err(IntegrationError::Format(reason)),
            None => Err(IntegrationError::Encoding(
                "CSV payload did not decode cleanly with any of windows-1252, UTF-8, ISO-8859-15"
                    .to_string(),
            )),
        }
    }

    fn source_format(&self) -> &'static str {
        "CSV"
    }
}

/// Parses decoded CSV text into records, or explains why it is implausible.
fn parse_records(decoded: &str) -> std::result::Result<Vec<Record>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .quote(b'"')
        .flexible(true)
        .from_reader(decoded.as_bytes());

    let headers: Vec<String> = match reader.headers() {
        Ok(headers) => headers.iter().map(|h| h.trim().to_string()).collect(),
        Err(e) => return Err(format!("unreadable header row: {}", e)),
    };

    let distinct = headers
        .iter()
        .filter(|h| !h.is_empty())
        .collect::<std::collections::HashSet<_>>()
        .len();
    if distinct < MIN_DISTINCT_FIELDS {
        return Err(format!(
            "only {} distinct field name(s) detected; check the ';' delimiter",
            distinct
        ));
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = match row {
            Ok(row) => row,
            Err(e) => return Err(format!("unreadable data row: {}", e)),
        };

        let mut record = Record::new();
        for (header, value) in headers.iter().zip(row.iter()) {
            let value = value.trim();
            // Empty cells are nulls, not empty strings
            if !header.is_empty() && !value.is_empty() {
                record.insert(header.clone(), Value::String(value.to_string()));
            }
        }
        records.push(record);
    }

    if records.is_empty() {
        return Err("no data rows after the header".to_string());
    }

    Ok(records)
}
