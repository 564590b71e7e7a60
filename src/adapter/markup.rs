use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::Value;
use tracing::{debug, trace};

use super::{ensure_min_fields, Record, RecordAdapter};
use crate::error::{IntegrationError, Result};

/// Adapter for nested markup registry exports.
///
/// The source wraps every station in a `<row>` element, and wraps all those
/// rows in an outer `<row>` container that carries no leaf data of its own.
/// Each leaf occurrence is flattened into one record; a row holding none of
/// the minimal field set is a container and is discarded.
#[derive(Debug)]
pub struct MarkupAdapter;

const ROW_TAG: &[u8] = b"row";

/// A row with real station data carries at least one of these fields.
const MINIMAL_FIELDS: [&str; 3] = ["estaci", "denominaci", "municipi"];

impl RecordAdapter for MarkupAdapter {
    fn adapt(&self, bytes: &[u8]) -> Result<Vec<Record>> {
        let text = String::from_utf8_lossy(bytes);
        let mut reader = Reader::from_str(&text);
        reader.config_mut().trim_text(true);

        let mut records: Vec<Record> = Vec::new();
        // Container rows wrap data rows, so open rows form a stack
        let mut row_stack: Vec<Record> = Vec::new();
        let mut current_field: Option<FieldCapture> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| IntegrationError::Format(format!("malformed XML: {}", e)))?;

            match event {
                Event::Start(e) if e.local_name().as_ref() == ROW_TAG => {
                    row_stack.push(Record::new());
                    current_field = None;
                }
                Event::Start(e) if !row_stack.is_empty() => {
                    current_field = FieldCapture::open(&e)?;
                }
                Event::Empty(e) if !row_stack.is_empty() => {
                    if let Some(capture) = FieldCapture::open(&e)? {
                        if let Some(row) = row_stack.last_mut() {
                            capture.commit(row);
                        }
                    }
                }
                Event::Text(t) => {
                    if let Some(capture) = current_field.as_mut() {
                        let chunk = t
                            .unescape()
                            .map_err(|e| IntegrationError::Format(format!("malformed XML text: {}", e)))?;
                        capture.text.push_str(&chunk);
                    }
                }
                Event::End(e) if e.local_name().as_ref() == ROW_TAG => {
                    if let Some(row) = row_stack.pop() {
                        if has_station_data(&row) {
                            trace!(fields = row.len(), "row flattened into record");
                            records.push(row);
                        } else {
                            trace!("container row without leaf data discarded");
                        }
                    }
                    current_field = None;
                }
                Event::End(_) => {
                    if let (Some(capture), Some(row)) = (current_field.take(), row_stack.last_mut())
                    {
                        capture.commit(row);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        debug!(records = records.len(), "markup payload flattened");
        ensure_min_fields(&records, "XML")?;
        Ok(records)
    }

    fn source_format(&self) -> &'static str {
        "XML"
    }
}

/// An open leaf element being accumulated into a field value.
struct FieldCapture {
    name: String,
    /// A `url` attribute wins over the element's text content.
    url: Option<String>,
    text: String,
}

impl FieldCapture {
    /// Starts capturing a leaf element, or `None` for metadata tags.
    fn open(element: &BytesStart<'_>) -> Result<Option<Self>> {
        let name = String::from_utf8_lossy(element.local_name().as_ref()).to_string();
        if name.starts_with('_') || name == "geocoded_column" || name == "row" {
            return Ok(None);
        }

        let mut url = None;
        for attr in element.attributes() {
            let attr = attr
                .map_err(|e| IntegrationError::Format(format!("malformed XML attribute: {}", e)))?;
            if attr.key.as_ref() == b"url" {
                let value = attr.unescape_value().map_err(|e| {
                    IntegrationError::Format(format!("malformed XML attribute: {}", e))
                })?;
                url = Some(value.to_string());
            }
        }

        Ok(Some(Self {
            name,
            url,
            text: String::new(),
        }))
    }

    fn commit(self, row: &mut Record) {
        if let Some(url) = self.url {
            row.insert(self.name, Value::String(url));
            return;
        }

        let text = self.text.trim();
        if !text.is_empty() {
            row.insert(self.name, Value::String(text.to_string()));
        }
    }
}

fn has_station_data(row: &Record) -> bool {
    MINIMAL_FIELDS.iter().any(|field| row.contains_key(*field))
}
