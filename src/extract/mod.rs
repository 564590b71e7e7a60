use std::collections::HashMap;

use async_trait::async_trait;

use crate::adapter::Record;
use crate::domain::{Province, Region, Station};
use crate::geocode::Geocoder;

pub mod catalonia;
pub mod coords;
pub mod galicia;
pub mod valencia;

pub use catalonia::CataloniaExtractor;
pub use galicia::GaliciaExtractor;
pub use valencia::ValenciaExtractor;

/// Station-index -> municipality-name correspondence, a byproduct of
/// extraction consumed once by the resolver. It exists because stations are
/// extracted before localities receive persisted codes.
pub type LinkMap = HashMap<usize, String>;

/// A locality seen during extraction, before identity resolution.
///
/// The province code is unset when the record offered no usable signal;
/// the resolver drops such candidates with a logged skip.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateLocality {
    pub name: String,
    pub province_code: Option<u8>,
}

/// Region-specific extraction strategy over adapted records.
///
/// Each implementation owns its region's normalization rules: typo
/// correction, code inference, coordinate-format parsing and category
/// classification. Stations are emitted in record order.
#[async_trait]
pub trait RegionExtractor: Send + Sync {
    fn region(&self) -> Region;

    fn provinces(&self) -> Vec<Province>;

    fn localities(&self) -> Vec<CandidateLocality>;

    /// Only the Valencian registry consults the geocoder; the other regions
    /// ship coordinates inline.
    async fn stations(&self, geocoder: &dyn Geocoder) -> Vec<Station>;

    fn link_map(&self) -> LinkMap;
}

/// Builds the extractor variant for a region's adapted records.
pub fn extractor_for(region: Region, records: Vec<Record>) -> Box<dyn RegionExtractor> {
    match region {
        Region::Galicia => Box::new(GaliciaExtractor::new(records)),
        Region::Catalonia => Box::new(CataloniaExtractor::new(records)),
        Region::Valencia => Box::new(ValenciaExtractor::new(records)),
    }
}

/// Infers a province code from the 2-digit prefix of a zero-padded postal
/// code. Prefixes outside 1..=52 are not Spanish provinces.
pub fn province_from_postal(postal_code: i64) -> Option<u8> {
    if postal_code < 0 {
        return None;
    }
    let padded = format!("{:05}", postal_code);
    let prefix: u8 = padded.get(0..2)?.parse().ok()?;
    (1..=52).contains(&prefix).then_some(prefix)
}

pub(crate) fn field_str<'a>(record: &'a Record, name: &str) -> Option<&'a str> {
    record
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Numeric field access tolerant of stringly-typed sources: the delimited
/// and markup adapters emit every value as text.
pub(crate) fn field_i64(record: &Record, name: &str) -> Option<i64> {
    match record.get(name) {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn field_f64(record: &Record, name: &str) -> Option<f64> {
    match record.get(name) {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn postal_prefix_inference_respects_province_range() {
        assert_eq!(province_from_postal(15142), Some(15));
        assert_eq!(province_from_postal(3203), Some(3));
        assert_eq!(province_from_postal(52006), Some(52));
        assert_eq!(province_from_postal(99999), None);
        assert_eq!(province_from_postal(500), None);
        assert_eq!(province_from_postal(-1), None);
    }

    #[test]
    fn numeric_fields_parse_from_strings_and_numbers() {
        let mut record = Record::new();
        record.insert("cp".to_string(), json!("08402"));
        record.insert("lat".to_string(), json!(41.6084));

        assert_eq!(field_i64(&record, "cp"), Some(8402));
        assert_eq!(field_f64(&record, "lat"), Some(41.6084));
        assert_eq!(field_i64(&record, "missing"), None);
    }
}
