use std::sync::OnceLock;

use regex::Regex;
use tracing::{error, warn};

use crate::domain::Coordinates;

/// Parses an inline coordinate pair in either of the two source shapes:
/// a decimal pair `"42.135887,-8.788971"` or a degree-minute pair
/// `"43° 18.856', -8° 17.165'"`. Invalid values become `None`, never an
/// aborted extraction.
pub fn parse_text_pair(raw: &str) -> Option<Coordinates> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 2 {
        warn!(coordinates = raw, "invalid coordinate pair, expected lat,lon");
        return None;
    }

    let latitude = convert_component(parts[0].trim())?;
    let longitude = convert_component(parts[1].trim())?;
    validate_pair(latitude, longitude)
}

/// Range-checks a pair and rounds it to 6 decimals (~10 cm precision).
pub fn validate_pair(latitude: f64, longitude: f64) -> Option<Coordinates> {
    if !(-90.0..=90.0).contains(&latitude) {
        warn!(latitude, "latitude outside [-90, 90], discarding pair");
        if latitude.abs() > 100.0 {
            // 412.135887 is a truncated 42.135887, not a real position
            error!(
                latitude,
                "impossible latitude, probable missing-digit error in source file"
            );
        }
        return None;
    }
    if !(-180.0..=180.0).contains(&longitude) {
        warn!(longitude, "longitude outside [-180, 180], discarding pair");
        return None;
    }

    Some(Coordinates {
        latitude: round6(latitude),
        longitude: round6(longitude),
    })
}

/// Undoes fixed-point integer encoding: 41608439 means 41.608439.
///
/// Detected by magnitude, not syntax; plain decimal degrees never reach a
/// million.
pub fn rescale_fixed_point(value: f64) -> f64 {
    if value.abs() > 1_000_000.0 {
        value / 1_000_000.0
    } else {
        value
    }
}

pub fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Converts one coordinate component, degree-minute or plain decimal.
fn convert_component(raw: &str) -> Option<f64> {
    static GLYPHS: OnceLock<Regex> = OnceLock::new();
    static NON_NUMERIC: OnceLock<Regex> = OnceLock::new();

    let has_dm_glyphs = raw.contains('°') || raw.contains('\'');
    if !has_dm_glyphs {
        return match raw.parse::<f64>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(component = raw, error = %e, "unparseable decimal coordinate");
                None
            }
        };
    }

    let glyphs = GLYPHS.get_or_init(|| Regex::new(r#"[°'"]"#).unwrap());
    let stripped = glyphs.replace_all(raw, "");
    let parts: Vec<&str> = stripped.split_whitespace().collect();

    if parts.len() != 2 {
        warn!(component = raw, "invalid degree-minute shape, retrying as decimal");
        let non_numeric = NON_NUMERIC.get_or_init(|| Regex::new(r"[^0-9.\-]").unwrap());
        return non_numeric.replace_all(&stripped, "").parse::<f64>().ok();
    }

    let degrees = parts[0].parse::<f64>().ok()?;
    let minutes = parts[1].parse::<f64>().ok()?;

    // The minute contribution takes the sign of the degrees:
    // -8° 17.165' is -8 - 17.165/60, not -8 + 17.165/60
    if degrees >= 0.0 {
        Some(degrees + minutes / 60.0)
    } else {
        Some(degrees - minutes / 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_degree_minute_pair() {
        let coords = parse_text_pair("43° 18.856', -8° 17.165'").unwrap();
        assert_eq!(coords.latitude, 43.314267);
        assert_eq!(coords.longitude, -8.286083);
    }

    #[test]
    fn decimal_pair_round_trips_exactly() {
        let coords = parse_text_pair("42.135887,-8.788971").unwrap();
        assert_eq!(coords.latitude, 42.135887);
        assert_eq!(coords.longitude, -8.788971);
    }

    #[test]
    fn truncated_digit_latitude_is_rejected() {
        assert!(parse_text_pair("412.135887,-8.788971").is_none());
    }

    #[test]
    fn out_of_range_longitude_is_rejected() {
        assert!(parse_text_pair("42.1,-188.7").is_none());
    }

    #[test]
    fn malformed_input_is_rejected_quietly() {
        assert!(parse_text_pair("").is_none());
        assert!(parse_text_pair("not a coordinate").is_none());
        assert!(parse_text_pair("1,2,3").is_none());
    }

    #[test]
    fn rescales_fixed_point_integers_only() {
        assert_eq!(rescale_fixed_point(41_608_439.0), 41.608439);
        assert_eq!(rescale_fixed_point(2_287_860.0), 2.28786);
        assert_eq!(rescale_fixed_point(41.608439), 41.608439);
        assert_eq!(rescale_fixed_point(-8_286_083.0), -8.286083);
    }

    #[test]
    fn rounds_to_six_decimals() {
        assert_eq!(round6(43.314266666667), 43.314267);
    }
}
