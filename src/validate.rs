use std::fmt::Write as _;

use thiserror::Error;
use tracing::warn;

use crate::domain::{Station, StationKind};
use crate::extract::province_from_postal;

/// A mandatory-field or range failure. All rules are evaluated
/// independently; violations accumulate rather than short-circuit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("coordinates are mandatory (lat: {latitude:?}, lon: {longitude:?})")]
    MissingCoordinates {
        latitude: Option<f64>,
        longitude: Option<f64>,
    },
    #[error("coordinates outside the global range (lat={latitude:.6}, lon={longitude:.6})")]
    CoordinatesOutOfRange { latitude: f64, longitude: f64 },
    #[error("postal code is mandatory")]
    MissingPostalCode,
    #[error("invalid postal code {0} (must be 5 digits between 01000 and 52999)")]
    InvalidPostalCode(i64),
    #[error("contact is mandatory")]
    MissingContact,
    #[error("fixed station is not linked to any locality")]
    MissingLocalityLink,
    #[error("station name is empty")]
    MissingName,
}

/// Valencian province postal prefixes: Alicante, Castellón, Valencia.
const VALENCIAN_PREFIXES: [u8; 3] = [3, 12, 46];

const VALENCIAN_EMAIL_DOMAIN: &str = "@sitval.com";

/// Validates a station against the mandatory-field and range rules.
/// Pure: the station is never mutated here.
pub fn validate(station: &Station) -> Vec<Violation> {
    let mut violations = Vec::new();
    let exempt = is_regional_mobile_exception(station);

    // 1. Coordinates, mandatory unless the regional exception applies
    match (station.latitude, station.longitude) {
        (Some(latitude), Some(longitude)) => {
            if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                violations.push(Violation::CoordinatesOutOfRange {
                    latitude,
                    longitude,
                });
            } else {
                warn_if_outside_spain(station, latitude, longitude);
            }
        }
        (latitude, longitude) => {
            if !exempt {
                violations.push(Violation::MissingCoordinates {
                    latitude,
                    longitude,
                });
            }
        }
    }

    // 2. Postal code, mandatory unless exempt; format-checked when present
    match station.postal_code {
        Some(postal_code) => {
            if !is_valid_postal_code(postal_code) {
                violations.push(Violation::InvalidPostalCode(postal_code));
            }
        }
        None => {
            if !exempt {
                violations.push(Violation::MissingPostalCode);
            }
        }
    }

    // 3. Contact, mandatory unless exempt
    let has_contact = station
        .contact
        .as_deref()
        .is_some_and(|c| !c.trim().is_empty());
    if !has_contact && !exempt {
        violations.push(Violation::MissingContact);
    }

    // 4. Locality linkage, mandatory only for fixed stations
    if station.locality_code.is_none() && station.kind == StationKind::Fixed {
        violations.push(Violation::MissingLocalityLink);
    }

    // 5. Name, always mandatory
    if station.name.trim().is_empty() {
        violations.push(Violation::MissingName);
    }

    violations
}

/// The single allowed relaxation of the mandatory-field rules: mobile and
/// other-type Valencian stations legitimately lack a fixed address.
///
/// Attribution is a heuristic pattern-matched against the observed dataset
/// (postal prefix, operator email domain, province names in free text);
/// the unit tests pin the literal cases.
pub fn is_regional_mobile_exception(station: &Station) -> bool {
    if station.kind != StationKind::Mobile && station.kind != StationKind::Other {
        return false;
    }

    if let Some(postal_code) = station.postal_code {
        if let Some(prefix) = province_from_postal(postal_code) {
            if VALENCIAN_PREFIXES.contains(&prefix) {
                return true;
            }
        }
    }

    if let Some(contact) = station.contact.as_deref() {
        if contact.contains(VALENCIAN_EMAIL_DOMAIN) {
            return true;
        }
    }

    let text = format!(
        "{} {}",
        station.address.as_deref().unwrap_or(""),
        station.name
    )
    .to_lowercase();
    text.contains("valencia")
        || text.contains("alicante")
        || text.contains("castellón")
        || text.contains("castellon")
}

/// Spanish postal codes are 5 digits: a 2-digit province prefix in 1..=52
/// and an overall value between 01000 and 52999.
pub fn is_valid_postal_code(postal_code: i64) -> bool {
    if !(1000..=52999).contains(&postal_code) {
        return false;
    }
    province_from_postal(postal_code).is_some()
}

/// Narrow auto-correction: nulls out coordinates flagged as outside the
/// global range. Never invents a value, never touches postal codes or
/// contacts; everything else stays reject-by-default.
pub fn apply_corrections(station: &mut Station, violations: &[Violation]) -> bool {
    let out_of_range = violations
        .iter()
        .any(|v| matches!(v, Violation::CoordinatesOutOfRange { .. }));
    if !out_of_range {
        return false;
    }

    warn!(
        station = %station.name,
        latitude = ?station.latitude,
        longitude = ?station.longitude,
        "nulling out-of-range coordinates"
    );
    station.latitude = None;
    station.longitude = None;
    true
}

/// Renders a human-readable rejection report for the operational log.
pub fn render_report(station: &Station, violations: &[Violation]) -> String {
    let mut report = String::new();
    let _ = writeln!(report, "rejected station: {}", station.name);
    let _ = writeln!(report, "  kind: {}", station.kind);
    let _ = writeln!(
        report,
        "  address: {}",
        station.address.as_deref().unwrap_or("-")
    );
    match station.postal_code {
        Some(cp) => {
            let _ = writeln!(report, "  postal code: {:05}", cp);
        }
        None => {
            let _ = writeln!(report, "  postal code: -");
        }
    }
    let _ = writeln!(
        report,
        "  coordinates: lat={:?}, lon={:?}",
        station.latitude, station.longitude
    );
    let _ = writeln!(
        report,
        "  contact: {}",
        station.contact.as_deref().unwrap_or("-")
    );
    let _ = writeln!(report, "  violations ({}):", violations.len());
    for (index, violation) in violations.iter().enumerate() {
        let _ = writeln!(report, "    {}. {}", index + 1, violation);
    }
    report
}

/// Mainland Spain plus the islands, with margin. Advisory only.
fn warn_if_outside_spain(station: &Station, latitude: f64, longitude: f64) {
    if !(27.0..=44.0).contains(&latitude) {
        warn!(station = %station.name, latitude, "latitude outside the typical Spanish range");
    }
    if !(-19.0..=5.0).contains(&longitude) {
        warn!(station = %station.name, longitude, "longitude outside the typical Spanish range");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_station(kind: StationKind) -> Station {
        Station {
            name: "Estación ITV de prueba".to_string(),
            kind,
            address: None,
            postal_code: None,
            longitude: None,
            latitude: None,
            description: None,
            schedule: None,
            contact: None,
            url: None,
            locality_code: None,
        }
    }

    fn complete_station() -> Station {
        Station {
            name: "Estación ITV de Vigo".to_string(),
            kind: StationKind::Fixed,
            address: Some("Avda. Alcalde Portanet 11".to_string()),
            postal_code: Some(36210),
            longitude: Some(-8.735),
            latitude: Some(42.221),
            description: None,
            schedule: None,
            contact: Some("vigo@sycitv.com".to_string()),
            url: None,
            locality_code: Some(1),
        }
    }

    #[test]
    fn complete_fixed_station_passes() {
        assert!(validate(&complete_station()).is_empty());
    }

    #[test]
    fn bare_fixed_station_collects_all_mandatory_violations() {
        let violations = validate(&bare_station(StationKind::Fixed));
        assert!(violations.len() >= 3);
        assert!(violations.contains(&Violation::MissingPostalCode));
        assert!(violations.contains(&Violation::MissingContact));
        assert!(violations.contains(&Violation::MissingLocalityLink));
    }

    #[test]
    fn valencian_mobile_station_is_exempt_from_mandatory_fields() {
        let mut station = bare_station(StationKind::Mobile);
        station.address = Some("Unidad móvil provincia de Valencia".to_string());
        assert!(validate(&station).is_empty());
    }

    #[test]
    fn exception_requires_mobile_or_other_kind() {
        let mut station = bare_station(StationKind::Fixed);
        station.address = Some("Polígono industrial, Valencia".to_string());
        assert!(!is_regional_mobile_exception(&station));
    }

    #[test]
    fn exception_detected_by_postal_prefix() {
        let mut station = bare_station(StationKind::Other);
        station.postal_code = Some(46460);
        assert!(is_regional_mobile_exception(&station));

        station.postal_code = Some(36210);
        assert!(!is_regional_mobile_exception(&station));
    }

    #[test]
    fn exception_detected_by_operator_email_domain() {
        let mut station = bare_station(StationKind::Mobile);
        station.contact = Some("itv4603@sitval.com".to_string());
        assert!(is_regional_mobile_exception(&station));
    }

    #[test]
    fn exception_detected_by_province_name_in_text() {
        let mut station = bare_station(StationKind::Mobile);
        station.name = "Unidad móvil de Castellón".to_string();
        assert!(is_regional_mobile_exception(&station));
    }

    #[test]
    fn postal_code_format_rules() {
        assert!(is_valid_postal_code(1000));
        assert!(is_valid_postal_code(36210));
        assert!(is_valid_postal_code(52999));
        assert!(!is_valid_postal_code(999));
        assert!(!is_valid_postal_code(53000));
        assert!(!is_valid_postal_code(-36210));
        assert!(!is_valid_postal_code(536210));
    }

    #[test]
    fn out_of_range_coordinates_are_a_violation_even_when_exempt() {
        let mut station = bare_station(StationKind::Mobile);
        station.contact = Some("itv@sitval.com".to_string());
        station.latitude = Some(412.135887);
        station.longitude = Some(-8.788971);

        let violations = validate(&station);
        assert_eq!(
            violations,
            vec![Violation::CoordinatesOutOfRange {
                latitude: 412.135887,
                longitude: -8.788971
            }]
        );
    }

    #[test]
    fn corrections_null_only_out_of_range_coordinates() {
        let mut station = complete_station();
        station.latitude = Some(412.135887);
        let violations = validate(&station);

        assert!(apply_corrections(&mut station, &violations));
        assert_eq!(station.latitude, None);
        assert_eq!(station.longitude, None);
        // Postal code and contact are untouched
        assert_eq!(station.postal_code, Some(36210));
        assert!(station.contact.is_some());
    }

    #[test]
    fn corrections_do_nothing_without_range_violations() {
        let mut station = bare_station(StationKind::Fixed);
        let violations = validate(&station);
        assert!(!apply_corrections(&mut station, &violations));
    }

    #[test]
    fn report_names_the_station_and_lists_violations() {
        let station = bare_station(StationKind::Fixed);
        let violations = validate(&station);
        let report = render_report(&station, &violations);
        assert!(report.contains("Estación ITV de prueba"));
        assert!(report.contains("violations"));
    }
}
