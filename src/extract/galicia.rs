use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use super::{coords, field_i64, field_str, CandidateLocality, LinkMap, RegionExtractor};
use crate::adapter::Record;
use crate::domain::{fold_diacritics, Province, Region, Station, StationKind};
use crate::geocode::Geocoder;

/// Extractor for the Galician registry (semicolon-delimited export).
///
/// Coordinates ship inline in a "gmaps" text column mixing decimal and
/// degree-minute notation; provinces come from a fixed name table.
pub struct GaliciaExtractor {
    records: Vec<Record>,
}

const NAME: &str = "NOME DA ESTACIÓN";
const ADDRESS: &str = "ENDEREZO";
const MUNICIPALITY: &str = "CONCELLO";
const POSTAL_CODE: &str = "CÓDIGO POSTAL";
const PROVINCE: &str = "PROVINCIA";
const SCHEDULE: &str = "HORARIO";
const BOOKING: &str = "SOLICITUDE DE CITA PREVIA";
const EMAIL: &str = "CORREO ELECTRÓNICO";
const COORDINATES: &str = "COORDENADAS GMAPS";

/// The four Galician province codes; postal prefixes outside this set are
/// data errors in this registry.
const GALICIAN_PROVINCES: [u8; 4] = [15, 27, 32, 36];

impl GaliciaExtractor {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Maps a province name to its official code, tolerating the spelling
    /// variants seen in the source (Ourense/Orense, missing diacritics).
    fn province_code_from_name(name: &str) -> Option<u8> {
        let folded = fold_diacritics(&name.to_lowercase());
        if folded.contains("coruna") {
            Some(15)
        } else if folded.contains("lugo") {
            Some(27)
        } else if folded.contains("ourense") || folded.contains("orense") {
            Some(32)
        } else if folded.contains("pontevedra") {
            Some(36)
        } else {
            None
        }
    }

    fn galician_province_from_postal(record: &Record) -> Option<u8> {
        let postal = field_i64(record, POSTAL_CODE)?;
        let code = super::province_from_postal(postal)?;
        if GALICIAN_PROVINCES.contains(&code) {
            Some(code)
        } else {
            warn!(postal, "postal code outside Galicia");
            None
        }
    }

    fn station_name(record: &Record, index: usize) -> String {
        if let Some(name) = field_str(record, NAME) {
            return name.to_string();
        }
        if let Some(municipality) = field_str(record, MUNICIPALITY) {
            return format!("Estación ITV de {}", municipality);
        }
        format!("Estación ITV {}", index + 1)
    }

    /// Booking links arrive with tracking query strings attached; keep the
    /// bare URL. Non-URL text (phone instructions) passes through.
    fn booking_url(record: &Record) -> Option<String> {
        let raw = field_str(record, BOOKING)?;
        if raw.starts_with("http") {
            Some(raw.split('?').next().unwrap_or(raw).to_string())
        } else {
            Some(raw.to_string())
        }
    }
}

#[async_trait]
impl RegionExtractor for GaliciaExtractor {
    fn region(&self) -> Region {
        Region::Galicia
    }

    fn provinces(&self) -> Vec<Province> {
        let mut seen: HashMap<u8, String> = HashMap::new();
        let mut provinces = Vec::new();

        for record in &self.records {
            let Some(name) = field_str(record, PROVINCE) else {
                continue;
            };
            let Some(code) = Self::province_code_from_name(name) else {
                error!(province = name, "unrecognized Galician province");
                continue;
            };
            if seen.contains_key(&code) {
                continue;
            }
            seen.insert(code, name.to_string());
            debug!(code, name, "province detected");
            provinces.push(Province {
                code,
                name: name.to_string(),
            });
        }

        provinces
    }

    fn localities(&self) -> Vec<CandidateLocality> {
        let mut seen: Vec<String> = Vec::new();
        let mut localities = Vec::new();

        for record in &self.records {
            let Some(municipality) = field_str(record, MUNICIPALITY) else {
                continue;
            };
            if seen.iter().any(|s| s == municipality) {
                continue;
            }
            seen.push(municipality.to_string());
            localities.push(CandidateLocality {
                name: municipality.to_string(),
                province_code: Self::galician_province_from_postal(record),
            });
        }

        localities
    }

    async fn stations(&self, _geocoder: &dyn Geocoder) -> Vec<Station> {
        let mut stations = Vec::new();

        for (index, record) in self.records.iter().enumerate() {
            let name = Self::station_name(record, index);
            let coordinates = field_str(record, COORDINATES).and_then(coords::parse_text_pair);

            stations.push(Station {
                description: Some(format!("Descripción provisional de {}", name)),
                name,
                kind: StationKind::Fixed,
                address: field_str(record, ADDRESS).map(str::to_string),
                postal_code: field_i64(record, POSTAL_CODE),
                longitude: coordinates.map(|c| c.longitude),
                latitude: coordinates.map(|c| c.latitude),
                schedule: field_str(record, SCHEDULE).map(str::to_string),
                contact: field_str(record, EMAIL).map(str::to_string),
                url: Self::booking_url(record),
                locality_code: None,
            });
        }

        stations
    }

    fn link_map(&self) -> LinkMap {
        let mut map = LinkMap::new();
        for (index, record) in self.records.iter().enumerate() {
            if let Some(municipality) = field_str(record, MUNICIPALITY) {
                map.insert(index, municipality.to_string());
            }
        }
        map
    }
}
