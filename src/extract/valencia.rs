use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{field_i64, field_str, CandidateLocality, LinkMap, RegionExtractor};
use crate::adapter::Record;
use crate::domain::{Province, Region, Station, StationKind};
use crate::geocode::{self, Geocoder};

/// Extractor for the Valencian registry (structured export).
///
/// The only region whose file carries no coordinates at all: every fixed
/// station goes through the geocoding strategy. Province names in the source
/// contain hand-typed variants that must collapse before deduplication.
pub struct ValenciaExtractor {
    records: Vec<Record>,
}

const STATION_KIND: &str = "TIPO ESTACIÓN";
const PROVINCE: &str = "PROVINCIA";
const MUNICIPALITY: &str = "MUNICIPIO";
const POSTAL_CODE: &str = "C.POSTAL";
const ADDRESS: &str = "DIRECCIÓN";
const STATION_NUMBER: &str = "Nº ESTACIÓN";
const SCHEDULE: &str = "HORARIOS";
const EMAIL: &str = "CORREO";

const OPERATOR_URL: &str = "https://www.sitval.com";

impl ValenciaExtractor {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Collapses the typo and diacritic variants observed in the source to
    /// one canonical province name. Idempotent on canonical names.
    pub fn normalize_province_name(name: &str) -> String {
        let trimmed = name.trim();
        let lowered = trimmed.to_lowercase();

        match lowered.as_str() {
            "aligante" | "aliacnte" | "alicante" => "Alicante".to_string(),
            "valéncia" | "valència" | "valencia" => "Valencia".to_string(),
            "castelló" | "castellon" | "castellón" => "Castellón".to_string(),
            _ => trimmed.to_string(),
        }
    }

    fn province_code(canonical_name: &str) -> Option<u8> {
        match canonical_name {
            "Alicante" => Some(3),
            "Castellón" => Some(12),
            "Valencia" => Some(46),
            _ => None,
        }
    }

    fn record_province_code(record: &Record) -> Option<u8> {
        let name = field_str(record, PROVINCE)?;
        let canonical = Self::normalize_province_name(name);
        let code = Self::province_code(&canonical);
        if code.is_none() {
            warn!(province = name, "unknown Valencian province, excluding");
        }
        code
    }

    fn station_name(record: &Record, index: usize) -> String {
        if let Some(municipality) = field_str(record, MUNICIPALITY) {
            return format!("Estación ITV de {}", municipality);
        }
        match field_str(record, STATION_NUMBER) {
            Some(number) => format!("Estación ITV {}", number),
            None => format!("Estación ITV {}", index + 1),
        }
    }
}

#[async_trait]
impl RegionExtractor for ValenciaExtractor {
    fn region(&self) -> Region {
        Region::Valencia
    }

    fn provinces(&self) -> Vec<Province> {
        let mut seen: HashMap<u8, String> = HashMap::new();
        let mut provinces = Vec::new();

        for record in &self.records {
            let Some(raw_name) = field_str(record, PROVINCE) else {
                continue;
            };
            let canonical = Self::normalize_province_name(raw_name);
            let Some(code) = Self::province_code(&canonical) else {
                warn!(province = raw_name, "unknown Valencian province, excluding");
                continue;
            };
            if seen.contains_key(&code) {
                continue;
            }
            debug!(code, name = canonical, "province detected");
            seen.insert(code, canonical.clone());
            provinces.push(Province {
                code,
                name: canonical,
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
                province_code: Self::record_province_code(record),
            });
        }

        localities
    }

    async fn stations(&self, geocoder: &dyn Geocoder) -> Vec<Station> {
        let mut stations = Vec::new();
        let mut with_coordinates = 0usize;

        info!(
            total = self.records.len(),
            "geocoding Valencian stations, this can take a few minutes"
        );

        for (index, record) in self.records.iter().enumerate() {
            let address = field_str(record, ADDRESS);
            let municipality = field_str(record, MUNICIPALITY);
            let province = field_str(record, PROVINCE).map(Self::normalize_province_name);

            let coordinates =
                geocode::resolve_coordinates(geocoder, address, municipality, province.as_deref())
                    .await;
            if coordinates.is_some() {
                with_coordinates += 1;
            }

            let name = Self::station_name(record, index);
            stations.push(Station {
                description: Some(format!("Descripción provisional de {}", name)),
                name,
                kind: StationKind::classify(field_str(record, STATION_KIND)),
                address: address.map(str::to_string),
                postal_code: field_i64(record, POSTAL_CODE),
                longitude: coordinates.map(|c| c.longitude),
                latitude: coordinates.map(|c| c.latitude),
                schedule: field_str(record, SCHEDULE).map(str::to_string),
                contact: field_str(record, EMAIL).map(str::to_string),
                url: Some(OPERATOR_URL.to_string()),
                locality_code: None,
            });

            if (index + 1) % 10 == 0 {
                info!(
                    processed = index + 1,
                    total = self.records.len(),
                    with_coordinates,
                    "geocoding progress"
                );
            }
        }

        info!(
            with_coordinates,
            total = stations.len(),
            "geocoding completed"
        );
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
