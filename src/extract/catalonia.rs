use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use super::{
    coords, field_f64, field_i64, field_str, province_from_postal, CandidateLocality, LinkMap,
    RegionExtractor,
};
use crate::adapter::Record;
use crate::domain::{Province, Region, Station, StationKind};
use crate::geocode::Geocoder;

/// Extractor for the Catalan registry (flattened markup export).
///
/// Provinces are inferred from postal prefixes; coordinates arrive as
/// fixed-point integers (41608439 means 41.608439).
pub struct CataloniaExtractor {
    records: Vec<Record>,
}

const STATION_NUMBER: &str = "estaci";
const DESIGNATION: &str = "denominaci";
const ADDRESS: &str = "adre_a";
const POSTAL_CODE: &str = "cp";
const MUNICIPALITY: &str = "municipi";
const LATITUDE: &str = "lat";
const LONGITUDE: &str = "long";
const TERRITORIAL_SERVICES: &str = "serveis_territorials";
const SCHEDULE: &str = "horari_de_servei";
const EMAIL: &str = "correu_electr_nic";
const WEBSITE: &str = "web";

impl CataloniaExtractor {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    fn province_code(record: &Record) -> Option<u8> {
        field_i64(record, POSTAL_CODE).and_then(province_from_postal)
    }

    fn station_name(record: &Record, index: usize) -> String {
        if let Some(designation) = field_str(record, DESIGNATION) {
            return format!("Estación ITV de {}", designation);
        }
        if let Some(municipality) = field_str(record, MUNICIPALITY) {
            return format!("Estación ITV de {}", municipality);
        }
        match field_str(record, STATION_NUMBER) {
            Some(number) => format!("Estación ITV {}", number),
            None => format!("Estación ITV {}", index + 1),
        }
    }

    fn coordinates(record: &Record) -> Option<crate::domain::Coordinates> {
        let latitude = field_f64(record, LATITUDE)?;
        let longitude = field_f64(record, LONGITUDE)?;
        coords::validate_pair(
            coords::rescale_fixed_point(latitude),
            coords::rescale_fixed_point(longitude),
        )
    }

    fn website(record: &Record) -> Option<String> {
        field_str(record, WEBSITE)
            .filter(|web| web.starts_with("http"))
            .map(str::to_string)
    }
}

#[async_trait]
impl RegionExtractor for CataloniaExtractor {
    fn region(&self) -> Region {
        Region::Catalonia
    }

    fn provinces(&self) -> Vec<Province> {
        let mut seen: HashMap<u8, String> = HashMap::new();
        let mut provinces = Vec::new();

        for record in &self.records {
            let Some(code) = Self::province_code(record) else {
                continue;
            };
            if seen.contains_key(&code) {
                continue;
            }

            let name = field_str(record, TERRITORIAL_SERVICES)
                .unwrap_or("Desconocida")
                .to_string();
            debug!(code, name, "province detected");
            seen.insert(code, name.clone());
            provinces.push(Province { code, name });
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
                province_code: Self::province_code(record),
            });
        }

        localities
    }

    async fn stations(&self, _geocoder: &dyn Geocoder) -> Vec<Station> {
        let mut stations = Vec::new();

        for (index, record) in self.records.iter().enumerate() {
            let name = Self::station_name(record, index);
            let coordinates = Self::coordinates(record);

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
                url: Self::website(record),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::DisabledGeocoder;
    use serde_json::json;

    fn record(fields: &[(&str, &str)]) -> Record {
        let mut record = Record::new();
        for (key, value) in fields {
            record.insert(key.to_string(), json!(value));
        }
        record
    }

    fn sample_records() -> Vec<Record> {
        vec![
            record(&[
                (STATION_NUMBER, "4201"),
                (DESIGNATION, "Granollers"),
                (ADDRESS, "C. Severo Ochoa 12"),
                (POSTAL_CODE, "08402"),
                (MUNICIPALITY, "Granollers"),
                (LATITUDE, "41608439"),
                (LONGITUDE, "2287860"),
                (TERRITORIAL_SERVICES, "Barcelona"),
                (EMAIL, "granollers@applus.com"),
                (WEBSITE, "http://www.appluscat.com/"),
            ]),
            record(&[
                (STATION_NUMBER, "4302"),
                (DESIGNATION, "Reus"),
                (POSTAL_CODE, "43204"),
                (MUNICIPALITY, "Reus"),
                (LATITUDE, "41.154539"),
                (LONGITUDE, "1.120954"),
                (TERRITORIAL_SERVICES, "Tarragona"),
                (WEBSITE, "www.sense-protocol.example"),
            ]),
        ]
    }

    #[test]
    fn provinces_come_from_postal_prefixes() {
        let provinces = CataloniaExtractor::new(sample_records()).provinces();
        assert_eq!(provinces.len(), 2);
        assert_eq!(provinces[0], Province { code: 8, name: "Barcelona".to_string() });
        assert_eq!(provinces[1].code, 43);
    }

    #[test]
    fn missing_territorial_services_falls_back_to_placeholder() {
        let records = vec![record(&[(POSTAL_CODE, "17001"), (MUNICIPALITY, "Girona")])];
        let provinces = CataloniaExtractor::new(records).provinces();
        assert_eq!(provinces[0].name, "Desconocida");
    }

    #[tokio::test]
    async fn fixed_point_coordinates_are_rescaled() {
        let stations = CataloniaExtractor::new(sample_records())
            .stations(&DisabledGeocoder)
            .await;
        assert_eq!(stations[0].latitude, Some(41.608439));
        assert_eq!(stations[0].longitude, Some(2.28786));
        // Plain decimals pass through untouched
        assert_eq!(stations[1].latitude, Some(41.154539));
    }

    #[tokio::test]
    async fn website_requires_a_protocol() {
        let stations = CataloniaExtractor::new(sample_records())
            .stations(&DisabledGeocoder)
            .await;
        assert_eq!(stations[0].url.as_deref(), Some("http://www.appluscat.com/"));
        assert_eq!(stations[1].url, None);
    }

    #[test]
    fn localities_are_distinct_by_municipality() {
        let mut records = sample_records();
        records.push(record(&[(MUNICIPALITY, "Reus"), (POSTAL_CODE, "43205")]));
        let localities = CataloniaExtractor::new(records).localities();
        assert_eq!(localities.len(), 2);
    }
}
