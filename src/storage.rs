use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{Locality, Province, Station};
use crate::error::Result;

/// Persistence boundary for resolved entities.
///
/// `save_locality` returns the authoritative locality code; the pipeline
/// never assigns integer codes itself.
#[async_trait]
pub trait Storage: Send + Sync {
    // Province operations
    async fn province_exists(&self, code: u8) -> Result<bool>;
    async fn save_province(&self, province: &Province) -> Result<()>;

    // Locality operations
    async fn find_locality(&self, name: &str, province_code: u8) -> Result<Option<Locality>>;
    async fn save_locality(&self, name: &str, province_code: u8) -> Result<i64>;

    // Station operations
    async fn save_station(&self, station: &Station) -> Result<()>;
}

/// In-memory storage implementation for development/testing.
pub struct InMemoryStorage {
    provinces: Arc<Mutex<HashMap<u8, Province>>>,
    localities: Arc<Mutex<HashMap<(String, u8), Locality>>>,
    stations: Arc<Mutex<Vec<Station>>>,
    next_locality_code: Arc<Mutex<i64>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            provinces: Arc::new(Mutex::new(HashMap::new())),
            localities: Arc::new(Mutex::new(HashMap::new())),
            stations: Arc::new(Mutex::new(Vec::new())),
            next_locality_code: Arc::new(Mutex::new(1)),
        }
    }

    pub fn provinces(&self) -> Vec<Province> {
        self.provinces.lock().unwrap().values().cloned().collect()
    }

    pub fn localities(&self) -> Vec<Locality> {
        self.localities.lock().unwrap().values().cloned().collect()
    }

    pub fn stations(&self) -> Vec<Station> {
        self.stations.lock().unwrap().clone()
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn province_exists(&self, code: u8) -> Result<bool> {
        Ok(self.provinces.lock().unwrap().contains_key(&code))
    }

    async fn save_province(&self, province: &Province) -> Result<()> {
        let mut provinces = self.provinces.lock().unwrap();
        provinces.entry(province.code).or_insert_with(|| {
            debug!(code = province.code, name = %province.name, "province saved");
            province.clone()
        });
        Ok(())
    }

    async fn find_locality(&self, name: &str, province_code: u8) -> Result<Option<Locality>> {
        let localities = self.localities.lock().unwrap();
        Ok(localities.get(&(name.to_string(), province_code)).cloned())
    }

    async fn save_locality(&self, name: &str, province_code: u8) -> Result<i64> {
        let mut localities = self.localities.lock().unwrap();
        let key = (name.to_string(), province_code);
        if let Some(existing) = localities.get(&key) {
            // save is idempotent on (name, province)
            return Ok(existing.code.unwrap_or_default());
        }

        let mut next_code = self.next_locality_code.lock().unwrap();
        let code = *next_code;
        *next_code += 1;

        localities.insert(
            key,
            Locality {
                code: Some(code),
                name: name.to_string(),
                province_code,
            },
        );
        debug!(name, province_code, code, "locality saved");
        Ok(code)
    }

    async fn save_station(&self, station: &Station) -> Result<()> {
        let mut stations = self.stations.lock().unwrap();
        stations.push(station.clone());
        debug!(name = %station.name, "station saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StationKind;

    #[tokio::test]
    async fn locality_codes_are_assigned_once_per_key() {
        let storage = InMemoryStorage::new();

        let vigo = storage.save_locality("Vigo", 36).await.unwrap();
        let lugo = storage.save_locality("Lugo", 27).await.unwrap();
        let vigo_again = storage.save_locality("Vigo", 36).await.unwrap();

        assert_eq!(vigo, vigo_again);
        assert_ne!(vigo, lugo);
    }

    #[tokio::test]
    async fn province_save_is_idempotent_by_code() {
        let storage = InMemoryStorage::new();
        let first = Province {
            code: 15,
            name: "A Coruña".to_string(),
        };
        let second = Province {
            code: 15,
            name: "La Coruña".to_string(),
        };

        storage.save_province(&first).await.unwrap();
        storage.save_province(&second).await.unwrap();

        assert!(storage.province_exists(15).await.unwrap());
        assert_eq!(storage.provinces()[0].name, "A Coruña");
    }

    #[tokio::test]
    async fn stations_accumulate_in_insertion_order() {
        let storage = InMemoryStorage::new();
        for name in ["a", "b"] {
            let station = Station {
                name: name.to_string(),
                kind: StationKind::Fixed,
                address: None,
                postal_code: None,
                longitude: None,
                latitude: None,
                description: None,
                schedule: None,
                contact: None,
                url: None,
                locality_code: None,
            };
            storage.save_station(&station).await.unwrap();
        }
        let names: Vec<String> = storage.stations().iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
