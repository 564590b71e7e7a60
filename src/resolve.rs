use std::collections::HashMap;
use std::fmt;

use tracing::{debug, error, warn};

use crate::domain::{Province, Station};
use crate::error::Result;
use crate::extract::{CandidateLocality, LinkMap};
use crate::storage::Storage;

/// A locality that referenced a province nobody resolved; the locality is
/// dropped, the run continues.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedReference {
    pub locality: String,
    pub province_code: Option<u8>,
}

impl fmt::Display for UnresolvedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.province_code {
            Some(code) => write!(
                f,
                "locality '{}' references missing province code {}",
                self.locality, code
            ),
            None => write!(
                f,
                "locality '{}' has no resolvable province code",
                self.locality
            ),
        }
    }
}

/// Output of the province/locality resolution phase.
///
/// Localities keep their run-local `(name, province_code)` identity here;
/// integer codes are assigned by the persistence boundary, never invented
/// in-memory.
#[derive(Debug)]
pub struct ResolvedEntities {
    pub provinces: Vec<Province>,
    pub localities: Vec<CandidateLocality>,
    pub dropped: Vec<UnresolvedReference>,
}

/// Phase 1: merge provinces by code and validate every locality's province
/// reference against the merged set plus already-persisted provinces.
///
/// Surviving localities are deduplicated by `(name, province_code)`. Must
/// complete before station linking; the name -> code map only exists once
/// every surviving locality has been persisted.
pub async fn resolve_entities(
    provinces: Vec<Province>,
    candidates: Vec<CandidateLocality>,
    storage: &dyn Storage,
) -> Result<ResolvedEntities> {
    // First-seen name wins on duplicate codes
    let mut merged: Vec<Province> = Vec::new();
    for province in provinces {
        if merged.iter().any(|p| p.code == province.code) {
            debug!(code = province.code, name = %province.name, "duplicate province code, first name wins");
            continue;
        }
        merged.push(province);
    }

    let mut localities: Vec<CandidateLocality> = Vec::new();
    let mut dropped: Vec<UnresolvedReference> = Vec::new();

    for candidate in candidates {
        let resolvable = match candidate.province_code {
            Some(code) => {
                merged.iter().any(|p| p.code == code) || storage.province_exists(code).await?
            }
            None => false,
        };

        if !resolvable {
            let available: Vec<String> = merged
                .iter()
                .map(|p| format!("{}={}", p.code, p.name))
                .collect();
            error!(
                locality = %candidate.name,
                province_code = ?candidate.province_code,
                available = %available.join(", "),
                "dropping locality with unresolvable province reference"
            );
            dropped.push(UnresolvedReference {
                locality: candidate.name,
                province_code: candidate.province_code,
            });
            continue;
        }

        let duplicate = localities
            .iter()
            .any(|l| l.name == candidate.name && l.province_code == candidate.province_code);
        if !duplicate {
            localities.push(candidate);
        }
    }

    Ok(ResolvedEntities {
        provinces: merged,
        localities,
        dropped,
    })
}

/// Phase 2: assign locality codes to stations through the link map.
///
/// A station whose municipality never got a code keeps a null link and a
/// logged warning; rejection (for fixed stations) is the validator's job.
/// Returns the number of stations left unlinked.
pub fn link_stations(
    stations: &mut [Station],
    link_map: &LinkMap,
    locality_codes: &HashMap<String, i64>,
) -> usize {
    let mut unlinked = 0usize;

    for (index, station) in stations.iter_mut().enumerate() {
        let Some(locality_name) = link_map.get(&index) else {
            unlinked += 1;
            continue;
        };

        match locality_codes.get(locality_name) {
            Some(code) => {
                station.locality_code = Some(*code);
                debug!(
                    station = %station.name,
                    locality = %locality_name,
                    code,
                    "station linked to locality"
                );
            }
            None => {
                unlinked += 1;
                warn!(
                    station = %station.name,
                    locality = %locality_name,
                    "could not link station to a locality"
                );
            }
        }
    }

    unlinked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StationKind;
    use crate::storage::InMemoryStorage;

    fn province(code: u8, name: &str) -> Province {
        Province {
            code,
            name: name.to_string(),
        }
    }

    fn candidate(name: &str, province_code: Option<u8>) -> CandidateLocality {
        CandidateLocality {
            name: name.to_string(),
            province_code,
        }
    }

    fn station(name: &str) -> Station {
        Station {
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
        }
    }

    #[tokio::test]
    async fn duplicate_province_codes_keep_the_first_name() {
        let storage = InMemoryStorage::new();
        let resolved = resolve_entities(
            vec![province(15, "A Coruña"), province(15, "La Coruña")],
            vec![],
            &storage,
        )
        .await
        .unwrap();

        assert_eq!(resolved.provinces.len(), 1);
        assert_eq!(resolved.provinces[0].name, "A Coruña");
    }

    #[tokio::test]
    async fn localities_deduplicate_by_name_and_province() {
        let storage = InMemoryStorage::new();
        let resolved = resolve_entities(
            vec![province(36, "Pontevedra"), province(15, "A Coruña")],
            vec![
                candidate("Vigo", Some(36)),
                candidate("Vigo", Some(36)),
                candidate("Vigo", Some(15)),
            ],
            &storage,
        )
        .await
        .unwrap();

        // Same name under two provinces is two localities
        assert_eq!(resolved.localities.len(), 2);
        assert!(resolved.dropped.is_empty());
    }

    #[tokio::test]
    async fn unresolved_province_drops_the_locality_with_one_error() {
        let storage = InMemoryStorage::new();
        let resolved = resolve_entities(
            vec![province(36, "Pontevedra")],
            vec![candidate("Vigo", Some(36)), candidate("Alcañiz", Some(44))],
            &storage,
        )
        .await
        .unwrap();

        assert_eq!(resolved.localities.len(), 1);
        assert_eq!(resolved.dropped.len(), 1);
        assert_eq!(resolved.dropped[0].province_code, Some(44));
    }

    #[tokio::test]
    async fn persisted_provinces_also_resolve_references() {
        let storage = InMemoryStorage::new();
        use crate::storage::Storage as _;
        storage
            .save_province(&province(28, "Madrid"))
            .await
            .unwrap();

        let resolved = resolve_entities(vec![], vec![candidate("Getafe", Some(28))], &storage)
            .await
            .unwrap();
        assert_eq!(resolved.localities.len(), 1);
    }

    #[test]
    fn linking_sets_codes_and_counts_misses() {
        let mut stations = vec![station("ITV Vigo"), station("ITV Lugo"), station("ITV ???")];
        let mut link_map = LinkMap::new();
        link_map.insert(0, "Vigo".to_string());
        link_map.insert(1, "Lugo".to_string());
        // index 2 has no municipality at all

        let mut codes = HashMap::new();
        codes.insert("Vigo".to_string(), 7i64);

        let unlinked = link_stations(&mut stations, &link_map, &codes);

        assert_eq!(stations[0].locality_code, Some(7));
        assert_eq!(stations[1].locality_code, None);
        assert_eq!(stations[2].locality_code, None);
        assert_eq!(unlinked, 2);
    }
}
