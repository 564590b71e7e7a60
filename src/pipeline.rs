use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::adapter;
use crate::config::Config;
use crate::domain::Region;
use crate::error::{IntegrationError, Result};
use crate::extract;
use crate::geocode::Geocoder;
use crate::resolve;
use crate::storage::Storage;
use crate::validate;

/// Result of one source file's integration run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub region: Region,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub provinces_saved: usize,
    pub localities_saved: usize,
    pub localities_dropped: usize,
    pub stations_saved: usize,
    pub stations_rejected: usize,
    pub stations_unlinked: usize,
    pub station_save_failures: usize,
}

/// Sequential composition: adapt, extract, resolve, validate, persist.
///
/// Each region's run is independent; a failure in one never corrupts state
/// already handed off for another.
pub struct IntegrationPipeline {
    storage: Arc<dyn Storage>,
    geocoder: Arc<dyn Geocoder>,
    config: Config,
}

impl IntegrationPipeline {
    pub fn new(storage: Arc<dyn Storage>, geocoder: Arc<dyn Geocoder>, config: Config) -> Self {
        Self {
            storage,
            geocoder,
            config,
        }
    }

    /// Integrates one region's registry file end to end.
    pub async fn run(&self, region: Region) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("integration_run", %region, %run_id);
        let _enter = span.enter();

        let path_str = self.config.source_path(region).to_string();
        let path = Path::new(&path_str);
        if !path.exists() {
            return Err(IntegrationError::Format(format!(
                "source file not found: {}",
                path.display()
            )));
        }

        let file_adapter = adapter::adapter_for_path(path)?;
        info!(
            file = %path.display(),
            format = file_adapter.source_format(),
            "starting integration"
        );

        let bytes = std::fs::read(path)?;
        let records = file_adapter.adapt(&bytes)?;
        info!(records = records.len(), "source adapted to canonical records");

        let extractor = extract::extractor_for(region, records);

        // Phase 1: provinces and localities must be fully resolved and
        // persisted before any station can be linked
        let resolved = resolve::resolve_entities(
            extractor.provinces(),
            extractor.localities(),
            self.storage.as_ref(),
        )
        .await?;
        let localities_dropped = resolved.dropped.len();

        let provinces_saved = self.save_provinces(&resolved.provinces).await?;
        let (locality_codes, localities_saved) =
            self.save_localities(&resolved.localities).await?;

        // Phase 2: extract stations and link them through the code map
        let mut stations = extractor.stations(self.geocoder.as_ref()).await;
        info!(stations = stations.len(), "stations extracted");

        let stations_unlinked =
            resolve::link_stations(&mut stations, &extractor.link_map(), &locality_codes);

        let (stations_saved, stations_rejected, station_save_failures) =
            self.save_stations(stations).await;

        let summary = RunSummary {
            run_id,
            region,
            started_at,
            finished_at: Utc::now(),
            provinces_saved,
            localities_saved,
            localities_dropped,
            stations_saved,
            stations_rejected,
            stations_unlinked,
            station_save_failures,
        };
        info!(
            provinces = summary.provinces_saved,
            localities = summary.localities_saved,
            stations = summary.stations_saved,
            rejected = summary.stations_rejected,
            "integration completed"
        );
        Ok(summary)
    }

    /// Integrates all regions sequentially. One region's failure is
    /// reported but does not stop the remaining runs.
    pub async fn run_all(&self) -> Vec<(Region, Result<RunSummary>)> {
        let mut results = Vec::new();
        for region in Region::ALL {
            let result = self.run(region).await;
            if let Err(e) = &result {
                error!(%region, error = %e, "integration run failed");
            }
            results.push((region, result));
        }
        results
    }

    async fn save_provinces(&self, provinces: &[crate::domain::Province]) -> Result<usize> {
        let mut saved = 0usize;
        for province in provinces {
            if self.storage.province_exists(province.code).await? {
                debug!(code = province.code, name = %province.name, "province already exists, skipping");
                continue;
            }
            self.storage.save_province(province).await?;
            saved += 1;
        }
        Ok(saved)
    }

    /// Persists localities and collects the authoritative name -> code map
    /// used for station linking.
    async fn save_localities(
        &self,
        localities: &[extract::CandidateLocality],
    ) -> Result<(HashMap<String, i64>, usize)> {
        let mut codes = HashMap::new();
        let mut saved = 0usize;

        for locality in localities {
            // The resolver only hands over candidates with a resolvable code
            let Some(province_code) = locality.province_code else {
                continue;
            };

            let code = match self
                .storage
                .find_locality(&locality.name, province_code)
                .await?
            {
                Some(existing) => {
                    debug!(name = %locality.name, code = ?existing.code, "locality already exists");
                    match existing.code {
                        Some(code) => code,
                        None => continue,
                    }
                }
                None => {
                    saved += 1;
                    self.storage
                        .save_locality(&locality.name, province_code)
                        .await?
                }
            };
            codes.insert(locality.name.clone(), code);
        }

        Ok((codes, saved))
    }

    /// Validates and persists stations, tolerating individual failures.
    async fn save_stations(
        &self,
        stations: Vec<crate::domain::Station>,
    ) -> (usize, usize, usize) {
        let mut saved = 0usize;
        let mut rejected = 0usize;
        let mut failures = 0usize;

        for mut station in stations {
            let mut violations = validate::validate(&station);

            if self.config.validation.autocorrect_out_of_range
                && validate::apply_corrections(&mut station, &violations)
            {
                violations = validate::validate(&station);
            }

            if !violations.is_empty() {
                warn!("{}", validate::render_report(&station, &violations));
                rejected += 1;
                continue;
            }

            match self.storage.save_station(&station).await {
                Ok(()) => saved += 1,
                Err(e) => {
                    failures += 1;
                    error!(station = %station.name, error = %e, "failed to save station");
                }
            }
        }

        (saved, rejected, failures)
    }
}
