use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use itv_integrator::config::Config;
use itv_integrator::domain::Region;
use itv_integrator::geocode;
use itv_integrator::logging;
use itv_integrator::pipeline::{IntegrationPipeline, RunSummary};
use itv_integrator::storage::InMemoryStorage;

#[derive(Parser)]
#[command(name = "itv_integrator")]
#[command(about = "Integrates regional vehicle-inspection-station registries")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Integrate a single region's registry file
    Integrate {
        /// Region to integrate
        #[arg(value_enum)]
        region: CliRegion,
    },
    /// Integrate all configured regions sequentially
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliRegion {
    Galicia,
    Catalonia,
    Valencia,
}

impl From<CliRegion> for Region {
    fn from(region: CliRegion) -> Self {
        match region {
            CliRegion::Galicia => Region::Galicia,
            CliRegion::Catalonia => Region::Catalonia,
            CliRegion::Valencia => Region::Valencia,
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!("\n📊 Integration results for {}:", summary.region);
    println!("   Run id: {}", summary.run_id);
    println!("   Provinces saved: {}", summary.provinces_saved);
    println!(
        "   Localities saved: {} (dropped: {})",
        summary.localities_saved, summary.localities_dropped
    );
    println!(
        "   Stations saved: {} (rejected: {}, unlinked: {}, save failures: {})",
        summary.stations_saved,
        summary.stations_rejected,
        summary.stations_unlinked,
        summary.station_save_failures
    );
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_logging();

    let cli = Cli::parse();

    let config = match Config::load_from(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "could not load configuration");
            eprintln!("⚠️  Could not load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let geocoder = match geocode::build_geocoder(&config.geocoding) {
        Ok(geocoder) => geocoder,
        Err(e) => {
            error!(error = %e, "could not build geocoder");
            eprintln!("⚠️  Could not build geocoder: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let storage = Arc::new(InMemoryStorage::new());
    let pipeline = IntegrationPipeline::new(storage, geocoder, config);

    match cli.command {
        Commands::Integrate { region } => {
            let region = Region::from(region);
            info!(%region, "starting single-region integration");
            match pipeline.run(region).await {
                Ok(summary) => {
                    print_summary(&summary);
                    println!("\n✅ {} integrated successfully", region);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!(%region, error = %e, "integration failed");
                    eprintln!("\n❌ {} integration failed: {}", region, e);
                    ExitCode::FAILURE
                }
            }
        }
        Commands::All => {
            info!("starting full integration of all regions");
            let results = pipeline.run_all().await;
            let mut failed = false;
            for (region, result) in &results {
                match result {
                    Ok(summary) => print_summary(summary),
                    Err(e) => {
                        failed = true;
                        eprintln!("\n❌ {} integration failed: {}", region, e);
                    }
                }
            }
            if failed {
                ExitCode::FAILURE
            } else {
                println!("\n✅ All regions integrated successfully");
                ExitCode::SUCCESS
            }
        }
    }
}
