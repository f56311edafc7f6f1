mod cli;
mod config;
mod errors;
mod processing;

use clap::Parser;
use mzrecal::{
    DatabaseArrays,
    TargetTable,
    extract_targets,
};
use serde::Serialize;
use std::fs::File;
use std::path::{
    Path,
    PathBuf,
};
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::{
    error,
    info,
};
use tracing_subscriber::EnvFilter;
use zstd::stream::read::Decoder;
use zstd::stream::write::Encoder;

use cli::Cli;
use config::{
    Config,
    OutputConfig,
};

#[cfg(target_os = "windows")]
use mimalloc::MiMalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// Save with compression
fn save_compressed<T: Serialize>(
    data: &T,
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::create(path)?;
    let mut encoder = Encoder::new(file, 3)?;
    rmp_serde::encode::write(&mut encoder, data)?;
    encoder.finish()?;
    Ok(())
}

// Load with decompression
fn load_compressed<T: serde::de::DeserializeOwned>(
    path: impl AsRef<Path>,
) -> Result<T, Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    let decoder = Decoder::new(file)?;
    let data = rmp_serde::decode::from_read(decoder)?;
    Ok(data)
}

fn maybe_cache_load_targets(cache_loc: impl AsRef<Path>) -> Option<TargetTable> {
    info!(
        "Attempting to load target table from cache at {:?}",
        cache_loc.as_ref()
    );
    match load_compressed(cache_loc.as_ref()) {
        Ok(targets) => {
            info!(
                "Loaded target table from cache at {:?}",
                cache_loc.as_ref()
            );
            Some(targets)
        }
        Err(e) => {
            error!(
                "Failed to load target table from cache at {:?}: {:?}",
                cache_loc.as_ref(),
                e
            );
            None
        }
    }
}

fn load_database(path: &PathBuf) -> Result<DatabaseArrays, errors::CliError> {
    let file = File::open(path).map_err(|e| errors::CliError::Io {
        source: e.to_string(),
        path: Some(path.to_string_lossy().to_string()),
    })?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|e| errors::CliError::ParseError { msg: e.to_string() })
}

fn uncached_build_targets(
    database_file: &PathBuf,
    config: &Config,
    cache_loc: &Path,
) -> Result<TargetTable, errors::CliError> {
    let database = load_database(database_file)?;
    info!(
        "Extracting fragment targets from {} database masses",
        database.fragment_masses.len()
    );
    let targets = extract_targets(&database, &config.recalibration.targets, 2)?;
    info!("Extracted {} targets", targets.num_targets());

    info!("Saving target table to cache at {:?}", cache_loc);
    if let Err(e) = save_compressed(&targets, cache_loc) {
        error!("Failed to save target table to cache: {:?}", e);
    } else {
        info!("Saved target table to cache");
    }
    Ok(targets)
}

fn main() -> std::result::Result<(), errors::CliError> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        ) // This uses RUST_LOG environment variable
        .init();

    // Parse command line arguments
    let args = Cli::parse();

    // Load and parse configuration
    let conf = match std::fs::File::open(args.config.clone()) {
        Ok(x) => x,
        Err(e) => {
            return Err(errors::CliError::Io {
                source: e.to_string(),
                path: Some(args.config.to_string_lossy().to_string()),
            });
        }
    };
    let config: Result<Config, _> = serde_json::from_reader(conf);
    let mut config = match config {
        Ok(x) => x,
        Err(e) => {
            return Err(errors::CliError::ParseError { msg: e.to_string() });
        }
    };

    // Override config with command line arguments if provided
    if let Some(database_file) = args.database_file {
        config.database_file = Some(database_file);
    }
    if !args.run_file.is_empty() {
        config.run_files = args.run_file;
    }
    if config.run_files.is_empty() {
        return Err(errors::CliError::Config {
            source: "No run files provided, please provide them in either the config file or with the --run-file flag".to_string(),
        });
    }
    if let Some(output_dir) = args.output_dir {
        config.output = Some(OutputConfig {
            directory: output_dir,
        });
    }

    let output_config = match config.output {
        Some(ref x) => x.clone(),
        None => {
            return Err(errors::CliError::Config {
                source: "No output directory provided, please provide one in either the config file or with the --output-dir flag".to_string(),
            });
        }
    };
    info!("Parsed configuration: {:#?}", config.clone());

    // Create output directory
    match std::fs::create_dir_all(&output_config.directory) {
        Ok(_) => println!("Created output directory"),
        Err(e) => {
            return Err(errors::CliError::Io {
                source: e.to_string(),
                path: Some(output_config.directory.to_string_lossy().to_string()),
            });
        }
    };

    // Without a database the precursor and median-based fragment stages
    // still run; only the target-table alignment is skipped.
    let targets: Option<Arc<TargetTable>> = match config.database_file {
        Some(ref database_file) => {
            let cache_loc = database_file.with_extension("targets.msgpack.zst");
            let targets = if args.rebuild_targets {
                uncached_build_targets(database_file, &config, &cache_loc)?
            } else if let Some(targets) = maybe_cache_load_targets(&cache_loc) {
                targets
            } else {
                uncached_build_targets(database_file, &config, &cache_loc)?
            };
            Some(Arc::new(targets))
        }
        None => {
            info!("No database file provided, skipping fragment alignment");
            None
        }
    };

    processing::process_runs(
        &config.run_files,
        targets,
        &config.recalibration,
        &output_config,
    )?;

    Ok(())
}
