use crate::config::OutputConfig;
use crate::errors::CliError;
use indicatif::{
    ParallelProgressIterator,
    ProgressBar,
    ProgressStyle,
};
use mzrecal::output::{
    CorrectedFeatureRow,
    FeatureParquetWriter,
};
use mzrecal::{
    RecalConfig,
    RunData,
    TargetTable,
    calibrate_fragments,
    calibrate_run,
};
use rayon::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::path::{
    Path,
    PathBuf,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{
    error,
    info,
    warn,
};

/// What one run's calibration pass leaves behind, written next to the
/// feature parquet as JSON.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub num_features: usize,
    pub precursor_fitted: bool,
    pub estimated_max_precursor_ppm: f64,
    pub fragment_median_offset: Option<f64>,
    pub fragment_offset_std: Option<f64>,
    pub num_curve_nodes: Option<usize>,
    /// Per-MS2-scan fragment mass offset in ppm.
    pub fragment_offsets: Vec<f64>,
}

fn load_run(path: &Path) -> Result<RunData, CliError> {
    let file = File::open(path).map_err(|e| CliError::Io {
        source: e.to_string(),
        path: Some(path.to_string_lossy().to_string()),
    })?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|e| CliError::ParseError { msg: e.to_string() })
}

fn process_one_run(
    run_file: &Path,
    targets: Option<&TargetTable>,
    config: &RecalConfig,
    output: &OutputConfig,
) -> Result<RunSummary, String> {
    let run = load_run(run_file).map_err(|e| e.to_string())?;

    // Precursor first; the fragment stage reads nothing from it but
    // the corrected masses must exist before any recalibrated search
    // uses this run.
    let mut calibration = calibrate_run(&run, config).map_err(|e| e.to_string())?;

    let mut num_curve_nodes = None;
    if let Some(targets) = targets {
        if run.ms2_scans.num_scans() > 0 {
            match calibrate_fragments(&run, targets, config, &mut calibration.fragment_offsets) {
                Ok(alignment) => {
                    num_curve_nodes = Some(alignment.curve.num_nodes());
                }
                Err(e) => {
                    // A run that cannot be aligned keeps its median-based
                    // offsets and moves on.
                    warn!(
                        "Run {}: fragment alignment skipped: {:?}",
                        run.run_id, e
                    );
                }
            }
        }
    }

    let parquet_path = output
        .directory
        .join(format!("{}.features.parquet", run.run_id));
    let mut writer =
        FeatureParquetWriter::new(&parquet_path, 20_000).map_err(|e| e.to_string())?;
    writer.extend(CorrectedFeatureRow::from_calibration(
        &run.run_id,
        &run.features,
        &calibration,
    ));
    writer.close();

    let summary = RunSummary {
        run_id: run.run_id.clone(),
        num_features: run.features.len(),
        precursor_fitted: calibration.precursor_fitted,
        estimated_max_precursor_ppm: calibration.estimated_max_precursor_ppm,
        fragment_median_offset: calibration.fragment_stats.map(|s| s.median_offset),
        fragment_offset_std: calibration.fragment_stats.map(|s| s.std_offset),
        num_curve_nodes,
        fragment_offsets: calibration.fragment_offsets.clone(),
    };
    let summary_path = output
        .directory
        .join(format!("{}.calibration.json", run.run_id));
    let summary_file = File::create(&summary_path).map_err(|e| e.to_string())?;
    serde_json::to_writer_pretty(summary_file, &summary).map_err(|e| e.to_string())?;

    info!("Calibration of run {} complete", run.run_id);
    Ok(summary)
}

/// Calibrates every run file, one independent worker per run.
///
/// A failing run is logged and reported in the returned count; it
/// never takes its siblings down with it.
pub fn process_runs(
    run_files: &[PathBuf],
    targets: Option<Arc<TargetTable>>,
    config: &RecalConfig,
    output: &OutputConfig,
) -> Result<(), CliError> {
    let start = Instant::now();
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
    )
    .unwrap();
    let progress = ProgressBar::new(run_files.len() as u64).with_style(style);

    let outcomes: Vec<Result<RunSummary, (PathBuf, String)>> = run_files
        .par_iter()
        .progress_with(progress)
        .map(|run_file| {
            process_one_run(run_file, targets.as_deref(), config, output)
                .map_err(|msg| (run_file.clone(), msg))
        })
        .collect();

    let mut nfailed = 0;
    for outcome in &outcomes {
        if let Err((path, msg)) = outcome {
            nfailed += 1;
            error!("Calibration of file {:?} failed: {}", path, msg);
        }
    }
    println!(
        "Calibrated {}/{} runs in {:?}",
        outcomes.len() - nfailed,
        outcomes.len(),
        start.elapsed()
    );
    Ok(())
}
