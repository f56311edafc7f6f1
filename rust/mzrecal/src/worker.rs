//! Per-run calibration entry points.
//!
//! One external worker calls into here exactly once per file. Failures
//! never cross this boundary as panics: they come back as a tagged
//! `RunFailure` so the supervisor can mark the file and keep its
//! siblings running.

use crate::alignment::{
    AlignmentResult,
    align_run,
};
use crate::config::{
    FragmentOffsetPolicy,
    RecalConfig,
};
use crate::errors::{
    Result,
    RunFailure,
};
use crate::models::RunData;
use crate::precursor::fit_and_predict;
use crate::targets::TargetTable;
use crate::utils::{
    median,
    std_dev,
};
use tracing::{
    error,
    info,
    warn,
};

/// Median/spread of the matched fragment-ion deviations for one pass.
#[derive(Debug, Clone, Copy)]
pub struct FragmentOffsetStats {
    pub median_offset: f64,
    pub std_offset: f64,
}

/// Everything one calibration pass produces for a run. The persistence
/// layer writes these back; this crate never touches storage.
#[derive(Debug, Clone)]
pub struct RunCalibration {
    /// One corrected mass per feature, parallel to `run.features`.
    pub corrected_masses: Vec<f64>,
    /// Run-level metadata: upper-bound estimate of the remaining
    /// precursor mass error in ppm.
    pub estimated_max_precursor_ppm: f64,
    /// Whether the precursor model was actually fitted.
    pub precursor_fitted: bool,
    /// Per-MS2-scan fragment mass offset in ppm. Depending on the
    /// configured policy this extends or replaces a previously stored
    /// array.
    pub fragment_offsets: Vec<f64>,
    /// Present when the fragment-ion table contributed an offset this
    /// pass.
    pub fragment_stats: Option<FragmentOffsetStats>,
}

/// The starting per-scan offset array for this pass, honoring the
/// accumulate/reset policy.
fn seed_fragment_offsets(run: &RunData, policy: FragmentOffsetPolicy) -> Vec<f64> {
    let num_scans = run.ms2_scans.num_scans();
    match (policy, &run.corrected_fragment_mzs) {
        (FragmentOffsetPolicy::Accumulate, Some(prev)) => {
            if prev.len() == num_scans {
                prev.clone()
            } else {
                warn!(
                    "Run {}: stored fragment offsets have {} entries for {} scans, discarding them",
                    run.run_id,
                    prev.len(),
                    num_scans
                );
                vec![0.0; num_scans]
            }
        }
        _ => vec![0.0; num_scans],
    }
}

fn calibrate_run_inner(run: &RunData, config: &RecalConfig) -> Result<RunCalibration> {
    // Precursor stage. No PSMs yet means there is nothing to fit, not
    // an error: masses pass through and the error estimate stays 0.
    let (corrected_masses, estimated_max_precursor_ppm, precursor_fitted) = if run.psms.is_empty()
    {
        info!("Run {}: no PSMs present, skipping precursor calibration", run.run_id);
        (
            run.features.iter().map(|f| f.mass_matched).collect(),
            0.0,
            false,
        )
    } else {
        let fit = fit_and_predict(&run.psms, &run.features, &config.calibration)?;
        (fit.corrected_masses, fit.residual_std, fit.fitted)
    };
    info!("Run {}: precursor calibration complete", run.run_id);

    // Fragment stage, from the matched fragment-ion table. The offset
    // array is per MS2 scan and, under the accumulate policy, grows on
    // top of whatever an earlier pass stored.
    let mut fragment_offsets = seed_fragment_offsets(run, config.fragment_offset_policy);
    let fragment_stats = if run.fragment_matches.is_empty() {
        info!("Run {}: no ions to calibrate fragment masses found", run.run_id);
        None
    } else {
        // delta is theoretical minus observed, so its median is already
        // the correction that cancels the observed offset. Same sign
        // convention as the alignment curve.
        let delta_ppm: Vec<f64> = run
            .fragment_matches
            .iter()
            .map(|ion| (ion.db_mass - ion.ion_mass) / ((ion.db_mass + ion.ion_mass) / 2.0) * 1e6)
            .collect();
        let median_offset = median(&delta_ppm);
        let std_offset = std_dev(&delta_ppm);
        for offset in fragment_offsets.iter_mut() {
            *offset += median_offset;
        }
        info!(
            "Run {}: median fragment offset {:.2} - std {:.2} ppm",
            run.run_id, median_offset, std_offset
        );
        Some(FragmentOffsetStats {
            median_offset,
            std_offset,
        })
    };

    Ok(RunCalibration {
        corrected_masses,
        estimated_max_precursor_ppm,
        precursor_fitted,
        fragment_offsets,
        fragment_stats,
    })
}

/// Calibrates one run: precursor masses from its PSMs, fragment
/// offsets from its matched ion table.
///
/// Any error is caught here, tagged, and handed back as data.
pub fn calibrate_run(run: &RunData, config: &RecalConfig) -> std::result::Result<RunCalibration, RunFailure> {
    match calibrate_run_inner(run, config) {
        Ok(x) => Ok(x),
        Err(e) => {
            let failure = RunFailure::from_error(e);
            error!("Calibration of run {} failed: {}", run.run_id, failure);
            Err(failure)
        }
    }
}

/// Database-driven fragment calibration: aligns the run's raw MS2
/// fragment masses against the shared target table and adds the
/// interpolated correction at each scan's RT onto `offsets`.
///
/// Corrections are accumulated additively; a scan's offset persists
/// across successive calibration passes.
pub fn calibrate_fragments(
    run: &RunData,
    targets: &TargetTable,
    config: &RecalConfig,
    offsets: &mut [f64],
) -> Result<AlignmentResult> {
    let result = align_run(run, targets, &config.alignment, 2)?;
    for (offset, rt) in offsets.iter_mut().zip(run.ms2_scans.rt_list.iter()) {
        *offset += result.curve.correction_at(*rt);
    }
    info!(
        "Run {}: fragment alignment matched {}/{} observations over {} curve nodes",
        run.run_id,
        result.num_matched,
        result.corrections.len(),
        result.curve.num_nodes()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CalibrationSample,
        FeatureRecord,
        FragmentIonMatch,
        Ms2ScanArrays,
    };

    fn run_with_fragments() -> RunData {
        // Observed ions 4 ppm heavier than theory.
        let fragment_matches: Vec<FragmentIonMatch> = (0..9)
            .map(|i| {
                let db_mass = 300.0 + 50.0 * i as f64;
                FragmentIonMatch {
                    db_mass,
                    ion_mass: db_mass * (1.0 + 4e-6),
                }
            })
            .collect();
        RunData {
            run_id: "unit_test_run".to_string(),
            psms: Vec::new(),
            features: vec![FeatureRecord {
                mz_matched: 500.0,
                rt_matched: 1.0,
                mobility_matched: None,
                mass_matched: 998.0,
            }],
            fragment_matches,
            ms2_scans: Ms2ScanArrays {
                rt_list: vec![0.5, 1.5, 2.5],
                scan_offsets: vec![0, 2, 4, 6],
                mass_list: vec![300.0; 6],
            },
            corrected_fragment_mzs: None,
        }
    }

    #[test]
    fn test_no_psms_passes_masses_through() {
        let run = run_with_fragments();
        let out = calibrate_run(&run, &RecalConfig::default()).unwrap();
        assert!(!out.precursor_fitted);
        assert_eq!(out.corrected_masses, vec![998.0]);
        assert_eq!(out.estimated_max_precursor_ppm, 0.0);
    }

    #[test]
    fn test_fragment_median_offset_cancels_heavy_ions() {
        // Ions observed 4 ppm heavy: delta_ppm = (db - ion)/mid * 1e6
        // is about -4, and that is the correction applied as-is.
        let run = run_with_fragments();
        let out = calibrate_run(&run, &RecalConfig::default()).unwrap();
        let stats = out.fragment_stats.unwrap();
        assert!((stats.median_offset - (-4.0)).abs() < 1e-3);
        assert!(stats.std_offset < 1e-3);
        assert_eq!(out.fragment_offsets.len(), 3);
        for offset in &out.fragment_offsets {
            assert!((offset - (-4.0)).abs() < 1e-3);
        }
    }

    #[test]
    fn test_offsets_accumulate_on_top_of_previous_pass() {
        let mut run = run_with_fragments();
        run.corrected_fragment_mzs = Some(vec![1.5, 1.5, 1.5]);
        let out = calibrate_run(&run, &RecalConfig::default()).unwrap();
        for offset in &out.fragment_offsets {
            assert!((offset - (1.5 - 4.0)).abs() < 1e-3);
        }
    }

    #[test]
    fn test_mismatched_stored_offsets_are_discarded() {
        // Two stored entries for three scans: the stale array cannot be
        // accumulated onto and is replaced by a fresh zero seed.
        let mut run = run_with_fragments();
        run.corrected_fragment_mzs = Some(vec![1.5, 1.5]);
        let out = calibrate_run(&run, &RecalConfig::default()).unwrap();
        assert_eq!(out.fragment_offsets.len(), 3);
        for offset in &out.fragment_offsets {
            assert!((offset - (-4.0)).abs() < 1e-3);
        }
    }

    #[test]
    fn test_reset_policy_discards_previous_offsets() {
        let mut run = run_with_fragments();
        run.corrected_fragment_mzs = Some(vec![1.5, 1.5, 1.5]);
        let config = RecalConfig {
            fragment_offset_policy: crate::config::FragmentOffsetPolicy::Reset,
            ..Default::default()
        };
        let out = calibrate_run(&run, &config).unwrap();
        for offset in &out.fragment_offsets {
            assert!((offset - (-4.0)).abs() < 1e-3);
        }
    }

    #[test]
    fn test_no_fragment_ions_skips_fragment_stage() {
        let mut run = run_with_fragments();
        run.fragment_matches.clear();
        let out = calibrate_run(&run, &RecalConfig::default()).unwrap();
        assert!(out.fragment_stats.is_none());
        assert_eq!(out.fragment_offsets, vec![0.0; 3]);
    }

    #[test]
    fn test_malformed_scan_index_is_an_error_not_a_panic() {
        // Three scans but only two offsets; slicing by scan would read
        // past the offsets array. Must come back as a data error.
        let mut run = run_with_fragments();
        run.ms2_scans.scan_offsets = vec![0, 2];
        let targets = crate::targets::extract_targets_from_masses(
            &[300.0],
            &crate::config::TargetExtractionConfig::default(),
        )
        .unwrap();
        let mut offsets = vec![0.0; run.ms2_scans.num_scans()];
        let err = calibrate_fragments(&run, &targets, &RecalConfig::default(), &mut offsets);
        assert!(matches!(
            err,
            Err(crate::errors::MzRecalError::DataProcessing(
                crate::errors::DataProcessingError::ExpectedSlicesSameLength { .. }
            ))
        ));
        // Untouched offsets: the failed pass must not half-apply.
        assert_eq!(offsets, vec![0.0; 3]);
    }

    #[test]
    fn test_precursor_failure_is_reported_as_data() {
        // More samples than the neighbor threshold, but the outlier
        // filter leaves fewer training points than k requires; the
        // fit error must come back tagged, not as a panic.
        let samples: Vec<CalibrationSample> = (0..12)
            .map(|i| CalibrationSample {
                mz: 500.0,
                rt: i as f64,
                mobility: None,
                o_mass_ppm: if i < 6 { 100.0 } else { -100.0 },
            })
            .collect();
        let mut run = run_with_fragments();
        run.psms = samples;
        let config = RecalConfig {
            calibration: crate::config::CalibrationConfig {
                calib_n_neighbors: 11,
                outlier_std: 0.5,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = calibrate_run(&run, &config).unwrap_err();
        assert_eq!(err.kind, crate::errors::FailureKind::DataProcessing);
    }
}
