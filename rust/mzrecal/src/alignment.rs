//! Alignment of one run's raw mass observations to the database target
//! table.
//!
//! Every observation is matched against the nearest target in its
//! integer-dalton neighborhood, the signed ppm deviations are binned by
//! retention time, and the per-bin medians become a piecewise-linear
//! correction curve over RT. The curve yields one correction value per
//! original observation, including the ones that were filtered out of
//! the fit.

use crate::config::AlignmentConfig;
use crate::errors::{
    ConfigError,
    DataProcessingError,
    Result,
};
use crate::models::RunData;
use crate::targets::TargetTable;
use crate::utils::median;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

/// One raw mass measurement paired with its retention time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentObservation {
    pub mass: f64,
    pub rt: f64,
}

/// Piecewise-linear ppm correction over retention time.
///
/// Nodes are RT bin centers; values are the negated per-bin median
/// deviations, so adding the correction to an observation cancels its
/// systematic offset. Interpolation only: queries outside the node
/// range, and anything non-finite, evaluate to 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionCurve {
    nodes: Vec<f64>,
    values: Vec<f64>,
    slopes: Vec<f64>,
}

impl CorrectionCurve {
    fn new(nodes: Vec<f64>, values: Vec<f64>) -> Self {
        debug_assert_eq!(nodes.len(), values.len());
        let slopes = nodes
            .windows(2)
            .zip(values.windows(2))
            .map(|(n, v)| (v[1] - v[0]) / (n[1] - n[0]))
            .collect();
        Self {
            nodes,
            values,
            slopes,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.nodes.iter().copied().zip(self.values.iter().copied())
    }

    /// Correction in ppm at one retention time.
    pub fn correction_at(&self, rt: f64) -> f64 {
        if !rt.is_finite() || self.nodes.is_empty() {
            return 0.0;
        }
        if self.nodes.len() == 1 {
            // A single bin has no extent to interpolate over; the whole
            // run gets its median.
            return self.values[0];
        }
        let first = self.nodes[0];
        let last = *self.nodes.last().unwrap();
        if rt < first || rt > last {
            return 0.0;
        }
        let i = self.nodes.partition_point(|n| *n < rt).max(1);
        let estimate = self.values[i - 1] + (rt - self.nodes[i - 1]) * self.slopes[i - 1];
        if estimate.is_finite() { estimate } else { 0.0 }
    }
}

/// Outcome of aligning one observation set against the target table.
#[derive(Debug, Clone)]
pub struct AlignmentResult {
    /// One correction (ppm) per original input observation.
    pub corrections: Vec<f64>,
    pub curve: CorrectionCurve,
    /// How many observations survived the ppm / finite-RT filter.
    pub num_matched: usize,
}

/// Signed mass difference to the nearest target.
///
/// The table is sparse enough that the true nearest target lives in
/// the observation's own dalton bucket or one of its direct neighbors;
/// empty buckets read as zero, which yields a huge difference and
/// therefore never wins the comparison against a real target.
fn nearest_target_delta(mass: f64, targets: &TargetTable) -> f64 {
    let bucket = mass as i64;
    let mut best = mass - targets.get(bucket - 1);
    for candidate in [targets.get(bucket), targets.get(bucket + 1)] {
        let diff = mass - candidate;
        if diff.abs() < best.abs() {
            best = diff;
        }
    }
    best
}

/// Matches observations to targets and fits the RT-indexed correction
/// curve.
pub fn align(
    observations: &[AlignmentObservation],
    targets: &TargetTable,
    config: &AlignmentConfig,
) -> Result<AlignmentResult> {
    if observations.is_empty() {
        return Err(DataProcessingError::ExpectedNonEmptyData {
            context: Some("no observations to align".to_string()),
        }
        .into());
    }

    let ppm_deltas: Vec<f64> = observations
        .iter()
        .map(|obs| nearest_target_delta(obs.mass, targets) / obs.mass * 1e6)
        .collect();

    let mut selected: Vec<usize> = (0..observations.len())
        .filter(|&i| {
            ppm_deltas[i].abs() < config.max_ppm_distance && observations[i].rt.is_finite()
        })
        .collect();
    selected.sort_unstable_by(|&a, &b| {
        observations[a]
            .rt
            .partial_cmp(&observations[b].rt)
            .unwrap()
    });
    if selected.is_empty() {
        return Err(DataProcessingError::ExpectedNonEmptyData {
            context: Some("no observations within max_ppm_distance of a target".to_string()),
        }
        .into());
    }
    let num_matched = selected.len();

    // Fixed-width RT windows spanning the observed range; each window's
    // median deviation becomes one curve node at the window center.
    let step = config.rt_step_size;
    if !(step > 0.0) {
        return Err(ConfigError::InvalidParameter {
            parameter: "rt_step_size",
            msg: format!("must be positive, got {}", step),
        }
        .into());
    }
    let rt_first = observations[selected[0]].rt;
    let rt_last = observations[*selected.last().unwrap()].rt;
    let num_windows = (((rt_last - rt_first) / step).ceil() as usize).max(1);

    let mut window_ppms: Vec<Vec<f64>> = vec![Vec::new(); num_windows];
    for &i in &selected {
        let w = (((observations[i].rt - rt_first) / step) as usize).min(num_windows - 1);
        window_ppms[w].push(ppm_deltas[i]);
    }

    let mut nodes = Vec::with_capacity(num_windows);
    let mut values = Vec::with_capacity(num_windows);
    for (w, ppms) in window_ppms.iter().enumerate() {
        // An empty window yields NaN and is simply bridged by its
        // neighbors.
        let m = median(ppms);
        if m.is_finite() {
            nodes.push(rt_first + (w as f64 + 0.5) * step);
            values.push(-m);
        }
    }
    debug!(
        "Alignment fitted {} curve nodes from {}/{} observations",
        nodes.len(),
        num_matched,
        observations.len()
    );

    let curve = CorrectionCurve::new(nodes, values);
    let corrections = observations
        .iter()
        .map(|obs| curve.correction_at(obs.rt))
        .collect();

    Ok(AlignmentResult {
        corrections,
        curve,
        num_matched,
    })
}

/// Builds the observation set for the requested MS level of a run and
/// aligns it.
///
/// Level 1 pairs each feature's matched mass with its matched RT;
/// level 2 expands every fragment mass against its parent scan's RT.
/// Any other level is a configuration error.
pub fn align_run(
    run: &RunData,
    targets: &TargetTable,
    config: &AlignmentConfig,
    ms_level: u8,
) -> Result<AlignmentResult> {
    let observations = match ms_level {
        1 => observations_from_features(run),
        2 => observations_from_ms2_scans(run)?,
        level => return Err(ConfigError::InvalidMsLevel { level }.into()),
    };
    align(&observations, targets, config)
}

pub fn observations_from_features(run: &RunData) -> Vec<AlignmentObservation> {
    run.features
        .iter()
        .map(|f| AlignmentObservation {
            mass: f.mz_matched,
            rt: f.rt_matched,
        })
        .collect()
}

/// Each fragment inherits the retention time of its parent MS2 scan.
///
/// The scan index is validated first; a run file with a broken offsets
/// array comes back as a data error instead of panicking mid-slice.
pub fn observations_from_ms2_scans(run: &RunData) -> Result<Vec<AlignmentObservation>> {
    let scans = &run.ms2_scans;
    scans.validate()?;
    let mut out = Vec::with_capacity(scans.num_fragments());
    for (scan, rt) in scans.rt_list.iter().enumerate() {
        let lo = scans.scan_offsets[scan];
        let hi = scans.scan_offsets[scan + 1];
        for mass in &scans.mass_list[lo..hi] {
            out.push(AlignmentObservation {
                mass: *mass,
                rt: *rt,
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetExtractionConfig;
    use crate::targets::extract_targets_from_masses;

    fn single_target_table() -> TargetTable {
        extract_targets_from_masses(&[1000.0], &TargetExtractionConfig::default()).unwrap()
    }

    #[test]
    fn test_constant_offset_yields_negated_median_node() {
        // Ten observations, all +5 ppm heavier than the 1000.0 target,
        // spanning a single RT bin.
        let targets = single_target_table();
        let observations: Vec<AlignmentObservation> = (0..10)
            .map(|i| AlignmentObservation {
                mass: 1000.0 * (1.0 + 5e-6),
                rt: 0.05 * i as f64,
            })
            .collect();
        let config = AlignmentConfig {
            max_ppm_distance: 100.0,
            rt_step_size: 1.0,
        };
        let result = align(&observations, &targets, &config).unwrap();
        assert_eq!(result.curve.num_nodes(), 1);
        let (_, value) = result.curve.nodes().next().unwrap();
        assert!((value - (-5.0)).abs() < 1e-3);
        assert_eq!(result.num_matched, 10);
        for c in &result.corrections {
            assert!((c - (-5.0)).abs() < 1e-3);
        }
    }

    #[test]
    fn test_alignment_is_deterministic() {
        let targets = single_target_table();
        let observations: Vec<AlignmentObservation> = (0..50)
            .map(|i| AlignmentObservation {
                mass: 1000.0 * (1.0 + (3.0 + (i % 7) as f64) * 1e-6),
                rt: (i as f64) * 0.31,
            })
            .collect();
        let config = AlignmentConfig::default();
        let a = align(&observations, &targets, &config).unwrap();
        let b = align(&observations, &targets, &config).unwrap();
        assert_eq!(a.corrections, b.corrections);
    }

    #[test]
    fn test_mass_beyond_table_length_is_safe() {
        // Observation bucket far past the end of the table; the lookup
        // behaves as if the table were zero-padded.
        let targets = single_target_table();
        let observations = vec![
            AlignmentObservation {
                mass: 5000.0,
                rt: 0.0,
            },
            AlignmentObservation {
                mass: 1000.0 * (1.0 + 2e-6),
                rt: 0.1,
            },
        ];
        let config = AlignmentConfig {
            max_ppm_distance: 100.0,
            rt_step_size: 1.0,
        };
        let result = align(&observations, &targets, &config).unwrap();
        assert_eq!(result.corrections.len(), 2);
        assert_eq!(result.num_matched, 1);
    }

    #[test]
    fn test_non_finite_rt_is_excluded_but_still_gets_a_value() {
        let targets = single_target_table();
        let mut observations: Vec<AlignmentObservation> = (0..10)
            .map(|i| AlignmentObservation {
                mass: 1000.0 * (1.0 + 4e-6),
                rt: 0.1 * i as f64,
            })
            .collect();
        observations.push(AlignmentObservation {
            mass: 1000.0,
            rt: f64::NAN,
        });
        let config = AlignmentConfig {
            max_ppm_distance: 100.0,
            rt_step_size: 1.0,
        };
        let result = align(&observations, &targets, &config).unwrap();
        assert_eq!(result.num_matched, 10);
        assert_eq!(result.corrections.len(), 11);
        // The NaN-RT observation falls back to zero correction.
        assert_eq!(result.corrections[10], 0.0);
    }

    #[test]
    fn test_linear_drift_is_tracked_across_bins() {
        // Deviation drifts from +2 ppm to +10 ppm over RT; corrections
        // near the start must differ from corrections near the end.
        let targets = single_target_table();
        let observations: Vec<AlignmentObservation> = (0..200)
            .map(|i| {
                let rt = i as f64 * 0.05;
                let ppm = 2.0 + 0.8 * rt;
                AlignmentObservation {
                    mass: 1000.0 * (1.0 + ppm * 1e-6),
                    rt,
                }
            })
            .collect();
        let config = AlignmentConfig {
            max_ppm_distance: 100.0,
            rt_step_size: 1.0,
        };
        let result = align(&observations, &targets, &config).unwrap();
        assert!(result.curve.num_nodes() >= 5);
        let mid = result.curve.correction_at(5.0);
        assert!((mid - (-6.0)).abs() < 0.5, "mid correction {}", mid);
        let early = result.curve.correction_at(1.0);
        let late = result.curve.correction_at(9.0);
        assert!(early > late, "early {} late {}", early, late);
    }

    #[test]
    fn test_out_of_range_rt_evaluates_to_zero() {
        let curve = CorrectionCurve::new(vec![1.0, 2.0], vec![-3.0, -4.0]);
        assert_eq!(curve.correction_at(0.5), 0.0);
        assert_eq!(curve.correction_at(2.5), 0.0);
        assert!((curve.correction_at(1.5) - (-3.5)).abs() < 1e-12);
    }

    #[test]
    fn test_ties_resolve_to_nearest_target_side() {
        // Observation 0.4 Da above a 700 target and 0.6 below a 701
        // target resolves to the 700 one.
        let table = extract_targets_from_masses(
            &[700.0, 701.0],
            &TargetExtractionConfig {
                max_ppm: 100,
                min_distance: 0.5,
            },
        )
        .unwrap();
        let delta = nearest_target_delta(700.39, &table);
        assert!(delta > 0.0);
        assert!((delta - 0.39).abs() < 0.01);
    }

    #[test]
    fn test_empty_observations_error() {
        let targets = single_target_table();
        let err = align(&[], &targets, &AlignmentConfig::default());
        assert!(err.is_err());
    }
}
