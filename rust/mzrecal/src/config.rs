use serde::{
    Deserialize,
    Serialize,
};

/// Parameters for the precursor (MS1) calibration model.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Width of the training-set trim, in standard deviations around the
    /// median mass error.
    pub outlier_std: f64,
    /// k for the nearest-neighbor regression. Doubles as the minimum
    /// number of calibration samples required to attempt a fit at all.
    pub calib_n_neighbors: usize,
    /// ppm scale for the m/z axis normalization.
    pub calib_mz_range: f64,
    /// Minutes scale for the retention time axis normalization.
    pub calib_rt_range: f64,
    /// Relative scale for the ion mobility axis normalization.
    pub calib_mob_range: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            outlier_std: 3.0,
            calib_n_neighbors: 100,
            calib_mz_range: 20.0,
            calib_rt_range: 0.5,
            calib_mob_range: 0.3,
        }
    }
}

/// Parameters for deriving characteristic database masses.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct TargetExtractionConfig {
    /// Half-width of the histogram smoothing window and minimum peak
    /// separation, both in log10-ppm samples.
    pub max_ppm: usize,
    /// Minimum spacing in daltons between two accepted targets.
    pub min_distance: f64,
}

impl Default for TargetExtractionConfig {
    fn default() -> Self {
        Self {
            max_ppm: 100,
            min_distance: 0.5,
        }
    }
}

/// Parameters for aligning one run's observed masses to the target table.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Observations farther than this (in ppm) from their nearest target
    /// are excluded from curve fitting. The default is effectively
    /// unbounded.
    pub max_ppm_distance: f64,
    /// Retention time bin width in minutes for the per-window medians.
    pub rt_step_size: f64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            max_ppm_distance: 1e6,
            rt_step_size: 0.1,
        }
    }
}

/// What to do with a previously stored fragment offset array when a run
/// is recalibrated.
///
/// The historical behavior is `Accumulate`: each calibration pass adds
/// its median offset on top of whatever is already stored. `Reset`
/// zeroes the array first so only the latest pass survives. Which one is
/// correct is a policy choice for the caller, so it is exposed here
/// instead of being decided silently.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FragmentOffsetPolicy {
    #[default]
    Accumulate,
    Reset,
}

/// Top-level configuration for the recalibration stage of one run.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default)]
#[serde(default)]
pub struct RecalConfig {
    pub calibration: CalibrationConfig,
    pub targets: TargetExtractionConfig,
    pub alignment: AlignmentConfig,
    pub fragment_offset_policy: FragmentOffsetPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = RecalConfig::default();
        assert_eq!(config.calibration.outlier_std, 3.0);
        assert_eq!(config.calibration.calib_n_neighbors, 100);
        assert_eq!(config.calibration.calib_mz_range, 20.0);
        assert_eq!(config.calibration.calib_rt_range, 0.5);
        assert_eq!(config.calibration.calib_mob_range, 0.3);
        assert_eq!(config.targets.max_ppm, 100);
        assert_eq!(config.targets.min_distance, 0.5);
        assert_eq!(config.alignment.rt_step_size, 0.1);
        assert_eq!(
            config.fragment_offset_policy,
            FragmentOffsetPolicy::Accumulate
        );
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: RecalConfig =
            serde_json::from_str(r#"{"calibration": {"calib_n_neighbors": 10}}"#).unwrap();
        assert_eq!(config.calibration.calib_n_neighbors, 10);
        assert_eq!(config.calibration.outlier_std, 3.0);
        assert_eq!(config.targets.max_ppm, 100);
    }

    #[test]
    fn test_offset_policy_parses_lowercase() {
        let policy: FragmentOffsetPolicy = serde_json::from_str(r#""reset""#).unwrap();
        assert_eq!(policy, FragmentOffsetPolicy::Reset);
    }
}
