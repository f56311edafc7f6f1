//! Precursor (MS1) mass calibration.
//!
//! Fits a distance-weighted nearest-neighbor regression from normalized
//! (m/z, RT, mobility) coordinates to the observed ppm mass error of
//! confidently identified PSMs, then predicts and removes that error
//! from every detected feature's matched mass.

use crate::config::CalibrationConfig;
use crate::errors::Result;
use crate::ml::KnnRegressor;
use crate::models::{
    CalibrationSample,
    FeatureRecord,
};
use crate::transform::{
    CoordinateAxis,
    FeatureTransform,
};
use crate::utils::{
    median,
    std_dev,
    std_dev_sample,
};
use tracing::info;

/// Output of one precursor calibration fit.
#[derive(Debug, Clone)]
pub struct PrecursorCalibration {
    /// One corrected mass per input feature, parallel to the input.
    pub corrected_masses: Vec<f64>,
    /// Upper-bound estimate of the residual precursor ppm error,
    /// exposed for later recalibrated searches.
    pub residual_std: f64,
    /// Whether a model was actually fitted, or the masses passed
    /// through unchanged.
    pub fitted: bool,
}

/// Trims samples whose mass error lies outside
/// `median +- outlier_std * std`, so misidentified PSMs with grossly
/// wrong mass error cannot dominate the fit.
///
/// Only the training set is trimmed; features awaiting correction are
/// never excluded.
pub fn filter_outliers(
    samples: &[CalibrationSample],
    outlier_std: f64,
) -> Vec<CalibrationSample> {
    let ppms: Vec<f64> = samples.iter().map(|s| s.o_mass_ppm).collect();
    // Sample std (ddof = 1); the trim width is estimated from the same
    // samples it is applied to.
    let ppm_std = std_dev_sample(&ppms).abs();
    let ppm_median = median(&ppms);
    samples
        .iter()
        .filter(|s| {
            s.o_mass_ppm < ppm_median + outlier_std * ppm_std
                && s.o_mass_ppm > ppm_median - outlier_std * ppm_std
        })
        .copied()
        .collect()
}

fn sample_coords(
    transform: &FeatureTransform,
    sample: &CalibrationSample,
    use_mobility: bool,
    out: &mut Vec<f64>,
) -> Result<()> {
    out.push(transform.transform(CoordinateAxis::Mz, sample.mz)?);
    out.push(transform.transform(CoordinateAxis::Rt, sample.rt)?);
    if use_mobility {
        out.push(transform.transform(CoordinateAxis::Mobility, sample.mobility.unwrap_or(0.0))?);
    }
    Ok(())
}

fn feature_coords(
    transform: &FeatureTransform,
    feature: &FeatureRecord,
    use_mobility: bool,
    out: &mut Vec<f64>,
) -> Result<()> {
    out.push(transform.transform(CoordinateAxis::Mz, feature.mz_matched)?);
    out.push(transform.transform(CoordinateAxis::Rt, feature.rt_matched)?);
    if use_mobility {
        out.push(transform.transform(
            CoordinateAxis::Mobility,
            feature.mobility_matched.unwrap_or(0.0),
        )?);
    }
    Ok(())
}

/// Fits the precursor model on `samples` and predicts corrected masses
/// for `features`.
///
/// With `calib_n_neighbors` samples or fewer no model is fitted at all:
/// a local regressor would overfit, so the matched masses pass through
/// unchanged and the residual estimate falls back to the sample std of
/// the unfiltered sample errors.
pub fn fit_and_predict(
    samples: &[CalibrationSample],
    features: &[FeatureRecord],
    config: &CalibrationConfig,
) -> Result<PrecursorCalibration> {
    if samples.len() <= config.calib_n_neighbors {
        info!("Not enough data points present. Skipping recalibration.");
        let ppms: Vec<f64> = samples.iter().map(|s| s.o_mass_ppm).collect();
        return Ok(PrecursorCalibration {
            corrected_masses: features.iter().map(|f| f.mass_matched).collect(),
            residual_std: std_dev_sample(&ppms).abs(),
            fitted: false,
        });
    }

    // The mobility axis only participates when every row carries it.
    let use_mobility = samples.iter().all(|s| s.mobility.is_some())
        && features.iter().all(|f| f.mobility_matched.is_some())
        && !samples.is_empty();
    let dims = if use_mobility { 3 } else { 2 };
    let transform = FeatureTransform::from_config(config, use_mobility);

    let training = filter_outliers(samples, config.outlier_std);

    let mut tree_points = Vec::with_capacity(training.len() * dims);
    let mut tree_targets = Vec::with_capacity(training.len());
    for sample in &training {
        sample_coords(&transform, sample, use_mobility, &mut tree_points)?;
        tree_targets.push(sample.o_mass_ppm);
    }

    let knn = KnnRegressor::fit(
        tree_points,
        dims,
        tree_targets,
        config.calib_n_neighbors,
    )?;

    let mut query_points = Vec::with_capacity(features.len() * dims);
    for feature in features {
        feature_coords(&transform, feature, use_mobility, &mut query_points)?;
    }
    let y_hat = knn.predict(&query_points);

    let corrected_masses = y_hat
        .iter()
        .zip(features.iter())
        .map(|(y, f)| (1.0 - y / 1e6) * f.mass_matched)
        .collect();

    Ok(PrecursorCalibration {
        corrected_masses,
        residual_std: std_dev(&y_hat),
        fitted: true,
    })
}
