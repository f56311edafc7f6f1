//! Per-axis normalization of calibration coordinates.
//!
//! The nearest-neighbor model measures Euclidean distance across axes
//! with wildly different units (m/z in daltons, RT in minutes, mobility
//! as 1/K0), so each axis is mapped to a dimensionless coordinate
//! first. Multiplicative (ppm-scale) errors go through a log transform,
//! additive ones through plain scaling.

use crate::config::CalibrationConfig;
use crate::errors::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateAxis {
    Mz,
    Rt,
    Mobility,
}

impl CoordinateAxis {
    pub fn name(&self) -> &'static str {
        match self {
            CoordinateAxis::Mz => "mz",
            CoordinateAxis::Rt => "rt",
            CoordinateAxis::Mobility => "mobility",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum TransformKind {
    /// `ln(x) / scale` for positive x, 0 otherwise. Turns relative
    /// (ppm-scale) error into an additive coordinate.
    Relative,
    /// `x / scale`.
    Absolute,
}

#[derive(Debug, Clone, Copy)]
pub struct AxisTransform {
    kind: TransformKind,
    scale: f64,
}

impl AxisTransform {
    pub fn new(kind: TransformKind, scale: f64) -> Self {
        Self { kind, scale }
    }

    pub fn apply(&self, x: f64) -> f64 {
        match self.kind {
            TransformKind::Relative => {
                if x > 0.0 {
                    x.ln() / self.scale
                } else {
                    0.0
                }
            }
            TransformKind::Absolute => x / self.scale,
        }
    }
}

/// Registry of axis transforms for one calibration fit.
///
/// The mobility axis is only registered when the run actually carries
/// mobility values; asking for an unregistered axis is a configuration
/// error.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureTransform {
    mz: Option<AxisTransform>,
    rt: Option<AxisTransform>,
    mobility: Option<AxisTransform>,
}

impl FeatureTransform {
    pub fn from_config(config: &CalibrationConfig, with_mobility: bool) -> Self {
        let mut out = Self::default();
        out.register(
            CoordinateAxis::Mz,
            AxisTransform::new(TransformKind::Relative, config.calib_mz_range / 1e6),
        );
        out.register(
            CoordinateAxis::Rt,
            AxisTransform::new(TransformKind::Absolute, config.calib_rt_range),
        );
        if with_mobility {
            out.register(
                CoordinateAxis::Mobility,
                AxisTransform::new(TransformKind::Relative, config.calib_mob_range),
            );
        }
        out
    }

    pub fn register(&mut self, axis: CoordinateAxis, transform: AxisTransform) {
        match axis {
            CoordinateAxis::Mz => self.mz = Some(transform),
            CoordinateAxis::Rt => self.rt = Some(transform),
            CoordinateAxis::Mobility => self.mobility = Some(transform),
        }
    }

    pub fn get(&self, axis: CoordinateAxis) -> Result<&AxisTransform, ConfigError> {
        let transform = match axis {
            CoordinateAxis::Mz => self.mz.as_ref(),
            CoordinateAxis::Rt => self.rt.as_ref(),
            CoordinateAxis::Mobility => self.mobility.as_ref(),
        };
        transform.ok_or(ConfigError::UnknownTransformAxis { axis: axis.name() })
    }

    pub fn transform(&self, axis: CoordinateAxis, x: f64) -> Result<f64, ConfigError> {
        Ok(self.get(axis)?.apply(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_transform() -> FeatureTransform {
        FeatureTransform::from_config(&CalibrationConfig::default(), true)
    }

    #[test]
    fn test_relative_transform_is_log_scaled() {
        let ft = default_transform();
        let scale = 20.0 / 1e6;
        let got = ft.transform(CoordinateAxis::Mz, 500.0).unwrap();
        assert!((got - 500.0f64.ln() / scale).abs() < 1e-9);
    }

    #[test]
    fn test_relative_transform_zero_for_nonpositive() {
        let ft = default_transform();
        assert_eq!(ft.transform(CoordinateAxis::Mz, 0.0).unwrap(), 0.0);
        assert_eq!(ft.transform(CoordinateAxis::Mz, -3.0).unwrap(), 0.0);
    }

    #[test]
    fn test_absolute_transform_is_plain_scaling() {
        let ft = default_transform();
        let got = ft.transform(CoordinateAxis::Rt, 12.5).unwrap();
        assert!((got - 25.0).abs() < 1e-12);
    }

    #[test]
    fn test_unregistered_axis_is_a_config_error() {
        let ft = FeatureTransform::from_config(&CalibrationConfig::default(), false);
        let err = ft.transform(CoordinateAxis::Mobility, 1.0);
        assert!(matches!(
            err,
            Err(ConfigError::UnknownTransformAxis { axis: "mobility" })
        ));
    }
}
