//! Small order-statistic helpers shared by the calibration stages.

/// Median of a slice, ignoring non-finite values.
///
/// Returns NaN for an empty (or all non-finite) slice, the average of
/// the two central values for an even count.
pub fn median(values: &[f64]) -> f64 {
    let mut finite: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    finite.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = finite.len() / 2;
    if finite.len() % 2 == 1 {
        finite[mid]
    } else {
        (finite[mid - 1] + finite[mid]) / 2.0
    }
}

/// Population standard deviation, ignoring non-finite values.
///
/// Returns NaN when no finite values are present.
pub fn std_dev(values: &[f64]) -> f64 {
    let mut count = 0usize;
    let mut sum = 0.0;
    for x in values.iter().filter(|x| x.is_finite()) {
        sum += x;
        count += 1;
    }
    if count == 0 {
        return f64::NAN;
    }
    let mean = sum / count as f64;
    let sqsum: f64 = values
        .iter()
        .filter(|x| x.is_finite())
        .map(|x| (x - mean).powi(2))
        .sum();
    (sqsum / count as f64).sqrt()
}

/// Sample standard deviation (ddof = 1), ignoring non-finite values.
///
/// Returns NaN with fewer than two finite values.
pub fn std_dev_sample(values: &[f64]) -> f64 {
    let mut count = 0usize;
    let mut sum = 0.0;
    for x in values.iter().filter(|x| x.is_finite()) {
        sum += x;
        count += 1;
    }
    if count < 2 {
        return f64::NAN;
    }
    let mean = sum / count as f64;
    let sqsum: f64 = values
        .iter()
        .filter(|x| x.is_finite())
        .map(|x| (x - mean).powi(2))
        .sum();
    (sqsum / (count - 1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
    }

    #[test]
    fn test_median_skips_non_finite() {
        assert_eq!(median(&[f64::NAN, 1.0, 3.0, f64::INFINITY]), 2.0);
        assert!(median(&[]).is_nan());
        assert!(median(&[f64::NAN]).is_nan());
    }

    #[test]
    fn test_std_dev() {
        // Population std of [2, 4, 4, 4, 5, 5, 7, 9] is exactly 2.
        let vals = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((std_dev(&vals) - 2.0).abs() < 1e-12);
        assert_eq!(std_dev(&[5.0]), 0.0);
        assert!(std_dev(&[]).is_nan());
    }

    #[test]
    fn test_std_dev_sample_uses_n_minus_one() {
        // Same data: sample variance is 32/7.
        let vals = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((std_dev_sample(&vals) - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert!(std_dev_sample(&[5.0]).is_nan());
        assert!(std_dev_sample(&[]).is_nan());
        assert_eq!(std_dev_sample(&[3.0, 3.0, 3.0]), 0.0);
    }
}
