//! Discovery of characteristic theoretical masses from a peptide
//! database.
//!
//! Database masses are histogrammed on a log10-ppm integer grid,
//! smoothed to the width of the expected measurement tolerance, and the
//! resulting peaks become alignment targets. The output table is dense,
//! indexed by integer dalton, and mostly zero; building it is the
//! expensive global step, so it is done once per database and shared
//! read-only across runs.

use crate::config::TargetExtractionConfig;
use crate::errors::{
    ConfigError,
    DataProcessingError,
    Result,
};
use crate::models::DatabaseArrays;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::info;

/// Dense array of accepted target masses indexed by integer dalton.
///
/// A non-zero entry at index `i` means a characteristic theoretical
/// mass near `i` Da exists at that sub-dalton value. Never mutated
/// after construction; share it across workers behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetTable {
    masses: Vec<f64>,
}

impl TargetTable {
    pub fn len(&self) -> usize {
        self.masses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }

    /// Target mass stored at an integer dalton bucket, or 0 when the
    /// bucket is empty. Out-of-range buckets behave as zero padding so
    /// lookups never go out of bounds.
    pub fn get(&self, bucket: i64) -> f64 {
        if bucket < 0 {
            return 0.0;
        }
        self.masses.get(bucket as usize).copied().unwrap_or(0.0)
    }

    /// Iterates the accepted (bucket, mass) entries.
    pub fn iter_targets(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.masses
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, m)| *m != 0.0)
    }

    pub fn num_targets(&self) -> usize {
        self.iter_targets().count()
    }
}

/// Histogram of truncated `log10(mass) * 1e6` keys over finite,
/// positive masses, padded with `pad` trailing zeros so the smoothed
/// peak of the largest mass still has a falling edge. Masses below
/// 1 Da would produce negative keys and are skipped.
fn log_ppm_histogram(masses: &[f64], pad: usize) -> Vec<u64> {
    let keys: Vec<usize> = masses
        .iter()
        .filter(|m| m.is_finite() && **m > 0.0)
        .map(|m| m.log10() * 1e6)
        .filter(|k| *k >= 0.0)
        .map(|k| k as usize)
        .collect();
    let max_key = match keys.iter().max() {
        Some(x) => *x,
        None => return Vec::new(),
    };
    let mut counts = vec![0u64; max_key + 1 + pad];
    for k in keys {
        counts[k] += 1;
    }
    counts
}

/// Symmetric moving sum of half-width `max_ppm`: every count is spread
/// across `max_ppm - 1` samples on both sides, turning isolated masses
/// into peaks whose width matches the measurement tolerance. Computed
/// as a box filter over prefix sums.
fn smooth_histogram(counts: &[u64], max_ppm: usize) -> Vec<u64> {
    let n = counts.len();
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0u64);
    let mut acc = 0u64;
    for c in counts {
        acc += c;
        prefix.push(acc);
    }
    (0..n)
        .map(|i| {
            let lower = i.saturating_sub(max_ppm.saturating_sub(1));
            let upper = (i + max_ppm).min(n);
            prefix[upper] - prefix[lower]
        })
        .collect()
}

/// 1-D local-maxima detection with a minimum peak separation.
///
/// Plateaus count as a single peak at their midpoint. When two peaks
/// are closer than `distance` samples, the taller one wins.
fn find_peaks(values: &[u64], distance: usize) -> Vec<usize> {
    let n = values.len();
    let mut peaks: Vec<usize> = Vec::new();
    let mut i = 1usize;
    while n >= 3 && i < n - 1 {
        if values[i - 1] < values[i] {
            // Walk to the end of a potential plateau.
            let mut ahead = i + 1;
            while ahead < n - 1 && values[ahead] == values[i] {
                ahead += 1;
            }
            if values[ahead] < values[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            } else {
                i = ahead;
            }
        } else {
            i += 1;
        }
    }

    if distance <= 1 || peaks.len() < 2 {
        return peaks;
    }

    // Highest-priority-first suppression of close neighbors.
    let mut keep = vec![true; peaks.len()];
    let mut priority: Vec<usize> = (0..peaks.len()).collect();
    priority.sort_unstable_by_key(|&j| values[peaks[j]]);
    for &j in priority.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 {
            k -= 1;
            if peaks[j] - peaks[k] >= distance {
                break;
            }
            keep[k] = false;
        }
        let mut k = j + 1;
        while k < peaks.len() {
            if peaks[k] - peaks[j] >= distance {
                break;
            }
            keep[k] = false;
            k += 1;
        }
    }
    peaks
        .into_iter()
        .zip(keep)
        .filter_map(|(p, kept)| kept.then_some(p))
        .collect()
}

/// Derives the sparse target table for one mass array.
pub fn extract_targets_from_masses(
    masses: &[f64],
    config: &TargetExtractionConfig,
) -> Result<TargetTable> {
    let counts = log_ppm_histogram(masses, config.max_ppm);
    if counts.is_empty() {
        return Err(DataProcessingError::ExpectedNonEmptyData {
            context: Some("no finite positive masses to extract targets from".to_string()),
        }
        .into());
    }
    let smoothed = smooth_histogram(&counts, config.max_ppm);
    let peaks = find_peaks(&smoothed, config.max_ppm);
    if peaks.is_empty() {
        return Err(DataProcessingError::ExpectedNonEmptyData {
            context: Some("no peaks found in the smoothed mass histogram".to_string()),
        }
        .into());
    }
    let target_masses: Vec<f64> = peaks.iter().map(|k| 10f64.powf(*k as f64 / 1e6)).collect();

    // Walk the peaks in increasing mass order and keep a target only if
    // it falls into a fresh integer-dalton bucket at least min_distance
    // away from the previously accepted mass. Anything closer would
    // collide with its neighbor during the three-bucket alignment
    // lookup.
    let last_mass = *target_masses.last().unwrap();
    let mut table = vec![0.0f64; last_mass as usize + 1];
    let mut last_accepted_bucket: i64 = -1;
    let mut last_accepted: f64 = f64::NEG_INFINITY;
    for mass in target_masses {
        let bucket = mass as i64;
        if bucket != last_accepted_bucket && mass - last_accepted >= config.min_distance {
            table[bucket as usize] = mass;
            last_accepted_bucket = bucket;
            last_accepted = mass;
        }
    }

    let table = TargetTable { masses: table };
    info!(
        "Extracted {} alignment targets from {} database masses",
        table.num_targets(),
        masses.len()
    );
    Ok(table)
}

/// Derives the target table for the requested MS level of a database.
///
/// Level 1 uses precursor masses, level 2 fragment masses; anything
/// else is a configuration error.
pub fn extract_targets(
    database: &DatabaseArrays,
    config: &TargetExtractionConfig,
    ms_level: u8,
) -> Result<TargetTable> {
    let masses = match ms_level {
        1 => &database.precursor_masses,
        2 => &database.fragment_masses,
        level => return Err(ConfigError::InvalidMsLevel { level }.into()),
    };
    extract_targets_from_masses(masses, config)
}
