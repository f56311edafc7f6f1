//! Data contracts consumed and produced by the recalibration stage.
//!
//! Everything here is read-only for the duration of one run's
//! calibration; the persistence layer that fills these in and writes
//! the outputs back lives outside this crate.

use crate::errors::DataProcessingError;
use serde::{
    Deserialize,
    Serialize,
};

/// One confidently-identified PSM used to train the precursor model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CalibrationSample {
    /// Precursor m/z.
    pub mz: f64,
    /// Retention time in minutes.
    pub rt: f64,
    /// Ion mobility, when the instrument has that dimension.
    pub mobility: Option<f64>,
    /// Observed precursor mass error in ppm.
    pub o_mass_ppm: f64,
}

/// A detected MS1 feature awaiting mass correction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub mz_matched: f64,
    pub rt_matched: f64,
    pub mobility_matched: Option<f64>,
    /// The uncorrected matched mass. Calibration produces one corrected
    /// mass per record, parallel to this value.
    pub mass_matched: f64,
}

/// One matched fragment ion: theoretical vs observed mass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FragmentIonMatch {
    pub db_mass: f64,
    pub ion_mass: f64,
}

/// The MS2 scans of one run, fragments flattened with per-scan offsets.
///
/// `scan_offsets` has one more entry than `rt_list`; scan `i` owns the
/// fragment masses in `mass_list[scan_offsets[i]..scan_offsets[i + 1]]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ms2ScanArrays {
    pub rt_list: Vec<f64>,
    pub scan_offsets: Vec<usize>,
    pub mass_list: Vec<f64>,
}

impl Ms2ScanArrays {
    pub fn num_scans(&self) -> usize {
        self.rt_list.len()
    }

    pub fn num_fragments(&self) -> usize {
        self.mass_list.len()
    }

    /// Checks the flattened-layout invariants before any slicing: one
    /// more offset than scans, non-decreasing offsets, and a final
    /// offset covering exactly the fragment list. Run files are
    /// externally supplied, so a malformed index must surface as an
    /// error rather than an out-of-bounds panic.
    pub fn validate(&self) -> Result<(), DataProcessingError> {
        if self.rt_list.is_empty() && self.scan_offsets.is_empty() && self.mass_list.is_empty() {
            return Ok(());
        }
        if self.scan_offsets.len() != self.rt_list.len() + 1 {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: self.rt_list.len() + 1,
                other: self.scan_offsets.len(),
                context: "MS2 scan offsets vs retention times".to_string(),
            });
        }
        if self.scan_offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(DataProcessingError::ExpectedSortedData {
                context: "MS2 scan offsets must be non-decreasing".to_string(),
            });
        }
        let last = self.scan_offsets.last().copied().unwrap_or(0);
        if last != self.mass_list.len() {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: self.mass_list.len(),
                other: last,
                context: "final MS2 scan offset vs fragment list".to_string(),
            });
        }
        Ok(())
    }
}

/// Everything the calibration stage needs to know about one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunData {
    /// Identifier used when reporting this run's outcome upward.
    pub run_id: String,
    /// Confidence-filtered PSMs. May be empty when no search has been
    /// run yet; precursor calibration is then skipped.
    pub psms: Vec<CalibrationSample>,
    /// Detected MS1 features to correct.
    pub features: Vec<FeatureRecord>,
    /// Matched fragment ions. May be empty; fragment calibration is
    /// then skipped.
    pub fragment_matches: Vec<FragmentIonMatch>,
    /// Raw MS2 scan data for target alignment.
    pub ms2_scans: Ms2ScanArrays,
    /// Per-scan fragment offsets left behind by a previous calibration
    /// pass, if any.
    pub corrected_fragment_mzs: Option<Vec<f64>>,
}

/// Theoretical mass arrays exposed by a peptide database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseArrays {
    pub precursor_masses: Vec<f64>,
    pub fragment_masses: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_arrays_validate_accepts_well_formed() {
        let scans = Ms2ScanArrays {
            rt_list: vec![0.5, 1.5],
            scan_offsets: vec![0, 2, 3],
            mass_list: vec![300.0, 400.0, 500.0],
        };
        assert!(scans.validate().is_ok());
        assert!(Ms2ScanArrays::default().validate().is_ok());
    }

    #[test]
    fn test_scan_arrays_validate_rejects_short_offsets() {
        let scans = Ms2ScanArrays {
            rt_list: vec![0.5, 1.5, 2.5],
            scan_offsets: vec![0, 2],
            mass_list: vec![300.0; 6],
        };
        assert!(matches!(
            scans.validate(),
            Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: 4,
                other: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_scan_arrays_validate_rejects_decreasing_offsets() {
        let scans = Ms2ScanArrays {
            rt_list: vec![0.5, 1.5],
            scan_offsets: vec![0, 3, 2],
            mass_list: vec![300.0, 400.0],
        };
        assert!(matches!(
            scans.validate(),
            Err(DataProcessingError::ExpectedSortedData { .. })
        ));
    }

    #[test]
    fn test_scan_arrays_validate_rejects_offset_past_fragments() {
        let scans = Ms2ScanArrays {
            rt_list: vec![0.5],
            scan_offsets: vec![0, 5],
            mass_list: vec![300.0, 400.0],
        };
        assert!(matches!(
            scans.validate(),
            Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: 2,
                other: 5,
                ..
            })
        ));
    }
}
