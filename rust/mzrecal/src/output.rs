//! Row types and writers for the calibrated outputs.
//!
//! The persistence layer proper lives outside this crate; what is here
//! is the flat record shape plus a buffered parquet writer for the
//! corrected feature table.

use crate::models::FeatureRecord;
use crate::worker::RunCalibration;
use parquet::file::writer::SerializedFileWriter;
use parquet::record::RecordWriter;
use serde::Serialize;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// One corrected feature, flattened for columnar output.
#[derive(Debug, Clone, Serialize, ParquetRecordWriter)]
pub struct CorrectedFeatureRow {
    pub run_id: String,
    pub mz_matched: f64,
    pub rt_matched: f64,
    pub mobility_matched: Option<f64>,
    pub mass_matched: f64,
    pub corrected_mass: f64,
}

impl CorrectedFeatureRow {
    pub fn from_calibration(
        run_id: &str,
        features: &[FeatureRecord],
        calibration: &RunCalibration,
    ) -> Vec<Self> {
        features
            .iter()
            .zip(calibration.corrected_masses.iter())
            .map(|(f, corrected)| Self {
                run_id: run_id.to_string(),
                mz_matched: f.mz_matched,
                rt_matched: f.rt_matched,
                mobility_matched: f.mobility_matched,
                mass_matched: f.mass_matched,
                corrected_mass: *corrected,
            })
            .collect()
    }
}

pub struct FeatureParquetWriter {
    row_group_size: usize,
    writer: SerializedFileWriter<File>,
    buffer: Vec<CorrectedFeatureRow>,
}

impl FeatureParquetWriter {
    pub fn new(out_path: impl AsRef<Path>, row_group_size: usize) -> Result<Self, std::io::Error> {
        let file = match File::create_new(out_path.as_ref()) {
            Ok(file) => file,
            Err(err) => {
                tracing::error!(
                    "Failed to open file {:?} with error: {}",
                    out_path.as_ref(),
                    err
                );
                return Err(err);
            }
        };
        let rows: &[CorrectedFeatureRow] = &[];
        let schema = rows.schema().unwrap();
        let writer = SerializedFileWriter::new(file, schema, Default::default()).unwrap();
        Ok(Self {
            buffer: Vec::with_capacity(row_group_size),
            writer,
            row_group_size,
        })
    }

    fn flush_to_file(&mut self) {
        debug!("Flushing {} corrected features to file", self.buffer.len());
        let mut row_group = self.writer.next_row_group().unwrap();
        self.buffer
            .as_slice()
            .write_to_row_group(&mut row_group)
            .unwrap();
        row_group.close().unwrap();
        self.buffer.clear();
    }

    pub fn add(&mut self, row: CorrectedFeatureRow) {
        self.buffer.push(row);
        if self.buffer.len() >= self.row_group_size {
            self.flush_to_file();
        }
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = CorrectedFeatureRow>) {
        for row in rows {
            self.add(row);
        }
    }

    pub fn close(mut self) {
        if !self.buffer.is_empty() {
            self.flush_to_file();
        }
        self.writer.close().unwrap();
    }
}
