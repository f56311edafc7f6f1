use mzrecal::RecalConfig;
use serde::{
    Deserialize,
    Serialize,
};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// JSON file with the database's precursor and fragment mass arrays.
    pub database_file: Option<PathBuf>,
    /// JSON run files, one per analytical run.
    #[serde(default)]
    pub run_files: Vec<PathBuf>,
    #[serde(default)]
    pub recalibration: RecalConfig,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    pub directory: PathBuf,
}
