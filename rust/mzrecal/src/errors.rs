use serde::{
    Deserialize,
    Serialize,
};
use std::path::PathBuf;

#[derive(Debug)]
pub enum DataProcessingError {
    ExpectedSlicesSameLength {
        expected: usize,
        other: usize,
        context: String,
    },
    ExpectedNonEmptyData {
        context: Option<String>,
    },
    ExpectedFiniteData {
        context: String,
    },
    ExpectedSortedData {
        context: String,
    },
    NotEnoughNeighbors {
        requested: usize,
        available: usize,
    },
}

#[derive(Debug)]
pub enum ConfigError {
    UnknownTransformAxis {
        axis: &'static str,
    },
    InvalidMsLevel {
        level: u8,
    },
    InvalidParameter {
        parameter: &'static str,
        msg: String,
    },
}

#[derive(Debug)]
pub enum MzRecalError {
    Config(ConfigError),
    DataProcessing(DataProcessingError),
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },
    ParseError {
        msg: String,
    },
}

impl std::fmt::Display for MzRecalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, MzRecalError>;

impl From<ConfigError> for MzRecalError {
    fn from(x: ConfigError) -> Self {
        Self::Config(x)
    }
}

impl From<DataProcessingError> for MzRecalError {
    fn from(x: DataProcessingError) -> Self {
        Self::DataProcessing(x)
    }
}

impl From<serde_json::Error> for MzRecalError {
    fn from(val: serde_json::Error) -> Self {
        MzRecalError::ParseError {
            msg: val.to_string(),
        }
    }
}

/// Tag for a calibration failure on one run.
///
/// Per-run failures are reported to the supervisor as data rather than
/// propagated as panics, so sibling runs keep processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    InvalidConfiguration,
    DataProcessing,
    Io,
}

/// A failed calibration for one run, carrying the run identifier so the
/// supervisor can mark that file and move on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl RunFailure {
    pub fn from_error(error: MzRecalError) -> Self {
        let kind = match &error {
            MzRecalError::Config(_) => FailureKind::InvalidConfiguration,
            MzRecalError::DataProcessing(_) => FailureKind::DataProcessing,
            MzRecalError::Io { .. } => FailureKind::Io,
            MzRecalError::ParseError { .. } => FailureKind::DataProcessing,
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

impl From<MzRecalError> for RunFailure {
    fn from(x: MzRecalError) -> Self {
        Self::from_error(x)
    }
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}
