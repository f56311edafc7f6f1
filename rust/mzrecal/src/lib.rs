pub mod alignment;
pub mod config;
pub mod errors;
pub mod ml;
pub mod models;
pub mod output;
pub mod precursor;
pub mod targets;
pub mod transform;
pub mod utils;
pub mod worker;
extern crate parquet;
#[macro_use]
extern crate parquet_derive;

pub use config::RecalConfig;
pub use errors::{
    FailureKind,
    MzRecalError,
    RunFailure,
};
pub use models::{
    DatabaseArrays,
    RunData,
};
pub use targets::{
    TargetTable,
    extract_targets,
};
pub use worker::{
    RunCalibration,
    calibrate_fragments,
    calibrate_run,
};
