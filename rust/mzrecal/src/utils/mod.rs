pub mod stats;

pub use stats::{
    median,
    std_dev,
    std_dev_sample,
};
