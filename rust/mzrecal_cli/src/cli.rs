use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Path to the database mass file (will over-write the config file)
    #[arg(short, long)]
    pub database_file: Option<PathBuf>,

    /// Run files to calibrate (will over-write the config file)
    #[arg(short, long)]
    pub run_file: Vec<PathBuf>,

    /// Path to the output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Skip the cached target table and rebuild it from the database
    #[arg(long)]
    pub rebuild_targets: bool,
}
