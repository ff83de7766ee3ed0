use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Transient stability screening with the Extended Equal Area Criterion", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a tree on one or more fault cases
    Run(RunArgs),
    /// Check a tree document and report every structural issue
    Validate {
        /// Execution tree (JSON)
        #[arg(long, value_hint = ValueHint::FilePath)]
        tree: PathBuf,
    },
    /// Reduce a bus-level case onto the generator internal nodes
    Reduce {
        /// Bus-level case (JSON)
        #[arg(long, value_hint = ValueHint::FilePath)]
        case: PathBuf,
        /// Snapshot to write (JSON)
        #[arg(long, value_hint = ValueHint::FilePath)]
        out: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Execution tree (JSON)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub tree: PathBuf,

    /// Network snapshot of a fault case; the file stem names the fault
    #[arg(long = "network", value_hint = ValueHint::FilePath)]
    pub networks: Vec<PathBuf>,

    /// Bus-level case, reduced before execution; the file stem names the fault
    #[arg(long = "case", value_hint = ValueHint::FilePath)]
    pub cases: Vec<PathBuf>,

    /// Worker threads (0 = all CPUs)
    #[arg(long, default_value_t = 0)]
    pub cores: usize,

    /// Directory receiving per-fault reports and the fault summary
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,

    /// Fault summary path, overriding the one in the output directory
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub json_results: Option<PathBuf>,

    /// Tolerated islanded production (MW)
    #[arg(long, default_value_t = 0.0)]
    pub island_threshold: f64,

    /// Report any failed candidate as a failure of the whole fault
    #[arg(long)]
    pub warn: bool,

    /// Allow writing into an existing output directory
    #[arg(long)]
    pub rewrite: bool,

    /// Log the displayed node reports
    #[arg(short, long)]
    pub verbose: bool,
}
