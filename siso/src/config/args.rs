//! Command-line argument parsing for the spin-orbit benchmark

use clap::Parser;

/// State-averaged CASSCF with spin-orbit state interaction
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file (default: built-in germanium benchmark)
    #[arg(short, long)]
    pub config_file: Option<String>,

    /// Override output file: (default stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Override the basis set name
    #[arg(long)]
    pub basis: Option<String>,

    /// Override SCF convergence threshold
    #[arg(long)]
    pub conv_tol: Option<f64>,

    /// Override maximum SCF cycles
    #[arg(long)]
    pub max_cycle: Option<usize>,

    /// Directory searched for <basis>.<element>.nwchem files
    #[arg(long, default_value = "tests/basis_sets")]
    pub basis_dir: String,

    /// Directory holding pickled basis sets fetched from the Basis Set Exchange
    #[arg(long, default_value = "basis_cache")]
    pub cache_dir: String,

    /// Override verbosity (<=2 warn, 3 info, 4 debug, >=5 trace)
    #[arg(short, long)]
    pub verbose: Option<usize>,
}
