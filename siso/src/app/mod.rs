mod basis;
mod report;
mod runner;
mod states;

pub use basis::{BasisLoader, BasisMap, BasisRegistry, FileBasisLoader};
pub use report::{format_term_line, splittings_cm, term_energies, AU2CM};
pub use runner::{run_benchmark, BenchmarkResult};
pub use states::build_state_descriptors;

use crate::config::{Args, Config};
use crate::io::setup_output;
use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use std::fs;
use tracing::info;

pub struct SisoApplication {
    args: Args,
    config: Config,
}

impl SisoApplication {
    pub fn from_cli() -> Result<Self> {
        let args = Args::parse();
        let config = load_config(&args)?;
        Ok(Self { args, config })
    }

    pub fn run(self) -> Result<()> {
        setup_output(
            self.args.output.as_ref(),
            self.config.molecule.verbose.unwrap_or(3),
        );
        self.config
            .validate()
            .wrap_err("Inconsistent benchmark configuration")?;

        let loader = FileBasisLoader::new(&self.args.basis_dir, &self.args.cache_dir);
        let mut registry = BasisRegistry::new(loader);
        let result = run_benchmark(&self.config, &mut registry)?;
        info!(
            "Benchmark finished: {} spin-orbit states, {} term splittings",
            result.so_energies.len(),
            result.splittings.len()
        );
        Ok(())
    }
}

/// Read the YAML file when one is given, otherwise use the built-in
/// germanium benchmark; then apply command-line overrides.
fn load_config(args: &Args) -> Result<Config> {
    let config = match &args.config_file {
        Some(path) => {
            let config_content = fs::read_to_string(path)
                .wrap_err_with(|| format!("Unable to read configuration file: {}", path))?;
            serde_yml::from_str::<Config>(&config_content)
                .wrap_err("Failed to parse configuration file")?
        }
        None => Config::default(),
    };
    Ok(apply_overrides(config.with_defaults(), args))
}

fn apply_overrides(mut config: Config, args: &Args) -> Config {
    if let Some(basis) = &args.basis {
        config.molecule.basis = Some(basis.clone());
    }
    if let Some(tol) = args.conv_tol {
        config.scf.conv_tol = Some(tol);
    }
    if let Some(max_cycle) = args.max_cycle {
        config.scf.max_cycle = Some(max_cycle);
    }
    if let Some(verbose) = args.verbose {
        config.molecule.verbose = Some(verbose);
    }
    config
}
