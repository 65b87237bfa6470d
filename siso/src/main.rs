//! Spin-orbit term splitting benchmark
//!
//! Runs the built-in germanium calculation, or the one described by a YAML file.

use color_eyre::eyre::Result;
use siso::app::SisoApplication;

fn main() -> Result<()> {
    color_eyre::install()?;
    SisoApplication::from_cli()?.run()
}
