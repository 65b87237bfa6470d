use crate::config::TermLine;
use color_eyre::eyre::{bail, Result};

/// Hartree to wavenumbers
pub const AU2CM: f64 = 219474.63;

/// Mean energy of each half-open index range [start, end)
pub fn term_energies(energies: &[f64], groups: &[[usize; 2]]) -> Result<Vec<f64>> {
    groups
        .iter()
        .map(|&[start, end]| {
            if start >= end || end > energies.len() {
                bail!(
                    "term range [{}, {}) is empty or exceeds the {} spin-orbit states",
                    start,
                    end,
                    energies.len()
                );
            }
            let slice = &energies[start..end];
            Ok(slice.iter().sum::<f64>() / slice.len() as f64)
        })
        .collect()
}

/// (e_i - e_0) in cm-1 for every term after the first
pub fn splittings_cm(terms: &[f64]) -> Vec<f64> {
    match terms.split_first() {
        Some((e0, rest)) => rest.iter().map(|e| (e - e0) * AU2CM).collect(),
        None => Vec::new(),
    }
}

pub fn format_term_line(line: &TermLine, value: f64) -> String {
    format!(
        "{} = {:10.4} cm-1    exp. = {:10.4} cm-1",
        line.label, value, line.reference
    )
}
