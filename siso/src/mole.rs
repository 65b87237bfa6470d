//! Molecule specification

use crate::config::MoleculeParams;
use basis::cgto::ElementBasis;
use basis::integrals::nuclear_repulsion;
use basis::MolecularBasis;
use color_eyre::eyre::{bail, eyre, Result, WrapErr};
use nalgebra::Vector3;
use periodic_table_on_an_enum::Element;
use std::collections::HashMap;

pub const BOHR_PER_ANGSTROM: f64 = 1.0 / 0.52917721092;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LengthUnit {
    Angstrom,
    Bohr,
}

impl LengthUnit {
    pub fn parse(unit: &str) -> Result<Self> {
        match unit.to_lowercase().as_str() {
            "angstrom" | "a" | "ang" => Ok(LengthUnit::Angstrom),
            "bohr" | "b" | "au" => Ok(LengthUnit::Bohr),
            other => Err(eyre!("Unknown length unit '{}'", other)),
        }
    }

    fn to_bohr(self) -> f64 {
        match self {
            LengthUnit::Angstrom => BOHR_PER_ANGSTROM,
            LengthUnit::Bohr => 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MolAtom {
    pub element: Element,
    /// position in bohr
    pub coord: Vector3<f64>,
}

/// Atoms, charge and spin of the system. Immutable once built.
#[derive(Debug, Clone)]
pub struct Molecule {
    pub atoms: Vec<MolAtom>,
    pub basis: String,
    pub unit: LengthUnit,
    /// 2S = N(alpha) - N(beta)
    pub spin: i32,
    pub charge: i32,
    pub symmetry: bool,
    pub verbose: usize,
}

impl Molecule {
    pub fn new(
        atoms: &[(&str, [f64; 3])],
        unit: LengthUnit,
        basis: &str,
        charge: i32,
        spin: i32,
    ) -> Result<Self> {
        let scale = unit.to_bohr();
        let atoms = atoms
            .iter()
            .map(|(symbol, xyz)| {
                let element = Element::from_symbol(symbol)
                    .ok_or_else(|| eyre!("Unknown element symbol '{}'", symbol))?;
                Ok(MolAtom {
                    element,
                    coord: Vector3::new(xyz[0], xyz[1], xyz[2]) * scale,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if atoms.is_empty() {
            bail!("Molecule has no atoms");
        }
        let mol = Molecule {
            atoms,
            basis: basis.to_string(),
            unit,
            spin,
            charge,
            symmetry: false,
            verbose: 3,
        };
        mol.nelec()?;
        Ok(mol)
    }

    pub fn from_config(params: &MoleculeParams) -> Result<Self> {
        let unit = LengthUnit::parse(params.unit.as_deref().unwrap_or("angstrom"))?;
        let atoms: Vec<(&str, [f64; 3])> = params
            .atoms
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .map(|a| (a.element.as_str(), a.coords))
            .collect();
        let mut mol = Molecule::new(
            &atoms,
            unit,
            params.basis.as_deref().unwrap_or("ccpvtz-dk"),
            params.charge.unwrap_or(0),
            params.spin.unwrap_or(0),
        )
        .wrap_err("Invalid molecule specification")?;
        mol.symmetry = params.symmetry.unwrap_or(false);
        mol.verbose = params.verbose.unwrap_or(3);
        Ok(mol)
    }

    pub fn natm(&self) -> usize {
        self.atoms.len()
    }

    pub fn charges(&self) -> Vec<f64> {
        self.atoms
            .iter()
            .map(|a| a.element.get_atomic_number() as f64)
            .collect()
    }

    pub fn coords(&self) -> Vec<Vector3<f64>> {
        self.atoms.iter().map(|a| a.coord).collect()
    }

    pub fn nelectron(&self) -> Result<usize> {
        let nuclear: i64 = self
            .atoms
            .iter()
            .map(|a| a.element.get_atomic_number() as i64)
            .sum();
        let n = nuclear - self.charge as i64;
        if n < 0 {
            bail!("Charge {} leaves a negative electron count", self.charge);
        }
        Ok(n as usize)
    }

    /// (N(alpha), N(beta))
    pub fn nelec(&self) -> Result<(usize, usize)> {
        let n = self.nelectron()? as i64;
        let spin = self.spin as i64;
        if (n - spin) % 2 != 0 || spin.abs() > n {
            bail!(
                "Electron number {} and spin {} are not consistent",
                n,
                self.spin
            );
        }
        Ok((((n + spin) / 2) as usize, ((n - spin) / 2) as usize))
    }

    pub fn energy_nuc(&self) -> f64 {
        nuclear_repulsion(&self.charges(), &self.coords())
    }

    /// Unique element symbols in order of first appearance.
    pub fn unique_symbols(&self) -> Vec<&'static str> {
        let mut symbols: Vec<&'static str> = Vec::new();
        for atom in &self.atoms {
            let s = atom.element.get_symbol();
            if !symbols.contains(&s) {
                symbols.push(s);
            }
        }
        symbols
    }

    /// Place the per-element basis sets on the atoms.
    pub fn build_basis(&self, basis_map: &HashMap<String, ElementBasis>) -> Result<MolecularBasis> {
        let atoms: Vec<(String, f64, Vector3<f64>)> = self
            .atoms
            .iter()
            .map(|a| {
                (
                    a.element.get_symbol().to_string(),
                    a.element.get_atomic_number() as f64,
                    a.coord,
                )
            })
            .collect();
        MolecularBasis::build(&atoms, basis_map).wrap_err("Failed to place basis functions")
    }
}
