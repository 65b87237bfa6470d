use crate::cgto::{ContractedShell, ElementBasis};
use crate::error::{BasisError, Result};
use crate::spherical::cart2sph;
use nalgebra::{DMatrix, Vector3};
use std::collections::HashMap;

/// A contracted shell placed on an atom, with coefficients already folded
/// with primitive and contraction normalization.
#[derive(Debug, Clone)]
pub struct Shell {
    pub l: usize,
    pub atom: usize,
    pub center: Vector3<f64>,
    pub exponents: Vec<f64>,
    // coefficients[contraction][primitive]
    pub coefficients: Vec<Vec<f64>>,
}

impl Shell {
    pub fn from_contracted(shell: &ContractedShell, atom: usize, center: Vector3<f64>) -> Self {
        Shell {
            l: shell.l,
            atom,
            center,
            exponents: shell.exponents.clone(),
            coefficients: shell.normalized_coefficients(),
        }
    }

    pub fn nctr(&self) -> usize {
        self.coefficients.len()
    }

    pub fn nsph(&self) -> usize {
        self.nctr() * (2 * self.l + 1)
    }
}

/// Spherical AO basis of a molecule. Nuclear charges live here as well so
/// that the nuclear attraction type integrals need nothing else.
#[derive(Debug, Clone)]
pub struct MolecularBasis {
    pub shells: Vec<Shell>,
    pub ao_offsets: Vec<usize>,
    pub charges: Vec<f64>,
    pub coords: Vec<Vector3<f64>>,
    pub c2s: Vec<DMatrix<f64>>,
    nao: usize,
}

impl MolecularBasis {
    /// Place element basis sets on atoms given as (symbol, charge, position in bohr).
    pub fn build(
        atoms: &[(String, f64, Vector3<f64>)],
        basis_map: &HashMap<String, ElementBasis>,
    ) -> Result<Self> {
        let mut shells = Vec::new();
        for (iatom, (symbol, _, center)) in atoms.iter().enumerate() {
            let element_basis = basis_map
                .get(symbol)
                .ok_or_else(|| BasisError::MissingElement(symbol.clone()))?;
            for shell in &element_basis.shells {
                shells.push(Shell::from_contracted(shell, iatom, *center));
            }
        }
        Ok(Self::from_shells(
            shells,
            atoms.iter().map(|a| a.1).collect(),
            atoms.iter().map(|a| a.2).collect(),
        ))
    }

    pub fn from_shells(shells: Vec<Shell>, charges: Vec<f64>, coords: Vec<Vector3<f64>>) -> Self {
        let mut ao_offsets = Vec::with_capacity(shells.len());
        let mut nao = 0;
        for shell in &shells {
            ao_offsets.push(nao);
            nao += shell.nsph();
        }
        let lmax = shells.iter().map(|s| s.l).max().unwrap_or(0);
        let c2s = (0..=lmax).map(cart2sph).collect();
        MolecularBasis {
            shells,
            ao_offsets,
            charges,
            coords,
            c2s,
            nao,
        }
    }

    pub fn nao(&self) -> usize {
        self.nao
    }

    pub fn natm(&self) -> usize {
        self.coords.len()
    }

    /// Uncontracted basis and the matrix C (nao_unc x nao) with
    /// |contracted> = sum |primitive> C.
    ///
    /// Primitives repeated across shells of the same atom and angular
    /// momentum are kept once.
    pub fn uncontract(&self) -> (MolecularBasis, DMatrix<f64>) {
        let mut shells: Vec<Shell> = Vec::new();
        let mut seen: HashMap<(usize, usize, u64), usize> = HashMap::new();
        // for every contracted shell, the uncontracted shell index of each primitive
        let mut prim_map: Vec<Vec<usize>> = Vec::with_capacity(self.shells.len());
        for shell in &self.shells {
            let mut indices = Vec::with_capacity(shell.exponents.len());
            for &a in &shell.exponents {
                let key = (shell.atom, shell.l, a.to_bits());
                let idx = *seen.entry(key).or_insert_with(|| {
                    let unc = ContractedShell {
                        l: shell.l,
                        exponents: vec![a],
                        coefficients: vec![vec![1.0]],
                    };
                    shells.push(Shell::from_contracted(&unc, shell.atom, shell.center));
                    shells.len() - 1
                });
                indices.push(idx);
            }
            prim_map.push(indices);
        }
        let unc = MolecularBasis::from_shells(shells, self.charges.clone(), self.coords.clone());

        let mut contraction = DMatrix::zeros(unc.nao(), self.nao());
        for (ishell, shell) in self.shells.iter().enumerate() {
            let nm = 2 * shell.l + 1;
            for (k, column) in shell.coefficients.iter().enumerate() {
                for (p, &c) in column.iter().enumerate() {
                    let iunc = prim_map[ishell][p];
                    // uncontracted primitives carry coefficient 1 / norm
                    let prim = unc.shells[iunc].coefficients[0][0];
                    for m in 0..nm {
                        let row = unc.ao_offsets[iunc] + m;
                        let col = self.ao_offsets[ishell] + k * nm + m;
                        contraction[(row, col)] += c / prim;
                    }
                }
            }
        }
        (unc, contraction)
    }

    /// Index ranges of AOs belonging to each atom.
    pub fn atom_ao_ranges(&self) -> Vec<std::ops::Range<usize>> {
        let mut ranges = vec![usize::MAX..0; self.natm()];
        for (shell, &off) in self.shells.iter().zip(&self.ao_offsets) {
            let r = &mut ranges[shell.atom];
            r.start = r.start.min(off);
            r.end = r.end.max(off + shell.nsph());
        }
        ranges
            .into_iter()
            .map(|r| if r.start == usize::MAX { 0..0 } else { r })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrals::overlap;

    #[test]
    fn test_uncontract_reproduces_overlap() {
        let shell = ContractedShell {
            l: 1,
            exponents: vec![5.0, 1.2, 0.3],
            coefficients: vec![vec![0.2, 0.5, 0.4], vec![0.0, -0.3, 1.0]],
        };
        let basis = MolecularBasis::from_shells(
            vec![Shell::from_contracted(&shell, 0, Vector3::zeros())],
            vec![6.0],
            vec![Vector3::zeros()],
        );
        let (unc, c) = basis.uncontract();
        assert_eq!(unc.nao(), 9);
        let s = overlap(&basis);
        let s_unc = overlap(&unc);
        let projected = c.transpose() * s_unc * &c;
        assert!((projected - &s).amax() < 1e-12);
        for i in 0..basis.nao() {
            assert!((s[(i, i)] - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_uncontract_merges_shared_primitives() {
        let general = ContractedShell {
            l: 0,
            exponents: vec![40.0, 6.0, 1.1, 0.25],
            coefficients: vec![vec![0.1, 0.4, 0.6, 0.1], vec![-0.05, -0.2, 0.3, 0.8]],
        };
        let single = ContractedShell {
            l: 0,
            exponents: vec![0.25],
            coefficients: vec![vec![1.0]],
        };
        let basis = MolecularBasis::from_shells(
            vec![
                Shell::from_contracted(&general, 0, Vector3::zeros()),
                Shell::from_contracted(&single, 0, Vector3::zeros()),
            ],
            vec![32.0],
            vec![Vector3::zeros()],
        );
        let (unc, c) = basis.uncontract();
        assert_eq!(unc.nao(), 4);
        let projected = c.transpose() * overlap(&unc) * &c;
        assert!((projected - overlap(&basis)).amax() < 1e-12);
    }
}
