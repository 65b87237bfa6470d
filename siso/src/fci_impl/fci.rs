//! Determinant full CI in an active space
//!
//! Determinants are pairs of alpha and beta occupation strings stored as bit
//! masks, with all alpha creation operators to the left of the beta ones.
//! A CI vector is a matrix c[(alpha string, beta string)].

extern crate nalgebra as na;

use basis::Tensor4;
use color_eyre::eyre::{bail, Result};
use itertools::Itertools;
use na::{DMatrix, DVector};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spin {
    Alpha,
    Beta,
}

/// Occupation strings of `nelec` electrons in `norb` orbitals, lowest orbital in bit 0.
pub fn make_strings(norb: usize, nelec: usize) -> Vec<u64> {
    (0..norb)
        .combinations(nelec)
        .map(|occ| occ.iter().fold(0u64, |s, &i| s | (1u64 << i)))
        .collect()
}

fn parity(bits: u64) -> f64 {
    if bits.count_ones() % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

fn below(orb: usize) -> u64 {
    (1u64 << orb) - 1
}

/// a+_p a_q |I> = sign |J> within one spin string
#[derive(Debug, Clone, Copy)]
struct Link {
    target: usize,
    p: usize,
    q: usize,
    sign: f64,
}

fn link_index(strings: &[u64], index: &HashMap<u64, usize>, norb: usize) -> Vec<Vec<Link>> {
    strings
        .iter()
        .map(|&s| {
            let mut links = Vec::new();
            for q in (0..norb).filter(|&q| s & (1 << q) != 0) {
                for p in 0..norb {
                    if p != q && s & (1 << p) != 0 {
                        continue;
                    }
                    let t = (s ^ (1 << q)) | (1 << p);
                    let (lo, hi) = if p < q { (p, q) } else { (q, p) };
                    let between = if hi > lo + 1 { s & below(hi) & !below(lo + 1) } else { 0 };
                    links.push(Link {
                        target: index[&t],
                        p,
                        q,
                        sign: parity(between),
                    });
                }
            }
            links
        })
        .collect()
}

/// E^sigma_pq |K> = sign |target> for one determinant K
#[derive(Debug, Clone, Copy)]
pub struct Excitation {
    pub target: usize,
    pub p: usize,
    pub q: usize,
    pub spin: Spin,
    pub sign: f64,
}

/// Determinant space of fixed (N(alpha), N(beta)).
#[derive(Debug, Clone)]
pub struct FciSpace {
    pub norb: usize,
    pub nelec: (usize, usize),
    alpha: Vec<u64>,
    beta: Vec<u64>,
    alpha_index: HashMap<u64, usize>,
    beta_index: HashMap<u64, usize>,
    alpha_links: Vec<Vec<Link>>,
    beta_links: Vec<Vec<Link>>,
}

impl FciSpace {
    pub fn new(norb: usize, nelec: (usize, usize)) -> Result<Self> {
        if norb > 63 {
            bail!("At most 63 active orbitals are supported, got {}", norb);
        }
        if nelec.0 > norb || nelec.1 > norb {
            bail!(
                "({}, {}) electrons do not fit in {} orbitals",
                nelec.0,
                nelec.1,
                norb
            );
        }
        let alpha = make_strings(norb, nelec.0);
        let beta = make_strings(norb, nelec.1);
        let alpha_index: HashMap<u64, usize> = alpha.iter().enumerate().map(|(i, &s)| (s, i)).collect();
        let beta_index: HashMap<u64, usize> = beta.iter().enumerate().map(|(i, &s)| (s, i)).collect();
        let alpha_links = link_index(&alpha, &alpha_index, norb);
        let beta_links = link_index(&beta, &beta_index, norb);
        Ok(FciSpace {
            norb,
            nelec,
            alpha,
            beta,
            alpha_index,
            beta_index,
            alpha_links,
            beta_links,
        })
    }

    /// (number of alpha strings, number of beta strings)
    pub fn shape(&self) -> (usize, usize) {
        (self.alpha.len(), self.beta.len())
    }

    pub fn ndet(&self) -> usize {
        self.alpha.len() * self.beta.len()
    }

    /// All single excitations E^sigma_pq acting on determinant `det`.
    pub fn excitations(&self, det: usize) -> Vec<Excitation> {
        let nb = self.beta.len();
        let (ia, ib) = (det / nb, det % nb);
        let alpha = self.alpha_links[ia].iter().map(|l| Excitation {
            target: l.target * nb + ib,
            p: l.p,
            q: l.q,
            spin: Spin::Alpha,
            sign: l.sign,
        });
        let beta = self.beta_links[ib].iter().map(|l| Excitation {
            target: ia * nb + l.target,
            p: l.p,
            q: l.q,
            spin: Spin::Beta,
            sign: l.sign,
        });
        alpha.chain(beta).collect()
    }

    pub fn flatten(&self, ci: &DMatrix<f64>) -> DVector<f64> {
        DVector::from_iterator(self.ndet(), ci.transpose().iter().copied())
    }

    pub fn unflatten(&self, v: &DVector<f64>) -> DMatrix<f64> {
        let (na, nb) = self.shape();
        DMatrix::from_row_slice(na, nb, v.as_slice())
    }

    fn check_shape(&self, ci: &DMatrix<f64>) -> Result<()> {
        if ci.shape() != self.shape() {
            bail!(
                "CI vector of shape {:?} does not match ({}, {}) electrons in {} orbitals {:?}",
                ci.shape(),
                self.nelec.0,
                self.nelec.1,
                self.norb,
                self.shape()
            );
        }
        Ok(())
    }

    /// Dense Hamiltonian sum_pq k_pq E_pq + 1/2 sum_pqrs (pq|rs) E_pq E_rs,
    /// with k_pq = h_pq - 1/2 sum_r (pr|rq).
    pub fn hamiltonian(&self, h1: &DMatrix<f64>, eri: &Tensor4) -> DMatrix<f64> {
        let n = self.norb;
        let k = DMatrix::from_fn(n, n, |p, q| {
            h1[(p, q)] - 0.5 * (0..n).map(|r| eri.get(p, r, r, q)).sum::<f64>()
        });
        let ndet = self.ndet();
        let mut h = DMatrix::zeros(ndet, ndet);
        for det in 0..ndet {
            let ex = self.excitations(det);
            // <I|E_pq|K> <K|E_rs|J>, where E_sr|K> = s2 |J>
            for a in &ex {
                h[(a.target, det)] += k[(a.p, a.q)] * a.sign;
                for b in &ex {
                    h[(a.target, b.target)] += 0.5 * eri.get(a.p, a.q, b.q, b.p) * a.sign * b.sign;
                }
            }
        }
        (&h + h.transpose()) * 0.5
    }

    /// v_pq = E_pq c, indexed v[p * norb + q]
    fn excited_vectors(&self, c: &DVector<f64>) -> Vec<DVector<f64>> {
        let n = self.norb;
        let mut v = vec![DVector::zeros(self.ndet()); n * n];
        for det in 0..self.ndet() {
            let ck = c[det];
            if ck == 0.0 {
                continue;
            }
            for e in self.excitations(det) {
                v[e.p * n + e.q][e.target] += e.sign * ck;
            }
        }
        v
    }

    /// Matrix of S+ = sum_p a+_{p alpha} a_{p beta}, mapping this space onto
    /// (N(alpha) + 1, N(beta) - 1). None when that space is empty.
    fn spin_raise_matrix(&self) -> Option<DMatrix<f64>> {
        let (na, nb) = self.nelec;
        if nb == 0 || na == self.norb {
            return None;
        }
        let target = FciSpace::new(self.norb, (na + 1, nb - 1)).ok()?;
        let mut s_plus = DMatrix::zeros(target.ndet(), self.ndet());
        for (from, to, sign) in raise_entries(self, &target, |p, q| p == q) {
            s_plus[(to, from)] += sign;
        }
        Some(s_plus)
    }

    /// Dense S^2 = S- S+ + Sz (Sz + 1)
    pub fn spin_square_matrix(&self) -> DMatrix<f64> {
        let sz = (self.nelec.0 as f64 - self.nelec.1 as f64) * 0.5;
        let diag = DMatrix::identity(self.ndet(), self.ndet()) * (sz * (sz + 1.0));
        match self.spin_raise_matrix() {
            Some(s_plus) => s_plus.transpose() * s_plus + diag,
            None => diag,
        }
    }
}

/// Nonzero elements of a+_{p alpha} a_{q beta} from `from` into `to`, filtered on (p, q):
/// yields (source det, target det, sign) and accumulates per orbital pair through `visit`.
fn raise_entries_with<F: FnMut(usize, usize, usize, usize, f64)>(
    from: &FciSpace,
    to: &FciSpace,
    mut visit: F,
) {
    let nb_from = from.beta.len();
    let nb_to = to.beta.len();
    for (ia, &a) in from.alpha.iter().enumerate() {
        for (ib, &b) in from.beta.iter().enumerate() {
            let source = ia * nb_from + ib;
            for q in (0..from.norb).filter(|&q| b & (1 << q) != 0) {
                // a_{q beta} passes every alpha creator
                let sign_q = parity(a) * parity(b & below(q));
                let b_new = b ^ (1 << q);
                for p in (0..from.norb).filter(|&p| a & (1 << p) == 0) {
                    let sign_p = parity(a & below(p));
                    let a_new = a | (1 << p);
                    let (Some(&ja), Some(&jb)) = (to.alpha_index.get(&a_new), to.beta_index.get(&b_new)) else {
                        continue;
                    };
                    visit(source, ja * nb_to + jb, p, q, sign_q * sign_p);
                }
            }
        }
    }
}

fn raise_entries(
    from: &FciSpace,
    to: &FciSpace,
    filter: impl Fn(usize, usize) -> bool,
) -> Vec<(usize, usize, f64)> {
    let mut entries = Vec::new();
    raise_entries_with(from, to, |source, target, p, q, sign| {
        if filter(p, q) {
            entries.push((source, target, sign));
        }
    });
    entries
}

/// Spin-summed one-particle density dm1[p,q] = <c|E_pq|c>.
pub fn make_rdm1(ci: &DMatrix<f64>, norb: usize, nelec: (usize, usize)) -> Result<DMatrix<f64>> {
    let space = FciSpace::new(norb, nelec)?;
    space.check_shape(ci)?;
    let c = space.flatten(ci);
    let v = space.excited_vectors(&c);
    Ok(DMatrix::from_fn(norb, norb, |p, q| c.dot(&v[p * norb + q])))
}

/// Spin-summed one- and two-particle densities, dm2[p,q,r,s] = <p+ r+ s q>.
pub fn make_rdm12(
    ci: &DMatrix<f64>,
    norb: usize,
    nelec: (usize, usize),
) -> Result<(DMatrix<f64>, Tensor4)> {
    let space = FciSpace::new(norb, nelec)?;
    space.check_shape(ci)?;
    let c = space.flatten(ci);
    let v = space.excited_vectors(&c);
    let dm1 = DMatrix::from_fn(norb, norb, |p, q| c.dot(&v[p * norb + q]));
    let mut dm2 = Tensor4::zeros([norb; 4]);
    for p in 0..norb {
        for q in 0..norb {
            for r in 0..norb {
                for s in 0..norb {
                    let mut val = v[q * norb + p].dot(&v[r * norb + s]);
                    if q == r {
                        val -= dm1[(p, s)];
                    }
                    dm2.set(p, q, r, s, val);
                }
            }
        }
    }
    Ok((dm1, dm2))
}

/// Spin-resolved transition densities <bra|a+_{p sigma} a_{q sigma}|ket> for
/// sigma = alpha and beta, both vectors in the same (N(alpha), N(beta)) space.
pub fn trans_rdm1s(
    bra: &DMatrix<f64>,
    ket: &DMatrix<f64>,
    norb: usize,
    nelec: (usize, usize),
) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
    let space = FciSpace::new(norb, nelec)?;
    space.check_shape(bra)?;
    space.check_shape(ket)?;
    let b = space.flatten(bra);
    let k = space.flatten(ket);
    let mut dm_a = DMatrix::zeros(norb, norb);
    let mut dm_b = DMatrix::zeros(norb, norb);
    for det in 0..space.ndet() {
        if k[det] == 0.0 {
            continue;
        }
        for e in space.excitations(det) {
            let val = b[e.target] * e.sign * k[det];
            match e.spin {
                Spin::Alpha => dm_a[(e.p, e.q)] += val,
                Spin::Beta => dm_b[(e.p, e.q)] += val,
            }
        }
    }
    Ok((dm_a, dm_b))
}

/// <bra|a+_{p alpha} a_{q beta}|ket> with ket in (N(alpha), N(beta)) and bra in
/// (N(alpha) + 1, N(beta) - 1).
pub fn trans_rdm1_raise(
    bra: &DMatrix<f64>,
    ket: &DMatrix<f64>,
    norb: usize,
    nelec_ket: (usize, usize),
) -> Result<DMatrix<f64>> {
    let (na, nb) = nelec_ket;
    if nb == 0 || na >= norb {
        bail!("No alpha-beta spin flip exists from ({}, {}) electrons in {} orbitals", na, nb, norb);
    }
    let from = FciSpace::new(norb, nelec_ket)?;
    let to = FciSpace::new(norb, (na + 1, nb - 1))?;
    from.check_shape(ket)?;
    to.check_shape(bra)?;
    let k = from.flatten(ket);
    let b = to.flatten(bra);
    let mut dm = DMatrix::zeros(norb, norb);
    raise_entries_with(&from, &to, |source, target, p, q, sign| {
        dm[(p, q)] += b[target] * sign * k[source];
    });
    Ok(dm)
}

/// <S^2> of a CI vector.
pub fn spin_square(ci: &DMatrix<f64>, norb: usize, nelec: (usize, usize)) -> Result<f64> {
    let space = FciSpace::new(norb, nelec)?;
    space.check_shape(ci)?;
    let c = space.flatten(ci);
    let ss = space.spin_square_matrix();
    Ok(c.dot(&(&ss * &c)) / c.norm_squared())
}

/// Exchange alpha and beta strings: (N(alpha), N(beta)) -> (N(beta), N(alpha)).
pub fn spin_flip(ci: &DMatrix<f64>) -> DMatrix<f64> {
    ci.transpose()
}

/// Roots of one FCI solver
#[derive(Debug, Clone)]
pub struct FciResult {
    pub nelec: (usize, usize),
    /// energies including the core energy, without the spin penalty
    pub energies: Vec<f64>,
    pub ci: Vec<DMatrix<f64>>,
    pub spin_square: Vec<f64>,
}

/// Direct diagonalization FCI solver for a fixed Ms sector
#[derive(Debug, Clone)]
pub struct FCISolver {
    /// 2Ms = N(alpha) - N(beta)
    pub spin: usize,
    pub nroots: usize,
    /// (shift, ss): adds shift * (S^2 - ss) to the Hamiltonian
    pub spin_penalty: Option<(f64, f64)>,
}

impl FCISolver {
    pub fn new(spin: usize, nroots: usize) -> Self {
        FCISolver {
            spin,
            nroots,
            spin_penalty: None,
        }
    }

    pub fn fix_spin(mut self, shift: f64, ss: f64) -> Self {
        self.spin_penalty = Some((shift, ss));
        self
    }

    /// Split the active electrons into (N(alpha), N(beta)) for this solver.
    pub fn nelec(&self, nelecas: usize) -> Result<(usize, usize)> {
        if self.spin > nelecas || (nelecas - self.spin) % 2 != 0 {
            bail!(
                "Spin {} is not possible with {} active electrons",
                self.spin,
                nelecas
            );
        }
        Ok(((nelecas + self.spin) / 2, (nelecas - self.spin) / 2))
    }

    pub fn kernel(
        &self,
        h1: &DMatrix<f64>,
        eri: &Tensor4,
        norb: usize,
        nelecas: usize,
        ecore: f64,
    ) -> Result<FciResult> {
        let nelec = self.nelec(nelecas)?;
        let space = FciSpace::new(norb, nelec)?;
        let ndet = space.ndet();
        if self.nroots > ndet {
            bail!(
                "{} roots requested from a space of {} determinants",
                self.nroots,
                ndet
            );
        }
        debug!(
            "FCI: {} orbitals, nelec {:?}, {} determinants",
            norb, nelec, ndet
        );

        let h0 = space.hamiltonian(h1, eri);
        let ss = space.spin_square_matrix();
        let h = match self.spin_penalty {
            Some((shift, target)) => {
                &h0 + (&ss - DMatrix::identity(ndet, ndet) * target) * shift
            }
            None => h0.clone(),
        };

        let eig = h.symmetric_eigen();
        let mut order: Vec<usize> = (0..ndet).collect();
        order.sort_by(|&a, &b| {
            eig.eigenvalues[a]
                .partial_cmp(&eig.eigenvalues[b])
                .unwrap_or(Ordering::Equal)
        });

        let mut result = FciResult {
            nelec,
            energies: Vec::with_capacity(self.nroots),
            ci: Vec::with_capacity(self.nroots),
            spin_square: Vec::with_capacity(self.nroots),
        };
        for &root in order.iter().take(self.nroots) {
            let v = eig.eigenvectors.column(root).into_owned();
            let e = v.dot(&(&h0 * &v)) + ecore;
            let s2 = v.dot(&(&ss * &v));
            result.energies.push(e);
            result.spin_square.push(s2);
            result.ci.push(space.unflatten(&v));
        }
        for (i, (e, s2)) in result.energies.iter().zip(&result.spin_square).enumerate() {
            debug!("FCI state {}  E = {:.12}  S^2 = {:.7}", i, e, s2);
        }
        Ok(result)
    }
}
