#![allow(non_snake_case)]
extern crate nalgebra as na;

use crate::helper::boys_array;
use na::Vector3;
use serde::{Deserialize, Serialize};

#[derive(PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Direction {
    X,
    Y,
    Z,
}

impl Direction {
    pub fn index(self) -> usize {
        match self {
            Direction::X => 0,
            Direction::Y => 1,
            Direction::Z => 2,
        }
    }

    pub fn all() -> [Direction; 3] {
        [Direction::X, Direction::Y, Direction::Z]
    }
}

pub fn ncart(l: usize) -> usize {
    (l + 1) * (l + 2) / 2
}

/// Cartesian exponents of a shell, x^l first, then decreasing powers of y.
pub fn cart_components(l: usize) -> Vec<[usize; 3]> {
    let mut comps = Vec::with_capacity(ncart(l));
    for lx in (0..=l).rev() {
        for ly in (0..=(l - lx)).rev() {
            comps.push([lx, ly, l - lx - ly]);
        }
    }
    comps
}

/// d/dx acting on x^n exp(-a x^2) gives n x^{n-1} - 2a x^{n+1}.
/// Returns the (coefficient, power) terms with nonzero coefficient.
pub fn derivative_terms(n: usize, alpha: f64) -> ([(f64, usize); 2], usize) {
    if n == 0 {
        ([(-2.0 * alpha, 1), (0.0, 0)], 1)
    } else {
        ([(n as f64, n - 1), (-2.0 * alpha, n + 1)], 2)
    }
}

/// Hermite expansion coefficients E^{ij}_t of a one dimensional Gaussian product.
///
/// The recursion follows Helgaker, Jørgensen and Olsen, with
/// E^{00}_0 = exp(-mu X_AB^2), X_PA = -b X_AB / p and X_PB = a X_AB / p.
#[derive(Debug, Clone)]
pub struct HermiteE {
    imax: usize,
    jmax: usize,
    tdim: usize,
    data: Vec<f64>,
}

impl HermiteE {
    pub fn new(imax: usize, jmax: usize, a: f64, b: f64, Xab: f64) -> Self {
        let p = a + b;
        let mu = a * b / p;
        let Xpa = -b * Xab / p;
        let Xpb = a * Xab / p;
        let tdim = imax + jmax + 1;
        let mut e = HermiteE {
            imax,
            jmax,
            tdim,
            data: vec![0.0; (imax + 1) * (jmax + 1) * tdim],
        };
        let inv2p = 0.5 / p;

        let idx00 = e.index(0, 0, 0);
        e.data[idx00] = (-mu * Xab * Xab).exp();

        for i in 0..=imax {
            for j in 0..=jmax {
                if i == 0 && j == 0 {
                    continue;
                }
                // grow along i when possible, otherwise along j
                let (pi, pj, X) = if i > 0 { (i - 1, j, Xpa) } else { (i, j - 1, Xpb) };
                for t in 0..=(i + j) {
                    let mut val = X * e.get(pi, pj, t);
                    if t > 0 {
                        val += inv2p * e.get(pi, pj, t - 1);
                    }
                    val += (t + 1) as f64 * e.get(pi, pj, t + 1);
                    let idx = e.index(i, j, t);
                    e.data[idx] = val;
                }
            }
        }
        e
    }

    fn index(&self, i: usize, j: usize, t: usize) -> usize {
        (i * (self.jmax + 1) + j) * self.tdim + t
    }

    pub fn get(&self, i: usize, j: usize, t: usize) -> f64 {
        if i > self.imax || j > self.jmax || t > i + j {
            0.0
        } else {
            self.data[self.index(i, j, t)]
        }
    }
}

/// Hermite Coulomb integrals R^0_{tuv} for t + u + v <= lmax.
#[derive(Debug, Clone)]
pub struct HermiteR {
    dim: usize,
    data: Vec<f64>,
}

impl HermiteR {
    pub fn new(lmax: usize, alpha: f64, PC: Vector3<f64>) -> Self {
        let dim = lmax + 1;
        let T = alpha * PC.norm_squared();
        let boys = boys_array(lmax, T);
        let size = dim * dim * dim;
        let index = |t: usize, u: usize, v: usize| (t * dim + u) * dim + v;

        // walk from R^{lmax} down to R^0, each level one order deeper in t+u+v
        let mut prev = vec![0.0; size];
        let mut cur = vec![0.0; size];
        for n in (0..=lmax).rev() {
            cur.iter_mut().for_each(|x| *x = 0.0);
            cur[0] = (-2.0 * alpha).powi(n as i32) * boys[n];
            let order = lmax - n;
            for t in 0..=order {
                for u in 0..=(order - t) {
                    for v in 0..=(order - t - u) {
                        if t + u + v == 0 {
                            continue;
                        }
                        let val = if t > 0 {
                            let mut r = PC.x * prev[index(t - 1, u, v)];
                            if t > 1 {
                                r += (t - 1) as f64 * prev[index(t - 2, u, v)];
                            }
                            r
                        } else if u > 0 {
                            let mut r = PC.y * prev[index(t, u - 1, v)];
                            if u > 1 {
                                r += (u - 1) as f64 * prev[index(t, u - 2, v)];
                            }
                            r
                        } else {
                            let mut r = PC.z * prev[index(t, u, v - 1)];
                            if v > 1 {
                                r += (v - 1) as f64 * prev[index(t, u, v - 2)];
                            }
                            r
                        };
                        cur[index(t, u, v)] = val;
                    }
                }
            }
            std::mem::swap(&mut prev, &mut cur);
        }

        HermiteR { dim, data: prev }
    }

    pub fn get(&self, t: usize, u: usize, v: usize) -> f64 {
        self.data[(t * self.dim + u) * self.dim + v]
    }
}

/// Product of two primitive Cartesian Gaussians x^i y^j z^k exp(-a r^2),
/// with Hermite tables extended by `ext` powers on each side so that
/// differentiated functions can be expanded in the same tables.
#[derive(Debug, Clone)]
pub struct PrimitivePair {
    pub a: f64,
    pub b: f64,
    pub p: f64,
    pub P: Vector3<f64>,
    pub E: [HermiteE; 3],
}

impl PrimitivePair {
    pub fn new(
        a: f64,
        A: &Vector3<f64>,
        la: usize,
        b: f64,
        B: &Vector3<f64>,
        lb: usize,
        ext: usize,
    ) -> Self {
        let p = a + b;
        let P = (A * a + B * b) / p;
        let Xab = A - B;
        let E = [
            HermiteE::new(la + ext, lb + ext, a, b, Xab.x),
            HermiteE::new(la + ext, lb + ext, a, b, Xab.y),
            HermiteE::new(la + ext, lb + ext, a, b, Xab.z),
        ];
        PrimitivePair { a, b, p, P, E }
    }

    /// Overlap of the two monomial Gaussians.
    pub fn overlap(&self, ia: &[usize; 3], ib: &[usize; 3]) -> f64 {
        let pref = (std::f64::consts::PI / self.p).powf(1.5);
        pref * self.E[0].get(ia[0], ib[0], 0)
            * self.E[1].get(ia[1], ib[1], 0)
            * self.E[2].get(ia[2], ib[2], 0)
    }

    /// Sum over Hermite indices of E^x_t E^y_u E^z_v R_{tuv}, without the 2 pi / p prefactor.
    pub fn coulomb(&self, ia: &[usize; 3], ib: &[usize; 3], R: &HermiteR) -> f64 {
        let mut val = 0.0;
        for t in 0..=(ia[0] + ib[0]) {
            let ex = self.E[0].get(ia[0], ib[0], t);
            if ex == 0.0 {
                continue;
            }
            for u in 0..=(ia[1] + ib[1]) {
                let exy = ex * self.E[1].get(ia[1], ib[1], u);
                if exy == 0.0 {
                    continue;
                }
                for v in 0..=(ia[2] + ib[2]) {
                    val += exy * self.E[2].get(ia[2], ib[2], v) * R.get(t, u, v);
                }
            }
        }
        val
    }

    /// Hermite expansion E^{ab}_{tuv} of one component pair, as a list of
    /// (t, u, v, coefficient).
    pub fn expand(&self, ia: &[usize; 3], ib: &[usize; 3], sign: bool) -> Vec<(usize, usize, usize, f64)> {
        let mut terms = Vec::new();
        for t in 0..=(ia[0] + ib[0]) {
            let ex = self.E[0].get(ia[0], ib[0], t);
            if ex == 0.0 {
                continue;
            }
            for u in 0..=(ia[1] + ib[1]) {
                let exy = ex * self.E[1].get(ia[1], ib[1], u);
                if exy == 0.0 {
                    continue;
                }
                for v in 0..=(ia[2] + ib[2]) {
                    let c = exy * self.E[2].get(ia[2], ib[2], v);
                    if c != 0.0 {
                        let c = if sign && (t + u + v) % 2 == 1 { -c } else { c };
                        terms.push((t, u, v, c));
                    }
                }
            }
        }
        terms
    }
}

/// Applies `f` to every term of d/d(dir) acting on the Cartesian monomial `ijk`.
pub fn for_each_derivative<F: FnMut(f64, [usize; 3])>(ijk: &[usize; 3], alpha: f64, dir: Direction, mut f: F) {
    let d = dir.index();
    let (terms, n) = derivative_terms(ijk[d], alpha);
    for &(c, power) in terms.iter().take(n) {
        let mut shifted = *ijk;
        shifted[d] = power;
        f(c, shifted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::{boys_function, simpson_integration};
    use std::f64::consts::PI;

    fn gauss_1d(x: f64, l: usize, alpha: f64, center: f64) -> f64 {
        let dx = x - center;
        dx.powi(l as i32) * (-alpha * dx * dx).exp()
    }

    #[test]
    fn test_cart_components_order() {
        let comps = cart_components(2);
        assert_eq!(
            comps,
            vec![[2, 0, 0], [1, 1, 0], [1, 0, 1], [0, 2, 0], [0, 1, 1], [0, 0, 2]]
        );
        assert_eq!(cart_components(3).len(), ncart(3));
    }

    #[test]
    fn test_hermite_overlap_against_quadrature() {
        let (a, b) = (1.2, 0.8);
        let (A, B) = (0.3, -0.9);
        let e = HermiteE::new(3, 3, a, b, A - B);
        let p = a + b;
        for i in 0..=3 {
            for j in 0..=3 {
                let analytic = e.get(i, j, 0) * (PI / p).sqrt();
                let numeric = simpson_integration(
                    |x| gauss_1d(x, i, a, A) * gauss_1d(x, j, b, B),
                    -12.0,
                    12.0,
                    20_000,
                );
                assert!(
                    (analytic - numeric).abs() < 1e-9,
                    "S_{}{}: {} vs {}",
                    i,
                    j,
                    analytic,
                    numeric
                );
            }
        }
    }

    #[test]
    fn test_hermite_r_base_case() {
        let PC = Vector3::new(0.1, -0.4, 0.7);
        let alpha = 0.9;
        let r = HermiteR::new(4, alpha, PC);
        let T = alpha * PC.norm_squared();
        assert!((r.get(0, 0, 0) - boys_function(0, T)).abs() < 1e-14);
        // R_{100} = X * (-2 alpha) F_1
        let expected = PC.x * (-2.0 * alpha) * boys_function(1, T);
        assert!((r.get(1, 0, 0) - expected).abs() < 1e-14);
        // R_{002} = (-2a) F_1 + Z^2 (-2a)^2 F_2
        let expected = -2.0 * alpha * boys_function(1, T)
            + PC.z * PC.z * 4.0 * alpha * alpha * boys_function(2, T);
        assert!((r.get(0, 0, 2) - expected).abs() < 1e-13);
    }

    #[test]
    fn test_derivative_terms() {
        let (t, n) = derivative_terms(0, 0.5);
        assert_eq!(n, 1);
        assert_eq!(t[0], (-1.0, 1));
        let (t, n) = derivative_terms(2, 0.5);
        assert_eq!(n, 2);
        assert_eq!(t[0], (2.0, 1));
        assert_eq!(t[1], (-1.0, 3));
    }
}
