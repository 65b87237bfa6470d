use libm::{erf, sqrt};
use std::f64::consts::PI;

pub fn factorial(n: i32) -> f64 {
    (1..=n).fold(1.0, |acc, x| acc * x as f64)
}

/// n!! with the convention (-1)!! = 0!! = 1.
pub fn double_factorial(n: i32) -> f64 {
    let mut acc = 1.0;
    let mut k = n;
    while k > 1 {
        acc *= k as f64;
        k -= 2;
    }
    acc
}

// Series expansion is used below this point, upward recursion from erf above it.
const BOYS_SERIES_LIMIT: f64 = 40.0;

/// Boys function F_n(x) = \int_0^1 t^{2n} exp(-x t^2) dt for every order 0..=nmax.
///
/// Small arguments start from the convergent series for the highest order and recur
/// downward, large arguments start from the error function and recur upward.
pub fn boys_array(nmax: usize, x: f64) -> Vec<f64> {
    debug_assert!(x >= 0.0, "Boys function argument must be nonnegative");
    let mut vals = vec![0.0; nmax + 1];
    let ex = (-x).exp();

    if x < BOYS_SERIES_LIMIT + nmax as f64 {
        let two_n1 = (2 * nmax + 1) as f64;
        let mut term = 1.0 / two_n1;
        let mut sum = term;
        for k in 1..1000 {
            term *= 2.0 * x / (two_n1 + 2.0 * k as f64);
            sum += term;
            if term < 1e-17 * sum {
                break;
            }
        }
        vals[nmax] = ex * sum;
        for n in (0..nmax).rev() {
            vals[n] = (2.0 * x * vals[n + 1] + ex) / (2 * n + 1) as f64;
        }
    } else {
        let sx = sqrt(x);
        vals[0] = 0.5 * sqrt(PI / x) * erf(sx);
        for n in 0..nmax {
            vals[n + 1] = ((2 * n + 1) as f64 * vals[n] - ex) / (2.0 * x);
        }
    }
    vals
}

pub fn boys_function(n: usize, x: f64) -> f64 {
    boys_array(n, x)[n]
}

// Simpson's rule integration
#[cfg(test)]
pub(crate) fn simpson_integration<F>(f: F, a: f64, b: f64, n: usize) -> f64
where
    F: Fn(f64) -> f64,
{
    let n = if n % 2 == 0 { n } else { n + 1 };
    let h = (b - a) / n as f64;

    let mut sum = f(a) + f(b);
    for i in 1..n {
        let x = a + i as f64 * h;
        sum += if i % 2 == 0 { 2.0 * f(x) } else { 4.0 * f(x) };
    }
    sum * h / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boys_function_at_zero() {
        for n in 0..10 {
            let val = boys_function(n, 0.0);
            assert!((val - 1.0 / (2 * n + 1) as f64).abs() < 1e-14);
        }
    }

    #[test]
    fn test_boys_function_against_quadrature() {
        for &x in &[0.3, 2.5, 11.0, 38.0, 45.0, 80.0] {
            let vals = boys_array(8, x);
            for (n, &val) in vals.iter().enumerate() {
                let integrand = |t: f64| t.powi(2 * n as i32) * (-x * t * t).exp();
                let reference = simpson_integration(integrand, 0.0, 1.0, 20_000);
                assert!(
                    (val - reference).abs() < 1e-10 * reference.max(1e-3),
                    "F_{}({}) = {} vs {}",
                    n,
                    x,
                    val,
                    reference
                );
            }
        }
    }

    #[test]
    fn test_double_factorial() {
        assert_eq!(double_factorial(-1), 1.0);
        assert_eq!(double_factorial(0), 1.0);
        assert_eq!(double_factorial(5), 15.0);
        assert_eq!(double_factorial(6), 48.0);
    }
}
