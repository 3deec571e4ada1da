// ─────────────────────────────────────────────────────────────────────
// SCPN UQ Core — Quadrature Rules
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! 1-D rules on [-1, 1] under the uniform probability density 1/2.
//!
//! Gauss-Legendre nodes come from Newton iteration on the three-term
//! Legendre recurrence; Clenshaw-Curtis tables are nested:
//!   level 0: {0}
//!   level l >= 1: x_k = -cos(pi k / 2^l), k = 0..2^l

use std::f64::consts::PI;

const NEWTON_MAX_ITERS: usize = 100;
const NEWTON_TOL: f64 = 1e-15;

/// Gauss-Legendre nodes and probability weights (summing to one).
pub fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    assert!(n > 0, "Gauss-Legendre rule needs at least one node");
    let mut nodes = vec![0.0; n];
    let mut weights = vec![0.0; n];

    for i in 0..n.div_ceil(2) {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut dp = 1.0;
        for _ in 0..NEWTON_MAX_ITERS {
            let (p, d) = legendre_with_derivative(n, x);
            dp = d;
            let dx = p / d;
            x -= dx;
            if dx.abs() < NEWTON_TOL {
                let (_, d) = legendre_with_derivative(n, x);
                dp = d;
                break;
            }
        }
        // Probability weight: 2 / ((1 - x^2) P_n'(x)^2), halved for density 1/2.
        let w = 1.0 / ((1.0 - x * x) * dp * dp);
        nodes[i] = -x;
        nodes[n - 1 - i] = x;
        weights[i] = w;
        weights[n - 1 - i] = w;
    }
    if n % 2 == 1 {
        nodes[n / 2] = 0.0;
    }
    (nodes, weights)
}

fn legendre_with_derivative(n: usize, x: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = x;
    for k in 2..=n {
        let kf = k as f64;
        let p2 = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
        p0 = p1;
        p1 = p2;
    }
    let (pn, pn1) = if n == 1 { (x, 1.0) } else { (p1, p0) };
    let d = n as f64 * (x * pn - pn1) / (x * x - 1.0);
    (pn, d)
}

/// Number of Clenshaw-Curtis points at `level`.
pub fn clenshaw_curtis_size(level: usize) -> usize {
    if level == 0 {
        1
    } else {
        (1usize << level) + 1
    }
}

/// Clenshaw-Curtis points at `level`, ascending.
pub fn clenshaw_curtis_points(level: usize) -> Vec<f64> {
    let n = clenshaw_curtis_size(level);
    if n == 1 {
        return vec![0.0];
    }
    let m = (n - 1) as f64;
    (0..n)
        .map(|k| {
            let x = -(PI * k as f64 / m).cos();
            // Snap the symmetric centre and round-off near zero.
            if 2 * k == n - 1 || x.abs() < 1e-15 {
                0.0
            } else {
                x
            }
        })
        .collect()
}

/// Indices (into the level table) of points absent from the previous level.
pub fn clenshaw_curtis_new_indices(level: usize) -> Vec<usize> {
    match level {
        0 => vec![0],
        1 => vec![0, 2],
        _ => (1..clenshaw_curtis_size(level)).step_by(2).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauss_legendre_integrates_polynomials() {
        for n in 1..12 {
            let (x, w) = gauss_legendre(n);
            let total: f64 = w.iter().sum();
            assert!((total - 1.0).abs() < 1e-13, "n={n}: weight sum {total}");
            // E[x^k] for uniform on [-1,1] is 1/(k+1) for even k, 0 otherwise.
            for k in 0..(2 * n) {
                let q: f64 = x.iter().zip(&w).map(|(xi, wi)| wi * xi.powi(k as i32)).sum();
                let exact = if k % 2 == 0 { 1.0 / (k as f64 + 1.0) } else { 0.0 };
                assert!((q - exact).abs() < 1e-12, "n={n} k={k}: {q} vs {exact}");
            }
        }
    }

    #[test]
    fn test_clenshaw_curtis_nesting() {
        for level in 1..6 {
            let coarse = clenshaw_curtis_points(level - 1);
            let fine = clenshaw_curtis_points(level);
            let new = clenshaw_curtis_new_indices(level);
            assert_eq!(fine.len(), clenshaw_curtis_size(level));
            assert_eq!(new.len() + coarse.len(), fine.len());
            for c in &coarse {
                assert!(fine.iter().any(|f| (f - c).abs() < 1e-14));
            }
            for &j in &new {
                assert!(coarse.iter().all(|c| (fine[j] - c).abs() > 1e-10));
            }
        }
    }

    #[test]
    fn test_level_one_points() {
        assert_eq!(clenshaw_curtis_points(0), vec![0.0]);
        let p = clenshaw_curtis_points(1);
        assert!((p[0] + 1.0).abs() < 1e-15);
        assert_eq!(p[1], 0.0);
        assert!((p[2] - 1.0).abs() < 1e-15);
    }
}
