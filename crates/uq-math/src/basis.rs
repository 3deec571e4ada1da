// ─────────────────────────────────────────────────────────────────────
// SCPN UQ Core — Interpolation Bases
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! 1-D hierarchical interpolation polynomials on nested point sets.
//!
//! A point `j` at `level` owns the characteristic polynomial built over the
//! full level-`level` point table. With nested tables the difference between
//! consecutive interpolants vanishes at all coarser points, so the level
//! increment is spanned by the polynomials of the new points alone.
//!
//! Type-1 polynomials carry values; type-2 polynomials (Hermite only) carry
//! first derivatives:
//!   H1_j(x) = [1 - 2 L_j'(x_j) (x - x_j)] L_j(x)^2
//!   H2_j(x) = (x - x_j) L_j(x)^2
//! Integration weights are exact expectations of each polynomial under the
//! uniform density on [-1, 1], computed with a Gauss-Legendre rule.

use crate::quadrature::{
    clenshaw_curtis_new_indices, clenshaw_curtis_points, gauss_legendre,
};
use std::fmt::Debug;

/// 1-D basis evaluator consumed by the sparse-grid driver and the surplus engine.
///
/// Callers guarantee `level <= max_level()` and `j < points(level).len()`.
pub trait InterpolationBasis: Debug {
    fn max_level(&self) -> usize;

    /// Point coordinates of the full table at `level`.
    fn points(&self, level: usize) -> &[f64];

    /// Indices into `points(level)` that are new at `level`.
    fn new_point_indices(&self, level: usize) -> &[usize];

    fn type1_value(&self, x: f64, j: usize, level: usize) -> f64;

    fn type1_gradient(&self, x: f64, j: usize, level: usize) -> f64;

    fn type2_value(&self, _x: f64, _j: usize, _level: usize) -> f64 {
        0.0
    }

    fn type2_gradient(&self, _x: f64, _j: usize, _level: usize) -> f64 {
        0.0
    }

    fn type1_weight(&self, j: usize, level: usize) -> f64;

    fn type2_weight(&self, _j: usize, _level: usize) -> f64 {
        0.0
    }

    /// True when type-2 (derivative) polynomials are available.
    fn has_type2(&self) -> bool {
        false
    }
}

/// Nested point tables with precomputed Lagrange denominators.
#[derive(Debug, Clone)]
struct NestedTable {
    points: Vec<Vec<f64>>,
    new_indices: Vec<Vec<usize>>,
    /// inv_denom[l][j] = 1 / prod_{k != j} (x_j - x_k)
    inv_denom: Vec<Vec<f64>>,
}

impl NestedTable {
    fn clenshaw_curtis(max_level: usize) -> Self {
        let points: Vec<Vec<f64>> = (0..=max_level).map(clenshaw_curtis_points).collect();
        let new_indices = (0..=max_level).map(clenshaw_curtis_new_indices).collect();
        let inv_denom = points
            .iter()
            .map(|pts| {
                (0..pts.len())
                    .map(|j| {
                        let denom = pts
                            .iter()
                            .enumerate()
                            .filter(|&(k, _)| k != j)
                            .fold(1.0, |acc, (_, &xk)| acc * (pts[j] - xk));
                        1.0 / denom
                    })
                    .collect()
            })
            .collect();
        NestedTable {
            points,
            new_indices,
            inv_denom,
        }
    }

    fn lagrange(&self, x: f64, j: usize, level: usize) -> f64 {
        let pts = &self.points[level];
        let mut num = 1.0;
        for (k, &xk) in pts.iter().enumerate() {
            if k != j {
                num *= x - xk;
            }
        }
        num * self.inv_denom[level][j]
    }

    fn lagrange_gradient(&self, x: f64, j: usize, level: usize) -> f64 {
        let pts = &self.points[level];
        let mut sum = 0.0;
        for (m, _) in pts.iter().enumerate().filter(|&(m, _)| m != j) {
            let mut prod = 1.0;
            for (k, &xk) in pts.iter().enumerate() {
                if k != j && k != m {
                    prod *= x - xk;
                }
            }
            sum += prod;
        }
        sum * self.inv_denom[level][j]
    }
}

/// Global Lagrange interpolation on nested Clenshaw-Curtis points.
#[derive(Debug, Clone)]
pub struct LagrangeBasis {
    table: NestedTable,
    weights: Vec<Vec<f64>>,
}

impl LagrangeBasis {
    pub fn clenshaw_curtis(max_level: usize) -> Self {
        let table = NestedTable::clenshaw_curtis(max_level);
        let weights = table
            .points
            .iter()
            .enumerate()
            .map(|(level, pts)| {
                // deg L_j = n - 1; a rule with n/2 + 1 nodes is exact.
                let (gx, gw) = gauss_legendre(pts.len() / 2 + 1);
                (0..pts.len())
                    .map(|j| {
                        gx.iter()
                            .zip(&gw)
                            .map(|(&x, &w)| w * table.lagrange(x, j, level))
                            .sum()
                    })
                    .collect()
            })
            .collect();
        LagrangeBasis { table, weights }
    }
}

impl InterpolationBasis for LagrangeBasis {
    fn max_level(&self) -> usize {
        self.table.points.len() - 1
    }

    fn points(&self, level: usize) -> &[f64] {
        &self.table.points[level]
    }

    fn new_point_indices(&self, level: usize) -> &[usize] {
        &self.table.new_indices[level]
    }

    fn type1_value(&self, x: f64, j: usize, level: usize) -> f64 {
        self.table.lagrange(x, j, level)
    }

    fn type1_gradient(&self, x: f64, j: usize, level: usize) -> f64 {
        self.table.lagrange_gradient(x, j, level)
    }

    fn type1_weight(&self, j: usize, level: usize) -> f64 {
        self.weights[level][j]
    }
}

/// Global Hermite interpolation on nested Clenshaw-Curtis points.
#[derive(Debug, Clone)]
pub struct HermiteBasis {
    table: NestedTable,
    /// L_j'(x_j) per level and point.
    slope_at_node: Vec<Vec<f64>>,
    t1_weights: Vec<Vec<f64>>,
    t2_weights: Vec<Vec<f64>>,
}

impl HermiteBasis {
    pub fn clenshaw_curtis(max_level: usize) -> Self {
        let table = NestedTable::clenshaw_curtis(max_level);
        let slope_at_node: Vec<Vec<f64>> = table
            .points
            .iter()
            .enumerate()
            .map(|(level, pts)| {
                (0..pts.len())
                    .map(|j| table.lagrange_gradient(pts[j], j, level))
                    .collect()
            })
            .collect();

        let mut basis = HermiteBasis {
            table,
            slope_at_node,
            t1_weights: Vec::new(),
            t2_weights: Vec::new(),
        };
        let mut t1 = Vec::with_capacity(basis.table.points.len());
        let mut t2 = Vec::with_capacity(basis.table.points.len());
        for level in 0..basis.table.points.len() {
            let n = basis.table.points[level].len();
            // deg H = 2n - 1; n + 1 nodes are exact.
            let (gx, gw) = gauss_legendre(n + 1);
            let mut w1 = Vec::with_capacity(n);
            let mut w2 = Vec::with_capacity(n);
            for j in 0..n {
                let mut s1 = 0.0;
                let mut s2 = 0.0;
                for (&x, &w) in gx.iter().zip(&gw) {
                    s1 += w * basis.type1_value(x, j, level);
                    s2 += w * basis.type2_value(x, j, level);
                }
                w1.push(s1);
                w2.push(s2);
            }
            t1.push(w1);
            t2.push(w2);
        }
        basis.t1_weights = t1;
        basis.t2_weights = t2;
        basis
    }
}

impl InterpolationBasis for HermiteBasis {
    fn max_level(&self) -> usize {
        self.table.points.len() - 1
    }

    fn points(&self, level: usize) -> &[f64] {
        &self.table.points[level]
    }

    fn new_point_indices(&self, level: usize) -> &[usize] {
        &self.table.new_indices[level]
    }

    fn type1_value(&self, x: f64, j: usize, level: usize) -> f64 {
        let xj = self.table.points[level][j];
        let l = self.table.lagrange(x, j, level);
        (1.0 - 2.0 * self.slope_at_node[level][j] * (x - xj)) * l * l
    }

    fn type1_gradient(&self, x: f64, j: usize, level: usize) -> f64 {
        let xj = self.table.points[level][j];
        let c = self.slope_at_node[level][j];
        let l = self.table.lagrange(x, j, level);
        let dl = self.table.lagrange_gradient(x, j, level);
        -2.0 * c * l * l + (1.0 - 2.0 * c * (x - xj)) * 2.0 * l * dl
    }

    fn type2_value(&self, x: f64, j: usize, level: usize) -> f64 {
        let xj = self.table.points[level][j];
        let l = self.table.lagrange(x, j, level);
        (x - xj) * l * l
    }

    fn type2_gradient(&self, x: f64, j: usize, level: usize) -> f64 {
        let xj = self.table.points[level][j];
        let l = self.table.lagrange(x, j, level);
        let dl = self.table.lagrange_gradient(x, j, level);
        l * l + (x - xj) * 2.0 * l * dl
    }

    fn type1_weight(&self, j: usize, level: usize) -> f64 {
        self.t1_weights[level][j]
    }

    fn type2_weight(&self, j: usize, level: usize) -> f64 {
        self.t2_weights[level][j]
    }

    fn has_type2(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lagrange_cardinality() {
        let basis = LagrangeBasis::clenshaw_curtis(3);
        for level in 0..=3 {
            let pts = basis.points(level).to_vec();
            for j in 0..pts.len() {
                for (k, &xk) in pts.iter().enumerate() {
                    let v = basis.type1_value(xk, j, level);
                    let expected = if j == k { 1.0 } else { 0.0 };
                    assert!((v - expected).abs() < 1e-12, "L_{j}({xk}) = {v}");
                }
            }
        }
    }

    #[test]
    fn test_lagrange_weights_sum_to_one() {
        let basis = LagrangeBasis::clenshaw_curtis(4);
        for level in 0..=4 {
            let n = basis.points(level).len();
            let total: f64 = (0..n).map(|j| basis.type1_weight(j, level)).sum();
            assert!((total - 1.0).abs() < 1e-12, "level {level}: {total}");
        }
        // Simpson-like weights on {-1, 0, 1} under density 1/2.
        assert!((basis.type1_weight(0, 1) - 1.0 / 6.0).abs() < 1e-14);
        assert!((basis.type1_weight(1, 1) - 2.0 / 3.0).abs() < 1e-14);
    }

    #[test]
    fn test_lagrange_gradient_matches_finite_difference() {
        let basis = LagrangeBasis::clenshaw_curtis(3);
        let h = 1e-6;
        for j in 0..basis.points(3).len() {
            let x = 0.37;
            let fd = (basis.type1_value(x + h, j, 3) - basis.type1_value(x - h, j, 3)) / (2.0 * h);
            let g = basis.type1_gradient(x, j, 3);
            assert!((fd - g).abs() < 1e-5, "j={j}: fd={fd} g={g}");
        }
    }

    #[test]
    fn test_hermite_interpolation_conditions() {
        let basis = HermiteBasis::clenshaw_curtis(2);
        for level in 0..=2 {
            let pts = basis.points(level).to_vec();
            for j in 0..pts.len() {
                for (k, &xk) in pts.iter().enumerate() {
                    let delta = if j == k { 1.0 } else { 0.0 };
                    assert!((basis.type1_value(xk, j, level) - delta).abs() < 1e-11);
                    assert!(basis.type1_gradient(xk, j, level).abs() < 1e-10);
                    assert!(basis.type2_value(xk, j, level).abs() < 1e-12);
                    assert!((basis.type2_gradient(xk, j, level) - delta).abs() < 1e-10);
                }
            }
        }
    }

    #[test]
    fn test_hermite_weights_reproduce_expectations() {
        let basis = HermiteBasis::clenshaw_curtis(2);
        // f(x) = x^2 interpolated by values and slopes on level 1: exact.
        let pts = basis.points(1).to_vec();
        let mean: f64 = pts
            .iter()
            .enumerate()
            .map(|(j, &x)| x * x * basis.type1_weight(j, 1) + 2.0 * x * basis.type2_weight(j, 1))
            .sum();
        assert!((mean - 1.0 / 3.0).abs() < 1e-13, "mean = {mean}");
    }
}
