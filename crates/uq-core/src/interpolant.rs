// ─────────────────────────────────────────────────────────────────────
// SCPN UQ Core — Partial Hierarchical Interpolant
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Evaluation of the surplus representation through a requested level:
//!
//!   I_L(x) = sum_{lev <= L} sum_sets sum_pts [ c1 prod_d H1(x_d)
//!            + sum_v c2_v H2(x_v) prod_{d != v} H1(x_d) ]
//!
//! Only sets that already carry coefficients are summed, so the same
//! routine serves as the "value through the previous level" primitive
//! during surplus construction.

use crate::coefficients::SurplusCoefficients;
use ndarray::Array1;
use uq_grid::hierarchy::IndexSetHierarchy;
use uq_math::basis::InterpolationBasis;
use uq_types::state::VarSubset;

/// Per-dimension 1-D factors of one collocation point at `x`.
struct Factors {
    v1: Vec<f64>,
    g1: Vec<f64>,
    v2: Vec<f64>,
    g2: Vec<f64>,
}

impl Factors {
    fn new(
        bases: &[&dyn InterpolationBasis],
        alpha: &[usize],
        key: &[usize],
        x: &[f64],
        with_gradients: bool,
        with_type2: bool,
    ) -> Self {
        let n = alpha.len();
        let mut f = Factors {
            v1: vec![0.0; n],
            g1: vec![0.0; if with_gradients { n } else { 0 }],
            v2: vec![0.0; if with_type2 { n } else { 0 }],
            g2: vec![0.0; if with_type2 && with_gradients { n } else { 0 }],
        };
        for d in 0..n {
            let b = bases[d];
            f.v1[d] = b.type1_value(x[d], key[d], alpha[d]);
            if with_gradients {
                f.g1[d] = b.type1_gradient(x[d], key[d], alpha[d]);
            }
            if with_type2 {
                f.v2[d] = b.type2_value(x[d], key[d], alpha[d]);
                if with_gradients {
                    f.g2[d] = b.type2_gradient(x[d], key[d], alpha[d]);
                }
            }
        }
        f
    }

    /// prod_{d not in skip} v1[d]
    fn product_except(&self, skip_a: usize, skip_b: usize) -> f64 {
        self.v1
            .iter()
            .enumerate()
            .filter(|&(d, _)| d != skip_a && d != skip_b)
            .map(|(_, v)| v)
            .product()
    }
}

/// Read-only view over one surplus representation.
#[derive(Clone, Copy)]
pub struct Interpolant<'a> {
    pub hierarchy: &'a IndexSetHierarchy,
    pub bases: &'a [&'a dyn InterpolationBasis],
    pub coeffs: &'a SurplusCoefficients,
}

impl<'a> Interpolant<'a> {
    pub fn new(
        hierarchy: &'a IndexSetHierarchy,
        bases: &'a [&'a dyn InterpolationBasis],
        coeffs: &'a SurplusCoefficients,
    ) -> Self {
        Interpolant {
            hierarchy,
            bases,
            coeffs,
        }
    }

    fn top_level(&self, max_level: usize) -> usize {
        self.coeffs.num_levels().min(max_level.saturating_add(1))
    }

    /// Value through all stored levels.
    pub fn value(&self, x: &[f64]) -> f64 {
        self.value_through(x, usize::MAX)
    }

    /// Value summed over levels `0..=max_level`.
    pub fn value_through(&self, x: &[f64], max_level: usize) -> f64 {
        self.value_filtered(x, max_level, None)
    }

    /// Value restricted to sets whose support lies inside `subset`; type-2
    /// terms of non-member dimensions are dropped.
    pub fn value_subset(&self, x: &[f64], subset: VarSubset) -> f64 {
        self.value_filtered(x, usize::MAX, Some(subset))
    }

    fn value_filtered(&self, x: &[f64], max_level: usize, subset: Option<VarSubset>) -> f64 {
        let with_t2 = self.coeffs.has_type2();
        let mut sum = 0.0;
        for lev in 0..self.top_level(max_level) {
            for set in 0..self.coeffs.num_sets(lev) {
                let alpha = self.hierarchy.multi_index(lev, set);
                if let Some(s) = subset {
                    let support = VarSubset::support(alpha);
                    if support.0 & !s.0 != 0 {
                        continue;
                    }
                }
                let c1 = &self.coeffs.t1[lev][set];
                let c2 = &self.coeffs.t2[lev][set];
                for (pt, key) in self.hierarchy.colloc_key(lev, set).iter().enumerate() {
                    let f = Factors::new(self.bases, alpha, key, x, false, with_t2);
                    sum += c1[pt] * f.v1.iter().product::<f64>();
                    if with_t2 {
                        for v in 0..alpha.len() {
                            if subset.is_some_and(|s| !s.contains(v)) {
                                continue;
                            }
                            sum += c2[[pt, v]] * f.v2[v] * f.product_except(v, v);
                        }
                    }
                }
            }
        }
        sum
    }

    /// Gradient w.r.t. every expansion variable.
    pub fn gradient_basis(&self, x: &[f64]) -> Array1<f64> {
        let all: Vec<usize> = (0..self.hierarchy.num_vars()).collect();
        self.gradient_basis_dvv(x, &all, usize::MAX)
    }

    /// Gradient w.r.t. the variables listed in `dvv`, through `max_level`.
    pub fn gradient_basis_dvv(&self, x: &[f64], dvv: &[usize], max_level: usize) -> Array1<f64> {
        let with_t2 = self.coeffs.has_type2();
        let mut grad = Array1::zeros(dvv.len());
        for lev in 0..self.top_level(max_level) {
            for set in 0..self.coeffs.num_sets(lev) {
                let alpha = self.hierarchy.multi_index(lev, set);
                let c1 = &self.coeffs.t1[lev][set];
                let c2 = &self.coeffs.t2[lev][set];
                for (pt, key) in self.hierarchy.colloc_key(lev, set).iter().enumerate() {
                    let f = Factors::new(self.bases, alpha, key, x, true, with_t2);
                    for (i, &v) in dvv.iter().enumerate() {
                        let mut g = c1[pt] * f.g1[v] * f.product_except(v, v);
                        if with_t2 {
                            for u in 0..alpha.len() {
                                let term = if u == v {
                                    f.g2[u] * f.product_except(u, u)
                                } else {
                                    f.v2[u] * f.g1[v] * f.product_except(u, v)
                                };
                                g += c2[[pt, u]] * term;
                            }
                        }
                        grad[i] += g;
                    }
                }
            }
        }
        grad
    }

    /// Gradient w.r.t. the non-basis variables carried by `t1_grad`.
    pub fn gradient_non_basis(&self, x: &[f64]) -> Array1<f64> {
        self.gradient_non_basis_through(x, usize::MAX)
    }

    pub fn gradient_non_basis_through(&self, x: &[f64], max_level: usize) -> Array1<f64> {
        let n_grad = self
            .coeffs
            .t1_grad
            .iter()
            .flatten()
            .next()
            .map_or(0, |m| m.ncols());
        let mut grad = Array1::zeros(n_grad);
        for lev in 0..self.top_level(max_level) {
            for set in 0..self.coeffs.num_sets(lev) {
                let alpha = self.hierarchy.multi_index(lev, set);
                let cg = &self.coeffs.t1_grad[lev][set];
                for (pt, key) in self.hierarchy.colloc_key(lev, set).iter().enumerate() {
                    let f = Factors::new(self.bases, alpha, key, x, false, false);
                    let basis: f64 = f.v1.iter().product();
                    grad.scaled_add(basis, &cg.row(pt));
                }
            }
        }
        grad
    }
}
