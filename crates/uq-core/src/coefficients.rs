// ─────────────────────────────────────────────────────────────────────
// SCPN UQ Core — Surplus Coefficient Storage
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Nested levels -> sets -> points storage of hierarchical surpluses.
//!
//! Three parallel containers mirror the driver's index-set nesting:
//! type-1 (value) surpluses, type-2 (derivative) surpluses with shape
//! (points, variables), and non-basis-gradient surpluses with shape
//! (points, non-basis variables). Unused containers keep zero columns.

use ndarray::{Array1, Array2};
use uq_grid::hierarchy::IndexSetHierarchy;
use uq_types::error::{UqError, UqResult};

/// Surpluses of a single index set.
#[derive(Debug, Clone, PartialEq)]
pub struct SetCoefficients {
    pub t1: Array1<f64>,
    pub t2: Array2<f64>,
    pub t1_grad: Array2<f64>,
}

impl SetCoefficients {
    pub fn zeros(num_points: usize, num_t2: usize, num_grad: usize) -> Self {
        SetCoefficients {
            t1: Array1::zeros(num_points),
            t2: Array2::zeros((num_points, num_t2)),
            t1_grad: Array2::zeros((num_points, num_grad)),
        }
    }
}

/// Column widths of the derivative containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurplusLayout {
    pub num_t2: usize,
    pub num_grad: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurplusCoefficients {
    pub t1: Vec<Vec<Array1<f64>>>,
    pub t2: Vec<Vec<Array2<f64>>>,
    pub t1_grad: Vec<Vec<Array2<f64>>>,
}

impl SurplusCoefficients {
    pub fn num_levels(&self) -> usize {
        self.t1.len()
    }

    pub fn num_sets(&self, level: usize) -> usize {
        self.t1.get(level).map_or(0, Vec::len)
    }

    pub fn total_sets(&self) -> usize {
        self.t1.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_sets() == 0
    }

    pub fn has_type2(&self) -> bool {
        self.t2
            .iter()
            .flatten()
            .next()
            .is_some_and(|m| m.ncols() > 0)
    }

    pub fn has_gradients(&self) -> bool {
        self.t1_grad
            .iter()
            .flatten()
            .next()
            .is_some_and(|m| m.ncols() > 0)
    }

    /// Resize to the hierarchy's shape. Sets whose point count already
    /// matches keep their values; new or reshaped sets are zeroed.
    pub fn allocate(&mut self, h: &IndexSetHierarchy, layout: SurplusLayout) {
        let n_lev = h.num_levels();
        self.t1.resize_with(n_lev, Vec::new);
        self.t2.resize_with(n_lev, Vec::new);
        self.t1_grad.resize_with(n_lev, Vec::new);
        for lev in 0..n_lev {
            let n_sets = h.num_sets(lev);
            self.t1[lev].truncate(n_sets);
            self.t2[lev].truncate(n_sets);
            self.t1_grad[lev].truncate(n_sets);
            for set in 0..n_sets {
                let n_pts = h.num_points(lev, set);
                if set >= self.t1[lev].len() {
                    self.t1[lev].push(Array1::zeros(n_pts));
                    self.t2[lev].push(Array2::zeros((n_pts, layout.num_t2)));
                    self.t1_grad[lev].push(Array2::zeros((n_pts, layout.num_grad)));
                    continue;
                }
                if self.t1[lev][set].len() != n_pts {
                    self.t1[lev][set] = Array1::zeros(n_pts);
                }
                if self.t2[lev][set].dim() != (n_pts, layout.num_t2) {
                    self.t2[lev][set] = Array2::zeros((n_pts, layout.num_t2));
                }
                if self.t1_grad[lev][set].dim() != (n_pts, layout.num_grad) {
                    self.t1_grad[lev][set] = Array2::zeros((n_pts, layout.num_grad));
                }
            }
        }
    }

    /// Check that stored sets form a shape-consistent prefix of `h`.
    pub fn check_prefix_of(&self, h: &IndexSetHierarchy) -> UqResult<()> {
        if self.num_levels() > h.num_levels() {
            return Err(UqError::StructureMismatch(format!(
                "{} coefficient levels for {} hierarchy levels",
                self.num_levels(),
                h.num_levels()
            )));
        }
        for lev in 0..self.num_levels() {
            if self.num_sets(lev) > h.num_sets(lev) {
                return Err(UqError::StructureMismatch(format!(
                    "level {lev}: {} coefficient sets for {} index sets",
                    self.num_sets(lev),
                    h.num_sets(lev)
                )));
            }
            for set in 0..self.num_sets(lev) {
                if self.t1[lev][set].len() != h.num_points(lev, set) {
                    return Err(UqError::StructureMismatch(format!(
                        "level {lev} set {set}: {} surpluses for {} points",
                        self.t1[lev][set].len(),
                        h.num_points(lev, set)
                    )));
                }
            }
        }
        Ok(())
    }

    /// Check that storage mirrors `h` exactly.
    pub fn check_matches(&self, h: &IndexSetHierarchy) -> UqResult<()> {
        self.check_prefix_of(h)?;
        let complete = (0..h.num_levels()).all(|lev| self.num_sets(lev) == h.num_sets(lev));
        if !complete {
            return Err(UqError::StructureMismatch(
                "coefficients missing for some index sets".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ensure_levels(&mut self, num_levels: usize) {
        if self.t1.len() < num_levels {
            self.t1.resize_with(num_levels, Vec::new);
            self.t2.resize_with(num_levels, Vec::new);
            self.t1_grad.resize_with(num_levels, Vec::new);
        }
    }

    pub fn push_set(&mut self, level: usize, coeffs: SetCoefficients) {
        self.ensure_levels(level + 1);
        self.t1[level].push(coeffs.t1);
        self.t2[level].push(coeffs.t2);
        self.t1_grad[level].push(coeffs.t1_grad);
    }

    pub fn pop_set(&mut self, level: usize) -> Option<SetCoefficients> {
        let t1 = self.t1.get_mut(level)?.pop()?;
        let t2 = self.t2[level].pop().unwrap_or_else(|| Array2::zeros((0, 0)));
        let t1_grad = self.t1_grad[level].pop().unwrap_or_else(|| Array2::zeros((0, 0)));
        Some(SetCoefficients { t1, t2, t1_grad })
    }
}
