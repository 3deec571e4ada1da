// ─────────────────────────────────────────────────────────────────────
// SCPN UQ Core — Hierarchical Surplus Recursion
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Telescoping surplus construction shared by raw responses, centered
//! products, member interpolants and combined expansions.
//!
//!   level 0:  c = f(x_0)
//!   level L:  c = f(x) - I_{L-1}(x)   (and grad f - grad I_{L-1})
//!
//! Sets of equal or higher level contribute nothing at the points of a
//! set they do not dominate, so evaluating through L-1 is exact for any
//! downward-closed hierarchy regardless of append order.

use crate::coefficients::{SetCoefficients, SurplusCoefficients, SurplusLayout};
use crate::interpolant::Interpolant;
use ndarray::Array1;
use uq_grid::hierarchy::IndexSetHierarchy;
use uq_math::basis::InterpolationBasis;
use uq_types::error::{UqError, UqResult};

/// Response data at one collocation point.
#[derive(Debug, Clone, Default)]
pub struct PointResponse {
    pub value: f64,
    pub gradient: Option<Array1<f64>>,
    pub non_basis_gradient: Option<Array1<f64>>,
}

/// Which sets of every level enter an expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetSelection {
    All,
    /// Sets present at the last reference update.
    Reference,
    /// Sets appended since the last reference update.
    Increment,
}

/// Surpluses of the set at (`level`, `set`), given complete coefficients
/// for every lower level in `coeffs`.
pub fn compute_set<F>(
    h: &IndexSetHierarchy,
    bases: &[&dyn InterpolationBasis],
    coeffs: &SurplusCoefficients,
    layout: SurplusLayout,
    level: usize,
    set: usize,
    response: &mut F,
) -> UqResult<SetCoefficients>
where
    F: FnMut(usize, usize, usize, &[f64]) -> UqResult<PointResponse>,
{
    let n_pts = h.num_points(level, set);
    let mut out = SetCoefficients::zeros(n_pts, layout.num_t2, layout.num_grad);
    let interp = Interpolant::new(h, bases, coeffs);
    let all_vars: Vec<usize> = (0..h.num_vars()).collect();

    for pt in 0..n_pts {
        let x = h.point(bases, level, set, pt);
        let r = response(level, set, pt, &x)?;

        out.t1[pt] = if level == 0 {
            r.value
        } else {
            r.value - interp.value_through(&x, level - 1)
        };

        if layout.num_t2 > 0 {
            let g = r.gradient.as_ref().ok_or_else(|| {
                UqError::Precondition(format!(
                    "derivative-enhanced surplus needs a gradient at level {level} set {set} point {pt}"
                ))
            })?;
            check_len(g.len(), layout.num_t2)?;
            let prev = if level == 0 {
                Array1::zeros(layout.num_t2)
            } else {
                interp.gradient_basis_dvv(&x, &all_vars, level - 1)
            };
            out.t2.row_mut(pt).assign(&(g - &prev));
        }

        if layout.num_grad > 0 {
            let g = r.non_basis_gradient.as_ref().ok_or_else(|| {
                UqError::Precondition(format!(
                    "coefficient gradients need a non-basis gradient at level {level} set {set} point {pt}"
                ))
            })?;
            check_len(g.len(), layout.num_grad)?;
            let prev = if level == 0 {
                Array1::zeros(layout.num_grad)
            } else {
                interp.gradient_non_basis_through(&x, level - 1)
            };
            out.t1_grad.row_mut(pt).assign(&(g - &prev));
        }
    }
    log::trace!("surpluses computed for level {level} set {set} ({n_pts} points)");
    Ok(out)
}

fn check_len(got: usize, expected: usize) -> UqResult<()> {
    if got != expected {
        return Err(UqError::DimensionMismatch { expected, got });
    }
    Ok(())
}

/// Compute surpluses for every set of `h` that `coeffs` does not hold yet,
/// level by level. Returns the (level, set) positions that were added.
pub fn extend<F>(
    h: &IndexSetHierarchy,
    bases: &[&dyn InterpolationBasis],
    coeffs: &mut SurplusCoefficients,
    layout: SurplusLayout,
    response: &mut F,
) -> UqResult<Vec<(usize, usize)>>
where
    F: FnMut(usize, usize, usize, &[f64]) -> UqResult<PointResponse>,
{
    coeffs.check_prefix_of(h)?;
    coeffs.ensure_levels(h.num_levels());
    let mut added = Vec::new();
    for lev in 0..h.num_levels() {
        while coeffs.num_sets(lev) < h.num_sets(lev) {
            let set = coeffs.num_sets(lev);
            let c = compute_set(h, bases, coeffs, layout, lev, set, response)?;
            coeffs.push_set(lev, c);
            added.push((lev, set));
        }
    }
    Ok(added)
}

/// Full surplus representation of `response` over `h`.
pub fn build<F>(
    h: &IndexSetHierarchy,
    bases: &[&dyn InterpolationBasis],
    layout: SurplusLayout,
    response: &mut F,
) -> UqResult<SurplusCoefficients>
where
    F: FnMut(usize, usize, usize, &[f64]) -> UqResult<PointResponse>,
{
    let mut coeffs = SurplusCoefficients::default();
    extend(h, bases, &mut coeffs, layout, response)?;
    Ok(coeffs)
}

fn selected_sets(h: &IndexSetHierarchy, level: usize, sel: SetSelection) -> std::ops::Range<usize> {
    match sel {
        SetSelection::All => 0..h.num_sets(level),
        SetSelection::Reference => h.reference_range(level),
        SetSelection::Increment => h.increment_range(level),
    }
}

/// Expectation of the surplus representation under the hierarchy weights.
pub fn expectation(h: &IndexSetHierarchy, coeffs: &SurplusCoefficients, sel: SetSelection) -> f64 {
    let with_t2 = coeffs.has_type2() && h.has_type2_weights();
    let mut sum = 0.0;
    for lev in 0..coeffs.num_levels() {
        let range = selected_sets(h, lev, sel);
        for set in range.start..range.end.min(coeffs.num_sets(lev)) {
            sum += coeffs.t1[lev][set].dot(h.type1_weights(lev, set));
            if with_t2 {
                sum += (&coeffs.t2[lev][set] * h.type2_weights(lev, set)).sum();
            }
        }
    }
    sum
}

/// Expectation of the non-basis-gradient surpluses.
pub fn expectation_gradient(
    h: &IndexSetHierarchy,
    coeffs: &SurplusCoefficients,
    sel: SetSelection,
) -> Array1<f64> {
    let n_grad = coeffs.t1_grad.iter().flatten().next().map_or(0, |m| m.ncols());
    let mut grad = Array1::zeros(n_grad);
    for lev in 0..coeffs.num_levels() {
        let range = selected_sets(h, lev, sel);
        for set in range.start..range.end.min(coeffs.num_sets(lev)) {
            grad += &coeffs.t1_grad[lev][set].t().dot(h.type1_weights(lev, set));
        }
    }
    grad
}

#[cfg(test)]
mod tests {
    use super::*;
    use uq_grid::driver::HierarchSparseGridDriver;
    use uq_types::config::ExpansionConfig;

    fn value_response(
        f: impl Fn(&[f64]) -> f64,
    ) -> impl FnMut(usize, usize, usize, &[f64]) -> UqResult<PointResponse> {
        move |_, _, _, x| {
            Ok(PointResponse {
                value: f(x),
                ..Default::default()
            })
        }
    }

    #[test]
    fn test_one_dimensional_linear_surpluses() {
        let mut d = HierarchSparseGridDriver::from_config(&ExpansionConfig::new(1)).unwrap();
        d.initialize_isotropic(1).unwrap();
        let h = d.active_hierarchy();
        let bases = d.bases();
        let c = build(h, &bases, SurplusLayout::default(), &mut value_response(|x| x[0])).unwrap();
        assert!(c.t1[0][0][0].abs() < 1e-15);
        assert!((c.t1[1][0][0] + 1.0).abs() < 1e-14);
        assert!((c.t1[1][0][1] - 1.0).abs() < 1e-14);
        assert!(expectation(h, &c, SetSelection::All).abs() < 1e-15);
    }

    #[test]
    fn test_surpluses_reproduce_training_values() {
        let mut d = HierarchSparseGridDriver::from_config(&ExpansionConfig::new(2)).unwrap();
        d.initialize_isotropic(3).unwrap();
        let h = d.active_hierarchy();
        let bases = d.bases();
        let f = |x: &[f64]| (1.5 * x[0]).sin() + x[0] * x[1] * x[1] + 0.3;
        let c = build(h, &bases, SurplusLayout::default(), &mut value_response(f)).unwrap();
        let interp = Interpolant::new(h, &bases, &c);
        for lev in 0..h.num_levels() {
            for set in 0..h.num_sets(lev) {
                for pt in 0..h.num_points(lev, set) {
                    let x = h.point(&bases, lev, set, pt);
                    assert!((interp.value(&x) - f(&x)).abs() < 1e-12, "x = {x:?}");
                }
            }
        }
    }

    #[test]
    fn test_missing_gradient_is_precondition_error() {
        let mut d =
            HierarchSparseGridDriver::from_config(&ExpansionConfig::gradient_enhanced(1)).unwrap();
        d.initialize_isotropic(0).unwrap();
        let h = d.active_hierarchy();
        let bases = d.bases();
        let layout = SurplusLayout { num_t2: 1, num_grad: 0 };
        let err = build(h, &bases, layout, &mut value_response(|_| 1.0)).unwrap_err();
        assert!(matches!(err, UqError::Precondition(_)));
    }
}
