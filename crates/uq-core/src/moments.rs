// ─────────────────────────────────────────────────────────────────────
// SCPN UQ Core — Moments, Covariance and Delta Statistics
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Statistics of the surplus representation.
//!
//! Every second- or higher-order moment is the expectation of a temporary
//! surplus representation of a product (R1 - m1)(R2 - m2), (R - m)^k or
//! R^k, built with the same telescoping recursion as the raw surpluses.
//! Reference statistics sum the sets present at the last reference update;
//! delta statistics sum the sets appended since.

use crate::coefficients::{SurplusCoefficients, SurplusLayout};
use crate::expansion::HierarchInterpExpansion;
use crate::interpolant::Interpolant;
use crate::surplus::{self, PointResponse, SetSelection};
use ndarray::Array1;
use uq_grid::driver::HierarchSparseGridDriver;
use uq_grid::hierarchy::IndexSetHierarchy;
use uq_math::basis::InterpolationBasis;
use uq_math::reliability::{self, MomentIncrement};
use uq_types::error::{UqError, UqResult};

/// Surpluses of (a - mu_a)(b - mu_b) over `h`.
pub(crate) fn centered_product(
    h: &IndexSetHierarchy,
    bases: &[&dyn InterpolationBasis],
    a: &Interpolant<'_>,
    mu_a: f64,
    b: &Interpolant<'_>,
    mu_b: f64,
) -> UqResult<SurplusCoefficients> {
    let with_t2 = a.coeffs.has_type2() && b.coeffs.has_type2() && h.has_type2_weights();
    let n = h.num_vars();
    let all: Vec<usize> = (0..n).collect();
    let layout = SurplusLayout {
        num_t2: if with_t2 { n } else { 0 },
        num_grad: 0,
    };
    surplus::build(h, bases, layout, &mut |_, _, _, x| {
        let ra = a.value(x) - mu_a;
        let rb = b.value(x) - mu_b;
        let gradient = with_t2.then(|| {
            let ga = a.gradient_basis_dvv(x, &all, usize::MAX);
            let gb = b.gradient_basis_dvv(x, &all, usize::MAX);
            gb * ra + ga * rb
        });
        Ok(PointResponse {
            value: ra * rb,
            gradient,
            non_basis_gradient: None,
        })
    })
}

/// Surpluses of (a - shift)^k over `h`.
pub(crate) fn shifted_power(
    h: &IndexSetHierarchy,
    bases: &[&dyn InterpolationBasis],
    a: &Interpolant<'_>,
    shift: f64,
    k: i32,
) -> UqResult<SurplusCoefficients> {
    let with_t2 = a.coeffs.has_type2() && h.has_type2_weights();
    let n = h.num_vars();
    let all: Vec<usize> = (0..n).collect();
    let layout = SurplusLayout {
        num_t2: if with_t2 { n } else { 0 },
        num_grad: 0,
    };
    surplus::build(h, bases, layout, &mut |_, _, _, x| {
        let r = a.value(x) - shift;
        let gradient =
            with_t2.then(|| a.gradient_basis_dvv(x, &all, usize::MAX) * (f64::from(k) * r.powi(k - 1)));
        Ok(PointResponse {
            value: r.powi(k),
            gradient,
            non_basis_gradient: None,
        })
    })
}

/// Surpluses of a * b (uncentered) over `h`.
fn raw_product(
    h: &IndexSetHierarchy,
    bases: &[&dyn InterpolationBasis],
    a: &Interpolant<'_>,
    b: &Interpolant<'_>,
) -> UqResult<SurplusCoefficients> {
    centered_product(h, bases, a, 0.0, b, 0.0)
}

fn product_except(f: &[f64], skip_a: usize, skip_b: usize) -> f64 {
    f.iter()
        .enumerate()
        .filter(|&(d, _)| d != skip_a && d != skip_b)
        .map(|(_, v)| v)
        .product()
}

/// Expectation over the `random` dimensions with the others held at `x`,
/// and its gradient w.r.t. the (non-random) dimensions in `dvv`.
fn partial_expectation(
    h: &IndexSetHierarchy,
    bases: &[&dyn InterpolationBasis],
    coeffs: &SurplusCoefficients,
    random: &[bool],
    x: &[f64],
    dvv: &[usize],
) -> (f64, Array1<f64>) {
    let n = h.num_vars();
    let with_t2 = coeffs.has_type2() && h.has_type2_weights();
    let mut value = 0.0;
    let mut grad = Array1::zeros(dvv.len());
    for lev in 0..coeffs.num_levels() {
        for set in 0..coeffs.num_sets(lev) {
            let alpha = h.multi_index(lev, set);
            for (pt, key) in h.colloc_key(lev, set).iter().enumerate() {
                let b = |d: usize| bases[d];
                let f1: Vec<f64> = (0..n)
                    .map(|d| {
                        if random[d] {
                            b(d).type1_weight(key[d], alpha[d])
                        } else {
                            b(d).type1_value(x[d], key[d], alpha[d])
                        }
                    })
                    .collect();
                let f2: Vec<f64> = if with_t2 {
                    (0..n)
                        .map(|d| {
                            if random[d] {
                                b(d).type2_weight(key[d], alpha[d])
                            } else {
                                b(d).type2_value(x[d], key[d], alpha[d])
                            }
                        })
                        .collect()
                } else {
                    Vec::new()
                };
                let c1 = coeffs.t1[lev][set][pt];
                value += c1 * f1.iter().product::<f64>();
                if with_t2 {
                    for v in 0..n {
                        value += coeffs.t2[lev][set][[pt, v]] * f2[v] * product_except(&f1, v, v);
                    }
                }
                for (i, &d) in dvv.iter().enumerate() {
                    let g1 = b(d).type1_gradient(x[d], key[d], alpha[d]);
                    let mut g = c1 * g1 * product_except(&f1, d, d);
                    if with_t2 {
                        for u in 0..n {
                            let term = if u == d {
                                b(d).type2_gradient(x[d], key[d], alpha[d]) * product_except(&f1, u, u)
                            } else {
                                f2[u] * g1 * product_except(&f1, u, d)
                            };
                            g += coeffs.t2[lev][set][[pt, u]] * term;
                        }
                    }
                    grad[i] += g;
                }
            }
        }
    }
    (value, grad)
}

fn same_structure(a: &IndexSetHierarchy, b: &IndexSetHierarchy) -> bool {
    a.num_vars() == b.num_vars()
        && a.num_levels() == b.num_levels()
        && (0..a.num_levels()).all(|lev| a.level_sets(lev) == b.level_sets(lev))
}

/// Standardized third and fourth central moments from raw moments
/// E[R], E[R^2], E[R^3], E[R^4]; zero when the deviation is negligible.
fn standardized_higher(raw: [f64; 4], zero_tol: f64) -> (f64, f64) {
    let [m1, m2, m3, m4] = raw;
    let var = m2 - m1 * m1;
    let std = var.max(0.0).sqrt();
    if std <= zero_tol {
        log::warn!("higher moments requested for a response with zero standard deviation");
        return (0.0, 0.0);
    }
    let c3 = m3 - 3.0 * m1 * m2 + 2.0 * m1.powi(3);
    let c4 = m4 - 4.0 * m1 * m3 + 6.0 * m1 * m1 * m2 - 3.0 * m1.powi(4);
    (c3 / std.powi(3), c4 / (var * var) - 3.0)
}

impl HierarchInterpExpansion {
    pub(crate) fn require_all_random(&self, what: &str) -> UqResult<()> {
        if self.config.has_non_random() {
            return Err(UqError::Precondition(format!(
                "{what} integrates every variable; use the coordinate-dependent form \
                 when non-random variables are present"
            )));
        }
        Ok(())
    }

    fn require_coefficient_gradients(&self) -> UqResult<()> {
        if !self.config.coefficient_gradients {
            return Err(UqError::Precondition(
                "non-basis gradients need coefficient gradients to be enabled".to_string(),
            ));
        }
        Ok(())
    }

    fn random_flags(&self) -> Vec<bool> {
        (0..self.config.num_vars)
            .map(|v| self.config.is_random(v))
            .collect()
    }

    /// Populated hierarchy of the active key, checked against storage.
    pub(crate) fn checked_hierarchy<'d>(
        &self,
        driver: &'d HierarchSparseGridDriver,
    ) -> UqResult<&'d IndexSetHierarchy> {
        self.check_driver(driver)?;
        let h = driver.hierarchy(self.active_key)?;
        self.populated()?.coeffs.check_matches(h)?;
        Ok(h)
    }

    // ── Mean ─────────────────────────────────────────────────────────

    /// Expectation over all (random) variables.
    pub fn mean(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<f64> {
        self.require_all_random("mean")?;
        let h = self.checked_hierarchy(driver)?;
        let entry = self.populated()?;
        if entry.stats.mean_flags.has_value() {
            return Ok(entry.stats.mean);
        }
        let mu = surplus::expectation(h, &entry.coeffs, SetSelection::All);
        let entry = self.active_mut()?;
        entry.stats.mean = mu;
        entry.stats.mean_flags.mark_value();
        Ok(mu)
    }

    /// Expectation over the random variables with the non-random ones held
    /// at `x`. Equals `mean` when every variable is random.
    pub fn mean_at(&mut self, driver: &HierarchSparseGridDriver, x: &[f64]) -> UqResult<f64> {
        if x.len() != self.config.num_vars {
            return Err(UqError::DimensionMismatch {
                expected: self.config.num_vars,
                got: x.len(),
            });
        }
        let h = self.checked_hierarchy(driver)?;
        if let Some((last, mu)) = &self.populated()?.stats.mean_at {
            if last.as_slice() == x {
                return Ok(*mu);
            }
        }
        let bases = driver.bases();
        let random = self.random_flags();
        let (mu, _) = partial_expectation(h, &bases, &self.populated()?.coeffs, &random, x, &[]);
        self.active_mut()?.stats.mean_at = Some((x.to_vec(), mu));
        Ok(mu)
    }

    /// Gradient of `mean_at` w.r.t. the non-random variables in `dvv`.
    pub fn mean_gradient_at(
        &self,
        driver: &HierarchSparseGridDriver,
        x: &[f64],
        dvv: &[usize],
    ) -> UqResult<Array1<f64>> {
        if x.len() != self.config.num_vars {
            return Err(UqError::DimensionMismatch {
                expected: self.config.num_vars,
                got: x.len(),
            });
        }
        if let Some(&v) = dvv
            .iter()
            .find(|&&v| v >= self.config.num_vars || self.config.is_random(v))
        {
            return Err(UqError::Precondition(format!(
                "variable {v} is not a non-random expansion variable"
            )));
        }
        let h = self.checked_hierarchy(driver)?;
        let bases = driver.bases();
        let random = self.random_flags();
        let (_, grad) = partial_expectation(h, &bases, &self.populated()?.coeffs, &random, x, dvv);
        Ok(grad)
    }

    /// Gradient of the mean w.r.t. the non-basis variables.
    pub fn mean_gradient(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<Array1<f64>> {
        self.require_coefficient_gradients()?;
        self.require_all_random("mean gradient")?;
        let h = self.checked_hierarchy(driver)?;
        let entry = self.populated()?;
        if entry.stats.mean_flags.has_gradient() {
            return Ok(entry.stats.mean_gradient.clone());
        }
        let grad = surplus::expectation_gradient(h, &entry.coeffs, SetSelection::All);
        let entry = self.active_mut()?;
        entry.stats.mean_gradient = grad.clone();
        entry.stats.mean_flags.mark_gradient();
        Ok(grad)
    }

    // ── Variance and covariance ──────────────────────────────────────

    /// Covariance with `other`, an expansion over the same index sets.
    /// Pass `self` for the variance.
    pub fn covariance(
        &self,
        driver: &HierarchSparseGridDriver,
        other: &HierarchInterpExpansion,
    ) -> UqResult<f64> {
        self.require_all_random("covariance")?;
        let h = self.checked_hierarchy(driver)?;
        let h_other = other.checked_hierarchy(driver)?;
        if !same_structure(h, h_other) {
            return Err(UqError::StructureMismatch(format!(
                "covariance between keys {} and {} with different index sets",
                self.active_key, other.active_key
            )));
        }
        let bases = driver.bases();
        let a = self.interpolant(driver, &bases)?;
        let b = other.interpolant(driver, &bases)?;
        let mu_a = surplus::expectation(h, a.coeffs, SetSelection::All);
        let mu_b = surplus::expectation(h_other, b.coeffs, SetSelection::All);
        let prod = centered_product(h, &bases, &a, mu_a, &b, mu_b)?;
        Ok(surplus::expectation(h, &prod, SetSelection::All))
    }

    pub fn variance(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<f64> {
        self.require_all_random("variance")?;
        self.checked_hierarchy(driver)?;
        let entry = self.populated()?;
        if entry.stats.variance_flags.has_value() {
            return Ok(entry.stats.variance);
        }
        let var = self.covariance(driver, self)?;
        let entry = self.active_mut()?;
        entry.stats.variance = var;
        entry.stats.variance_flags.mark_value();
        log::trace!("expansion {}: variance {var:.6e}", self.active_key);
        Ok(var)
    }

    /// Variance over the random variables with the non-random ones held at `x`.
    pub fn variance_at(&mut self, driver: &HierarchSparseGridDriver, x: &[f64]) -> UqResult<f64> {
        if !self.config.has_non_random() {
            return self.variance(driver);
        }
        let mu = self.mean_at(driver, x)?;
        if let Some((last, var)) = &self.populated()?.stats.variance_at {
            if last.as_slice() == x {
                return Ok(*var);
            }
        }
        let h = self.checked_hierarchy(driver)?;
        let bases = driver.bases();
        let random = self.random_flags();
        let second = {
            let a = self.interpolant(driver, &bases)?;
            let sq = shifted_power(h, &bases, &a, 0.0, 2)?;
            partial_expectation(h, &bases, &sq, &random, x, &[]).0
        };
        let var = second - mu * mu;
        self.active_mut()?.stats.variance_at = Some((x.to_vec(), var));
        Ok(var)
    }

    /// Gradient of the variance w.r.t. the non-basis variables:
    /// 2 E[(R - mu)(dR/ds - dmu/ds)].
    pub fn variance_gradient(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<Array1<f64>> {
        self.require_coefficient_gradients()?;
        self.require_all_random("variance gradient")?;
        if self.populated()?.stats.variance_flags.has_gradient() {
            return Ok(self.populated()?.stats.variance_gradient.clone());
        }
        let mu = self.mean(driver)?;
        let mu_grad = self.mean_gradient(driver)?;
        let h = self.checked_hierarchy(driver)?;
        let bases = driver.bases();
        let grad = {
            let a = self.interpolant(driver, &bases)?;
            let layout = SurplusLayout {
                num_t2: 0,
                num_grad: mu_grad.len(),
            };
            let prod = surplus::build(h, &bases, layout, &mut |_, _, _, x| {
                let r = a.value(x) - mu;
                let g = a.gradient_non_basis(x);
                Ok(PointResponse {
                    value: r * r,
                    gradient: None,
                    non_basis_gradient: Some((g - &mu_grad) * (2.0 * r)),
                })
            })?;
            surplus::expectation_gradient(h, &prod, SetSelection::All)
        };
        let entry = self.active_mut()?;
        entry.stats.variance_gradient = grad.clone();
        entry.stats.variance_flags.mark_gradient();
        Ok(grad)
    }

    /// [mean, variance] or [mean, variance, skewness, excess kurtosis] when
    /// all four moments are tracked.
    pub fn moments(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<Array1<f64>> {
        let mu = self.mean(driver)?;
        let var = self.variance(driver)?;
        if !self.config.all_moments {
            return Ok(Array1::from(vec![mu, var]));
        }
        let cached = self.populated()?.stats.higher;
        let (skew, kurt) = match cached {
            Some(hk) => hk,
            None => {
                let h = self.checked_hierarchy(driver)?;
                let bases = driver.bases();
                let a = self.interpolant(driver, &bases)?;
                let c3 = surplus::expectation(
                    h,
                    &shifted_power(h, &bases, &a, mu, 3)?,
                    SetSelection::All,
                );
                let c4 = surplus::expectation(
                    h,
                    &shifted_power(h, &bases, &a, mu, 4)?,
                    SetSelection::All,
                );
                let std = var.max(0.0).sqrt();
                let hk = if std <= self.config.tolerances.zero_std {
                    log::warn!(
                        "expansion {}: zero standard deviation, higher moments set to zero",
                        self.active_key
                    );
                    (0.0, 0.0)
                } else {
                    (c3 / std.powi(3), c4 / (var * var) - 3.0)
                };
                self.active_mut()?.stats.higher = Some(hk);
                hk
            }
        };
        Ok(Array1::from(vec![mu, var, skew, kurt]))
    }

    // ── Reference / delta statistics ─────────────────────────────────

    fn ensure_increment_stats(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<()> {
        self.require_all_random("delta statistics")?;
        let h = self.checked_hierarchy(driver)?;
        let counts = h.reference_counts();
        let stats = &self.populated()?.stats;
        if stats.reference_computed && stats.delta_computed && stats.reference_counts == counts {
            return Ok(());
        }
        let n_moments = self.config.num_moments();
        let zero_tol = self.config.tolerances.zero_std;
        let bases = driver.bases();
        let (reference, delta) = {
            let a = self.interpolant(driver, &bases)?;
            let mut raw_ref = [0.0; 4];
            let mut raw_delta = [0.0; 4];
            raw_ref[0] = surplus::expectation(h, a.coeffs, SetSelection::Reference);
            raw_delta[0] = surplus::expectation(h, a.coeffs, SetSelection::Increment);
            let max_power = if n_moments == 4 { 4 } else { 2 };
            for k in 2..=max_power {
                let pk = shifted_power(h, &bases, &a, 0.0, k as i32)?;
                raw_ref[k - 1] = surplus::expectation(h, &pk, SetSelection::Reference);
                raw_delta[k - 1] = surplus::expectation(h, &pk, SetSelection::Increment);
            }
            let (mu0, dmu) = (raw_ref[0], raw_delta[0]);
            let var0 = raw_ref[1] - mu0 * mu0;
            let dvar = raw_delta[1] - 2.0 * mu0 * dmu - dmu * dmu;
            let mut reference = Array1::zeros(n_moments);
            let mut delta = Array1::zeros(n_moments);
            reference[0] = mu0;
            reference[1] = var0;
            delta[0] = dmu;
            delta[1] = dvar;
            if n_moments == 4 {
                let mut raw_all = raw_ref;
                for (all, d) in raw_all.iter_mut().zip(raw_delta) {
                    *all += d;
                }
                let (s0, k0) = standardized_higher(raw_ref, zero_tol);
                let (s1, k1) = standardized_higher(raw_all, zero_tol);
                reference[2] = s0;
                reference[3] = k0;
                delta[2] = s1 - s0;
                delta[3] = k1 - k0;
            }
            (reference, delta)
        };
        let entry = self.active_mut()?;
        entry.stats.reference = reference;
        entry.stats.delta = delta;
        entry.stats.reference_computed = true;
        entry.stats.delta_computed = true;
        entry.stats.reference_counts = counts;
        Ok(())
    }

    /// Moments over the reference sets.
    pub fn reference_moments(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<Array1<f64>> {
        self.ensure_increment_stats(driver)?;
        Ok(self.populated()?.stats.reference.clone())
    }

    /// Moment changes contributed by the sets appended since the last
    /// reference update.
    pub fn delta_moments(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<Array1<f64>> {
        self.ensure_increment_stats(driver)?;
        Ok(self.populated()?.stats.delta.clone())
    }

    pub fn reference_mean(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<f64> {
        Ok(self.reference_moments(driver)?[0])
    }

    pub fn reference_variance(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<f64> {
        Ok(self.reference_moments(driver)?[1])
    }

    pub fn delta_mean(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<f64> {
        Ok(self.delta_moments(driver)?[0])
    }

    pub fn delta_variance(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<f64> {
        Ok(self.delta_moments(driver)?[1])
    }

    pub fn delta_std_deviation(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<f64> {
        let var0 = self.reference_variance(driver)?;
        let dvar = self.delta_variance(driver)?;
        Ok(reliability::delta_std_deviation(
            var0,
            dvar,
            self.config.tolerances.zero_std,
        ))
    }

    fn moment_increment(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<MomentIncrement> {
        let reference = self.reference_moments(driver)?;
        let delta = self.delta_moments(driver)?;
        Ok(MomentIncrement {
            ref_mean: reference[0],
            ref_std: reference[1].max(0.0).sqrt(),
            delta_mean: delta[0],
            delta_std: reliability::delta_std_deviation(
                reference[1],
                delta[1],
                self.config.tolerances.zero_std,
            ),
        })
    }

    /// Change in reliability index for response threshold `z_bar`.
    pub fn delta_beta(
        &mut self,
        driver: &HierarchSparseGridDriver,
        cdf: bool,
        z_bar: f64,
    ) -> UqResult<f64> {
        let m = self.moment_increment(driver)?;
        Ok(reliability::delta_beta(
            &m,
            cdf,
            z_bar,
            self.config.tolerances.zero_std,
        ))
    }

    /// Change in response threshold for reliability index `beta_bar`.
    pub fn delta_z(
        &mut self,
        driver: &HierarchSparseGridDriver,
        cdf: bool,
        beta_bar: f64,
    ) -> UqResult<f64> {
        let m = self.moment_increment(driver)?;
        Ok(reliability::delta_z(&m, cdf, beta_bar))
    }

    /// Covariance change between the reference and refined states:
    /// dE[R1 R2] - m1 dE[R2] - m2 dE[R1] - dE[R1] dE[R2].
    pub fn delta_covariance(
        &self,
        driver: &HierarchSparseGridDriver,
        other: &HierarchInterpExpansion,
    ) -> UqResult<f64> {
        self.require_all_random("delta covariance")?;
        let h = self.checked_hierarchy(driver)?;
        let h_other = other.checked_hierarchy(driver)?;
        if !same_structure(h, h_other) {
            return Err(UqError::StructureMismatch(format!(
                "delta covariance between keys {} and {} with different index sets",
                self.active_key, other.active_key
            )));
        }
        let bases = driver.bases();
        let a = self.interpolant(driver, &bases)?;
        let b = other.interpolant(driver, &bases)?;
        let mu_a = surplus::expectation(h, a.coeffs, SetSelection::Reference);
        let mu_b = surplus::expectation(h, b.coeffs, SetSelection::Reference);
        let d_a = surplus::expectation(h, a.coeffs, SetSelection::Increment);
        let d_b = surplus::expectation(h, b.coeffs, SetSelection::Increment);
        let prod = raw_product(h, &bases, &a, &b)?;
        let d_ab = surplus::expectation(h, &prod, SetSelection::Increment);
        Ok(d_ab - mu_a * d_b - mu_b * d_a - d_a * d_b)
    }

    /// Covariance over the reference sets only.
    pub fn reference_covariance(
        &self,
        driver: &HierarchSparseGridDriver,
        other: &HierarchInterpExpansion,
    ) -> UqResult<f64> {
        self.require_all_random("reference covariance")?;
        let h = self.checked_hierarchy(driver)?;
        let h_other = other.checked_hierarchy(driver)?;
        if !same_structure(h, h_other) {
            return Err(UqError::StructureMismatch(format!(
                "reference covariance between keys {} and {} with different index sets",
                self.active_key, other.active_key
            )));
        }
        let bases = driver.bases();
        let a = self.interpolant(driver, &bases)?;
        let b = other.interpolant(driver, &bases)?;
        let mu_a = surplus::expectation(h, a.coeffs, SetSelection::Reference);
        let mu_b = surplus::expectation(h, b.coeffs, SetSelection::Reference);
        let prod = raw_product(h, &bases, &a, &b)?;
        let e_ab = surplus::expectation(h, &prod, SetSelection::Reference);
        Ok(e_ab - mu_a * mu_b)
    }

    // ── Combined expansion ───────────────────────────────────────────

    fn combined_parts(&self) -> UqResult<(&IndexSetHierarchy, &SurplusCoefficients)> {
        let c = self
            .combined
            .as_ref()
            .ok_or_else(|| UqError::Precondition("no combined expansion".to_string()))?;
        Ok((&c.hierarchy, &c.coeffs))
    }

    pub fn combined_mean(&self) -> UqResult<f64> {
        self.require_all_random("combined mean")?;
        let (h, coeffs) = self.combined_parts()?;
        Ok(surplus::expectation(h, coeffs, SetSelection::All))
    }

    pub fn combined_variance(&self, driver: &HierarchSparseGridDriver) -> UqResult<f64> {
        self.require_all_random("combined variance")?;
        let (h, coeffs) = self.combined_parts()?;
        let bases = driver.bases();
        let interp = Interpolant::new(h, &bases, coeffs);
        let mu = surplus::expectation(h, coeffs, SetSelection::All);
        let sq = centered_product(h, &bases, &interp, mu, &interp, mu)?;
        Ok(surplus::expectation(h, &sq, SetSelection::All))
    }
}
