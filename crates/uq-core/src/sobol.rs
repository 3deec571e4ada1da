// ─────────────────────────────────────────────────────────────────────
// SCPN UQ Core — Sobol' Decomposition
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Variance-based sensitivity by dimension reduction.
//!
//! For a variable subset S the non-member variables are integrated out of
//! the interpolant, giving a member interpolant on the projected hierarchy.
//! Its variance V_S is the closed index of S; interaction terms follow by
//! subtracting the terms of every proper subset:
//!
//!   D_S = V_S - sum_{T < S} D_T,   S_S = D_S / V,   T_v = 1 - V_{~v} / V
//!
//! Only subsets that appear as the support of some multi-index can carry
//! variance, so the index map holds exactly those, ordered by cardinality.

use crate::coefficients::{SurplusCoefficients, SurplusLayout};
use crate::expansion::HierarchInterpExpansion;
use crate::interpolant::Interpolant;
use crate::moments::centered_product;
use crate::surplus::{self, SetSelection};
use std::collections::BTreeMap;
use uq_grid::driver::HierarchSparseGridDriver;
use uq_grid::hierarchy::IndexSetHierarchy;
use uq_math::basis::InterpolationBasis;
use uq_types::error::{UqError, UqResult};
use uq_types::state::{MultiIndex, VarSubset};

/// Surpluses of the interpolant with every non-member variable integrated
/// out, on the hierarchy projected onto `members`.
pub(crate) fn member_expansion(
    h: &IndexSetHierarchy,
    bases: &[&dyn InterpolationBasis],
    coeffs: &SurplusCoefficients,
    members: &[usize],
) -> UqResult<(IndexSetHierarchy, SurplusCoefficients)> {
    let n = h.num_vars();
    let reduced = h.project(bases, members)?;
    let with_t2 = coeffs.has_type2() && h.has_type2_weights();
    let layout = SurplusLayout {
        num_t2: if with_t2 { members.len() } else { 0 },
        num_grad: 0,
    };
    let mut out = SurplusCoefficients::default();
    out.allocate(&reduced, layout);

    // full dimension -> member position
    let mut member_pos: Vec<Option<usize>> = vec![None; n];
    for (i, &d) in members.iter().enumerate() {
        member_pos[d] = Some(i);
    }

    for lev in 0..coeffs.num_levels() {
        for set in 0..coeffs.num_sets(lev) {
            let alpha = h.multi_index(lev, set);
            let proj: MultiIndex = members.iter().map(|&d| alpha[d]).collect();
            let (rl, rs) = reduced.locate(&proj).ok_or_else(|| {
                UqError::StructureMismatch(format!("projection {proj:?} missing from reduced grid"))
            })?;
            let reduced_keys = reduced.colloc_key(rl, rs);
            for (pt, key) in h.colloc_key(lev, set).iter().enumerate() {
                let rkey: Vec<usize> = members.iter().map(|&d| key[d]).collect();
                let rpt = reduced_keys
                    .iter()
                    .position(|k| *k == rkey)
                    .ok_or_else(|| {
                        UqError::StructureMismatch(format!(
                            "reduced point {rkey:?} missing from set {proj:?}"
                        ))
                    })?;
                let w: Vec<f64> = (0..n)
                    .map(|d| match member_pos[d] {
                        Some(_) => 1.0,
                        None => bases[d].type1_weight(key[d], alpha[d]),
                    })
                    .collect();
                let w_non_member: f64 = w.iter().product();
                out.t1[rl][rs][rpt] += coeffs.t1[lev][set][pt] * w_non_member;

                if with_t2 {
                    for v in 0..n {
                        let c2 = coeffs.t2[lev][set][[pt, v]];
                        match member_pos[v] {
                            Some(rv) => out.t2[rl][rs][[rpt, rv]] += c2 * w_non_member,
                            None => {
                                let rest: f64 = w
                                    .iter()
                                    .enumerate()
                                    .filter(|&(d, _)| d != v)
                                    .map(|(_, x)| x)
                                    .product();
                                out.t1[rl][rs][rpt] +=
                                    c2 * bases[v].type2_weight(key[v], alpha[v]) * rest;
                            }
                        }
                    }
                }
            }
        }
    }
    Ok((reduced, out))
}

/// Non-empty supports of every multi-index, ordered by (cardinality, bits).
pub(crate) fn interaction_subsets(h: &IndexSetHierarchy) -> Vec<VarSubset> {
    let mut subsets: Vec<VarSubset> = Vec::new();
    for lev in 0..h.num_levels() {
        for alpha in h.level_sets(lev) {
            let s = VarSubset::support(alpha);
            if !s.is_empty() && !subsets.contains(&s) {
                subsets.push(s);
            }
        }
    }
    subsets.sort_by_key(|s| (s.len(), s.0));
    subsets
}

impl HierarchInterpExpansion {
    /// Rebuild the index map after a structural change; stored indices reset.
    pub(crate) fn resize_sobol_indices(&mut self, h: &IndexSetHierarchy) {
        let subsets = interaction_subsets(h);
        self.sobol_index_map = subsets.iter().enumerate().map(|(i, s)| (*s, i)).collect();
        self.sobol_indices = vec![0.0; subsets.len()];
        self.total_sobol = vec![0.0; self.config.num_vars];
        self.sobol_subsets = subsets;
    }

    /// Variance of the member interpolant of `subset` (closed Sobol' variance).
    pub fn partial_variance(
        &self,
        driver: &HierarchSparseGridDriver,
        subset: VarSubset,
    ) -> UqResult<f64> {
        self.require_all_random("Sobol' decomposition")?;
        let h = self.checked_hierarchy(driver)?;
        let members = subset.members(self.config.num_vars);
        if members.is_empty() {
            return Ok(0.0);
        }
        let bases = driver.bases();
        let coeffs = &self.populated()?.coeffs;
        let (reduced, member_coeffs) = member_expansion(h, &bases, coeffs, &members)?;
        let member_bases: Vec<&dyn InterpolationBasis> = members.iter().map(|&d| bases[d]).collect();
        let interp = Interpolant::new(&reduced, &member_bases, &member_coeffs);
        let mu = surplus::expectation(&reduced, &member_coeffs, SetSelection::All);
        let sq = centered_product(&reduced, &member_bases, &interp, mu, &interp, mu)?;
        let v = surplus::expectation(&reduced, &sq, SetSelection::All);
        log::trace!("partial variance of {:#b}: {v:.6e}", subset.0);
        Ok(v)
    }

    /// Main and interaction indices for every subset in the index map.
    pub fn compute_component_sobol(
        &mut self,
        driver: &HierarchSparseGridDriver,
    ) -> UqResult<&[f64]> {
        let var = self.variance(driver)?;
        let h = self.checked_hierarchy(driver)?;
        self.resize_sobol_indices(h);
        if var <= self.config.tolerances.variance {
            log::debug!(
                "expansion {}: variance {var:.3e} below tolerance, Sobol' indices left at zero",
                self.active_key
            );
            return Ok(&self.sobol_indices);
        }
        let subsets = self.sobol_subsets.clone();
        let mut terms = vec![0.0; subsets.len()];
        for (i, &s) in subsets.iter().enumerate() {
            let closed = self.partial_variance(driver, s)?;
            let lower: f64 = subsets[..i]
                .iter()
                .zip(&terms)
                .filter(|(t, _)| t.is_proper_subset_of(s))
                .map(|(_, d)| d)
                .sum();
            terms[i] = closed - lower;
        }
        self.sobol_indices = terms.into_iter().map(|d| d / var).collect();
        Ok(&self.sobol_indices)
    }

    /// Total index of every variable: 1 - V(complement) / V.
    pub fn compute_total_sobol(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<&[f64]> {
        let var = self.variance(driver)?;
        let n = self.config.num_vars;
        self.total_sobol = vec![0.0; n];
        if var <= self.config.tolerances.variance {
            return Ok(&self.total_sobol);
        }
        let mut totals = vec![0.0; n];
        for (v, total) in totals.iter_mut().enumerate() {
            let complement = VarSubset::singleton(v).complement(n);
            *total = 1.0 - self.partial_variance(driver, complement)? / var;
        }
        self.total_sobol = totals;
        Ok(&self.total_sobol)
    }

    pub fn sobol_index_map(&self) -> &BTreeMap<VarSubset, usize> {
        &self.sobol_index_map
    }

    pub fn sobol_indices(&self) -> &[f64] {
        &self.sobol_indices
    }

    pub fn total_sobol_indices(&self) -> &[f64] {
        &self.total_sobol
    }

    /// Stored component index of `subset`, if it is in the index map.
    pub fn sobol_index(&self, subset: VarSubset) -> Option<f64> {
        self.sobol_index_map
            .get(&subset)
            .map(|&i| self.sobol_indices[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;
    use uq_grid::sample::{SamplePoint, SampleStore};
    use uq_types::config::ExpansionConfig;

    fn build(
        config: ExpansionConfig,
        level: usize,
        f: impl Fn(&[f64]) -> f64,
    ) -> (HierarchSparseGridDriver, HierarchInterpExpansion) {
        let mut d = HierarchSparseGridDriver::from_config(&config).unwrap();
        d.initialize_isotropic(level).unwrap();
        let h = d.active_hierarchy();
        let bases = d.bases();
        let mut store = SampleStore::new();
        for lev in 0..h.num_levels() {
            for set in 0..h.num_sets(lev) {
                for pt in 0..h.num_points(lev, set) {
                    let x = h.point(&bases, lev, set, pt);
                    let v = f(&x);
                    store.push(SamplePoint::new(Array1::from(x), v));
                }
            }
        }
        let mut e = HierarchInterpExpansion::new(config).unwrap();
        e.allocate_arrays(&d).unwrap();
        e.compute_coefficients(&d, &store).unwrap();
        (d, e)
    }

    #[test]
    fn test_interaction_subsets_ordering() {
        let (d, _) = build(ExpansionConfig::new(3), 2, |_| 0.0);
        let subsets = interaction_subsets(d.active_hierarchy());
        let bits: Vec<u64> = subsets.iter().map(|s| s.0).collect();
        assert_eq!(bits, vec![0b001, 0b010, 0b100, 0b011, 0b101, 0b110]);
    }

    #[test]
    fn test_bilinear_component_indices() {
        // f = x + 2y + xy: D_x = 1/3, D_y = 4/3, D_xy = 1/9, V = 16/9
        let (d, mut e) = build(ExpansionConfig::new(2), 2, |x| x[0] + 2.0 * x[1] + x[0] * x[1]);
        let idx = e.compute_component_sobol(&d).unwrap().to_vec();
        assert_eq!(idx.len(), 3);
        assert!((e.sobol_index(VarSubset(0b01)).unwrap() - 3.0 / 16.0).abs() < 1e-12);
        assert!((e.sobol_index(VarSubset(0b10)).unwrap() - 0.75).abs() < 1e-12);
        assert!((e.sobol_index(VarSubset(0b11)).unwrap() - 1.0 / 16.0).abs() < 1e-12);
        assert!((idx.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_bilinear_total_indices() {
        let (d, mut e) = build(ExpansionConfig::new(2), 2, |x| x[0] + 2.0 * x[1] + x[0] * x[1]);
        let total = e.compute_total_sobol(&d).unwrap();
        assert!((total[0] - 0.25).abs() < 1e-12);
        assert!((total[1] - 13.0 / 16.0).abs() < 1e-12);
    }

    #[test]
    fn test_partial_variance_of_main_effect() {
        let (d, e) = build(ExpansionConfig::new(2), 2, |x| x[0] + 2.0 * x[1] + x[0] * x[1]);
        let v = e.partial_variance(&d, VarSubset::singleton(1)).unwrap();
        assert!((v - 4.0 / 3.0).abs() < 1e-12);
        assert_eq!(e.partial_variance(&d, VarSubset::empty()).unwrap(), 0.0);
    }

    #[test]
    fn test_zero_variance_gives_zero_indices() {
        let (d, mut e) = build(ExpansionConfig::new(2), 2, |_| 3.0);
        assert!(e.compute_component_sobol(&d).unwrap().iter().all(|&s| s == 0.0));
        assert!(e.compute_total_sobol(&d).unwrap().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_single_variable_total_index_is_one() {
        let (d, mut e) = build(ExpansionConfig::new(1), 2, |x| x[0] * x[0]);
        assert!((e.compute_total_sobol(&d).unwrap()[0] - 1.0).abs() < 1e-12);
        assert!((e.compute_component_sobol(&d).unwrap()[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_random_variables_rejected() {
        let config = ExpansionConfig {
            random_vars: Some(vec![true, false]),
            ..ExpansionConfig::new(2)
        };
        let (d, e) = build(config, 1, |x| x[0]);
        assert!(matches!(
            e.partial_variance(&d, VarSubset::singleton(0)),
            Err(UqError::Precondition(_))
        ));
    }
}
