// ─────────────────────────────────────────────────────────────────────
// SCPN UQ Core — Hierarchical Interpolation Expansion
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Surplus coefficient engine for one response quantity.
//!
//! Lifecycle per expansion key:
//!   Unallocated -> Allocated -> Populated -> {Incremented <-> Decremented}
//! with Combined reachable from any populated state. Withdrawn sets are
//! parked in a (key, multi-index) keyed store and restored verbatim.
//!
//! The sparse-grid driver is borrowed for every call and never mutated
//! here; the caller updates the driver first, then mirrors the change
//! through the matching engine operation.

use crate::coefficients::{SetCoefficients, SurplusCoefficients, SurplusLayout};
use crate::interpolant::Interpolant;
use crate::surplus::{self, PointResponse};
use ndarray::Array1;
use std::collections::BTreeMap;
use uq_grid::driver::HierarchSparseGridDriver;
use uq_grid::hierarchy::IndexSetHierarchy;
use uq_grid::sample::SampleStore;
use uq_math::basis::InterpolationBasis;
use uq_types::config::{ExpansionConfig, RefinementPolicy};
use uq_types::constants::COLLOCATION_MATCH_TOL;
use uq_types::error::{UqError, UqResult};
use uq_types::state::{ComputedFlags, ExpansionKey, MultiIndex, VarSubset};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unallocated,
    Allocated,
    Populated,
    Incremented,
    Decremented,
    Combined,
}

impl LifecycleState {
    pub fn has_coefficients(self) -> bool {
        !matches!(self, LifecycleState::Unallocated | LifecycleState::Allocated)
    }
}

/// How several keys' interpolants are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineType {
    Add,
    Multiply,
}

/// Memoized statistics of one key; cleared on every coefficient mutation.
#[derive(Debug, Clone)]
pub(crate) struct MomentCache {
    pub mean: f64,
    pub mean_flags: ComputedFlags,
    pub mean_gradient: Array1<f64>,
    pub variance: f64,
    pub variance_flags: ComputedFlags,
    pub variance_gradient: Array1<f64>,
    /// (skewness, excess kurtosis)
    pub higher: Option<(f64, f64)>,
    pub mean_at: Option<(Vec<f64>, f64)>,
    pub variance_at: Option<(Vec<f64>, f64)>,
    pub reference: Array1<f64>,
    pub reference_computed: bool,
    pub delta: Array1<f64>,
    pub delta_computed: bool,
    /// Reference sets per level the reference/delta moments were taken over.
    pub reference_counts: Vec<usize>,
}

impl MomentCache {
    fn new(num_moments: usize) -> Self {
        MomentCache {
            mean: 0.0,
            mean_flags: ComputedFlags::default(),
            mean_gradient: Array1::zeros(0),
            variance: 0.0,
            variance_flags: ComputedFlags::default(),
            variance_gradient: Array1::zeros(0),
            higher: None,
            mean_at: None,
            variance_at: None,
            reference: Array1::zeros(num_moments),
            reference_computed: false,
            delta: Array1::zeros(num_moments),
            delta_computed: false,
            reference_counts: Vec::new(),
        }
    }

    pub fn resize(&mut self, num_moments: usize) {
        if self.reference.len() != num_moments {
            self.reference = Array1::zeros(num_moments);
            self.reference_computed = false;
        }
        if self.delta.len() != num_moments {
            self.delta = Array1::zeros(num_moments);
            self.delta_computed = false;
        }
    }

    pub fn clear(&mut self) {
        self.mean_flags.clear();
        self.variance_flags.clear();
        self.higher = None;
        self.mean_at = None;
        self.variance_at = None;
        self.reference_computed = false;
        self.delta_computed = false;
    }
}

#[derive(Debug, Clone)]
pub(crate) struct KeyedExpansion {
    pub coeffs: SurplusCoefficients,
    pub stats: MomentCache,
    pub state: LifecycleState,
}

/// Surplus representation on the union hierarchy of several keys.
#[derive(Debug, Clone)]
pub struct CombinedExpansion {
    pub keys: Vec<ExpansionKey>,
    pub kind: CombineType,
    pub hierarchy: IndexSetHierarchy,
    pub coeffs: SurplusCoefficients,
}

#[derive(Debug, Clone)]
pub struct HierarchInterpExpansion {
    pub(crate) config: ExpansionConfig,
    pub(crate) active_key: ExpansionKey,
    pub(crate) expansions: BTreeMap<ExpansionKey, KeyedExpansion>,
    pub(crate) popped: BTreeMap<(ExpansionKey, MultiIndex), SetCoefficients>,
    pub(crate) private_samples: Option<SampleStore>,
    /// Parallel to the private store's popped batches.
    pub(crate) popped_sample_order: Vec<(ExpansionKey, MultiIndex)>,
    pub(crate) sobol_subsets: Vec<VarSubset>,
    pub(crate) sobol_index_map: BTreeMap<VarSubset, usize>,
    pub(crate) sobol_indices: Vec<f64>,
    pub(crate) total_sobol: Vec<f64>,
    pub(crate) combined: Option<CombinedExpansion>,
}

impl HierarchInterpExpansion {
    pub fn new(config: ExpansionConfig) -> UqResult<Self> {
        config.validate()?;
        let key = ExpansionKey::default();
        let mut expansions = BTreeMap::new();
        expansions.insert(
            key,
            KeyedExpansion {
                coeffs: SurplusCoefficients::default(),
                stats: MomentCache::new(config.num_moments()),
                state: LifecycleState::Unallocated,
            },
        );
        Ok(HierarchInterpExpansion {
            total_sobol: vec![0.0; config.num_vars],
            config,
            active_key: key,
            expansions,
            popped: BTreeMap::new(),
            private_samples: None,
            popped_sample_order: Vec::new(),
            sobol_subsets: Vec::new(),
            sobol_index_map: BTreeMap::new(),
            sobol_indices: Vec::new(),
            combined: None,
        })
    }

    /// Engine that owns a filtered copy of the raw data; withdrawals and
    /// restorations are mirrored into it.
    pub fn with_private_samples(config: ExpansionConfig, samples: SampleStore) -> UqResult<Self> {
        let mut engine = Self::new(config)?;
        engine.private_samples = Some(samples);
        Ok(engine)
    }

    pub fn config(&self) -> &ExpansionConfig {
        &self.config
    }

    pub fn active_key(&self) -> ExpansionKey {
        self.active_key
    }

    /// Switch the active key, creating empty storage on first use.
    pub fn set_active_key(&mut self, key: ExpansionKey) {
        let n = self.config.num_moments();
        self.expansions.entry(key).or_insert_with(|| KeyedExpansion {
            coeffs: SurplusCoefficients::default(),
            stats: MomentCache::new(n),
            state: LifecycleState::Unallocated,
        });
        self.active_key = key;
    }

    pub fn state(&self) -> LifecycleState {
        self.expansions
            .get(&self.active_key)
            .map_or(LifecycleState::Unallocated, |e| e.state)
    }

    pub fn coefficients(&self) -> UqResult<&SurplusCoefficients> {
        Ok(&self.active()?.coeffs)
    }

    pub fn coefficients_for(&self, key: ExpansionKey) -> UqResult<&SurplusCoefficients> {
        self.expansions
            .get(&key)
            .map(|e| &e.coeffs)
            .ok_or(UqError::UnknownKey(key))
    }

    pub fn num_popped(&self) -> usize {
        self.popped
            .keys()
            .filter(|(k, _)| *k == self.active_key)
            .count()
    }

    pub fn private_samples(&self) -> Option<&SampleStore> {
        self.private_samples.as_ref()
    }

    pub fn private_samples_mut(&mut self) -> Option<&mut SampleStore> {
        self.private_samples.as_mut()
    }

    pub fn combined(&self) -> Option<&CombinedExpansion> {
        self.combined.as_ref()
    }

    pub fn layout(&self) -> SurplusLayout {
        SurplusLayout {
            num_t2: if self.config.use_derivatives {
                self.config.num_vars
            } else {
                0
            },
            num_grad: if self.config.coefficient_gradients {
                self.config.num_non_basis_vars
            } else {
                0
            },
        }
    }

    pub(crate) fn active(&self) -> UqResult<&KeyedExpansion> {
        self.expansions
            .get(&self.active_key)
            .ok_or(UqError::UnknownKey(self.active_key))
    }

    pub(crate) fn active_mut(&mut self) -> UqResult<&mut KeyedExpansion> {
        let key = self.active_key;
        self.expansions.get_mut(&key).ok_or(UqError::UnknownKey(key))
    }

    /// Active key's coefficients, failing when they have not been computed.
    pub(crate) fn populated(&self) -> UqResult<&KeyedExpansion> {
        let entry = self.active()?;
        if !entry.state.has_coefficients() {
            return Err(UqError::Precondition(format!(
                "coefficients for key {} have not been computed",
                self.active_key
            )));
        }
        Ok(entry)
    }

    pub(crate) fn check_driver(&self, driver: &HierarchSparseGridDriver) -> UqResult<()> {
        if driver.num_vars() != self.config.num_vars {
            return Err(UqError::DimensionMismatch {
                expected: self.config.num_vars,
                got: driver.num_vars(),
            });
        }
        if self.config.use_derivatives && !driver.computes_type2() {
            return Err(UqError::ConfigConflict(
                "derivative-enhanced expansion needs a driver with type-2 weights".to_string(),
            ));
        }
        Ok(())
    }

    fn check_same_key(&self, driver: &HierarchSparseGridDriver) -> UqResult<()> {
        if driver.active_key() != self.active_key {
            return Err(UqError::Precondition(format!(
                "driver key {} differs from expansion key {}",
                driver.active_key(),
                self.active_key
            )));
        }
        Ok(())
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Shape storage after the driver's current structure. Idempotent.
    pub fn allocate_arrays(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<()> {
        self.check_driver(driver)?;
        let h = driver.hierarchy(self.active_key)?;
        let layout = self.layout();
        let n_moments = self.config.num_moments();
        let entry = self.active_mut()?;
        let before = entry.coeffs.clone();
        entry.coeffs.allocate(h, layout);
        entry.stats.resize(n_moments);
        if entry.coeffs != before {
            entry.stats.clear();
        }
        if entry.state == LifecycleState::Unallocated {
            entry.state = LifecycleState::Allocated;
        }
        log::debug!(
            "expansion {}: allocated {} sets over {} levels",
            self.active_key,
            h.total_sets(),
            h.num_levels()
        );
        Ok(())
    }

    /// Compute every surplus from scratch against `samples` (or the
    /// private store when the engine owns one).
    pub fn compute_coefficients(
        &mut self,
        driver: &HierarchSparseGridDriver,
        samples: &SampleStore,
    ) -> UqResult<()> {
        self.check_driver(driver)?;
        let key = self.active_key;
        let h = driver.hierarchy(key)?;
        if h.num_sets(0) != 1 || h.num_points(0, 0) != 1 {
            return Err(UqError::Precondition(
                "level 0 must hold exactly one index set with one point".to_string(),
            ));
        }
        let bases = driver.bases();
        let layout = self.layout();
        let coeffs = {
            let store = self.store(samples);
            let mut response = sample_response(store, h, layout, self.config.num_vars);
            surplus::build(h, &bases, layout, &mut response)?
        };
        let n_moments = self.config.num_moments();
        let entry = self.active_mut()?;
        entry.coeffs = coeffs;
        entry.stats.resize(n_moments);
        entry.stats.clear();
        entry.state = LifecycleState::Populated;
        self.resize_sobol_indices(h);
        log::debug!(
            "expansion {key}: computed surpluses for {} points",
            h.total_points()
        );
        Ok(())
    }

    /// Compute surpluses for the sets the driver appended since the last
    /// coefficient update, reusing every existing surplus.
    ///
    /// Dimension-adaptive refinement expects exactly one new set; uniform
    /// refinement accepts any batch.
    pub fn increment_coefficients(
        &mut self,
        driver: &HierarchSparseGridDriver,
        samples: &SampleStore,
    ) -> UqResult<Vec<(usize, usize)>> {
        self.check_driver(driver)?;
        let key = self.active_key;
        let h = driver.hierarchy(key)?;
        self.populated()?;
        let existing = self.active()?.coeffs.total_sets();
        let pending = h.total_sets().saturating_sub(existing);
        if self.config.refinement == RefinementPolicy::DimensionAdaptive && pending != 1 {
            return Err(UqError::Precondition(format!(
                "dimension-adaptive increment expects one new index set, found {pending}"
            )));
        }
        let bases = driver.bases();
        let layout = self.layout();
        let num_vars = self.config.num_vars;
        let added = {
            let store = match &self.private_samples {
                Some(s) => s,
                None => samples,
            };
            let entry = self
                .expansions
                .get_mut(&key)
                .ok_or(UqError::UnknownKey(key))?;
            let mut response = sample_response(store, h, layout, num_vars);
            let added = surplus::extend(h, &bases, &mut entry.coeffs, layout, &mut response)?;
            entry.stats.clear();
            entry.state = LifecycleState::Incremented;
            added
        };
        self.resize_sobol_indices(h);
        log::debug!("expansion {key}: incremented {} sets", added.len());
        Ok(added)
    }

    /// Mirror the driver's withdrawal of its most recent set: move that
    /// set's surpluses into the popped store.
    pub fn decrement_coefficients(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<()> {
        self.check_same_key(driver)?;
        let key = self.active_key;
        let h = driver.hierarchy(key)?;
        let alpha = driver
            .popped_sets()
            .last()
            .cloned()
            .ok_or_else(|| UqError::Precondition("driver has no withdrawn set".to_string()))?;
        let level: usize = alpha.iter().sum();

        let coeffs = &self.active()?.coeffs;
        if coeffs.num_sets(level) != h.num_sets(level) + 1 {
            return Err(UqError::StructureMismatch(format!(
                "withdrawn set {alpha:?} is not the last coefficient set of level {level}"
            )));
        }
        let n_pts = coeffs.t1[level].last().map_or(0, |t1| t1.len());

        // a failed sample pop must leave the coefficients in place
        if let Some(store) = self.private_samples.as_mut() {
            store.pop(n_pts)?;
            self.popped_sample_order.push((key, alpha.clone()));
        }
        let entry = self.active_mut()?;
        let payload = entry
            .coeffs
            .pop_set(level)
            .ok_or_else(|| UqError::StructureMismatch(format!("level {level} is empty")))?;
        entry.stats.clear();
        entry.state = LifecycleState::Decremented;
        self.popped.insert((key, alpha.clone()), payload);
        self.active()?.coeffs.check_matches(h)?;
        self.resize_sobol_indices(h);
        log::debug!("expansion {key}: decremented set {alpha:?}");
        Ok(())
    }

    /// Mirror the driver's restoration of a withdrawn set.
    pub fn push_coefficients(
        &mut self,
        driver: &HierarchSparseGridDriver,
        alpha: &[usize],
    ) -> UqResult<()> {
        self.check_same_key(driver)?;
        let key = self.active_key;
        let h = driver.hierarchy(key)?;
        let (level, set) = h.locate(alpha).ok_or_else(|| {
            UqError::Precondition(format!("driver has not restored set {alpha:?}"))
        })?;
        if self.active()?.coeffs.num_sets(level) != set {
            return Err(UqError::StructureMismatch(format!(
                "restored set {alpha:?} is not next in level {level}"
            )));
        }
        let payload = self
            .popped
            .remove(&(key, alpha.to_vec()))
            .ok_or_else(|| UqError::PoppedSetNotFound {
                key,
                multi_index: alpha.to_vec(),
            })?;
        let entry = self.active_mut()?;
        entry.coeffs.push_set(level, payload);
        entry.stats.clear();
        entry.state = LifecycleState::Incremented;
        self.restore_private_batch(key, alpha)?;
        self.active()?.coeffs.check_matches(h)?;
        self.resize_sobol_indices(h);
        log::debug!("expansion {key}: restored set {alpha:?}");
        Ok(())
    }

    /// Mirror the driver's finalization: every withdrawn set the driver
    /// re-appended returns to active storage; popped bookkeeping is cleared.
    pub fn finalize_coefficients(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<()> {
        self.check_same_key(driver)?;
        let key = self.active_key;
        let h = driver.hierarchy(key)?;
        let mut restored: Vec<(usize, usize, MultiIndex)> = Vec::new();
        {
            let have: Vec<usize> = {
                let coeffs = &self.active()?.coeffs;
                coeffs.check_prefix_of(h)?;
                (0..h.num_levels()).map(|lev| coeffs.num_sets(lev)).collect()
            };
            for (lev, &start) in have.iter().enumerate() {
                for set in start..h.num_sets(lev) {
                    restored.push((lev, set, h.multi_index(lev, set).clone()));
                }
            }
        }
        for (lev, _, alpha) in &restored {
            let payload = self
                .popped
                .remove(&(key, alpha.clone()))
                .ok_or_else(|| UqError::PoppedSetNotFound {
                    key,
                    multi_index: alpha.clone(),
                })?;
            self.active_mut()?.coeffs.push_set(*lev, payload);
        }

        // Sample batches come back in the driver's append order.
        let mut by_sample: Vec<&(usize, usize, MultiIndex)> = restored.iter().collect();
        by_sample.sort_by_key(|(lev, set, _)| h.sample_index(*lev, *set, 0));
        for (_, _, alpha) in by_sample {
            self.restore_private_batch(key, alpha)?;
        }

        self.clear_popped();
        if let Some(store) = self.private_samples.as_mut() {
            store.clear_popped();
        }
        self.popped_sample_order.clear();

        let entry = self.active_mut()?;
        entry.stats.clear();
        entry.state = LifecycleState::Populated;
        self.active()?.coeffs.check_matches(h)?;
        self.resize_sobol_indices(h);
        log::debug!("expansion {key}: finalized {} sets", restored.len());
        Ok(())
    }

    fn restore_private_batch(&mut self, key: ExpansionKey, alpha: &[usize]) -> UqResult<()> {
        let Some(store) = self.private_samples.as_mut() else {
            return Ok(());
        };
        let pos = self
            .popped_sample_order
            .iter()
            .position(|(k, m)| *k == key && m.as_slice() == alpha)
            .ok_or_else(|| UqError::PoppedSetNotFound {
                key,
                multi_index: alpha.to_vec(),
            })?;
        store.push_popped(pos)?;
        self.popped_sample_order.remove(pos);
        Ok(())
    }

    /// Permanently discard the active key's withdrawn sets.
    pub fn clear_popped(&mut self) {
        let key = self.active_key;
        self.popped.retain(|(k, _), _| *k != key);
    }

    /// Merge the interpolants of `keys` (sum or product) onto the union
    /// hierarchy and store the result as the combined expansion.
    pub fn combine_coefficients(
        &mut self,
        driver: &HierarchSparseGridDriver,
        keys: &[ExpansionKey],
        kind: CombineType,
    ) -> UqResult<()> {
        self.check_driver(driver)?;
        if keys.is_empty() {
            return Err(UqError::Precondition(
                "combination needs at least one key".to_string(),
            ));
        }
        let bases = driver.bases();
        let layout = self.layout();
        let union = driver.combined_hierarchy(keys)?;

        let coeffs = {
            let mut parts: Vec<Interpolant<'_>> = Vec::with_capacity(keys.len());
            for &k in keys {
                let entry = self.expansions.get(&k).ok_or(UqError::UnknownKey(k))?;
                if !entry.state.has_coefficients() {
                    return Err(UqError::Precondition(format!(
                        "key {k} has no coefficients to combine"
                    )));
                }
                parts.push(Interpolant::new(driver.hierarchy(k)?, &bases, &entry.coeffs));
            }

            let all_vars: Vec<usize> = (0..self.config.num_vars).collect();
            let mut response = |_: usize, _: usize, _: usize, x: &[f64]| -> UqResult<PointResponse> {
                let values: Vec<f64> = parts.iter().map(|p| p.value(x)).collect();
                let grads: Option<Vec<Array1<f64>>> = (layout.num_t2 > 0).then(|| {
                    parts
                        .iter()
                        .map(|p| p.gradient_basis_dvv(x, &all_vars, usize::MAX))
                        .collect()
                });
                let nb_grads: Option<Vec<Array1<f64>>> = (layout.num_grad > 0)
                    .then(|| parts.iter().map(|p| p.gradient_non_basis(x)).collect());
                Ok(PointResponse {
                    value: combine_values(&values, kind),
                    gradient: grads.map(|g| combine_gradients(&values, &g, kind)),
                    non_basis_gradient: nb_grads.map(|g| combine_gradients(&values, &g, kind)),
                })
            };
            surplus::build(&union, &bases, layout, &mut response)?
        };

        self.combined = Some(CombinedExpansion {
            keys: keys.to_vec(),
            kind,
            hierarchy: union,
            coeffs,
        });
        let entry = self.active_mut()?;
        entry.stats.clear();
        if entry.state.has_coefficients() {
            entry.state = LifecycleState::Combined;
        }
        log::debug!("expansion: combined {} keys ({kind:?})", keys.len());
        Ok(())
    }

    // ── Evaluation ───────────────────────────────────────────────────

    pub(crate) fn interpolant<'a>(
        &'a self,
        driver: &'a HierarchSparseGridDriver,
        bases: &'a [&'a dyn InterpolationBasis],
    ) -> UqResult<Interpolant<'a>> {
        let entry = self.populated()?;
        let h = driver.hierarchy(self.active_key)?;
        entry.coeffs.check_prefix_of(h)?;
        Ok(Interpolant::new(h, bases, &entry.coeffs))
    }

    fn check_point(&self, x: &[f64]) -> UqResult<()> {
        if x.len() != self.config.num_vars {
            return Err(UqError::DimensionMismatch {
                expected: self.config.num_vars,
                got: x.len(),
            });
        }
        Ok(())
    }

    /// Interpolant value through every stored level.
    pub fn value(&self, driver: &HierarchSparseGridDriver, x: &[f64]) -> UqResult<f64> {
        self.value_through(driver, x, usize::MAX)
    }

    /// Partial interpolant through `level`.
    pub fn value_through(
        &self,
        driver: &HierarchSparseGridDriver,
        x: &[f64],
        level: usize,
    ) -> UqResult<f64> {
        self.check_point(x)?;
        let bases = driver.bases();
        Ok(self.interpolant(driver, &bases)?.value_through(x, level))
    }

    /// Interpolant restricted to the sets supported inside `subset`.
    pub fn value_subset(
        &self,
        driver: &HierarchSparseGridDriver,
        x: &[f64],
        subset: VarSubset,
    ) -> UqResult<f64> {
        self.check_point(x)?;
        let bases = driver.bases();
        Ok(self.interpolant(driver, &bases)?.value_subset(x, subset))
    }

    pub fn gradient_basis(
        &self,
        driver: &HierarchSparseGridDriver,
        x: &[f64],
    ) -> UqResult<Array1<f64>> {
        self.check_point(x)?;
        let bases = driver.bases();
        Ok(self.interpolant(driver, &bases)?.gradient_basis(x))
    }

    /// Gradient w.r.t. the listed expansion variables.
    pub fn gradient_basis_dvv(
        &self,
        driver: &HierarchSparseGridDriver,
        x: &[f64],
        dvv: &[usize],
    ) -> UqResult<Array1<f64>> {
        self.check_point(x)?;
        if let Some(&bad) = dvv.iter().find(|&&v| v >= self.config.num_vars) {
            return Err(UqError::DimensionMismatch {
                expected: self.config.num_vars,
                got: bad,
            });
        }
        let bases = driver.bases();
        Ok(self
            .interpolant(driver, &bases)?
            .gradient_basis_dvv(x, dvv, usize::MAX))
    }

    /// Gradient w.r.t. the non-basis variables.
    pub fn gradient_non_basis(
        &self,
        driver: &HierarchSparseGridDriver,
        x: &[f64],
    ) -> UqResult<Array1<f64>> {
        self.check_point(x)?;
        if !self.config.coefficient_gradients {
            return Err(UqError::Precondition(
                "coefficient gradients were not requested".to_string(),
            ));
        }
        let bases = driver.bases();
        Ok(self.interpolant(driver, &bases)?.gradient_non_basis(x))
    }

    /// Value of the combined expansion.
    pub fn combined_value(&self, driver: &HierarchSparseGridDriver, x: &[f64]) -> UqResult<f64> {
        self.check_point(x)?;
        let combined = self
            .combined
            .as_ref()
            .ok_or_else(|| UqError::Precondition("no combined expansion".to_string()))?;
        let bases = driver.bases();
        Ok(Interpolant::new(&combined.hierarchy, &bases, &combined.coeffs).value(x))
    }
}

fn combine_values(values: &[f64], kind: CombineType) -> f64 {
    match kind {
        CombineType::Add => values.iter().sum(),
        CombineType::Multiply => values.iter().product(),
    }
}

fn combine_gradients(values: &[f64], grads: &[Array1<f64>], kind: CombineType) -> Array1<f64> {
    let mut out = Array1::zeros(grads.first().map_or(0, |g| g.len()));
    for (k, g) in grads.iter().enumerate() {
        let scale = match kind {
            CombineType::Add => 1.0,
            CombineType::Multiply => values
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != k)
                .map(|(_, v)| v)
                .product(),
        };
        out.scaled_add(scale, g);
    }
    out
}

/// Raw-data response with the collocation-point ordering precondition.
fn sample_response<'s>(
    store: &'s SampleStore,
    h: &'s IndexSetHierarchy,
    layout: SurplusLayout,
    num_vars: usize,
) -> impl FnMut(usize, usize, usize, &[f64]) -> UqResult<PointResponse> + 's {
    move |lev, set, pt, x| {
        let idx = h.sample_index(lev, set, pt);
        let sample = store.get(idx).ok_or_else(|| {
            UqError::Precondition(format!(
                "no sample {idx} for level {lev} set {set} point {pt} (store has {})",
                store.len()
            ))
        })?;
        if sample.vars.len() != num_vars {
            return Err(UqError::DimensionMismatch {
                expected: num_vars,
                got: sample.vars.len(),
            });
        }
        for (d, (&s, &c)) in sample.vars.iter().zip(x).enumerate() {
            if (s - c).abs() > COLLOCATION_MATCH_TOL * c.abs().max(1.0) {
                return Err(UqError::Precondition(format!(
                    "sample {idx} coordinate {d} = {s} does not match collocation point {c}"
                )));
            }
        }
        Ok(PointResponse {
            value: sample.value,
            gradient: if layout.num_t2 > 0 {
                sample.gradient.clone()
            } else {
                None
            },
            non_basis_gradient: if layout.num_grad > 0 {
                sample.non_basis_gradient.clone()
            } else {
                None
            },
        })
    }
}

impl HierarchInterpExpansion {
    fn store<'a>(&'a self, shared: &'a SampleStore) -> &'a SampleStore {
        self.private_samples.as_ref().unwrap_or(shared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uq_grid::sample::SamplePoint;
    use uq_types::config::RefinementPolicy;

    /// Samples of `f` at every point of the driver's active grid, in
    /// sample-index order.
    fn samples_for(driver: &HierarchSparseGridDriver, f: impl Fn(&[f64]) -> f64) -> SampleStore {
        let h = driver.active_hierarchy();
        let bases = driver.bases();
        let mut pts: Vec<(usize, Vec<f64>)> = Vec::new();
        for lev in 0..h.num_levels() {
            for set in 0..h.num_sets(lev) {
                for pt in 0..h.num_points(lev, set) {
                    pts.push((h.sample_index(lev, set, pt), h.point(&bases, lev, set, pt)));
                }
            }
        }
        pts.sort_by_key(|(i, _)| *i);
        let mut store = SampleStore::new();
        for (_, x) in pts {
            let v = f(&x);
            store.push(SamplePoint::new(Array1::from(x), v));
        }
        store
    }

    fn bilinear(x: &[f64]) -> f64 {
        1.0 + x[0] - 0.5 * x[1] + 2.0 * x[0] * x[1] + x[0] * x[0]
    }

    fn setup(
        config: ExpansionConfig,
        level: usize,
        f: impl Fn(&[f64]) -> f64,
    ) -> (HierarchSparseGridDriver, HierarchInterpExpansion) {
        let mut d = HierarchSparseGridDriver::from_config(&config).unwrap();
        d.initialize_isotropic(level).unwrap();
        let mut e = HierarchInterpExpansion::new(config).unwrap();
        e.allocate_arrays(&d).unwrap();
        e.compute_coefficients(&d, &samples_for(&d, f)).unwrap();
        (d, e)
    }

    #[test]
    fn test_lifecycle_states() {
        let config = ExpansionConfig::new(1);
        let mut d = HierarchSparseGridDriver::from_config(&config).unwrap();
        d.initialize_isotropic(1).unwrap();
        let mut e = HierarchInterpExpansion::new(config).unwrap();
        assert_eq!(e.state(), LifecycleState::Unallocated);
        e.allocate_arrays(&d).unwrap();
        assert_eq!(e.state(), LifecycleState::Allocated);
        e.compute_coefficients(&d, &samples_for(&d, |x| x[0])).unwrap();
        assert_eq!(e.state(), LifecycleState::Populated);
        d.increment_set(&[2]).unwrap();
        e.increment_coefficients(&d, &samples_for(&d, |x| x[0])).unwrap();
        assert_eq!(e.state(), LifecycleState::Incremented);
        d.pop_set().unwrap();
        e.decrement_coefficients(&d).unwrap();
        assert_eq!(e.state(), LifecycleState::Decremented);
    }

    #[test]
    fn test_linear_scenario_surpluses() {
        let (d, e) = setup(ExpansionConfig::new(1), 1, |x| x[0]);
        let c = e.coefficients().unwrap();
        assert_eq!(c.t1[0][0][0], 0.0);
        assert!((c.t1[1][0][0] + 1.0).abs() < 1e-15);
        assert!((c.t1[1][0][1] - 1.0).abs() < 1e-15);
        assert!((e.value(&d, &[0.4]).unwrap() - 0.4).abs() < 1e-14);
    }

    #[test]
    fn test_allocate_twice_is_idempotent() {
        let (d, mut e) = setup(ExpansionConfig::new(2), 2, bilinear);
        let before = e.coefficients().unwrap().clone();
        e.allocate_arrays(&d).unwrap();
        e.allocate_arrays(&d).unwrap();
        assert_eq!(e.coefficients().unwrap(), &before);
    }

    #[test]
    fn test_interpolant_reproduces_training_data() {
        let f = |x: &[f64]| (x[0] - 0.3 * x[1]).exp();
        let (d, e) = setup(ExpansionConfig::new(2), 3, f);
        let h = d.active_hierarchy();
        let bases = d.bases();
        for lev in 0..h.num_levels() {
            for set in 0..h.num_sets(lev) {
                for pt in 0..h.num_points(lev, set) {
                    let x = h.point(&bases, lev, set, pt);
                    assert!((e.value(&d, &x).unwrap() - f(&x)).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_value_through_and_subset() {
        let (d, e) = setup(ExpansionConfig::new(2), 2, bilinear);
        let x = [0.5, 0.7];
        assert!((e.value(&d, &x).unwrap() - bilinear(&x)).abs() < 1e-12);
        assert_eq!(e.value_through(&d, &x, 0).unwrap(), 1.0);
        // sets supported on {x0} interpolate f(x0, 0)
        let along = e.value_subset(&d, &x, VarSubset::singleton(0)).unwrap();
        assert!((along - bilinear(&[0.5, 0.0])).abs() < 1e-12);
        let g = e.gradient_basis(&d, &x).unwrap();
        assert!((g[0] - (1.0 + 2.0 * 0.7 + 1.0)).abs() < 1e-11);
        assert!((g[1] - (-0.5 + 1.0)).abs() < 1e-11);
        let gy = e.gradient_basis_dvv(&d, &x, &[1]).unwrap();
        assert_eq!(gy.len(), 1);
        assert!((gy[0] - g[1]).abs() < 1e-14);
        assert!(e.value(&d, &[0.5]).is_err());
    }

    #[test]
    fn test_sample_order_is_checked() {
        let config = ExpansionConfig::new(1);
        let mut d = HierarchSparseGridDriver::from_config(&config).unwrap();
        d.initialize_isotropic(1).unwrap();
        let mut e = HierarchInterpExpansion::new(config).unwrap();
        e.allocate_arrays(&d).unwrap();

        let mut shuffled = SampleStore::new();
        for x in [-1.0, 0.0, 1.0] {
            shuffled.push(SamplePoint::new(Array1::from(vec![x]), x));
        }
        assert!(matches!(
            e.compute_coefficients(&d, &shuffled),
            Err(UqError::Precondition(_))
        ));

        let mut short = SampleStore::new();
        short.push(SamplePoint::new(Array1::from(vec![0.0]), 0.0));
        assert!(matches!(
            e.compute_coefficients(&d, &short),
            Err(UqError::Precondition(_))
        ));
        assert_eq!(e.state(), LifecycleState::Allocated);
    }

    #[test]
    fn test_driver_without_type2_weights_rejected() {
        let d = HierarchSparseGridDriver::from_config(&ExpansionConfig::new(1)).unwrap();
        let mut e = HierarchInterpExpansion::new(ExpansionConfig::gradient_enhanced(1)).unwrap();
        assert!(matches!(
            e.allocate_arrays(&d),
            Err(UqError::ConfigConflict(_))
        ));
    }

    #[test]
    fn test_gradient_enhanced_cubic_is_exact() {
        let config = ExpansionConfig::gradient_enhanced(1);
        let mut d = HierarchSparseGridDriver::from_config(&config).unwrap();
        d.initialize_isotropic(1).unwrap();
        let mut store = SampleStore::new();
        for x in [0.0, -1.0, 1.0] {
            store.push(
                SamplePoint::new(Array1::from(vec![x]), x * x * x)
                    .with_gradient(Array1::from(vec![3.0 * x * x])),
            );
        }
        let mut e = HierarchInterpExpansion::new(config).unwrap();
        e.allocate_arrays(&d).unwrap();
        e.compute_coefficients(&d, &store).unwrap();
        assert!((e.value(&d, &[0.3]).unwrap() - 0.027).abs() < 1e-12);
        assert!((e.gradient_basis(&d, &[0.3]).unwrap()[0] - 0.27).abs() < 1e-11);
        assert!(e.mean(&d).unwrap().abs() < 1e-14);
        // Hermite interpolant of x^6 on {-1, 0, 1} is 2x^4 - x^2
        assert!((e.variance(&d).unwrap() - 1.0 / 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_basis_gradient_surpluses() {
        let config = ExpansionConfig {
            num_non_basis_vars: 1,
            coefficient_gradients: true,
            ..ExpansionConfig::new(1)
        };
        // R(x; s) = s x + s^2 at s = 2: dR/ds = x + 2 s
        let mut d = HierarchSparseGridDriver::from_config(&config).unwrap();
        d.initialize_isotropic(1).unwrap();
        let mut store = SampleStore::new();
        for x in [0.0, -1.0, 1.0] {
            store.push(
                SamplePoint::new(Array1::from(vec![x]), 2.0 * x + 4.0)
                    .with_non_basis_gradient(Array1::from(vec![x + 4.0])),
            );
        }
        let mut e = HierarchInterpExpansion::new(config).unwrap();
        e.allocate_arrays(&d).unwrap();
        e.compute_coefficients(&d, &store).unwrap();
        assert!((e.gradient_non_basis(&d, &[0.5]).unwrap()[0] - 4.5).abs() < 1e-13);
        assert!((e.mean_gradient(&d).unwrap()[0] - 4.0).abs() < 1e-13);
        // Var = s^2 / 3, dVar/ds = 2 s / 3
        assert!((e.variance_gradient(&d).unwrap()[0] - 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_adaptive_increment_requires_single_set() {
        let (mut d, mut e) = setup(ExpansionConfig::new(2), 1, bilinear);
        d.increment_set(&[2, 0]).unwrap();
        d.increment_set(&[1, 1]).unwrap();
        let store = samples_for(&d, bilinear);
        assert!(matches!(
            e.increment_coefficients(&d, &store),
            Err(UqError::Precondition(_))
        ));
    }

    #[test]
    fn test_uniform_increment_accepts_batch() {
        let config = ExpansionConfig {
            refinement: RefinementPolicy::Uniform,
            ..ExpansionConfig::new(2)
        };
        let (mut d, mut e) = setup(config, 1, bilinear);
        let added = d.increment_uniform().unwrap();
        assert_eq!(added.len(), 3);
        let store = samples_for(&d, bilinear);
        let positions = e.increment_coefficients(&d, &store).unwrap();
        assert_eq!(positions, vec![(2, 0), (2, 1), (2, 2)]);
        assert!((e.value(&d, &[0.2, -0.6]).unwrap() - bilinear(&[0.2, -0.6])).abs() < 1e-12);
    }

    #[test]
    fn test_decrement_then_push_restores_bit_for_bit() {
        let f = |x: &[f64]| (x[0] * x[1]).sin() + x[1];
        let (mut d, mut e) = setup(ExpansionConfig::new(2), 2, f);
        d.increment_set(&[3, 0]).unwrap();
        e.increment_coefficients(&d, &samples_for(&d, f)).unwrap();
        let coeffs = e.coefficients().unwrap().clone();
        let mean = e.mean(&d).unwrap();
        let var = e.variance(&d).unwrap();

        let (_, alpha) = d.pop_set().unwrap();
        e.decrement_coefficients(&d).unwrap();
        assert_eq!(e.num_popped(), 1);
        assert_eq!(e.coefficients().unwrap().num_sets(3), 0);

        d.push_set(&alpha).unwrap();
        e.push_coefficients(&d, &alpha).unwrap();
        assert_eq!(e.num_popped(), 0);
        assert_eq!(e.coefficients().unwrap(), &coeffs);
        assert_eq!(e.mean(&d).unwrap().to_bits(), mean.to_bits());
        assert_eq!(e.variance(&d).unwrap().to_bits(), var.to_bits());
    }

    #[test]
    fn test_push_unknown_set_fails() {
        let (mut d, mut e) = setup(ExpansionConfig::new(1), 1, |x| x[0]);
        d.increment_set(&[2]).unwrap();
        assert!(matches!(
            e.push_coefficients(&d, &[2]),
            Err(UqError::StructureMismatch(_)) | Err(UqError::PoppedSetNotFound { .. })
        ));
    }

    #[test]
    fn test_private_samples_follow_withdrawal_and_finalize() {
        let config = ExpansionConfig::new(2);
        let mut d = HierarchSparseGridDriver::from_config(&config).unwrap();
        d.initialize_isotropic(1).unwrap();
        let mut e =
            HierarchInterpExpansion::with_private_samples(config, samples_for(&d, bilinear)).unwrap();
        let shared = SampleStore::new();
        e.allocate_arrays(&d).unwrap();
        e.compute_coefficients(&d, &shared).unwrap();

        let sync = |e: &mut HierarchInterpExpansion, d: &HierarchSparseGridDriver| {
            let full = samples_for(d, bilinear);
            let store = e.private_samples_mut().unwrap();
            for i in store.len()..full.len() {
                store.push(full.points()[i].clone());
            }
        };

        d.increment_set(&[2, 0]).unwrap();
        sync(&mut e, &d);
        e.increment_coefficients(&d, &shared).unwrap();
        assert_eq!(e.private_samples().unwrap().len(), 7);

        d.pop_set().unwrap();
        e.decrement_coefficients(&d).unwrap();
        assert_eq!(e.private_samples().unwrap().len(), 5);
        assert_eq!(e.private_samples().unwrap().num_popped(), 1);

        d.increment_set(&[0, 2]).unwrap();
        sync(&mut e, &d);
        e.increment_coefficients(&d, &shared).unwrap();

        d.finalize_sets().unwrap();
        e.finalize_coefficients(&d).unwrap();
        assert_eq!(e.state(), LifecycleState::Populated);
        assert_eq!(e.num_popped(), 0);
        let store = e.private_samples().unwrap();
        assert_eq!(store.len(), 9);
        assert_eq!(store.num_popped(), 0);

        // restored batch sits at the sample indices the driver assigned
        let h = d.active_hierarchy();
        let bases = d.bases();
        let (lev, set) = h.locate(&[2, 0]).unwrap();
        for pt in 0..h.num_points(lev, set) {
            let idx = h.sample_index(lev, set, pt);
            let x = h.point(&bases, lev, set, pt);
            assert_eq!(store.get(idx).unwrap().vars.to_vec(), x);
        }
        assert!((e.value(&d, &[0.1, 0.9]).unwrap() - bilinear(&[0.1, 0.9])).abs() < 1e-12);
    }

    #[test]
    fn test_failed_sample_withdrawal_keeps_coefficients() {
        let config = ExpansionConfig::new(2);
        let mut d = HierarchSparseGridDriver::from_config(&config).unwrap();
        d.initialize_isotropic(1).unwrap();
        d.increment_set(&[2, 0]).unwrap();
        let mut e =
            HierarchInterpExpansion::with_private_samples(config, samples_for(&d, bilinear)).unwrap();
        let shared = SampleStore::new();
        e.allocate_arrays(&d).unwrap();
        e.compute_coefficients(&d, &shared).unwrap();
        let before = e.coefficients().unwrap().clone();

        // store emptied behind the engine's back
        let n = e.private_samples().unwrap().len();
        e.private_samples_mut().unwrap().pop(n).unwrap();

        d.pop_set().unwrap();
        assert!(matches!(
            e.decrement_coefficients(&d),
            Err(UqError::Precondition(_))
        ));
        assert_eq!(e.num_popped(), 0);
        assert_eq!(e.coefficients().unwrap(), &before);
        assert_eq!(e.state(), LifecycleState::Populated);
        assert_eq!(e.private_samples().unwrap().num_popped(), 1);
    }

    #[test]
    fn test_clear_popped_discards_withdrawn_sets() {
        let (mut d, mut e) = setup(ExpansionConfig::new(1), 1, |x| x[0]);
        d.increment_set(&[2]).unwrap();
        e.increment_coefficients(&d, &samples_for(&d, |x| x[0])).unwrap();
        let (_, alpha) = d.pop_set().unwrap();
        e.decrement_coefficients(&d).unwrap();
        e.clear_popped();
        d.push_set(&alpha).unwrap();
        assert!(matches!(
            e.push_coefficients(&d, &alpha),
            Err(UqError::PoppedSetNotFound { .. })
        ));
    }

    #[test]
    fn test_combine_add_and_multiply() {
        let config = ExpansionConfig::new(1);
        let mut d = HierarchSparseGridDriver::from_config(&config).unwrap();
        let mut e = HierarchInterpExpansion::new(config).unwrap();
        let (k0, k1) = (ExpansionKey(0), ExpansionKey(1));

        d.initialize_isotropic(1).unwrap();
        e.allocate_arrays(&d).unwrap();
        e.compute_coefficients(&d, &samples_for(&d, |x| x[0])).unwrap();

        d.set_active_key(k1);
        e.set_active_key(k1);
        d.initialize_isotropic(2).unwrap();
        e.allocate_arrays(&d).unwrap();
        e.compute_coefficients(&d, &samples_for(&d, |x| x[0] * x[0])).unwrap();

        e.combine_coefficients(&d, &[k0, k1], CombineType::Add).unwrap();
        assert_eq!(e.state(), LifecycleState::Combined);
        assert!((e.combined_value(&d, &[0.3]).unwrap() - 0.39).abs() < 1e-13);
        assert!((e.combined_mean().unwrap() - 1.0 / 3.0).abs() < 1e-13);
        assert!((e.combined_variance(&d).unwrap() - (1.0 / 3.0 + 4.0 / 45.0)).abs() < 1e-12);

        e.combine_coefficients(&d, &[k0, k1], CombineType::Multiply).unwrap();
        assert!((e.combined_value(&d, &[0.5]).unwrap() - 0.125).abs() < 1e-13);
        assert!(e.combined_mean().unwrap().abs() < 1e-14);

        assert!(matches!(
            e.combine_coefficients(&d, &[k0, ExpansionKey(7)], CombineType::Add),
            Err(UqError::UnknownKey(_))
        ));
    }
}
