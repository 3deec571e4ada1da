// ─────────────────────────────────────────────────────────────────────
// SCPN UQ Core — Hierarchical Sparse-Grid Driver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Owner of the index-set hierarchies (one per expansion key).
//!
//! The driver is the single writer of the grid structure. Expansion
//! engines borrow it read-only and mirror its shape in their coefficient
//! storage; every structural change (trial set, withdrawal, restoration)
//! goes through the driver first.

use crate::hierarchy::IndexSetHierarchy;
use std::collections::BTreeMap;
use uq_math::basis::{HermiteBasis, InterpolationBasis, LagrangeBasis};
use uq_types::config::{BasisKind, ExpansionConfig};
use uq_types::error::{UqError, UqResult};
use uq_types::state::{ExpansionKey, MultiIndex};

#[derive(Debug)]
pub struct HierarchSparseGridDriver {
    bases: Vec<Box<dyn InterpolationBasis>>,
    compute_type2: bool,
    active_key: ExpansionKey,
    hierarchies: BTreeMap<ExpansionKey, IndexSetHierarchy>,
    /// Append order of sets per key; the last entry is the most recent.
    history: BTreeMap<ExpansionKey, Vec<MultiIndex>>,
    /// Withdrawn sets per key, in withdrawal order.
    popped: BTreeMap<ExpansionKey, Vec<MultiIndex>>,
}

impl HierarchSparseGridDriver {
    pub fn new(bases: Vec<Box<dyn InterpolationBasis>>, compute_type2: bool) -> Self {
        let key = ExpansionKey::default();
        let num_vars = bases.len();
        let mut hierarchies = BTreeMap::new();
        hierarchies.insert(key, IndexSetHierarchy::new(num_vars, compute_type2));
        HierarchSparseGridDriver {
            bases,
            compute_type2,
            active_key: key,
            hierarchies,
            history: BTreeMap::new(),
            popped: BTreeMap::new(),
        }
    }

    /// Same 1-D basis in every dimension, chosen by the configuration.
    pub fn from_config(config: &ExpansionConfig) -> UqResult<Self> {
        config.validate()?;
        let bases: Vec<Box<dyn InterpolationBasis>> = (0..config.num_vars)
            .map(|_| match config.basis {
                BasisKind::Lagrange => {
                    Box::new(LagrangeBasis::clenshaw_curtis(config.max_level))
                        as Box<dyn InterpolationBasis>
                }
                BasisKind::Hermite => {
                    Box::new(HermiteBasis::clenshaw_curtis(config.max_level))
                        as Box<dyn InterpolationBasis>
                }
            })
            .collect();
        Ok(Self::new(bases, config.use_derivatives))
    }

    pub fn num_vars(&self) -> usize {
        self.bases.len()
    }

    pub fn computes_type2(&self) -> bool {
        self.compute_type2
    }

    pub fn bases(&self) -> Vec<&dyn InterpolationBasis> {
        self.bases.iter().map(|b| b.as_ref()).collect()
    }

    pub fn active_key(&self) -> ExpansionKey {
        self.active_key
    }

    /// Switch the active key, creating an empty hierarchy on first use.
    pub fn set_active_key(&mut self, key: ExpansionKey) {
        let (num_vars, t2) = (self.num_vars(), self.compute_type2);
        self.hierarchies
            .entry(key)
            .or_insert_with(|| IndexSetHierarchy::new(num_vars, t2));
        self.active_key = key;
    }

    pub fn hierarchy(&self, key: ExpansionKey) -> UqResult<&IndexSetHierarchy> {
        self.hierarchies.get(&key).ok_or(UqError::UnknownKey(key))
    }

    pub fn active_hierarchy(&self) -> &IndexSetHierarchy {
        &self.hierarchies[&self.active_key]
    }

    fn active_mut(&mut self) -> UqResult<&mut IndexSetHierarchy> {
        let key = self.active_key;
        self.hierarchies.get_mut(&key).ok_or(UqError::UnknownKey(key))
    }

    /// Rebuild the active hierarchy with every set of total level <= `level`.
    pub fn initialize_isotropic(&mut self, level: usize) -> UqResult<()> {
        let mut fresh = IndexSetHierarchy::new(self.num_vars(), self.compute_type2);
        let mut order = Vec::new();
        let bases = self.bases();
        for total in 0..=level {
            for alpha in multi_indices_of_level(self.num_vars(), total) {
                fresh.push_set(&bases, &alpha)?;
                order.push(alpha);
            }
        }
        fresh.update_reference();
        log::debug!(
            "driver {}: isotropic level {level}, {} sets, {} points",
            self.active_key,
            fresh.total_sets(),
            fresh.total_points()
        );
        let key = self.active_key;
        self.hierarchies.insert(key, fresh);
        self.history.insert(key, order);
        self.popped.remove(&key);
        Ok(())
    }

    /// Backward neighbours of `alpha` all present and `alpha` itself absent.
    pub fn is_admissible(&self, alpha: &[usize]) -> bool {
        let h = self.active_hierarchy();
        if alpha.len() != self.num_vars() || h.contains(alpha) {
            return false;
        }
        let mut back = alpha.to_vec();
        for d in 0..alpha.len() {
            if alpha[d] > 0 {
                back[d] -= 1;
                let ok = h.contains(&back);
                back[d] += 1;
                if !ok {
                    return false;
                }
            }
        }
        true
    }

    /// Admissible forward neighbours of the active hierarchy.
    pub fn candidate_sets(&self) -> Vec<MultiIndex> {
        let h = self.active_hierarchy();
        if h.is_empty() {
            return vec![vec![0; self.num_vars()]];
        }
        let mut out: Vec<MultiIndex> = Vec::new();
        for level in 0..h.num_levels() {
            for alpha in h.level_sets(level) {
                for d in 0..alpha.len() {
                    let mut fwd = alpha.clone();
                    fwd[d] += 1;
                    if fwd[d] <= self.bases[d].max_level()
                        && !out.contains(&fwd)
                        && self.is_admissible(&fwd)
                    {
                        out.push(fwd);
                    }
                }
            }
        }
        out
    }

    /// Propose a trial set; returns its (level, set) position.
    pub fn increment_set(&mut self, alpha: &[usize]) -> UqResult<(usize, usize)> {
        if !self.is_admissible(alpha) {
            return Err(UqError::Inadmissible(alpha.to_vec()));
        }
        self.append(alpha)
    }

    /// Append every admissible set of the next total level.
    pub fn increment_uniform(&mut self) -> UqResult<Vec<MultiIndex>> {
        let next = self
            .active_hierarchy()
            .max_active_level()
            .map_or(0, |l| l + 1);
        let candidates: Vec<MultiIndex> = multi_indices_of_level(self.num_vars(), next)
            .into_iter()
            .filter(|alpha| self.is_admissible(alpha))
            .collect();
        for alpha in &candidates {
            self.append(alpha)?;
        }
        log::debug!(
            "driver {}: uniform increment to level {next}, {} new sets",
            self.active_key,
            candidates.len()
        );
        Ok(candidates)
    }

    fn append(&mut self, alpha: &[usize]) -> UqResult<(usize, usize)> {
        let bases: Vec<&dyn InterpolationBasis> = self.bases.iter().map(|b| b.as_ref()).collect();
        let key = self.active_key;
        let pos = self
            .hierarchies
            .get_mut(&key)
            .ok_or(UqError::UnknownKey(key))?
            .push_set(&bases, alpha)?;
        self.history.entry(key).or_default().push(alpha.to_vec());
        Ok(pos)
    }

    /// Withdraw the most recently appended set; returns (level, multi-index).
    pub fn pop_set(&mut self) -> UqResult<(usize, MultiIndex)> {
        let key = self.active_key;
        let alpha = self
            .history
            .get_mut(&key)
            .and_then(Vec::pop)
            .ok_or_else(|| UqError::Precondition("no appended index set to withdraw".to_string()))?;
        let level: usize = alpha.iter().sum();
        let removed = self
            .active_mut()?
            .pop_set(level)
            .ok_or_else(|| UqError::StructureMismatch(format!("level {level} has no sets")))?;
        if removed.multi_index != alpha {
            return Err(UqError::StructureMismatch(format!(
                "most recent set {alpha:?} is not last in level {level}"
            )));
        }
        self.popped.entry(key).or_default().push(alpha.clone());
        log::debug!("driver {key}: withdrew set {alpha:?}");
        Ok((level, alpha))
    }

    /// Restore a withdrawn set; returns its new (level, set) position.
    pub fn push_set(&mut self, alpha: &[usize]) -> UqResult<(usize, usize)> {
        let key = self.active_key;
        let popped = self.popped.entry(key).or_default();
        let idx = popped
            .iter()
            .position(|m| m.as_slice() == alpha)
            .ok_or_else(|| UqError::PoppedSetNotFound {
                key,
                multi_index: alpha.to_vec(),
            })?;
        popped.remove(idx);
        let pos = self.append(alpha)?;
        log::debug!("driver {key}: restored set {alpha:?}");
        Ok(pos)
    }

    /// Restore every withdrawn set in withdrawal order.
    pub fn finalize_sets(&mut self) -> UqResult<Vec<(usize, usize)>> {
        let key = self.active_key;
        let pending = self.popped.remove(&key).unwrap_or_default();
        let mut positions = Vec::with_capacity(pending.len());
        for alpha in &pending {
            positions.push(self.append(alpha)?);
        }
        self.active_mut()?.update_reference();
        Ok(positions)
    }

    pub fn popped_sets(&self) -> &[MultiIndex] {
        self.popped
            .get(&self.active_key)
            .map_or(&[], Vec::as_slice)
    }

    pub fn clear_popped(&mut self) {
        self.popped.remove(&self.active_key);
    }

    /// Accept the current structure as the new reference grid.
    pub fn update_reference(&mut self) -> UqResult<()> {
        self.active_mut()?.update_reference();
        Ok(())
    }

    /// Union of the hierarchies of `keys` (ascending level, first appearance).
    pub fn combined_hierarchy(&self, keys: &[ExpansionKey]) -> UqResult<IndexSetHierarchy> {
        let mut sets: Vec<MultiIndex> = Vec::new();
        for &key in keys {
            let h = self.hierarchy(key)?;
            for level in 0..h.num_levels() {
                for alpha in h.level_sets(level) {
                    if !sets.contains(alpha) {
                        sets.push(alpha.clone());
                    }
                }
            }
        }
        sets.sort_by_key(|a| a.iter().sum::<usize>());
        let bases = self.bases();
        let mut combined = IndexSetHierarchy::with_implicit_map(self.num_vars(), self.compute_type2);
        for alpha in &sets {
            combined.push_set(&bases, alpha)?;
        }
        combined.update_reference();
        Ok(combined)
    }
}

/// All multi-indices of `num_vars` entries summing to `total`.
pub fn multi_indices_of_level(num_vars: usize, total: usize) -> Vec<MultiIndex> {
    let mut out = Vec::new();
    if num_vars == 0 {
        return out;
    }
    let mut current = vec![0usize; num_vars];
    enumerate_multi_index(0, total, &mut current, &mut out);
    out
}

fn enumerate_multi_index(
    dim: usize,
    remaining: usize,
    current: &mut [usize],
    out: &mut Vec<MultiIndex>,
) {
    if dim + 1 == current.len() {
        current[dim] = remaining;
        out.push(current.to_vec());
        return;
    }
    for v in (0..=remaining).rev() {
        current[dim] = v;
        enumerate_multi_index(dim + 1, remaining - v, current, out);
    }
}
