// ─────────────────────────────────────────────────────────────────────
// SCPN UQ Core — Index-Set Hierarchy
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Nested levels -> index sets -> collocation points.
//!
//! A set with multi-index `alpha` lives at level `|alpha|_1`. Its points are
//! the tensor product of the points new at depth `alpha_d` in each
//! dimension (first dimension varies fastest). Weights are products of the
//! 1-D hierarchical weights; type-2 weights swap in the derivative weight
//! in one dimension at a time.

use ndarray::{Array1, Array2};
use std::ops::Range;
use uq_math::basis::InterpolationBasis;
use uq_types::error::{UqError, UqResult};
use uq_types::state::{CollocKey, MultiIndex};

#[derive(Debug, Clone, Default)]
pub struct IndexSetHierarchy {
    num_vars: usize,
    compute_type2: bool,
    multi_index: Vec<Vec<MultiIndex>>,
    colloc_key: Vec<Vec<Vec<CollocKey>>>,
    /// Point -> sample index; `None` means sequential traversal order.
    colloc_indices: Option<Vec<Vec<Vec<usize>>>>,
    t1_weights: Vec<Vec<Array1<f64>>>,
    t2_weights: Vec<Vec<Array2<f64>>>,
    ref_set_counts: Vec<usize>,
}

/// Structure of a set removed from the hierarchy.
#[derive(Debug, Clone)]
pub struct RemovedSet {
    pub level: usize,
    pub multi_index: MultiIndex,
    pub num_points: usize,
}

impl IndexSetHierarchy {
    /// Hierarchy whose points map to samples through an explicit index map.
    pub fn new(num_vars: usize, compute_type2: bool) -> Self {
        IndexSetHierarchy {
            num_vars,
            compute_type2,
            colloc_indices: Some(Vec::new()),
            ..Default::default()
        }
    }

    /// Hierarchy whose points map to samples in level/set/point traversal order.
    pub fn with_implicit_map(num_vars: usize, compute_type2: bool) -> Self {
        IndexSetHierarchy {
            num_vars,
            compute_type2,
            colloc_indices: None,
            ..Default::default()
        }
    }

    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    pub fn has_type2_weights(&self) -> bool {
        self.compute_type2
    }

    pub fn num_levels(&self) -> usize {
        self.multi_index.len()
    }

    pub fn num_sets(&self, level: usize) -> usize {
        self.multi_index.get(level).map_or(0, Vec::len)
    }

    pub fn num_points(&self, level: usize, set: usize) -> usize {
        self.colloc_key[level][set].len()
    }

    pub fn total_points(&self) -> usize {
        self.colloc_key
            .iter()
            .flat_map(|sets| sets.iter().map(Vec::len))
            .sum()
    }

    pub fn total_sets(&self) -> usize {
        self.multi_index.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_sets() == 0
    }

    pub fn multi_index(&self, level: usize, set: usize) -> &MultiIndex {
        &self.multi_index[level][set]
    }

    pub fn level_sets(&self, level: usize) -> &[MultiIndex] {
        &self.multi_index[level]
    }

    pub fn colloc_key(&self, level: usize, set: usize) -> &[CollocKey] {
        &self.colloc_key[level][set]
    }

    pub fn type1_weights(&self, level: usize, set: usize) -> &Array1<f64> {
        &self.t1_weights[level][set]
    }

    /// Shape (points, variables); empty when type-2 weights are not tracked.
    pub fn type2_weights(&self, level: usize, set: usize) -> &Array2<f64> {
        &self.t2_weights[level][set]
    }

    pub fn has_explicit_map(&self) -> bool {
        self.colloc_indices.is_some()
    }

    pub fn contains(&self, multi_index: &[usize]) -> bool {
        self.locate(multi_index).is_some()
    }

    /// (level, set) position of `multi_index`.
    pub fn locate(&self, multi_index: &[usize]) -> Option<(usize, usize)> {
        let level: usize = multi_index.iter().sum();
        self.multi_index
            .get(level)?
            .iter()
            .position(|m| m.as_slice() == multi_index)
            .map(|set| (level, set))
    }

    /// Highest level holding at least one set.
    pub fn max_active_level(&self) -> Option<usize> {
        self.multi_index.iter().rposition(|sets| !sets.is_empty())
    }

    /// Sample index of a collocation point.
    pub fn sample_index(&self, level: usize, set: usize, pt: usize) -> usize {
        match &self.colloc_indices {
            Some(map) => map[level][set][pt],
            None => {
                let before_level: usize = self.colloc_key[..level]
                    .iter()
                    .flat_map(|sets| sets.iter().map(Vec::len))
                    .sum();
                let before_set: usize = self.colloc_key[level][..set].iter().map(Vec::len).sum();
                before_level + before_set + pt
            }
        }
    }

    /// Coordinates of a collocation point.
    pub fn point(
        &self,
        bases: &[&dyn InterpolationBasis],
        level: usize,
        set: usize,
        pt: usize,
    ) -> Vec<f64> {
        let alpha = &self.multi_index[level][set];
        let key = &self.colloc_key[level][set][pt];
        (0..self.num_vars)
            .map(|d| bases[d].points(alpha[d])[key[d]])
            .collect()
    }

    /// Sets of `level` that belong to the reference grid.
    pub fn reference_range(&self, level: usize) -> Range<usize> {
        let n = self.num_sets(level);
        0..self.ref_set_counts.get(level).copied().unwrap_or(0).min(n)
    }

    /// Sets of `level` added since the last reference update.
    pub fn increment_range(&self, level: usize) -> Range<usize> {
        self.reference_range(level).end..self.num_sets(level)
    }

    /// Number of reference sets on each level.
    pub fn reference_counts(&self) -> Vec<usize> {
        (0..self.num_levels())
            .map(|lev| self.reference_range(lev).end)
            .collect()
    }

    /// Mark every current set as part of the reference grid.
    pub fn update_reference(&mut self) {
        self.ref_set_counts = self.multi_index.iter().map(Vec::len).collect();
    }

    /// Append a set at level `|alpha|_1`; returns its (level, set) position.
    pub fn push_set(
        &mut self,
        bases: &[&dyn InterpolationBasis],
        alpha: &[usize],
    ) -> UqResult<(usize, usize)> {
        if alpha.len() != self.num_vars || bases.len() != self.num_vars {
            return Err(UqError::DimensionMismatch {
                expected: self.num_vars,
                got: alpha.len().min(bases.len()),
            });
        }
        for (d, &depth) in alpha.iter().enumerate() {
            if depth > bases[d].max_level() {
                return Err(UqError::LevelOutOfRange {
                    level: depth,
                    max_level: bases[d].max_level(),
                });
            }
        }
        if self.contains(alpha) {
            return Err(UqError::Inadmissible(alpha.to_vec()));
        }

        let level: usize = alpha.iter().sum();
        while self.multi_index.len() <= level {
            self.multi_index.push(Vec::new());
            self.colloc_key.push(Vec::new());
            self.t1_weights.push(Vec::new());
            self.t2_weights.push(Vec::new());
            if let Some(map) = self.colloc_indices.as_mut() {
                map.push(Vec::new());
            }
        }

        let keys = tensor_keys(bases, alpha);
        let n = keys.len();
        let mut t1 = Array1::zeros(n);
        let mut t2 = if self.compute_type2 {
            Array2::zeros((n, self.num_vars))
        } else {
            Array2::zeros((n, 0))
        };
        for (pt, key) in keys.iter().enumerate() {
            let w1: Vec<f64> = (0..self.num_vars)
                .map(|d| bases[d].type1_weight(key[d], alpha[d]))
                .collect();
            t1[pt] = w1.iter().product();
            if self.compute_type2 {
                for v in 0..self.num_vars {
                    let mut w = bases[v].type2_weight(key[v], alpha[v]);
                    for (d, &wd) in w1.iter().enumerate() {
                        if d != v {
                            w *= wd;
                        }
                    }
                    t2[[pt, v]] = w;
                }
            }
        }

        let start = self.total_points();
        if let Some(map) = self.colloc_indices.as_mut() {
            map[level].push((start..start + n).collect());
        }
        self.multi_index[level].push(alpha.to_vec());
        self.colloc_key[level].push(keys);
        self.t1_weights[level].push(t1);
        self.t2_weights[level].push(t2);
        Ok((level, self.multi_index[level].len() - 1))
    }

    /// Remove the last set of `level`.
    pub fn pop_set(&mut self, level: usize) -> Option<RemovedSet> {
        let multi_index = self.multi_index.get_mut(level)?.pop()?;
        let keys = self.colloc_key[level].pop().unwrap_or_default();
        self.t1_weights[level].pop();
        self.t2_weights[level].pop();
        if let Some(map) = self.colloc_indices.as_mut() {
            map[level].pop();
        }
        if let Some(count) = self.ref_set_counts.get_mut(level) {
            *count = (*count).min(self.multi_index[level].len());
        }
        Some(RemovedSet {
            level,
            multi_index,
            num_points: keys.len(),
        })
    }

    /// Reduced hierarchy over `members`, one set per distinct projection of
    /// the current multi-indices (ascending level, first appearance order).
    pub fn project(
        &self,
        bases: &[&dyn InterpolationBasis],
        members: &[usize],
    ) -> UqResult<IndexSetHierarchy> {
        let member_bases: Vec<&dyn InterpolationBasis> = members.iter().map(|&d| bases[d]).collect();
        let mut reduced = IndexSetHierarchy::with_implicit_map(members.len(), self.compute_type2);
        let mut projections: Vec<MultiIndex> = Vec::new();
        for sets in &self.multi_index {
            for alpha in sets {
                let proj: MultiIndex = members.iter().map(|&d| alpha[d]).collect();
                if !projections.contains(&proj) {
                    projections.push(proj);
                }
            }
        }
        projections.sort_by_key(|p| p.iter().sum::<usize>());
        for proj in &projections {
            reduced.push_set(&member_bases, proj)?;
        }
        reduced.update_reference();
        Ok(reduced)
    }
}

/// Tensor product of the new 1-D points of each dimension.
fn tensor_keys(bases: &[&dyn InterpolationBasis], alpha: &[usize]) -> Vec<CollocKey> {
    let per_dim: Vec<&[usize]> = alpha
        .iter()
        .enumerate()
        .map(|(d, &depth)| bases[d].new_point_indices(depth))
        .collect();
    let total: usize = per_dim.iter().map(|idx| idx.len()).product();
    let mut keys = Vec::with_capacity(total);
    let mut counter = vec![0usize; alpha.len()];
    for _ in 0..total {
        keys.push(
            counter
                .iter()
                .enumerate()
                .map(|(d, &c)| per_dim[d][c])
                .collect(),
        );
        for d in 0..alpha.len() {
            counter[d] += 1;
            if counter[d] < per_dim[d].len() {
                break;
            }
            counter[d] = 0;
        }
    }
    keys
}
