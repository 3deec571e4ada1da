// ─────────────────────────────────────────────────────────────────────
// SCPN UQ Core — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-dimension refinement depths of one tensor-product index set.
pub type MultiIndex = Vec<usize>;

/// Per-dimension 1-D point indices of one collocation point.
pub type CollocKey = Vec<usize>;

/// Opaque identifier selecting one of several parallel coefficient sets
/// (model fidelities, discretization levels, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ExpansionKey(pub u32);

impl fmt::Display for ExpansionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Memoization marker: bit 0 = value computed, bit 1 = gradient computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComputedFlags(u8);

impl ComputedFlags {
    pub const VALUE: u8 = 0b01;
    pub const GRADIENT: u8 = 0b10;

    pub fn has_value(self) -> bool {
        self.0 & Self::VALUE != 0
    }

    pub fn has_gradient(self) -> bool {
        self.0 & Self::GRADIENT != 0
    }

    pub fn mark_value(&mut self) {
        self.0 |= Self::VALUE;
    }

    pub fn mark_gradient(&mut self) {
        self.0 |= Self::GRADIENT;
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

/// Subset of input variables stored as a bitmask (bit d = variable d).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VarSubset(pub u64);

impl VarSubset {
    pub fn empty() -> Self {
        VarSubset(0)
    }

    pub fn full(num_vars: usize) -> Self {
        if num_vars >= 64 {
            VarSubset(u64::MAX)
        } else {
            VarSubset((1u64 << num_vars) - 1)
        }
    }

    pub fn singleton(var: usize) -> Self {
        VarSubset(1u64 << var)
    }

    /// Variables with a nonzero refinement depth in `multi_index`.
    pub fn support(multi_index: &[usize]) -> Self {
        let mut bits = 0u64;
        for (d, &l) in multi_index.iter().enumerate() {
            if l > 0 {
                bits |= 1u64 << d;
            }
        }
        VarSubset(bits)
    }

    pub fn contains(self, var: usize) -> bool {
        self.0 & (1u64 << var) != 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn complement(self, num_vars: usize) -> Self {
        VarSubset(!self.0 & Self::full(num_vars).0)
    }

    /// True when `self` is a subset of `other` and differs from it.
    pub fn is_proper_subset_of(self, other: VarSubset) -> bool {
        self.0 & other.0 == self.0 && self.0 != other.0
    }

    /// Member variables in ascending order.
    pub fn members(self, num_vars: usize) -> Vec<usize> {
        (0..num_vars).filter(|&d| self.contains(d)).collect()
    }
}
