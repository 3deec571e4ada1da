// ─────────────────────────────────────────────────────────────────────
// SCPN UQ Core — UQ Core
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Hierarchical interpolation surplus engine.
//!
//! Surplus lifecycle, interpolant evaluation, moments with reference/delta
//! forms, and Sobol' decomposition by dimension reduction.

pub mod approximation;
pub mod coefficients;
pub mod expansion;
pub mod interpolant;
pub mod moments;
pub mod sobol;
pub mod surplus;

pub use approximation::PolyApproximation;
pub use expansion::{CombineType, HierarchInterpExpansion, LifecycleState};
