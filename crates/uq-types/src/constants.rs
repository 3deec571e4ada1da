// ─────────────────────────────────────────────────────────────────────
// SCPN UQ Core — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Total variance below which Sobol' indices are reported as zero.
pub const DEFAULT_VARIANCE_TOL: f64 = 1e-14;

/// Standard deviation treated as numerically zero in reliability algebra.
pub const DEFAULT_ZERO_STD_TOL: f64 = 1e-12;

/// Relative tolerance when matching sample inputs to collocation points.
pub const COLLOCATION_MATCH_TOL: f64 = 1e-10;

/// Number of tracked moments when only mean and variance are requested.
pub const NUM_LOW_MOMENTS: usize = 2;

/// Number of tracked moments when skewness and kurtosis are also requested.
pub const NUM_ALL_MOMENTS: usize = 4;

/// Upper bound on variables (subsets are stored as 64-bit masks).
pub const MAX_VARIABLES: usize = 64;

/// Default depth of the precomputed 1-D point tables.
pub const DEFAULT_MAX_LEVEL: usize = 6;
