// ─────────────────────────────────────────────────────────────────────
// SCPN UQ Core — Incremental Reliability Algebra
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Increments of standard deviation, reliability index and response
//! threshold between a reference state (mu0, sigma0) and a refined state
//! (mu0 + dmu, sigma0 + dsigma).
//!
//!   dsigma     = sigma0 * sqrt1pm1(dvar / var0)
//!   dbeta_cdf  = (dmu sigma0 - (mu0 - z) dsigma) / (sigma0 sigma1)
//!   dbeta_ccdf = -(dmu sigma0 + (z - mu0) dsigma) / (sigma0 sigma1)
//!   dz         = dmu -/+ beta dsigma   (cdf / ccdf)

use crate::special::sqrt1pm1;

/// Change in standard deviation given reference and incremental variance.
pub fn delta_std_deviation(ref_variance: f64, delta_variance: f64, zero_tol: f64) -> f64 {
    let ref_var = ref_variance.max(0.0);
    let ref_std = ref_var.sqrt();
    if ref_std <= zero_tol {
        return (ref_var + delta_variance).max(0.0).sqrt() - ref_std;
    }
    ref_std * sqrt1pm1(delta_variance / ref_var)
}

/// Moments of the reference state and their increments.
#[derive(Debug, Clone, Copy)]
pub struct MomentIncrement {
    pub ref_mean: f64,
    pub ref_std: f64,
    pub delta_mean: f64,
    pub delta_std: f64,
}

impl MomentIncrement {
    pub fn new_std(&self) -> f64 {
        self.ref_std + self.delta_std
    }
}

/// Change in reliability index for response threshold `z_bar`.
///
/// A numerically zero standard deviation drops the corresponding beta term.
pub fn delta_beta(m: &MomentIncrement, cdf: bool, z_bar: f64, zero_tol: f64) -> f64 {
    let sigma0 = m.ref_std;
    let sigma1 = m.new_std();
    let zero0 = sigma0.abs() <= zero_tol;
    let zero1 = sigma1.abs() <= zero_tol;

    let beta = |mean: f64, sigma: f64| {
        if cdf {
            (mean - z_bar) / sigma
        } else {
            (z_bar - mean) / sigma
        }
    };

    match (zero0, zero1) {
        (true, true) => {
            log::warn!("delta_beta: reference and refined standard deviations are both zero");
            0.0
        }
        (true, false) => beta(m.ref_mean + m.delta_mean, sigma1),
        (false, true) => -beta(m.ref_mean, sigma0),
        (false, false) => {
            let num = if cdf {
                m.delta_mean * sigma0 - (m.ref_mean - z_bar) * m.delta_std
            } else {
                -(m.delta_mean * sigma0 + (z_bar - m.ref_mean) * m.delta_std)
            };
            num / (sigma0 * sigma1)
        }
    }
}

/// Change in response threshold for reliability index `beta_bar`.
pub fn delta_z(m: &MomentIncrement, cdf: bool, beta_bar: f64) -> f64 {
    if cdf {
        m.delta_mean - beta_bar * m.delta_std
    } else {
        m.delta_mean + beta_bar * m.delta_std
    }
}
