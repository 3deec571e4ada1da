// ─────────────────────────────────────────────────────────────────────
// SCPN UQ Core — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::constants::{
    DEFAULT_MAX_LEVEL, DEFAULT_VARIANCE_TOL, DEFAULT_ZERO_STD_TOL, MAX_VARIABLES,
    NUM_ALL_MOMENTS, NUM_LOW_MOMENTS,
};
use crate::error::{UqError, UqResult};
use serde::{Deserialize, Serialize};

/// 1-D interpolation polynomial family used in every dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BasisKind {
    /// Value interpolation (type-1 terms only).
    #[default]
    Lagrange,
    /// Value + gradient interpolation (type-1 and type-2 terms).
    Hermite,
}

/// How the external control loop grows the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefinementPolicy {
    /// One trial index set at a time, accepted or rejected.
    #[default]
    DimensionAdaptive,
    /// Every admissible set of the next level at once.
    Uniform,
}

/// Configuration of one hierarchical interpolation expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionConfig {
    pub num_vars: usize,
    /// Per-variable flag; `false` marks a non-random (design/state) variable
    /// that is not integrated out by the moment routines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_vars: Option<Vec<bool>>,
    #[serde(default)]
    pub basis: BasisKind,
    #[serde(default = "default_max_level")]
    pub max_level: usize,
    /// Build the interpolant to also match response gradients.
    #[serde(default)]
    pub use_derivatives: bool,
    /// Number of inserted variables that are not part of the expansion.
    #[serde(default)]
    pub num_non_basis_vars: usize,
    /// Carry surplus gradients w.r.t. the non-basis variables.
    #[serde(default)]
    pub coefficient_gradients: bool,
    /// Track skewness and kurtosis in addition to mean and variance.
    #[serde(default)]
    pub all_moments: bool,
    #[serde(default)]
    pub refinement: RefinementPolicy,
    #[serde(default)]
    pub tolerances: Tolerances,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Tolerances {
    #[serde(default = "default_variance_tol")]
    pub variance: f64,
    #[serde(default = "default_zero_std_tol")]
    pub zero_std: f64,
}

fn default_max_level() -> usize {
    DEFAULT_MAX_LEVEL
}
fn default_variance_tol() -> f64 {
    DEFAULT_VARIANCE_TOL
}
fn default_zero_std_tol() -> f64 {
    DEFAULT_ZERO_STD_TOL
}

impl Default for Tolerances {
    fn default() -> Self {
        Tolerances {
            variance: default_variance_tol(),
            zero_std: default_zero_std_tol(),
        }
    }
}

impl ExpansionConfig {
    /// Value-interpolation configuration over `num_vars` random variables.
    pub fn new(num_vars: usize) -> Self {
        ExpansionConfig {
            num_vars,
            random_vars: None,
            basis: BasisKind::Lagrange,
            max_level: default_max_level(),
            use_derivatives: false,
            num_non_basis_vars: 0,
            coefficient_gradients: false,
            all_moments: false,
            refinement: RefinementPolicy::DimensionAdaptive,
            tolerances: Tolerances::default(),
        }
    }

    /// Gradient-enhanced configuration (Hermite basis, type-2 surpluses).
    pub fn gradient_enhanced(num_vars: usize) -> Self {
        ExpansionConfig {
            basis: BasisKind::Hermite,
            use_derivatives: true,
            ..Self::new(num_vars)
        }
    }

    /// Load from a JSON file and validate.
    pub fn from_file(path: &str) -> UqResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> UqResult<()> {
        if self.num_vars == 0 {
            return Err(UqError::ConfigError(
                "expansion requires at least one variable".to_string(),
            ));
        }
        if self.num_vars > MAX_VARIABLES {
            return Err(UqError::ConfigError(format!(
                "at most {MAX_VARIABLES} variables are supported, got {}",
                self.num_vars
            )));
        }
        if let Some(flags) = &self.random_vars {
            if flags.len() != self.num_vars {
                return Err(UqError::DimensionMismatch {
                    expected: self.num_vars,
                    got: flags.len(),
                });
            }
        }
        if self.use_derivatives && self.coefficient_gradients {
            return Err(UqError::ConfigConflict(
                "derivative-enhanced interpolation cannot be combined with coefficient \
                 gradients w.r.t. non-basis variables"
                    .to_string(),
            ));
        }
        if self.use_derivatives && self.basis == BasisKind::Lagrange {
            return Err(UqError::ConfigConflict(
                "derivative-enhanced interpolation requires the Hermite basis".to_string(),
            ));
        }
        if self.coefficient_gradients && self.num_non_basis_vars == 0 {
            return Err(UqError::ConfigConflict(
                "coefficient gradients requested without non-basis variables".to_string(),
            ));
        }
        if !(self.tolerances.variance >= 0.0 && self.tolerances.zero_std >= 0.0) {
            return Err(UqError::ConfigError(
                "tolerances must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_random(&self, var: usize) -> bool {
        self.random_vars.as_ref().map_or(true, |flags| flags[var])
    }

    /// True when at least one variable is excluded from integration.
    pub fn has_non_random(&self) -> bool {
        self.random_vars
            .as_ref()
            .is_some_and(|flags| flags.iter().any(|&r| !r))
    }

    pub fn num_moments(&self) -> usize {
        if self.all_moments {
            NUM_ALL_MOMENTS
        } else {
            NUM_LOW_MOMENTS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("uq_types_{}_{name}", std::process::id()))
    }

    #[test]
    fn test_defaults_validate() {
        let cfg = ExpansionConfig::new(3);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.num_moments(), 2);
        assert!(cfg.is_random(2));
        assert!(!cfg.has_non_random());
    }

    #[test]
    fn test_derivatives_with_coefficient_gradients_conflict() {
        let mut cfg = ExpansionConfig::gradient_enhanced(2);
        cfg.num_non_basis_vars = 1;
        cfg.coefficient_gradients = true;
        match cfg.validate().unwrap_err() {
            UqError::ConfigConflict(msg) => assert!(msg.contains("coefficient")),
            other => panic!("Expected ConfigConflict, got {other:?}"),
        }
    }

    #[test]
    fn test_derivatives_require_hermite() {
        let mut cfg = ExpansionConfig::new(2);
        cfg.use_derivatives = true;
        assert!(matches!(cfg.validate(), Err(UqError::ConfigConflict(_))));
    }

    #[test]
    fn test_random_flag_length_checked() {
        let mut cfg = ExpansionConfig::new(2);
        cfg.random_vars = Some(vec![true]);
        assert!(matches!(
            cfg.validate(),
            Err(UqError::DimensionMismatch {
                expected: 2,
                got: 1
            })
        ));
    }

    #[test]
    fn test_load_from_json_file_with_defaults() {
        let path = temp_path("cfg.json");
        std::fs::write(
            &path,
            r#"{ "num_vars": 2, "random_vars": [true, false], "all_moments": true,
                 "refinement": "uniform" }"#,
        )
        .unwrap();
        let cfg = ExpansionConfig::from_file(&path.to_string_lossy()).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(cfg.num_vars, 2);
        assert_eq!(cfg.basis, BasisKind::Lagrange);
        assert_eq!(cfg.max_level, DEFAULT_MAX_LEVEL);
        assert_eq!(cfg.refinement, RefinementPolicy::Uniform);
        assert_eq!(cfg.num_moments(), 4);
        assert!(cfg.has_non_random());
        assert!(!cfg.is_random(1));
        assert!((cfg.tolerances.variance - DEFAULT_VARIANCE_TOL).abs() < 1e-30);
    }

    #[test]
    fn test_roundtrip_serialization() {
        let mut cfg = ExpansionConfig::gradient_enhanced(3);
        cfg.max_level = 4;
        let json = serde_json::to_string_pretty(&cfg).unwrap();
        let cfg2: ExpansionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg2.num_vars, 3);
        assert_eq!(cfg2.basis, BasisKind::Hermite);
        assert!(cfg2.use_derivatives);
        assert_eq!(cfg2.max_level, 4);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ExpansionConfig::from_file("/nonexistent/uq/config.json").unwrap_err();
        assert!(matches!(err, UqError::Io(_)));
    }
}
