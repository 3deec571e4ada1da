// ─────────────────────────────────────────────────────────────────────
// SCPN UQ Core — Approximation Contract
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Capability contract for expansion representations, chosen at
//! construction time and driven by the refinement loop.

use crate::expansion::HierarchInterpExpansion;
use ndarray::Array1;
use uq_grid::driver::HierarchSparseGridDriver;
use uq_grid::sample::SampleStore;
use uq_types::error::UqResult;

/// Expansion lifecycle, evaluation and statistics.
pub trait PolyApproximation {
    /// Shape coefficient storage after the driver's structure.
    fn allocate_arrays(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<()>;
    fn compute_coefficients(
        &mut self,
        driver: &HierarchSparseGridDriver,
        samples: &SampleStore,
    ) -> UqResult<()>;
    /// Extend coefficients to sets the driver appended.
    fn increment_coefficients(
        &mut self,
        driver: &HierarchSparseGridDriver,
        samples: &SampleStore,
    ) -> UqResult<()>;
    /// Withdraw the set the driver just popped.
    fn decrement_coefficients(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<()>;
    fn push_coefficients(
        &mut self,
        driver: &HierarchSparseGridDriver,
        multi_index: &[usize],
    ) -> UqResult<()>;
    fn finalize_coefficients(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<()>;

    fn value(&self, driver: &HierarchSparseGridDriver, x: &[f64]) -> UqResult<f64>;
    fn gradient(&self, driver: &HierarchSparseGridDriver, x: &[f64]) -> UqResult<Array1<f64>>;

    fn mean(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<f64>;
    fn variance(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<f64>;
    /// Component indices in index-map order.
    fn component_sobol(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<Vec<f64>>;
    fn total_sobol(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<Vec<f64>>;
}

impl PolyApproximation for HierarchInterpExpansion {
    fn allocate_arrays(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<()> {
        HierarchInterpExpansion::allocate_arrays(self, driver)
    }

    fn compute_coefficients(
        &mut self,
        driver: &HierarchSparseGridDriver,
        samples: &SampleStore,
    ) -> UqResult<()> {
        HierarchInterpExpansion::compute_coefficients(self, driver, samples)
    }

    fn increment_coefficients(
        &mut self,
        driver: &HierarchSparseGridDriver,
        samples: &SampleStore,
    ) -> UqResult<()> {
        HierarchInterpExpansion::increment_coefficients(self, driver, samples).map(|_| ())
    }

    fn decrement_coefficients(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<()> {
        HierarchInterpExpansion::decrement_coefficients(self, driver)
    }

    fn push_coefficients(
        &mut self,
        driver: &HierarchSparseGridDriver,
        multi_index: &[usize],
    ) -> UqResult<()> {
        HierarchInterpExpansion::push_coefficients(self, driver, multi_index)
    }

    fn finalize_coefficients(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<()> {
        HierarchInterpExpansion::finalize_coefficients(self, driver)
    }

    fn value(&self, driver: &HierarchSparseGridDriver, x: &[f64]) -> UqResult<f64> {
        HierarchInterpExpansion::value(self, driver, x)
    }

    fn gradient(&self, driver: &HierarchSparseGridDriver, x: &[f64]) -> UqResult<Array1<f64>> {
        self.gradient_basis(driver, x)
    }

    fn mean(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<f64> {
        HierarchInterpExpansion::mean(self, driver)
    }

    fn variance(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<f64> {
        HierarchInterpExpansion::variance(self, driver)
    }

    fn component_sobol(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<Vec<f64>> {
        Ok(self.compute_component_sobol(driver)?.to_vec())
    }

    fn total_sobol(&mut self, driver: &HierarchSparseGridDriver) -> UqResult<Vec<f64>> {
        Ok(self.compute_total_sobol(driver)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uq_grid::sample::SamplePoint;
    use uq_types::config::ExpansionConfig;

    #[test]
    fn test_trait_object_drives_lifecycle() {
        let config = ExpansionConfig::new(1);
        let mut d = HierarchSparseGridDriver::from_config(&config).unwrap();
        d.initialize_isotropic(1).unwrap();
        let mut store = SampleStore::new();
        for x in [0.0, -1.0, 1.0] {
            store.push(SamplePoint::new(Array1::from(vec![x]), 3.0 * x));
        }
        let mut approx: Box<dyn PolyApproximation> =
            Box::new(HierarchInterpExpansion::new(config).unwrap());
        approx.allocate_arrays(&d).unwrap();
        approx.compute_coefficients(&d, &store).unwrap();
        assert!((approx.value(&d, &[0.25]).unwrap() - 0.75).abs() < 1e-14);
        assert!((approx.gradient(&d, &[0.25]).unwrap()[0] - 3.0).abs() < 1e-13);
        assert!(approx.mean(&d).unwrap().abs() < 1e-14);
        assert!((approx.variance(&d).unwrap() - 3.0).abs() < 1e-12);
        assert_eq!(approx.total_sobol(&d).unwrap().len(), 1);
    }
}
