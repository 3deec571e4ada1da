// ─────────────────────────────────────────────────────────────────────
// SCPN UQ Core — Sample Store
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Raw (input, response) pairs keyed by collocation point.
//!
//! Active points occupy indices `0..len()`. Withdrawing a trial set pops its
//! points off the end onto a stack of batches so they can be restored
//! without re-running the simulation.

use ndarray::{Array1, Array2};
use uq_types::error::{UqError, UqResult};

#[derive(Debug, Clone, PartialEq)]
pub struct SamplePoint {
    pub vars: Array1<f64>,
    pub value: f64,
    /// Response gradient w.r.t. the expansion variables.
    pub gradient: Option<Array1<f64>>,
    /// Response gradient w.r.t. non-basis (inserted) variables.
    pub non_basis_gradient: Option<Array1<f64>>,
    pub hessian: Option<Array2<f64>>,
}

impl SamplePoint {
    pub fn new(vars: Array1<f64>, value: f64) -> Self {
        SamplePoint {
            vars,
            value,
            gradient: None,
            non_basis_gradient: None,
            hessian: None,
        }
    }

    pub fn with_gradient(mut self, gradient: Array1<f64>) -> Self {
        self.gradient = Some(gradient);
        self
    }

    pub fn with_non_basis_gradient(mut self, gradient: Array1<f64>) -> Self {
        self.non_basis_gradient = Some(gradient);
        self
    }

    pub fn with_hessian(mut self, hessian: Array2<f64>) -> Self {
        self.hessian = Some(hessian);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct SampleStore {
    points: Vec<SamplePoint>,
    popped: Vec<Vec<SamplePoint>>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn push(&mut self, point: SamplePoint) {
        self.points.push(point);
    }

    pub fn get(&self, index: usize) -> Option<&SamplePoint> {
        self.points.get(index)
    }

    pub fn points(&self) -> &[SamplePoint] {
        &self.points
    }

    /// Copy of the points selected by `indices`, in the given order.
    pub fn filtered(&self, indices: &[usize]) -> UqResult<SampleStore> {
        let mut points = Vec::with_capacity(indices.len());
        for &i in indices {
            let p = self.points.get(i).ok_or_else(|| {
                UqError::Precondition(format!("sample index {i} out of range ({})", self.len()))
            })?;
            points.push(p.clone());
        }
        Ok(SampleStore {
            points,
            popped: Vec::new(),
        })
    }

    /// Move the last `count` points onto the popped stack.
    pub fn pop(&mut self, count: usize) -> UqResult<()> {
        if count > self.points.len() {
            return Err(UqError::Precondition(format!(
                "cannot pop {count} points from a store of {}",
                self.points.len()
            )));
        }
        let batch = self.points.split_off(self.points.len() - count);
        self.popped.push(batch);
        Ok(())
    }

    /// Restore the popped batch at `index`; returns the number of points.
    pub fn push_popped(&mut self, index: usize) -> UqResult<usize> {
        if index >= self.popped.len() {
            return Err(UqError::Precondition(format!(
                "no popped sample batch {index} (have {})",
                self.popped.len()
            )));
        }
        let batch = self.popped.remove(index);
        let n = batch.len();
        self.points.extend(batch);
        Ok(n)
    }

    pub fn num_popped(&self) -> usize {
        self.popped.len()
    }

    pub fn clear_popped(&mut self) {
        self.popped.clear();
    }
}
