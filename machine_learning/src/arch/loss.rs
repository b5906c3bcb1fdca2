//! Loss functions.

use ndarray::{Array2, ArrayView2, Zip};

use crate::arch::activations::logistic;

/// Binary cross entropy over raw logits.
///
/// Takes logits instead of probabilities so the loss stays finite for
/// saturated outputs.
#[derive(Default, Clone, Copy)]
pub struct BceWithLogits;

impl BceWithLogits {
    /// Returns a new `BceWithLogits`.
    pub fn new() -> Self {
        Self
    }

    /// The mean loss over every element of `z`.
    pub fn loss(&self, z: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let total = Zip::from(&z)
            .and(&y)
            .fold(0.0, |acc, &z, &y| acc + z.max(0.) - z * y + (-z.abs()).exp().ln_1p());

        total / z.len() as f32
    }

    /// The gradient of [`Self::loss`] with respect to the logits.
    pub fn loss_prime(&self, z: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let n = z.len() as f32;
        Zip::from(&z)
            .and(&y)
            .map_collect(|&z, &y| (logistic(z) - y) / n)
    }
}
