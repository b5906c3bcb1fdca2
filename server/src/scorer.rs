use machine_learning::{Batch, Checkpoint, Device, ExecutionContext, arch::Network};
use ndarray::ArrayD;

use crate::{Result, ServerErr};

/// The output field holding the match probabilities.
pub const PROBS: &str = "probs";

/// Scores pairs of crop batches.
pub trait Scorer {
    /// Returns one match probability per pair.
    ///
    /// # Arguments
    /// * `left`, `right` - Channel-first `(N, 3, 64, 64)` crop batches.
    fn score(&mut self, left: ArrayD<f32>, right: ArrayD<f32>) -> Result<Vec<f32>>;
}

/// A [`Scorer`] running a network's forward pass.
pub struct NetworkScorer<N> {
    ctx: ExecutionContext<N>,
}

impl<N: Network> NetworkScorer<N> {
    pub fn new(ctx: ExecutionContext<N>) -> Self {
        Self { ctx }
    }
}

impl NetworkScorer<Box<dyn Network>> {
    /// Rebuilds the checkpointed network and loads its parameters.
    pub fn from_checkpoint(checkpoint: Checkpoint, device: Device) -> Result<Self> {
        let Checkpoint {
            params,
            arch,
            comps,
            example,
        } = checkpoint;

        let mut net = machine_learning::arch::build(&arch, &comps, &example)?;
        net.load_params(params)?;

        Ok(Self::new(ExecutionContext::new(device, net)))
    }
}

impl<N: Network> Scorer for NetworkScorer<N> {
    fn score(&mut self, left: ArrayD<f32>, right: ArrayD<f32>) -> Result<Vec<f32>> {
        let batch = self.ctx.place(Batch::new(vec![left, right]));
        let outputs = self.ctx.net.forward(&batch.tensors)?;

        let probs = outputs
            .first()
            .and_then(|out| out.get(PROBS))
            .ok_or_else(|| ServerErr::BadOutput(format!("no {PROBS:?} in the first output")))?;

        if probs.ndim() != 1 {
            return Err(ServerErr::BadOutput(format!(
                "{PROBS:?} has shape {:?}, expected one dimension",
                probs.shape()
            )));
        }

        Ok(probs.iter().copied().collect())
    }
}
