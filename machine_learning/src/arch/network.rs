use std::collections::BTreeMap;

use ndarray::ArrayD;

use crate::{LossMap, ParamMap, Result, optimization::Optimizer};

/// Named output tensors, one map per network component.
pub type Outputs = Vec<BTreeMap<String, ArrayD<f32>>>;

/// What the training loop and the inference server need from a network.
pub trait Network {
    /// How many leading batch tensors are positional inputs; the rest of the
    /// batch are targets.
    fn num_inputs(&self) -> usize;

    /// The current parameters, keyed by name.
    fn params(&self) -> &ParamMap;

    /// Replaces the parameters present in `params`.
    ///
    /// # Errors
    /// `MissingParam` if a name is not one of the network's parameters,
    /// `ShapeMismatch` if a tensor does not match the shape it replaces.
    fn load_params(&mut self, params: ParamMap) -> Result<()>;

    /// Makes a forward-only pass.
    fn forward(&mut self, inputs: &[ArrayD<f32>]) -> Result<Outputs>;

    /// Makes a forward pass against `targets`, keeping what `backward` needs.
    ///
    /// # Returns
    /// The scalar losses of the pass; `loss` is the one being minimized.
    fn loss(&mut self, inputs: &[ArrayD<f32>], targets: &[ArrayD<f32>]) -> Result<LossMap>;

    /// Resets every gradient buffer to zero.
    fn zero_grad(&mut self);

    /// Accumulates the gradient of the last `loss` call.
    fn backward(&mut self) -> Result<()>;

    /// Applies one optimizer step using the accumulated gradients.
    fn step(&mut self, optimizer: &mut dyn Optimizer) -> Result<()>;
}

impl<N: Network + ?Sized> Network for Box<N> {
    fn num_inputs(&self) -> usize {
        (**self).num_inputs()
    }

    fn params(&self) -> &ParamMap {
        (**self).params()
    }

    fn load_params(&mut self, params: ParamMap) -> Result<()> {
        (**self).load_params(params)
    }

    fn forward(&mut self, inputs: &[ArrayD<f32>]) -> Result<Outputs> {
        (**self).forward(inputs)
    }

    fn loss(&mut self, inputs: &[ArrayD<f32>], targets: &[ArrayD<f32>]) -> Result<LossMap> {
        (**self).loss(inputs, targets)
    }

    fn zero_grad(&mut self) {
        (**self).zero_grad()
    }

    fn backward(&mut self) -> Result<()> {
        (**self).backward()
    }

    fn step(&mut self, optimizer: &mut dyn Optimizer) -> Result<()> {
        (**self).step(optimizer)
    }
}
