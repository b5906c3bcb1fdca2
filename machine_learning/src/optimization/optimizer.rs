use crate::{ParamMap, Result};

/// Defines the strategy for updating model parameters based on calculated gradients.
pub trait Optimizer {
    /// Updates `params` in place using the accumulated gradients.
    ///
    /// # Arguments
    /// * `params` - The parameters to update.
    /// * `grads` - The gradient for each parameter, under the same name.
    ///
    /// # Returns
    /// An error if a parameter has no gradient or their shapes differ.
    fn update_params(&mut self, params: &mut ParamMap, grads: &ParamMap) -> Result<()>;

    /// The learning rate used by the next update.
    fn learning_rate(&self) -> f32;

    /// Overrides the learning rate, used by rate schedulers between epochs.
    fn set_learning_rate(&mut self, lr: f32);
}
