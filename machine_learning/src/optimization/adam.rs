use std::collections::HashMap;

use ndarray::{ArrayD, Zip};

use super::Optimizer;
use crate::{MlErr, ParamMap, Result};

#[derive(Debug)]
struct Moments {
    v: ArrayD<f32>,
    s: ArrayD<f32>,
}

#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    beta1_t: f32,
    beta2_t: f32,
    moments: HashMap<String, Moments>,
    epsilon: f32,
}

impl Adam {
    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `beta1`, `beta2`, `epsilon` - Hyperparameters to the optimization algorithm.
    ///
    /// # Returns
    /// A new `Adam` instance. Moment buffers are allocated lazily per parameter.
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            beta1_t: 1.,
            beta2_t: 1.,
            moments: HashMap::new(),
            epsilon,
        }
    }

    /// An `Adam` with the usual `0.9`, `0.999` and `1e-8` hyperparameters.
    pub fn with_learning_rate(learning_rate: f32) -> Self {
        Self::new(learning_rate, 0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn update_params(&mut self, params: &mut ParamMap, grads: &ParamMap) -> Result<()> {
        let Self {
            learning_rate: lr,
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            ..
        } = *self;

        self.beta1_t *= b1;
        self.beta2_t *= b2;

        let bc1 = 1. - self.beta1_t;
        let bc2 = 1. - self.beta2_t;
        let step_size = lr * (bc2.sqrt() / bc1);

        for (name, p) in params.iter_mut() {
            let g = grads
                .get(name)
                .ok_or_else(|| MlErr::MissingParam(format!("gradient of {name}")))?;

            if g.shape() != p.shape() {
                return Err(MlErr::ShapeMismatch {
                    what: format!("gradient of {name}"),
                    got: g.shape().to_vec(),
                    expected: p.shape().to_vec(),
                });
            }

            let Moments { v, s } = self.moments.entry(name.clone()).or_insert_with(|| Moments {
                v: ArrayD::zeros(p.raw_dim()),
                s: ArrayD::zeros(p.raw_dim()),
            });

            Zip::from(p).and(g).and(v).and(s).for_each(|p, &g, v, s| {
                *v = b1 * *v + (1. - b1) * g;
                *s = b2 * *s + (1. - b2) * g.powi(2);
                *p -= step_size * *v / (s.sqrt() + eps);
            });
        }

        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn first_step_moves_by_the_learning_rate() {
        let mut params = ParamMap::from([("w".to_string(), array![1.0, -1.0].into_dyn())]);
        let grads = ParamMap::from([("w".to_string(), array![0.5, -2.0].into_dyn())]);

        let mut adam = Adam::with_learning_rate(0.1);
        adam.update_params(&mut params, &grads).unwrap();

        // With bias correction the first step is lr * sign(g).
        let w: Vec<f32> = params["w"].iter().copied().collect();
        assert!((w[0] - 0.9).abs() < 1e-4);
        assert!((w[1] + 0.9).abs() < 1e-4);
    }

    #[test]
    fn missing_gradient_fails() {
        let mut params = ParamMap::from([("w".to_string(), array![1.0].into_dyn())]);
        let mut adam = Adam::with_learning_rate(0.1);
        assert!(matches!(
            adam.update_params(&mut params, &ParamMap::new()),
            Err(MlErr::MissingParam(_))
        ));
    }

    #[test]
    fn learning_rate_can_be_overridden() {
        let mut adam = Adam::with_learning_rate(0.1);
        adam.set_learning_rate(0.01);
        assert_eq!(adam.learning_rate(), 0.01);
    }
}
