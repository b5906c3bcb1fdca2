use std::collections::BTreeMap;

use ndarray::{Array2, ArrayD, Zip};
use rand::Rng;

use super::{
    Network, Outputs,
    activations::{Sigmoid, logistic},
    layers::{Dense, Trace},
    loss::BceWithLogits,
};
use crate::{LossMap, MlErr, ParamMap, Result, optimization::Optimizer};

/// What the last `loss` call left for `backward`.
struct Pass {
    left: Vec<Trace>,
    right: Vec<Trace>,
    diff: Array2<f32>,
    head: Trace,
    y: Array2<f32>,
}

/// A siamese matcher: both crops go through the same dense encoder and a
/// logistic head scores the absolute difference of their embeddings.
///
/// Parameters are named `encoder.<i>.{weight,bias}` and `head.{weight,bias}`.
pub struct Siamese {
    encoder: Vec<Dense>,
    head: Dense,
    params: ParamMap,
    grads: ParamMap,
    loss_fn: BceWithLogits,
    pass: Option<Pass>,
}

impl Siamese {
    /// Creates a new `Siamese` with freshly initialized parameters.
    ///
    /// # Arguments
    /// * `features` - The flattened size of one crop.
    /// * `hidden` - The hidden encoder widths.
    /// * `embedding` - The embedding width.
    /// * `amp` - The amplitude of the encoder sigmoids.
    /// * `rng` - The source of the initial weights.
    ///
    /// # Errors
    /// `InvalidSpec` if any of the sizes is zero.
    pub fn new<R: Rng>(
        features: usize,
        hidden: &[usize],
        embedding: usize,
        amp: f32,
        rng: &mut R,
    ) -> Result<Self> {
        let dims: Vec<usize> = std::iter::once(features)
            .chain(hidden.iter().copied())
            .chain(std::iter::once(embedding))
            .collect();

        if dims.contains(&0) {
            return Err(MlErr::InvalidSpec(format!(
                "siamese layer sizes must be positive, got {dims:?}"
            )));
        }

        let encoder: Vec<_> = dims
            .windows(2)
            .enumerate()
            .map(|(i, w)| Dense::new(format!("encoder.{i}"), (w[0], w[1]), Some(Sigmoid::new(amp))))
            .collect();
        let head = Dense::new("head", (embedding, 1), None);

        let mut params = ParamMap::new();
        let mut grads = ParamMap::new();

        for layer in encoder.iter().chain(std::iter::once(&head)) {
            layer.init(&mut params, rng)?;
            layer.zeros(&mut grads);
        }

        Ok(Self {
            encoder,
            head,
            params,
            grads,
            loss_fn: BceWithLogits::new(),
            pass: None,
        })
    }

    /// The flattened crop size the encoder expects.
    pub fn features(&self) -> usize {
        self.encoder.first().map_or(0, |layer| layer.dim().0)
    }

    /// The gradients accumulated since the last `zero_grad`.
    pub fn grads(&self) -> &ParamMap {
        &self.grads
    }

    /// Flattens an `(N, ...)` input to `(N, features)` scaled to `0..=1`.
    fn flatten(&self, x: &ArrayD<f32>) -> Result<Array2<f32>> {
        let n = x.shape().first().copied().unwrap_or_default();
        let features = self.features();

        if x.ndim() == 0 || x.len() != n * features {
            return Err(MlErr::ShapeMismatch {
                what: "siamese input".into(),
                got: x.shape().to_vec(),
                expected: vec![n, features],
            });
        }

        Ok(x.to_shape((n, features))?.mapv(|v| v / 255.0))
    }

    fn encode(&self, mut x: Array2<f32>) -> Result<Vec<Trace>> {
        let mut traces = Vec::with_capacity(self.encoder.len());

        for layer in &self.encoder {
            let trace = layer.forward(&self.params, x)?;
            x = trace.output().clone();
            traces.push(trace);
        }

        Ok(traces)
    }

    /// Runs both branches and the head.
    fn run(&self, inputs: &[ArrayD<f32>]) -> Result<(Vec<Trace>, Vec<Trace>, Array2<f32>, Trace)> {
        let [left, right, ..] = inputs else {
            return Err(MlErr::MissingInput {
                got: inputs.len(),
                expected: 2,
            });
        };

        let (left, right) = (self.flatten(left)?, self.flatten(right)?);

        if left.nrows() != right.nrows() {
            return Err(MlErr::ShapeMismatch {
                what: "right crops".into(),
                got: right.shape().to_vec(),
                expected: left.shape().to_vec(),
            });
        }

        let left = self.encode(left)?;
        let right = self.encode(right)?;

        let (a, b) = match (left.last(), right.last()) {
            (Some(a), Some(b)) => (a.output(), b.output()),
            _ => return Err(MlErr::InvalidSpec("siamese encoder has no layers".into())),
        };

        let diff = a - b;
        let head = self.head.forward(&self.params, diff.mapv(f32::abs))?;

        Ok((left, right, diff, head))
    }

    fn backward_branch(&mut self, traces: &[Trace], mut d: Array2<f32>) -> Result<()> {
        let Self {
            encoder,
            params,
            grads,
            ..
        } = self;

        for (layer, trace) in encoder.iter().zip(traces).rev() {
            d = layer.backward(params, grads, trace, d)?;
        }

        Ok(())
    }
}

impl Network for Siamese {
    fn num_inputs(&self) -> usize {
        2
    }

    fn params(&self) -> &ParamMap {
        &self.params
    }

    fn load_params(&mut self, params: ParamMap) -> Result<()> {
        for (name, tensor) in &params {
            let current = self
                .params
                .get(name)
                .ok_or_else(|| MlErr::MissingParam(name.clone()))?;

            if current.shape() != tensor.shape() {
                return Err(MlErr::ShapeMismatch {
                    what: name.clone(),
                    got: tensor.shape().to_vec(),
                    expected: current.shape().to_vec(),
                });
            }
        }

        self.params.extend(params);
        Ok(())
    }

    fn forward(&mut self, inputs: &[ArrayD<f32>]) -> Result<Outputs> {
        let (_, _, _, head) = self.run(inputs)?;
        let probs = head.output().column(0).mapv(logistic).into_dyn();

        Ok(vec![BTreeMap::from([("probs".to_string(), probs)])])
    }

    fn loss(&mut self, inputs: &[ArrayD<f32>], targets: &[ArrayD<f32>]) -> Result<LossMap> {
        let (left, right, diff, head) = self.run(inputs)?;
        let n = diff.nrows();

        let labels = targets.first().ok_or(MlErr::MissingInput {
            got: inputs.len() + targets.len(),
            expected: inputs.len() + 1,
        })?;

        if labels.len() != n {
            return Err(MlErr::ShapeMismatch {
                what: "labels".into(),
                got: labels.shape().to_vec(),
                expected: vec![n],
            });
        }

        let y = labels.to_shape((n, 1))?.to_owned();
        let z = head.output();

        let loss = self.loss_fn.loss(z.view(), y.view());
        let hits = Zip::from(z)
            .and(&y)
            .fold(0usize, |acc, &z, &y| acc + usize::from((logistic(z) > 0.5) == (y > 0.5)));
        let score = hits as f32 / n.max(1) as f32;

        self.pass = Some(Pass {
            left,
            right,
            diff,
            head,
            y,
        });

        Ok(LossMap::from([
            ("loss".to_string(), loss),
            ("score".to_string(), score),
        ]))
    }

    fn zero_grad(&mut self) {
        self.grads.values_mut().for_each(|g| g.fill(0.0));
    }

    fn backward(&mut self) -> Result<()> {
        let pass = self.pass.take().ok_or(MlErr::NoTrace)?;

        let d = self.loss_fn.loss_prime(pass.head.output().view(), pass.y.view());
        let d_abs = self.head.backward(&self.params, &mut self.grads, &pass.head, d)?;

        // d|a - b| / da = sign(a - b), and the opposite for b.
        let d_left = Zip::from(&d_abs).and(&pass.diff).map_collect(|&d, &diff| {
            if diff > 0.0 {
                d
            } else if diff < 0.0 {
                -d
            } else {
                0.0
            }
        });
        let d_right = -&d_left;

        self.backward_branch(&pass.left, d_left)?;
        self.backward_branch(&pass.right, d_right)
    }

    fn step(&mut self, optimizer: &mut dyn Optimizer) -> Result<()> {
        optimizer.update_params(&mut self.params, &self.grads)
    }
}
