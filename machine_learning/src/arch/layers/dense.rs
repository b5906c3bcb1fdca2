use ndarray::{Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis, linalg};
use ndarray_rand::{RandomExt, rand_distr::Uniform};
use rand::Rng;

use crate::{MlErr, ParamMap, Result, arch::activations::Sigmoid};

/// Values kept from a forward pass that the backward pass needs.
///
/// The layer itself holds no per-call state, so the same layer can be run on
/// several inputs (e.g. both branches of a siamese network) before any
/// backward pass.
#[derive(Debug, Clone)]
pub struct Trace {
    x: Array2<f32>,
    z: Array2<f32>,
    a: Option<Array2<f32>>,
}

impl Trace {
    /// The layer output: the activation if there is one, otherwise `z`.
    pub fn output(&self) -> &Array2<f32> {
        self.a.as_ref().unwrap_or(&self.z)
    }
}

/// A fully connected layer computing `act(x · w + b)`.
///
/// Its weights live in a `ParamMap` under `<name>.weight` with shape
/// `(n, m)` and `<name>.bias` with shape `(m,)`.
#[derive(Debug, Clone)]
pub struct Dense {
    name: String,
    dim: (usize, usize),
    act_fn: Option<Sigmoid>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `name` - The parameter name prefix.
    /// * `dim` - The `(input, output)` sizes.
    /// * `act_fn` - An optional activation applied after the affine map.
    pub fn new(name: impl Into<String>, dim: (usize, usize), act_fn: Option<Sigmoid>) -> Self {
        Self {
            name: name.into(),
            dim,
            act_fn,
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    pub fn weight_key(&self) -> String {
        format!("{}.weight", self.name)
    }

    pub fn bias_key(&self) -> String {
        format!("{}.bias", self.name)
    }

    /// Inserts freshly initialized parameters for this layer into `params`,
    /// Xavier uniform weights and zero biases.
    pub fn init<R: Rng>(&self, params: &mut ParamMap, rng: &mut R) -> Result<()> {
        let (n, m) = self.dim;
        let limit = (6.0 / (n + m) as f32).sqrt();
        let dist = Uniform::new_inclusive(-limit, limit)
            .map_err(|e| MlErr::InvalidSpec(format!("layer {}: {e}", self.name)))?;

        let w = Array2::random_using((n, m), dist, rng).into_dyn();
        params.insert(self.weight_key(), w);
        params.insert(self.bias_key(), ArrayD::zeros(vec![m]));
        Ok(())
    }

    /// Inserts zeroed gradient buffers for this layer into `grads`.
    pub fn zeros(&self, grads: &mut ParamMap) {
        let (n, m) = self.dim;
        grads.insert(self.weight_key(), ArrayD::zeros(vec![n, m]));
        grads.insert(self.bias_key(), ArrayD::zeros(vec![m]));
    }

    /// Makes a forward pass through the layer.
    ///
    /// # Arguments
    /// * `params` - The network parameters.
    /// * `x` - An `(N, n)` input.
    ///
    /// # Returns
    /// The trace of the pass, holding the `(N, m)` output.
    pub fn forward(&self, params: &ParamMap, x: Array2<f32>) -> Result<Trace> {
        let (w, b) = self.view_params(params)?;

        if x.ncols() != self.dim.0 {
            return Err(MlErr::ShapeMismatch {
                what: format!("{} input", self.name),
                got: x.shape().to_vec(),
                expected: vec![x.nrows(), self.dim.0],
            });
        }

        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut z);
        z += &b;

        let a = self.act_fn.as_ref().map(|act_fn| z.mapv(|z| act_fn.f(z)));
        Ok(Trace { x, z, a })
    }

    /// Makes a backward pass through the layer, **accumulating** into `grads`.
    ///
    /// # Arguments
    /// * `params` - The network parameters.
    /// * `grads` - The gradient buffers, added to rather than overwritten.
    /// * `trace` - The trace left by the matching forward pass.
    /// * `d` - The loss derivative with respect to this layer's output.
    ///
    /// # Returns
    /// The loss derivative with respect to this layer's input.
    pub fn backward(
        &self,
        params: &ParamMap,
        grads: &mut ParamMap,
        trace: &Trace,
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&trace.z, |d, &z| *d *= act_fn.df(z));
        }

        {
            let (mut dw, mut db) = self.view_grads(grads)?;
            linalg::general_mat_mul(1.0, &trace.x.t(), &d, 1.0, &mut dw);
            db += &d.sum_axis(Axis(0));
        }

        let (w, _) = self.view_params(params)?;
        let mut dx = Array2::zeros((d.nrows(), self.dim.0));
        linalg::general_mat_mul(1.0, &d, &w.t(), 0.0, &mut dx);

        Ok(dx)
    }

    /// Gives a view of this layer's weights and biases inside `params`.
    fn view_params<'a>(
        &self,
        params: &'a ParamMap,
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        let w_key = self.weight_key();
        let b_key = self.bias_key();

        let w = params.get(&w_key).ok_or(MlErr::MissingParam(w_key))?;
        let b = params.get(&b_key).ok_or(MlErr::MissingParam(b_key))?;

        Ok((w.view().into_dimensionality()?, b.view().into_dimensionality()?))
    }

    /// Gives a mutable view of this layer's gradient buffers inside `grads`.
    fn view_grads<'a>(
        &self,
        grads: &'a mut ParamMap,
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        let w_key = self.weight_key();
        let b_key = self.bias_key();

        // Two disjoint entries of the same map, fetched in one pass.
        let mut dw = None;
        let mut db = None;

        for (key, grad) in grads.iter_mut() {
            if *key == w_key {
                dw = Some(grad);
            } else if *key == b_key {
                db = Some(grad);
            }
        }

        let dw = dw.ok_or(MlErr::MissingParam(w_key))?;
        let db = db.ok_or(MlErr::MissingParam(b_key))?;

        Ok((
            dw.view_mut().into_dimensionality()?,
            db.view_mut().into_dimensionality()?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn layer_with(w: Array2<f32>, b: ndarray::Array1<f32>, act_fn: Option<Sigmoid>) -> (Dense, ParamMap) {
        let layer = Dense::new("l", (w.nrows(), w.ncols()), act_fn);
        let mut params = ParamMap::new();
        params.insert(layer.weight_key(), w.into_dyn());
        params.insert(layer.bias_key(), b.into_dyn());
        (layer, params)
    }

    #[test]
    fn init_inserts_named_params() {
        let layer = Dense::new("enc.0", (4, 3), None);
        let mut params = ParamMap::new();
        layer.init(&mut params, &mut StdRng::seed_from_u64(0)).unwrap();

        assert_eq!(params["enc.0.weight"].shape(), &[4, 3]);
        assert_eq!(params["enc.0.bias"].shape(), &[3]);
        assert!(params["enc.0.weight"].iter().all(|w| w.abs() <= 1.0));
    }

    #[test]
    fn forward_is_affine() {
        let (layer, params) = layer_with(array![[1.0, 2.0], [3.0, 4.0]], array![0.5, -0.5], None);
        let trace = layer.forward(&params, array![[1.0, 1.0]]).unwrap();
        assert_eq!(trace.output(), &array![[4.5, 5.5]]);
    }

    #[test]
    fn backward_accumulates_gradients() {
        let (layer, params) = layer_with(array![[1.0], [2.0]], array![0.0], None);
        let mut grads = ParamMap::new();
        layer.zeros(&mut grads);

        let trace = layer.forward(&params, array![[3.0, 5.0]]).unwrap();
        let dx = layer
            .backward(&params, &mut grads, &trace, array![[1.0]])
            .unwrap();
        layer
            .backward(&params, &mut grads, &trace, array![[1.0]])
            .unwrap();

        assert_eq!(dx, array![[1.0, 2.0]]);
        assert_eq!(grads["l.weight"], array![[6.0], [10.0]].into_dyn());
        assert_eq!(grads["l.bias"], array![2.0].into_dyn());
    }

    #[test]
    fn wrong_input_width_fails() {
        let (layer, params) = layer_with(array![[1.0], [2.0]], array![0.0], None);
        assert!(matches!(
            layer.forward(&params, array![[1.0, 2.0, 3.0]]),
            Err(MlErr::ShapeMismatch { .. })
        ));
    }
}
