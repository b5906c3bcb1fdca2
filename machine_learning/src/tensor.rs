use std::collections::BTreeMap;

use comms::{CHANNELS, IMAGE_BYTES, IMAGE_SIDE};
use ndarray::{Array1, ArrayD, IxDyn};
use rayon::prelude::*;

use crate::{MlErr, Result};

/// Parameters (or their gradients) keyed by name.
pub type ParamMap = BTreeMap<String, ArrayD<f32>>;

/// Scalar losses keyed by name. A training pass must at least produce `loss`.
pub type LossMap = BTreeMap<String, f32>;

/// One batch as produced by a data source: the network inputs followed by
/// the targets, split by the network's input count.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub tensors: Vec<ArrayD<f32>>,
}

impl Batch {
    pub fn new(tensors: Vec<ArrayD<f32>>) -> Self {
        Self { tensors }
    }

    /// Splits the batch into `(inputs, targets)`.
    ///
    /// # Arguments
    /// * `num_inputs` - How many leading tensors are network inputs.
    ///
    /// # Errors
    /// `MissingInput` if the batch holds fewer than `num_inputs` tensors.
    pub fn split(&self, num_inputs: usize) -> Result<(&[ArrayD<f32>], &[ArrayD<f32>])> {
        if self.tensors.len() < num_inputs {
            return Err(MlErr::MissingInput {
                got: self.tensors.len(),
                expected: num_inputs,
            });
        }

        Ok(self.tensors.split_at(num_inputs))
    }

    /// The amount of samples in the batch, read from the first tensor.
    pub fn len(&self) -> usize {
        self.tensors
            .first()
            .and_then(|t| t.shape().first().copied())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Converts raw channel-last crops into one `(N, 3, 64, 64)` channel-first
/// tensor, keeping the 0..=255 value range.
///
/// # Arguments
/// * `images` - `IMAGE_BYTES` long slices, one per crop.
///
/// # Errors
/// `ShapeMismatch` if any crop has the wrong length.
pub fn images_to_tensor(images: &[&[u8]]) -> Result<ArrayD<f32>> {
    if let Some(bad) = images.iter().find(|img| img.len() != IMAGE_BYTES) {
        return Err(MlErr::ShapeMismatch {
            what: "image crop".into(),
            got: vec![bad.len()],
            expected: vec![IMAGE_BYTES],
        });
    }

    let mut data = vec![0.0; images.len() * IMAGE_BYTES];

    data.par_chunks_mut(IMAGE_BYTES)
        .zip(images.par_iter())
        .for_each(|(out, img)| hwc_to_chw(img, out));

    let shape = IxDyn(&[images.len(), CHANNELS, IMAGE_SIDE, IMAGE_SIDE]);
    Ok(ArrayD::from_shape_vec(shape, data)?)
}

/// Builds a one dimensional target tensor from per sample labels.
pub fn labels_to_tensor(labels: &[u8]) -> ArrayD<f32> {
    Array1::from_iter(labels.iter().map(|&l| l as f32)).into_dyn()
}

fn hwc_to_chw(img: &[u8], out: &mut [f32]) {
    let plane = IMAGE_SIDE * IMAGE_SIDE;

    for (px, rgb) in img.chunks_exact(CHANNELS).enumerate() {
        for (c, &v) in rgb.iter().enumerate() {
            out[c * plane + px] = v as f32;
        }
    }
}
