//! Data augmentations.
//!
//! Each augmentation runs at one [`Stage`]: dataset stage ones transform the
//! raw crops once when the dataset is read, device stage ones transform every
//! batch's inputs right before it is fed to the network.

use ndarray::ArrayD;
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use serde::Deserialize;

use crate::{MlErr, Result, spec::OpSpec};

/// Where an augmentation is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Dataset,
    Device,
}

#[derive(Deserialize)]
struct ScaleParams {
    #[serde(rename = "Factor")]
    factor: f32,
}

#[derive(Deserialize)]
struct NoiseParams {
    #[serde(rename = "Std")]
    std: f32,
    #[serde(rename = "Seed", default)]
    seed: Option<u64>,
}

/// A single augmentation with its validated parameters.
#[derive(Debug, Clone)]
pub enum Augment {
    /// Multiplies every pixel value by `factor`, saturating to `0..=255`.
    Scale { factor: f32 },
    /// Adds zero mean gaussian noise, clamped to `0..=255`.
    Noise { dist: Normal<f32>, rng: StdRng },
}
use Augment::*;

impl Augment {
    /// Builds an augmentation from its `{Op, Params}` spec.
    ///
    /// # Errors
    /// `UnknownOp` for an unknown `Op`, `InvalidSpec` for bad parameters.
    pub fn from_spec(spec: &OpSpec) -> Result<Self> {
        match spec.op.as_str() {
            "scale" => {
                let ScaleParams { factor } = spec.params("augmentation")?;

                if !factor.is_finite() || factor < 0.0 {
                    return Err(MlErr::InvalidSpec(format!(
                        "scale factor must be a non negative number, got {factor}"
                    )));
                }

                Ok(Scale { factor })
            }
            "noise" => {
                let NoiseParams { std, seed } = spec.params("augmentation")?;
                let dist = Normal::new(0.0, std)
                    .map_err(|e| MlErr::InvalidSpec(format!("noise std {std}: {e}")))?;
                let rng = match seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_os_rng(),
                };

                Ok(Noise { dist, rng })
            }
            other => Err(MlErr::UnknownOp {
                what: "augmentation",
                got: other.to_string(),
            }),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Scale { .. } => Stage::Dataset,
            Noise { .. } => Stage::Device,
        }
    }

    /// Transforms one raw crop in place.
    pub fn apply_crop(&mut self, crop: &mut [u8]) {
        for v in crop.iter_mut() {
            *v = self.pixel(*v as f32).round() as u8;
        }
    }

    /// Transforms one input tensor in place.
    pub fn apply_tensor(&mut self, x: &mut ArrayD<f32>) {
        x.mapv_inplace(|v| self.pixel(v));
    }

    fn pixel(&mut self, v: f32) -> f32 {
        let v = match self {
            Scale { factor } => v * *factor,
            Noise { dist, rng } => v + dist.sample(rng),
        };

        v.clamp(0.0, 255.0)
    }
}

/// An ordered list of augmentations of the same stage.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    augments: Vec<Augment>,
}

impl Pipeline {
    pub fn new(augments: Vec<Augment>) -> Self {
        Self { augments }
    }

    /// Builds every augmentation in `specs` and splits them by stage,
    /// keeping their relative order.
    ///
    /// # Returns
    /// The `(dataset, device)` pipelines.
    pub fn split(specs: &[OpSpec]) -> Result<(Pipeline, Pipeline)> {
        let mut dataset = Vec::new();
        let mut device = Vec::new();

        for spec in specs {
            let augment = Augment::from_spec(spec)?;
            match augment.stage() {
                Stage::Dataset => dataset.push(augment),
                Stage::Device => device.push(augment),
            }
        }

        Ok((Pipeline::new(dataset), Pipeline::new(device)))
    }

    pub fn is_empty(&self) -> bool {
        self.augments.is_empty()
    }

    pub fn apply_crop(&mut self, crop: &mut [u8]) {
        for augment in &mut self.augments {
            augment.apply_crop(crop);
        }
    }

    /// Transforms the network inputs of a batch.
    pub fn apply_inputs(&mut self, inputs: &mut [ArrayD<f32>]) {
        for x in inputs.iter_mut() {
            for augment in &mut self.augments {
                augment.apply_tensor(x);
            }
        }
    }
}
