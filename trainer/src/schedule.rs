use serde::Deserialize;

use crate::{Result, TrainErr};

/// Rate changes smaller than this are not applied.
const MIN_RATE_CHANGE: f32 = 1e-8;

/// How a plateau scheduler compares a score against the best one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    /// `score > best * (1 + threshold)`.
    #[default]
    Rel,
    /// `score > best + threshold`.
    Abs,
}

/// `RateDecay` settings as they arrive in the training parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct RateDecayConfig {
    #[serde(rename = "Op")]
    pub op: String,
    #[serde(rename = "StepSize")]
    pub step_size: Option<u32>,
    #[serde(rename = "StepGamma")]
    pub step_gamma: Option<f32>,
    #[serde(rename = "PlateauFactor")]
    pub plateau_factor: Option<f32>,
    #[serde(rename = "PlateauPatience")]
    pub plateau_patience: Option<u32>,
    #[serde(rename = "PlateauThreshold")]
    pub plateau_threshold: Option<f32>,
    #[serde(rename = "PlateauMin")]
    pub plateau_min: Option<f32>,
    #[serde(rename = "PlateauThresholdMode", default)]
    pub plateau_threshold_mode: ThresholdMode,
}

/// Multiplies the rate by `gamma` every `step_size` calls.
#[derive(Debug, Clone)]
pub struct StepDecay {
    step_size: u32,
    gamma: f32,
    calls: u32,
}

impl StepDecay {
    pub fn step(&mut self, lr: f32) -> f32 {
        self.calls += 1;

        if self.calls % self.step_size == 0 {
            lr * self.gamma
        } else {
            lr
        }
    }
}

/// Multiplies the rate by `factor` once the score stops improving for
/// longer than `patience` calls.
#[derive(Debug, Clone)]
pub struct PlateauDecay {
    factor: f32,
    patience: u32,
    threshold: f32,
    threshold_mode: ThresholdMode,
    min_lr: f32,
    best: f32,
    bad_calls: u32,
}

impl PlateauDecay {
    fn improves(&self, score: f32) -> bool {
        match self.threshold_mode {
            ThresholdMode::Rel => score > self.best * (1.0 + self.threshold),
            ThresholdMode::Abs => score > self.best + self.threshold,
        }
    }

    pub fn step(&mut self, score: f32, lr: f32) -> f32 {
        if self.improves(score) {
            self.best = score;
            self.bad_calls = 0;
        } else {
            self.bad_calls += 1;
        }

        if self.bad_calls <= self.patience {
            return lr;
        }

        self.bad_calls = 0;
        let reduced = (lr * self.factor).max(self.min_lr);

        if lr - reduced > MIN_RATE_CHANGE {
            reduced
        } else {
            lr
        }
    }

    /// Calls since the last improvement or reduction.
    pub fn bad_calls(&self) -> u32 {
        self.bad_calls
    }
}

/// A learning rate schedule driven by the epoch scores.
#[derive(Debug, Clone)]
pub enum RateDecay {
    Step(StepDecay),
    Plateau(PlateauDecay),
}

impl RateDecay {
    /// Validates a `RateDecay` config.
    ///
    /// # Errors
    /// `UnknownVariant` for an unknown `Op`, `Config` for a missing or out of
    /// range key.
    pub fn from_config(config: &RateDecayConfig) -> Result<Self> {
        fn required<T>(value: Option<T>, key: &str) -> Result<T> {
            value.ok_or_else(|| TrainErr::Config(format!("Train.Params.RateDecay.{key} is required")))
        }

        match config.op.as_str() {
            "step" => {
                let step_size = required(config.step_size, "StepSize")?;
                let gamma = required(config.step_gamma, "StepGamma")?;

                if step_size == 0 {
                    return Err(TrainErr::Config(
                        "Train.Params.RateDecay.StepSize must be positive".into(),
                    ));
                }

                Ok(RateDecay::Step(StepDecay {
                    step_size,
                    gamma,
                    calls: 0,
                }))
            }
            "plateau" => {
                let factor = required(config.plateau_factor, "PlateauFactor")?;

                if !(factor < 1.0) {
                    return Err(TrainErr::Config(format!(
                        "Train.Params.RateDecay.PlateauFactor must be below 1, got {factor}"
                    )));
                }

                Ok(RateDecay::Plateau(PlateauDecay {
                    factor,
                    patience: required(config.plateau_patience, "PlateauPatience")?,
                    threshold: required(config.plateau_threshold, "PlateauThreshold")?,
                    threshold_mode: config.plateau_threshold_mode,
                    min_lr: required(config.plateau_min, "PlateauMin")?,
                    best: f32::NEG_INFINITY,
                    bad_calls: 0,
                }))
            }
            other => Err(TrainErr::UnknownVariant {
                what: "rate decay",
                got: other.to_string(),
            }),
        }
    }

    /// Observes one epoch's score.
    ///
    /// # Returns
    /// The learning rate to use from now on.
    pub fn step(&mut self, score: f32, lr: f32) -> f32 {
        match self {
            RateDecay::Step(s) => s.step(lr),
            RateDecay::Plateau(p) => p.step(score, lr),
        }
    }
}
