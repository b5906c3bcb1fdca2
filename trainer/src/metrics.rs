use std::{collections::BTreeMap, fmt};

use machine_learning::LossMap;

use crate::{Result, TrainErr};

/// The pass a set of losses comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Train,
    Val,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Train => write!(f, "train"),
            Phase::Val => write!(f, "val"),
        }
    }
}

/// Per key running means of the batch losses of one epoch.
///
/// The first batch fixes the key set; every later batch must carry all of
/// those keys.
#[derive(Debug, Clone)]
pub struct LossMeans {
    phase: Phase,
    sums: BTreeMap<String, f64>,
    batches: usize,
}

impl LossMeans {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            sums: BTreeMap::new(),
            batches: 0,
        }
    }

    /// Records the losses of one batch.
    ///
    /// # Errors
    /// `MissingLoss` if a key of the first batch is absent.
    pub fn push(&mut self, losses: &LossMap) -> Result<()> {
        if self.batches == 0 {
            self.sums = losses.keys().map(|k| (k.clone(), 0.0)).collect();
        }

        for (key, sum) in self.sums.iter_mut() {
            let value = losses.get(key).ok_or_else(|| TrainErr::MissingLoss {
                key: key.clone(),
                phase: self.phase,
            })?;

            *sum += *value as f64;
        }

        self.batches += 1;
        Ok(())
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// The arithmetic mean of every key across the recorded batches.
    ///
    /// # Errors
    /// `EmptyEpoch` if no batch was recorded.
    pub fn means(&self) -> Result<LossMap> {
        if self.batches == 0 {
            return Err(TrainErr::EmptyEpoch { phase: self.phase });
        }

        let n = self.batches as f64;
        Ok(self
            .sums
            .iter()
            .map(|(k, sum)| (k.clone(), (sum / n) as f32))
            .collect())
    }
}
