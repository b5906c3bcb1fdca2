use log::info;
use serde::Deserialize;

/// `StopCondition` settings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    /// Hard epoch cap, `0` for none.
    #[serde(rename = "MaxEpochs")]
    pub max_epochs: u32,
    /// How much a score must beat the last reset score by to count.
    #[serde(rename = "ScoreEpsilon")]
    pub score_epsilon: f32,
    /// Epochs without enough improvement before stopping, `0` for never.
    #[serde(rename = "ScoreMaxEpochs")]
    pub score_max_epochs: u32,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            max_epochs: 0,
            score_epsilon: 0.0,
            score_max_epochs: 25,
        }
    }
}

/// Decides when the training loop ends.
#[derive(Debug, Clone)]
pub struct StopCondition {
    max_epochs: u32,
    score_epsilon: f32,
    score_max_epochs: u32,
    epochs: u32,
    score_epochs: u32,
    // Score at the last plateau reset; below `best_score` only when
    // `score_epsilon > 0`.
    last_score: Option<f32>,
    best_score: Option<f32>,
}

impl StopCondition {
    pub fn new(config: StopConfig) -> Self {
        let StopConfig {
            max_epochs,
            score_epsilon,
            score_max_epochs,
        } = config;

        Self {
            max_epochs,
            score_epsilon,
            score_max_epochs,
            epochs: 0,
            score_epochs: 0,
            last_score: None,
            best_score: None,
        }
    }

    /// Records one epoch's score.
    ///
    /// # Returns
    /// `true` if training must stop now.
    pub fn update(&mut self, score: f32) -> bool {
        info!(
            epochs = self.epochs,
            max_epochs = self.max_epochs,
            score = score,
            last_score = self.last_score,
            score_epochs = self.score_epochs,
            score_max_epochs = self.score_max_epochs,
            best_score = self.best_score;
            "stop condition update"
        );

        self.epochs += 1;
        if self.max_epochs > 0 && self.epochs >= self.max_epochs {
            return true;
        }

        let best = match self.best_score {
            Some(best) if best >= score => best,
            _ => score,
        };
        self.best_score = Some(best);

        let improved = match self.last_score {
            Some(last) => score > last + self.score_epsilon,
            None => true,
        };

        if improved {
            self.score_epochs = 0;
            self.last_score = Some(best);
        } else {
            self.score_epochs += 1;
        }

        self.score_max_epochs > 0 && self.score_epochs >= self.score_max_epochs
    }

    pub fn epochs(&self) -> u32 {
        self.epochs
    }

    pub fn score_epochs(&self) -> u32 {
        self.score_epochs
    }

    pub fn last_score(&self) -> Option<f32> {
        self.last_score
    }

    pub fn best_score(&self) -> Option<f32> {
        self.best_score
    }
}
