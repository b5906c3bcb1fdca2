use serde::Deserialize;

/// Which checkpoints the saver keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    /// Every epoch.
    Latest,
    /// Only epochs that beat every previous score.
    #[default]
    Best,
}

/// `ModelSaver` settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SaverConfig {
    #[serde(rename = "Mode")]
    pub mode: SaveMode,
}

/// Decides which epochs are checkpointed. Persisting is up to the caller.
#[derive(Debug, Clone)]
pub struct ModelSaver {
    mode: SaveMode,
    best_score: Option<f32>,
}

impl ModelSaver {
    pub fn new(config: SaverConfig) -> Self {
        Self {
            mode: config.mode,
            best_score: None,
        }
    }

    /// Records one epoch's score.
    ///
    /// # Returns
    /// `true` if the current model must be persisted.
    pub fn update(&mut self, score: f32) -> bool {
        let improved = self.best_score.is_none_or(|best| score > best);
        if improved {
            self.best_score = Some(score);
        }

        match self.mode {
            SaveMode::Latest => true,
            SaveMode::Best => improved,
        }
    }

    pub fn mode(&self) -> SaveMode {
        self.mode
    }

    pub fn best_score(&self) -> Option<f32> {
        self.best_score
    }
}
