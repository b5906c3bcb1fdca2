//! Command line arguments of a training run.

use std::{collections::BTreeMap, path::PathBuf};

use machine_learning::{
    dataset::DatasetRef,
    spec::{ArchSpec, ComponentSpec, ComponentSpecs, OpSpec, inline_or_string},
};
use serde::{Deserialize, de::DeserializeOwned};

use crate::{
    Result, TrainErr,
    model_saver::SaverConfig,
    restore::{RestoreConfig, RestoreSpec},
    schedule::{RateDecay, RateDecayConfig},
    stop_condition::StopConfig,
};

const USAGE: &str =
    "usage: trainer <node id> <locator> <params> <arch> <comps> <datasets> <parent models>";

fn default_batch_size() -> usize {
    1
}

fn default_learning_rate() -> f32 {
    1e-3
}

fn default_optimizer() -> String {
    "adam".to_string()
}

/// `Train.Params`.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainParams {
    #[serde(rename = "BatchSize", default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(rename = "LearningRate", default = "default_learning_rate")]
    pub learning_rate: f32,
    #[serde(rename = "Optimizer", default = "default_optimizer")]
    pub optimizer: String,
    #[serde(rename = "StopCondition", default)]
    pub stop_condition: StopConfig,
    #[serde(rename = "ModelSaver", default)]
    pub model_saver: SaverConfig,
    #[serde(rename = "RateDecay", default)]
    pub rate_decay: Option<RateDecayConfig>,
}

/// A `{"Params": ...}` wrapper whose content may be string encoded.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
struct Wrapped<T> {
    #[serde(rename = "Params", deserialize_with = "inline_or_string")]
    params: T,
}

/// The training parameters argument.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingParams {
    #[serde(rename = "Dataset")]
    pub dataset: OpSpec,
    #[serde(rename = "Augment", default)]
    pub augment: Vec<OpSpec>,
    #[serde(rename = "Train")]
    train: Wrapped<TrainParams>,
    #[serde(rename = "Restore", default)]
    restore: Option<Vec<RestoreConfig>>,
}

impl TrainingParams {
    pub fn train(&self) -> &TrainParams {
        &self.train.params
    }
}

/// One entry of the parent model list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ParentRef {
    #[serde(rename = "ID")]
    pub id: u32,
}

/// Everything a training run is started with, validated.
#[derive(Debug, Clone)]
pub struct Args {
    pub node_id: u32,
    pub locator: PathBuf,
    pub params: TrainingParams,
    pub restores: Vec<RestoreSpec>,
    pub rate_decay: Option<RateDecay>,
    pub arch: ArchSpec,
    pub comps: ComponentSpecs,
    pub datasets: Vec<DatasetRef>,
    pub parents: Vec<ParentRef>,
}

fn json<T: DeserializeOwned>(name: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| TrainErr::Config(format!("{name}: {e}")))
}

impl Args {
    /// Parses the positional arguments, program name excluded.
    ///
    /// # Errors
    /// `Config` for a missing, malformed or out of range argument,
    /// `UnknownVariant` for an unknown optimizer or rate decay.
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let args: Vec<String> = args.into_iter().collect();
        let [node_id, locator, params, arch, comps, datasets, parents] = args.as_slice() else {
            return Err(TrainErr::Config(format!(
                "expected 7 arguments, got {}; {USAGE}",
                args.len()
            )));
        };

        let node_id = node_id
            .parse()
            .map_err(|e| TrainErr::Config(format!("node id {node_id:?}: {e}")))?;

        let mut params: TrainingParams = json("params", params)?;
        let arch: Wrapped<ArchSpec> = json("arch", arch)?;
        let comps: BTreeMap<u32, Wrapped<ComponentSpec>> = json("comps", comps)?;
        let datasets = json("datasets", datasets)?;
        let parents: Vec<ParentRef> = json("parent models", parents)?;

        let restores: Vec<RestoreSpec> = params
            .restore
            .take()
            .unwrap_or_default()
            .into_iter()
            .map(RestoreSpec::from)
            .collect();

        if restores.len() > parents.len() {
            return Err(TrainErr::Config(format!(
                "Restore has {} entries but only {} parent models were given",
                restores.len(),
                parents.len()
            )));
        }

        let train = params.train();

        if train.batch_size == 0 {
            return Err(TrainErr::Config("Train.Params.BatchSize must be positive".into()));
        }
        if !(train.learning_rate > 0.0) || !train.learning_rate.is_finite() {
            return Err(TrainErr::Config(format!(
                "Train.Params.LearningRate must be positive, got {}",
                train.learning_rate
            )));
        }
        if train.optimizer != "adam" {
            return Err(TrainErr::UnknownVariant {
                what: "optimizer",
                got: train.optimizer.clone(),
            });
        }
        if !(train.stop_condition.score_epsilon >= 0.0) {
            return Err(TrainErr::Config(format!(
                "Train.Params.StopCondition.ScoreEpsilon must not be negative, got {}",
                train.stop_condition.score_epsilon
            )));
        }

        let rate_decay = train.rate_decay.as_ref().map(RateDecay::from_config).transpose()?;

        Ok(Self {
            node_id,
            locator: PathBuf::from(locator),
            params,
            restores,
            rate_decay,
            arch: arch.params,
            comps: comps.into_iter().map(|(id, c)| (id, c.params)).collect(),
            datasets,
            parents,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model_saver::SaveMode;

    fn args(params: serde_json::Value) -> Vec<String> {
        vec![
            "4".into(),
            "/data".into(),
            params.to_string(),
            json!({"Params": {"NumInputs": 2, "Components": [{"ID": 1}]}}).to_string(),
            json!({"1": {"Params": {"Type": "siamese", "Hidden": [8], "Embedding": 4}}}).to_string(),
            json!([{"ID": 10, "Name": "pairs"}]).to_string(),
            json!([{"ID": 2}]).to_string(),
        ]
    }

    fn params(train: serde_json::Value) -> serde_json::Value {
        json!({
            "Dataset": {"Op": "pairs", "Params": "{\"ValPercent\": 10}"},
            "Augment": [],
            "Train": {"Params": train},
        })
    }

    #[test]
    fn parses_a_full_command_line() {
        let train = json!({
            "BatchSize": 8,
            "StopCondition": {"MaxEpochs": 5},
            "ModelSaver": {"Mode": "latest"},
            "RateDecay": {"Op": "step", "StepSize": 2, "StepGamma": 0.5},
        });
        let a = Args::parse(args(params(train))).unwrap();

        assert_eq!(a.node_id, 4);
        assert_eq!(a.arch.num_inputs, 2);
        assert!(a.comps.contains_key(&1));
        assert_eq!(a.datasets[0].id, 10);
        assert_eq!(a.parents, [ParentRef { id: 2 }]);

        let t = a.params.train();
        assert_eq!(t.batch_size, 8);
        assert_eq!(t.learning_rate, 1e-3);
        assert_eq!(t.stop_condition.max_epochs, 5);
        assert_eq!(t.stop_condition.score_max_epochs, 25);
        assert_eq!(t.model_saver.mode, SaveMode::Latest);
        assert!(matches!(a.rate_decay, Some(RateDecay::Step(_))));
    }

    #[test]
    fn string_encoded_train_params_parse_like_objects() {
        let train = json!({"BatchSize": 3, "LearningRate": 0.01});
        let inline = Args::parse(args(params(train.clone()))).unwrap();
        let encoded = Args::parse(args(params(json!(train.to_string())))).unwrap();

        assert_eq!(inline.params.train().batch_size, encoded.params.train().batch_size);
        assert_eq!(
            inline.params.train().learning_rate,
            encoded.params.train().learning_rate
        );
        assert!(encoded.rate_decay.is_none());
    }

    #[test]
    fn unknown_optimizer_is_rejected() {
        assert!(matches!(
            Args::parse(args(params(json!({"Optimizer": "sgd"})))),
            Err(TrainErr::UnknownVariant { what: "optimizer", .. })
        ));
    }

    #[test]
    fn unknown_rate_decay_is_rejected() {
        assert!(matches!(
            Args::parse(args(params(json!({"RateDecay": {"Op": "cosine"}})))),
            Err(TrainErr::UnknownVariant { .. })
        ));
    }

    #[test]
    fn null_rate_decay_disables_scheduling() {
        let a = Args::parse(args(params(json!({"RateDecay": null})))).unwrap();
        assert!(a.rate_decay.is_none());
    }

    #[test]
    fn more_restores_than_parents_is_rejected() {
        let mut p = params(json!({}));
        p["Restore"] = json!([
            {"SrcPrefix": "", "DstPrefix": "", "SkipPrefixes": ""},
            {"SrcPrefix": "", "DstPrefix": "", "SkipPrefixes": ""},
        ]);

        assert!(matches!(Args::parse(args(p)), Err(TrainErr::Config(_))));
    }

    #[test]
    fn wrong_argument_count_is_rejected() {
        assert!(matches!(
            Args::parse(vec!["1".to_string()]),
            Err(TrainErr::Config(_))
        ));
    }

    #[test]
    fn negative_epsilon_is_rejected() {
        let train = json!({"StopCondition": {"ScoreEpsilon": -0.1}});
        assert!(matches!(Args::parse(args(params(train))), Err(TrainErr::Config(_))));
    }
}
