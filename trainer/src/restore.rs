//! Transplanting parameters of earlier model generations into a new network.

use std::path::Path;

use log::{info, warn};
use machine_learning::{Checkpoint, MlErr, ParamMap, arch::Network};
use serde::Deserialize;

use crate::{Result, config::ParentRef};

/// `Restore` entry as it arrives in the training parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    #[serde(rename = "SrcPrefix")]
    pub src_prefix: String,
    #[serde(rename = "DstPrefix")]
    pub dst_prefix: String,
    /// Comma separated prefixes.
    #[serde(rename = "SkipPrefixes")]
    pub skip_prefixes: String,
}

/// Which parent parameters to take and where to put them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreSpec {
    pub src_prefix: String,
    pub dst_prefix: String,
    pub skip_prefixes: Vec<String>,
}

impl From<RestoreConfig> for RestoreSpec {
    fn from(config: RestoreConfig) -> Self {
        let skip_prefixes = config
            .skip_prefixes
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();

        Self {
            src_prefix: config.src_prefix,
            dst_prefix: config.dst_prefix,
            skip_prefixes,
        }
    }
}

/// Selects and renames the parent parameters described by `spec`.
///
/// A name is taken if it starts with `src_prefix` and with none of the skip
/// prefixes (checked against the full parent name); `src_prefix` is then
/// replaced by `dst_prefix`. Colliding destination names keep the last one.
pub fn remap(parent: &ParamMap, spec: &RestoreSpec) -> ParamMap {
    parent
        .iter()
        .filter(|(name, _)| {
            name.starts_with(&spec.src_prefix)
                && !spec.skip_prefixes.iter().any(|p| name.starts_with(p.as_str()))
        })
        .map(|(name, t)| {
            let rest = &name[spec.src_prefix.len()..];
            (format!("{}{rest}", spec.dst_prefix), t.clone())
        })
        .collect()
}

/// The outcome of a non strict merge.
#[derive(Debug, Clone, PartialEq)]
pub struct Merge {
    /// The target parameters with the staged ones applied.
    pub params: ParamMap,
    /// Target names no staged tensor supplied.
    pub missing: Vec<String>,
    /// Staged names the target does not have; they are dropped.
    pub unexpected: Vec<String>,
}

/// Applies `staged` onto `target`.
///
/// # Errors
/// `ShapeMismatch` if a staged tensor does not have the shape of the target
/// tensor it replaces.
pub fn merge(target: &ParamMap, staged: ParamMap) -> Result<Merge> {
    let missing = target
        .keys()
        .filter(|name| !staged.contains_key(*name))
        .cloned()
        .collect();

    let mut params = target.clone();
    let mut unexpected = Vec::new();

    for (name, t) in staged {
        match params.get_mut(&name) {
            Some(current) if current.shape() != t.shape() => {
                return Err(MlErr::ShapeMismatch {
                    what: format!("restored {name}"),
                    got: t.shape().to_vec(),
                    expected: current.shape().to_vec(),
                }
                .into());
            }
            Some(current) => *current = t,
            None => unexpected.push(name),
        }
    }

    Ok(Merge {
        params,
        missing,
        unexpected,
    })
}

/// Restores every parent, in order, into `net`.
///
/// `restores[i]` is applied with the checkpoint of `parents[i]`, read from
/// `<models_dir>/<id>.pt`.
pub fn apply<N: Network + ?Sized>(
    net: &mut N,
    restores: &[RestoreSpec],
    parents: &[ParentRef],
    models_dir: &Path,
) -> Result<()> {
    for (spec, parent) in restores.iter().zip(parents) {
        info!(parent = parent.id; "restore model to {:?}", spec.dst_prefix);

        let checkpoint = Checkpoint::load(&Checkpoint::path(models_dir, parent.id))?;
        let staged = remap(&checkpoint.params, spec);
        let Merge {
            params,
            missing,
            unexpected,
        } = merge(net.params(), staged)?;

        if !missing.is_empty() {
            warn!("got missing keys: {missing:?}");
        }
        if !unexpected.is_empty() {
            warn!("got unexpected keys: {unexpected:?}");
        }

        net.load_params(params)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{env, fs};

    use machine_learning::{
        Batch, LossMap,
        arch::Outputs,
        optimization::Optimizer,
        spec::{ArchSpec, ComponentSpecs},
    };
    use ndarray::{ArrayD, IxDyn, array};

    use super::*;
    use crate::TrainErr;

    struct Slots {
        params: ParamMap,
    }

    impl Network for Slots {
        fn num_inputs(&self) -> usize {
            1
        }

        fn params(&self) -> &ParamMap {
            &self.params
        }

        fn load_params(&mut self, params: ParamMap) -> machine_learning::Result<()> {
            self.params.extend(params);
            Ok(())
        }

        fn forward(&mut self, _inputs: &[ArrayD<f32>]) -> machine_learning::Result<Outputs> {
            Ok(Vec::new())
        }

        fn loss(
            &mut self,
            _inputs: &[ArrayD<f32>],
            _targets: &[ArrayD<f32>],
        ) -> machine_learning::Result<LossMap> {
            Ok(LossMap::new())
        }

        fn zero_grad(&mut self) {}

        fn backward(&mut self) -> machine_learning::Result<()> {
            Ok(())
        }

        fn step(&mut self, _optimizer: &mut dyn Optimizer) -> machine_learning::Result<()> {
            Ok(())
        }
    }

    fn save_parent(dir: &Path, id: u32, params: ParamMap) {
        let checkpoint = Checkpoint {
            params,
            arch: ArchSpec {
                num_inputs: 1,
                components: Vec::new(),
            },
            comps: ComponentSpecs::new(),
            example: Batch::new(vec![ArrayD::zeros(IxDyn(&[1]))]),
        };
        checkpoint.save(&Checkpoint::path(dir, id)).unwrap();
    }

    fn params(names: &[&str]) -> ParamMap {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.to_string(), ArrayD::from_elem(IxDyn(&[2]), i as f32)))
            .collect()
    }

    fn spec(src: &str, dst: &str, skip: &str) -> RestoreSpec {
        RestoreConfig {
            src_prefix: src.into(),
            dst_prefix: dst.into(),
            skip_prefixes: skip.into(),
        }
        .into()
    }

    #[test]
    fn remap_filters_and_renames() {
        let parent = params(&["dec.w", "enc.l1.b", "enc.l1.w", "enc.l2.w"]);
        let staged = remap(&parent, &spec("enc.", "backbone.", "enc.l2"));

        let names: Vec<_> = staged.keys().cloned().collect();
        assert_eq!(names, ["backbone.l1.b", "backbone.l1.w"]);
        assert_eq!(staged["backbone.l1.b"], parent["enc.l1.b"]);
        assert_eq!(staged["backbone.l1.w"], parent["enc.l1.w"]);
    }

    #[test]
    fn skip_prefixes_are_trimmed_and_empty_ones_dropped() {
        let s = spec("", "", " a , ,b,");
        assert_eq!(s.skip_prefixes, ["a", "b"]);
    }

    #[test]
    fn skip_prefixes_match_the_original_name() {
        let parent = params(&["enc.l1.w"]);
        // "l1" would match the stripped name, not the original one.
        let staged = remap(&parent, &spec("enc.", "", "l1"));
        assert!(staged.contains_key("l1.w"));
    }

    #[test]
    fn merge_reports_missing_and_unexpected_names() {
        let target = params(&["a", "b"]);
        let staged = ParamMap::from([
            ("a".to_string(), array![7.0, 7.0].into_dyn()),
            ("z".to_string(), array![1.0, 1.0].into_dyn()),
        ]);

        let merged = merge(&target, staged).unwrap();
        assert_eq!(merged.params["a"], array![7.0, 7.0].into_dyn());
        assert_eq!(merged.params["b"], target["b"]);
        assert!(!merged.params.contains_key("z"));
        assert_eq!(merged.missing, ["b"]);
        assert_eq!(merged.unexpected, ["z"]);
    }

    #[test]
    fn merge_rejects_shape_changes() {
        let target = params(&["a"]);
        let staged = ParamMap::from([("a".to_string(), array![1.0].into_dyn())]);

        assert!(matches!(
            merge(&target, staged),
            Err(TrainErr::Ml(MlErr::ShapeMismatch { .. }))
        ));
    }

    #[test]
    fn later_parents_win_on_colliding_names() {
        let dir = env::temp_dir().join(format!("trainer-restore-{}", std::process::id()));
        save_parent(&dir, 1, ParamMap::from([("enc.w".to_string(), array![1.0, 1.0].into_dyn())]));
        save_parent(&dir, 2, ParamMap::from([("dec.w".to_string(), array![2.0, 2.0].into_dyn())]));

        let mut net = Slots {
            params: ParamMap::from([("head.w".to_string(), array![0.0, 0.0].into_dyn())]),
        };
        let restores = [spec("enc.", "head.", ""), spec("dec.", "head.", "")];
        let parents = [ParentRef { id: 1 }, ParentRef { id: 2 }];

        apply(&mut net, &restores, &parents, &dir).unwrap();
        assert_eq!(net.params["head.w"], array![2.0, 2.0].into_dyn());

        fs::remove_dir_all(dir).unwrap();
    }
}
