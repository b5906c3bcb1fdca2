//! Persisted model snapshots.
//!
//! A checkpoint is one safetensors file holding the parameters as
//! `model.<name>`, the example input batch as `example.<i>`, and the
//! architecture and component specs as JSON metadata.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use ndarray::{ArrayD, IxDyn};
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::{
    Batch, MlErr, ParamMap, Result,
    spec::{ArchSpec, ComponentSpecs},
};

/// The version tag stored under the `format` metadata key.
pub const FORMAT: &str = "reid-matcher/1";

const PARAM_PREFIX: &str = "model.";
const EXAMPLE_PREFIX: &str = "example.";

/// Everything needed to rebuild and reload a trained network.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub params: ParamMap,
    pub arch: ArchSpec,
    pub comps: ComponentSpecs,
    pub example: Batch,
}

impl Checkpoint {
    /// The checkpoint path of a node, `<dir>/<node_id>.pt`.
    pub fn path(dir: &Path, node_id: u32) -> PathBuf {
        dir.join(format!("{node_id}.pt"))
    }

    /// Encodes the checkpoint into safetensors bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut named = Vec::with_capacity(self.params.len() + self.example.tensors.len());

        for (name, t) in &self.params {
            named.push((format!("{PARAM_PREFIX}{name}"), t));
        }
        for (i, t) in self.example.tensors.iter().enumerate() {
            named.push((format!("{EXAMPLE_PREFIX}{i}"), t));
        }

        // Owned contiguous copies; the views below borrow them.
        let data: Vec<(String, Vec<usize>, Vec<f32>)> = named
            .into_iter()
            .map(|(name, t)| (name, t.shape().to_vec(), t.iter().copied().collect()))
            .collect();

        let views = data
            .iter()
            .map(|(name, shape, values)| {
                TensorView::new(Dtype::F32, shape.clone(), bytemuck::cast_slice(values))
                    .map(|view| (name.as_str(), view))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let metadata = HashMap::from([
            ("arch".to_string(), serde_json::to_string(&self.arch)?),
            ("comps".to_string(), serde_json::to_string(&self.comps)?),
            ("format".to_string(), FORMAT.to_string()),
        ]);

        Ok(safetensors::serialize(views, &Some(metadata))?)
    }

    /// Decodes a checkpoint from safetensors bytes.
    ///
    /// # Errors
    /// `Checkpoint` if the container is malformed, `InvalidSpec` if the
    /// metadata is missing, of another format, or holds non `f32` tensors.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (_, header) = SafeTensors::read_metadata(bytes)?;
        let metadata = header
            .metadata()
            .as_ref()
            .ok_or_else(|| MlErr::InvalidSpec("checkpoint has no metadata".into()))?;

        let field = |key: &str| {
            metadata
                .get(key)
                .ok_or_else(|| MlErr::InvalidSpec(format!("checkpoint metadata lacks {key:?}")))
        };

        let format = field("format")?;
        if format != FORMAT {
            return Err(MlErr::InvalidSpec(format!(
                "checkpoint format {format:?}, expected {FORMAT:?}"
            )));
        }

        let arch: ArchSpec = serde_json::from_str(field("arch")?)?;
        let comps: ComponentSpecs = serde_json::from_str(field("comps")?)?;

        let tensors = SafeTensors::deserialize(bytes)?;
        let mut params = ParamMap::new();
        let mut example = Vec::new();

        for (name, view) in tensors.tensors() {
            let t = to_array(&name, &view)?;

            if let Some(param) = name.strip_prefix(PARAM_PREFIX) {
                params.insert(param.to_string(), t);
            } else if let Some(i) = name.strip_prefix(EXAMPLE_PREFIX) {
                let i: usize = i
                    .parse()
                    .map_err(|_| MlErr::InvalidSpec(format!("bad example tensor name {name:?}")))?;
                example.push((i, t));
            } else {
                return Err(MlErr::InvalidSpec(format!("unexpected checkpoint tensor {name:?}")));
            }
        }

        example.sort_by_key(|(i, _)| *i);
        let example = Batch::new(example.into_iter().map(|(_, t)| t).collect());

        Ok(Self {
            params,
            arch,
            comps,
            example,
        })
    }

    /// Writes the checkpoint to `path`, replacing any previous file.
    ///
    /// The bytes go to a sibling temporary file that is then renamed over
    /// `path`, so readers never observe a partial checkpoint.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let bytes = self.to_bytes()?;
        let tmp = path.with_extension("pt.tmp");

        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, path)?;

        debug!(bytes = bytes.len(); "saved checkpoint to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

fn to_array(name: &str, view: &TensorView<'_>) -> Result<ArrayD<f32>> {
    if view.dtype() != Dtype::F32 {
        return Err(MlErr::InvalidSpec(format!(
            "tensor {name:?} is {:?}, expected F32",
            view.dtype()
        )));
    }

    let values: Vec<f32> = bytemuck::pod_collect_to_vec(view.data());
    Ok(ArrayD::from_shape_vec(IxDyn(view.shape()), values)?)
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use ndarray::array;

    use super::*;
    use crate::spec::{ComponentRef, ComponentSpec};

    fn checkpoint(w: f32) -> Checkpoint {
        Checkpoint {
            params: ParamMap::from([
                ("head.weight".to_string(), array![[w], [2.0]].into_dyn()),
                ("head.bias".to_string(), array![0.5].into_dyn()),
            ]),
            arch: ArchSpec {
                num_inputs: 2,
                components: vec![ComponentRef { id: 1 }],
            },
            comps: ComponentSpecs::from([(
                1,
                ComponentSpec::Siamese {
                    hidden: vec![],
                    embedding: 2,
                    amp: 1.0,
                    seed: None,
                },
            )]),
            example: Batch::new(vec![
                array![[1.0, 2.0]].into_dyn(),
                array![[3.0, 4.0]].into_dyn(),
                array![1.0].into_dyn(),
            ]),
        }
    }

    fn temp_dir() -> PathBuf {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        env::temp_dir().join(format!(
            "ml-checkpoint-{}-{}",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        ))
    }

    #[test]
    fn bytes_round_trip() {
        let ckpt = checkpoint(1.0);
        let back = Checkpoint::from_bytes(&ckpt.to_bytes().unwrap()).unwrap();
        assert_eq!(back, ckpt);
    }

    #[test]
    fn save_replaces_the_previous_file() {
        let dir = temp_dir();
        let path = Checkpoint::path(&dir.join("models"), 7);
        assert!(path.ends_with("models/7.pt"));

        checkpoint(1.0).save(&path).unwrap();
        checkpoint(9.0).save(&path).unwrap();

        let back = Checkpoint::load(&path).unwrap();
        assert_eq!(back.params["head.weight"], array![[9.0], [2.0]].into_dyn());
        assert!(!path.with_extension("pt.tmp").exists());

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Checkpoint::from_bytes(b"not a checkpoint").is_err());
    }
}
