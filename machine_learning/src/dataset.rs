use std::{fs, path::Path};

use comms::IMAGE_BYTES;
use log::info;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::Deserialize;

use crate::{
    Batch, MlErr, Result,
    augment::Pipeline,
    spec::OpSpec,
    tensor::{images_to_tensor, labels_to_tensor},
};

/// The size of one on-disk record: a label byte and two crops.
pub const RECORD_BYTES: usize = 1 + 2 * IMAGE_BYTES;

/// The seed of the shuffle that decides the train/validation split.
const SPLIT_SEED: u64 = 0;

/// One dataset of the dataset list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatasetRef {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
}

/// A labelled pair of raw channel-last crops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairSample {
    pub label: u8,
    pub left: Vec<u8>,
    pub right: Vec<u8>,
}

impl PairSample {
    fn from_record(record: &[u8]) -> Result<Self> {
        let (label, crops) = (record[0], &record[1..]);

        if label > 1 {
            return Err(MlErr::Dataset(format!("label must be 0 or 1, got {label}")));
        }

        let (left, right) = crops.split_at(IMAGE_BYTES);
        Ok(Self {
            label,
            left: left.to_vec(),
            right: right.to_vec(),
        })
    }
}

/// Reads every record of a `.pairs` file.
///
/// # Errors
/// `Io` if the file cannot be read, `Dataset` if its size is not a whole
/// number of records or a label is not binary.
pub fn read_pairs(path: &Path) -> Result<Vec<PairSample>> {
    let bytes = fs::read(path)?;

    if bytes.len() % RECORD_BYTES != 0 {
        return Err(MlErr::Dataset(format!(
            "{} holds {} bytes, not a multiple of the {RECORD_BYTES} byte record",
            path.display(),
            bytes.len()
        )));
    }

    bytes.chunks_exact(RECORD_BYTES).map(PairSample::from_record).collect()
}

/// An in-memory list of pair samples.
#[derive(Debug, Clone, Default)]
pub struct PairDataset {
    samples: Vec<PairSample>,
}

impl PairDataset {
    pub fn new(samples: Vec<PairSample>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[PairSample] {
        &self.samples
    }

    /// Splits the dataset into `(train, validation)`.
    ///
    /// The samples are shuffled with a fixed seed and every one whose
    /// shuffled index `i` has `i % 100 < val_percent` goes to validation, so
    /// the same data always splits the same way.
    pub fn split(self, val_percent: u32) -> (PairDataset, PairDataset) {
        let mut samples = self.samples;
        samples.shuffle(&mut StdRng::seed_from_u64(SPLIT_SEED));

        let (val, train): (Vec<_>, Vec<_>) = samples
            .into_iter()
            .enumerate()
            .partition(|(i, _)| (*i % 100) < val_percent as usize);

        let strip = |v: Vec<(usize, PairSample)>| PairDataset::new(v.into_iter().map(|(_, s)| s).collect());
        (strip(train), strip(val))
    }

    /// Applies a dataset stage pipeline to both crops of every sample.
    pub fn augment(&mut self, pipeline: &mut Pipeline) {
        if pipeline.is_empty() {
            return;
        }

        for sample in &mut self.samples {
            pipeline.apply_crop(&mut sample.left);
            pipeline.apply_crop(&mut sample.right);
        }
    }

    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        self.samples.shuffle(rng);
    }

    /// Collates the samples, in order, into batches of at most `batch_size`.
    ///
    /// Each batch holds the left crops, the right crops and the labels.
    pub fn batches(&self, batch_size: usize) -> impl Iterator<Item = Result<Batch>> + '_ {
        self.samples.chunks(batch_size.max(1)).map(collate)
    }

    /// The first batch of at most `n` samples, used to size a network.
    ///
    /// # Errors
    /// `Dataset` if the dataset is empty.
    pub fn example(&self, n: usize) -> Result<Batch> {
        self.batches(n)
            .next()
            .unwrap_or_else(|| Err(MlErr::Dataset("no samples to draw an example from".into())))
    }
}

fn collate(samples: &[PairSample]) -> Result<Batch> {
    let left: Vec<&[u8]> = samples.iter().map(|s| s.left.as_slice()).collect();
    let right: Vec<&[u8]> = samples.iter().map(|s| s.right.as_slice()).collect();
    let labels: Vec<u8> = samples.iter().map(|s| s.label).collect();

    Ok(Batch::new(vec![
        images_to_tensor(&left)?,
        images_to_tensor(&right)?,
        labels_to_tensor(&labels),
    ]))
}

fn default_val_percent() -> u32 {
    20
}

#[derive(Deserialize)]
struct PairsParams {
    #[serde(rename = "ValPercent", default = "default_val_percent")]
    val_percent: u32,
}

/// Where and how the training data is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// `<locator>/<ID>.pairs` files split by a validation percentage.
    Pairs { val_percent: u32 },
}

impl Provider {
    /// # Errors
    /// `UnknownOp` for an unknown `Op`, `InvalidSpec` for bad parameters.
    pub fn from_spec(spec: &OpSpec) -> Result<Self> {
        match spec.op.as_str() {
            "pairs" => {
                let PairsParams { val_percent } = spec.params("dataset")?;

                if val_percent > 100 {
                    return Err(MlErr::InvalidSpec(format!(
                        "ValPercent must be at most 100, got {val_percent}"
                    )));
                }

                Ok(Provider::Pairs { val_percent })
            }
            other => Err(MlErr::UnknownOp {
                what: "dataset",
                got: other.to_string(),
            }),
        }
    }

    /// Reads every listed dataset, applies the dataset stage pipeline and
    /// splits the result.
    ///
    /// # Returns
    /// The `(train, validation)` datasets.
    pub fn load(
        &self,
        locator: &Path,
        datasets: &[DatasetRef],
        pipeline: &mut Pipeline,
    ) -> Result<(PairDataset, PairDataset)> {
        let Provider::Pairs { val_percent } = *self;
        let mut samples = Vec::new();

        for dataset in datasets {
            let path = locator.join(format!("{}.pairs", dataset.id));
            let read = read_pairs(&path)?;

            info!(
                dataset = dataset.id,
                name = dataset.name.as_deref().unwrap_or("");
                "read {} pairs from {}",
                read.len(),
                path.display()
            );
            samples.extend(read);
        }

        let mut all = PairDataset::new(samples);
        all.augment(pipeline);

        let (train, val) = all.split(val_percent);
        info!(train = train.len(), val = val.len(); "split dataset");

        Ok((train, val))
    }
}
