use std::path::PathBuf;

use machine_learning::{
    Batch, Checkpoint, ParamMap,
    dataset::PairDataset,
    spec::{ArchSpec, ComponentSpecs},
};
use rand::{SeedableRng, rngs::StdRng};

use crate::Result;

/// Produces the training batches of one epoch.
pub trait Source {
    fn batches(&mut self) -> impl Iterator<Item = machine_learning::Result<Batch>> + '_;
}

/// Fixed batches, handed out in order every epoch.
impl Source for Vec<Batch> {
    fn batches(&mut self) -> impl Iterator<Item = machine_learning::Result<Batch>> + '_ {
        self.iter().cloned().map(Ok)
    }
}

/// A pair dataset reshuffled at the start of every epoch.
pub struct ShuffledPairs {
    dataset: PairDataset,
    batch_size: usize,
    rng: StdRng,
}

impl ShuffledPairs {
    pub fn new(dataset: PairDataset, batch_size: usize) -> Self {
        Self {
            dataset,
            batch_size,
            rng: StdRng::from_os_rng(),
        }
    }
}

impl Source for ShuffledPairs {
    fn batches(&mut self) -> impl Iterator<Item = machine_learning::Result<Batch>> + '_ {
        self.dataset.shuffle(&mut self.rng);
        self.dataset.batches(self.batch_size)
    }
}

/// Where the orchestrator persists the model.
pub trait Checkpointer {
    fn save(&mut self, params: &ParamMap) -> Result<()>;
}

/// Writes full checkpoints to one file, replacing it on every save.
pub struct FileCheckpointer {
    path: PathBuf,
    arch: ArchSpec,
    comps: ComponentSpecs,
    example: Batch,
}

impl FileCheckpointer {
    pub fn new(path: PathBuf, arch: ArchSpec, comps: ComponentSpecs, example: Batch) -> Self {
        Self {
            path,
            arch,
            comps,
            example,
        }
    }
}

impl Checkpointer for FileCheckpointer {
    fn save(&mut self, params: &ParamMap) -> Result<()> {
        let checkpoint = Checkpoint {
            params: params.clone(),
            arch: self.arch.clone(),
            comps: self.comps.clone(),
            example: self.example.clone(),
        };

        Ok(checkpoint.save(&self.path)?)
    }
}
