use std::{io, path::Path};

use log::info;
use machine_learning::{
    Batch, Checkpoint, Device, ExecutionContext, augment::Pipeline, dataset::Provider,
    optimization::Adam,
};

use crate::{
    Args, Result,
    model_saver::ModelSaver,
    orchestrator::{Orchestrator, Policies, Summary},
    restore,
    source::{FileCheckpointer, ShuffledPairs},
    stop_condition::StopCondition,
};

/// Batch size of the validation passes.
pub const VAL_BATCH_SIZE: usize = 32;

/// Runs a whole training run from its parsed arguments, writing the loss
/// lines to `report` and the checkpoints under `models_dir`.
pub fn run<W: io::Write>(args: Args, models_dir: &Path, report: W) -> Result<Summary> {
    let Args {
        node_id,
        locator,
        params,
        restores,
        rate_decay,
        arch,
        comps,
        datasets,
        parents,
    } = args;

    let train_params = params.train().clone();
    let device = Device::default();

    info!("loading data augmentations");
    let (mut ds_augment, mut device_augment) = Pipeline::split(&params.augment)?;

    info!("loading datasets");
    let provider = Provider::from_spec(&params.dataset)?;
    let (train_set, val_set) = provider.load(&locator, &datasets, &mut ds_augment)?;

    // Validation batches get the device stage augmentations once, up front.
    info!("preparing validation set");
    let val_batches = val_set
        .batches(VAL_BATCH_SIZE)
        .map(|batch| -> Result<Batch> {
            let mut batch = device.place(batch?);
            let n = arch.num_inputs.min(batch.tensors.len());
            device_augment.apply_inputs(&mut batch.tensors[..n]);
            Ok(batch)
        })
        .collect::<Result<Vec<Batch>>>()?;

    info!("initialize model");
    let example = train_set.example(1)?;
    let mut net = machine_learning::arch::build(&arch, &comps, &example)?;
    let optimizer = Adam::with_learning_rate(train_params.learning_rate);

    let policies = Policies {
        stop: StopCondition::new(train_params.stop_condition),
        saver: ModelSaver::new(train_params.model_saver),
        decay: rate_decay,
    };

    restore::apply(&mut *net, &restores, &parents, models_dir)?;

    let checkpointer =
        FileCheckpointer::new(Checkpoint::path(models_dir, node_id), arch, comps, example);
    let mut source = ShuffledPairs::new(train_set, train_params.batch_size);

    let mut orchestrator = Orchestrator::new(
        ExecutionContext::new(device, net),
        Box::new(optimizer),
        policies,
        checkpointer,
        report,
    );

    orchestrator.run(&mut source, &val_batches, &mut device_augment)
}
