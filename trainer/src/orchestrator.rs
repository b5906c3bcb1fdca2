use std::io::Write;

use log::{debug, info};
use machine_learning::{
    Batch, ExecutionContext, LossMap, MlErr, arch::Network, augment::Pipeline,
    optimization::Optimizer,
};
use serde_json::json;

use crate::{
    Result, TrainErr,
    metrics::{LossMeans, Phase},
    model_saver::ModelSaver,
    schedule::RateDecay,
    source::{Checkpointer, Source},
    stop_condition::StopCondition,
};

/// The prefix of the per epoch loss line.
pub const LOSS_PREFIX: &str = "jsonloss";

/// The epoch end policies.
pub struct Policies {
    pub stop: StopCondition,
    pub saver: ModelSaver,
    pub decay: Option<RateDecay>,
}

/// How a finished run went.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub epochs: u32,
    pub best_score: Option<f32>,
}

/// Drives the training epochs and consults the policies after each one.
pub struct Orchestrator<N, C, W> {
    ctx: ExecutionContext<N>,
    optimizer: Box<dyn Optimizer>,
    policies: Policies,
    checkpointer: C,
    report: W,
}

impl<N, C, W> Orchestrator<N, C, W>
where
    N: Network,
    C: Checkpointer,
    W: Write,
{
    /// Creates a new `Orchestrator`.
    ///
    /// # Arguments
    /// * `ctx` - The network and the device it runs on.
    /// * `optimizer` - The optimizer stepping the network.
    /// * `policies` - Stop, save and rate decay policies.
    /// * `checkpointer` - Where the model is persisted.
    /// * `report` - Where the `jsonloss` lines are written.
    pub fn new(
        ctx: ExecutionContext<N>,
        optimizer: Box<dyn Optimizer>,
        policies: Policies,
        checkpointer: C,
        report: W,
    ) -> Self {
        Self {
            ctx,
            optimizer,
            policies,
            checkpointer,
            report,
        }
    }

    /// Trains until the stop condition fires.
    ///
    /// The model is saved once before the first epoch, then whenever the
    /// saver asks for it. The epoch that stops the run is not saved.
    ///
    /// # Arguments
    /// * `train` - The training batches, drawn anew every epoch.
    /// * `val` - The validation batches, already augmented.
    /// * `augment` - The device stage augmentations of training batches.
    ///
    /// # Errors
    /// Any failure of a pass, of the checkpointer or of the report writer,
    /// `EmptyEpoch` if a phase has no batches and `MissingLoss` if the
    /// losses lack `loss` or the validation losses lack `score`.
    pub fn run<S: Source>(
        &mut self,
        train: &mut S,
        val: &[Batch],
        augment: &mut Pipeline,
    ) -> Result<Summary> {
        info!("begin training");
        self.checkpointer.save(self.ctx.net.params())?;

        loop {
            let train_losses = self.train_epoch(train, augment)?;
            let val_losses = self.val_epoch(val)?;

            let line = json!({"train": train_losses, "val": val_losses});
            writeln!(self.report, "{LOSS_PREFIX}{line}")?;
            self.report.flush()?;

            let score = *val_losses.get("score").ok_or_else(|| TrainErr::MissingLoss {
                key: "score".into(),
                phase: Phase::Val,
            })?;

            if self.policies.stop.update(score) {
                break;
            }

            if self.policies.saver.update(score) {
                debug!(score = score; "saving model");
                self.checkpointer.save(self.ctx.net.params())?;
            }

            if let Some(decay) = &mut self.policies.decay {
                let lr = decay.step(score, self.optimizer.learning_rate());
                self.optimizer.set_learning_rate(lr);
                info!("lr={lr}");
            }
        }

        let summary = Summary {
            epochs: self.policies.stop.epochs(),
            best_score: self.policies.stop.best_score(),
        };
        info!(epochs = summary.epochs; "training finished, best score {:?}", summary.best_score);

        Ok(summary)
    }

    pub fn context(&self) -> &ExecutionContext<N> {
        &self.ctx
    }

    pub fn optimizer(&self) -> &dyn Optimizer {
        self.optimizer.as_ref()
    }

    fn train_epoch<S: Source>(&mut self, train: &mut S, augment: &mut Pipeline) -> Result<LossMap> {
        let Self { ctx, optimizer, .. } = self;
        let num_inputs = ctx.net.num_inputs();
        let mut means = LossMeans::new(Phase::Train);

        for batch in train.batches() {
            let mut batch = ctx.place(batch?);

            if batch.tensors.len() < num_inputs {
                return Err(MlErr::MissingInput {
                    got: batch.tensors.len(),
                    expected: num_inputs,
                }
                .into());
            }
            augment.apply_inputs(&mut batch.tensors[..num_inputs]);

            let (inputs, targets) = batch.split(num_inputs)?;

            ctx.net.zero_grad();
            let losses = ctx.net.loss(inputs, targets)?;
            require_loss(&losses, Phase::Train)?;
            ctx.net.backward()?;
            ctx.net.step(optimizer.as_mut())?;

            means.push(&losses)?;
        }

        means.means()
    }

    fn val_epoch(&mut self, val: &[Batch]) -> Result<LossMap> {
        let net = &mut self.ctx.net;
        let mut means = LossMeans::new(Phase::Val);

        for batch in val {
            let (inputs, targets) = batch.split(net.num_inputs())?;
            let losses = net.loss(inputs, targets)?;
            require_loss(&losses, Phase::Val)?;
            means.push(&losses)?;
        }

        means.means()
    }
}

fn require_loss(losses: &LossMap, phase: Phase) -> Result<()> {
    if losses.contains_key("loss") {
        Ok(())
    } else {
        Err(TrainErr::MissingLoss {
            key: "loss".into(),
            phase,
        })
    }
}
