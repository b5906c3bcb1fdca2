use std::{cell::RefCell, rc::Rc};

use machine_learning::{
    Batch, Device, ExecutionContext, LossMap, ParamMap, Result as MlResult,
    arch::{Network, Outputs},
    augment::Pipeline,
    optimization::{Adam, Optimizer},
};
use ndarray::{ArrayD, IxDyn, array};
use serde_json::Value;

use trainer::{
    Orchestrator, Policies, TrainErr,
    metrics::Phase,
    model_saver::{ModelSaver, SaveMode, SaverConfig},
    schedule::{RateDecay, RateDecayConfig},
    source::Checkpointer,
    stop_condition::{StopCondition, StopConfig},
};

/// Reports `loss` as the sum of its first input and, as `score`, the entry
/// of `scores` matching the amount of optimizer steps taken so far.
struct ScriptedNet {
    params: ParamMap,
    scores: Vec<f32>,
    steps: usize,
    with_loss: bool,
    with_score: bool,
}

impl ScriptedNet {
    fn new(scores: &[f32]) -> Self {
        Self {
            params: ParamMap::from([("w".to_string(), array![0.0].into_dyn())]),
            scores: scores.to_vec(),
            steps: 0,
            with_loss: true,
            with_score: true,
        }
    }
}

impl Network for ScriptedNet {
    fn num_inputs(&self) -> usize {
        1
    }

    fn params(&self) -> &ParamMap {
        &self.params
    }

    fn load_params(&mut self, params: ParamMap) -> MlResult<()> {
        self.params.extend(params);
        Ok(())
    }

    fn forward(&mut self, _inputs: &[ArrayD<f32>]) -> MlResult<Outputs> {
        Ok(Vec::new())
    }

    fn loss(&mut self, inputs: &[ArrayD<f32>], _targets: &[ArrayD<f32>]) -> MlResult<LossMap> {
        let mut losses = LossMap::new();

        if self.with_loss {
            losses.insert("loss".to_string(), inputs[0].sum());
        }

        if self.with_score {
            let i = self.steps.saturating_sub(1).min(self.scores.len() - 1);
            losses.insert("score".to_string(), self.scores[i]);
        }

        Ok(losses)
    }

    fn zero_grad(&mut self) {}

    fn backward(&mut self) -> MlResult<()> {
        Ok(())
    }

    fn step(&mut self, _optimizer: &mut dyn Optimizer) -> MlResult<()> {
        self.steps += 1;
        self.params
            .insert("w".to_string(), array![self.steps as f32].into_dyn());
        Ok(())
    }
}

#[derive(Clone, Default)]
struct Recorder {
    saved: Rc<RefCell<Vec<ParamMap>>>,
}

impl Checkpointer for Recorder {
    fn save(&mut self, params: &ParamMap) -> trainer::Result<()> {
        self.saved.borrow_mut().push(params.clone());
        Ok(())
    }
}

fn batch(value: f32) -> Batch {
    Batch::new(vec![
        ArrayD::from_elem(IxDyn(&[1]), value),
        ArrayD::zeros(IxDyn(&[1])),
    ])
}

fn policies(max_epochs: u32, mode: SaveMode, decay: Option<RateDecay>) -> Policies {
    Policies {
        stop: StopCondition::new(StopConfig {
            max_epochs,
            score_epsilon: 0.0,
            score_max_epochs: 0,
        }),
        saver: ModelSaver::new(SaverConfig { mode }),
        decay,
    }
}

fn orchestrator<'a>(
    net: ScriptedNet,
    policies: Policies,
    recorder: &Recorder,
    report: &'a mut Vec<u8>,
) -> Orchestrator<ScriptedNet, Recorder, &'a mut Vec<u8>> {
    Orchestrator::new(
        ExecutionContext::new(Device::Cpu, net),
        Box::new(Adam::with_learning_rate(1.0)),
        policies,
        recorder.clone(),
        report,
    )
}

fn loss_lines(report: &[u8]) -> Vec<Value> {
    String::from_utf8(report.to_vec())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line.strip_prefix("jsonloss").unwrap()).unwrap())
        .collect()
}

#[test]
fn saves_before_the_first_epoch_and_not_on_the_stopping_one() {
    let recorder = Recorder::default();
    let mut report = Vec::new();
    let mut orch = orchestrator(
        ScriptedNet::new(&[0.1]),
        policies(3, SaveMode::Latest, None),
        &recorder,
        &mut report,
    );

    let summary = orch
        .run(&mut vec![batch(1.0)], &[batch(0.0)], &mut Pipeline::default())
        .unwrap();
    assert_eq!(summary.epochs, 3);

    let saved = recorder.saved.borrow();
    let ws: Vec<f32> = saved.iter().map(|p| p["w"].sum()).collect();
    assert_eq!(ws, [0.0, 1.0, 2.0]);
}

#[test]
fn best_mode_saves_only_improvements() {
    let recorder = Recorder::default();
    let mut report = Vec::new();
    let mut orch = orchestrator(
        ScriptedNet::new(&[0.5, 0.6, 0.55, 0.7]),
        policies(4, SaveMode::Best, None),
        &recorder,
        &mut report,
    );

    let summary = orch
        .run(&mut vec![batch(1.0)], &[batch(0.0)], &mut Pipeline::default())
        .unwrap();

    // initial, epoch 1 and epoch 2; epoch 3 is worse and epoch 4 stops.
    assert_eq!(recorder.saved.borrow().len(), 3);
    assert_eq!(summary.best_score, Some(0.6));
}

#[test]
fn emits_one_loss_line_per_epoch_with_batch_means() {
    let recorder = Recorder::default();
    let mut report = Vec::new();

    {
        let mut orch = orchestrator(
            ScriptedNet::new(&[0.5]),
            policies(2, SaveMode::Best, None),
            &recorder,
            &mut report,
        );
        orch.run(
            &mut vec![batch(1.0), batch(3.0)],
            &[batch(4.0), batch(6.0)],
            &mut Pipeline::default(),
        )
        .unwrap();
    }

    let lines = loss_lines(&report);
    assert_eq!(lines.len(), 2);
    for line in &lines {
        assert_eq!(line["train"]["loss"], 2.0);
        assert_eq!(line["val"]["loss"], 5.0);
        assert_eq!(line["val"]["score"], 0.5);
    }
}

#[test]
fn rate_decay_runs_after_every_continuing_epoch() {
    let config: RateDecayConfig =
        serde_json::from_str(r#"{"Op": "step", "StepSize": 1, "StepGamma": 0.5}"#).unwrap();
    let decay = RateDecay::from_config(&config).unwrap();

    let recorder = Recorder::default();
    let mut report = Vec::new();
    let mut orch = orchestrator(
        ScriptedNet::new(&[0.5]),
        policies(3, SaveMode::Best, Some(decay)),
        &recorder,
        &mut report,
    );

    orch.run(&mut vec![batch(1.0)], &[batch(0.0)], &mut Pipeline::default())
        .unwrap();
    assert_eq!(orch.optimizer().learning_rate(), 0.25);
}

#[test]
fn validation_losses_without_score_are_fatal() {
    let mut net = ScriptedNet::new(&[0.5]);
    net.with_score = false;

    let recorder = Recorder::default();
    let mut report = Vec::new();
    let mut orch = orchestrator(net, policies(3, SaveMode::Best, None), &recorder, &mut report);

    let res = orch.run(&mut vec![batch(1.0)], &[batch(0.0)], &mut Pipeline::default());
    assert!(matches!(
        res,
        Err(TrainErr::MissingLoss { ref key, phase: Phase::Val }) if key == "score"
    ));
}

#[test]
fn training_losses_without_loss_are_fatal() {
    let mut net = ScriptedNet::new(&[0.5]);
    net.with_loss = false;

    let recorder = Recorder::default();
    let mut report = Vec::new();
    let mut orch = orchestrator(net, policies(3, SaveMode::Best, None), &recorder, &mut report);

    let res = orch.run(&mut vec![batch(1.0)], &[batch(0.0)], &mut Pipeline::default());
    assert!(matches!(
        res,
        Err(TrainErr::MissingLoss { ref key, phase: Phase::Train }) if key == "loss"
    ));
    assert!(report.is_empty());
}

#[test]
fn an_epoch_without_training_batches_is_fatal() {
    let recorder = Recorder::default();
    let mut report = Vec::new();
    let mut orch = orchestrator(
        ScriptedNet::new(&[0.5]),
        policies(3, SaveMode::Best, None),
        &recorder,
        &mut report,
    );

    let res = orch.run(&mut Vec::<Batch>::new(), &[batch(0.0)], &mut Pipeline::default());
    assert!(matches!(res, Err(TrainErr::EmptyEpoch { phase: Phase::Train })));
}
