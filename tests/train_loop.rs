//! End-to-end training loop tests: full runs, phase transition, resume,
//! and resource-exhaustion recovery.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use robusto::{
    Batch, CheckpointStore, Device, EnvExamples, InMemorySource, LeastSquaresModel,
    MetricsSink, Model, ModelState, OptimizerConfig, OptimizerKind, OptimizerState, Phase,
    ResourceExhausted, StepResult, Tensor, TrainConfig, Trainer,
};
use tempfile::TempDir;

fn two_env_batch(dim: usize) -> Batch {
    Batch::new(vec![
        EnvExamples::new(
            "easy",
            Tensor::from_vec(vec![1.0; dim], false),
            Tensor::from_vec(vec![0.5; dim], false),
        ),
        EnvExamples::new(
            "hard",
            Tensor::from_vec(vec![1.0; dim], false),
            Tensor::from_vec(vec![2.0; dim], false),
        ),
    ])
}

fn source(dim: usize) -> Box<InMemorySource> {
    Box::new(InMemorySource::new(vec![two_env_batch(dim)]))
}

fn sgd_config(max_steps: u64, burnin_iters: u64) -> TrainConfig {
    TrainConfig {
        max_steps,
        burnin_iters,
        report_every_n: 1,
        eval_every_n: 1_000_000,
        optimizer: OptimizerConfig {
            name: OptimizerKind::Sgd,
            lr: 0.05,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn test_full_run_writes_per_step_checkpoints() {
    let dir = TempDir::new().unwrap();
    let mut trainer = Trainer::new(
        sgd_config(5, 2),
        Box::new(LeastSquaresModel::new(2, 0)),
        source(2),
        dir.path(),
    )
    .unwrap();

    trainer.run().unwrap();

    assert_eq!(trainer.last_step(), 5);
    let store = CheckpointStore::new(dir.path()).unwrap();
    for step in 1..=5 {
        let checkpoint = store.load(step).unwrap();
        assert_eq!(checkpoint.step, step);
    }
    assert_eq!(store.latest_step().unwrap(), Some(5));

    // Burn-in of 2 completed long ago
    assert_eq!(trainer.engine().phase(), Phase::Robust);
}

#[test]
fn test_phase_transition_rebuilds_optimizer_with_fresh_state() {
    let dir = TempDir::new().unwrap();
    let config = TrainConfig {
        optimizer: OptimizerConfig { name: OptimizerKind::AdamW, lr: 1e-3, ..Default::default() },
        ..sgd_config(3, 2)
    };
    let mut trainer =
        Trainer::new(config, Box::new(LeastSquaresModel::new(2, 0)), source(2), dir.path())
            .unwrap();
    trainer.run().unwrap();

    let store = CheckpointStore::new(dir.path()).unwrap();
    let step_count = |step: u64| match store.load(step).unwrap().optimizer {
        OptimizerState::AdamW { step_count, .. } => step_count,
        OptimizerState::Sgd { .. } => panic!("expected AdamW state"),
    };

    // Two burn-in steps accumulate, then the reset discards the counter and
    // the robust step starts over
    assert_eq!(step_count(2), 2);
    assert_eq!(step_count(3), 1);
}

#[test]
fn test_resume_continues_from_last_checkpoint() {
    let dir = TempDir::new().unwrap();

    let mut first = Trainer::new(
        sgd_config(3, 10),
        Box::new(LeastSquaresModel::new(2, 0)),
        source(2),
        dir.path(),
    )
    .unwrap();
    first.run().unwrap();
    assert_eq!(first.last_step(), 3);
    let calls_after_first = first.engine().calls();

    let mut resumed = Trainer::new(
        sgd_config(6, 10),
        Box::new(LeastSquaresModel::new(2, 0)),
        source(2),
        dir.path(),
    )
    .unwrap();
    assert_eq!(resumed.last_step(), 3);
    assert_eq!(resumed.engine().calls(), calls_after_first);

    resumed.run().unwrap();
    assert_eq!(resumed.last_step(), 6);
}

#[test]
fn test_dual_optimizer_mode_groups_and_clipping() {
    let dir = TempDir::new().unwrap();
    let config = TrainConfig {
        use_bert_training: true,
        clip_grad: Some(1.0),
        optimizer: OptimizerConfig {
            name: OptimizerKind::Sgd,
            lr: 0.05,
            bert_lr: Some(0.001),
            ..Default::default()
        },
        ..sgd_config(3, 1)
    };
    let mut trainer =
        Trainer::new(config, Box::new(LeastSquaresModel::new(4, 2)), source(4), dir.path())
            .unwrap();
    trainer.run().unwrap();

    let store = CheckpointStore::new(dir.path()).unwrap();
    let checkpoint = store.load(3).unwrap();
    assert_eq!(checkpoint.optimizer.group_names(), vec!["non_bert", "bert"]);
}

#[test]
fn test_bert_mode_without_bert_params_fails_at_startup() {
    let dir = TempDir::new().unwrap();
    let config = TrainConfig { use_bert_training: true, ..sgd_config(3, 1) };
    assert!(Trainer::new(
        config,
        Box::new(LeastSquaresModel::new(2, 0)),
        source(2),
        dir.path()
    )
    .is_err());
}

/// Wraps a real model and reports resource exhaustion on chosen forward calls
struct FlakyModel {
    inner: LeastSquaresModel,
    fail_on_calls: HashSet<u64>,
    calls: u64,
}

impl FlakyModel {
    fn new(inner: LeastSquaresModel, fail_on_calls: impl IntoIterator<Item = u64>) -> Self {
        Self { inner, fail_on_calls: fail_on_calls.into_iter().collect(), calls: 0 }
    }
}

impl Model for FlakyModel {
    fn parameters(&self) -> Vec<Tensor> {
        self.inner.parameters()
    }
    fn bert_parameters(&self) -> Vec<Tensor> {
        self.inner.bert_parameters()
    }
    fn non_bert_parameters(&self) -> Vec<Tensor> {
        self.inner.non_bert_parameters()
    }
    fn forward(&mut self, batch: &Batch) -> StepResult<Vec<f32>> {
        self.calls += 1;
        if self.fail_on_calls.contains(&self.calls) {
            return Err(ResourceExhausted("simulated allocation failure".into()));
        }
        self.inner.forward(batch)
    }
    fn backward(&mut self, weights: &[f32]) -> StepResult<()> {
        self.inner.backward(weights)
    }
    fn to_device(&mut self, device: Device) {
        self.inner.to_device(device);
    }
    fn device(&self) -> Device {
        self.inner.device()
    }
    fn state(&self) -> ModelState {
        self.inner.state()
    }
    fn load_state(&mut self, state: &ModelState) -> robusto::Result<()> {
        self.inner.load_state(state)
    }
}

#[test]
fn test_exhaustion_recovers_and_retries_same_step() {
    let dir = TempDir::new().unwrap();
    let model = FlakyModel::new(LeastSquaresModel::new(2, 0), [2]);
    let mut trainer =
        Trainer::new(sgd_config(3, 10), Box::new(model), source(2), dir.path()).unwrap();

    trainer.run().unwrap();

    // The failed step was retried, not skipped
    assert_eq!(trainer.last_step(), 3);
    let store = CheckpointStore::new(dir.path()).unwrap();
    for step in 1..=3 {
        assert!(store.load(step).is_ok(), "missing checkpoint for step {step}");
    }
    // Recovery cleaned up after itself
    assert!(!store.has_emergency());
}

#[test]
fn test_repeated_exhaustion_still_completes() {
    let dir = TempDir::new().unwrap();
    let model = FlakyModel::new(LeastSquaresModel::new(2, 0), [1, 3, 4]);
    let mut trainer =
        Trainer::new(sgd_config(4, 10), Box::new(model), source(2), dir.path()).unwrap();

    trainer.run().unwrap();
    assert_eq!(trainer.last_step(), 4);
}

#[test]
fn test_startup_resumes_from_leftover_emergency_snapshot() {
    let dir = TempDir::new().unwrap();

    // A run that completed 2 steps, then died mid-recovery leaving the
    // emergency artifact behind
    let mut first = Trainer::new(
        sgd_config(2, 10),
        Box::new(LeastSquaresModel::new(2, 0)),
        source(2),
        dir.path(),
    )
    .unwrap();
    first.run().unwrap();
    let store = CheckpointStore::new(dir.path()).unwrap();
    let orphaned = store.load(2).unwrap();
    store.save_emergency(&orphaned).unwrap();

    let resumed = Trainer::new(
        sgd_config(5, 10),
        Box::new(LeastSquaresModel::new(2, 0)),
        source(2),
        dir.path(),
    )
    .unwrap();
    // The snapshot's real step wins over the sentinel key, and the artifact
    // is cleared so later saves are not shadowed
    assert_eq!(resumed.last_step(), 2);
    assert!(!store.has_emergency());
}

#[derive(Clone, Default)]
struct RecordingSink {
    steps: Rc<RefCell<Vec<u64>>>,
    evals: Rc<RefCell<Vec<(u64, String)>>>,
}

impl MetricsSink for RecordingSink {
    fn log_step(&mut self, step: u64, _loss: f32, _lrs: &[f32]) {
        self.steps.borrow_mut().push(step);
    }
    fn log_eval(&mut self, step: u64, split: &str, _loss: f32) {
        self.evals.borrow_mut().push((step, split.to_string()));
    }
}

#[test]
fn test_training_reduces_robust_loss() {
    let dir = TempDir::new().unwrap();
    let mut trainer = Trainer::new(
        sgd_config(60, 5),
        Box::new(LeastSquaresModel::new(2, 0)),
        source(2),
        dir.path(),
    )
    .unwrap();
    trainer.run().unwrap();

    // After training, predictions approach the harder environment's targets:
    // the robust objective over [0.5-target, 2.0-target] envs pulls the
    // weights toward the worst case
    let store = CheckpointStore::new(dir.path()).unwrap();
    let final_weights = &store.load(60).unwrap().model.tensors[0].1;
    for w in final_weights {
        assert!(*w > 0.5, "weight {w} did not move toward the hard environment");
    }
}

#[test]
fn test_periodic_eval_reports_to_sink() {
    let dir = TempDir::new().unwrap();
    let sink = RecordingSink::default();
    let config = TrainConfig { eval_every_n: 2, ..sgd_config(4, 10) };
    let mut trainer = Trainer::new(
        config,
        Box::new(LeastSquaresModel::new(2, 0)),
        source(2),
        dir.path(),
    )
    .unwrap()
    .with_sink(Box::new(sink.clone()))
    .with_eval_split("val", vec![two_env_batch(2)]);

    trainer.run().unwrap();
    assert_eq!(trainer.last_step(), 4);

    // report_every_n = 1: every completed step is reported
    assert_eq!(*sink.steps.borrow(), vec![1, 2, 3, 4]);
    // Two eval rounds over four steps
    let evals = sink.evals.borrow();
    assert_eq!(evals.len(), 2);
    assert!(evals.iter().all(|(_, split)| split == "val"));
}
