//! Trainer construction, restore, and the outer loop

use std::path::PathBuf;

use super::config::TrainConfig;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::data::{Batch, BatchSource};
use crate::error::{Result, StepFailure};
use crate::metrics::{MetricsSink, NullSink};
use crate::model::Model;
use crate::optim::{build_training_pair, LRScheduler, Optimizer};
use crate::risk::QuantileRiskEngine;
use crate::tensor::Device;

/// A named held-out split (e.g. "train_eval", "val") evaluated periodically
/// during training
pub(super) struct EvalSplit {
    pub(super) name: String,
    pub(super) batches: Vec<Batch>,
}

/// The training loop orchestrator.
///
/// Owns all mutable training state and drives it from a single thread.
/// Collaborators (model, batch source, metrics sink) are boxed seams; the
/// loop never reaches around them.
pub struct Trainer {
    pub(super) config: TrainConfig,
    pub(super) model: Box<dyn Model>,
    pub(super) source: Box<dyn BatchSource>,
    pub(super) store: CheckpointStore,
    pub(super) optimizer: Box<dyn Optimizer>,
    pub(super) scheduler: Box<dyn LRScheduler>,
    pub(super) engine: QuantileRiskEngine,
    pub(super) sink: Box<dyn MetricsSink>,
    pub(super) eval_splits: Vec<EvalSplit>,
    pub(super) device: Device,
    /// Index of the last completed step; the next step to run
    pub(super) last_step: u64,
}

impl Trainer {
    /// Create a trainer, resuming from the newest checkpoint in
    /// `checkpoint_dir` when one exists.
    ///
    /// A leftover emergency snapshot from an interrupted recovery is treated
    /// as the newest checkpoint and then cleared.
    pub fn new(
        config: TrainConfig,
        mut model: Box<dyn Model>,
        source: Box<dyn BatchSource>,
        checkpoint_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        config.validate()?;
        let store = CheckpointStore::new(checkpoint_dir)?;

        let restored = store.load_latest()?;
        let last_step = restored.as_ref().map_or(0, |c| c.step);

        if let Some(checkpoint) = &restored {
            model.load_state(&checkpoint.model)?;
        }

        let (mut optimizer, scheduler) = build_training_pair(
            &config.optimizer,
            config.lr_scheduler.as_ref(),
            model.as_ref(),
            config.use_bert_training,
        )?;

        let engine = match restored {
            Some(checkpoint) => {
                optimizer.load_state(&checkpoint.optimizer)?;
                store.remove_emergency()?;
                tracing::info!(step = checkpoint.step, "resumed from checkpoint");
                QuantileRiskEngine::from_state(
                    config.quantile,
                    config.burnin_iters,
                    checkpoint.risk_engine,
                )
            }
            None => QuantileRiskEngine::new(config.quantile, config.burnin_iters),
        };

        Ok(Self {
            config,
            model,
            source,
            store,
            optimizer,
            scheduler,
            engine,
            sink: Box::new(NullSink),
            eval_splits: Vec::new(),
            device: Device::Host,
            last_step,
        })
    }

    /// Replace the metrics sink
    pub fn with_sink(mut self, sink: Box<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Attach a held-out split evaluated every `eval_every_n` steps. May be
    /// called once per split.
    pub fn with_eval_split(mut self, name: impl Into<String>, batches: Vec<Batch>) -> Self {
        self.eval_splits.push(EvalSplit { name: name.into(), batches });
        self
    }

    /// Place the model and optimizer state on the given device
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self.model.to_device(device);
        self.optimizer.to_device(device);
        self
    }

    /// Index of the last completed training step
    pub fn last_step(&self) -> u64 {
        self.last_step
    }

    pub fn engine(&self) -> &QuantileRiskEngine {
        &self.engine
    }

    /// Run training until `max_steps` steps have completed.
    ///
    /// Resource exhaustion inside an iteration triggers recovery and a retry
    /// of the same step; any other failure ends the run. A final checkpoint
    /// is written on normal completion.
    pub fn run(&mut self) -> Result<()> {
        tracing::info!(
            start = self.last_step,
            max_steps = self.config.max_steps,
            "training loop started"
        );

        while self.last_step < self.config.max_steps {
            match self.guarded_iteration() {
                Ok(()) => {
                    self.last_step += 1;
                    self.save_checkpoint()?;
                }
                Err(StepFailure::Exhausted(cause)) => {
                    tracing::warn!(step = self.last_step, %cause, "resource exhaustion, recovering");
                    self.recover()?;
                }
                Err(StepFailure::Fatal(error)) => return Err(error),
            }
        }

        self.save_checkpoint()?;
        tracing::info!(step = self.last_step, "training loop finished");
        Ok(())
    }

    pub(super) fn save_checkpoint(&self) -> Result<()> {
        self.store.save(&self.snapshot())
    }

    /// Capture the full training state as of the last completed step
    pub(super) fn snapshot(&self) -> Checkpoint {
        Checkpoint {
            step: self.last_step,
            model: self.model.state(),
            optimizer: self.optimizer.state(),
            risk_engine: self.engine.state(),
        }
    }

    /// Rebuild the optimizer/scheduler pair from configuration, with fresh
    /// state, over the model's current live parameters
    pub(super) fn rebuild_optimizer(&mut self) -> Result<()> {
        let (mut optimizer, scheduler) = build_training_pair(
            &self.config.optimizer,
            self.config.lr_scheduler.as_ref(),
            self.model.as_ref(),
            self.config.use_bert_training,
        )?;
        optimizer.to_device(self.device);
        self.optimizer = optimizer;
        self.scheduler = scheduler;
        Ok(())
    }
}
