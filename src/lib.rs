//! Domain-robust training control loop
//!
//! `robusto` trains a model under a quantile-risk-minimization objective
//! across environments. The model's forward/backward graph, data loading and
//! experiment logging are consumed collaborators; what lives here is the
//! stateful orchestration around them:
//!
//! - Parameter partitioning into pretrained-encoder ("bert") and task groups
//! - Optimizer/scheduler construction from configuration, rebuilt wholesale
//!   whenever the risk objective changes phase
//! - A burn-in → robust step engine with a one-shot optimizer-reset signal
//! - A training loop that survives resource exhaustion mid-step by evicting
//!   state to host memory and retrying the same step
//! - Step-keyed checkpoints that make interrupted runs resumable
//!
//! # Example
//!
//! ```no_run
//! use robusto::data::{Batch, EnvExamples, InMemorySource};
//! use robusto::model::LeastSquaresModel;
//! use robusto::tensor::Tensor;
//! use robusto::trainer::{TrainConfig, Trainer};
//!
//! let config = TrainConfig {
//!     max_steps: 100,
//!     burnin_iters: 20,
//!     ..TrainConfig::default()
//! };
//!
//! let model = LeastSquaresModel::new(8, 0);
//! let batch = Batch::new(vec![
//!     EnvExamples::new("env_a", Tensor::from_vec(vec![1.0; 8], false),
//!                      Tensor::from_vec(vec![0.5; 8], false)),
//!     EnvExamples::new("env_b", Tensor::from_vec(vec![2.0; 8], false),
//!                      Tensor::from_vec(vec![1.0; 8], false)),
//! ]);
//! let source = InMemorySource::new(vec![batch]);
//!
//! let mut trainer = Trainer::new(
//!     config,
//!     Box::new(model),
//!     Box::new(source),
//!     "./checkpoints",
//! )?;
//! trainer.run()?;
//! # Ok::<(), robusto::Error>(())
//! ```

pub mod checkpoint;
pub mod data;
mod error;
pub mod metrics;
pub mod model;
pub mod optim;
pub mod partition;
pub mod risk;
pub mod tensor;
pub mod trainer;

pub use checkpoint::{Checkpoint, CheckpointStore, EMERGENCY_STEP};
pub use data::{Batch, BatchSource, EnvExamples, InMemorySource};
pub use error::{Error, ResourceExhausted, Result, StepFailure, StepResult};
pub use metrics::{MetricsSink, NullSink, TracingSink};
pub use model::{LeastSquaresModel, Model, ModelState};
pub use optim::{
    build_optimizer, build_scheduler, build_training_pair, clip_grad_norm, AdamW, LRScheduler,
    LinearWarmupLR, NoOpLR, Optimizer, OptimizerConfig, OptimizerKind, OptimizerState, ParamGroup,
    SchedulerConfig, SchedulerKind, WarmupCosineDecayLR, SGD,
};
pub use partition::{partition_parameters, ParameterPartition};
pub use risk::{Phase, QuantileRiskEngine, RiskEngineState, StepOutput};
pub use tensor::{Device, Tensor};
pub use trainer::{TrainConfig, Trainer};
