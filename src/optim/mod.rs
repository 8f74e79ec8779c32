//! Optimizers, learning-rate schedulers, and their configuration-driven factory

mod adamw;
mod build;
mod clip;
mod optimizer;
mod scheduler;
mod sgd;

pub use adamw::AdamW;
pub use build::{
    build_optimizer, build_scheduler, build_training_pair, OptimizerConfig, OptimizerKind,
    SchedulerConfig, SchedulerKind,
};
pub use clip::clip_grad_norm;
pub use optimizer::{AdamWGroupState, Optimizer, OptimizerState, ParamGroup, SgdGroupState};
pub use scheduler::{LRScheduler, LinearWarmupLR, NoOpLR, WarmupCosineDecayLR};
pub use sgd::SGD;
