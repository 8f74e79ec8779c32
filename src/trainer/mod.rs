//! Training loop orchestration
//!
//! [`Trainer`] owns the mutable training state (model, optimizer, scheduler,
//! risk engine, step counter) and drives it single-threaded: construct or
//! restore, then step until done. Each loop iteration runs inside a guard
//! that turns transient resource exhaustion into an in-place recovery
//! (emergency checkpoint, host eviction, rebuild, retry of the same step)
//! while everything else terminates the run.

mod config;
mod core;
mod recovery;
mod step;

pub use config::TrainConfig;
pub use core::Trainer;
