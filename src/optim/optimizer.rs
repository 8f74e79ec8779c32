//! Optimizer trait and parameter groups

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tensor::{Device, Tensor};

/// A named, ordered collection of parameters sharing one learning rate.
///
/// Two groups exist in dual-optimizer ("bert") mode, one otherwise. The
/// tensors are shared handles into the model; the group adds per-group
/// learning-rate state on top.
#[derive(Clone, Debug)]
pub struct ParamGroup {
    pub name: String,
    pub params: Vec<Tensor>,
    pub lr: f32,
}

impl ParamGroup {
    pub fn new(name: impl Into<String>, params: Vec<Tensor>, lr: f32) -> Self {
        Self { name: name.into(), params, lr }
    }

    /// Number of parameter tensors in this group
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Trait for group-aware optimization algorithms.
///
/// Instances own their per-parameter state exclusively and are replaced
/// wholesale (never partially mutated) on reset or recovery; a freshly built
/// optimizer always starts with empty accumulator buffers.
pub trait Optimizer {
    /// Apply one update to every parameter that has a gradient
    fn step(&mut self);

    /// Drop all gradient buffers
    fn zero_grad(&mut self);

    fn param_groups(&self) -> &[ParamGroup];

    fn param_groups_mut(&mut self) -> &mut [ParamGroup];

    /// Per-group learning rates, in group order
    fn lrs(&self) -> Vec<f32> {
        self.param_groups().iter().map(|g| g.lr).collect()
    }

    /// Snapshot accumulated state for checkpointing
    fn state(&self) -> OptimizerState;

    /// Restore accumulated state from a checkpoint snapshot.
    ///
    /// Fails with [`Error::Checkpoint`] if the snapshot was produced by a
    /// different optimizer kind or group layout.
    fn load_state(&mut self, state: &OptimizerState) -> Result<()>;

    /// Relocate all accumulated state to the given placement as a unit
    fn to_device(&mut self, device: Device);

    /// Current placement of the accumulated state
    fn device(&self) -> Device;
}

/// Serialized SGD group: learning rate plus per-parameter velocity buffers
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SgdGroupState {
    pub name: String,
    pub lr: f32,
    pub velocities: Vec<Option<Vec<f32>>>,
}

/// Serialized AdamW group: learning rate plus per-parameter moment buffers
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdamWGroupState {
    pub name: String,
    pub lr: f32,
    pub first_moments: Vec<Option<Vec<f32>>>,
    pub second_moments: Vec<Option<Vec<f32>>>,
}

/// Snapshot of an optimizer's accumulated state, tagged by kind
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerState {
    Sgd {
        momentum: f32,
        groups: Vec<SgdGroupState>,
    },
    AdamW {
        step_count: u64,
        groups: Vec<AdamWGroupState>,
    },
}

impl OptimizerState {
    /// Group names recorded in this snapshot, in order
    pub fn group_names(&self) -> Vec<&str> {
        match self {
            OptimizerState::Sgd { groups, .. } => {
                groups.iter().map(|g| g.name.as_str()).collect()
            }
            OptimizerState::AdamW { groups, .. } => {
                groups.iter().map(|g| g.name.as_str()).collect()
            }
        }
    }
}

/// Check that a snapshot's group layout matches the live groups
pub(super) fn check_group_layout(live: &[ParamGroup], names: &[&str]) -> Result<()> {
    if live.len() != names.len() {
        return Err(Error::Checkpoint(format!(
            "snapshot has {} parameter groups, optimizer has {}",
            names.len(),
            live.len()
        )));
    }
    for (group, name) in live.iter().zip(names) {
        if group.name != *name {
            return Err(Error::Checkpoint(format!(
                "snapshot group '{}' does not match optimizer group '{}'",
                name, group.name
            )));
        }
    }
    Ok(())
}
