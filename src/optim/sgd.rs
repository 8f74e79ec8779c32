//! Stochastic Gradient Descent over parameter groups

use ndarray::Array1;

use super::optimizer::{check_group_layout, Optimizer, OptimizerState, ParamGroup, SgdGroupState};
use crate::error::{Error, Result};
use crate::tensor::Device;

/// SGD with optional momentum, applied per parameter group
pub struct SGD {
    groups: Vec<ParamGroup>,
    momentum: f32,
    /// Velocity buffers, indexed [group][param]; lazily initialized
    velocities: Vec<Vec<Option<Array1<f32>>>>,
    device: Device,
}

impl SGD {
    /// Create a new SGD optimizer with fresh (empty) velocity buffers
    pub fn new(groups: Vec<ParamGroup>, momentum: f32) -> Self {
        let velocities = groups.iter().map(|g| vec![None; g.len()]).collect();
        Self { groups, momentum, velocities, device: Device::Host }
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }

    /// True if no velocity buffer has been populated yet
    pub fn state_is_fresh(&self) -> bool {
        self.velocities.iter().flatten().all(Option::is_none)
    }
}

impl Optimizer for SGD {
    fn step(&mut self) {
        for (group, group_vel) in self.groups.iter().zip(&mut self.velocities) {
            let lr = group.lr;
            for (param, velocity) in group.params.iter().zip(group_vel.iter_mut()) {
                let Some(grad) = param.grad() else { continue };

                if self.momentum > 0.0 {
                    // v = momentum * v - lr * grad
                    let v = match velocity.take() {
                        Some(v) => v * self.momentum - &grad * lr,
                        None => &grad * (-lr),
                    };
                    let mut data = param.data_mut();
                    *data = &*data + &v;
                    *velocity = Some(v);
                } else {
                    let mut data = param.data_mut();
                    *data = &*data - &(&grad * lr);
                }
            }
        }
    }

    fn zero_grad(&mut self) {
        for group in &self.groups {
            for param in &group.params {
                param.zero_grad();
            }
        }
    }

    fn param_groups(&self) -> &[ParamGroup] {
        &self.groups
    }

    fn param_groups_mut(&mut self) -> &mut [ParamGroup] {
        &mut self.groups
    }

    fn state(&self) -> OptimizerState {
        OptimizerState::Sgd {
            momentum: self.momentum,
            groups: self
                .groups
                .iter()
                .zip(&self.velocities)
                .map(|(group, vel)| SgdGroupState {
                    name: group.name.clone(),
                    lr: group.lr,
                    velocities: vel.iter().map(|v| v.as_ref().map(|a| a.to_vec())).collect(),
                })
                .collect(),
        }
    }

    fn load_state(&mut self, state: &OptimizerState) -> Result<()> {
        let OptimizerState::Sgd { momentum, groups } = state else {
            return Err(Error::Checkpoint("snapshot is not SGD state".into()));
        };
        check_group_layout(&self.groups, &state.group_names())?;

        self.momentum = *momentum;
        for (i, group_state) in groups.iter().enumerate() {
            if group_state.velocities.len() != self.groups[i].len() {
                return Err(Error::Checkpoint(format!(
                    "group '{}' has {} parameters, snapshot has {}",
                    group_state.name,
                    self.groups[i].len(),
                    group_state.velocities.len()
                )));
            }
            self.groups[i].lr = group_state.lr;
            self.velocities[i] = group_state
                .velocities
                .iter()
                .map(|v| v.as_ref().map(|data| Array1::from_vec(data.clone())))
                .collect();
        }
        Ok(())
    }

    fn to_device(&mut self, device: Device) {
        self.device = device;
    }

    fn device(&self) -> Device {
        self.device
    }
}
