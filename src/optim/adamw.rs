//! AdamW optimizer (Adam with decoupled weight decay) over parameter groups

use ndarray::Array1;

use super::optimizer::{
    check_group_layout, AdamWGroupState, Optimizer, OptimizerState, ParamGroup,
};
use crate::error::{Error, Result};
use crate::tensor::Device;

/// AdamW optimizer
///
/// Applies weight decay directly to the parameters instead of folding it into
/// the gradient:
///
/// θ_t = (1 - lr * λ) * θ_{t-1} - lr_t * m_t / (√v_t + ε)
pub struct AdamW {
    groups: Vec<ParamGroup>,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    weight_decay: f32,
    t: u64,
    /// Moment buffers, indexed [group][param]; lazily initialized
    m: Vec<Vec<Option<Array1<f32>>>>,
    v: Vec<Vec<Option<Array1<f32>>>>,
    device: Device,
}

impl AdamW {
    /// Create a new AdamW optimizer with fresh (empty) moment buffers
    pub fn new(
        groups: Vec<ParamGroup>,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
        weight_decay: f32,
    ) -> Self {
        let m = groups.iter().map(|g| vec![None; g.len()]).collect();
        let v = groups.iter().map(|g| vec![None; g.len()]).collect();
        Self { groups, beta1, beta2, epsilon, weight_decay, t: 0, m, v, device: Device::Host }
    }

    /// Create AdamW over groups with default hyperparameters (λ = 0.01)
    pub fn default_params(groups: Vec<ParamGroup>) -> Self {
        Self::new(groups, 0.9, 0.999, 1e-8, 0.01)
    }

    pub fn beta1(&self) -> f32 {
        self.beta1
    }

    pub fn beta2(&self) -> f32 {
        self.beta2
    }

    pub fn weight_decay(&self) -> f32 {
        self.weight_decay
    }

    /// Optimizer step counter (bias correction)
    pub fn step_count(&self) -> u64 {
        self.t
    }

    /// True if no moment buffer has been populated yet
    pub fn state_is_fresh(&self) -> bool {
        self.t == 0 && self.m.iter().flatten().all(Option::is_none)
    }
}

impl Optimizer for AdamW {
    fn step(&mut self) {
        self.t += 1;

        // Bias correction folded into the step size
        let correction = (1.0 - self.beta2.powi(self.t as i32)).sqrt()
            / (1.0 - self.beta1.powi(self.t as i32));

        for ((group, group_m), group_v) in
            self.groups.iter().zip(&mut self.m).zip(&mut self.v)
        {
            let lr = group.lr;
            let lr_t = lr * correction;

            for ((param, m_slot), v_slot) in
                group.params.iter().zip(group_m.iter_mut()).zip(group_v.iter_mut())
            {
                let Some(grad) = param.grad() else { continue };

                // m_t = β1 * m_{t-1} + (1 - β1) * g
                let m_t = match m_slot.take() {
                    Some(m) => m * self.beta1 + &grad * (1.0 - self.beta1),
                    None => &grad * (1.0 - self.beta1),
                };

                // v_t = β2 * v_{t-1} + (1 - β2) * g²
                let grad_sq = &grad * &grad;
                let v_t = match v_slot.take() {
                    Some(v) => v * self.beta2 + &grad_sq * (1.0 - self.beta2),
                    None => &grad_sq * (1.0 - self.beta2),
                };

                let adaptive = &m_t / &(v_t.mapv(f32::sqrt) + self.epsilon) * lr_t;
                let decay_factor = 1.0 - lr * self.weight_decay;

                let mut data = param.data_mut();
                *data = &*data * decay_factor - &adaptive;

                *m_slot = Some(m_t);
                *v_slot = Some(v_t);
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
        OptimizerState::AdamW {
            step_count: self.t,
            groups: self
                .groups
                .iter()
                .zip(&self.m)
                .zip(&self.v)
                .map(|((group, m), v)| AdamWGroupState {
                    name: group.name.clone(),
                    lr: group.lr,
                    first_moments: m.iter().map(|b| b.as_ref().map(|a| a.to_vec())).collect(),
                    second_moments: v.iter().map(|b| b.as_ref().map(|a| a.to_vec())).collect(),
                })
                .collect(),
        }
    }

    fn load_state(&mut self, state: &OptimizerState) -> Result<()> {
        let OptimizerState::AdamW { step_count, groups } = state else {
            return Err(Error::Checkpoint("snapshot is not AdamW state".into()));
        };
        check_group_layout(&self.groups, &state.group_names())?;

        self.t = *step_count;
        for (i, group_state) in groups.iter().enumerate() {
            if group_state.first_moments.len() != self.groups[i].len() {
                return Err(Error::Checkpoint(format!(
                    "group '{}' has {} parameters, snapshot has {}",
                    group_state.name,
                    self.groups[i].len(),
                    group_state.first_moments.len()
                )));
            }
            self.groups[i].lr = group_state.lr;
            self.m[i] = group_state
                .first_moments
                .iter()
                .map(|b| b.as_ref().map(|data| Array1::from_vec(data.clone())))
                .collect();
            self.v[i] = group_state
                .second_moments
                .iter()
                .map(|b| b.as_ref().map(|data| Array1::from_vec(data.clone())))
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
