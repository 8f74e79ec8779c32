//! Burn-in / robust risk step engine
//!
//! Training proceeds in two phases. During burn-in the objective is the mean
//! of the per-environment losses. Once the engine has been called more than
//! `burnin_iters` times it switches permanently to the robust phase, where
//! the objective is the empirical quantile of the per-environment losses and
//! the gradient flows only through the environment sitting at that quantile.
//!
//! The transition is signalled to the caller exactly once, as a one-shot
//! flag that tells the training loop to rebuild its optimizer and scheduler
//! with fresh state.

use serde::{Deserialize, Serialize};

use crate::data::Batch;
use crate::error::{ResourceExhausted, StepResult};
use crate::model::Model;

/// Smoothing factor for the diagnostic per-environment loss average
const EMA_DECAY: f32 = 0.9;

/// Which objective the engine is currently minimizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    BurnIn,
    Robust,
}

/// What one training step produced
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// The scalar objective for this step
    pub loss: f32,
    /// Raw per-environment losses, in batch order
    pub env_losses: Vec<f32>,
    /// Loss weights handed to the backward pass (sum to 1)
    pub weights: Vec<f32>,
}

/// Serializable engine state, captured into checkpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEngineState {
    pub calls: u64,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_loss_ema: Option<Vec<f32>>,
}

/// Two-phase risk minimization engine
pub struct QuantileRiskEngine {
    quantile: f32,
    burnin_iters: u64,
    calls: u64,
    phase: Phase,
    /// Smoothed per-environment losses, tracked for reporting only
    env_loss_ema: Option<Vec<f32>>,
}

impl QuantileRiskEngine {
    pub fn new(quantile: f32, burnin_iters: u64) -> Self {
        Self { quantile, burnin_iters, calls: 0, phase: Phase::BurnIn, env_loss_ema: None }
    }

    /// Resume an engine from a snapshot, keeping the configured
    /// hyperparameters
    pub fn from_state(quantile: f32, burnin_iters: u64, state: RiskEngineState) -> Self {
        Self {
            quantile,
            burnin_iters,
            calls: state.calls,
            phase: state.phase,
            env_loss_ema: state.env_loss_ema,
        }
    }

    pub fn state(&self) -> RiskEngineState {
        RiskEngineState {
            calls: self.calls,
            phase: self.phase,
            env_loss_ema: self.env_loss_ema.clone(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn env_loss_ema(&self) -> Option<&[f32]> {
        self.env_loss_ema.as_deref()
    }

    /// Run the forward pass for one step and compute the objective.
    ///
    /// Returns the step output plus a one-shot flag: `true` on exactly the
    /// call where the engine crosses from burn-in into the robust phase,
    /// telling the caller to rebuild its optimizer with fresh state. The
    /// caller is responsible for the backward pass with the returned
    /// weights.
    pub fn train(
        &mut self,
        model: &mut dyn Model,
        batch: &Batch,
        step: u64,
    ) -> StepResult<(StepOutput, bool)> {
        let env_losses = model.forward(batch)?;
        if env_losses.is_empty() {
            return Err(ResourceExhausted("batch produced no environment losses".into()));
        }

        self.calls += 1;
        let mut reset_opt = false;
        if self.phase == Phase::BurnIn && self.calls > self.burnin_iters {
            tracing::info!(step, calls = self.calls, "burn-in complete, switching to robust risk");
            self.phase = Phase::Robust;
            self.env_loss_ema = None;
            reset_opt = true;
        }

        let n = env_losses.len();
        let (loss, weights) = match self.phase {
            Phase::BurnIn => {
                let mean = env_losses.iter().sum::<f32>() / n as f32;
                (mean, vec![1.0 / n as f32; n])
            }
            Phase::Robust => {
                let idx = quantile_index(self.quantile, n);
                let mut order: Vec<usize> = (0..n).collect();
                order.sort_by(|&a, &b| {
                    env_losses[a].partial_cmp(&env_losses[b]).unwrap_or(std::cmp::Ordering::Equal)
                });
                let pivot = order[idx];
                let mut weights = vec![0.0; n];
                weights[pivot] = 1.0;
                (env_losses[pivot], weights)
            }
        };

        self.update_ema(&env_losses);

        Ok((StepOutput { loss, env_losses, weights }, reset_opt))
    }

    fn update_ema(&mut self, env_losses: &[f32]) {
        match &mut self.env_loss_ema {
            Some(ema) if ema.len() == env_losses.len() => {
                for (e, l) in ema.iter_mut().zip(env_losses) {
                    *e = EMA_DECAY * *e + (1.0 - EMA_DECAY) * l;
                }
            }
            _ => self.env_loss_ema = Some(env_losses.to_vec()),
        }
    }
}

/// Index of the empirical `q`-quantile in a sorted sample of size `n`
fn quantile_index(q: f32, n: usize) -> usize {
    let idx = (q * n as f32).ceil() as usize;
    idx.saturating_sub(1).min(n - 1)
}
