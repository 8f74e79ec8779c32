//! Training loop configuration

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::optim::{OptimizerConfig, SchedulerConfig};

/// Top-level training configuration, typically loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Total number of training steps to run
    pub max_steps: u64,

    /// Number of mean-risk steps before switching to the robust objective
    #[serde(default = "default_burnin_iters")]
    pub burnin_iters: u64,

    /// Quantile of the per-environment losses minimized in the robust phase
    #[serde(default = "default_quantile")]
    pub quantile: f32,

    /// Report training metrics every this many steps
    #[serde(default = "default_every_n")]
    pub report_every_n: u64,

    /// Evaluate held-out splits every this many steps
    #[serde(default = "default_every_n")]
    pub eval_every_n: u64,

    /// Dual-optimizer mode: separate parameter group and learning rate for
    /// the pretrained encoder
    #[serde(default)]
    pub use_bert_training: bool,

    /// Per-group gradient norm clipping threshold (dual-optimizer mode only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_grad: Option<f32>,

    #[serde(default)]
    pub optimizer: OptimizerConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lr_scheduler: Option<SchedulerConfig>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            max_steps: 10_000,
            burnin_iters: default_burnin_iters(),
            quantile: default_quantile(),
            report_every_n: default_every_n(),
            eval_every_n: default_every_n(),
            use_bert_training: false,
            clip_grad: None,
            optimizer: OptimizerConfig::default(),
            lr_scheduler: None,
        }
    }
}

fn default_burnin_iters() -> u64 {
    2500
}

fn default_quantile() -> f32 {
    0.75
}

fn default_every_n() -> u64 {
    100
}

impl TrainConfig {
    /// Parse and validate a configuration from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges. Called at trainer construction.
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(Error::Config("max_steps must be positive".into()));
        }
        if !(self.quantile > 0.0 && self.quantile <= 1.0) {
            return Err(Error::Config(format!(
                "quantile must be in (0, 1], got {}",
                self.quantile
            )));
        }
        if self.report_every_n == 0 || self.eval_every_n == 0 {
            return Err(Error::Config("reporting intervals must be positive".into()));
        }
        if let Some(max_norm) = self.clip_grad {
            if max_norm <= 0.0 {
                return Err(Error::Config(format!(
                    "clip_grad must be positive, got {max_norm}"
                )));
            }
        }
        Ok(())
    }
}
