//! Configuration-driven optimizer/scheduler construction
//!
//! Construction is a tagged-union dispatch over a fixed set of known
//! variants. The factory is invoked at training start and again, with the
//! same configuration, on every reset or recovery event: the same config and
//! equivalent parameter groups always reconstruct an equivalent fresh
//! optimizer/scheduler pair.

use serde::{Deserialize, Serialize};

use super::adamw::AdamW;
use super::optimizer::{Optimizer, ParamGroup};
use super::scheduler::{LRScheduler, LinearWarmupLR, NoOpLR, WarmupCosineDecayLR};
use super::sgd::SGD;
use crate::error::{Error, Result};
use crate::model::Model;
use crate::partition::partition_parameters;

/// Known optimizer variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Sgd,
    AdamW,
}

/// Optimizer configuration block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Optimizer variant tag
    pub name: OptimizerKind,

    /// Learning rate for the non-bert group (and the bert group when
    /// `bert_lr` is unset)
    pub lr: f32,

    /// Separate learning rate for the bert group in dual-optimizer mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bert_lr: Option<f32>,

    /// SGD momentum
    #[serde(default)]
    pub momentum: f32,

    #[serde(default = "default_beta1")]
    pub beta1: f32,

    #[serde(default = "default_beta2")]
    pub beta2: f32,

    #[serde(default = "default_epsilon")]
    pub epsilon: f32,

    #[serde(default)]
    pub weight_decay: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            name: OptimizerKind::AdamW,
            lr: 1e-3,
            bert_lr: None,
            momentum: 0.0,
            beta1: default_beta1(),
            beta2: default_beta2(),
            epsilon: default_epsilon(),
            weight_decay: 0.0,
        }
    }
}

fn default_beta1() -> f32 {
    0.9
}

fn default_beta2() -> f32 {
    0.999
}

fn default_epsilon() -> f32 {
    1e-8
}

/// Known scheduler variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    Noop,
    LinearWarmup,
    WarmupCosineDecay,
}

/// Scheduler configuration block (optional; absent means no-op)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Scheduler variant tag
    pub name: SchedulerKind,

    #[serde(default)]
    pub num_warmup_steps: u64,

    /// Total schedule length (warmup + decay), for decaying variants
    #[serde(default)]
    pub total_steps: u64,

    #[serde(default)]
    pub min_lr: f32,
}

/// Build an optimizer over the given parameter groups.
///
/// Fresh state: a built optimizer never carries momentum from a previous
/// instance.
pub fn build_optimizer(
    config: &OptimizerConfig,
    groups: Vec<ParamGroup>,
) -> Result<Box<dyn Optimizer>> {
    if config.lr <= 0.0 {
        return Err(Error::Config(format!("learning rate must be positive, got {}", config.lr)));
    }
    if let Some(bert_lr) = config.bert_lr {
        if bert_lr <= 0.0 {
            return Err(Error::Config(format!(
                "bert learning rate must be positive, got {bert_lr}"
            )));
        }
    }

    Ok(match config.name {
        OptimizerKind::Sgd => Box::new(SGD::new(groups, config.momentum)),
        OptimizerKind::AdamW => Box::new(AdamW::new(
            groups,
            config.beta1,
            config.beta2,
            config.epsilon,
            config.weight_decay,
        )),
    })
}

/// Build a scheduler parameterized over the groups' base learning rates.
///
/// No configuration means [`NoOpLR`]: it reports no rate change and callers
/// read per-group rates from the optimizer instead.
pub fn build_scheduler(
    config: Option<&SchedulerConfig>,
    base_lrs: &[f32],
) -> Box<dyn LRScheduler> {
    let Some(config) = config else {
        return Box::new(NoOpLR);
    };
    match config.name {
        SchedulerKind::Noop => Box::new(NoOpLR),
        SchedulerKind::LinearWarmup => {
            Box::new(LinearWarmupLR::new(base_lrs.to_vec(), config.num_warmup_steps))
        }
        SchedulerKind::WarmupCosineDecay => Box::new(WarmupCosineDecayLR::new(
            base_lrs.to_vec(),
            config.min_lr,
            config.num_warmup_steps,
            config.total_steps,
        )),
    }
}

/// Build the optimizer/scheduler pair for the model's current live
/// parameters.
///
/// In dual-optimizer mode the parameters are re-partitioned into a non-bert
/// group at `lr` and a bert group at `bert_lr`; otherwise a single non-bert
/// group is used. Called at startup and on every reset/recovery event.
pub fn build_training_pair(
    optimizer_config: &OptimizerConfig,
    scheduler_config: Option<&SchedulerConfig>,
    model: &dyn Model,
    use_bert_training: bool,
) -> Result<(Box<dyn Optimizer>, Box<dyn LRScheduler>)> {
    let groups = if use_bert_training {
        let partition = partition_parameters(model)?;
        vec![
            ParamGroup::new("non_bert", partition.non_bert, optimizer_config.lr),
            ParamGroup::new(
                "bert",
                partition.bert,
                optimizer_config.bert_lr.unwrap_or(optimizer_config.lr),
            ),
        ]
    } else {
        vec![ParamGroup::new(
            "non_bert",
            model.non_bert_parameters(),
            optimizer_config.lr,
        )]
    };

    let optimizer = build_optimizer(optimizer_config, groups)?;
    let base_lrs = optimizer.lrs();
    let scheduler = build_scheduler(scheduler_config, &base_lrs);
    Ok((optimizer, scheduler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LeastSquaresModel;
    use crate::optim::OptimizerState;
    use approx::assert_abs_diff_eq;

    fn sgd_config(lr: f32) -> OptimizerConfig {
        OptimizerConfig { name: OptimizerKind::Sgd, lr, momentum: 0.9, ..Default::default() }
    }

    #[test]
    fn test_build_optimizer_rejects_bad_lr() {
        let config = OptimizerConfig { lr: 0.0, ..Default::default() };
        assert!(matches!(build_optimizer(&config, vec![]), Err(Error::Config(_))));
    }

    #[test]
    fn test_factory_is_idempotent() {
        let model = LeastSquaresModel::new(8, 4);
        let config = OptimizerConfig {
            name: OptimizerKind::AdamW,
            lr: 1e-3,
            bert_lr: Some(1e-5),
            ..Default::default()
        };

        let (first, _) = build_training_pair(&config, None, &model, true).unwrap();
        let (second, _) = build_training_pair(&config, None, &model, true).unwrap();

        // Identical hyperparameters, fresh state both times
        assert_eq!(first.lrs(), second.lrs());
        let fresh = |state: &OptimizerState| match state {
            OptimizerState::AdamW { step_count, groups } => {
                *step_count == 0
                    && groups.iter().all(|g| g.first_moments.iter().all(Option::is_none))
            }
            OptimizerState::Sgd { .. } => false,
        };
        assert!(fresh(&first.state()));
        assert!(fresh(&second.state()));
    }

    #[test]
    fn test_dual_mode_group_wiring() {
        let model = LeastSquaresModel::new(8, 4);
        let config = OptimizerConfig {
            bert_lr: Some(2e-5),
            lr: 1e-3,
            ..sgd_config(1e-3)
        };

        let (optimizer, _) = build_training_pair(&config, None, &model, true).unwrap();
        let groups = optimizer.param_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "non_bert");
        assert_eq!(groups[1].name, "bert");
        assert_abs_diff_eq!(groups[0].lr, 1e-3);
        assert_abs_diff_eq!(groups[1].lr, 2e-5);
    }

    #[test]
    fn test_dual_mode_requires_bert_params() {
        let model = LeastSquaresModel::new(8, 0);
        let config = sgd_config(1e-3);
        assert!(matches!(
            build_training_pair(&config, None, &model, true),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_single_mode_uses_one_group() {
        let model = LeastSquaresModel::new(8, 4);
        let (optimizer, _) =
            build_training_pair(&sgd_config(1e-2), None, &model, false).unwrap();
        let groups = optimizer.param_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "non_bert");
    }

    #[test]
    fn test_missing_scheduler_config_is_noop() {
        let mut scheduler = build_scheduler(None, &[0.1]);
        let mut groups = vec![ParamGroup::new("non_bert", vec![], 0.1)];
        assert!(scheduler.update_lr(123, &mut groups).is_none());
    }

    #[test]
    fn test_scheduler_variants_dispatch() {
        let warmup = SchedulerConfig {
            name: SchedulerKind::LinearWarmup,
            num_warmup_steps: 10,
            total_steps: 0,
            min_lr: 0.0,
        };
        let mut scheduler = build_scheduler(Some(&warmup), &[1.0]);
        let mut groups = vec![ParamGroup::new("non_bert", vec![], 1.0)];
        let lrs = scheduler.update_lr(5, &mut groups).unwrap();
        assert_abs_diff_eq!(lrs[0], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_config_deserializes_from_yaml() {
        let yaml = r"
name: adamw
lr: 0.001
bert_lr: 0.00001
weight_decay: 0.01
";
        let config: OptimizerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.name, OptimizerKind::AdamW);
        assert_abs_diff_eq!(config.lr, 0.001);
        assert_abs_diff_eq!(config.bert_lr.unwrap(), 1e-5);
        assert_abs_diff_eq!(config.beta1, 0.9);
    }

    #[test]
    fn test_scheduler_config_deserializes() {
        let yaml = r"
name: warmup_cosine_decay
num_warmup_steps: 100
total_steps: 10000
";
        let config: SchedulerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.name, SchedulerKind::WarmupCosineDecay);
        assert_eq!(config.num_warmup_steps, 100);
        assert_abs_diff_eq!(config.min_lr, 0.0);
    }
}
