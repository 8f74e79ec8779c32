//! Learning rate schedulers over parameter groups
//!
//! Schedulers are pure functions of the elapsed step count: they carry their
//! base rates but no evolving state, so a rebuilt scheduler resumed at step
//! `s` produces the same rates as one that ran from the start.

use std::f32::consts::PI;

use super::optimizer::ParamGroup;

/// Learning rate scheduler trait.
///
/// `update_lr` returns the new per-group rates after writing them into the
/// groups, or `None` if this scheduler never changes rates — in that case
/// callers read the optimizer's own per-group learning rates instead.
pub trait LRScheduler {
    fn update_lr(&mut self, step: u64, groups: &mut [ParamGroup]) -> Option<Vec<f32>>;
}

/// The do-nothing scheduler, used when no scheduler is configured
pub struct NoOpLR;

impl LRScheduler for NoOpLR {
    fn update_lr(&mut self, _step: u64, _groups: &mut [ParamGroup]) -> Option<Vec<f32>> {
        None
    }
}

/// Linear warmup from 0 to each group's base rate over `warmup_steps`,
/// holding the base rate afterwards
pub struct LinearWarmupLR {
    base_lrs: Vec<f32>,
    warmup_steps: u64,
}

impl LinearWarmupLR {
    pub fn new(base_lrs: Vec<f32>, warmup_steps: u64) -> Self {
        Self { base_lrs, warmup_steps }
    }

    fn factor(&self, step: u64) -> f32 {
        if self.warmup_steps == 0 {
            return 1.0;
        }
        (step as f32 / self.warmup_steps as f32).min(1.0)
    }
}

impl LRScheduler for LinearWarmupLR {
    fn update_lr(&mut self, step: u64, groups: &mut [ParamGroup]) -> Option<Vec<f32>> {
        let factor = self.factor(step);
        let lrs: Vec<f32> = self.base_lrs.iter().map(|base| base * factor).collect();
        for (group, lr) in groups.iter_mut().zip(&lrs) {
            group.lr = *lr;
        }
        Some(lrs)
    }
}

/// Linear warmup to each group's base rate, then cosine decay to `min_lr`
/// over the remaining steps
pub struct WarmupCosineDecayLR {
    base_lrs: Vec<f32>,
    min_lr: f32,
    warmup_steps: u64,
    total_steps: u64,
}

impl WarmupCosineDecayLR {
    pub fn new(base_lrs: Vec<f32>, min_lr: f32, warmup_steps: u64, total_steps: u64) -> Self {
        Self { base_lrs, min_lr, warmup_steps, total_steps }
    }

    fn rate_for(&self, base: f32, step: u64) -> f32 {
        if step < self.warmup_steps {
            if self.warmup_steps == 0 {
                return base;
            }
            return base * (step as f32 / self.warmup_steps as f32);
        }

        let decay_steps = self.total_steps.saturating_sub(self.warmup_steps);
        if decay_steps == 0 {
            return self.min_lr;
        }
        let decay_step = step - self.warmup_steps;
        if decay_step >= decay_steps {
            return self.min_lr;
        }

        let progress = decay_step as f32 / decay_steps as f32;
        let cosine_decay = 0.5 * (1.0 + (PI * progress).cos());
        self.min_lr + (base - self.min_lr) * cosine_decay
    }
}

impl LRScheduler for WarmupCosineDecayLR {
    fn update_lr(&mut self, step: u64, groups: &mut [ParamGroup]) -> Option<Vec<f32>> {
        let lrs: Vec<f32> = self.base_lrs.iter().map(|base| self.rate_for(*base, step)).collect();
        for (group, lr) in groups.iter_mut().zip(&lrs) {
            group.lr = *lr;
        }
        Some(lrs)
    }
}
