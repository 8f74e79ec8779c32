//! One guarded loop iteration: periodic eval plus the training step

use super::core::Trainer;
use crate::error::StepFailure;
use crate::optim::clip_grad_norm;

impl Trainer {
    /// Run one iteration of the loop body. Everything in here may report
    /// resource exhaustion, which the outer loop recovers from before
    /// retrying the same step.
    pub(super) fn guarded_iteration(&mut self) -> Result<(), StepFailure> {
        let step = self.last_step + 1;
        if step % self.config.eval_every_n == 0 {
            self.evaluate()?;
        }
        self.train_step()
    }

    fn train_step(&mut self) -> Result<(), StepFailure> {
        let step = self.last_step;
        let batch = self.source.next_batch();

        let (output, reset_opt) = self.engine.train(self.model.as_mut(), &batch, step)?;
        if reset_opt {
            self.rebuild_optimizer()?;
        }

        if self.config.use_bert_training {
            if let Some(max_norm) = self.config.clip_grad {
                for group in self.optimizer.param_groups() {
                    clip_grad_norm(&group.params, max_norm);
                }
            }
        }

        self.optimizer.zero_grad();
        self.model.backward(&output.weights)?;
        self.optimizer.step();

        let scheduled = self.scheduler.update_lr(step, self.optimizer.param_groups_mut());
        let lrs = scheduled.unwrap_or_else(|| self.optimizer.lrs());

        let completed = step + 1;
        if completed % self.config.report_every_n == 0 {
            self.sink.log_step(completed, output.loss, &lrs);
        }
        Ok(())
    }

    /// Evaluate every attached held-out split. Forward passes only; no
    /// gradients are produced.
    fn evaluate(&mut self) -> Result<(), StepFailure> {
        for split in &self.eval_splits {
            let mut total = 0.0;
            let mut count = 0usize;
            for batch in &split.batches {
                let env_losses = self.model.forward(batch)?;
                total += env_losses.iter().sum::<f32>();
                count += env_losses.len();
            }
            if count > 0 {
                self.sink.log_eval(self.last_step, &split.name, total / count as f32);
            }
        }
        Ok(())
    }
}
