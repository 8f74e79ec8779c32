//! Training metrics reporting

/// Where per-step and per-eval numbers go
pub trait MetricsSink {
    fn log_step(&mut self, step: u64, loss: f32, lrs: &[f32]);
    fn log_eval(&mut self, step: u64, split: &str, loss: f32);
}

/// Discards everything
pub struct NullSink;

impl MetricsSink for NullSink {
    fn log_step(&mut self, _step: u64, _loss: f32, _lrs: &[f32]) {}
    fn log_eval(&mut self, _step: u64, _split: &str, _loss: f32) {}
}

/// Emits structured log events
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn log_step(&mut self, step: u64, loss: f32, lrs: &[f32]) {
        tracing::info!(step, loss, ?lrs, "train step");
    }

    fn log_eval(&mut self, step: u64, split: &str, loss: f32) {
        tracing::info!(step, split, loss, "eval");
    }
}
