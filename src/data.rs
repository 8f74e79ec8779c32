//! Per-environment training batches
//!
//! Dataset loading and batching live outside the core; the loop only consumes
//! batches through the blocking [`BatchSource`] seam.

use crate::tensor::Tensor;

/// Examples drawn from one training environment (domain)
#[derive(Clone, Debug)]
pub struct EnvExamples {
    /// Environment identifier (used in logs)
    pub env: String,
    pub inputs: Tensor,
    pub targets: Tensor,
}

impl EnvExamples {
    pub fn new(env: impl Into<String>, inputs: Tensor, targets: Tensor) -> Self {
        Self { env: env.into(), inputs, targets }
    }
}

/// One training batch: examples from every environment seen this step
#[derive(Clone, Debug)]
pub struct Batch {
    pub envs: Vec<EnvExamples>,
}

impl Batch {
    pub fn new(envs: Vec<EnvExamples>) -> Self {
        Self { envs }
    }

    /// Number of environments represented in this batch
    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envs.is_empty()
    }
}

/// Blocking batch provider. Prefetching may happen behind this seam; the
/// loop treats retrieval as synchronous.
pub trait BatchSource {
    /// Produce the next training batch. Infinite sources cycle.
    fn next_batch(&mut self) -> Batch;
}

/// A source that cycles over a fixed set of in-memory batches
pub struct InMemorySource {
    batches: Vec<Batch>,
    cursor: usize,
}

impl InMemorySource {
    /// Create a cycling source. Panics if `batches` is empty.
    pub fn new(batches: Vec<Batch>) -> Self {
        assert!(!batches.is_empty(), "InMemorySource needs at least one batch");
        Self { batches, cursor: 0 }
    }
}

impl BatchSource for InMemorySource {
    fn next_batch(&mut self) -> Batch {
        let batch = self.batches[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.batches.len();
        batch
    }
}
