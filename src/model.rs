//! Model collaborator interface
//!
//! The forward/backward computation graph is out of scope for this crate; the
//! loop drives any type implementing [`Model`]. The trait covers exactly what
//! the orchestrator needs: parameter enumeration, the bert/non-bert split,
//! device moves, weight-state (de)serialization, and the two black-box step
//! operations (per-environment loss forward, weighted backward).

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::data::Batch;
use crate::error::{Error, ResourceExhausted, Result, StepResult};
use crate::tensor::{Device, Tensor};

/// Serialized model weights, keyed by parameter name
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModelState {
    pub tensors: Vec<(String, Vec<f32>)>,
}

/// The model as seen by the training loop
pub trait Model {
    /// All trainable parameters, in a stable order
    fn parameters(&self) -> Vec<Tensor>;

    /// Parameters belonging to the pretrained encoder ("bert") block
    fn bert_parameters(&self) -> Vec<Tensor>;

    /// All remaining trainable parameters
    fn non_bert_parameters(&self) -> Vec<Tensor>;

    /// Compute one scalar loss per environment for this batch.
    ///
    /// Implementations cache whatever the subsequent [`Model::backward`] call
    /// needs. A transient allocation failure is reported as
    /// [`ResourceExhausted`]; the loop will retry the step after recovery.
    fn forward(&mut self, batch: &Batch) -> StepResult<Vec<f32>>;

    /// Accumulate into parameter gradients the gradient of
    /// `sum_e weights[e] * env_loss[e]` for the most recent forward pass.
    fn backward(&mut self, weights: &[f32]) -> StepResult<()>;

    /// Move all parameters to the given placement
    fn to_device(&mut self, device: Device);

    /// Current placement
    fn device(&self) -> Device;

    /// Snapshot the full weight state
    fn state(&self) -> ModelState;

    /// Restore weights from a snapshot. Parameter identities change; callers
    /// must re-partition afterwards.
    fn load_state(&mut self, state: &ModelState) -> Result<()>;
}

/// Per-environment elementwise linear regression.
///
/// A deliberately small reference model: predictions are `w ⊙ x` over a
/// weight vector split into an optional bert-tagged block and a task head,
/// with analytic gradients. Used by docs, tests, and as a template for real
/// collaborators.
pub struct LeastSquaresModel {
    bert: Option<Tensor>,
    head: Tensor,
    bert_dim: usize,
    dim: usize,
    cache: Vec<(Array1<f32>, Array1<f32>)>,
    device: Device,
}

impl LeastSquaresModel {
    /// Create a model over `dim` features, the first `bert_dim` of which are
    /// owned by the bert block (`bert_dim = 0` disables it).
    pub fn new(dim: usize, bert_dim: usize) -> Self {
        assert!(bert_dim <= dim, "bert_dim must not exceed dim");
        let bert = (bert_dim > 0).then(|| Tensor::zeros(bert_dim, true));
        Self {
            bert,
            head: Tensor::zeros(dim - bert_dim, true),
            bert_dim,
            dim,
            cache: Vec::new(),
            device: Device::Host,
        }
    }

    /// Full weight vector, bert block first
    fn weight(&self) -> Array1<f32> {
        let mut w = Vec::with_capacity(self.dim);
        if let Some(bert) = &self.bert {
            w.extend(bert.to_vec());
        }
        w.extend(self.head.to_vec());
        Array1::from_vec(w)
    }
}

impl Model for LeastSquaresModel {
    fn parameters(&self) -> Vec<Tensor> {
        let mut params = Vec::new();
        if let Some(bert) = &self.bert {
            params.push(bert.clone());
        }
        params.push(self.head.clone());
        params
    }

    fn bert_parameters(&self) -> Vec<Tensor> {
        self.bert.iter().cloned().collect()
    }

    fn non_bert_parameters(&self) -> Vec<Tensor> {
        vec![self.head.clone()]
    }

    fn forward(&mut self, batch: &Batch) -> StepResult<Vec<f32>> {
        let w = self.weight();
        self.cache.clear();

        let mut losses = Vec::with_capacity(batch.num_envs());
        for env in &batch.envs {
            let x = env.inputs.data().clone();
            let t = env.targets.data().clone();
            if x.len() != self.dim || t.len() != self.dim {
                return Err(ResourceExhausted(format!(
                    "environment '{}' has {} features, model expects {}",
                    env.env,
                    x.len(),
                    self.dim
                )));
            }
            let diff = &w * &x - &t;
            let loss = diff.iter().map(|d| d * d).sum::<f32>() / self.dim as f32;
            losses.push(loss);
            self.cache.push((x, diff));
        }
        Ok(losses)
    }

    fn backward(&mut self, weights: &[f32]) -> StepResult<()> {
        if weights.len() != self.cache.len() {
            return Err(ResourceExhausted(format!(
                "{} loss weights for {} cached environments",
                weights.len(),
                self.cache.len()
            )));
        }

        let mut grad = Array1::<f32>::zeros(self.dim);
        for (weight, (x, diff)) in weights.iter().zip(&self.cache) {
            // d/dw [ mean((w*x - t)^2) ] = 2 * (w*x - t) * x / dim
            grad += &((diff * x) * (2.0 * weight / self.dim as f32));
        }

        if let Some(bert) = &self.bert {
            bert.accumulate_grad(&grad.slice(ndarray::s![..self.bert_dim]).to_owned());
        }
        self.head
            .accumulate_grad(&grad.slice(ndarray::s![self.bert_dim..]).to_owned());
        Ok(())
    }

    fn to_device(&mut self, device: Device) {
        for param in self.parameters() {
            param.to_device(device);
        }
        self.device = device;
    }

    fn device(&self) -> Device {
        self.device
    }

    fn state(&self) -> ModelState {
        let mut tensors = Vec::new();
        if let Some(bert) = &self.bert {
            tensors.push(("bert.weight".to_string(), bert.to_vec()));
        }
        tensors.push(("head.weight".to_string(), self.head.to_vec()));
        ModelState { tensors }
    }

    fn load_state(&mut self, state: &ModelState) -> Result<()> {
        for (name, data) in &state.tensors {
            let target = match name.as_str() {
                "bert.weight" => self.bert.as_ref().ok_or_else(|| {
                    Error::Checkpoint("snapshot has a bert block, model does not".into())
                })?,
                "head.weight" => &self.head,
                other => {
                    return Err(Error::Checkpoint(format!("unknown parameter '{other}'")));
                }
            };
            if target.len() != data.len() {
                return Err(Error::Checkpoint(format!(
                    "parameter '{}' has {} elements, snapshot has {}",
                    name,
                    target.len(),
                    data.len()
                )));
            }
            target.set_data(Array1::from_vec(data.clone()));
        }
        self.cache.clear();
        Ok(())
    }
}
