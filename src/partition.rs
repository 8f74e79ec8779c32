//! Parameter group partitioning
//!
//! Splits the model's parameter list into the pretrained-encoder ("bert")
//! subset and everything else. Trivial, but the invariants here gate
//! dual-optimizer training: the subsets must be disjoint, order-preserving,
//! and cover every parameter, and the bert subset must be non-empty.
//!
//! Parameter identities change on every model reload, so the partition is
//! recomputed (never cached) after recovery.

use crate::error::{Error, Result};
use crate::model::Model;
use crate::tensor::Tensor;

/// Disjoint, order-preserving split of the model's trainable parameters
#[derive(Clone, Debug)]
pub struct ParameterPartition {
    pub bert: Vec<Tensor>,
    pub non_bert: Vec<Tensor>,
}

impl ParameterPartition {
    /// Total number of parameters across both subsets
    pub fn total(&self) -> usize {
        self.bert.len() + self.non_bert.len()
    }
}

/// Partition the model's parameters for dual-optimizer training.
///
/// Fails with [`Error::Config`] if the subsets do not exactly cover the
/// parameter list or the bert subset is empty — dual-optimizer mode requires
/// a non-trivial encoder.
pub fn partition_parameters(model: &dyn Model) -> Result<ParameterPartition> {
    let bert = model.bert_parameters();
    let non_bert = model.non_bert_parameters();
    let total = model.parameters().len();

    if bert.len() + non_bert.len() != total {
        return Err(Error::Config(format!(
            "parameter partition is not a cover: {} bert + {} non-bert != {} total",
            bert.len(),
            non_bert.len(),
            total
        )));
    }
    if bert.is_empty() {
        return Err(Error::Config(
            "bert training requested but the model has no bert parameters".into(),
        ));
    }

    tracing::info!(
        bert = bert.len(),
        non_bert = non_bert.len(),
        "partitioned parameters into bert / non-bert groups"
    );
    Ok(ParameterPartition { bert, non_bert })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LeastSquaresModel;

    #[test]
    fn test_partition_covers_all_parameters() {
        let model = LeastSquaresModel::new(8, 4);
        let partition = partition_parameters(&model).unwrap();
        assert_eq!(partition.total(), model.parameters().len());
        assert_eq!(partition.bert.len(), 1);
        assert_eq!(partition.non_bert.len(), 1);
    }

    #[test]
    fn test_partition_preserves_identity() {
        let model = LeastSquaresModel::new(8, 4);
        let partition = partition_parameters(&model).unwrap();
        assert!(partition.bert[0].same_storage(&model.bert_parameters()[0]));
    }

    #[test]
    fn test_partition_rejects_empty_bert() {
        let model = LeastSquaresModel::new(8, 0);
        let err = partition_parameters(&model).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_partition_recomputed_after_reload() {
        let mut model = LeastSquaresModel::new(4, 2);
        let before = partition_parameters(&model).unwrap();
        let state = model.state();
        model.load_state(&state).unwrap();
        let after = partition_parameters(&model).unwrap();
        // Same cover after reload, recomputed from live parameters
        assert_eq!(before.total(), after.total());
    }
}
