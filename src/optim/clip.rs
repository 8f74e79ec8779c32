//! Gradient clipping utilities

use crate::tensor::Tensor;

/// Clip gradients by global norm.
///
/// Computes the global norm over all gradients in `params` and scales them
/// down if it exceeds `max_norm`, preserving relative magnitudes. In
/// dual-optimizer mode the caller invokes this once per parameter group, so
/// the two groups are clipped independently.
///
/// Returns the global norm before clipping.
pub fn clip_grad_norm(params: &[Tensor], max_norm: f32) -> f32 {
    let mut total_norm_sq = 0.0;
    for param in params {
        if let Some(grad) = param.grad() {
            total_norm_sq += grad.iter().map(|&g| g * g).sum::<f32>();
        }
    }

    let global_norm = total_norm_sq.sqrt();

    if global_norm > max_norm {
        let clip_coef = max_norm / global_norm;
        for param in params {
            if let Some(grad) = param.grad() {
                param.set_grad(grad * clip_coef);
            }
        }
    }

    global_norm
}
