use crate::error::Result;
use crate::layers::Module;

/// Compare a module's analytical gradients against central finite differences.
///
/// `loss(module, backward)` must run a forward pass and return a scalar loss;
/// when `backward` is true it must also backpropagate that loss so the
/// module's gradients accumulate. Only the first `entries_per_param` values of
/// each parameter tensor are perturbed. Returns the largest relative error,
/// measured as `|a - n| / max(|a|, |n|, 1e-2)`.
pub fn gradient_check<M, F>(module: &mut M, mut loss: F, epsilon: f32, entries_per_param: usize) -> Result<f32>
where
    M: Module,
    F: FnMut(&mut M, bool) -> Result<f32>,
{
    module.zero_grad();
    loss(module, true)?;
    let analytical = module.gradients();

    let mut max_relative_error = 0.0f32;
    for (param_index, grads) in analytical.iter().enumerate() {
        for (entry, &analytical_grad) in grads.iter().enumerate().take(entries_per_param) {
            let original = nudge(module, param_index, entry, None);

            nudge(module, param_index, entry, Some(original + epsilon));
            let loss_plus = loss(module, false)?;
            nudge(module, param_index, entry, Some(original - epsilon));
            let loss_minus = loss(module, false)?;
            nudge(module, param_index, entry, Some(original));

            let numerical_grad = (loss_plus - loss_minus) / (2.0 * epsilon);
            let scale = analytical_grad.abs().max(numerical_grad.abs()).max(1e-2);
            let relative_error = (analytical_grad - numerical_grad).abs() / scale;
            if relative_error > max_relative_error {
                log::debug!(
                    "param {} entry {}: analytical {:.6} numerical {:.6}",
                    param_index, entry, analytical_grad, numerical_grad
                );
                max_relative_error = relative_error;
            }
        }
    }

    module.zero_grad();
    Ok(max_relative_error)
}

/// Read (and optionally overwrite) one entry of one parameter, returning the old value.
fn nudge<M: Module>(module: &mut M, param_index: usize, entry: usize, value: Option<f32>) -> f32 {
    let mut params = module.params_mut();
    let mut old = 0.0;
    if let Some(slot) = params[param_index].value.iter_mut().nth(entry) {
        old = *slot;
        if let Some(v) = value {
            *slot = v;
        }
    }
    old
}
