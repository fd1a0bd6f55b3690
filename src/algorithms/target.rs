//! Polyak averaging for target networks.
//!
//! ```text
//! θ_target = τ * θ_online + (1 - τ) * θ_target
//! ```
//!
//! Parameters are matched by position in [`Module::params`], which is
//! deterministic for two networks built from the same configuration.

use ndarray::Zip;

use crate::error::{Result, TalariaError};
use crate::layers::Module;

/// Blend `online` into `target` in place. `tau = 1` copies, `tau = 0` is a no-op.
pub fn soft_update<M: Module + ?Sized>(target: &mut M, online: &M, tau: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&tau) {
        return Err(TalariaError::invalid_parameter("tau".to_string(), format!("{} is outside [0, 1]", tau)));
    }

    let online_params = online.params();
    let mut target_params = target.params_mut();
    if online_params.len() != target_params.len() {
        return Err(TalariaError::dimension(
            "soft update parameter count",
            online_params.len(),
            target_params.len(),
        ));
    }

    for (index, (target_param, online_param)) in target_params.iter_mut().zip(&online_params).enumerate() {
        if target_param.value.shape() != online_param.shape() {
            return Err(TalariaError::dimension(
                format!("soft update parameter {}", index),
                format!("{:?}", online_param.shape()),
                format!("{:?}", target_param.value.shape()),
            ));
        }
        Zip::from(&mut target_param.value)
            .and(online_param)
            .for_each(|t, &o| *t = tau * o + (1.0 - tau) * *t);
    }
    Ok(())
}
