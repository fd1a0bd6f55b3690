use ndarray::ArrayViewD;

use crate::error::{Result, TalariaError};
use crate::layers::Module;

/// Types of numerical issues
#[derive(Debug, Clone, PartialEq)]
pub enum NumericalIssue {
    NaN { count: usize },
    Infinity { count: usize },
}

impl std::fmt::Display for NumericalIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumericalIssue::NaN { count } => write!(f, "{} NaN values", count),
            NumericalIssue::Infinity { count } => write!(f, "{} infinite values", count),
        }
    }
}

/// Count non-finite values in a tensor. NaN is reported before infinity.
pub fn scan(values: ArrayViewD<f32>) -> Option<NumericalIssue> {
    let mut nan_count = 0;
    let mut inf_count = 0;
    for &value in values.iter() {
        if value.is_nan() {
            nan_count += 1;
        } else if value.is_infinite() {
            inf_count += 1;
        }
    }

    if nan_count > 0 {
        Some(NumericalIssue::NaN { count: nan_count })
    } else if inf_count > 0 {
        Some(NumericalIssue::Infinity { count: inf_count })
    } else {
        None
    }
}

pub fn ensure_finite_loss(network: &str, loss: f32) -> Result<()> {
    if loss.is_finite() {
        Ok(())
    } else {
        log::warn!("{}: loss is {}", network, loss);
        Err(TalariaError::numerical(network, format!("loss is {}", loss)))
    }
}

/// Check every accumulated gradient of `module` before an optimizer step.
pub fn ensure_finite_gradients<M: Module + ?Sized>(network: &str, module: &mut M) -> Result<()> {
    for (index, param) in module.params_mut().iter().enumerate() {
        if let Some(issue) = scan(param.grad.view()) {
            log::warn!("{}: parameter {} has {} in its gradient", network, index, issue);
            return Err(TalariaError::numerical(
                network,
                format!("gradient of parameter {} has {}", index, issue),
            ));
        }
    }
    Ok(())
}

pub fn ensure_finite_parameters<M: Module + ?Sized>(network: &str, module: &M) -> Result<()> {
    for (index, param) in module.params().iter().enumerate() {
        if let Some(issue) = scan(param.view()) {
            return Err(TalariaError::numerical(
                network,
                format!("parameter {} has {}", index, issue),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_scan_reports_nan_first() {
        let values = array![1.0f32, f32::INFINITY, f32::NAN].into_dyn();
        assert_eq!(scan(values.view()), Some(NumericalIssue::NaN { count: 1 }));
        assert_eq!(scan(array![0.0f32, 2.0].into_dyn().view()), None);
    }

    #[test]
    fn test_non_finite_loss_names_network() {
        let err = ensure_finite_loss("critic_2", f32::NAN).unwrap_err();
        assert!(err.to_string().contains("critic_2"));
    }
}
