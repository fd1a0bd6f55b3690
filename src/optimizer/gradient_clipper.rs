use serde::{Serialize, Deserialize};

use crate::layers::ParamMut;

/// Gradient clipping methods
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum GradientClipper {
    /// Clip gradients by value
    ClipByValue { min: f32, max: f32 },

    /// Clip each tensor's gradient by its own norm
    ClipByNorm { max_norm: f32 },

    /// Clip gradients by global norm (across all parameters)
    ClipByGlobalNorm { max_norm: f32 },

    /// No clipping
    #[default]
    None,
}

impl GradientClipper {
    /// Clip the accumulated gradients in place, before the optimizer step.
    pub fn clip(&self, params: &mut [ParamMut<'_>]) {
        match *self {
            GradientClipper::ClipByValue { min, max } => {
                for p in params.iter_mut() {
                    p.grad.mapv_inplace(|g| g.max(min).min(max));
                }
            }

            GradientClipper::ClipByNorm { max_norm } => {
                for p in params.iter_mut() {
                    let norm = p.grad.iter().map(|&g| g * g).sum::<f32>().sqrt();
                    if norm > max_norm {
                        let scale = max_norm / norm;
                        p.grad.mapv_inplace(|g| g * scale);
                    }
                }
            }

            GradientClipper::ClipByGlobalNorm { max_norm } => {
                let global_norm = Self::global_norm(params);
                if global_norm > max_norm {
                    let scale = max_norm / global_norm;
                    for p in params.iter_mut() {
                        p.grad.mapv_inplace(|g| g * scale);
                    }
                }
            }

            GradientClipper::None => {}
        }
    }

    /// Compute global norm of all gradients
    pub fn global_norm(params: &[ParamMut<'_>]) -> f32 {
        params
            .iter()
            .map(|p| p.grad.iter().map(|&x| x * x).sum::<f32>())
            .sum::<f32>()
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Param;
    use ndarray::{array, Ix1};

    #[test]
    fn test_global_norm_clipping() {
        let mut a: Param<Ix1> = Param::new(array![0.0f32, 0.0]);
        let mut b: Param<Ix1> = Param::new(array![0.0f32]);
        a.grad.assign(&array![3.0f32, 0.0]);
        b.grad.assign(&array![4.0f32]);
        let mut params = vec![a.view_mut(), b.view_mut()];
        GradientClipper::ClipByGlobalNorm { max_norm: 1.0 }.clip(&mut params);
        assert!((GradientClipper::global_norm(&params) - 1.0).abs() < 1e-5);
        drop(params);
        assert!((a.grad[0] - 0.6).abs() < 1e-5);
        assert!((b.grad[0] - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_value_clipping() {
        let mut a: Param<Ix1> = Param::new(array![0.0f32, 0.0]);
        a.grad.assign(&array![5.0f32, -5.0]);
        GradientClipper::ClipByValue { min: -1.0, max: 1.0 }.clip(&mut [a.view_mut()]);
        assert_eq!(a.grad, array![1.0f32, -1.0]);
    }
}
