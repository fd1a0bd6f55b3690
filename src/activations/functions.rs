use ndarray::{Array2, ArrayView2};
use serde::{Serialize, Deserialize};

/// An enumeration of the activation functions a dense layer can apply.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq)]
pub enum Activation {
    #[default]
    Relu,
    Linear,
    Tanh,
}

impl Activation {
    /// Apply the activation function to a batch in-place.
    pub fn apply_batch(&self, inputs: &mut Array2<f32>) {
        match self {
            Activation::Relu => {
                inputs.mapv_inplace(|v| v.max(0.0));
            }
            Activation::Linear => {}
            Activation::Tanh => {
                inputs.mapv_inplace(|v| v.tanh());
            }
        }
    }

    /// Derivative of the activation evaluated at the pre-activation values.
    pub fn derivative_batch(&self, pre_activation: ArrayView2<f32>) -> Array2<f32> {
        match self {
            Activation::Relu => {
                pre_activation.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
            }
            Activation::Linear => {
                Array2::ones(pre_activation.dim())
            }
            Activation::Tanh => {
                pre_activation.mapv(|v| {
                    let t = v.tanh();
                    1.0 - t * t
                })
            }
        }
    }

    /// Recommended gain for Xavier initialisation in front of this activation.
    pub fn gain(&self) -> f32 {
        match self {
            Activation::Relu => 2.0f32.sqrt(),
            Activation::Linear => 1.0,
            Activation::Tanh => 5.0 / 3.0,
        }
    }
}

/// Logistic function, shared by the LSTM gates and the transformer's residual gates.
#[inline]
pub fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_tanh_derivative_matches_closed_form() {
        let x = array![[-1.0f32, 0.0, 0.5]];
        let d = Activation::Tanh.derivative_batch(x.view());
        for (v, dv) in x.iter().zip(d.iter()) {
            assert!((dv - (1.0 - v.tanh().powi(2))).abs() < 1e-6);
        }
    }

    #[test]
    fn test_relu_batch() {
        let mut x = array![[-1.0f32, 2.0], [0.0, -3.0]];
        Activation::Relu.apply_batch(&mut x);
        assert_eq!(x, array![[0.0, 2.0], [0.0, 0.0]]);
    }
}
