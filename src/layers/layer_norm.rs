use ndarray::{Array1, Array2, ArrayView2, ArrayViewD, Axis, Ix1};
use serde::{Serialize, Deserialize};

use crate::error::{Result, TalariaError};
use super::traits::{Module, Param, ParamMut};

/// Layer Normalization
///
/// Normalizes every row to zero mean and unit variance over the feature axis,
/// then scales and shifts with the learnable `gamma` and `beta`. Unlike batch
/// normalization there are no running statistics, so training and inference
/// behave identically.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LayerNorm {
    pub gamma: Param<Ix1>,
    pub beta: Param<Ix1>,
    pub epsilon: f32,
    #[serde(skip)]
    cached_normalized: Option<Array2<f32>>,
    #[serde(skip)]
    cached_inv_std: Option<Array1<f32>>,
}

impl LayerNorm {
    pub fn new(num_features: usize) -> Self {
        LayerNorm {
            gamma: Param::new(Array1::ones(num_features)),
            beta: Param::new(Array1::zeros(num_features)),
            epsilon: 1e-5,
            cached_normalized: None,
            cached_inv_std: None,
        }
    }

    pub fn num_features(&self) -> usize {
        self.gamma.value.len()
    }

    pub fn forward_batch(&mut self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        if inputs.ncols() != self.num_features() {
            return Err(TalariaError::dimension("layer norm input", self.num_features(), inputs.ncols()));
        }
        let features = inputs.ncols() as f32;
        let mean = inputs.sum_axis(Axis(1)) / features;
        let centered = &inputs - &mean.view().insert_axis(Axis(1));
        let var = centered.mapv(|v| v * v).sum_axis(Axis(1)) / features;
        let inv_std = var.mapv(|v| 1.0 / (v + self.epsilon).sqrt());
        let normalized = centered * &inv_std.view().insert_axis(Axis(1));

        let output = &normalized * &self.gamma.value + &self.beta.value;
        self.cached_normalized = Some(normalized);
        self.cached_inv_std = Some(inv_std);
        Ok(output)
    }

    pub fn backward_batch(&mut self, grad_output: ArrayView2<f32>) -> Result<Array2<f32>> {
        let (normalized, inv_std) = match (&self.cached_normalized, &self.cached_inv_std) {
            (Some(n), Some(s)) => (n, s),
            _ => return Err(TalariaError::dimension("layer norm backward", "a cached forward pass", "none")),
        };
        if grad_output.dim() != normalized.dim() {
            return Err(TalariaError::dimension(
                "layer norm output gradient",
                format!("{:?}", normalized.dim()),
                format!("{:?}", grad_output.dim()),
            ));
        }

        self.gamma.grad += &(&grad_output * normalized).sum_axis(Axis(0));
        self.beta.grad += &grad_output.sum_axis(Axis(0));

        // dx = inv_std * (dxhat - mean(dxhat) - xhat * mean(dxhat * xhat)), row-wise
        let features = normalized.ncols() as f32;
        let grad_normalized = &grad_output * &self.gamma.value;
        let mean_grad = grad_normalized.sum_axis(Axis(1)) / features;
        let mean_grad_dot = (&grad_normalized * normalized).sum_axis(Axis(1)) / features;
        let grad_input = (grad_normalized - &mean_grad.view().insert_axis(Axis(1))
            - normalized * &mean_grad_dot.view().insert_axis(Axis(1)))
            * &inv_std.view().insert_axis(Axis(1));
        Ok(grad_input)
    }
}

impl Module for LayerNorm {
    fn params(&self) -> Vec<ArrayViewD<'_, f32>> {
        vec![self.gamma.view(), self.beta.view()]
    }

    fn params_mut(&mut self) -> Vec<ParamMut<'_>> {
        vec![self.gamma.view_mut(), self.beta.view_mut()]
    }
}
