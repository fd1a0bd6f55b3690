use ndarray::{Array2, ArrayView2, ArrayViewD, Axis, Ix1, Ix2};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{Result, TalariaError};
use super::initialization::WeightInit;
use super::traits::{Module, Param, ParamMut};

/// A fully connected (dense) layer in a neural network
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DenseLayer {
    pub weights: Param<Ix2>,
    pub biases: Param<Ix1>,
    pub activation: Activation,
    #[serde(skip)]
    pre_activation_output: Option<Array2<f32>>,
    #[serde(skip)]
    inputs: Option<Array2<f32>>,
}

impl DenseLayer {
    /// Create a new dense layer initialised for its activation function.
    pub fn new<R: Rng + ?Sized>(input_size: usize, output_size: usize, activation: Activation, rng: &mut R) -> Self {
        Self::with_init(input_size, output_size, activation, WeightInit::for_activation(&activation), rng)
    }

    pub fn with_init<R: Rng + ?Sized>(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        init: WeightInit,
        rng: &mut R,
    ) -> Self {
        DenseLayer {
            weights: Param::new(init.initialize_weights((input_size, output_size), rng)),
            biases: Param::new(init.initialize_biases(output_size, rng)),
            activation,
            pre_activation_output: None,
            inputs: None,
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.value.nrows()
    }

    pub fn output_size(&self) -> usize {
        self.weights.value.ncols()
    }

    /// Forward pass for a batch of row vectors; caches what `backward_batch` needs.
    pub fn forward_batch(&mut self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        if inputs.ncols() != self.input_size() {
            return Err(TalariaError::dimension("dense layer input", self.input_size(), inputs.ncols()));
        }
        self.inputs = Some(inputs.to_owned());
        let mut outputs = inputs.dot(&self.weights.value) + &self.biases.value;
        self.pre_activation_output = Some(outputs.clone());
        self.activation.apply_batch(&mut outputs);
        Ok(outputs)
    }

    /// Accumulate weight and bias gradients and return the gradient w.r.t. the inputs.
    pub fn backward_batch(&mut self, output_errors: ArrayView2<f32>) -> Result<Array2<f32>> {
        let (inputs, pre_activation_output) = match (&self.inputs, &self.pre_activation_output) {
            (Some(i), Some(p)) => (i, p),
            _ => return Err(TalariaError::dimension("dense layer backward", "a cached forward pass", "none")),
        };
        if output_errors.dim() != pre_activation_output.dim() {
            return Err(TalariaError::dimension(
                "dense layer output gradient",
                format!("{:?}", pre_activation_output.dim()),
                format!("{:?}", output_errors.dim()),
            ));
        }

        let activation_deriv = self.activation.derivative_batch(pre_activation_output.view());
        let adjusted_error = &output_errors * &activation_deriv;
        self.weights.grad += &inputs.t().dot(&adjusted_error);
        self.biases.grad += &adjusted_error.sum_axis(Axis(0));

        Ok(adjusted_error.dot(&self.weights.value.t()))
    }
}

impl Module for DenseLayer {
    fn params(&self) -> Vec<ArrayViewD<'_, f32>> {
        vec![self.weights.view(), self.biases.view()]
    }

    fn params_mut(&mut self) -> Vec<ParamMut<'_>> {
        vec![self.weights.view_mut(), self.biases.view_mut()]
    }
}
