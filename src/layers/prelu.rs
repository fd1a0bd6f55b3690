use ndarray::{Array1, Array2, ArrayView2, ArrayViewD, Axis, Ix1, Zip};
use serde::{Serialize, Deserialize};

use crate::error::{Result, TalariaError};
use super::traits::{Module, Param, ParamMut};

/// Parametric ReLU with one learnable negative slope per channel.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PRelu {
    pub alpha: Param<Ix1>,
    #[serde(skip)]
    inputs: Option<Array2<f32>>,
}

impl PRelu {
    pub fn new(channels: usize) -> Self {
        PRelu {
            alpha: Param::new(Array1::from_elem(channels, 0.25)),
            inputs: None,
        }
    }

    pub fn channels(&self) -> usize {
        self.alpha.value.len()
    }

    pub fn forward_batch(&mut self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        if inputs.ncols() != self.channels() {
            return Err(TalariaError::dimension("prelu input", self.channels(), inputs.ncols()));
        }
        let mut outputs = inputs.to_owned();
        for mut row in outputs.rows_mut() {
            Zip::from(&mut row).and(&self.alpha.value).for_each(|v, &a| {
                if *v <= 0.0 {
                    *v *= a;
                }
            });
        }
        self.inputs = Some(inputs.to_owned());
        Ok(outputs)
    }

    pub fn backward_batch(&mut self, grad_output: ArrayView2<f32>) -> Result<Array2<f32>> {
        let inputs = self
            .inputs
            .as_ref()
            .ok_or_else(|| TalariaError::dimension("prelu backward", "a cached forward pass", "none"))?;
        if grad_output.dim() != inputs.dim() {
            return Err(TalariaError::dimension(
                "prelu output gradient",
                format!("{:?}", inputs.dim()),
                format!("{:?}", grad_output.dim()),
            ));
        }

        let negative_part = Zip::from(inputs)
            .and(&grad_output)
            .map_collect(|&x, &g| if x > 0.0 { 0.0 } else { x * g });
        self.alpha.grad += &negative_part.sum_axis(Axis(0));

        let mut grad_input = grad_output.to_owned();
        for (mut row, x_row) in grad_input.rows_mut().into_iter().zip(inputs.rows()) {
            Zip::from(&mut row)
                .and(&x_row)
                .and(&self.alpha.value)
                .for_each(|g, &x, &a| {
                    if x <= 0.0 {
                        *g *= a;
                    }
                });
        }
        Ok(grad_input)
    }
}

impl Module for PRelu {
    fn params(&self) -> Vec<ArrayViewD<'_, f32>> {
        vec![self.alpha.view()]
    }

    fn params_mut(&mut self) -> Vec<ParamMut<'_>> {
        vec![self.alpha.view_mut()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_negative_inputs_are_scaled() {
        let mut prelu = PRelu::new(2);
        let out = prelu.forward_batch(array![[-4.0f32, 3.0]].view()).unwrap();
        assert_eq!(out, array![[-1.0f32, 3.0]]);
    }
}
