use ndarray::{s, Array2, Array3, ArrayView3, ArrayViewD, Axis, Ix2};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::{Result, TalariaError};
use super::initialization::WeightInit;
use super::traits::{Module, Param, ParamMut};

/// Which positional signal the attention encoder adds to its embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PositionalKind {
    #[default]
    Sinusoidal,
    Learned,
}

/// Additive positional encoding for positions `0..max_len`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum PositionalEncoding {
    Sinusoidal { table: Array2<f32> },
    Learned { table: Param<Ix2> },
}

impl PositionalEncoding {
    pub fn new<R: Rng + ?Sized>(kind: PositionalKind, max_len: usize, d_model: usize, rng: &mut R) -> Self {
        match kind {
            PositionalKind::Sinusoidal => Self::sinusoidal(max_len, d_model),
            PositionalKind::Learned => PositionalEncoding::Learned {
                table: Param::new(
                    WeightInit::Normal { mean: 0.0, std: 0.02 }.initialize_weights((max_len, d_model), rng),
                ),
            },
        }
    }

    /// `pe[pos, 2i] = sin(pos / 10000^(2i/d))`, `pe[pos, 2i+1] = cos(pos / 10000^(2i/d))`
    pub fn sinusoidal(max_len: usize, d_model: usize) -> Self {
        let table = Array2::from_shape_fn((max_len, d_model), |(pos, i)| {
            let exponent = (i - i % 2) as f32 / d_model as f32;
            let angle = pos as f32 / 10000f32.powf(exponent);
            if i % 2 == 0 { angle.sin() } else { angle.cos() }
        });
        PositionalEncoding::Sinusoidal { table }
    }

    fn table(&self) -> &Array2<f32> {
        match self {
            PositionalEncoding::Sinusoidal { table } => table,
            PositionalEncoding::Learned { table } => &table.value,
        }
    }

    pub fn max_len(&self) -> usize {
        self.table().nrows()
    }

    /// Add positions `0..seq_len` to a `(batch, seq_len, d_model)` tensor.
    pub fn forward(&self, inputs: ArrayView3<f32>) -> Result<Array3<f32>> {
        let (_, seq_len, d_model) = inputs.dim();
        let table = self.table();
        if seq_len > table.nrows() || d_model != table.ncols() {
            return Err(TalariaError::dimension(
                "positional encoding",
                format!("at most {} positions of width {}", table.nrows(), table.ncols()),
                format!("{} positions of width {}", seq_len, d_model),
            ));
        }
        Ok(&inputs + &table.slice(s![..seq_len, ..]))
    }

    /// The encoding is additive, so the input gradient equals `grad_output`;
    /// only the learned table accumulates anything.
    pub fn backward(&mut self, grad_output: ArrayView3<f32>) {
        if let PositionalEncoding::Learned { table } = self {
            let seq_len = grad_output.dim().1;
            let summed = grad_output.sum_axis(Axis(0));
            let mut rows = table.grad.slice_mut(s![..seq_len, ..]);
            rows += &summed;
        }
    }
}

impl Module for PositionalEncoding {
    fn params(&self) -> Vec<ArrayViewD<'_, f32>> {
        match self {
            PositionalEncoding::Sinusoidal { .. } => Vec::new(),
            PositionalEncoding::Learned { table } => vec![table.view()],
        }
    }

    fn params_mut(&mut self) -> Vec<ParamMut<'_>> {
        match self {
            PositionalEncoding::Sinusoidal { .. } => Vec::new(),
            PositionalEncoding::Learned { table } => vec![table.view_mut()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sinusoidal_first_position() {
        let pe = PositionalEncoding::sinusoidal(4, 6);
        let zeros = Array3::<f32>::zeros((1, 4, 6));
        let out = pe.forward(zeros.view()).unwrap();
        // position 0: sin(0) = 0 on even channels, cos(0) = 1 on odd ones
        for i in 0..6 {
            let expected = if i % 2 == 0 { 0.0 } else { 1.0 };
            assert!((out[[0, 0, i]] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_window_longer_than_table_is_rejected() {
        let pe = PositionalEncoding::sinusoidal(2, 4);
        let x = Array3::<f32>::zeros((1, 3, 4));
        assert!(pe.forward(x.view()).is_err());
    }
}
