pub mod traits;
pub mod initialization;
pub mod dense;
pub mod layer_norm;
pub mod prelu;
pub mod lstm;
pub mod positional;
pub mod transformer;

pub use traits::{Module, Param, ParamMut};
pub use initialization::WeightInit;
pub use dense::DenseLayer;
pub use layer_norm::LayerNorm;
pub use prelu::PRelu;
pub use lstm::LstmLayer;
pub use positional::{PositionalEncoding, PositionalKind};
pub use transformer::StableTransformerLayer;

use ndarray::{Array2, Array3, ArrayView3};

use crate::error::Result;

/// `(batch, seq_len, features)` -> `(batch * seq_len, features)`, rows ordered batch-major.
pub(crate) fn flatten_sequence(inputs: ArrayView3<f32>) -> Result<Array2<f32>> {
    let (batch, seq_len, features) = inputs.dim();
    Ok(Array2::from_shape_vec((batch * seq_len, features), inputs.iter().cloned().collect())?)
}

/// Inverse of [`flatten_sequence`].
pub(crate) fn unflatten_sequence(rows: Array2<f32>, batch: usize, seq_len: usize) -> Result<Array3<f32>> {
    let features = rows.ncols();
    Ok(Array3::from_shape_vec((batch, seq_len, features), rows.iter().cloned().collect())?)
}
