use ndarray::{s, Array2, ArrayView2, ArrayView3, ArrayViewD};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{Result, TalariaError};
use crate::layers::{
    flatten_sequence, unflatten_sequence, DenseLayer, LayerNorm, LstmLayer, Module, ParamMut,
    PositionalEncoding, PositionalKind, StableTransformerLayer, WeightInit,
};

/// Which backbone turns a window of observations into an embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EncoderConfig {
    /// ReLU MLP over a single observation
    Flat { hidden_sizes: Vec<usize>, d_model: usize },
    /// LSTM over up to `seq_len` observations; the last hidden state is the embedding
    Recurrent { d_model: usize, seq_len: usize },
    /// Gated single-block attention encoder over up to `seq_len` observations
    Attention {
        d_model: usize,
        n_heads: usize,
        dim_feedforward: usize,
        seq_len: usize,
        positional: PositionalKind,
    },
}

impl Default for EncoderConfig {
    fn default() -> Self {
        EncoderConfig::Flat { hidden_sizes: vec![256], d_model: 128 }
    }
}

impl EncoderConfig {
    pub fn d_model(&self) -> usize {
        match *self {
            EncoderConfig::Flat { d_model, .. }
            | EncoderConfig::Recurrent { d_model, .. }
            | EncoderConfig::Attention { d_model, .. } => d_model,
        }
    }

    /// Number of observations per state the encoder consumes.
    pub fn window(&self) -> usize {
        match *self {
            EncoderConfig::Flat { .. } => 1,
            EncoderConfig::Recurrent { seq_len, .. } | EncoderConfig::Attention { seq_len, .. } => seq_len,
        }
    }

    /// Short architecture name used in checkpoint and score file names.
    pub fn label(&self) -> &'static str {
        match self {
            EncoderConfig::Flat { .. } => "mlp",
            EncoderConfig::Recurrent { .. } => "lstm",
            EncoderConfig::Attention { .. } => "trsf",
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.d_model() == 0 {
            return Err(TalariaError::invalid_parameter("d_model", "must be positive"));
        }
        match self {
            EncoderConfig::Flat { hidden_sizes, .. } => {
                if hidden_sizes.iter().any(|&h| h == 0) {
                    return Err(TalariaError::invalid_parameter("hidden_sizes", "every layer needs at least one unit"));
                }
            }
            EncoderConfig::Recurrent { seq_len, .. } => {
                if *seq_len == 0 {
                    return Err(TalariaError::invalid_parameter("seq_len", "must be positive"));
                }
            }
            EncoderConfig::Attention { d_model, n_heads, dim_feedforward, seq_len, .. } => {
                if *seq_len == 0 {
                    return Err(TalariaError::invalid_parameter("seq_len", "must be positive"));
                }
                if *dim_feedforward == 0 {
                    return Err(TalariaError::invalid_parameter("dim_feedforward", "must be positive"));
                }
                if *n_heads == 0 || d_model % n_heads != 0 {
                    return Err(TalariaError::invalid_parameter(
                        "n_heads".to_string(),
                        format!("{} heads do not divide d_model = {}", n_heads, d_model),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// ReLU MLP encoder for single observations.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FlatEncoder {
    pub layers: Vec<DenseLayer>,
}

impl FlatEncoder {
    fn forward(&mut self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut x = inputs.to_owned();
        for layer in &mut self.layers {
            x = layer.forward_batch(x.view())?;
        }
        Ok(x)
    }

    fn backward(&mut self, grad: ArrayView2<f32>) -> Result<()> {
        let mut grad = grad.to_owned();
        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward_batch(grad.view())?;
        }
        Ok(())
    }
}

/// `Linear -> LayerNorm -> tanh` per time step, positions added, then one
/// gated attention block that keeps only the final time step.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AttentionEncoder {
    pub embedding: DenseLayer,
    pub norm: LayerNorm,
    pub positional: PositionalEncoding,
    pub block: StableTransformerLayer,
    #[serde(skip)]
    embedded: Option<Array2<f32>>,
}

impl AttentionEncoder {
    fn forward(&mut self, inputs: ArrayView3<f32>) -> Result<Array2<f32>> {
        let (batch, seq_len, _) = inputs.dim();
        let rows = flatten_sequence(inputs)?;
        let projected = self.embedding.forward_batch(rows.view())?;
        let embedded = self.norm.forward_batch(projected.view())?.mapv(f32::tanh);
        let sequence = self.positional.forward(unflatten_sequence(embedded.clone(), batch, seq_len)?.view())?;
        self.embedded = Some(embedded);
        self.block.forward(sequence.view())
    }

    fn backward(&mut self, grad: ArrayView2<f32>) -> Result<()> {
        let grad_sequence = self.block.backward(grad)?;
        self.positional.backward(grad_sequence.view());
        let embedded = self
            .embedded
            .as_ref()
            .ok_or_else(|| TalariaError::dimension("attention encoder backward", "a cached forward pass", "none"))?;
        let grad_embedded = flatten_sequence(grad_sequence.view())? * &embedded.mapv(|t| 1.0 - t * t);
        let grad_projected = self.norm.backward_batch(grad_embedded.view())?;
        self.embedding.backward_batch(grad_projected.view())?;
        Ok(())
    }
}

/// State encoder shared by the actor and the critics.
///
/// Every variant maps `(batch, window, state_dim)` to `(batch, d_model)`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum StateEncoder {
    Flat(FlatEncoder),
    Recurrent { lstm: LstmLayer, seq_len: usize },
    Attention { encoder: Box<AttentionEncoder>, seq_len: usize },
}

impl StateEncoder {
    pub fn new<R: Rng + ?Sized>(config: &EncoderConfig, state_dim: usize, rng: &mut R) -> Result<Self> {
        config.validate()?;
        if state_dim == 0 {
            return Err(TalariaError::invalid_parameter("state_dim", "must be positive"));
        }
        let encoder = match config {
            EncoderConfig::Flat { hidden_sizes, d_model } => {
                let mut sizes = vec![state_dim];
                sizes.extend_from_slice(hidden_sizes);
                sizes.push(*d_model);
                let layers = sizes
                    .windows(2)
                    .map(|pair| DenseLayer::new(pair[0], pair[1], Activation::Relu, &mut *rng))
                    .collect();
                StateEncoder::Flat(FlatEncoder { layers })
            }
            EncoderConfig::Recurrent { d_model, seq_len } => StateEncoder::Recurrent {
                lstm: LstmLayer::new(state_dim, *d_model, rng),
                seq_len: *seq_len,
            },
            EncoderConfig::Attention { d_model, n_heads, dim_feedforward, seq_len, positional } => {
                let embedding = DenseLayer::with_init(
                    state_dim,
                    *d_model,
                    Activation::Linear,
                    WeightInit::XavierUniform { gain: Activation::Tanh.gain() },
                    rng,
                );
                StateEncoder::Attention {
                    encoder: Box::new(AttentionEncoder {
                        embedding,
                        norm: LayerNorm::new(*d_model),
                        positional: PositionalEncoding::new(*positional, *seq_len, *d_model, rng),
                        block: StableTransformerLayer::new(*d_model, *n_heads, *dim_feedforward, rng)?,
                        embedded: None,
                    }),
                    seq_len: *seq_len,
                }
            }
        };
        Ok(encoder)
    }

    /// Longest window a sequence encoder accepts; `None` for the flat encoder.
    pub fn seq_len(&self) -> Option<usize> {
        match self {
            StateEncoder::Flat(_) => None,
            StateEncoder::Recurrent { seq_len, .. } | StateEncoder::Attention { seq_len, .. } => Some(*seq_len),
        }
    }

    fn check_window(&self, window: usize) -> Result<()> {
        match self {
            StateEncoder::Flat(_) if window != 1 => {
                Err(TalariaError::dimension("flat encoder window", 1, window))
            }
            StateEncoder::Recurrent { seq_len, .. } | StateEncoder::Attention { seq_len, .. }
                if window == 0 || window > *seq_len =>
            {
                Err(TalariaError::dimension("sequence encoder window", format!("1..={}", seq_len), window))
            }
            _ => Ok(()),
        }
    }

    pub fn forward(&mut self, states: ArrayView3<f32>) -> Result<Array2<f32>> {
        self.check_window(states.dim().1)?;
        match self {
            StateEncoder::Flat(mlp) => mlp.forward(states.slice(s![.., 0, ..])),
            StateEncoder::Recurrent { lstm, .. } => lstm.forward_sequence(states),
            StateEncoder::Attention { encoder, .. } => encoder.forward(states),
        }
    }

    /// Backpropagate a gradient on the embedding into the encoder's parameters.
    pub fn backward(&mut self, grad: ArrayView2<f32>) -> Result<()> {
        match self {
            StateEncoder::Flat(mlp) => mlp.backward(grad),
            StateEncoder::Recurrent { lstm, .. } => lstm.backward_sequence(grad).map(|_| ()),
            StateEncoder::Attention { encoder, .. } => encoder.backward(grad),
        }
    }
}

impl Module for StateEncoder {
    fn params(&self) -> Vec<ArrayViewD<'_, f32>> {
        match self {
            StateEncoder::Flat(mlp) => mlp.layers.iter().flat_map(|l| l.params()).collect(),
            StateEncoder::Recurrent { lstm, .. } => lstm.params(),
            StateEncoder::Attention { encoder, .. } => {
                let mut params = encoder.embedding.params();
                params.extend(encoder.norm.params());
                params.extend(encoder.positional.params());
                params.extend(encoder.block.params());
                params
            }
        }
    }

    fn params_mut(&mut self) -> Vec<ParamMut<'_>> {
        match self {
            StateEncoder::Flat(mlp) => mlp.layers.iter_mut().flat_map(|l| l.params_mut()).collect(),
            StateEncoder::Recurrent { lstm, .. } => lstm.params_mut(),
            StateEncoder::Attention { encoder, .. } => {
                let AttentionEncoder { embedding, norm, positional, block, .. } = &mut **encoder;
                let mut params = embedding.params_mut();
                params.extend(norm.params_mut());
                params.extend(positional.params_mut());
                params.extend(block.params_mut());
                params
            }
        }
    }
}
