use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, ArrayViewD, Axis, Ix1, Zip};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::{sigmoid, Activation};
use crate::error::{Result, TalariaError};
use super::dense::DenseLayer;
use super::layer_norm::LayerNorm;
use super::traits::{Module, Param, ParamMut};
use super::{flatten_sequence, unflatten_sequence};

/// Initial value of both residual gates; `sigmoid(-2) ≈ 0.12`, so a fresh
/// block passes its input through almost unchanged.
const GATE_INIT: f32 = -2.0;

/// A single pre-normalised self-attention block with gated residual branches.
///
/// Only the last position of the sequence issues a query, and only that
/// position is returned:
///
/// ```text
/// y   = LN1(x)
/// o   = Wo · MultiHead(q = Wq·y[T-1], K = Wk·y, V = Wv·y)
/// h   = x[T-1] + sigmoid(g_attn) * o
/// out = h + sigmoid(g_ff) * FF(LN2(h))
/// ```
///
/// The learned gates keep early training close to the identity map, which is
/// what makes the block usable as an RL encoder without warm-up schedules.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StableTransformerLayer {
    pub d_model: usize,
    pub n_heads: usize,
    pub norm_attention: LayerNorm,
    pub query: DenseLayer,
    pub key: DenseLayer,
    pub value: DenseLayer,
    pub output: DenseLayer,
    pub attention_gate: Param<Ix1>,
    pub norm_feedforward: LayerNorm,
    pub feedforward_in: DenseLayer,
    pub feedforward_out: DenseLayer,
    pub feedforward_gate: Param<Ix1>,
    #[serde(skip)]
    cache: Option<AttentionCache>,
}

#[derive(Clone, Debug)]
struct AttentionCache {
    seq_len: usize,
    queries: Array2<f32>,
    keys: Array2<f32>,
    values: Array2<f32>,
    /// Softmax weights, `(batch, heads, seq_len)`
    weights: Array3<f32>,
    attended: Array2<f32>,
    feedforward: Array2<f32>,
}

impl StableTransformerLayer {
    pub fn new<R: Rng + ?Sized>(d_model: usize, n_heads: usize, dim_feedforward: usize, rng: &mut R) -> Result<Self> {
        if n_heads == 0 || d_model % n_heads != 0 {
            return Err(TalariaError::invalid_parameter(
                "n_heads".to_string(),
                format!("{} heads do not divide d_model = {}", n_heads, d_model),
            ));
        }
        Ok(StableTransformerLayer {
            d_model,
            n_heads,
            norm_attention: LayerNorm::new(d_model),
            query: DenseLayer::new(d_model, d_model, Activation::Linear, rng),
            key: DenseLayer::new(d_model, d_model, Activation::Linear, rng),
            value: DenseLayer::new(d_model, d_model, Activation::Linear, rng),
            output: DenseLayer::new(d_model, d_model, Activation::Linear, rng),
            attention_gate: Param::new(Array1::from_elem(d_model, GATE_INIT)),
            norm_feedforward: LayerNorm::new(d_model),
            feedforward_in: DenseLayer::new(d_model, dim_feedforward, Activation::Relu, rng),
            feedforward_out: DenseLayer::new(dim_feedforward, d_model, Activation::Linear, rng),
            feedforward_gate: Param::new(Array1::from_elem(d_model, GATE_INIT)),
            cache: None,
        })
    }

    fn head_dim(&self) -> usize {
        self.d_model / self.n_heads
    }

    /// `(batch, seq_len, d_model)` in, `(batch, d_model)` for the last position out.
    pub fn forward(&mut self, inputs: ArrayView3<f32>) -> Result<Array2<f32>> {
        let (batch, seq_len, width) = inputs.dim();
        if width != self.d_model {
            return Err(TalariaError::dimension("attention block input", self.d_model, width));
        }
        if seq_len == 0 {
            return Err(TalariaError::dimension("attention block sequence length", "at least 1", 0));
        }

        let normed = self.norm_attention.forward_batch(flatten_sequence(inputs)?.view())?;
        let keys = self.key.forward_batch(normed.view())?;
        let values = self.value.forward_batch(normed.view())?;
        let last_rows = last_positions(normed.view(), batch, seq_len);
        let queries = self.query.forward_batch(last_rows.view())?;

        let head_dim = self.head_dim();
        let scale = 1.0 / (head_dim as f32).sqrt();
        let mut weights = Array3::<f32>::zeros((batch, self.n_heads, seq_len));
        let mut context = Array2::<f32>::zeros((batch, self.d_model));
        for b in 0..batch {
            let rows = b * seq_len..(b + 1) * seq_len;
            for h in 0..self.n_heads {
                let cols = h * head_dim..(h + 1) * head_dim;
                let q = queries.slice(s![b, cols.clone()]);
                let k = keys.slice(s![rows.clone(), cols.clone()]);
                let v = values.slice(s![rows.clone(), cols.clone()]);

                let p = softmax(&(k.dot(&q) * scale));
                context.slice_mut(s![b, cols]).assign(&p.dot(&v));
                weights.slice_mut(s![b, h, ..]).assign(&p);
            }
        }

        let attended = self.output.forward_batch(context.view())?;
        let residual = inputs.slice(s![.., seq_len - 1, ..]);
        let attention_gate = self.attention_gate.value.mapv(sigmoid);
        let hidden = &residual + &(&attended * &attention_gate);

        let ff_hidden = self.feedforward_in.forward_batch(self.norm_feedforward.forward_batch(hidden.view())?.view())?;
        let feedforward = self.feedforward_out.forward_batch(ff_hidden.view())?;
        let feedforward_gate = self.feedforward_gate.value.mapv(sigmoid);
        let output = &hidden + &(&feedforward * &feedforward_gate);

        self.cache = Some(AttentionCache {
            seq_len,
            queries,
            keys,
            values,
            weights,
            attended,
            feedforward,
        });
        Ok(output)
    }

    /// Gradient of the last-position output w.r.t. the whole input sequence.
    pub fn backward(&mut self, grad_output: ArrayView2<f32>) -> Result<Array3<f32>> {
        let cache = self
            .cache
            .take()
            .ok_or_else(|| TalariaError::dimension("attention block backward", "a cached forward pass", "none"))?;
        let batch = cache.queries.nrows();
        let seq_len = cache.seq_len;
        if grad_output.dim() != (batch, self.d_model) {
            return Err(TalariaError::dimension(
                "attention block output gradient",
                format!("{:?}", (batch, self.d_model)),
                format!("{:?}", grad_output.dim()),
            ));
        }

        // Feed-forward branch
        let feedforward_gate = self.feedforward_gate.value.mapv(sigmoid);
        self.feedforward_gate.grad += &gate_gradient(grad_output, cache.feedforward.view(), &feedforward_gate);
        let grad_ff = &grad_output * &feedforward_gate;
        let grad_ff_hidden = self.feedforward_out.backward_batch(grad_ff.view())?;
        let grad_normed_hidden = self.feedforward_in.backward_batch(grad_ff_hidden.view())?;
        let grad_hidden = &grad_output + &self.norm_feedforward.backward_batch(grad_normed_hidden.view())?;

        // Attention branch
        let attention_gate = self.attention_gate.value.mapv(sigmoid);
        self.attention_gate.grad += &gate_gradient(grad_hidden.view(), cache.attended.view(), &attention_gate);
        let grad_attended = &grad_hidden * &attention_gate;
        let grad_context = self.output.backward_batch(grad_attended.view())?;

        let head_dim = self.head_dim();
        let scale = 1.0 / (head_dim as f32).sqrt();
        let mut grad_queries = Array2::<f32>::zeros(cache.queries.raw_dim());
        let mut grad_keys = Array2::<f32>::zeros(cache.keys.raw_dim());
        let mut grad_values = Array2::<f32>::zeros(cache.values.raw_dim());
        for b in 0..batch {
            let rows = b * seq_len..(b + 1) * seq_len;
            for h in 0..self.n_heads {
                let cols = h * head_dim..(h + 1) * head_dim;
                let q = cache.queries.slice(s![b, cols.clone()]);
                let k = cache.keys.slice(s![rows.clone(), cols.clone()]);
                let v = cache.values.slice(s![rows.clone(), cols.clone()]);
                let p = cache.weights.slice(s![b, h, ..]);
                let d_ctx = grad_context.slice(s![b, cols.clone()]);

                let d_p = v.dot(&d_ctx);
                grad_values
                    .slice_mut(s![rows.clone(), cols.clone()])
                    .assign(&outer(p, d_ctx));

                // softmax backward: ds = p * (dp - <p, dp>)
                let d_scores = &p * &(&d_p - p.dot(&d_p)) * scale;
                grad_queries.slice_mut(s![b, cols.clone()]).assign(&k.t().dot(&d_scores));
                grad_keys.slice_mut(s![rows.clone(), cols]).assign(&outer(d_scores.view(), q));
            }
        }

        let mut grad_normed = self.key.backward_batch(grad_keys.view())?;
        grad_normed += &self.value.backward_batch(grad_values.view())?;
        let grad_last_rows = self.query.backward_batch(grad_queries.view())?;
        for b in 0..batch {
            let mut row = grad_normed.row_mut(b * seq_len + seq_len - 1);
            row += &grad_last_rows.row(b);
        }

        let grad_inputs = self.norm_attention.backward_batch(grad_normed.view())?;
        let mut grad_inputs = unflatten_sequence(grad_inputs, batch, seq_len)?;
        let mut last = grad_inputs.slice_mut(s![.., seq_len - 1, ..]);
        last += &grad_hidden;
        Ok(grad_inputs)
    }
}

fn last_positions(rows: ArrayView2<f32>, batch: usize, seq_len: usize) -> Array2<f32> {
    let indices: Vec<usize> = (0..batch).map(|b| b * seq_len + seq_len - 1).collect();
    rows.select(Axis(0), &indices)
}

fn softmax(scores: &Array1<f32>) -> Array1<f32> {
    let max = scores.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let exp = scores.mapv(|v| (v - max).exp());
    let total = exp.sum();
    exp / total
}

fn outer(a: ArrayView1<f32>, b: ArrayView1<f32>) -> Array2<f32> {
    a.insert_axis(Axis(1)).dot(&b.insert_axis(Axis(0)))
}

/// d/dg of `sigmoid(g) * branch`, summed over the batch.
fn gate_gradient(grad: ArrayView2<f32>, branch: ArrayView2<f32>, gate: &Array1<f32>) -> Array1<f32> {
    let summed = (&grad * &branch).sum_axis(Axis(0));
    Zip::from(&summed).and(gate).map_collect(|&g, &s| g * s * (1.0 - s))
}

impl Module for StableTransformerLayer {
    fn params(&self) -> Vec<ArrayViewD<'_, f32>> {
        let mut params = self.norm_attention.params();
        params.extend(self.query.params());
        params.extend(self.key.params());
        params.extend(self.value.params());
        params.extend(self.output.params());
        params.push(self.attention_gate.view());
        params.extend(self.norm_feedforward.params());
        params.extend(self.feedforward_in.params());
        params.extend(self.feedforward_out.params());
        params.push(self.feedforward_gate.view());
        params
    }

    fn params_mut(&mut self) -> Vec<ParamMut<'_>> {
        let mut params = self.norm_attention.params_mut();
        params.extend(self.query.params_mut());
        params.extend(self.key.params_mut());
        params.extend(self.value.params_mut());
        params.extend(self.output.params_mut());
        params.push(self.attention_gate.view_mut());
        params.extend(self.norm_feedforward.params_mut());
        params.extend(self.feedforward_in.params_mut());
        params.extend(self.feedforward_out.params_mut());
        params.push(self.feedforward_gate.view_mut());
        params
    }
}
