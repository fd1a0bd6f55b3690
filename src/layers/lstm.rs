use ndarray::{s, Array1, Array2, Array3, ArrayView2, ArrayView3, ArrayViewD, Axis, Ix1, Ix2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::sigmoid;
use crate::error::{Result, TalariaError};
use super::traits::{Module, Param, ParamMut};

/// LSTM (Long Short-Term Memory) layer used as a sequence encoder.
///
/// Every forward pass starts from zero hidden and cell states and returns the
/// hidden state after the last time step, so a window of observations is
/// summarised into a single `(batch, hidden_size)` embedding.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LstmLayer {
    pub input_size: usize,
    pub hidden_size: usize,

    // Input gate
    pub w_ii: Param<Ix2>,
    pub w_hi: Param<Ix2>,
    pub b_i: Param<Ix1>,

    // Forget gate
    pub w_if: Param<Ix2>,
    pub w_hf: Param<Ix2>,
    pub b_f: Param<Ix1>,

    // Cell gate (candidate values)
    pub w_ig: Param<Ix2>,
    pub w_hg: Param<Ix2>,
    pub b_g: Param<Ix1>,

    // Output gate
    pub w_io: Param<Ix2>,
    pub w_ho: Param<Ix2>,
    pub b_o: Param<Ix1>,

    #[serde(skip)]
    cache: Option<LstmCache>,
}

#[derive(Clone, Debug)]
struct LstmCache {
    inputs: Array3<f32>,
    hidden_states: Vec<Array2<f32>>,
    cell_states: Vec<Array2<f32>>,
    input_gates: Vec<Array2<f32>>,
    forget_gates: Vec<Array2<f32>>,
    cell_gates: Vec<Array2<f32>>,
    output_gates: Vec<Array2<f32>>,
}

impl LstmLayer {
    pub fn new<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let scale = (1.0 / (input_size + hidden_size).max(1) as f32).sqrt();
        let mut matrix = |rows: usize| {
            Param::new(Array2::random_using((rows, hidden_size), Uniform::new(-scale, scale), &mut *rng))
        };

        let w_ii = matrix(input_size);
        let w_hi = matrix(hidden_size);
        let w_if = matrix(input_size);
        let w_hf = matrix(hidden_size);
        let w_ig = matrix(input_size);
        let w_hg = matrix(hidden_size);
        let w_io = matrix(input_size);
        let w_ho = matrix(hidden_size);

        Self {
            input_size,
            hidden_size,
            w_ii,
            w_hi,
            b_i: Param::new(Array1::zeros(hidden_size)),
            w_if,
            w_hf,
            // Forget gate bias of 1 keeps early gradients flowing through the cell
            b_f: Param::new(Array1::ones(hidden_size)),
            w_ig,
            w_hg,
            b_g: Param::new(Array1::zeros(hidden_size)),
            w_io,
            w_ho,
            b_o: Param::new(Array1::zeros(hidden_size)),
            cache: None,
        }
    }

    /// Run the sequence `(batch, seq_len, input_size)` and return the last hidden state.
    pub fn forward_sequence(&mut self, input: ArrayView3<f32>) -> Result<Array2<f32>> {
        let (batch_size, seq_len, features) = input.dim();
        if features != self.input_size {
            return Err(TalariaError::dimension("lstm input features", self.input_size, features));
        }
        if seq_len == 0 {
            return Err(TalariaError::dimension("lstm sequence length", "at least 1", 0));
        }

        let mut h_t = Array2::<f32>::zeros((batch_size, self.hidden_size));
        let mut c_t = Array2::<f32>::zeros((batch_size, self.hidden_size));

        let mut hidden_states = Vec::with_capacity(seq_len + 1);
        let mut cell_states = Vec::with_capacity(seq_len + 1);
        let mut input_gates = Vec::with_capacity(seq_len);
        let mut forget_gates = Vec::with_capacity(seq_len);
        let mut cell_gates = Vec::with_capacity(seq_len);
        let mut output_gates = Vec::with_capacity(seq_len);

        hidden_states.push(h_t.clone());
        cell_states.push(c_t.clone());

        for t in 0..seq_len {
            let x_t = input.slice(s![.., t, ..]);

            let i_t = (x_t.dot(&self.w_ii.value) + h_t.dot(&self.w_hi.value) + &self.b_i.value).mapv(sigmoid);
            let f_t = (x_t.dot(&self.w_if.value) + h_t.dot(&self.w_hf.value) + &self.b_f.value).mapv(sigmoid);
            let g_t = (x_t.dot(&self.w_ig.value) + h_t.dot(&self.w_hg.value) + &self.b_g.value).mapv(f32::tanh);
            let o_t = (x_t.dot(&self.w_io.value) + h_t.dot(&self.w_ho.value) + &self.b_o.value).mapv(sigmoid);

            // c_t = f_t * c_{t-1} + i_t * g_t
            c_t = &f_t * &c_t + &i_t * &g_t;
            // h_t = o_t * tanh(c_t)
            h_t = &o_t * &c_t.mapv(f32::tanh);

            hidden_states.push(h_t.clone());
            cell_states.push(c_t.clone());
            input_gates.push(i_t);
            forget_gates.push(f_t);
            cell_gates.push(g_t);
            output_gates.push(o_t);
        }

        self.cache = Some(LstmCache {
            inputs: input.to_owned(),
            hidden_states,
            cell_states,
            input_gates,
            forget_gates,
            cell_gates,
            output_gates,
        });

        Ok(h_t)
    }

    /// Backpropagation through time from a gradient on the final hidden state.
    ///
    /// Accumulates every gate's parameter gradients and returns the gradient
    /// w.r.t. the input sequence.
    pub fn backward_sequence(&mut self, grad_last_hidden: ArrayView2<f32>) -> Result<Array3<f32>> {
        let cache = self
            .cache
            .as_ref()
            .ok_or_else(|| TalariaError::dimension("lstm backward", "a cached forward pass", "none"))?;
        let (batch_size, seq_len, _) = cache.inputs.dim();
        if grad_last_hidden.dim() != (batch_size, self.hidden_size) {
            return Err(TalariaError::dimension(
                "lstm hidden gradient",
                format!("{:?}", (batch_size, self.hidden_size)),
                format!("{:?}", grad_last_hidden.dim()),
            ));
        }

        let mut dx = Array3::<f32>::zeros((batch_size, seq_len, self.input_size));
        let mut dh_next = grad_last_hidden.to_owned();
        let mut dc_next = Array2::<f32>::zeros((batch_size, self.hidden_size));

        for t in (0..seq_len).rev() {
            let dh = &dh_next;
            let x_t = cache.inputs.slice(s![.., t, ..]);
            let h_prev = &cache.hidden_states[t];
            let c_t = &cache.cell_states[t + 1];
            let c_prev = &cache.cell_states[t];

            let i_t = &cache.input_gates[t];
            let f_t = &cache.forget_gates[t];
            let g_t = &cache.cell_gates[t];
            let o_t = &cache.output_gates[t];

            let tanh_c_t = c_t.mapv(f32::tanh);
            let do_t = dh * &tanh_c_t;
            let dc = dh * o_t * &tanh_c_t.mapv(|v| 1.0 - v * v) + &dc_next;

            let di_gate = &dc * g_t * &i_t.mapv(|v| v * (1.0 - v));
            let df_gate = &dc * c_prev * &f_t.mapv(|v| v * (1.0 - v));
            let dg_gate = &dc * i_t * &g_t.mapv(|v| 1.0 - v * v);
            let do_gate = do_t * &o_t.mapv(|v| v * (1.0 - v));
            dc_next = &dc * f_t;

            self.w_ii.grad += &x_t.t().dot(&di_gate);
            self.w_hi.grad += &h_prev.t().dot(&di_gate);
            self.b_i.grad += &di_gate.sum_axis(Axis(0));

            self.w_if.grad += &x_t.t().dot(&df_gate);
            self.w_hf.grad += &h_prev.t().dot(&df_gate);
            self.b_f.grad += &df_gate.sum_axis(Axis(0));

            self.w_ig.grad += &x_t.t().dot(&dg_gate);
            self.w_hg.grad += &h_prev.t().dot(&dg_gate);
            self.b_g.grad += &dg_gate.sum_axis(Axis(0));

            self.w_io.grad += &x_t.t().dot(&do_gate);
            self.w_ho.grad += &h_prev.t().dot(&do_gate);
            self.b_o.grad += &do_gate.sum_axis(Axis(0));

            let dx_t = di_gate.dot(&self.w_ii.value.t())
                + df_gate.dot(&self.w_if.value.t())
                + dg_gate.dot(&self.w_ig.value.t())
                + do_gate.dot(&self.w_io.value.t());
            dx.slice_mut(s![.., t, ..]).assign(&dx_t);

            dh_next = di_gate.dot(&self.w_hi.value.t())
                + df_gate.dot(&self.w_hf.value.t())
                + dg_gate.dot(&self.w_hg.value.t())
                + do_gate.dot(&self.w_ho.value.t());
        }

        Ok(dx)
    }
}

impl Module for LstmLayer {
    fn params(&self) -> Vec<ArrayViewD<'_, f32>> {
        vec![
            self.w_ii.view(), self.w_hi.view(), self.b_i.view(),
            self.w_if.view(), self.w_hf.view(), self.b_f.view(),
            self.w_ig.view(), self.w_hg.view(), self.b_g.view(),
            self.w_io.view(), self.w_ho.view(), self.b_o.view(),
        ]
    }

    fn params_mut(&mut self) -> Vec<ParamMut<'_>> {
        vec![
            self.w_ii.view_mut(), self.w_hi.view_mut(), self.b_i.view_mut(),
            self.w_if.view_mut(), self.w_hf.view_mut(), self.b_f.view_mut(),
            self.w_ig.view_mut(), self.w_hg.view_mut(), self.b_g.view_mut(),
            self.w_io.view_mut(), self.w_ho.view_mut(), self.b_o.view_mut(),
        ]
    }
}
