use ndarray::{concatenate, s, Array2, ArrayView2, ArrayView3, ArrayViewD, Axis};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{Result, TalariaError};
use crate::layers::{DenseLayer, Module, PRelu, ParamMut, WeightInit};
use super::encoder::StateEncoder;
use super::{output_head, NetworkConfig};

/// Q(s, a): `encode(s) ++ a -> Linear -> PReLU -> Linear(1) * q_scale`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Critic {
    pub encoder: StateEncoder,
    pub hidden: DenseLayer,
    pub activation: PRelu,
    pub head: DenseLayer,
    pub q_scale: f32,
    pub state_dim: usize,
    pub action_dim: usize,
    d_model: usize,
}

impl Critic {
    pub fn new<R: Rng + ?Sized>(state_dim: usize, action_dim: usize, config: &NetworkConfig, rng: &mut R) -> Result<Self> {
        if action_dim == 0 {
            return Err(TalariaError::invalid_parameter("action_dim", "must be positive"));
        }
        let d_model = config.critic_encoder.d_model();
        let encoder = StateEncoder::new(&config.critic_encoder, state_dim, rng)?;
        let hidden = DenseLayer::with_init(
            d_model + action_dim,
            config.critic_hidden,
            Activation::Linear,
            WeightInit::XavierUniform { gain: Activation::Relu.gain() },
            rng,
        );
        let head = output_head(config.critic_hidden, 1, Activation::Linear, config.head_init, rng);

        Ok(Critic {
            encoder,
            hidden,
            activation: PRelu::new(config.critic_hidden),
            head,
            q_scale: config.q_scale,
            state_dim,
            action_dim,
            d_model,
        })
    }

    /// `states: (batch, window, state_dim)`, `actions: (batch, action_dim)` -> `(batch, 1)`.
    pub fn forward(&mut self, states: ArrayView3<f32>, actions: ArrayView2<f32>) -> Result<Array2<f32>> {
        let (batch, _, state_dim) = states.dim();
        if state_dim != self.state_dim {
            return Err(TalariaError::dimension("critic state", self.state_dim, state_dim));
        }
        if actions.dim() != (batch, self.action_dim) {
            return Err(TalariaError::dimension(
                "critic action",
                format!("{:?}", (batch, self.action_dim)),
                format!("{:?}", actions.dim()),
            ));
        }

        let embedding = self.encoder.forward(states)?;
        let joined = concatenate(Axis(1), &[embedding.view(), actions.view()])?;
        let hidden = self.hidden.forward_batch(joined.view())?;
        let activated = self.activation.forward_batch(hidden.view())?;
        Ok(self.head.forward_batch(activated.view())? * self.q_scale)
    }

    /// Backpropagate `dL/dQ`, accumulating parameter gradients; returns `dL/da`.
    pub fn backward(&mut self, grad_q: ArrayView2<f32>) -> Result<Array2<f32>> {
        let grad_head = &grad_q * self.q_scale;
        let grad_activated = self.head.backward_batch(grad_head.view())?;
        let grad_hidden = self.activation.backward_batch(grad_activated.view())?;
        let grad_joined = self.hidden.backward_batch(grad_hidden.view())?;

        self.encoder.backward(grad_joined.slice(s![.., ..self.d_model]))?;
        Ok(grad_joined.slice(s![.., self.d_model..]).to_owned())
    }
}

impl Module for Critic {
    fn params(&self) -> Vec<ArrayViewD<'_, f32>> {
        let mut params = self.encoder.params();
        params.extend(self.hidden.params());
        params.extend(self.activation.params());
        params.extend(self.head.params());
        params
    }

    fn params_mut(&mut self) -> Vec<ParamMut<'_>> {
        let mut params = self.encoder.params_mut();
        params.extend(self.hidden.params_mut());
        params.extend(self.activation.params_mut());
        params.extend(self.head.params_mut());
        params
    }
}
