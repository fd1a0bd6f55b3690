//! Actor and critic networks built on a shared state-encoder abstraction.

pub mod actor;
pub mod critic;
pub mod encoder;

pub use actor::{Actor, ActorOutput};
pub use critic::Critic;
pub use encoder::{EncoderConfig, StateEncoder};

use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{Result, TalariaError};
use crate::layers::{DenseLayer, PositionalKind, WeightInit};

/// Architecture of the actor and both critics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub actor_encoder: EncoderConfig,
    pub critic_encoder: EncoderConfig,
    /// Width of the critic's PReLU layer after the state/action concatenation
    pub critic_hidden: usize,
    /// Constant the critic's output is multiplied by
    pub q_scale: f32,
    /// Output heads start uniform in `[-head_init, head_init]`
    pub head_init: f32,
    /// Tanh-Gaussian policy instead of a deterministic one
    pub stochastic: bool,
    pub log_std_min: f32,
    pub log_std_max: f32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::mlp()
    }
}

impl NetworkConfig {
    fn with_encoders(actor_encoder: EncoderConfig, critic_encoder: EncoderConfig) -> Self {
        NetworkConfig {
            actor_encoder,
            critic_encoder,
            critic_hidden: 128,
            q_scale: 10.0,
            head_init: 0.003,
            stochastic: false,
            log_std_min: -10.0,
            log_std_max: 2.0,
        }
    }

    pub fn mlp() -> Self {
        Self::with_encoders(EncoderConfig::default(), EncoderConfig::default())
    }

    pub fn lstm() -> Self {
        let encoder = EncoderConfig::Recurrent { d_model: 96, seq_len: 16 };
        Self::with_encoders(encoder.clone(), encoder)
    }

    /// Attention encoders: 96 wide, 4 heads, 16 steps; the critic gets the wider feed-forward.
    pub fn transformer() -> Self {
        let attention = |dim_feedforward| EncoderConfig::Attention {
            d_model: 96,
            n_heads: 4,
            dim_feedforward,
            seq_len: 16,
            positional: PositionalKind::Sinusoidal,
        };
        Self::with_encoders(attention(192), attention(256))
    }

    pub fn stochastic(mut self, stochastic: bool) -> Self {
        self.stochastic = stochastic;
        self
    }

    /// Observation window both encoders consume.
    pub fn window(&self) -> usize {
        self.actor_encoder.window()
    }

    /// Architecture name for checkpoint and score files.
    pub fn label(&self) -> &'static str {
        self.actor_encoder.label()
    }

    pub fn validate(&self) -> Result<()> {
        self.actor_encoder.validate()?;
        self.critic_encoder.validate()?;
        if self.actor_encoder.window() != self.critic_encoder.window() {
            return Err(TalariaError::invalid_parameter(
                "critic_encoder".to_string(),
                format!(
                    "window {} differs from the actor's window {}",
                    self.critic_encoder.window(),
                    self.actor_encoder.window()
                ),
            ));
        }
        if self.critic_hidden == 0 {
            return Err(TalariaError::invalid_parameter("critic_hidden", "must be positive"));
        }
        if !(self.q_scale.is_finite() && self.q_scale > 0.0) {
            return Err(TalariaError::invalid_parameter("q_scale", "must be a positive finite number"));
        }
        if !(self.head_init.is_finite() && self.head_init >= 0.0) {
            return Err(TalariaError::invalid_parameter("head_init", "must be a non-negative finite number"));
        }
        if !(self.log_std_min < self.log_std_max) {
            return Err(TalariaError::invalid_parameter("log_std_min", "must be below log_std_max"));
        }
        Ok(())
    }
}

/// Output layer with `U(-head_init, head_init)` weights and a zero bias.
pub(crate) fn output_head<R: Rng + ?Sized>(
    input_size: usize,
    output_size: usize,
    activation: Activation,
    head_init: f32,
    rng: &mut R,
) -> DenseLayer {
    let mut head = DenseLayer::with_init(
        input_size,
        output_size,
        activation,
        WeightInit::Uniform { min: -head_init, max: head_init },
        rng,
    );
    head.biases.value.fill(0.0);
    head
}
