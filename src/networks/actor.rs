use ndarray::{Array2, ArrayView2, ArrayView3, ArrayViewD, Axis, Zip};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{Result, TalariaError};
use crate::layers::{DenseLayer, Module, ParamMut};
use super::encoder::StateEncoder;
use super::{output_head, NetworkConfig};

/// Added inside the tanh log-Jacobian so saturated actions stay finite.
const TANH_EPSILON: f32 = 1e-6;

/// f32 `tanh` rounds to exactly ±1 past |x| ≈ 9; actions are kept inside this bound.
const ACTION_BOUND: f32 = 1.0 - f32::EPSILON;

/// Actions in (-1, 1), plus the per-sample entropy estimate `(batch, 1)` for a
/// stochastic policy.
#[derive(Debug, Clone)]
pub struct ActorOutput {
    pub actions: Array2<f32>,
    pub entropy: Option<Array2<f32>>,
}

#[derive(Debug, Clone)]
struct SampleCache {
    noise: Array2<f32>,
    std: Array2<f32>,
    actions: Array2<f32>,
    /// 1.0 where the raw log-std was inside the clamp range
    clamp_mask: Array2<f32>,
}

/// Policy network.
///
/// Deterministic: `tanh(Linear(encode(s)))`.
/// Stochastic: a tanh-squashed Gaussian with a state-dependent, clamped log-std,
/// sampled with the reparameterisation trick so gradients reach both heads.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Actor {
    pub encoder: StateEncoder,
    pub mean_head: DenseLayer,
    pub log_std_head: Option<DenseLayer>,
    pub log_std_min: f32,
    pub log_std_max: f32,
    pub state_dim: usize,
    pub action_dim: usize,
    #[serde(skip)]
    cache: Option<SampleCache>,
}

impl Actor {
    pub fn new<R: Rng + ?Sized>(state_dim: usize, action_dim: usize, config: &NetworkConfig, rng: &mut R) -> Result<Self> {
        if action_dim == 0 {
            return Err(TalariaError::invalid_parameter("action_dim", "must be positive"));
        }
        let d_model = config.actor_encoder.d_model();
        let encoder = StateEncoder::new(&config.actor_encoder, state_dim, rng)?;
        let (mean_head, log_std_head) = if config.stochastic {
            (
                output_head(d_model, action_dim, Activation::Linear, config.head_init, rng),
                Some(output_head(d_model, action_dim, Activation::Linear, config.head_init, rng)),
            )
        } else {
            (output_head(d_model, action_dim, Activation::Tanh, config.head_init, rng), None)
        };

        Ok(Actor {
            encoder,
            mean_head,
            log_std_head,
            log_std_min: config.log_std_min,
            log_std_max: config.log_std_max,
            state_dim,
            action_dim,
            cache: None,
        })
    }

    pub fn is_stochastic(&self) -> bool {
        self.log_std_head.is_some()
    }

    /// `states: (batch, window, state_dim)`. A stochastic actor samples when
    /// `explore` is set and uses its mean otherwise; a deterministic actor
    /// ignores `explore` (exploration noise is the agent's business).
    pub fn forward<R: Rng + ?Sized>(&mut self, states: ArrayView3<f32>, explore: bool, rng: &mut R) -> Result<ActorOutput> {
        let state_dim = states.dim().2;
        if state_dim != self.state_dim {
            return Err(TalariaError::dimension("actor state", self.state_dim, state_dim));
        }

        let embedding = self.encoder.forward(states)?;
        let means = self.mean_head.forward_batch(embedding.view())?;
        let log_std_head = match self.log_std_head.as_mut() {
            Some(head) => head,
            None => {
                let actions = means.mapv(|a| a.clamp(-ACTION_BOUND, ACTION_BOUND));
                return Ok(ActorOutput { actions, entropy: None });
            }
        };

        let raw_log_std = log_std_head.forward_batch(embedding.view())?;
        let (min, max) = (self.log_std_min, self.log_std_max);
        let clamp_mask = raw_log_std.mapv(|v| if v >= min && v <= max { 1.0 } else { 0.0 });
        let log_std = raw_log_std.mapv(|v| v.clamp(min, max));
        let std = log_std.mapv(f32::exp);
        let noise = if explore {
            Array2::<f32>::random_using(means.raw_dim(), StandardNormal, rng)
        } else {
            Array2::zeros(means.raw_dim())
        };

        let pre_tanh = &means + &(&std * &noise);
        let actions = pre_tanh.mapv(|x| x.tanh().clamp(-ACTION_BOUND, ACTION_BOUND));

        // log N(x; mu, sigma) with (x - mu) / sigma = noise, minus the tanh log-Jacobian
        let half_log_two_pi = 0.5 * (2.0 * std::f32::consts::PI).ln();
        let log_probs = Zip::from(&noise)
            .and(&log_std)
            .and(&actions)
            .map_collect(|&e, &ls, &a| -0.5 * e * e - ls - half_log_two_pi - (1.0 - a * a + TANH_EPSILON).ln());
        let entropy = (-log_probs.sum_axis(Axis(1))).insert_axis(Axis(1));

        self.cache = Some(SampleCache {
            noise,
            std,
            actions: actions.clone(),
            clamp_mask,
        });
        Ok(ActorOutput { actions, entropy: Some(entropy) })
    }

    /// Backpropagate `dL/da` (and `dL/d entropy` for a stochastic actor),
    /// accumulating gradients in every parameter.
    pub fn backward(&mut self, grad_actions: ArrayView2<f32>, grad_entropy: Option<ArrayView2<f32>>) -> Result<()> {
        let grad_embedding = match self.log_std_head.as_mut() {
            None => self.mean_head.backward_batch(grad_actions)?,
            Some(log_std_head) => {
                let cache = self
                    .cache
                    .as_ref()
                    .ok_or_else(|| TalariaError::dimension("actor backward", "a cached forward pass", "none"))?;
                if grad_actions.dim() != cache.actions.dim() {
                    return Err(TalariaError::dimension(
                        "actor action gradient",
                        format!("{:?}", cache.actions.dim()),
                        format!("{:?}", grad_actions.dim()),
                    ));
                }
                let batch = cache.actions.nrows();
                let grad_entropy = match grad_entropy {
                    Some(g) if g.dim() != (batch, 1) => {
                        return Err(TalariaError::dimension(
                            "actor entropy gradient",
                            format!("{:?}", (batch, 1)),
                            format!("{:?}", g.dim()),
                        ));
                    }
                    Some(g) => g.to_owned(),
                    None => Array2::zeros((batch, 1)),
                };

                // dE/dx = -2a(1 - a^2) / (1 - a^2 + eps), da/dx = 1 - a^2
                let grad_pre_tanh = Zip::from(&grad_actions)
                    .and(&cache.actions)
                    .and_broadcast(&grad_entropy)
                    .map_collect(|&g_a, &a, &g_e| {
                        let d_tanh = 1.0 - a * a;
                        g_a * d_tanh + g_e * (-2.0 * a * d_tanh / (d_tanh + TANH_EPSILON))
                    });
                // x = mu + exp(log_std) * noise and E contains +log_std directly
                let grad_log_std = Zip::from(&grad_pre_tanh)
                    .and(&cache.std)
                    .and(&cache.noise)
                    .and(&cache.clamp_mask)
                    .and_broadcast(&grad_entropy)
                    .map_collect(|&g_x, &std, &e, &mask, &g_e| (g_x * std * e + g_e) * mask);

                let mut grad_embedding = self.mean_head.backward_batch(grad_pre_tanh.view())?;
                grad_embedding += &log_std_head.backward_batch(grad_log_std.view())?;
                grad_embedding
            }
        };
        self.encoder.backward(grad_embedding.view())
    }
}

impl Module for Actor {
    fn params(&self) -> Vec<ArrayViewD<'_, f32>> {
        let mut params = self.encoder.params();
        params.extend(self.mean_head.params());
        if let Some(head) = &self.log_std_head {
            params.extend(head.params());
        }
        params
    }

    fn params_mut(&mut self) -> Vec<ParamMut<'_>> {
        let mut params = self.encoder.params_mut();
        params.extend(self.mean_head.params_mut());
        if let Some(head) = &mut self.log_std_head {
            params.extend(head.params_mut());
        }
        params
    }
}
