use serde::{Serialize, Deserialize};
use std::path::Path;

use crate::error::{Result, TalariaError};
use crate::networks::NetworkConfig;
use crate::optimizer::{GradientClipper, OptimizerKind};
use super::td3::Td3Agent;

/// Every hyperparameter of a TD3 run. Serializes to and from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Td3Config {
    pub state_dim: usize,
    pub action_dim: usize,
    pub network: NetworkConfig,
    /// Discount factor
    pub gamma: f32,
    /// Soft update coefficient
    pub tau: f32,
    pub actor_lr: f32,
    pub critic_lr: f32,
    pub batch_size: usize,
    pub buffer_capacity: usize,
    /// The actor and its target move once every `policy_delay` updates
    pub policy_delay: usize,
    /// Target policy smoothing noise
    pub policy_noise: f32,
    pub noise_clip: f32,
    /// Exploration noise added by `act`
    pub explore_noise: f32,
    pub explore_noise_clip: f32,
    /// Environment steps collected before the first update
    pub learning_starts: usize,
    pub update_every: usize,
    pub updates_per_step: usize,
    /// Weight of the entropy bonus in a stochastic actor's loss
    pub entropy_coef: f32,
    pub optimizer: OptimizerKind,
    pub gradient_clipper: GradientClipper,
    pub seed: u64,
}

impl Default for Td3Config {
    fn default() -> Self {
        Td3Config {
            state_dim: 24,
            action_dim: 4,
            network: NetworkConfig::default(),
            gamma: 0.99,
            tau: 0.005,
            actor_lr: 1e-4,
            critic_lr: 3e-4,
            batch_size: 100,
            buffer_capacity: 500_000,
            policy_delay: 2,
            policy_noise: 0.2,
            noise_clip: 0.5,
            explore_noise: 0.1,
            explore_noise_clip: 0.5,
            learning_starts: 10_000,
            update_every: 1,
            updates_per_step: 1,
            entropy_coef: 0.01,
            optimizer: OptimizerKind::default(),
            gradient_clipper: GradientClipper::None,
            seed: 0,
        }
    }
}

fn ensure(condition: bool, name: &str, reason: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(TalariaError::invalid_parameter(name, reason))
    }
}

impl Td3Config {
    pub fn validate(&self) -> Result<()> {
        ensure(self.state_dim > 0, "state_dim", "must be positive")?;
        ensure(self.action_dim > 0, "action_dim", "must be positive")?;
        ensure((0.0..=1.0).contains(&self.gamma), "gamma", "must lie in [0, 1]")?;
        ensure(self.tau > 0.0 && self.tau <= 1.0, "tau", "must lie in (0, 1]")?;
        ensure(self.actor_lr > 0.0 && self.actor_lr.is_finite(), "actor_lr", "must be positive")?;
        ensure(self.critic_lr > 0.0 && self.critic_lr.is_finite(), "critic_lr", "must be positive")?;
        ensure(self.batch_size > 0, "batch_size", "must be positive")?;
        ensure(
            self.buffer_capacity >= self.batch_size,
            "buffer_capacity",
            "must hold at least one batch",
        )?;
        ensure(self.policy_delay > 0, "policy_delay", "must be positive")?;
        ensure(self.policy_noise >= 0.0, "policy_noise", "must be non-negative")?;
        ensure(self.noise_clip >= 0.0, "noise_clip", "must be non-negative")?;
        ensure(self.explore_noise >= 0.0, "explore_noise", "must be non-negative")?;
        ensure(self.explore_noise_clip >= 0.0, "explore_noise_clip", "must be non-negative")?;
        ensure(self.update_every > 0, "update_every", "must be positive")?;
        ensure(self.updates_per_step > 0, "updates_per_step", "must be positive")?;
        ensure(self.entropy_coef >= 0.0, "entropy_coef", "must be non-negative")?;
        self.network.validate()
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Td3Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Builder for [`Td3Agent`]
pub struct Td3Builder {
    config: Td3Config,
}

impl Td3Builder {
    pub fn new(state_dim: usize, action_dim: usize) -> Self {
        Td3Builder {
            config: Td3Config {
                state_dim,
                action_dim,
                ..Td3Config::default()
            },
        }
    }

    pub fn network(mut self, network: NetworkConfig) -> Self {
        self.config.network = network;
        self
    }

    pub fn gamma(mut self, gamma: f32) -> Self {
        self.config.gamma = gamma;
        self
    }

    pub fn tau(mut self, tau: f32) -> Self {
        self.config.tau = tau;
        self
    }

    pub fn learning_rates(mut self, actor_lr: f32, critic_lr: f32) -> Self {
        self.config.actor_lr = actor_lr;
        self.config.critic_lr = critic_lr;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity;
        self
    }

    pub fn policy_delay(mut self, delay: usize) -> Self {
        self.config.policy_delay = delay;
        self
    }

    pub fn noise_params(mut self, policy_noise: f32, noise_clip: f32, explore_noise: f32) -> Self {
        self.config.policy_noise = policy_noise;
        self.config.noise_clip = noise_clip;
        self.config.explore_noise = explore_noise;
        self
    }

    pub fn learning_starts(mut self, steps: usize) -> Self {
        self.config.learning_starts = steps;
        self
    }

    pub fn update_schedule(mut self, update_every: usize, updates_per_step: usize) -> Self {
        self.config.update_every = update_every;
        self.config.updates_per_step = updates_per_step;
        self
    }

    pub fn entropy_coef(mut self, coef: f32) -> Self {
        self.config.entropy_coef = coef;
        self
    }

    pub fn optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.config.optimizer = optimizer;
        self
    }

    pub fn gradient_clipper(mut self, clipper: GradientClipper) -> Self {
        self.config.gradient_clipper = clipper;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn config(self) -> Td3Config {
        self.config
    }

    pub fn build(self) -> Result<Td3Agent> {
        Td3Agent::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Td3Config::default().validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = Td3Builder::new(8, 2)
            .gamma(0.95)
            .policy_delay(3)
            .batch_size(16)
            .config();
        assert_eq!(config.state_dim, 8);
        assert_eq!(config.gamma, 0.95);
        assert_eq!(config.policy_delay, 3);
        assert_eq!(config.tau, 0.005);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let config = Td3Builder::new(8, 2).tau(0.0).config();
        assert!(matches!(config.validate(), Err(TalariaError::InvalidParameter { .. })));

        let config = Td3Builder::new(8, 2).batch_size(64).buffer_capacity(10).config();
        assert!(config.validate().is_err());
    }
}
