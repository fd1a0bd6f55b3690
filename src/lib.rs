//! # Talaria - TD3 for Bipedal Locomotion
//!
//! Talaria trains continuous-control agents with Twin Delayed Deep
//! Deterministic Policy Gradient (TD3). The actor and both critics share a
//! pluggable state encoder, so the same agent can read a single observation
//! through an MLP or a window of recent observations through an LSTM or a
//! gated attention block.
//!
//! ## Key Features
//!
//! - **TD3**: twin critics, target policy smoothing, delayed actor updates
//! - **Encoders**: MLP, LSTM and a stable single-block transformer
//! - **Policies**: deterministic tanh actor or tanh-Gaussian with entropy estimate
//! - **Layers**: hand-written forward and backward passes on `ndarray`
//! - **Persistence**: bincode checkpoints with best/last fallback, JSON configs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use talaria::algorithms::Td3Builder;
//! use talaria::environment::ReachTarget;
//! use talaria::networks::NetworkConfig;
//! use talaria::trainer::{Trainer, TrainerConfig};
//!
//! let mut env = ReachTarget::new(0);
//! let mut agent = Td3Builder::new(2, 1)
//!     .network(NetworkConfig::lstm())
//!     .learning_starts(500)
//!     .build()
//!     .unwrap();
//!
//! let mut trainer = Trainer::new(TrainerConfig::default());
//! trainer.train(&mut env, &mut agent).unwrap();
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - Activation functions (ReLU, Tanh, Linear)
//! - [`algorithms`] - The TD3 agent, its configuration and target updates
//! - [`checkpoint`] - Saving and restoring trained networks
//! - [`debug`] - NaN/Inf detection and finite-difference gradient checks
//! - [`environment`] - Environment trait and observation history window
//! - [`error`] - Error types and result handling
//! - [`layers`] - Dense, LayerNorm, PReLU, LSTM, positional and attention layers
//! - [`metrics`] - Episode score history
//! - [`networks`] - State encoders, actor and critic
//! - [`optimizer`] - SGD and Adam with gradient clipping
//! - [`replay_buffer`] - Experience replay
//! - [`trainer`] - Training and evaluation episode loops

pub mod activations;
pub mod algorithms;
pub mod checkpoint;
pub mod debug;
pub mod environment;
pub mod error;
pub mod layers;
pub mod metrics;
pub mod networks;
pub mod optimizer;
pub mod replay_buffer;
pub mod trainer;

#[cfg(test)]
mod tests;
