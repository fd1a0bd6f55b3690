//! # Activation Functions Module
//!
//! Element-wise non-linearities used by the dense layers of the actor and
//! critic networks.
//!
//! - **ReLU**: `max(0, x)` - hidden layers of the flat encoder and the feed-forward block
//! - **Tanh**: bounded to (-1, 1) - the deterministic action head and the input embedding
//! - **Linear**: identity, for projection layers
//!
//! The gate non-linearity of the LSTM and of the transformer's residual gates
//! is the free function [`sigmoid`], applied directly by those layers.
//! The learnable-slope variant (PReLU) carries parameters and therefore lives in
//! [`crate::layers::PRelu`].

pub mod functions;

pub use functions::{sigmoid, Activation};
