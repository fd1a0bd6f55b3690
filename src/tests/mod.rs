// Test modules for all components
pub mod test_activations;
pub mod test_agent;
pub mod test_edge_cases;
pub mod test_optimizer;

use ndarray::Array3;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::layers::PositionalKind;
use crate::networks::{EncoderConfig, NetworkConfig};

/// Networks small enough to train and finite-difference in a unit test.
pub(crate) fn tiny_network(kind: &str) -> NetworkConfig {
    let encoder = match kind {
        "lstm" => EncoderConfig::Recurrent { d_model: 6, seq_len: 4 },
        "trsf" => EncoderConfig::Attention {
            d_model: 8,
            n_heads: 2,
            dim_feedforward: 12,
            seq_len: 4,
            positional: PositionalKind::Learned,
        },
        _ => EncoderConfig::Flat { hidden_sizes: vec![12], d_model: 8 },
    };
    let mut config = NetworkConfig::mlp();
    config.actor_encoder = encoder.clone();
    config.critic_encoder = encoder;
    config.critic_hidden = 10;
    config
}

pub(crate) fn random_states(batch: usize, window: usize, state_dim: usize, seed: u64) -> Array3<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array3::random_using((batch, window, state_dim), Uniform::new(-1.0f32, 1.0), &mut rng)
}
