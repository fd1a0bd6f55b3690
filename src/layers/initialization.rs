use ndarray::{Array1, Array2};
use ndarray_rand::rand_distr::{StandardNormal, Uniform};
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activations::Activation;

/// Weight initialization strategies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WeightInit {
    /// Xavier/Glorot uniform initialization scaled by an activation gain
    XavierUniform { gain: f32 },

    /// He/Kaiming normal initialization (for ReLU)
    HeNormal,

    /// Uniform distribution with custom range
    Uniform { min: f32, max: f32 },

    /// Normal distribution with custom mean and std
    Normal { mean: f32, std: f32 },
}

impl WeightInit {
    /// Initialize a `(fan_in, fan_out)` weight matrix.
    pub fn initialize_weights<R: Rng + ?Sized>(&self, shape: (usize, usize), rng: &mut R) -> Array2<f32> {
        let (fan_in, fan_out) = shape;

        match *self {
            WeightInit::XavierUniform { gain } => {
                let limit = gain * (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
                uniform(shape, -limit, limit, rng)
            }

            WeightInit::HeNormal => {
                let std = (2.0 / fan_in.max(1) as f32).sqrt();
                Array2::<f32>::random_using(shape, StandardNormal, rng) * std
            }

            WeightInit::Uniform { min, max } => uniform(shape, min, max, rng),

            WeightInit::Normal { mean, std } => {
                Array2::<f32>::random_using(shape, StandardNormal, rng) * std + mean
            }
        }
    }

    /// Initialize a bias vector. Only the explicit distributions produce non-zero biases.
    pub fn initialize_biases<R: Rng + ?Sized>(&self, size: usize, rng: &mut R) -> Array1<f32> {
        match *self {
            WeightInit::Uniform { min, max } if min < max => {
                Array1::random_using(size, Uniform::new(min, max), rng)
            }
            _ => Array1::zeros(size),
        }
    }

    /// Get the recommended initialization for an activation function
    pub fn for_activation(activation: &Activation) -> Self {
        match activation {
            Activation::Relu => WeightInit::HeNormal,
            other => WeightInit::XavierUniform { gain: other.gain() },
        }
    }
}

fn uniform<R: Rng + ?Sized>(shape: (usize, usize), min: f32, max: f32, rng: &mut R) -> Array2<f32> {
    if min < max {
        Array2::random_using(shape, Uniform::new(min, max), rng)
    } else {
        Array2::from_elem(shape, min)
    }
}
