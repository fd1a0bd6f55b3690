use ndarray::{stack, Array1, Array2, Array3, ArrayView1, Axis};
use rand::seq::index;
use rand::Rng;
use std::collections::VecDeque;

use crate::error::{Result, TalariaError};

/// One environment step. States are `(window, state_dim)` observation
/// histories; a flat encoder uses a window of one.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub state: Array2<f32>,
    pub action: Array1<f32>,
    pub reward: f32,
    pub next_state: Array2<f32>,
    pub done: bool,
}

impl Transition {
    /// Build a single-observation transition.
    pub fn flat(state: Array1<f32>, action: Array1<f32>, reward: f32, next_state: Array1<f32>, done: bool) -> Self {
        Transition {
            state: state.insert_axis(Axis(0)),
            action,
            reward,
            next_state: next_state.insert_axis(Axis(0)),
            done,
        }
    }
}

/// A sampled mini-batch, stacked along a leading batch axis.
#[derive(Clone, Debug)]
pub struct Batch {
    pub states: Array3<f32>,
    pub actions: Array2<f32>,
    pub rewards: Array2<f32>,
    pub next_states: Array3<f32>,
    /// 1.0 for terminal transitions
    pub dones: Array2<f32>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.actions.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed-capacity FIFO experience store with uniform sampling without replacement.
#[derive(Clone, Debug)]
pub struct ReplayBuffer {
    buffer: VecDeque<Transition>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        ReplayBuffer {
            buffer: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a transition, evicting the oldest one when full.
    pub fn store(&mut self, transition: Transition) {
        if self.capacity == 0 {
            return;
        }
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    /// Draw `batch_size` distinct transitions uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<Vec<&Transition>> {
        if batch_size > self.buffer.len() {
            return Err(TalariaError::InsufficientData {
                requested: batch_size,
                available: self.buffer.len(),
            });
        }
        Ok(index::sample(rng, self.buffer.len(), batch_size)
            .into_iter()
            .map(|i| &self.buffer[i])
            .collect())
    }

    /// Sample and stack into arrays ready for the networks.
    pub fn sample_batch<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<Batch> {
        let samples = self.sample(batch_size, rng)?;
        let states: Vec<_> = samples.iter().map(|t| t.state.view()).collect();
        let next_states: Vec<_> = samples.iter().map(|t| t.next_state.view()).collect();
        let actions: Vec<ArrayView1<f32>> = samples.iter().map(|t| t.action.view()).collect();

        Ok(Batch {
            states: stack(Axis(0), &states)?,
            actions: stack(Axis(0), &actions)?,
            rewards: Array2::from_shape_fn((samples.len(), 1), |(i, _)| samples[i].reward),
            next_states: stack(Axis(0), &next_states)?,
            dones: Array2::from_shape_fn((samples.len(), 1), |(i, _)| if samples[i].done { 1.0 } else { 0.0 }),
        })
    }

    /// Stored transitions, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
