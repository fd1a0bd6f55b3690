use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

use crate::error::{Result, TalariaError};

/// Outcome of one environment step.
#[derive(Debug, Clone)]
pub struct EnvStep {
    pub next_state: Array1<f32>,
    pub reward: f32,
    pub done: bool,
}

/// A continuous-control task with actions in [-1, 1].
pub trait Environment {
    fn reset(&mut self) -> Result<Array1<f32>>;

    fn step(&mut self, action: ArrayView1<f32>) -> Result<EnvStep>;

    fn state_dim(&self) -> usize;

    fn action_dim(&self) -> usize;
}

/// The last `window` observations, oldest first, zero-padded at the front
/// until enough steps have been seen.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    window: usize,
    state_dim: usize,
    observations: VecDeque<Array1<f32>>,
}

impl HistoryWindow {
    pub fn new(window: usize, state_dim: usize) -> Self {
        HistoryWindow {
            window: window.max(1),
            state_dim,
            observations: VecDeque::with_capacity(window.max(1)),
        }
    }

    /// Start a new episode from its first observation.
    pub fn reset(&mut self, observation: Array1<f32>) -> Result<()> {
        self.observations.clear();
        self.push(observation)
    }

    pub fn push(&mut self, observation: Array1<f32>) -> Result<()> {
        if observation.len() != self.state_dim {
            return Err(TalariaError::dimension("observation", self.state_dim, observation.len()));
        }
        if self.observations.len() == self.window {
            self.observations.pop_front();
        }
        self.observations.push_back(observation);
        Ok(())
    }

    /// `(window, state_dim)` matrix of the current history.
    pub fn state(&self) -> Array2<f32> {
        let mut state = Array2::zeros((self.window, self.state_dim));
        let offset = self.window - self.observations.len();
        for (i, observation) in self.observations.iter().enumerate() {
            state.row_mut(offset + i).assign(observation);
        }
        state
    }
}

/// Drive a point on a line towards a target. Small, deterministic for a given
/// seed and solvable in a few hundred updates, which makes it a convenient
/// smoke test for every encoder.
///
/// State: `[position, target - position]`. Action: velocity in [-1, 1].
/// Reward: `-|target - position|`, plus 1 on reaching the target.
#[derive(Debug, Clone)]
pub struct ReachTarget {
    pub max_steps: usize,
    position: f32,
    target: f32,
    steps: usize,
    rng: StdRng,
}

impl ReachTarget {
    pub fn new(seed: u64) -> Self {
        ReachTarget {
            max_steps: 50,
            position: 0.0,
            target: 0.5,
            steps: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn observation(&self) -> Array1<f32> {
        Array1::from(vec![self.position, self.target - self.position])
    }
}

impl Environment for ReachTarget {
    fn reset(&mut self) -> Result<Array1<f32>> {
        self.position = self.rng.gen_range(-1.0..1.0);
        self.target = self.rng.gen_range(-0.5..0.5);
        self.steps = 0;
        Ok(self.observation())
    }

    fn step(&mut self, action: ArrayView1<f32>) -> Result<EnvStep> {
        if action.len() != 1 {
            return Err(TalariaError::dimension("reach-target action", 1, action.len()));
        }
        self.steps += 1;
        self.position = (self.position + 0.1 * action[0].clamp(-1.0, 1.0)).clamp(-1.5, 1.5);
        let distance = (self.target - self.position).abs();
        let reached = distance < 0.05;
        let reward = -distance + if reached { 1.0 } else { 0.0 };
        Ok(EnvStep {
            next_state: self.observation(),
            reward,
            done: reached || self.steps >= self.max_steps,
        })
    }

    fn state_dim(&self) -> usize {
        2
    }

    fn action_dim(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_history_is_zero_padded_oldest_first() {
        let mut history = HistoryWindow::new(3, 2);
        history.reset(array![1.0f32, 1.0]).unwrap();
        history.push(array![2.0f32, 2.0]).unwrap();
        assert_eq!(history.state(), array![[0.0f32, 0.0], [1.0, 1.0], [2.0, 2.0]]);

        history.push(array![3.0f32, 3.0]).unwrap();
        history.push(array![4.0f32, 4.0]).unwrap();
        assert_eq!(history.state(), array![[2.0f32, 2.0], [3.0, 3.0], [4.0, 4.0]]);
    }

    #[test]
    fn test_history_rejects_wrong_width() {
        let mut history = HistoryWindow::new(2, 3);
        assert!(history.push(array![1.0f32]).is_err());
    }

    #[test]
    fn test_reach_target_terminates() {
        let mut env = ReachTarget::new(0);
        env.reset().unwrap();
        let mut done = false;
        for _ in 0..env.max_steps {
            done = env.step(array![0.0f32].view()).unwrap().done;
            if done {
                break;
            }
        }
        assert!(done);
    }
}
