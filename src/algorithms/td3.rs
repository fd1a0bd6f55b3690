use ndarray::{Array1, Array2, ArrayView2, ArrayView3, Axis, Zip};
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Normal;

use crate::debug::{ensure_finite_gradients, ensure_finite_loss};
use crate::error::{Result, TalariaError};
use crate::layers::Module;
use crate::networks::{Actor, Critic};
use crate::optimizer::{GradientClipper, Optimizer, OptimizerWrapper};
use crate::replay_buffer::{Batch, ReplayBuffer, Transition};
use super::config::Td3Config;
use super::target::soft_update;

/// Losses from one call to [`Td3Agent::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReport {
    pub critic_1_loss: f32,
    pub critic_2_loss: f32,
    /// Present only on the delayed actor steps
    pub actor_loss: Option<f32>,
    /// Mean online Q1 over the sampled batch
    pub mean_q: f32,
}

/// Twin Delayed Deep Deterministic Policy Gradient (TD3) Agent
///
/// Twin critics with a clipped double-Q target, target policy smoothing, and
/// an actor that moves only once every `policy_delay` critic updates. Each
/// online network has a target copy that is changed only by soft updates.
pub struct Td3Agent {
    pub config: Td3Config,
    pub train_actor: Actor,
    pub target_actor: Actor,
    pub train_critic_1: Critic,
    pub train_critic_2: Critic,
    pub target_critic_1: Critic,
    pub target_critic_2: Critic,
    actor_optimizer: OptimizerWrapper,
    critic_1_optimizer: OptimizerWrapper,
    critic_2_optimizer: OptimizerWrapper,
    memory: ReplayBuffer,
    rng: StdRng,
    update_count: usize,
    total_steps: usize,
}

impl Td3Agent {
    pub fn new(config: Td3Config) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let train_actor = Actor::new(config.state_dim, config.action_dim, &config.network, &mut rng)?;
        let train_critic_1 = Critic::new(config.state_dim, config.action_dim, &config.network, &mut rng)?;
        let train_critic_2 = Critic::new(config.state_dim, config.action_dim, &config.network, &mut rng)?;

        log::info!(
            "TD3 agent: {} encoder, window {}, {} actor / {} critic parameters{}",
            config.network.label(),
            config.network.window(),
            train_actor.num_params(),
            train_critic_1.num_params(),
            if train_actor.is_stochastic() { ", stochastic actor" } else { "" }
        );

        Ok(Td3Agent {
            target_actor: train_actor.clone(),
            target_critic_1: train_critic_1.clone(),
            target_critic_2: train_critic_2.clone(),
            train_actor,
            train_critic_1,
            train_critic_2,
            actor_optimizer: config.optimizer.build(),
            critic_1_optimizer: config.optimizer.build(),
            critic_2_optimizer: config.optimizer.build(),
            memory: ReplayBuffer::new(config.buffer_capacity),
            rng,
            update_count: 0,
            total_steps: 0,
            config,
        })
    }

    /// Select an action for one `(window, state_dim)` observation history.
    ///
    /// With `explore`, a deterministic actor adds clipped Gaussian noise and a
    /// stochastic actor samples; the result is always inside [-1, 1].
    pub fn act(&mut self, state: ArrayView2<f32>, explore: bool) -> Result<Array1<f32>> {
        if state.ncols() != self.config.state_dim {
            return Err(TalariaError::dimension("act state", self.config.state_dim, state.ncols()));
        }
        let output = self.train_actor.forward(state.insert_axis(Axis(0)), explore, &mut self.rng)?;
        let mut action = output.actions.row(0).to_owned();

        if explore && !self.train_actor.is_stochastic() {
            let noise = self.clipped_noise(
                (1, self.config.action_dim),
                self.config.explore_noise,
                self.config.explore_noise_clip,
            )?;
            action += &noise.row(0);
        }
        action.mapv_inplace(|a| a.clamp(-1.0, 1.0));
        Ok(action)
    }

    /// Append a transition after checking its shapes.
    pub fn store(&mut self, transition: Transition) -> Result<()> {
        let expected = (self.config.network.window(), self.config.state_dim);
        if transition.state.dim() != expected {
            return Err(TalariaError::dimension(
                "transition state",
                format!("{:?}", expected),
                format!("{:?}", transition.state.dim()),
            ));
        }
        if transition.next_state.dim() != expected {
            return Err(TalariaError::dimension(
                "transition next_state",
                format!("{:?}", expected),
                format!("{:?}", transition.next_state.dim()),
            ));
        }
        if transition.action.len() != self.config.action_dim {
            return Err(TalariaError::dimension("transition action", self.config.action_dim, transition.action.len()));
        }
        self.memory.store(transition);
        Ok(())
    }

    /// Store a transition and run the scheduled updates once warm.
    pub fn step(&mut self, transition: Transition) -> Result<Option<UpdateReport>> {
        self.store(transition)?;
        self.total_steps += 1;

        let warm = self.total_steps >= self.config.learning_starts && self.memory.len() >= self.config.batch_size;
        if !warm || self.total_steps % self.config.update_every != 0 {
            return Ok(None);
        }
        let mut report = None;
        for _ in 0..self.config.updates_per_step {
            report = Some(self.update()?);
        }
        Ok(report)
    }

    /// One TD3 gradient step on a sampled mini-batch.
    pub fn update(&mut self) -> Result<UpdateReport> {
        let batch = self.memory.sample_batch(self.config.batch_size, &mut self.rng)?;
        let targets = self.td_targets(&batch)?;

        let (critic_1_loss, mean_q) = optimise_critic(
            &mut self.train_critic_1,
            &mut self.critic_1_optimizer,
            &self.config.gradient_clipper,
            self.config.critic_lr,
            &batch,
            &targets,
            "critic_1",
        )?;
        let (critic_2_loss, _) = optimise_critic(
            &mut self.train_critic_2,
            &mut self.critic_2_optimizer,
            &self.config.gradient_clipper,
            self.config.critic_lr,
            &batch,
            &targets,
            "critic_2",
        )?;
        soft_update(&mut self.target_critic_1, &self.train_critic_1, self.config.tau)?;
        soft_update(&mut self.target_critic_2, &self.train_critic_2, self.config.tau)?;

        self.update_count += 1;
        let actor_loss = if self.update_count % self.config.policy_delay == 0 {
            let loss = self.optimise_actor(&batch)?;
            soft_update(&mut self.target_actor, &self.train_actor, self.config.tau)?;
            Some(loss)
        } else {
            None
        };

        log::debug!(
            "update {}: critic losses {:.4} / {:.4}, mean Q {:.3}, actor loss {:?}",
            self.update_count, critic_1_loss, critic_2_loss, mean_q, actor_loss
        );

        Ok(UpdateReport {
            critic_1_loss,
            critic_2_loss,
            actor_loss,
            mean_q,
        })
    }

    /// `y = r + gamma * (1 - done) * min(Q1'(s', a'), Q2'(s', a'))` with the
    /// smoothed target action `a' = clamp(pi'(s') + clip(noise), -1, 1)`.
    pub fn td_targets(&mut self, batch: &Batch) -> Result<Array2<f32>> {
        let next_actions = self.target_actor.forward(batch.next_states.view(), false, &mut self.rng)?.actions;
        let noise = self.clipped_noise(next_actions.dim(), self.config.policy_noise, self.config.noise_clip)?;
        let smoothed = (next_actions + noise).mapv(|a| a.clamp(-1.0, 1.0));

        let min_q = self.twin_target_q(batch.next_states.view(), smoothed.view())?;
        Ok(td_target(batch.rewards.view(), batch.dones.view(), min_q.view(), self.config.gamma))
    }

    /// Elementwise minimum of the two target critics.
    pub fn twin_target_q(&mut self, next_states: ArrayView3<f32>, next_actions: ArrayView2<f32>) -> Result<Array2<f32>> {
        let q1 = self.target_critic_1.forward(next_states, next_actions)?;
        let q2 = self.target_critic_2.forward(next_states, next_actions)?;
        Ok(Zip::from(&q1).and(&q2).map_collect(|&a, &b| a.min(b)))
    }

    fn optimise_actor(&mut self, batch: &Batch) -> Result<f32> {
        let batch_size = batch.len() as f32;
        self.train_actor.zero_grad();
        let output = self.train_actor.forward(batch.states.view(), true, &mut self.rng)?;
        let q = self.train_critic_1.forward(batch.states.view(), output.actions.view())?;

        let mut loss = -q.mean().unwrap_or(0.0);
        let grad_entropy = match &output.entropy {
            Some(entropy) => {
                loss -= self.config.entropy_coef * entropy.mean().unwrap_or(0.0);
                Some(Array2::from_elem(entropy.raw_dim(), -self.config.entropy_coef / batch_size))
            }
            None => None,
        };
        ensure_finite_loss("actor", loss)?;

        // The critic is only a path for dL/da here; its gradients are discarded.
        let grad_q = Array2::from_elem(q.raw_dim(), -1.0 / batch_size);
        let grad_actions = self.train_critic_1.backward(grad_q.view())?;
        self.train_critic_1.zero_grad();

        self.train_actor.backward(grad_actions.view(), grad_entropy.as_ref().map(|g| g.view()))?;
        ensure_finite_gradients("actor", &mut self.train_actor)?;
        let mut params = self.train_actor.params_mut();
        self.config.gradient_clipper.clip(&mut params);
        self.actor_optimizer.step(params, self.config.actor_lr);
        Ok(loss)
    }

    fn clipped_noise(&mut self, shape: (usize, usize), std: f32, clip: f32) -> Result<Array2<f32>> {
        let normal = Normal::new(0.0f32, std)
            .map_err(|e| TalariaError::invalid_parameter("noise std".to_string(), e.to_string()))?;
        Ok(Array2::random_using(shape, normal, &mut self.rng).mapv(|n| n.clamp(-clip, clip)))
    }

    /// Copy the online networks into their targets, e.g. after loading a checkpoint.
    pub fn reset_targets(&mut self) {
        self.target_actor = self.train_actor.clone();
        self.target_critic_1 = self.train_critic_1.clone();
        self.target_critic_2 = self.train_critic_2.clone();
    }

    /// Owned read-copy of the online actor for rollouts outside the agent.
    pub fn actor_snapshot(&self) -> Actor {
        self.train_actor.clone()
    }

    pub fn memory(&self) -> &ReplayBuffer {
        &self.memory
    }

    pub fn update_count(&self) -> usize {
        self.update_count
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }
}

/// `r + gamma * (1 - done) * min_q`, all `(batch, 1)`.
pub fn td_target(rewards: ArrayView2<f32>, dones: ArrayView2<f32>, min_q: ArrayView2<f32>, gamma: f32) -> Array2<f32> {
    Zip::from(&rewards)
        .and(&dones)
        .and(&min_q)
        .map_collect(|&r, &d, &q| r + gamma * (1.0 - d) * q)
}

/// MSE step of one online critic towards fixed targets; returns `(loss, mean Q)`.
fn optimise_critic(
    critic: &mut Critic,
    optimizer: &mut OptimizerWrapper,
    clipper: &GradientClipper,
    learning_rate: f32,
    batch: &Batch,
    targets: &Array2<f32>,
    name: &str,
) -> Result<(f32, f32)> {
    critic.zero_grad();
    let q = critic.forward(batch.states.view(), batch.actions.view())?;
    let diff = &q - targets;
    let batch_size = batch.len() as f32;
    let loss = diff.mapv(|d| d * d).sum() / batch_size;
    ensure_finite_loss(name, loss)?;

    critic.backward((diff * (2.0 / batch_size)).view())?;
    ensure_finite_gradients(name, critic)?;
    let mut params = critic.params_mut();
    clipper.clip(&mut params);
    optimizer.step(params, learning_rate);
    Ok((loss, q.mean().unwrap_or(0.0)))
}
