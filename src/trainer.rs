use serde::{Serialize, Deserialize};

use crate::algorithms::Td3Agent;
use crate::checkpoint::{CheckpointStore, CheckpointTag};
use crate::environment::{Environment, HistoryWindow};
use crate::error::{Result, TalariaError};
use crate::metrics::ScoreHistory;
use crate::replay_buffer::Transition;

/// Episode loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub max_episodes: usize,
    pub max_steps_per_episode: usize,
    /// Episodes in the trailing mean used for best-model and stopping decisions
    pub score_window: usize,
    /// Stop once the trailing mean over a full window reaches this score
    pub target_score: Option<f32>,
    /// Save the `last` checkpoint every this many episodes (0 disables)
    pub checkpoint_every: usize,
    pub run_name: String,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            max_episodes: 2000,
            max_steps_per_episode: 2000,
            score_window: 100,
            target_score: Some(300.0),
            checkpoint_every: 100,
            run_name: "classic".to_string(),
        }
    }
}

/// Runs training and evaluation episodes against an [`Environment`].
pub struct Trainer {
    pub config: TrainerConfig,
    checkpoints: Option<CheckpointStore>,
    history: ScoreHistory,
    best_mean: Option<f32>,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Trainer {
            config,
            checkpoints: None,
            history: ScoreHistory::new(),
            best_mean: None,
        }
    }

    pub fn with_checkpoints(mut self, store: CheckpointStore) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn history(&self) -> &ScoreHistory {
        &self.history
    }

    /// Train until `max_episodes` or until the target score is reached.
    ///
    /// Any error aborts the run and is reported with the episode and step it
    /// happened at.
    pub fn train<E: Environment + ?Sized>(&mut self, env: &mut E, agent: &mut Td3Agent) -> Result<&ScoreHistory> {
        let window = agent.config.network.window();
        let mut history = HistoryWindow::new(window, env.state_dim());

        for episode in 1..=self.config.max_episodes {
            let score = self
                .run_training_episode(env, agent, &mut history)
                .map_err(|(step, e)| e.during(episode, step))?;
            self.history.push(score);

            let mean = self.history.trailing_mean(self.config.score_window).unwrap_or(score);
            log::info!(
                "[{}] episode {}: score {:.2}, average {:.2}, steps {}",
                self.config.run_name, episode, score, mean, agent.total_steps()
            );

            self.save_checkpoints(episode, mean, agent).map_err(|e| e.during(episode, 0))?;

            let full_window = self.history.len() >= self.config.score_window;
            if let Some(target) = self.config.target_score {
                if full_window && mean >= target {
                    log::info!("[{}] solved in {} episodes (average {:.2})", self.config.run_name, episode, mean);
                    break;
                }
            }
        }

        if let Some(store) = &self.checkpoints {
            store.save(CheckpointTag::Last, agent)?;
            self.history.save_two_column(store.scores_path(&self.config.run_name))?;
        }
        Ok(&self.history)
    }

    fn run_training_episode<E: Environment + ?Sized>(
        &self,
        env: &mut E,
        agent: &mut Td3Agent,
        history: &mut HistoryWindow,
    ) -> std::result::Result<f32, (usize, TalariaError)> {
        let observation = env.reset().map_err(|e| (0, e))?;
        history.reset(observation).map_err(|e| (0, e))?;

        let mut score = 0.0;
        for step in 1..=self.config.max_steps_per_episode {
            let state = history.state();
            let action = agent.act(state.view(), true).map_err(|e| (step, e))?;
            let outcome = env.step(action.view()).map_err(|e| (step, e))?;
            history.push(outcome.next_state).map_err(|e| (step, e))?;

            agent
                .step(Transition {
                    state,
                    action,
                    reward: outcome.reward,
                    next_state: history.state(),
                    done: outcome.done,
                })
                .map_err(|e| (step, e))?;

            score += outcome.reward;
            if outcome.done {
                break;
            }
        }
        Ok(score)
    }

    fn save_checkpoints(&mut self, episode: usize, mean: f32, agent: &Td3Agent) -> Result<()> {
        let store = match &self.checkpoints {
            Some(store) => store,
            None => return Ok(()),
        };
        if self.best_mean.map_or(true, |best| mean > best) {
            self.best_mean = Some(mean);
            store.save(CheckpointTag::Best, agent)?;
        }
        if self.config.checkpoint_every > 0 && episode % self.config.checkpoint_every == 0 {
            store.save(CheckpointTag::Last, agent)?;
        }
        Ok(())
    }

    /// Evaluation episodes: no exploration and nothing stored.
    pub fn test<E: Environment + ?Sized>(&self, env: &mut E, agent: &mut Td3Agent, episodes: usize) -> Result<Vec<f32>> {
        let mut history = HistoryWindow::new(agent.config.network.window(), env.state_dim());
        let mut scores = Vec::with_capacity(episodes);

        for episode in 1..=episodes {
            let observation = env.reset().map_err(|e| e.during(episode, 0))?;
            history.reset(observation).map_err(|e| e.during(episode, 0))?;
            let mut score = 0.0;
            for step in 1..=self.config.max_steps_per_episode {
                let action = agent.act(history.state().view(), false).map_err(|e| e.during(episode, step))?;
                let outcome = env.step(action.view()).map_err(|e| e.during(episode, step))?;
                history.push(outcome.next_state).map_err(|e| e.during(episode, step))?;
                score += outcome.reward;
                if outcome.done {
                    break;
                }
            }
            log::info!("[{}] test episode {}: score {:.2}", self.config.run_name, episode, score);
            scores.push(score);
        }
        Ok(scores)
    }
}
