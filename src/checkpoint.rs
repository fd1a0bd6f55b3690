use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::algorithms::Td3Agent;
use crate::debug::ensure_finite_parameters;
use crate::error::{Result, TalariaError};
use crate::layers::Module;
use crate::networks::{Actor, Critic};

/// Which snapshot of a run a checkpoint holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointTag {
    /// Highest trailing mean score so far
    Best,
    /// Most recent save
    Last,
}

impl CheckpointTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointTag::Best => "best",
            CheckpointTag::Last => "last",
        }
    }
}

impl fmt::Display for CheckpointTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// bincode snapshots of the online actor and critics, laid out as
/// `{dir}/{algorithm}/{tag}_{arch}_{role}.bin`.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    algorithm: String,
    arch: String,
}

impl CheckpointStore {
    pub fn new<P: Into<PathBuf>, A: Into<String>, R: Into<String>>(dir: P, algorithm: A, arch: R) -> Self {
        CheckpointStore {
            dir: dir.into(),
            algorithm: algorithm.into(),
            arch: arch.into(),
        }
    }

    /// Store for a TD3 agent, named after its encoder.
    pub fn for_agent<P: Into<PathBuf>>(dir: P, agent: &Td3Agent) -> Self {
        Self::new(dir, "td3", agent.config.network.label())
    }

    pub fn path(&self, tag: CheckpointTag, role: &str) -> PathBuf {
        self.dir
            .join(&self.algorithm)
            .join(format!("{}_{}_{}.bin", tag, self.arch, role))
    }

    /// Where the trainer writes the score table for `run_name`.
    pub fn scores_path(&self, run_name: &str) -> PathBuf {
        self.dir
            .join(&self.algorithm)
            .join(format!("{}_{}_scores.txt", run_name, self.arch))
    }

    pub fn save(&self, tag: CheckpointTag, agent: &Td3Agent) -> Result<()> {
        std::fs::create_dir_all(self.dir.join(&self.algorithm))?;
        write_bincode(&self.path(tag, "actor"), &agent.train_actor)?;
        write_bincode(&self.path(tag, "critic_1"), &agent.train_critic_1)?;
        write_bincode(&self.path(tag, "critic_2"), &agent.train_critic_2)?;
        log::debug!("saved {} checkpoint to {}", tag, self.dir.join(&self.algorithm).display());
        Ok(())
    }

    /// Load the `best` snapshot, falling back to `last` once. Targets are
    /// reset to copies of the loaded networks.
    pub fn load_into(&self, agent: &mut Td3Agent) -> Result<CheckpointTag> {
        match self.load_tag(CheckpointTag::Best, agent) {
            Ok(()) => Ok(CheckpointTag::Best),
            Err(best_error) => {
                log::warn!("could not load best checkpoint ({}), trying last", best_error);
                self.load_tag(CheckpointTag::Last, agent)?;
                Ok(CheckpointTag::Last)
            }
        }
    }

    /// Load one snapshot. The agent is left untouched unless all three files load.
    pub fn load_tag(&self, tag: CheckpointTag, agent: &mut Td3Agent) -> Result<()> {
        let actor_path = self.path(tag, "actor");
        let actor: Actor = read_bincode(&actor_path)?;
        check_compatible(&actor_path, &actor, &agent.train_actor)?;

        let critic_1_path = self.path(tag, "critic_1");
        let critic_1: Critic = read_bincode(&critic_1_path)?;
        check_compatible(&critic_1_path, &critic_1, &agent.train_critic_1)?;

        let critic_2_path = self.path(tag, "critic_2");
        let critic_2: Critic = read_bincode(&critic_2_path)?;
        check_compatible(&critic_2_path, &critic_2, &agent.train_critic_2)?;

        agent.train_actor = actor;
        agent.train_critic_1 = critic_1;
        agent.train_critic_2 = critic_2;
        agent.reset_targets();
        log::info!("loaded {} checkpoint for {}", tag, self.arch);
        Ok(())
    }
}

fn write_bincode<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = bincode::serialize(value)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

fn read_bincode<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let load_error = |reason: String| TalariaError::CheckpointLoad {
        path: path.display().to_string(),
        reason,
    };
    let bytes = std::fs::read(path).map_err(|e| load_error(e.to_string()))?;
    bincode::deserialize(&bytes).map_err(|e| load_error(e.to_string()))
}

/// Non-trainable settings a snapshot carries besides its tensors.
trait Settings {
    fn settings(&self) -> Vec<(&'static str, f64)>;
}

impl Settings for Actor {
    fn settings(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("log_std_min", self.log_std_min as f64),
            ("log_std_max", self.log_std_max as f64),
            ("seq_len", self.encoder.seq_len().unwrap_or(0) as f64),
        ]
    }
}

impl Settings for Critic {
    fn settings(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("q_scale", self.q_scale as f64),
            ("seq_len", self.encoder.seq_len().unwrap_or(0) as f64),
        ]
    }
}

/// Every parameter tensor must match the agent's architecture and be finite,
/// and the stored settings must equal the configured ones.
fn check_compatible<M: Module + Settings>(path: &Path, loaded: &M, current: &M) -> Result<()> {
    for ((name, stored), (_, configured)) in loaded.settings().into_iter().zip(current.settings()) {
        if stored != configured {
            return Err(TalariaError::CheckpointLoad {
                path: path.display().to_string(),
                reason: format!("{} is {} in the snapshot but {} in the configuration", name, stored, configured),
            });
        }
    }
    let loaded_shapes: Vec<Vec<usize>> = loaded.params().iter().map(|p| p.shape().to_vec()).collect();
    let current_shapes: Vec<Vec<usize>> = current.params().iter().map(|p| p.shape().to_vec()).collect();
    if loaded_shapes != current_shapes {
        return Err(TalariaError::CheckpointLoad {
            path: path.display().to_string(),
            reason: "parameter shapes do not match the configured network".to_string(),
        });
    }
    ensure_finite_parameters(&path.display().to_string(), loaded).map_err(|e| TalariaError::CheckpointLoad {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}
