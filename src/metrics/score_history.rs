use serde::{Serialize, Deserialize};
use std::fmt::Write as _;
use std::path::Path;

use crate::error::{Result, TalariaError};

/// Cumulative reward per episode, indexed from 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreHistory {
    pub episodes: Vec<usize>,
    pub scores: Vec<f32>,
}

impl ScoreHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, score: f32) {
        self.episodes.push(self.episodes.len() + 1);
        self.scores.push(score);
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Mean of the last `window` scores (fewer if not enough episodes yet).
    pub fn trailing_mean(&self, window: usize) -> Option<f32> {
        if self.scores.is_empty() || window == 0 {
            return None;
        }
        let start = self.scores.len().saturating_sub(window);
        let tail = &self.scores[start..];
        Some(tail.iter().sum::<f32>() / tail.len() as f32)
    }

    /// Trailing uniform filter: entry `i` averages scores `i + 1 - window ..= i`.
    pub fn moving_average(&self, window: usize) -> Vec<f32> {
        let window = window.max(1);
        let mut averages = Vec::with_capacity(self.scores.len());
        let mut running = 0.0f32;
        for (i, &score) in self.scores.iter().enumerate() {
            running += score;
            if i >= window {
                running -= self.scores[i - window];
            }
            averages.push(running / (i + 1).min(window) as f32);
        }
        averages
    }

    /// Two whitespace-separated rows: episode indices, then scores.
    pub fn save_two_column<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut text = String::new();
        let episodes: Vec<String> = self.episodes.iter().map(|e| e.to_string()).collect();
        let scores: Vec<String> = self.scores.iter().map(|s| format!("{:.6}", s)).collect();
        writeln!(text, "{}", episodes.join(" ")).map_err(|e| TalariaError::Io(e.to_string()))?;
        writeln!(text, "{}", scores.join(" ")).map_err(|e| TalariaError::Io(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn load_two_column<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut rows = text.lines().filter(|line| !line.trim().is_empty());
        let episodes = rows
            .next()
            .unwrap_or("")
            .split_whitespace()
            .map(|v| v.parse::<f32>().map(|e| e as usize))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| TalariaError::Serialization(format!("episode row: {}", e)))?;
        let scores = rows
            .next()
            .unwrap_or("")
            .split_whitespace()
            .map(|v| v.parse::<f32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| TalariaError::Serialization(format!("score row: {}", e)))?;
        if episodes.len() != scores.len() {
            return Err(TalariaError::dimension("score history rows", episodes.len(), scores.len()));
        }
        Ok(ScoreHistory { episodes, scores })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_mean_uses_available_episodes() {
        let mut history = ScoreHistory::new();
        assert_eq!(history.trailing_mean(100), None);
        history.push(1.0);
        history.push(3.0);
        assert_eq!(history.trailing_mean(100), Some(2.0));
        history.push(8.0);
        assert_eq!(history.trailing_mean(2), Some(5.5));
    }

    #[test]
    fn test_moving_average() {
        let history = ScoreHistory {
            episodes: vec![1, 2, 3, 4],
            scores: vec![2.0, 4.0, 6.0, 8.0],
        };
        assert_eq!(history.moving_average(2), vec![2.0, 3.0, 5.0, 7.0]);
    }
}
