use std::fmt;

/// Result type for talaria operations
pub type Result<T> = std::result::Result<T, TalariaError>;

/// Main error type for the talaria library
#[derive(Debug, Clone)]
pub enum TalariaError {
    /// A network or buffer received an input of the wrong rank or size
    Dimension {
        context: String,
        expected: String,
        actual: String,
    },

    /// Sampling asked for more transitions than are stored
    InsufficientData {
        requested: usize,
        available: usize,
    },

    /// NaN or Inf reached a loss, gradient or parameter
    NumericalInstability {
        network: String,
        detail: String,
    },

    /// Persisted parameters were missing or could not be decoded
    CheckpointLoad {
        path: String,
        reason: String,
    },

    /// Invalid parameter value
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// IO errors (file operations)
    Io(String),

    /// Serialization/deserialization errors
    Serialization(String),

    /// An unrecoverable error raised inside the training loop
    Training {
        episode: usize,
        step: usize,
        source: Box<TalariaError>,
    },
}

impl fmt::Display for TalariaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TalariaError::Dimension { context, expected, actual } => {
                write!(f, "Dimension mismatch in {}: expected {}, got {}", context, expected, actual)
            }
            TalariaError::InsufficientData { requested, available } => {
                write!(
                    f,
                    "Insufficient data: requested {} transitions but only {} are stored",
                    requested, available
                )
            }
            TalariaError::NumericalInstability { network, detail } => {
                write!(f, "Numerical instability in {}: {}", network, detail)
            }
            TalariaError::CheckpointLoad { path, reason } => {
                write!(f, "Failed to load checkpoint '{}': {}", path, reason)
            }
            TalariaError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            TalariaError::Io(msg) => write!(f, "IO error: {}", msg),
            TalariaError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            TalariaError::Training { episode, step, source } => {
                write!(f, "Training aborted at episode {}, step {}: {}", episode, step, source)
            }
        }
    }
}

impl std::error::Error for TalariaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TalariaError::Training { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TalariaError {
    fn from(err: std::io::Error) -> Self {
        TalariaError::Io(err.to_string())
    }
}

impl From<bincode::Error> for TalariaError {
    fn from(err: bincode::Error) -> Self {
        TalariaError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for TalariaError {
    fn from(err: ndarray::ShapeError) -> Self {
        TalariaError::dimension("array reshape", "a compatible shape", err)
    }
}

impl From<serde_json::Error> for TalariaError {
    fn from(err: serde_json::Error) -> Self {
        TalariaError::Serialization(err.to_string())
    }
}

// Helper functions for common error patterns
impl TalariaError {
    pub fn dimension<C: Into<String>, E: ToString, A: ToString>(context: C, expected: E, actual: A) -> Self {
        TalariaError::Dimension {
            context: context.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        TalariaError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn numerical<N: Into<String>, D: Into<String>>(network: N, detail: D) -> Self {
        TalariaError::NumericalInstability {
            network: network.into(),
            detail: detail.into(),
        }
    }

    /// Attach the episode/step position of the training loop.
    pub fn during(self, episode: usize, step: usize) -> Self {
        TalariaError::Training {
            episode,
            step,
            source: Box::new(self),
        }
    }
}
