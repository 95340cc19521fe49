//! Error types shared by the command builders and the supervisor.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Exit code used when the run is aborted by the user (SIGINT).
pub const EXIT_INTERRUPTED: i32 = 130;

/// Exit code for every failure that happens before an attempt runs.
pub const EXIT_CONFIGURATION: i32 = 1;

#[derive(Debug, Error)]
pub enum RunnerError {
    /// Malformed or contradictory inputs. Raised before any process starts.
    #[error("{0}")]
    Configuration(String),

    /// The host is not able to reach the requested target.
    #[error("preflight check failed: {0}")]
    Preflight(String),

    /// The deployment tool could not be started at all.
    #[error("failed to start {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("interrupted by user")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RunnerError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        RunnerError::Configuration(msg.into())
    }

    /// Process exit code for a run that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunnerError::Interrupted => EXIT_INTERRUPTED,
            RunnerError::Configuration(_)
            | RunnerError::Preflight(_)
            | RunnerError::Spawn { .. }
            | RunnerError::Io(_) => EXIT_CONFIGURATION,
        }
    }
}

pub type Result<T, E = RunnerError> = std::result::Result<T, E>;
