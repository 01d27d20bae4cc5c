//! Error taxonomy of a deployment run.

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

use crate::{deployment::flash::FlashResult, states::deploy_state::Stage};

pub type Result<T> = std::result::Result<T, DeployError>;

/// Every way a deployment run can end unsuccessfully.
///
/// A run stops at the first error; later stages are never attempted.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot reach {host}: {reason}")]
    Connection { host: String, reason: String },

    #[error("remote command `{command}` failed: {reason}")]
    RemoteEnvironment { command: String, reason: String },

    #[error("transfer of {artifact} {} failed: {reason}", .path.display())]
    Transfer {
        artifact: String,
        path: PathBuf,
        reason: String,
    },

    #[error("flash tool exited with code {}", .0.exit_code)]
    FlashFailure(Box<FlashResult>),

    #[error("flash tool did not finish within {timeout:?}")]
    FlashTimeout { command: String, timeout: Duration },
}

impl DeployError {
    pub fn config(message: impl Into<String>) -> Self {
        DeployError::Config(message.into())
    }

    /// Stage of the run the error was raised in.
    pub fn stage(&self) -> Stage {
        match self {
            DeployError::Config(_) => Stage::Config,
            DeployError::Connection { .. } => Stage::Connect,
            DeployError::RemoteEnvironment { .. } => Stage::StageDirectory,
            DeployError::Transfer { .. } => Stage::Upload,
            DeployError::FlashFailure(_) | DeployError::FlashTimeout { .. } => Stage::Flash,
        }
    }
}
