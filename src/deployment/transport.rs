//! Seam between the orchestrator and the remote host.

use std::path::Path;

use async_trait::async_trait;

use super::target::DeploymentTarget;

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `-1` when the remote process ended without an exit status.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens an authenticated session to the target host.
    async fn connect(&self, target: &DeploymentTarget) -> anyhow::Result<Box<dyn RemoteSession>>;
}

/// An open session, owned by a single deployment run.
#[async_trait]
pub trait RemoteSession: Send {
    /// Runs a shell command, with elevated privilege when `privileged` is set.
    async fn run(&mut self, command: &str, privileged: bool) -> anyhow::Result<CommandOutput>;

    /// Copies `local` to `remote`, replacing any existing file.
    /// Returns the number of bytes that landed on the remote side.
    async fn upload(&mut self, local: &Path, remote: &str) -> anyhow::Result<u64>;

    async fn close(&mut self) -> anyhow::Result<()>;
}
