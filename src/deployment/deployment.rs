use std::time::Duration;

use sha1::{Digest, Sha1};
use tracing::{error, info, warn};

use super::{
    artifacts::{Artifact, ArtifactSet},
    flash::{shell_quote, FlashCommand, FlashResult},
    target::DeploymentTarget,
    transport::{RemoteSession, Transport},
};
use crate::{
    core::constants::{DEFAULT_FLASH_TIMEOUT_SECS, PROBE_COMMAND},
    error::{DeployError, Result},
    states::deploy_state::{SilentObserver, Stage, StageObserver},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOptions {
    /// Run the flash tool through sudo.
    pub use_sudo: bool,
    pub flash_timeout: Duration,
    /// Compare a remote `sha1sum` against the local file after each upload.
    pub verify_checksum: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        DeployOptions {
            use_sudo: true,
            flash_timeout: Duration::from_secs(DEFAULT_FLASH_TIMEOUT_SECS),
            verify_checksum: true,
        }
    }
}

/// Result of deploying to one target, with a flash failure folded into the error.
#[derive(Debug)]
pub struct TargetOutcome {
    pub target: String,
    pub serial_port: String,
    pub result: Result<FlashResult>,
}

impl TargetOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs deployments: connect, probe, stage, upload, flash, release.
pub struct Deployer<T: Transport> {
    transport: T,
    options: DeployOptions,
    observer: Box<dyn StageObserver>,
}

impl<T: Transport> Deployer<T> {
    pub fn new(transport: T, options: DeployOptions) -> Deployer<T> {
        Deployer {
            transport,
            options,
            observer: Box::new(SilentObserver),
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn StageObserver>) -> Deployer<T> {
        self.observer = observer;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Deploys to every target in order, one session at a time.
    pub async fn deploy_all(
        &self,
        targets: &[DeploymentTarget],
        artifacts: &ArtifactSet,
        flash: &FlashCommand,
    ) -> Vec<TargetOutcome> {
        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            let result = self
                .deploy(target, artifacts, flash)
                .await
                .and_then(FlashResult::check);
            outcomes.push(TargetOutcome {
                target: target.name.to_owned(),
                serial_port: target.serial_port.to_owned(),
                result,
            });
        }
        outcomes
    }

    /// Deploys the artifacts to one target and flashes the image.
    ///
    /// A flash tool exiting non-zero is returned as an unsuccessful
    /// `FlashResult`, not as an error. Once connected, the session is
    /// closed exactly once whatever stage the run stopped at.
    pub async fn deploy(
        &self,
        target: &DeploymentTarget,
        artifacts: &ArtifactSet,
        flash: &FlashCommand,
    ) -> Result<FlashResult> {
        artifacts.image()?;

        self.observer
            .stage_started(&target.name, Stage::Connect, &target.host);
        info!(target = %target.name, address = %target.address(), "connecting");
        let mut session =
            self.transport
                .connect(target)
                .await
                .map_err(|e| DeployError::Connection {
                    host: target.host.to_owned(),
                    reason: format!("{:#}", e),
                })?;

        let outcome = self
            .run_stages(session.as_mut(), target, artifacts, flash)
            .await;

        self.observer
            .stage_started(&target.name, Stage::Release, &target.host);
        if let Err(e) = session.close().await {
            let reason = format!("{:#}", e);
            warn!(target = %target.name, error = %reason, "closing session failed");
        }

        outcome
    }

    async fn run_stages(
        &self,
        session: &mut dyn RemoteSession,
        target: &DeploymentTarget,
        artifacts: &ArtifactSet,
        flash: &FlashCommand,
    ) -> Result<FlashResult> {
        self.probe(session, target).await;
        self.stage_directory(session, target, artifacts).await?;
        self.upload_artifacts(session, target, artifacts).await?;
        self.flash(session, target, artifacts, flash).await
    }

    async fn probe(&self, session: &mut dyn RemoteSession, target: &DeploymentTarget) {
        self.observer
            .stage_started(&target.name, Stage::Probe, &target.host);
        match session.run(PROBE_COMMAND, false).await {
            Ok(output) if output.success() => {
                info!(target = %target.name, remote_os = %output.stdout.trim(), "probed remote host")
            }
            Ok(output) => {
                warn!(target = %target.name, exit_code = output.exit_code, stderr = %output.stderr.trim(), "probe failed")
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!(target = %target.name, error = %reason, "probe failed")
            }
        }
    }

    async fn stage_directory(
        &self,
        session: &mut dyn RemoteSession,
        target: &DeploymentTarget,
        artifacts: &ArtifactSet,
    ) -> Result<()> {
        let remote_dir = artifacts.remote_dir();
        self.observer
            .stage_started(&target.name, Stage::StageDirectory, &remote_dir);

        let command = format!("mkdir -p {}", shell_quote(&remote_dir));
        let output = match session.run(&command, false).await {
            Ok(output) => output,
            Err(e) => {
                return Err(DeployError::RemoteEnvironment {
                    command,
                    reason: format!("{:#}", e),
                })
            }
        };
        if !output.success() {
            return Err(DeployError::RemoteEnvironment {
                reason: format!("exit code {}: {}", output.exit_code, output.stderr.trim()),
                command,
            });
        }
        Ok(())
    }

    async fn upload_artifacts(
        &self,
        session: &mut dyn RemoteSession,
        target: &DeploymentTarget,
        artifacts: &ArtifactSet,
    ) -> Result<()> {
        // every local file is checked before the first byte leaves
        let mut sizes = Vec::with_capacity(artifacts.len());
        for artifact in artifacts.iter() {
            let metadata = tokio::fs::metadata(&artifact.local_path)
                .await
                .map_err(|e| transfer_error(artifact, format!("local file unavailable: {}", e)))?;
            if !metadata.is_file() {
                return Err(transfer_error(artifact, "local path is not a regular file"));
            }
            sizes.push(metadata.len());
        }

        for (artifact, size) in artifacts.iter().zip(sizes) {
            self.observer
                .stage_started(&target.name, Stage::Upload, &artifact.remote_path);
            let written = session
                .upload(&artifact.local_path, &artifact.remote_path)
                .await
                .map_err(|e| transfer_error(artifact, format!("{:#}", e)))?;
            if written != size {
                return Err(transfer_error(
                    artifact,
                    format!("short transfer, {} of {} bytes", written, size),
                ));
            }
            if self.options.verify_checksum {
                self.verify_checksum(session, artifact).await?;
            }
            info!(
                target = %target.name,
                artifact = %artifact.kind,
                remote = %artifact.remote_path,
                bytes = written,
                "uploaded"
            );
        }
        Ok(())
    }

    async fn verify_checksum(
        &self,
        session: &mut dyn RemoteSession,
        artifact: &Artifact,
    ) -> Result<()> {
        let content = tokio::fs::read(&artifact.local_path)
            .await
            .map_err(|e| transfer_error(artifact, format!("cannot re-read local file: {}", e)))?;
        let local = format!("{:x}", Sha1::digest(&content));

        let command = format!("sha1sum {}", shell_quote(&artifact.remote_path));
        let output = session
            .run(&command, false)
            .await
            .map_err(|e| transfer_error(artifact, format!("{:#}", e)))?;
        if !output.success() {
            return Err(transfer_error(
                artifact,
                format!("`{}` exited with {}: {}", command, output.exit_code, output.stderr.trim()),
            ));
        }

        let remote = output.stdout.split_whitespace().next().unwrap_or("");
        if !remote.eq_ignore_ascii_case(&local) {
            return Err(transfer_error(
                artifact,
                format!("checksum mismatch, local {} remote {}", local, remote),
            ));
        }
        Ok(())
    }

    async fn flash(
        &self,
        session: &mut dyn RemoteSession,
        target: &DeploymentTarget,
        artifacts: &ArtifactSet,
        flash: &FlashCommand,
    ) -> Result<FlashResult> {
        let image = artifacts.image()?;
        let command = flash.render(&target.board, &target.serial_port, &image.remote_path);
        self.observer
            .stage_started(&target.name, Stage::Flash, &target.serial_port);
        info!(target = %target.name, command = %command, privileged = self.options.use_sudo, "invoking flash tool");

        let timeout = self.options.flash_timeout;
        let outcome =
            tokio::time::timeout(timeout, session.run(&command, self.options.use_sudo)).await;
        let output = match outcome {
            Err(_) => {
                error!(target = %target.name, command = %command, "flash tool timed out");
                return Err(DeployError::FlashTimeout { command, timeout });
            }
            Ok(Err(e)) => {
                return Err(DeployError::Connection {
                    host: target.host.to_owned(),
                    reason: format!("running `{}`: {:#}", command, e),
                })
            }
            Ok(Ok(output)) => output,
        };

        let result = FlashResult::new(command, output);
        if result.succeeded {
            info!(target = %target.name, port = %target.serial_port, "flashed");
        } else {
            error!(
                target = %target.name,
                exit_code = result.exit_code,
                stderr = %result.stderr.trim(),
                "flash tool failed"
            );
        }
        Ok(result)
    }
}

fn transfer_error(artifact: &Artifact, reason: impl Into<String>) -> DeployError {
    DeployError::Transfer {
        artifact: artifact.kind.to_string(),
        path: artifact.local_path.to_owned(),
        reason: reason.into(),
    }
}
