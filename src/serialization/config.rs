use std::{fs::File, io::BufReader, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use super::{
    deploy_target::TargetConfig,
    project::{ArtifactPaths, ProjectConfig},
};
use crate::{
    core::constants::{
        DEFAULT_BUILD_DIR, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_FLASH_COMMAND,
        DEFAULT_FLASH_TIMEOUT_SECS, DEFAULT_PROGRAMMER,
    },
    deployment::{
        artifacts::{ArtifactKind, ArtifactSet},
        deployment::DeployOptions,
        flash::FlashCommand,
    },
    error::{DeployError, Result},
};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(rename = "usesudo")]
    pub use_sudo: Option<bool>,
    pub project: ProjectConfig,
    pub artifacts: Option<ArtifactPaths>,
    #[serde(default)]
    pub flash: FlashConfig,
    pub connect_timeout_secs: Option<u64>,
    pub targets: Vec<TargetConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlashConfig {
    pub command: Option<String>,
    pub programmer: Option<String>,
    pub timeout_secs: Option<u64>,
    pub verify_checksum: Option<bool>,
}

impl Config {
    pub fn read_config<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            DeployError::config(format!("cannot open {}: {}", path.display(), e))
        })?;
        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader).map_err(|e| {
            DeployError::config(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Config> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| DeployError::config(format!("cannot parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(DeployError::config("no deployment targets configured"));
        }
        for (index, target) in self.targets.iter().enumerate() {
            if self.targets[..index]
                .iter()
                .any(|other| other.display_name() == target.display_name())
            {
                return Err(DeployError::config(format!(
                    "target {} is declared twice",
                    target.display_name()
                )));
            }
            if target.board.trim().is_empty() || target.serial_port.trim().is_empty() {
                return Err(DeployError::config(format!(
                    "target {} needs both board and serialPort",
                    target.display_name()
                )));
            }
        }
        if self.flash.timeout_secs == Some(0) || self.connect_timeout_secs == Some(0) {
            return Err(DeployError::config("timeouts must be at least one second"));
        }
        self.flash_command()?;
        self.artifact_set(None)?;
        Ok(())
    }

    pub fn flash_command(&self) -> Result<FlashCommand> {
        FlashCommand::new(
            self.flash
                .command
                .as_deref()
                .unwrap_or(DEFAULT_FLASH_COMMAND),
            self.flash
                .programmer
                .as_deref()
                .unwrap_or(DEFAULT_PROGRAMMER),
        )
    }

    pub fn deploy_options(&self) -> DeployOptions {
        DeployOptions {
            use_sudo: self.use_sudo.unwrap_or(true),
            flash_timeout: Duration::from_secs(
                self.flash.timeout_secs.unwrap_or(DEFAULT_FLASH_TIMEOUT_SECS),
            ),
            verify_checksum: self.flash.verify_checksum.unwrap_or(true),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    /// Artifact set of the project, `project` overriding the configured name.
    pub fn artifact_set(&self, project: Option<&str>) -> Result<ArtifactSet> {
        let name = project.unwrap_or(&self.project.name);
        match &self.artifacts {
            Some(paths) => {
                let mut set = ArtifactSet::new(name)?;
                set.push(ArtifactKind::Image, &paths.image)?;
                if let Some(elf) = &paths.debug_symbols {
                    set.push(ArtifactKind::DebugSymbols, elf)?;
                }
                Ok(set)
            }
            None => {
                let build_dir = self
                    .project
                    .build_dir
                    .clone()
                    .unwrap_or_else(|| DEFAULT_BUILD_DIR.into());
                ArtifactSet::from_platformio(
                    &build_dir,
                    name,
                    self.project.debug_symbols.unwrap_or(true),
                )
            }
        }
    }

    /// The named target, or every target in declaration order.
    pub fn select_targets(&self, name: Option<&str>) -> Result<Vec<&TargetConfig>> {
        match name {
            None => Ok(self.targets.iter().collect()),
            Some(name) => self
                .targets
                .iter()
                .find(|t| t.display_name() == name)
                .map(|t| vec![t])
                .ok_or_else(|| {
                    let available: Vec<String> =
                        self.targets.iter().map(TargetConfig::display_name).collect();
                    DeployError::config(format!(
                        "target {} not found, available: {}",
                        name,
                        available.join(", ")
                    ))
                }),
        }
    }
}
