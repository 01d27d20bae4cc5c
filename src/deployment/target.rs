use std::path::PathBuf;

use secrecy::SecretString;

use crate::{
    error::{DeployError, Result},
    serialization::deploy_target::{AuthenticationConfig, TargetConfig},
};

/// How the session authenticates against the remote host.
#[derive(Debug)]
pub enum Credential {
    Password(SecretString),
    PrivateKey {
        path: PathBuf,
        passphrase: Option<SecretString>,
    },
}

/// Where and how to flash. Built once from configuration, never mutated.
#[derive(Debug)]
pub struct DeploymentTarget {
    pub name: String,
    pub host: String,
    pub ssh_port: u16,
    pub user: String,
    pub credential: Credential,
    /// Device identifier passed to the flash tool, e.g. `ATMEGA328P`.
    pub board: String,
    /// Serial device of the programmer on the remote host.
    pub serial_port: String,
    pub host_key_fingerprint: Option<String>,
}

impl DeploymentTarget {
    /// Resolves secrets from the process environment.
    pub fn resolve(config: &TargetConfig) -> Result<DeploymentTarget> {
        Self::resolve_with(config, |name| std::env::var(name).ok())
    }

    pub fn resolve_with<F>(config: &TargetConfig, lookup: F) -> Result<DeploymentTarget>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = |var: &str| -> Result<SecretString> {
            lookup(var).map(SecretString::from).ok_or_else(|| {
                DeployError::config(format!(
                    "environment variable {} for target {} is not set",
                    var,
                    config.display_name()
                ))
            })
        };

        let credential = match &config.authentication {
            AuthenticationConfig::Password { env } => Credential::Password(secret(env)?),
            AuthenticationConfig::Certificate {
                path,
                passphrase_env,
            } => Credential::PrivateKey {
                path: path.clone(),
                passphrase: passphrase_env.as_deref().map(secret).transpose()?,
            },
        };

        Ok(DeploymentTarget {
            name: config.display_name(),
            host: config.host.clone(),
            ssh_port: config.port,
            user: config.user.clone(),
            credential,
            board: config.board.clone(),
            serial_port: config.serial_port.clone(),
            host_key_fingerprint: config.host_key_fingerprint.clone(),
        })
    }

    pub fn address(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.ssh_port)
    }
}
