use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::constants::DEFAULT_SSH_PORT;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    pub name: Option<String>,
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub user: String,
    pub authentication: AuthenticationConfig,
    pub board: String,
    pub serial_port: String,
    pub host_key_fingerprint: Option<String>,
}

/// Secrets are never stored in the file, only the names of the
/// environment variables holding them.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum AuthenticationConfig {
    Password {
        env: String,
    },
    Certificate {
        path: PathBuf,
        #[serde(rename = "passphraseEnv")]
        passphrase_env: Option<String>,
    },
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl TargetConfig {
    pub fn display_name(&self) -> String {
        self.name.to_owned().unwrap_or_else(|| self.host.to_owned())
    }
}
