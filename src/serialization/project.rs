use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Firmware project whose build output gets deployed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// PlatformIO environment name, also the remote directory name.
    pub name: String,
    pub build_dir: Option<PathBuf>,
    pub debug_symbols: Option<bool>,
}

/// Explicit artifact paths, used instead of the PlatformIO build layout.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactPaths {
    pub image: PathBuf,
    pub debug_symbols: Option<PathBuf>,
}
