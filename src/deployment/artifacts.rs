use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::{
    core::constants::REMOTE_BINARIES_DIR,
    error::{DeployError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Image,
    DebugSymbols,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArtifactKind::Image => "image",
            ArtifactKind::DebugSymbols => "debug symbols",
        })
    }
}

/// A build output and where it lands on the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub local_path: PathBuf,
    /// Relative to the remote login directory.
    pub remote_path: String,
}

/// The fixed, insertion-ordered set of artifacts of one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    project: String,
    artifacts: Vec<Artifact>,
}

impl ArtifactSet {
    pub fn new(project: &str) -> Result<ArtifactSet> {
        validate_project(project)?;
        Ok(ArtifactSet {
            project: project.to_string(),
            artifacts: Vec::new(),
        })
    }

    /// Artifacts of a PlatformIO build: `<build_dir>/<env>/<env>.hex` and `.elf`.
    pub fn from_platformio(build_dir: &Path, env: &str, debug_symbols: bool) -> Result<ArtifactSet> {
        let mut set = ArtifactSet::new(env)?;
        let env_dir = build_dir.join(env);
        set.push(ArtifactKind::Image, env_dir.join(format!("{}.hex", env)))?;
        if debug_symbols {
            set.push(ArtifactKind::DebugSymbols, env_dir.join(format!("{}.elf", env)))?;
        }
        Ok(set)
    }

    pub fn push(&mut self, kind: ArtifactKind, local_path: impl Into<PathBuf>) -> Result<&mut Self> {
        let local_path = local_path.into();
        let file_name = local_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                DeployError::config(format!(
                    "{} artifact {} has no usable file name",
                    kind,
                    local_path.display()
                ))
            })?;
        let remote_path = format!("{}/{}", self.remote_dir(), file_name);

        if self.artifacts.iter().any(|a| a.kind == kind) {
            return Err(DeployError::config(format!("{} artifact declared twice", kind)));
        }
        if self.artifacts.iter().any(|a| a.remote_path == remote_path) {
            return Err(DeployError::config(format!(
                "{} artifact would overwrite {}",
                kind, remote_path
            )));
        }

        self.artifacts.push(Artifact {
            kind,
            local_path,
            remote_path,
        });
        Ok(self)
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// `binaries/<project>`, relative to the remote login directory.
    pub fn remote_dir(&self) -> String {
        format!("{}/{}", REMOTE_BINARIES_DIR, self.project)
    }

    pub fn image(&self) -> Result<&Artifact> {
        self.get(ArtifactKind::Image).ok_or_else(|| {
            DeployError::config(format!("project {} declares no image artifact", self.project))
        })
    }

    pub fn get(&self, kind: ArtifactKind) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Artifact> {
        self.artifacts.iter()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

fn validate_project(project: &str) -> Result<()> {
    let valid = !project.is_empty()
        && project != "."
        && project != ".."
        && project
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(DeployError::config(format!(
            "project name `{}` must only contain letters, digits, `_`, `-` and `.`",
            project
        )))
    }
}
