pub mod core;
pub mod deployment;
pub mod error;
pub mod logs;
pub mod serialization;
pub mod states;
pub mod ui;

pub use deployment::{
    artifacts::{Artifact, ArtifactKind, ArtifactSet},
    deployment::{DeployOptions, Deployer, TargetOutcome},
    flash::{FlashCommand, FlashResult},
    ssh::SshTransport,
    target::{Credential, DeploymentTarget},
    transport::{CommandOutput, RemoteSession, Transport},
};
pub use error::{DeployError, Result};
