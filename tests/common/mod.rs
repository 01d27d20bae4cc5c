use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use avr_deploy::{
    ArtifactKind, ArtifactSet, CommandOutput, Credential, DeploymentTarget, RemoteSession,
    Transport,
};
use secrecy::SecretString;
use sha1::{Digest, Sha1};

/// Everything the fake remote host saw.
#[derive(Debug, Default)]
pub struct Journal {
    pub connects: usize,
    pub closes: usize,
    pub commands: Vec<(String, bool)>,
    pub uploads: Vec<String>,
    pub dirs: BTreeSet<String>,
    pub files: BTreeMap<String, Vec<u8>>,
}

impl Journal {
    pub fn privileged_commands(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter(|(_, privileged)| *privileged)
            .map(|(command, _)| command.as_str())
            .collect()
    }

    pub fn flash_commands(&self) -> Vec<&str> {
        self.commands
            .iter()
            .map(|(command, _)| command.as_str())
            .filter(|command| command.starts_with("avrdude"))
            .collect()
    }
}

/// Fault injection for the fake host.
#[derive(Debug, Clone, Default)]
pub struct Behaviour {
    pub refuse_connect: bool,
    pub probe_error: bool,
    pub mkdir_exit: i32,
    pub upload_error: bool,
    pub short_upload: bool,
    pub corrupt_upload: bool,
    pub flash_output: CommandOutput,
    pub flash_delay: Option<Duration>,
    pub close_error: bool,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    pub journal: Arc<Mutex<Journal>>,
    pub behaviour: Behaviour,
}

impl MockTransport {
    pub fn new(behaviour: Behaviour) -> MockTransport {
        MockTransport {
            journal: Arc::default(),
            behaviour,
        }
    }

    pub fn journal(&self) -> std::sync::MutexGuard<'_, Journal> {
        self.journal.lock().unwrap()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, target: &DeploymentTarget) -> anyhow::Result<Box<dyn RemoteSession>> {
        if self.behaviour.refuse_connect {
            bail!("connection refused by {}", target.host);
        }
        self.journal.lock().unwrap().connects += 1;
        Ok(Box::new(MockSession {
            journal: self.journal.clone(),
            behaviour: self.behaviour.clone(),
        }))
    }
}

struct MockSession {
    journal: Arc<Mutex<Journal>>,
    behaviour: Behaviour,
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn run(&mut self, command: &str, privileged: bool) -> anyhow::Result<CommandOutput> {
        self.journal
            .lock()
            .unwrap()
            .commands
            .push((command.to_string(), privileged));

        if command == "uname -s" {
            if self.behaviour.probe_error {
                bail!("channel closed");
            }
            return Ok(output(0, "Linux\n", ""));
        }
        if let Some(dir) = command.strip_prefix("mkdir -p ") {
            if self.behaviour.mkdir_exit != 0 {
                return Ok(output(
                    self.behaviour.mkdir_exit,
                    "",
                    "mkdir: cannot create directory: Permission denied",
                ));
            }
            self.journal.lock().unwrap().dirs.insert(dir.to_string());
            return Ok(output(0, "", ""));
        }
        if let Some(path) = command.strip_prefix("sha1sum ") {
            let journal = self.journal.lock().unwrap();
            return Ok(match journal.files.get(path) {
                Some(content) => output(
                    0,
                    &format!("{:x}  {}\n", Sha1::digest(content), path),
                    "",
                ),
                None => output(1, "", "sha1sum: No such file or directory"),
            });
        }

        if let Some(delay) = self.behaviour.flash_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.behaviour.flash_output.clone())
    }

    async fn upload(&mut self, local: &Path, remote: &str) -> anyhow::Result<u64> {
        if self.behaviour.upload_error {
            return Err(anyhow!("connection reset while writing {}", remote));
        }
        let mut content = tokio::fs::read(local).await?;
        let reported = content.len() as u64;
        if self.behaviour.corrupt_upload {
            if let Some(first) = content.first_mut() {
                *first ^= 0xff;
            }
        }
        let reported = if self.behaviour.short_upload {
            reported - 1
        } else {
            reported
        };

        let mut journal = self.journal.lock().unwrap();
        journal.uploads.push(remote.to_string());
        journal.files.insert(remote.to_string(), content);
        Ok(reported)
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.journal.lock().unwrap().closes += 1;
        if self.behaviour.close_error {
            bail!("disconnect failed");
        }
        Ok(())
    }
}

pub fn output(exit_code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

pub fn target() -> DeploymentTarget {
    DeploymentTarget {
        name: "garage".into(),
        host: "192.168.10.154".into(),
        ssh_port: 22,
        user: "pi".into(),
        credential: Credential::Password(SecretString::from("pi-password".to_string())),
        board: "ATMEGA328P".into(),
        serial_port: "/dev/ttyACM0".into(),
        host_key_fingerprint: None,
    }
}

/// A build directory holding `firmware.hex` and `firmware.elf`.
pub struct Build {
    pub dir: tempfile::TempDir,
}

impl Build {
    pub fn new() -> Build {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("firmware.hex"), b":100000000C945C000C946E000C946E000C946E00CA\n:00000001FF\n").unwrap();
        std::fs::write(dir.path().join("firmware.elf"), [0x7f, b'E', b'L', b'F', 1, 1, 1, 0]).unwrap();
        Build { dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn artifacts(&self) -> ArtifactSet {
        let mut set = ArtifactSet::new("AlarmController").unwrap();
        set.push(ArtifactKind::Image, self.path("firmware.hex")).unwrap();
        set.push(ArtifactKind::DebugSymbols, self.path("firmware.elf"))
            .unwrap();
        set
    }
}
