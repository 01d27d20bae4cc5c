use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use russh::{
    client::{self, Handle},
    ChannelMsg, Disconnect,
};
use russh_keys::key;
use russh_sftp::client::SftpSession;
use secrecy::{ExposeSecret, SecretString};
use tokio::{
    fs::File,
    io::{AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use super::{
    target::{Credential, DeploymentTarget},
    transport::{CommandOutput, RemoteSession, Transport},
};
use crate::core::constants::{CHUNK_UPLOAD_BUFFER, SUDO_PREPEND};

struct Client {
    host: String,
    expected_fingerprint: Option<String>,
}

#[async_trait]
impl client::Handler for Client {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        host_key_allowed(&self.host, &fingerprint, self.expected_fingerprint.as_deref())?;
        Ok(true)
    }
}

/// Accepts any key when no fingerprint is pinned; a pin may carry the `SHA256:` prefix.
pub fn host_key_allowed(
    host: &str,
    fingerprint: &str,
    expected: Option<&str>,
) -> anyhow::Result<()> {
    match expected {
        Some(expected) => {
            let expected = expected.trim_start_matches("SHA256:");
            if fingerprint != expected {
                bail!(
                    "host key of {} is SHA256:{}, expected SHA256:{}",
                    host,
                    fingerprint,
                    expected
                );
            }
        }
        None => {
            warn!(host = %host, fingerprint = %fingerprint, "accepting unpinned host key");
        }
    }
    Ok(())
}

/// SSH transport: commands over exec channels, files over SFTP.
pub struct SshTransport {
    connect_timeout: Duration,
}

impl SshTransport {
    pub fn new(connect_timeout: Duration) -> SshTransport {
        SshTransport { connect_timeout }
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn connect(&self, target: &DeploymentTarget) -> anyhow::Result<Box<dyn RemoteSession>> {
        let ssh_config = Arc::new(russh::client::Config::default());
        let sh = Client {
            host: target.host.to_owned(),
            expected_fingerprint: target.host_key_fingerprint.to_owned(),
        };

        let mut session: Handle<Client> = tokio::time::timeout(
            self.connect_timeout,
            russh::client::connect(ssh_config, (target.host.to_owned(), target.ssh_port), sh),
        )
        .await
        .map_err(|_| anyhow!("timed out after {:?}", self.connect_timeout))??;

        let auth = match &target.credential {
            Credential::Password(password) => session
                .authenticate_password(target.user.as_str(), password.expose_secret())
                .await
                .context("password authentication")?,
            Credential::PrivateKey { path, passphrase } => {
                let key = russh_keys::load_secret_key(
                    path,
                    passphrase.as_ref().map(|p| p.expose_secret()),
                )
                .with_context(|| format!("cannot load key {}", path.display()))?;
                session
                    .authenticate_publickey(target.user.as_str(), Arc::new(key))
                    .await
                    .context("public key authentication")?
            }
        };
        if !auth {
            bail!("authentication rejected for user {}", target.user);
        }
        debug!(address = %target.address(), "ssh session established");

        let sudo_password = match &target.credential {
            Credential::Password(password) => {
                Some(SecretString::from(password.expose_secret().to_owned()))
            }
            Credential::PrivateKey { .. } => None,
        };

        Ok(Box::new(SshSession {
            handle: session,
            sftp: None,
            sudo_password,
        }))
    }
}

pub struct SshSession {
    handle: Handle<Client>,
    sftp: Option<SftpSession>,
    sudo_password: Option<SecretString>,
}

impl SshSession {
    async fn sftp(&mut self) -> anyhow::Result<&SftpSession> {
        if self.sftp.is_none() {
            let channel = self.handle.channel_open_session().await?;
            channel.request_subsystem(true, "sftp").await?;
            let sftp = SftpSession::new(channel.into_stream())
                .await
                .context("starting sftp subsystem")?;
            self.sftp = Some(sftp);
        }
        self.sftp
            .as_ref()
            .ok_or_else(|| anyhow!("sftp subsystem unavailable"))
    }
}

/// Wraps `command` in sudo; `-S` reads the password from stdin, `-n` never prompts.
pub fn privileged_command(command: &str, password_on_stdin: bool) -> String {
    if password_on_stdin {
        format!("{}-S -p '' {}", SUDO_PREPEND, command)
    } else {
        format!("{}-n {}", SUDO_PREPEND, command)
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(&mut self, command: &str, privileged: bool) -> anyhow::Result<CommandOutput> {
        let (command, stdin) = match (privileged, &self.sudo_password) {
            (false, _) => (command.to_string(), None),
            (true, Some(password)) => (
                privileged_command(command, true),
                Some(format!("{}\n", password.expose_secret())),
            ),
            (true, None) => (privileged_command(command, false), None),
        };

        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command.as_str()).await?;
        if let Some(input) = stdin {
            channel.data(input.as_bytes()).await?;
            channel.eof().await?;
        }

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status } => {
                    exit_code = Some(i32::try_from(exit_status).unwrap_or(i32::MAX))
                }
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    stderr.extend_from_slice(
                        format!("\nterminated by signal {:?}", signal_name).as_bytes(),
                    );
                }
                _ => continue,
            }
        }

        Ok(CommandOutput {
            exit_code: exit_code.unwrap_or(-1),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    async fn upload(&mut self, local: &Path, remote: &str) -> anyhow::Result<u64> {
        let source = File::open(local)
            .await
            .with_context(|| format!("cannot open {}", local.display()))?;
        let mut reader = BufReader::with_capacity(CHUNK_UPLOAD_BUFFER, source);

        let sftp = self.sftp().await?;
        let mut remote_file = sftp
            .create(remote)
            .await
            .with_context(|| format!("cannot create remote file {}", remote))?;
        let written = tokio::io::copy_buf(&mut reader, &mut remote_file).await?;
        remote_file.shutdown().await?;

        let attributes = sftp.metadata(remote).await?;
        match attributes.size {
            Some(size) if size != written => {
                bail!("remote file {} holds {} of {} bytes", remote, size, written)
            }
            _ => Ok(written),
        }
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        if let Some(sftp) = self.sftp.take() {
            if let Err(e) = sftp.close().await {
                debug!(error = %e, "closing sftp subsystem");
            }
        }
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use russh::client::Handler;

    use super::*;

    #[test]
    fn sudo_reads_password_from_stdin_without_prompt() {
        assert_eq!(
            privileged_command("avrdude -p m328p", true),
            "sudo -S -p '' avrdude -p m328p"
        );
    }

    #[test]
    fn sudo_without_password_never_prompts() {
        assert_eq!(
            privileged_command("avrdude -p m328p", false),
            "sudo -n avrdude -p m328p"
        );
    }

    const FINGERPRINT: &str = "Gz8bV3nRk1qT0bXW6r6m3mJc6m1p0G8y4V8E0v2c9hA";

    #[test]
    fn pinned_key_matches_with_or_without_prefix() {
        assert!(host_key_allowed("pi", FINGERPRINT, Some(FINGERPRINT)).is_ok());
        let prefixed = format!("SHA256:{}", FINGERPRINT);
        assert!(host_key_allowed("pi", FINGERPRINT, Some(&prefixed)).is_ok());
    }

    #[test]
    fn pinned_key_mismatch_names_both_fingerprints() {
        let err = host_key_allowed("192.168.10.154", FINGERPRINT, Some("SHA256:other"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("192.168.10.154"));
        assert!(err.contains(&format!("SHA256:{}", FINGERPRINT)));
        assert!(err.contains("expected SHA256:other"));
    }

    #[test]
    fn unpinned_key_is_accepted() {
        assert!(host_key_allowed("pi", FINGERPRINT, None).is_ok());
    }

    #[tokio::test]
    async fn generated_key_passes_its_own_pin() {
        let pair = key::KeyPair::generate_ed25519().unwrap();
        let public = pair.clone_public_key().unwrap();
        let mut client = Client {
            host: "localhost".into(),
            expected_fingerprint: Some(public.fingerprint()),
        };
        assert!(client.check_server_key(&public).await.unwrap());

        let mut pinned_elsewhere = Client {
            host: "localhost".into(),
            expected_fingerprint: Some("SHA256:other".into()),
        };
        assert!(pinned_elsewhere.check_server_key(&public).await.is_err());
    }

    #[tokio::test]
    async fn connect_gives_up_on_a_silent_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            // hold the socket open without ever sending a version banner
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(socket);
        });

        let target = DeploymentTarget {
            name: "silent".into(),
            host: "127.0.0.1".into(),
            ssh_port: port,
            user: "pi".into(),
            credential: Credential::Password(SecretString::from("pw".to_string())),
            board: "ATMEGA328P".into(),
            serial_port: "/dev/ttyACM0".into(),
            host_key_fingerprint: None,
        };

        let started = std::time::Instant::now();
        let result = SshTransport::new(Duration::from_millis(300))
            .connect(&target)
            .await;
        let elapsed = started.elapsed();

        let err = match result {
            Ok(_) => panic!("connected to a server that never spoke ssh"),
            Err(e) => e.to_string(),
        };
        assert_eq!(err, "timed out after 300ms");
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_secs(5), "took {:?}", elapsed);
        server.abort();
    }
}
