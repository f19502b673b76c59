//! Interactive SSH shell session to one AP
//!
//! Each AP gets one persistent shell channel; every poll command runs
//! over it. Commands are serialized by a per-session mutex, stale bytes
//! are drained before each send, and any mid-command failure tears the
//! session down so the poller reopens it on its next tick.

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, AuthResult, Msg};
use russh::keys::ssh_key;
use russh::{Channel, ChannelMsg, Disconnect};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};

use crate::MonitorError;

/// Hard ceiling on connect and on waiting for command output; past it
/// the node counts as rebooted or powered off.
pub const SSH_LOST_TIMEOUT: Duration = Duration::from_secs(3);

/// Connect-probe timeout used by the discovery scanner.
pub const SSH_NODE_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Settle delay between sending a command and reading its output.
pub const SSH_CMD_DELAY_DEFAULT: f64 = 0.5;

/// 96 KiB; a full `show acsp neighbor` dump can exceed 75 KiB.
pub const SSH_CMD_BUF_LEN: usize = 98_304;

pub const SSH_PORT: u16 = 22;

/// Poll granularity for the non-blocking drain of stale output.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Once output started, how long a pause marks the end of it.
const QUIET_WINDOW: Duration = Duration::from_millis(200);

/// Login shared by every AP in the fleet.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Credentials {
            username: "admin".to_string(),
            password: "aerohive".to_string(),
        }
    }
}

impl FromStr for Credentials {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user, pass) = s.split_once(':').ok_or(MonitorError::BadCredentials)?;
        if user.is_empty() {
            return Err(MonitorError::BadCredentials);
        }
        Ok(Credentials {
            username: user.to_string(),
            password: pass.to_string(),
        })
    }
}

/// APs are reached by IP on a management subnet; host keys are not
/// tracked across fleets, so any server key is accepted.
struct Handler;

impl client::Handler for Handler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _key: &ssh_key::PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

struct ShellChannel {
    handle: client::Handle<Handler>,
    channel: Channel<Msg>,
}

/// One serialized interactive shell to one AP.
pub struct ShellSession {
    ip: Ipv4Addr,
    creds: Credentials,
    inner: Mutex<Option<ShellChannel>>,
}

impl ShellSession {
    pub fn new(ip: Ipv4Addr, creds: Credentials) -> Self {
        ShellSession {
            ip,
            creds,
            inner: Mutex::new(None),
        }
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    /// Establish the shell: connect and authenticate within
    /// [`SSH_LOST_TIMEOUT`], discard the banner, then disable paging and
    /// the console idle timeout so command output arrives in one piece.
    pub async fn open(&self, extra_delay: f64) -> Result<(), MonitorError> {
        {
            let mut guard = self.inner.lock().await;
            if guard.is_some() {
                return Ok(());
            }

            let config = Arc::new(client::Config::default());
            let mut handle = timeout(
                SSH_LOST_TIMEOUT,
                client::connect(config, (self.ip, SSH_PORT), Handler),
            )
            .await
            .map_err(|_| MonitorError::Unreachable(self.ip))?
            .map_err(|_| MonitorError::Unreachable(self.ip))?;

            let auth = handle
                .authenticate_password(self.creds.username.as_str(), self.creds.password.as_str())
                .await
                .map_err(|_| MonitorError::Unreachable(self.ip))?;
            if !matches!(auth, AuthResult::Success) {
                return Err(MonitorError::Unreachable(self.ip));
            }

            let channel = handle
                .channel_open_session()
                .await
                .map_err(|_| MonitorError::Unreachable(self.ip))?;
            channel
                .request_pty(false, "vt100", 120, 40, 0, 0, &[])
                .await
                .map_err(|_| MonitorError::Unreachable(self.ip))?;
            channel
                .request_shell(false)
                .await
                .map_err(|_| MonitorError::Unreachable(self.ip))?;

            let mut shell = ShellChannel { handle, channel };

            // Let the login banner arrive, then throw it away
            sleep(Duration::from_secs_f64(SSH_CMD_DELAY_DEFAULT + extra_delay)).await;
            drain(&mut shell.channel).await;

            *guard = Some(shell);
        }

        self.command("console timeout 0\n", SSH_CMD_DELAY_DEFAULT, extra_delay)
            .await?;
        self.command("console page 0\n", SSH_CMD_DELAY_DEFAULT, extra_delay)
            .await?;
        log::info!("Node {} connected through SSH", self.ip);
        Ok(())
    }

    /// Run one command over the shell and return the raw output,
    /// including the echoed command and the trailing prompt. The caller
    /// supplies the terminating newline. A timeout or transport failure
    /// closes the session and surfaces as `SessionLost`.
    pub async fn command(
        &self,
        cmd: &str,
        settle_delay: f64,
        extra_delay: f64,
    ) -> Result<String, MonitorError> {
        let mut guard = self.inner.lock().await;
        let lost = || MonitorError::SessionLost(self.ip, cmd.trim_end().to_string());
        let Some(shell) = guard.as_mut() else {
            return Err(lost());
        };

        match transact(&mut shell.channel, cmd, settle_delay + extra_delay).await {
            Some(out) => {
                log::trace!("{} >>> {:?}", self.ip, cmd.trim_end());
                log::trace!("{} <<< {} bytes", self.ip, out.len());
                Ok(out)
            }
            None => {
                if let Some(shell) = guard.take() {
                    let _ = shell
                        .handle
                        .disconnect(Disconnect::ByApplication, "", "en")
                        .await;
                }
                log::warn!(
                    "Node {} SSH timeout at cmd {:?}",
                    self.ip,
                    cmd.trim_end()
                );
                Err(lost())
            }
        }
    }

    /// Like [`ShellSession::command`], but with the echoed command line
    /// and the trailing shell prompt stripped.
    pub async fn command_lines(
        &self,
        cmd: &str,
        settle_delay: f64,
        extra_delay: f64,
    ) -> Result<Vec<String>, MonitorError> {
        let out = self.command(cmd, settle_delay, extra_delay).await?;
        Ok(strip_echo_and_prompt(&out))
    }

    /// Idempotent teardown.
    pub async fn close(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(shell) = guard.take() {
            let _ = shell.channel.close().await;
            let _ = shell
                .handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await;
            log::info!("Node {} SSH closed", self.ip);
        }
    }
}

/// Send the command, wait out the settle delay, then read until the
/// output goes quiet or the buffer limit is reached. `None` marks a lost
/// session.
async fn transact(channel: &mut Channel<Msg>, cmd: &str, delay: f64) -> Option<String> {
    if !drain(channel).await {
        return None;
    }
    channel.data(cmd.as_bytes()).await.ok()?;
    if delay > 0.0 {
        sleep(Duration::from_secs_f64(delay)).await;
    }

    let mut buf: Vec<u8> = Vec::new();
    let first = timeout(SSH_LOST_TIMEOUT, wait_data(channel)).await.ok()??;
    buf.extend_from_slice(&first);

    while buf.len() < SSH_CMD_BUF_LEN {
        match timeout(QUIET_WINDOW, wait_data(channel)).await {
            Ok(Some(data)) => buf.extend_from_slice(&data),
            Ok(None) => return None,
            Err(_) => break,
        }
    }
    buf.truncate(SSH_CMD_BUF_LEN);
    Some(String::from_utf8_lossy(&buf).into_owned())
}

/// Read and discard whatever the device produced since the last command.
/// Returns false when the channel turns out to be closed.
async fn drain(channel: &mut Channel<Msg>) -> bool {
    loop {
        match timeout(DRAIN_POLL, channel.wait()).await {
            Ok(Some(ChannelMsg::Eof)) | Ok(Some(ChannelMsg::Close)) | Ok(None) => return false,
            Ok(Some(_)) => continue,
            Err(_) => return true,
        }
    }
}

/// Next chunk of shell output; `None` when the channel closed.
async fn wait_data(channel: &mut Channel<Msg>) -> Option<Vec<u8>> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => return Some(data.to_vec()),
            Some(ChannelMsg::ExtendedData { data, .. }) => return Some(data.to_vec()),
            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => return None,
            Some(_) => continue,
        }
    }
}

/// The device echoes the command on the first line and ends with its
/// shell prompt on the last; both are dropped.
pub fn strip_echo_and_prompt(out: &str) -> Vec<String> {
    let lines: Vec<&str> = out.split('\n').collect();
    if lines.len() <= 2 {
        return Vec::new();
    }
    lines[1..lines.len() - 1]
        .iter()
        .map(|l| l.trim_end_matches('\r').to_string())
        .collect()
}
