//! Discovery scanner
//!
//! Probes the configured target set for hosts answering on the shell
//! port and spawns a dedicated poller task for every newcomer. Known IPs
//! are skipped; a host removed as a non-AP becomes eligible again on a
//! later sweep.

use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle};

use crate::poller::Poller;
use crate::settings::Settings;
use crate::shell::{Credentials, ShellSession, SSH_NODE_PROBE_TIMEOUT, SSH_PORT};
use crate::store::{ApHandle, ModelStore};
use crate::{MonitorError, NEW_NODE_DETECT_INTERVAL};

pub struct Scanner {
    pub store: Arc<ModelStore>,
    pub settings: Arc<Settings>,
    pub creds: Credentials,
    pub targets: Vec<Ipv4Addr>,
}

impl Scanner {
    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), MonitorError> {
        log::info!(
            "Scanning {} targets every {:?}",
            self.targets.len(),
            NEW_NODE_DETECT_INTERVAL
        );
        loop {
            tokio::select! { biased;
                _ = subsys.on_shutdown_requested() => return Ok(()),
                _ = self.sweep(&subsys) => {}
            }
            tokio::select! { biased;
                _ = subsys.on_shutdown_requested() => return Ok(()),
                _ = sleep(NEW_NODE_DETECT_INTERVAL) => {}
            }
        }
    }

    /// One probe round: try a TCP connect to the shell port on every
    /// target concurrently, then adopt the responders we did not know.
    async fn sweep(&self, subsys: &SubsystemHandle) {
        let mut probes = JoinSet::new();
        for &ip in &self.targets {
            probes.spawn(async move {
                match timeout(SSH_NODE_PROBE_TIMEOUT, TcpStream::connect((ip, SSH_PORT))).await
                {
                    Ok(Ok(_)) => Some(ip),
                    _ => None,
                }
            });
        }

        while let Some(res) = probes.join_next().await {
            let Ok(Some(ip)) = res else { continue };
            if !self.store.note_node(ip) {
                continue;
            }
            log::info!("Node {} answers on the shell port", ip);

            let handle = Arc::new(ApHandle::new(
                ip,
                self.store.next_seq(),
                ShellSession::new(ip, self.creds.clone()),
            ));
            let poller = Poller {
                ap: handle,
                store: self.store.clone(),
                settings: self.settings.clone(),
            };
            subsys.start(SubsystemBuilder::new(format!("Poller-{}", ip), |s| {
                poller.run(s)
            }));
        }
    }
}
