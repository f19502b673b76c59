//! Per-AP poller
//!
//! One task per AP. On first contact it verifies the host is really an
//! AP, reads its identity and sets up the radio records; afterwards it
//! loops forever: poll each radio's interface stats, channel-selection
//! row and neighbor table, then apply the whole iteration to the shared
//! record in one critical section. Session loss only marks the AP
//! inactive; the next tick reopens the shell.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_graceful_shutdown::SubsystemHandle;

use acspmon_core::parse::{
    parse_acsp_table, parse_interface_brief, parse_mgt0, parse_neighbor_rows, parse_platform,
    parse_radio_stats, AcspRow, RadioStats,
};
use acspmon_core::{rf, ChannelState, IfName, LinkState, ObservedNeighbor, RadioMode};

use crate::settings::{Settings, Tunables};
use crate::shell::SSH_CMD_DELAY_DEFAULT;
use crate::store::{ApHandle, ModelStore};
use crate::MonitorError;

/// Pause between poll iterations.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The neighbor dump is the heavy command; give the device time to
/// produce all of it.
const NBR_CMD_DELAY: f64 = 2.0;

/// Platform names starting with this prefix are switches, not APs.
const SWITCH_PLATFORM_PREFIX: &str = "SR";

/// A host qualifies as an AP when its filtered interface listing really
/// shows the first radio.
fn has_wifi0_interface(lines: &[String]) -> bool {
    !lines.is_empty() && lines.join("").contains("Wifi0")
}

fn is_switch_platform(name: &str) -> bool {
    name.starts_with(SWITCH_PLATFORM_PREFIX)
}

/// Identity of another AP's radio, captured before our own lock is
/// taken.
struct FleetRadio {
    ap_ip: Ipv4Addr,
    ifname: IfName,
    mac: String,
    chnl_state: Option<ChannelState>,
}

/// Everything learned about one radio during the I/O phase of an
/// iteration.
struct PolledRadio {
    ifname: IfName,
    stats: RadioStats,
    acsp: Option<(AcspRow, Vec<ObservedNeighbor>)>,
}

pub struct Poller {
    pub ap: Arc<ApHandle>,
    pub store: Arc<ModelStore>,
    pub settings: Arc<Settings>,
}

impl Poller {
    fn ip(&self) -> Ipv4Addr {
        self.ap.ip
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), MonitorError> {
        let mut verified = false;
        let cancel = subsys.create_cancellation_token();

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let t = self.settings.snapshot();

            if !self.ap.session.is_open().await {
                if let Err(e) = self.ap.session.open(t.cmd_delay_extra).await {
                    log::debug!("{}: {}", self.ip(), e);
                    self.mark_inactive();
                    if !self.pause(&subsys).await {
                        break;
                    }
                    continue;
                }
            }

            let step = if verified {
                self.poll_once(&t).await
            } else {
                match self.first_contact(&t).await {
                    Ok(()) => {
                        verified = true;
                        self.store.register(self.ap.clone());
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            };

            match step {
                Ok(()) => {}
                Err(MonitorError::UnsupportedRole(ip, why)) => {
                    log::warn!("Host {} dropped: {}", ip, why);
                    self.store.remove(ip);
                    self.ap.session.close().await;
                    return Ok(());
                }
                Err(MonitorError::Parse(e)) if !verified => {
                    // Identity could not be read; give the scanner a
                    // chance to retry this host from scratch
                    log::warn!("[{}] failed to parse identity: {}", self.ip(), e);
                    self.store.remove(self.ip());
                    self.ap.session.close().await;
                    return Ok(());
                }
                Err(MonitorError::Parse(e)) => {
                    log::warn!("[{}] parse failure, iteration dropped: {}", self.ip(), e);
                }
                Err(MonitorError::SessionLost(ip, cmd)) => {
                    log::warn!("AP {} offline (at {:?})", ip, cmd);
                    self.mark_inactive();
                }
                Err(e) => {
                    log::warn!("[{}] poll failed: {}", self.ip(), e);
                    self.mark_inactive();
                }
            }

            if !self.pause(&subsys).await {
                break;
            }
        }

        self.ap.session.close().await;
        Ok(())
    }

    /// Sleep out the poll interval; false means shutdown was requested.
    async fn pause(&self, subsys: &SubsystemHandle) -> bool {
        tokio::select! { biased;
            _ = subsys.on_shutdown_requested() => false,
            _ = sleep(POLL_INTERVAL) => true,
        }
    }

    fn mark_inactive(&self) {
        self.ap.state.lock().unwrap().active = false;
    }

    /// Verify the host is an AP and read its identity: wifi0 presence,
    /// management MAC and hive, platform name, then the radio records.
    async fn first_contact(&self, t: &Tunables) -> Result<(), MonitorError> {
        let s = &self.ap.session;
        let x = t.cmd_delay_extra;

        let wifi0 = s
            .command_lines("show interface | in wifi0\n", SSH_CMD_DELAY_DEFAULT, x)
            .await?;
        if !has_wifi0_interface(&wifi0) {
            return Err(MonitorError::UnsupportedRole(
                self.ip(),
                "no wifi0 interface".to_string(),
            ));
        }
        let brief0 = parse_interface_brief(&wifi0)?;

        let mgt = s
            .command_lines("show interface | in mgt0\n", SSH_CMD_DELAY_DEFAULT, x)
            .await?;
        let mgt = parse_mgt0(&mgt)?;

        let platform = s
            .command_lines("show version | in Platform\n", 1.0, x)
            .await?;
        let name = parse_platform(&platform)?;
        if is_switch_platform(&name) {
            return Err(MonitorError::UnsupportedRole(
                self.ip(),
                format!("platform {}", name),
            ));
        }

        let wifi1 = s
            .command_lines("show interface | in wifi1\n", SSH_CMD_DELAY_DEFAULT, x)
            .await?;
        let brief1 = if wifi1.is_empty() {
            None
        } else {
            parse_interface_brief(&wifi1).ok()
        };

        let mut st = self.ap.state.lock().unwrap();
        st.name = Some(name);
        st.mac = Some(mgt.mac);
        st.hive = Some(mgt.hive);
        st.active = true;
        st.setup_radio(
            IfName::Wifi0,
            brief0.mac,
            LinkState::from_token(&brief0.state),
        );
        if let Some(b1) = brief1 {
            st.setup_radio(IfName::Wifi1, b1.mac, LinkState::from_token(&b1.state));
        }
        log::info!("AP {} verified: {}", self.ip(), *st);
        Ok(())
    }

    /// One poll iteration: all shell I/O and parsing first, then a
    /// single critical section applying the whole batch, so readers
    /// never see half an update.
    async fn poll_once(&self, t: &Tunables) -> Result<(), MonitorError> {
        let s = &self.ap.session;
        let x = t.cmd_delay_extra;

        let ifnames: Vec<IfName> = {
            let st = self.ap.state.lock().unwrap();
            IfName::ALL
                .iter()
                .copied()
                .filter(|n| st.radios.contains_key(n))
                .collect()
        };
        let others = self.collect_fleet_radios();

        let mut polled: Vec<PolledRadio> = Vec::with_capacity(ifnames.len());
        for ifname in ifnames {
            let raw = s
                .command(
                    &format!("show interface {}\n", ifname),
                    SSH_CMD_DELAY_DEFAULT,
                    x,
                )
                .await?;
            if t.debug {
                log::debug!("[{}] {} stats:\n{}", self.ip(), ifname, raw);
            }
            let stats = parse_radio_stats(&raw)?;

            let acsp = if RadioMode::parse(&stats.mode).supports_acsp() {
                let acsp_lines = s
                    .command_lines("show acsp\n", SSH_CMD_DELAY_DEFAULT, x)
                    .await?;
                let row = parse_acsp_table(&acsp_lines, ifname)?;

                let nbr_lines = s
                    .command_lines("show acsp neighbor\n", NBR_CMD_DELAY, x)
                    .await?;
                let mut observed = Vec::new();
                for other in &others {
                    if let Some(rollup) = parse_neighbor_rows(&nbr_lines, &other.mac)? {
                        observed.push(ObservedNeighbor {
                            ap_ip: other.ap_ip,
                            ifname: other.ifname,
                            mac: other.mac.clone(),
                            rollup,
                        });
                    }
                }
                Some((row, observed))
            } else {
                log::warn!(
                    "[{}] ACSP not supported on {} with mode {}",
                    self.ip(),
                    ifname,
                    stats.mode
                );
                None
            };

            polled.push(PolledRadio {
                ifname,
                stats,
                acsp,
            });
        }

        let nbr_states: HashMap<String, ChannelState> = others
            .into_iter()
            .filter_map(|o| o.chnl_state.map(|st| (o.mac, st)))
            .collect();

        let mut st = self.ap.state.lock().unwrap();
        for p in polled {
            let Some(radio) = st.radio_mut(p.ifname) else {
                continue;
            };
            radio.apply_stats(&p.stats, t.smooth_window);

            match p.acsp {
                Some((row, observed)) => {
                    radio.acsp.apply_row(&row, || {
                        chrono::Local::now().format("%m-%d_%H:%M:%S").to_string()
                    });
                    radio.update_neighbors(observed, t.smooth_window);
                    if let Some(txpwr) = radio.acsp.txpwr {
                        radio.coverage_r = rf::coverage_radius_dots(
                            txpwr,
                            radio.acsp.chnl,
                            t.fleet_nfloor,
                            t.nfloor_margin,
                            t.meter_per_dot,
                        );
                    }
                }
                None => {
                    radio.acsp.supported = false;
                }
            }

            let entries = radio
                .nbrs
                .values()
                .map(|n| (nbr_states.get(&n.mac), n.rssi.unwrap_or(t.fleet_nfloor)));
            radio.nbr_score = Some(rf::neighbor_score(entries, t.fleet_nfloor));
        }
        st.active = true;
        Ok(())
    }

    /// Identities and channel states of every other AP's radios,
    /// collected under their locks before ours is taken.
    fn collect_fleet_radios(&self) -> Vec<FleetRadio> {
        let mut out = Vec::new();
        for handle in self.store.aps_snapshot() {
            if handle.ip == self.ip() {
                continue;
            }
            let st = handle.state.lock().unwrap();
            for radio in st.radios.values() {
                out.push(FleetRadio {
                    ap_ip: handle.ip,
                    ifname: radio.name,
                    mac: radio.mac.clone(),
                    chnl_state: radio.acsp.chnl_state.clone(),
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_platforms_are_rejected() {
        assert!(is_switch_platform("SR2024"));
        assert!(is_switch_platform("SR2148P"));
        assert!(!is_switch_platform("AP330"));
        assert!(!is_switch_platform("AP121"));
    }

    #[test]
    fn test_wifi0_presence_check() {
        let ap = vec!["Wifi0     0819:a6f0:3c40  1500  U  access".to_string()];
        assert!(has_wifi0_interface(&ap));
        assert!(!has_wifi0_interface(&[]));
        let other = vec!["Eth0      0819:a6f0:3c40  1500  U".to_string()];
        assert!(!has_wifi0_interface(&other));
    }
}
