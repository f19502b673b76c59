//! Typed fleet state: APs, radios, channel-selection state and neighbors
//!
//! These structures hold everything the pollers learn from the APs,
//! independent of any I/O. The server wraps each [`Ap`] in its own lock and
//! updates it once per poll iteration so readers always see a consistent
//! per-AP snapshot.

use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::parse::{AcspRow, NeighborRollup, RadioStats};
use crate::rf::DEFAULT_TXPWR;

/// Radio interface names come from a fixed set; an AP has at most one
/// radio per name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IfName {
    Wifi0,
    Wifi1,
}

impl IfName {
    pub const ALL: [IfName; 2] = [IfName::Wifi0, IfName::Wifi1];

    pub fn as_str(&self) -> &'static str {
        match self {
            IfName::Wifi0 => "wifi0",
            IfName::Wifi1 => "wifi1",
        }
    }

    pub fn parse(s: &str) -> Option<IfName> {
        match s {
            "wifi0" => Some(IfName::Wifi0),
            "wifi1" => Some(IfName::Wifi1),
            _ => None,
        }
    }
}

impl std::fmt::Display for IfName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link state column of `show interface`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Up,
    Down,
    Unknown,
}

impl LinkState {
    pub fn from_token(s: &str) -> LinkState {
        match s {
            "U" => LinkState::Up,
            "D" => LinkState::Down,
            _ => LinkState::Unknown,
        }
    }
}

/// Radio operating mode. Only access, backhaul and dual radios run the
/// channel-selection protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RadioMode {
    Access,
    Backhaul,
    Dual,
    Other(String),
}

impl RadioMode {
    pub fn parse(s: &str) -> RadioMode {
        match s {
            "access" => RadioMode::Access,
            "backhaul" => RadioMode::Backhaul,
            "dual" => RadioMode::Dual,
            other => RadioMode::Other(other.to_string()),
        }
    }

    pub fn supports_acsp(&self) -> bool {
        matches!(self, RadioMode::Access | RadioMode::Backhaul | RadioMode::Dual)
    }
}

impl std::fmt::Display for RadioMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RadioMode::Access => "access",
            RadioMode::Backhaul => "backhaul",
            RadioMode::Dual => "dual",
            RadioMode::Other(s) => s.as_str(),
        };
        f.write_str(s)
    }
}

/// Frequency band, derived from the PHY mode string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Band {
    Ghz2,
    Ghz5,
}

impl Band {
    /// 5 GHz PHY modes all carry an 'a' (11a, 11na, 11ac); 2.4 GHz ones
    /// (11b/g, 11ng) do not.
    pub fn from_phymode(phymode: &str) -> Band {
        if phymode.contains('a') {
            Band::Ghz5
        } else {
            Band::Ghz2
        }
    }

    pub fn ghz(&self) -> u8 {
        match self {
            Band::Ghz2 => 2,
            Band::Ghz5 => 5,
        }
    }
}

/// Channel-selection state machine states, as printed by `show acsp`
/// (multi-word tokens arrive normalized with '-').
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    Disable,
    Init,
    Scanning,
    ChannelReq,
    DfsCac,
    Listening,
    /// The runtime-run state
    Enable,
    SchedWaiting,
    Other(String),
}

impl ChannelState {
    pub fn parse(token: &str) -> ChannelState {
        match token {
            "Disable" => ChannelState::Disable,
            "Init" => ChannelState::Init,
            "Scanning" => ChannelState::Scanning,
            "Channel-Req" | "Channel_Req" => ChannelState::ChannelReq,
            "DFS-CAC" | "DFS_CAC" => ChannelState::DfsCac,
            "Listening" => ChannelState::Listening,
            "Enable" => ChannelState::Enable,
            "Sched-Waiting" | "Sched_Waiting" => ChannelState::SchedWaiting,
            other => ChannelState::Other(other.to_string()),
        }
    }

    pub fn is_run(&self) -> bool {
        matches!(self, ChannelState::Enable)
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChannelState::Disable => "Disable",
            ChannelState::Init => "Init",
            ChannelState::Scanning => "Scanning",
            ChannelState::ChannelReq => "Channel-Req",
            ChannelState::DfsCac => "DFS-CAC",
            ChannelState::Listening => "Listening",
            ChannelState::Enable => "Enable",
            ChannelState::SchedWaiting => "Sched-Waiting",
            ChannelState::Other(s) => s.as_str(),
        };
        f.write_str(s)
    }
}

/// Bounded FIFO of samples whose reported value is the floor integer mean
/// of its current contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmoothWindow {
    samples: VecDeque<i32>,
}

impl SmoothWindow {
    /// Append a sample, evicting from the front so the window never
    /// exceeds `cap`. A capacity change takes effect on the next push.
    pub fn push(&mut self, v: i32, cap: usize) {
        if cap == 0 {
            self.samples.clear();
            return;
        }
        while self.samples.len() >= cap {
            self.samples.pop_front();
        }
        self.samples.push_back(v);
    }

    pub fn mean(&self) -> Option<i32> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: i64 = self.samples.iter().map(|&v| v as i64).sum();
        Some(sum.div_euclid(self.samples.len() as i64) as i32)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Channel-selection protocol state of one radio.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AcspState {
    pub supported: bool,
    pub chnl_state: Option<ChannelState>,
    pub chnl_disabled_reason: Option<String>,
    /// Wall-clock timestamp recorded when the channel state entered
    /// `Enable`; set exactly once per transition.
    pub chnl_run_ts: Option<String>,
    pub chnl: u16,
    pub width: Option<u16>,
    pub pwr_state: Option<String>,
    pub pwr_disabled_reason: Option<String>,
    pub txpwr: Option<i32>,
}

impl AcspState {
    /// Apply one parsed `show acsp` row. `now` supplies the timestamp and
    /// is only invoked on a transition into `Enable`.
    pub fn apply_row<F: FnOnce() -> String>(&mut self, row: &AcspRow, now: F) {
        if row.chnl_state == ChannelState::Enable
            && self.chnl_state.as_ref() != Some(&ChannelState::Enable)
        {
            self.chnl_run_ts = Some(now());
        }
        self.supported = true;
        self.chnl_state = Some(row.chnl_state.clone());
        self.chnl_disabled_reason = row.chnl_disabled_reason.clone();
        self.chnl = row.chnl;
        self.width = row.width;
        self.pwr_state = Some(row.pwr_state.clone());
        self.pwr_disabled_reason = row.pwr_disabled_reason.clone();
        self.txpwr = Some(row.txpwr);
    }
}

/// One entry of a radio's neighbor table. The neighbor radio itself lives
/// on another AP in the store; it is referenced by identity (IP plus
/// interface name) rather than owned, to avoid ownership cycles.
#[derive(Debug, Clone, Serialize)]
pub struct AcspNeighbor {
    pub ap_ip: Ipv4Addr,
    pub ifname: IfName,
    pub mac: String,
    pub rssi_window: SmoothWindow,
    pub rssi: Option<i32>,
    pub sta_cnt: i32,
    pub crc_err: i32,
    pub tot_cu: i32,
}

/// A neighbor observation from one poll of `show acsp neighbor`,
/// resolved against the known fleet.
#[derive(Debug, Clone)]
pub struct ObservedNeighbor {
    pub ap_ip: Ipv4Addr,
    pub ifname: IfName,
    pub mac: String,
    pub rollup: NeighborRollup,
}

/// One radio of an AP.
#[derive(Debug, Clone, Serialize)]
pub struct Radio {
    pub name: IfName,
    pub mac: String,
    pub link_state: LinkState,
    pub mode: Option<RadioMode>,
    pub phymode: Option<String>,
    pub band: Option<Band>,
    pub nfloor_window: SmoothWindow,
    /// Smoothed noise floor in dBm
    pub nfloor: Option<i32>,
    pub acsp: AcspState,
    /// Neighbor entries keyed by the neighbor radio's hardware address.
    /// An entry exists only while the neighbor shows up in the most
    /// recent poll.
    pub nbrs: HashMap<String, AcspNeighbor>,
    pub nbr_score: Option<f64>,
    /// Coverage radius in canvas dots
    pub coverage_r: f64,
    /// Center on the canvas; both radios of an AP share one center
    pub center: Option<Point>,
}

impl Radio {
    pub fn new(name: IfName, mac: String, link_state: LinkState) -> Self {
        Radio {
            name,
            mac,
            link_state,
            mode: None,
            phymode: None,
            band: None,
            nfloor_window: SmoothWindow::default(),
            nfloor: None,
            acsp: AcspState::default(),
            nbrs: HashMap::new(),
            nbr_score: None,
            coverage_r: 0.0,
            center: None,
        }
    }

    /// Apply one parsed `show interface <name>` result.
    pub fn apply_stats(&mut self, stats: &RadioStats, window: usize) {
        self.mode = Some(RadioMode::parse(&stats.mode));
        self.phymode = Some(stats.phymode.clone());
        self.band = Some(Band::from_phymode(&stats.phymode));
        self.nfloor_window.push(stats.nfloor, window);
        self.nfloor = self.nfloor_window.mean();
    }

    pub fn supports_acsp(&self) -> bool {
        self.mode.as_ref().is_some_and(|m| m.supports_acsp())
    }

    /// Replace the neighbor table with this poll's observations. The RSSI
    /// smoothing window carries over for neighbors that stayed observed;
    /// entries for neighbors absent from this poll are dropped.
    pub fn update_neighbors(&mut self, observed: Vec<ObservedNeighbor>, window: usize) {
        let mut next = HashMap::with_capacity(observed.len());
        for obs in observed {
            let mut nbr = self.nbrs.remove(&obs.mac).unwrap_or(AcspNeighbor {
                ap_ip: obs.ap_ip,
                ifname: obs.ifname,
                mac: obs.mac.clone(),
                rssi_window: SmoothWindow::default(),
                rssi: None,
                sta_cnt: 0,
                crc_err: 0,
                tot_cu: 0,
            });
            nbr.ap_ip = obs.ap_ip;
            nbr.ifname = obs.ifname;
            nbr.rssi_window.push(obs.rollup.rssi_mean, window);
            nbr.rssi = nbr.rssi_window.mean();
            nbr.sta_cnt = obs.rollup.sta_cnt;
            nbr.crc_err = obs.rollup.crc_err;
            nbr.tot_cu = obs.rollup.tot_cu;
            next.insert(obs.mac, nbr);
        }
        self.nbrs = next;
    }

    /// Neighbor entries ordered nearest-first by estimated path loss:
    /// the neighbor radio's transmit power (assumed 20 dBm until it
    /// reports one) minus the smoothed RSSI it was heard at. The
    /// neighbor radio lives on another AP, so its transmit power is
    /// resolved through the caller.
    pub fn nbrs_bydist<F>(&self, txpwr_of: F) -> Vec<&AcspNeighbor>
    where
        F: Fn(&AcspNeighbor) -> Option<i32>,
    {
        let mut nbrs: Vec<&AcspNeighbor> = self.nbrs.values().collect();
        nbrs.sort_by_key(|n| txpwr_of(n).unwrap_or(DEFAULT_TXPWR) - n.rssi.unwrap_or(0));
        nbrs
    }
}

impl std::fmt::Display for Radio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.name,
            self.mac,
            self.mode
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "?".to_string()),
            self.phymode.as_deref().unwrap_or("?")
        )
    }
}

/// One access point, identified by its IP address for the whole run.
#[derive(Debug, Clone, Serialize)]
pub struct Ap {
    pub ip: Ipv4Addr,
    pub name: Option<String>,
    pub mac: Option<String>,
    pub hive: Option<String>,
    /// Toggles as the shell session comes and goes; the record itself is
    /// never removed once created.
    pub active: bool,
    pub radios: HashMap<IfName, Radio>,
}

impl Ap {
    pub fn new(ip: Ipv4Addr) -> Self {
        Ap {
            ip,
            name: None,
            mac: None,
            hive: None,
            active: false,
            radios: HashMap::new(),
        }
    }

    pub fn setup_radio(&mut self, name: IfName, mac: String, state: LinkState) {
        self.radios.insert(name, Radio::new(name, mac, state));
    }

    pub fn radio(&self, name: IfName) -> Option<&Radio> {
        self.radios.get(&name)
    }

    pub fn radio_mut(&mut self, name: IfName) -> Option<&mut Radio> {
        self.radios.get_mut(&name)
    }

    /// Both radios of an AP share one physical location.
    pub fn set_center(&mut self, center: Point) {
        for radio in self.radios.values_mut() {
            radio.center = Some(center);
        }
    }

    /// Label drawn at the circle center: platform name and MAC.
    pub fn display_label(&self) -> String {
        format!(
            "{}/{}",
            self.name.as_deref().unwrap_or("?"),
            self.mac.as_deref().unwrap_or("?")
        )
    }
}

impl std::fmt::Display for Ap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.name.as_deref().unwrap_or("?"),
            self.mac.as_deref().unwrap_or("?"),
            self.ip
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_never_exceeds_capacity() {
        let mut w = SmoothWindow::default();
        for v in 0..10 {
            w.push(v, 3);
            assert!(w.len() <= 3);
        }
        assert_eq!(w.mean(), Some(8)); // 7, 8, 9
    }

    #[test]
    fn test_window_floor_mean_of_negatives() {
        let mut w = SmoothWindow::default();
        for v in [-91, -90, -90] {
            w.push(v, 3);
        }
        // -271 / 3 floors to -91, not -90
        assert_eq!(w.mean(), Some(-91));
    }

    #[test]
    fn test_window_shrinks_when_capacity_drops() {
        let mut w = SmoothWindow::default();
        for v in [1, 2, 3, 4, 5] {
            w.push(v, 5);
        }
        w.push(6, 2);
        assert_eq!(w.len(), 2);
        assert_eq!(w.mean(), Some(5)); // 5, 6
    }

    #[test]
    fn test_band_from_phymode() {
        assert_eq!(Band::from_phymode("11a"), Band::Ghz5);
        assert_eq!(Band::from_phymode("11na"), Band::Ghz5);
        assert_eq!(Band::from_phymode("11ac"), Band::Ghz5);
        assert_eq!(Band::from_phymode("11b/g"), Band::Ghz2);
        assert_eq!(Band::from_phymode("11ng"), Band::Ghz2);
    }

    #[test]
    fn test_run_timestamp_set_once_per_transition() {
        let mut acsp = AcspState::default();
        let row_run = AcspRow {
            chnl_state: ChannelState::Enable,
            chnl_disabled_reason: None,
            chnl: 6,
            width: None,
            pwr_state: "Enable".to_string(),
            pwr_disabled_reason: None,
            txpwr: 18,
        };
        let row_scan = AcspRow {
            chnl_state: ChannelState::Scanning,
            ..row_run.clone()
        };

        let mut calls = 0;
        let stamp = |calls: &mut u32| {
            *calls += 1;
            format!("t{}", calls)
        };

        acsp.apply_row(&row_run, || stamp(&mut calls));
        assert_eq!(acsp.chnl_run_ts.as_deref(), Some("t1"));

        // Staying in Enable must not re-stamp
        acsp.apply_row(&row_run, || stamp(&mut calls));
        assert_eq!(calls, 1);
        assert_eq!(acsp.chnl_run_ts.as_deref(), Some("t1"));

        // Leaving and re-entering stamps again, exactly once
        acsp.apply_row(&row_scan, || stamp(&mut calls));
        acsp.apply_row(&row_run, || stamp(&mut calls));
        assert_eq!(calls, 2);
        assert_eq!(acsp.chnl_run_ts.as_deref(), Some("t2"));
    }

    #[test]
    fn test_neighbor_window_carries_over_while_observed() {
        let ip = Ipv4Addr::new(10, 0, 0, 2);
        let mut radio = Radio::new(IfName::Wifi0, "0819:a6f0:3c40".into(), LinkState::Up);
        let obs = |rssi| ObservedNeighbor {
            ap_ip: ip,
            ifname: IfName::Wifi1,
            mac: "0819:a6f0:aaaa".into(),
            rollup: NeighborRollup {
                rssi_mean: rssi,
                sta_cnt: 2,
                crc_err: 1,
                tot_cu: 30,
                rows: 1,
            },
        };

        radio.update_neighbors(vec![obs(-60)], 3);
        radio.update_neighbors(vec![obs(-64)], 3);
        let nbr = &radio.nbrs["0819:a6f0:aaaa"];
        assert_eq!(nbr.rssi_window.len(), 2);
        assert_eq!(nbr.rssi, Some(-62));

        // Neighbor absent from this poll: entry dropped
        radio.update_neighbors(vec![], 3);
        assert!(radio.nbrs.is_empty());
    }

    #[test]
    fn test_nbrs_bydist_orders_by_path_loss() {
        let ip = Ipv4Addr::new(10, 0, 0, 2);
        let mut radio = Radio::new(IfName::Wifi0, "0819:a6f0:3c40".into(), LinkState::Up);
        let obs = |mac: &str, rssi| ObservedNeighbor {
            ap_ip: ip,
            ifname: IfName::Wifi0,
            mac: mac.into(),
            rollup: NeighborRollup {
                rssi_mean: rssi,
                sta_cnt: 0,
                crc_err: 0,
                tot_cu: 0,
                rows: 1,
            },
        };
        radio.update_neighbors(
            vec![obs("aa", -40), obs("bb", -20), obs("cc", -60)],
            3,
        );

        // aa transmits at 10 dBm (loss 50), bb has not reported a power
        // yet (20 - -20 = 40), cc at 20 dBm (loss 80)
        let ordered = radio.nbrs_bydist(|n| match n.mac.as_str() {
            "aa" => Some(10),
            "cc" => Some(20),
            _ => None,
        });
        let macs: Vec<&str> = ordered.iter().map(|n| n.mac.as_str()).collect();
        assert_eq!(macs, vec!["bb", "aa", "cc"]);
    }

    #[test]
    fn test_two_radios_share_center() {
        let mut ap = Ap::new(Ipv4Addr::new(10, 0, 0, 1));
        ap.setup_radio(IfName::Wifi0, "mac0".into(), LinkState::Up);
        ap.setup_radio(IfName::Wifi1, "mac1".into(), LinkState::Up);
        ap.set_center(Point::new(400.0, 300.0));
        assert_eq!(
            ap.radio(IfName::Wifi0).unwrap().center,
            ap.radio(IfName::Wifi1).unwrap().center
        );
    }
}
