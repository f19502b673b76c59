//! Positioning sweep
//!
//! Every few seconds: recompute the fleet-wide noise floor, snapshot the
//! fleet, run the trilateration solver and write the resulting centers
//! back. Manual mode leaves placement to the drawing collaborator;
//! random mode scatters APs for testing.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use rand::Rng;
use tokio::time::sleep;
use tokio_graceful_shutdown::SubsystemHandle;

use acspmon_core::placement::{solve, ApSite, FleetSnapshot, RadioSite, SolveConfig};
use acspmon_core::{CoordMethod, IfName, Point, Radio};

use crate::settings::Settings;
use crate::store::{ApHandle, ModelStore};
use crate::{MonitorError, NEW_NODE_DETECT_INTERVAL};

/// Margin kept between a randomly placed AP and the canvas edge.
const RANDOM_MARGIN: f64 = 50.0;

pub struct Positioner {
    pub store: Arc<ModelStore>,
    pub settings: Arc<Settings>,
}

impl Positioner {
    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), MonitorError> {
        loop {
            self.sweep();
            tokio::select! { biased;
                _ = subsys.on_shutdown_requested() => return Ok(()),
                _ = sleep(NEW_NODE_DETECT_INTERVAL) => {}
            }
        }
    }

    fn sweep(&self) {
        let handles = self.store.aps_snapshot();
        if handles.is_empty() {
            return;
        }

        self.update_fleet_nfloor(&handles);
        let t = self.settings.snapshot();

        match t.coord_method {
            CoordMethod::Manual => {}
            CoordMethod::Random => {
                let (w, h) = (t.canvas_w as f64, t.canvas_h as f64);
                if w <= 2.0 * RANDOM_MARGIN + 1.0 || h <= 2.0 * RANDOM_MARGIN + 1.0 {
                    return;
                }
                let mut rng = rand::thread_rng();
                for handle in &handles {
                    let mut st = handle.state.lock().unwrap();
                    if st.radios.is_empty() {
                        continue;
                    }
                    let c = Point::new(
                        rng.gen_range(RANDOM_MARGIN..w - RANDOM_MARGIN),
                        rng.gen_range(RANDOM_MARGIN..h - RANDOM_MARGIN),
                    );
                    st.set_center(c);
                }
            }
            CoordMethod::Auto => {
                let fleet = snapshot_fleet(&handles);
                let cfg = SolveConfig {
                    by_score: t.nbr_score_order,
                    canvas_w: t.canvas_w as f64,
                    canvas_h: t.canvas_h as f64,
                    meters_per_dot: t.meter_per_dot,
                };
                let outcome = solve(&fleet, &cfg);
                for p in &outcome.placed {
                    if let Some(handle) = self.store.get(p.ip) {
                        handle.state.lock().unwrap().set_center(p.center);
                    }
                }
                for ip in &outcome.deferred {
                    log::debug!("Delayed {} coord calc, references not available", ip);
                }
            }
        }
    }

    /// Running mean of all smoothed per-radio noise floors, feeding the
    /// coverage-radius and neighbor-score derivations of the next polls.
    fn update_fleet_nfloor(&self, handles: &[Arc<ApHandle>]) {
        let mut total: i64 = 0;
        let mut radios: i64 = 0;
        for handle in handles {
            let st = handle.state.lock().unwrap();
            for radio in st.radios.values() {
                if let Some(nf) = radio.nfloor {
                    total += nf as i64;
                    radios += 1;
                }
            }
        }
        if radios > 0 {
            self.settings
                .fleet_nfloor
                .store(total.div_euclid(radios) as i32, Ordering::Relaxed);
        }
    }
}

fn radio_site(radio: &Radio) -> RadioSite {
    RadioSite {
        mac: radio.mac.clone(),
        chnl: radio.acsp.chnl,
        txpwr: radio.acsp.txpwr,
        coverage_r: radio.coverage_r,
        nbr_score: radio.nbr_score,
        nbrs: radio
            .nbrs
            .iter()
            .filter_map(|(mac, n)| n.rssi.map(|rssi| (mac.clone(), rssi)))
            .collect(),
    }
}

/// Immutable per-sweep copy of everything the solver needs, taken under
/// each AP's lock in discovery order.
fn snapshot_fleet(handles: &[Arc<ApHandle>]) -> FleetSnapshot {
    let mut aps = Vec::with_capacity(handles.len());
    for handle in handles {
        let st = handle.state.lock().unwrap();
        let Some(wifi0) = st.radio(IfName::Wifi0) else {
            continue;
        };
        aps.push(ApSite {
            ip: handle.ip,
            wifi0: radio_site(wifi0),
            wifi1: st.radio(IfName::Wifi1).map(radio_site),
        });
    }
    FleetSnapshot { aps }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{Credentials, ShellSession};
    use acspmon_core::LinkState;
    use std::net::Ipv4Addr;

    fn store_with_ap(nfloors: &[i32]) -> (Arc<ModelStore>, Arc<ApHandle>) {
        let store = Arc::new(ModelStore::new());
        let ip = Ipv4Addr::new(10, 0, 0, 1);
        let handle = Arc::new(ApHandle::new(
            ip,
            store.next_seq(),
            ShellSession::new(ip, Credentials::default()),
        ));
        {
            let mut st = handle.state.lock().unwrap();
            st.setup_radio(IfName::Wifi0, "mac0".into(), LinkState::Up);
            let radio = st.radio_mut(IfName::Wifi0).unwrap();
            for &nf in nfloors {
                radio.nfloor_window.push(nf, nfloors.len());
            }
            radio.nfloor = radio.nfloor_window.mean();
        }
        store.register(handle.clone());
        (store, handle)
    }

    #[test]
    fn test_fleet_noise_floor_mean() {
        let (store, _handle) = store_with_ap(&[-91, -90, -90]);
        let settings = Arc::new(Settings::default());
        let positioner = Positioner {
            store: store.clone(),
            settings: settings.clone(),
        };
        positioner.update_fleet_nfloor(&store.aps_snapshot());
        // Smoothed radio floor is floor(-271/3) = -91
        assert_eq!(settings.snapshot().fleet_nfloor, -91);
    }

    #[test]
    fn test_snapshot_skips_aps_without_wifi0() {
        let store = Arc::new(ModelStore::new());
        let ip = Ipv4Addr::new(10, 0, 0, 9);
        let handle = Arc::new(ApHandle::new(
            ip,
            store.next_seq(),
            ShellSession::new(ip, Credentials::default()),
        ));
        store.register(handle);
        let fleet = snapshot_fleet(&store.aps_snapshot());
        assert!(fleet.aps.is_empty());
    }
}
