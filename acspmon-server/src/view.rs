//! Drawing-collaborator API
//!
//! Read-only render snapshots with consistent per-AP state, coordinate
//! overrides for manual placement and drag-and-drop, and the
//! command-injection hook for arbitrary user CLIs.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;

use acspmon_core::render::{render_radio, RenderOptions, RenderView};
use acspmon_core::Point;

use crate::settings::Settings;
use crate::shell::SSH_CMD_DELAY_DEFAULT;
use crate::store::ModelStore;
use crate::MonitorError;

/// One AP's drawable state.
#[derive(Debug, Clone, Serialize)]
pub struct ApView {
    pub ip: Ipv4Addr,
    pub name: Option<String>,
    pub mac: Option<String>,
    pub hive: Option<String>,
    pub active: bool,
    /// Larger circle first so the smaller one stays visible on top
    pub views: Vec<RenderView>,
}

impl ApView {
    fn max_radius(&self) -> f64 {
        self.views.iter().map(|v| v.radius).fold(0.0, f64::max)
    }
}

/// Snapshot every AP for drawing. APs with larger coverage come first so
/// they are painted underneath; within an AP the bigger radio is emitted
/// first and the AP label rides on the last (smallest) circle.
pub fn fleet_views(store: &ModelStore, settings: &Settings) -> Vec<ApView> {
    let t = settings.snapshot();
    let opts = RenderOptions {
        transparent: t.color_transparent,
        show_run_ts: t.show_run_ts,
        displayed: t.radio_displayed,
    };

    let mut out = Vec::new();
    for handle in store.aps_snapshot() {
        let st = handle.state.lock().unwrap();
        let label = st.display_label();

        let mut radios: Vec<_> = st.radios.values().collect();
        radios.sort_by(|a, b| b.coverage_r.total_cmp(&a.coverage_r));
        let last = radios.len().saturating_sub(1);
        let views: Vec<RenderView> = radios
            .iter()
            .enumerate()
            .filter_map(|(i, radio)| {
                let label = (i == last).then(|| label.clone());
                render_radio(radio, st.active, label, &opts)
            })
            .collect();

        out.push(ApView {
            ip: handle.ip,
            name: st.name.clone(),
            mac: st.mac.clone(),
            hive: st.hive.clone(),
            active: st.active,
            views,
        });
    }

    out.sort_by(|a, b| b.max_radius().total_cmp(&a.max_radius()));
    out
}

/// Manual placement and drag-and-drop: pin an AP (both radios) to a
/// canvas position.
pub fn set_coord(store: &ModelStore, ip: Ipv4Addr, x: f64, y: f64) -> Result<(), MonitorError> {
    let handle = store.get(ip).ok_or(MonitorError::UnknownAp(ip))?;
    handle.state.lock().unwrap().set_center(Point::new(x, y));
    log::info!("AP {} put to ({:.0}, {:.0})", ip, x, y);
    Ok(())
}

/// Forward one or more user CLIs (separated by ';') to a single AP.
pub async fn send_cli(
    store: &ModelStore,
    settings: &Settings,
    ip: Ipv4Addr,
    clis: &str,
) -> Result<(), MonitorError> {
    let handle = store.get(ip).ok_or(MonitorError::UnknownAp(ip))?;
    let extra = settings.snapshot().cmd_delay_extra;
    for cli in clis.split(';') {
        let cli = cli.trim();
        if cli.is_empty() {
            continue;
        }
        handle
            .session
            .command(&format!("{}\n", cli), SSH_CMD_DELAY_DEFAULT, extra)
            .await?;
        log::info!("CLI {:?} issued to {}", cli, ip);
    }
    Ok(())
}

/// Forward user CLIs to every monitored AP, pausing `ap_delay` between
/// APs. Returns how many APs accepted the whole batch; failures are
/// logged and skipped.
pub async fn broadcast_cli(
    store: &Arc<ModelStore>,
    settings: &Settings,
    clis: &str,
    ap_delay: f64,
) -> usize {
    let mut issued = 0;
    for handle in store.aps_snapshot() {
        match send_cli(store, settings, handle.ip, clis).await {
            Ok(()) => issued += 1,
            Err(e) => log::warn!("CLI {:?} failed on {}: {}", clis, handle.ip, e),
        }
        if ap_delay > 0.0 {
            sleep(Duration::from_secs_f64(ap_delay)).await;
        }
    }
    issued
}
