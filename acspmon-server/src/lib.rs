//! # acspmon-server
//!
//! Real-time monitor for a fleet of wireless access points running an
//! automatic channel selection protocol.
//!
//! The server discovers APs on a subnet, keeps one interactive SSH shell
//! per AP, polls radio and channel-selection state, estimates the fleet's
//! relative physical layout from received-signal-strength readings via a
//! free-space path loss model, and publishes canvas-ready render
//! snapshots for a drawing front end.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                    acspmon-server                         │
//! │  Scanner ──(new host)──▶ Poller (one task per AP)         │
//! │                              │ parsed records             │
//! │                              ▼                            │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │        ModelStore (per-AP mutex + session)          │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! │        ▲  fleet snapshot              │ coordinates       │
//! │        └──────── Positioner ◀─────────┘                   │
//! │                                                           │
//! │  view:: render snapshots / coord overrides / send_cli     │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! All heavy lifting on the parsed data lives in [`acspmon_core`]; this
//! crate owns the tokio tasks and the SSH transport.

use std::net::Ipv4Addr;
use std::sync::atomic::AtomicI32;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle};
use tokio_util::sync::CancellationToken;

pub mod poller;
pub mod positioner;
pub mod scanner;
pub mod settings;
pub mod shell;
pub mod store;
pub mod view;

use scanner::Scanner;
use settings::Settings;
use shell::Credentials;
use store::ModelStore;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How often the scanner probes for new nodes and the positioner sweeps.
pub const NEW_NODE_DETECT_INTERVAL: Duration = Duration::from_secs(3);

/// Exit codes: missing required input.
pub const EXIT_BAD_USAGE: i32 = 255;
/// Exit codes: the user asked the monitor to quit.
pub const EXIT_USER_QUIT: i32 = 253;
/// Exit codes: quit on interrupt.
pub const EXIT_INTERRUPT: i32 = 254;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Node {0} cannot be reached over SSH")]
    Unreachable(Ipv4Addr),

    #[error("Node {0} SSH session lost at command {1:?}")]
    SessionLost(Ipv4Addr, String),

    #[error("Host {0} is not an access point: {1}")]
    UnsupportedRole(Ipv4Addr, String),

    #[error("No AP known at {0}")]
    UnknownAp(Ipv4Addr),

    #[error("Credentials must be given as user:pass")]
    BadCredentials,

    #[error(transparent)]
    Parse(#[from] acspmon_core::ParseError),

    #[error(transparent)]
    TargetSpec(#[from] acspmon_core::TargetSpecError),

    #[error("I/O operation failed")]
    Io(#[from] std::io::Error),

    #[error("SSH protocol error: {0}")]
    Ssh(#[from] russh::Error),
}

/// Command line of the monitor. Every runtime tunable can be preset here;
/// the same values stay adjustable through [`settings::Settings`] while
/// the monitor runs.
#[derive(Parser, Clone, Debug)]
#[command(version, about = "ACSP monitor: watches channel selection across an AP fleet")]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Subnet to monitor: x.y.z.n/mask, x.y.z.0 (a /24), or x.y.z.n:m
    /// for m consecutive addresses starting at n
    #[arg(short = 'n', long)]
    pub subnet: Option<String>,

    /// Username and password for all APs, separated by ':'
    #[arg(short = 'u', long, default_value = "admin:aerohive")]
    pub userpass: String,

    /// Which radio of an AP is rendered: "0", "1" or "a" for all
    #[arg(short = 'a', long, default_value = "a")]
    pub radio_displayed: String,

    /// Coordinate assignment method: auto, manual or random
    #[arg(short = 'c', long, default_value = "auto")]
    pub coord_method: String,

    /// Extra settle delay added to every shell command, in seconds
    #[arg(short = 'e', long, default_value_t = 0.0)]
    pub ext_delay: f64,

    /// Freeze rendering updates
    #[arg(short = 'f', long, default_value_t = false)]
    pub freeze_gui: bool,

    /// Safe margin over the noise floor, in dB
    #[arg(short = 'm', long, default_value_t = 50)]
    pub nfloor_margin: i32,

    /// RF coverage meters represented by one canvas dot
    #[arg(short = 'p', long, default_value_t = 0.1)]
    pub meters_per_dot: f64,

    /// Show the timestamp at which a radio's channel state became Enable
    #[arg(short = 'r', long, default_value_t = false)]
    pub acsp_run_ts: bool,

    /// Place APs in descending neighbor-score order instead of
    /// discovery order
    #[arg(short = 's', long, default_value_t = false)]
    pub coord_nbrscore_order: bool,

    /// Render coverage circles unfilled
    #[arg(short = 't', long, default_value_t = false)]
    pub color_transparent: bool,

    /// RF signal smoothing window, in samples
    #[arg(short = 'w', long, default_value_t = 3)]
    pub smooth_window: usize,
}

/// Shared handles of a running monitor: the model store, the live
/// tunables, and the quit plumbing the drawing collaborator uses.
#[derive(Clone)]
pub struct Session {
    pub store: Arc<ModelStore>,
    pub settings: Arc<Settings>,
    pub exit_code: Arc<AtomicI32>,
    quit: CancellationToken,
}

impl Session {
    /// Wire up the scanner and positioner subsystems and hand back the
    /// shared state.
    pub fn new(
        subsys: &SubsystemHandle,
        args: &Cli,
        targets: Vec<Ipv4Addr>,
        creds: Credentials,
    ) -> Session {
        let settings = Arc::new(Settings::from_args(args));
        let store = Arc::new(ModelStore::new());

        let scanner = Scanner {
            store: store.clone(),
            settings: settings.clone(),
            creds,
            targets,
        };
        subsys.start(SubsystemBuilder::new("Scanner", |s| scanner.run(s)));

        let positioner = positioner::Positioner {
            store: store.clone(),
            settings: settings.clone(),
        };
        subsys.start(SubsystemBuilder::new("Positioner", |s| positioner.run(s)));

        Session {
            store,
            settings,
            exit_code: Arc::new(AtomicI32::new(0)),
            quit: CancellationToken::new(),
        }
    }

    /// Ask the monitor to shut down on the user's behalf (exit code 253).
    pub fn request_quit(&self) {
        self.quit.cancel();
    }

    /// Resolves when [`Session::request_quit`] fires.
    pub async fn quit_requested(&self) {
        self.quit.cancelled().await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Session {{ }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["acspmon-server", "-n", "10.0.5.0"]);
        assert_eq!(cli.subnet.as_deref(), Some("10.0.5.0"));
        assert_eq!(cli.userpass, "admin:aerohive");
        assert_eq!(cli.radio_displayed, "a");
        assert_eq!(cli.coord_method, "auto");
        assert_eq!(cli.smooth_window, 3);
        assert_eq!(cli.nfloor_margin, 50);
        assert_eq!(cli.meters_per_dot, 0.1);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "acspmon-server",
            "-n",
            "10.0.5.20:8",
            "-u",
            "ops:secret",
            "-c",
            "random",
            "-w",
            "5",
        ]);
        assert_eq!(cli.userpass, "ops:secret");
        assert_eq!(cli.coord_method, "random");
        assert_eq!(cli.smooth_window, 5);
    }
}
