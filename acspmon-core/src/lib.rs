//! # acspmon-core
//!
//! Platform-independent core of the ACSP fleet monitor.
//!
//! This crate contains the typed fleet model, the command-output parsers
//! and the relative-layout math with **zero I/O dependencies**. All
//! networking (shell sessions, discovery probes) lives in
//! `acspmon-server`, which feeds parsed records into this crate's model
//! and reads render snapshots back out.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  acspmon-core (no tokio/ssh deps)                          │
//! │  ├── parse/      (shell command output -> typed records)   │
//! │  ├── model/      (APs, radios, ACSP state, neighbors)      │
//! │  ├── rf/         (FSPL, coverage radii, neighbor score)    │
//! │  ├── geometry/   (two-circle intersection)                 │
//! │  ├── placement/  (ordered trilateration solver)            │
//! │  └── render/     (canvas-ready snapshots)                  │
//! └────────────────────────────────────────────────────────────┘
//!                          ▲
//!               ┌──────────┴──────────┐
//!               │  acspmon-server     │
//!               │  (russh + tokio)    │
//!               └─────────────────────┘
//! ```
//!
//! ## Example: parsing a radio's interface stats
//!
//! ```rust
//! use acspmon_core::parse::parse_radio_stats;
//!
//! let raw = "Mode=access; Phymode=11ng; Noise floor=-93dBm;";
//! let stats = parse_radio_stats(raw).unwrap();
//! assert_eq!(stats.nfloor, -93);
//! ```
//!
//! ## Example: one placement sweep
//!
//! ```rust,no_run
//! use acspmon_core::placement::{solve, FleetSnapshot, SolveConfig};
//!
//! let fleet = FleetSnapshot::default();
//! let cfg = SolveConfig {
//!     by_score: false,
//!     canvas_w: 800.0,
//!     canvas_h: 600.0,
//!     meters_per_dot: 0.1,
//! };
//! let outcome = solve(&fleet, &cfg);
//! for p in outcome.placed {
//!     println!("{} -> {}", p.ip, p.center);
//! }
//! ```

pub mod error;
pub mod geometry;
pub mod model;
pub mod parse;
pub mod placement;
pub mod render;
pub mod rf;
pub mod target;

// Re-export commonly used types
pub use error::{ParseError, TargetSpecError};
pub use geometry::{circle_intersection, distance, Intersection, Point};
pub use model::{
    Ap, AcspNeighbor, AcspState, Band, ChannelState, IfName, LinkState, ObservedNeighbor, Radio,
    RadioMode, SmoothWindow,
};
pub use placement::{CoordMethod, FleetSnapshot, Placement, SolveConfig, SweepOutcome};
pub use render::{RadioDisplayed, RenderOptions, RenderView};
pub use target::TargetSpec;
