//! Live tunables
//!
//! Every knob the drawing collaborator may turn at runtime lives here as
//! an atomic, so pollers and the positioner read a coherent snapshot at
//! the start of each iteration instead of chasing a moving target.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU8, AtomicUsize, Ordering};

use atomic_float::AtomicF64;

use acspmon_core::{CoordMethod, RadioDisplayed};

use crate::Cli;

const ORD: Ordering = Ordering::Relaxed;

/// The tunables, with their startup defaults.
pub struct Settings {
    /// Meters of RF coverage represented by one canvas dot
    pub meter_per_dot: AtomicF64,
    /// Safe margin over the noise floor, in dB
    pub nfloor_margin: AtomicI32,
    /// RF signal smoothing window, in samples
    pub smooth_window: AtomicUsize,
    /// Extra settle delay added to every shell command, in seconds
    pub cmd_delay_extra: AtomicF64,
    /// Running mean of the fleet's smoothed noise floors, in dBm;
    /// recomputed by the positioner each sweep
    pub fleet_nfloor: AtomicI32,
    pub canvas_w: AtomicU32,
    pub canvas_h: AtomicU32,
    radio_displayed: AtomicU8,
    coord_method: AtomicU8,
    /// Place APs in descending neighbor-score order
    pub nbr_score_order: AtomicBool,
    /// Render circles unfilled
    pub color_transparent: AtomicBool,
    /// Freeze rendering updates
    pub freeze: AtomicBool,
    /// Show the Enable-transition timestamp on running radios
    pub show_run_ts: AtomicBool,
    /// Verbose per-command debugging
    pub debug: AtomicBool,
}

/// Plain-value snapshot taken at the start of an iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tunables {
    pub meter_per_dot: f64,
    pub nfloor_margin: i32,
    pub smooth_window: usize,
    pub cmd_delay_extra: f64,
    pub fleet_nfloor: i32,
    pub canvas_w: u32,
    pub canvas_h: u32,
    pub radio_displayed: RadioDisplayed,
    pub coord_method: CoordMethod,
    pub nbr_score_order: bool,
    pub color_transparent: bool,
    pub freeze: bool,
    pub show_run_ts: bool,
    pub debug: bool,
}

fn encode_displayed(d: RadioDisplayed) -> u8 {
    match d {
        RadioDisplayed::Wifi0 => 0,
        RadioDisplayed::Wifi1 => 1,
        RadioDisplayed::All => 2,
    }
}

fn decode_displayed(v: u8) -> RadioDisplayed {
    match v {
        0 => RadioDisplayed::Wifi0,
        1 => RadioDisplayed::Wifi1,
        _ => RadioDisplayed::All,
    }
}

fn encode_method(m: CoordMethod) -> u8 {
    match m {
        CoordMethod::Auto => 0,
        CoordMethod::Manual => 1,
        CoordMethod::Random => 2,
    }
}

fn decode_method(v: u8) -> CoordMethod {
    match v {
        1 => CoordMethod::Manual,
        2 => CoordMethod::Random,
        _ => CoordMethod::Auto,
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            meter_per_dot: AtomicF64::new(0.1),
            nfloor_margin: AtomicI32::new(50),
            smooth_window: AtomicUsize::new(3),
            cmd_delay_extra: AtomicF64::new(0.0),
            fleet_nfloor: AtomicI32::new(-90),
            canvas_w: AtomicU32::new(800),
            canvas_h: AtomicU32::new(600),
            radio_displayed: AtomicU8::new(encode_displayed(RadioDisplayed::All)),
            coord_method: AtomicU8::new(encode_method(CoordMethod::Auto)),
            nbr_score_order: AtomicBool::new(false),
            color_transparent: AtomicBool::new(false),
            freeze: AtomicBool::new(false),
            show_run_ts: AtomicBool::new(false),
            debug: AtomicBool::new(false),
        }
    }
}

impl Settings {
    /// Defaults overridden by whatever was given on the command line.
    pub fn from_args(args: &Cli) -> Settings {
        let s = Settings::default();
        s.meter_per_dot.store(args.meters_per_dot, ORD);
        s.nfloor_margin.store(args.nfloor_margin, ORD);
        s.smooth_window.store(args.smooth_window, ORD);
        s.cmd_delay_extra.store(args.ext_delay, ORD);
        if let Some(d) = RadioDisplayed::parse(&args.radio_displayed) {
            s.set_radio_displayed(d);
        }
        if let Some(m) = CoordMethod::parse(&args.coord_method) {
            s.set_coord_method(m);
        }
        s.nbr_score_order.store(args.coord_nbrscore_order, ORD);
        s.color_transparent.store(args.color_transparent, ORD);
        s.freeze.store(args.freeze_gui, ORD);
        s.show_run_ts.store(args.acsp_run_ts, ORD);
        s
    }

    pub fn snapshot(&self) -> Tunables {
        Tunables {
            meter_per_dot: self.meter_per_dot.load(ORD),
            nfloor_margin: self.nfloor_margin.load(ORD),
            smooth_window: self.smooth_window.load(ORD),
            cmd_delay_extra: self.cmd_delay_extra.load(ORD),
            fleet_nfloor: self.fleet_nfloor.load(ORD),
            canvas_w: self.canvas_w.load(ORD),
            canvas_h: self.canvas_h.load(ORD),
            radio_displayed: decode_displayed(self.radio_displayed.load(ORD)),
            coord_method: decode_method(self.coord_method.load(ORD)),
            nbr_score_order: self.nbr_score_order.load(ORD),
            color_transparent: self.color_transparent.load(ORD),
            freeze: self.freeze.load(ORD),
            show_run_ts: self.show_run_ts.load(ORD),
            debug: self.debug.load(ORD),
        }
    }

    pub fn radio_displayed(&self) -> RadioDisplayed {
        decode_displayed(self.radio_displayed.load(ORD))
    }

    pub fn set_radio_displayed(&self, d: RadioDisplayed) {
        self.radio_displayed.store(encode_displayed(d), ORD);
    }

    pub fn coord_method(&self) -> CoordMethod {
        decode_method(self.coord_method.load(ORD))
    }

    pub fn set_coord_method(&self, m: CoordMethod) {
        self.coord_method.store(encode_method(m), ORD);
    }

    /// Canvas size, tracked when the drawing surface is resized.
    pub fn set_canvas_size(&self, w: u32, h: u32) {
        self.canvas_w.store(w, ORD);
        self.canvas_h.store(h, ORD);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_snapshot() {
        let t = Settings::default().snapshot();
        assert_eq!(t.meter_per_dot, 0.1);
        assert_eq!(t.nfloor_margin, 50);
        assert_eq!(t.smooth_window, 3);
        assert_eq!(t.fleet_nfloor, -90);
        assert_eq!(t.canvas_w, 800);
        assert_eq!(t.canvas_h, 600);
        assert_eq!(t.radio_displayed, RadioDisplayed::All);
        assert_eq!(t.coord_method, CoordMethod::Auto);
        assert!(!t.nbr_score_order);
        assert!(!t.freeze);
    }

    #[test]
    fn test_from_args() {
        let cli = Cli::parse_from([
            "acspmon-server",
            "-n",
            "10.0.5.0",
            "-p",
            "0.5",
            "-m",
            "40",
            "-w",
            "7",
            "-a",
            "1",
            "-c",
            "manual",
            "-s",
        ]);
        let t = Settings::from_args(&cli).snapshot();
        assert_eq!(t.meter_per_dot, 0.5);
        assert_eq!(t.nfloor_margin, 40);
        assert_eq!(t.smooth_window, 7);
        assert_eq!(t.radio_displayed, RadioDisplayed::Wifi1);
        assert_eq!(t.coord_method, CoordMethod::Manual);
        assert!(t.nbr_score_order);
    }

    #[test]
    fn test_runtime_updates_visible_in_next_snapshot() {
        let s = Settings::default();
        s.set_coord_method(CoordMethod::Random);
        s.set_canvas_size(1024, 768);
        s.fleet_nfloor.store(-87, Ordering::Relaxed);
        let t = s.snapshot();
        assert_eq!(t.coord_method, CoordMethod::Random);
        assert_eq!(t.canvas_w, 1024);
        assert_eq!(t.fleet_nfloor, -87);
    }
}
