//! Relative-layout solver
//!
//! Places every AP on the canvas by successive three-reference
//! trilateration over FSPL-derived distances. Each sweep works on an
//! immutable fleet snapshot and recomputes all coordinates from scratch,
//! so a jittery reference never leaves stale positions behind.
//!
//! The rules, in placement order:
//! - the first AP goes to the canvas center;
//! - the second goes straight right of the first at its FSPL distance;
//! - the third goes to the first intersection of the two reference
//!   circles;
//! - every further AP takes the intersection point whose distance to a
//!   third reference best matches that reference's FSPL distance.
//!
//! An AP whose references are not placed yet, or whose reference circles
//! do not meet, is re-queued once within the sweep and retried on the
//! next sweep.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::geometry::{circle_intersection, distance, Intersection, Point};
use crate::model::IfName;
use crate::rf::{self, DEFAULT_TXPWR};

/// How AP coordinates are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordMethod {
    /// FSPL trilateration (the solver in this module)
    Auto,
    /// The drawing collaborator positions APs; the solver skips them
    Manual,
    /// Uniform-random canvas positions, for testing
    Random,
}

impl CoordMethod {
    pub fn parse(s: &str) -> Option<CoordMethod> {
        match s {
            "auto" => Some(CoordMethod::Auto),
            "manual" => Some(CoordMethod::Manual),
            "random" => Some(CoordMethod::Random),
            _ => None,
        }
    }
}

/// Per-radio slice of the fleet snapshot.
#[derive(Debug, Clone)]
pub struct RadioSite {
    pub mac: String,
    pub chnl: u16,
    pub txpwr: Option<i32>,
    /// Coverage radius in dots, used for the crossing requirement
    pub coverage_r: f64,
    pub nbr_score: Option<f64>,
    /// Smoothed RSSI per heard neighbor, keyed by the neighbor's MAC
    pub nbrs: HashMap<String, i32>,
}

/// Per-AP slice of the fleet snapshot.
#[derive(Debug, Clone)]
pub struct ApSite {
    pub ip: Ipv4Addr,
    pub wifi0: RadioSite,
    pub wifi1: Option<RadioSite>,
}

/// The fleet in discovery order.
#[derive(Debug, Clone, Default)]
pub struct FleetSnapshot {
    pub aps: Vec<ApSite>,
}

#[derive(Debug, Clone)]
pub struct SolveConfig {
    /// Traverse by descending neighbor score instead of discovery order
    pub by_score: bool,
    pub canvas_w: f64,
    pub canvas_h: f64,
    pub meters_per_dot: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub ip: Ipv4Addr,
    pub center: Point,
}

/// Result of one placement sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    pub placed: Vec<Placement>,
    /// APs that could not be placed this sweep
    pub deferred: Vec<Ipv4Addr>,
}

/// Which direction the path-loss sample was measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pool {
    /// The reference transmitted, the candidate heard it
    Forward,
    /// The candidate transmitted, the reference heard it
    Reverse,
}

#[derive(Debug, Clone, Copy)]
struct RefCand {
    ap: usize,
    ifname: IfName,
    pool: Pool,
}

#[derive(Debug, Clone)]
struct SelectedRef {
    ap: usize,
    fspl: f64,
    ghz: f64,
    center: Point,
    coverage_r: f64,
}

fn radio_at<'a>(fleet: &'a FleetSnapshot, ap: usize, ifname: IfName) -> Option<&'a RadioSite> {
    let site = fleet.aps.get(ap)?;
    match ifname {
        IfName::Wifi0 => Some(&site.wifi0),
        IfName::Wifi1 => site.wifi1.as_ref(),
    }
}

/// Build the four reference pools for one candidate, concatenated in
/// consumption order: forward wifi0, reverse wifi0, forward wifi1,
/// reverse wifi1. Forward pools are ordered nearest-first by
/// `txpwr - rssi`.
fn build_pools(fleet: &FleetSnapshot, cand: usize, placed: &[usize]) -> Vec<RefCand> {
    let rd0 = &fleet.aps[cand].wifi0;

    // Resolve the candidate's neighbor MACs against placed APs
    let mut forward: Vec<(RefCand, f64)> = Vec::new();
    for &j in placed {
        if j == cand {
            continue;
        }
        for ifname in IfName::ALL {
            let Some(radio) = radio_at(fleet, j, ifname) else {
                continue;
            };
            if let Some(&rssi) = rd0.nbrs.get(&radio.mac) {
                let key = (radio.txpwr.unwrap_or(DEFAULT_TXPWR) - rssi) as f64;
                let refc = RefCand {
                    ap: j,
                    ifname,
                    pool: Pool::Forward,
                };
                forward.push((refc, key));
            }
        }
    }
    forward.sort_by(|a, b| a.1.total_cmp(&b.1));

    let f0 = forward
        .iter()
        .filter(|(c, _)| c.ifname == IfName::Wifi0)
        .map(|(c, _)| *c);
    let f1: Vec<RefCand> = forward
        .iter()
        .filter(|(c, _)| c.ifname == IfName::Wifi1)
        .map(|(c, _)| *c)
        .collect();

    // Reverse direction: placed radios that report the candidate
    let mut b0: Vec<RefCand> = Vec::new();
    let mut b1: Vec<RefCand> = Vec::new();
    for &j in placed {
        if j == cand {
            continue;
        }
        if fleet.aps[j].wifi0.nbrs.contains_key(&rd0.mac) {
            b0.push(RefCand {
                ap: j,
                ifname: IfName::Wifi0,
                pool: Pool::Reverse,
            });
        }
        if let Some(w1) = &fleet.aps[j].wifi1 {
            if w1.nbrs.contains_key(&rd0.mac) {
                b1.push(RefCand {
                    ap: j,
                    ifname: IfName::Wifi1,
                    pool: Pool::Reverse,
                });
            }
        }
    }

    f0.chain(b0).chain(f1).chain(b1).collect()
}

/// Pick the first usable reference out of the pools, removing it.
///
/// A reference is usable when it does not belong to an already-chosen
/// AP and, with `need_cross`, when its coverage circle overlaps each
/// already-chosen reference's at a nonzero center distance.
fn get_ref_nbr(
    fleet: &FleetSnapshot,
    centers: &HashMap<usize, Point>,
    pools: &mut Vec<RefCand>,
    cand: usize,
    chosen: &[&SelectedRef],
    need_cross: bool,
) -> Option<SelectedRef> {
    let rd0 = &fleet.aps[cand].wifi0;

    let pos = pools.iter().position(|c| {
        if chosen.iter().any(|s| s.ap == c.ap) {
            return false;
        }
        let Some(&center) = centers.get(&c.ap) else {
            return false;
        };
        if !need_cross {
            return true;
        }
        let Some(radio) = radio_at(fleet, c.ap, c.ifname) else {
            return false;
        };
        chosen.iter().all(|s| {
            let d = distance(center, s.center);
            d != 0.0 && d <= radio.coverage_r + s.coverage_r
        })
    })?;

    let picked = pools.remove(pos);
    let radio = radio_at(fleet, picked.ap, picked.ifname)?;
    let center = *centers.get(&picked.ap)?;

    let (fspl, ghz) = match picked.pool {
        Pool::Forward => {
            let rssi = *rd0.nbrs.get(&radio.mac)?;
            (
                (radio.txpwr.unwrap_or(DEFAULT_TXPWR) - rssi) as f64,
                rf::ieee2ghz(radio.chnl),
            )
        }
        Pool::Reverse => {
            let rssi = *radio.nbrs.get(&rd0.mac)?;
            (
                (rd0.txpwr.unwrap_or(DEFAULT_TXPWR) - rssi) as f64,
                rf::ieee2ghz(rd0.chnl),
            )
        }
    };

    Some(SelectedRef {
        ap: picked.ap,
        fspl,
        ghz,
        center,
        coverage_r: radio.coverage_r,
    })
}

/// Of two intersection points, the one whose distance to the third
/// reference center best matches that reference's FSPL distance.
fn closer_cross_point(p1: Point, p2: Point, ref3_center: Point, d3: f64) -> Point {
    if (d3 - distance(p1, ref3_center)).abs() < (d3 - distance(p2, ref3_center)).abs() {
        p1
    } else {
        p2
    }
}

/// Run one placement sweep over the fleet snapshot.
///
/// Only APs whose primary radio has a computed neighbor score take part.
/// Coordinates are assigned to the AP as a whole; the caller propagates
/// them to both radios.
pub fn solve(fleet: &FleetSnapshot, cfg: &SolveConfig) -> SweepOutcome {
    let mut order: Vec<usize> = fleet
        .aps
        .iter()
        .enumerate()
        .filter(|(_, ap)| ap.wifi0.nbr_score.is_some())
        .map(|(i, _)| i)
        .collect();
    if cfg.by_score {
        order.sort_by(|&a, &b| {
            let sa = fleet.aps[a].wifi0.nbr_score.unwrap_or(rf::NO_NEIGHBOR_SCORE);
            let sb = fleet.aps[b].wifi0.nbr_score.unwrap_or(rf::NO_NEIGHBOR_SCORE);
            sb.total_cmp(&sa)
        });
    }

    let mut queue: VecDeque<usize> = order.into();
    let mut placed: Vec<usize> = Vec::new();
    let mut centers: HashMap<usize, Point> = HashMap::new();
    let mut deferred_once: HashSet<usize> = HashSet::new();

    while let Some(i) = queue.pop_front() {
        if centers.contains_key(&i) {
            continue;
        }

        // One retry within the sweep, after more APs had a chance to land
        let mut defer = |i: usize, queue: &mut VecDeque<usize>| {
            if deferred_once.insert(i) {
                queue.push_back(i);
            }
        };

        let req = placed.len().min(3);
        let mut pools = build_pools(fleet, i, &placed);
        let unique: HashSet<usize> = pools.iter().map(|c| c.ap).collect();
        if unique.len() < req {
            defer(i, &mut queue);
            continue;
        }

        if req == 0 {
            centers.insert(i, Point::new(cfg.canvas_w / 2.0, cfg.canvas_h / 2.0));
            placed.push(i);
            continue;
        }

        let Some(ref1) = get_ref_nbr(fleet, &centers, &mut pools, i, &[], false) else {
            continue;
        };
        let d1 = rf::fspl_distance_dots(ref1.fspl, ref1.ghz, cfg.meters_per_dot);

        if req == 1 {
            centers.insert(i, Point::new(ref1.center.x + d1, ref1.center.y));
            placed.push(i);
            continue;
        }

        let Some(ref2) = get_ref_nbr(fleet, &centers, &mut pools, i, &[&ref1], false) else {
            continue;
        };
        let d2 = rf::fspl_distance_dots(ref2.fspl, ref2.ghz, cfg.meters_per_dot);
        let cross = circle_intersection(ref1.center, d1, ref2.center, d2, false);

        if req == 2 {
            match cross.first() {
                None => defer(i, &mut queue),
                Some(p) => {
                    centers.insert(i, p);
                    placed.push(i);
                }
            }
            continue;
        }

        let Some(ref3) = get_ref_nbr(fleet, &centers, &mut pools, i, &[&ref1, &ref2], false)
        else {
            continue;
        };
        let d3 = rf::fspl_distance_dots(ref3.fspl, ref3.ghz, cfg.meters_per_dot);

        match cross {
            Intersection::None => defer(i, &mut queue),
            Intersection::One(p) => {
                centers.insert(i, p);
                placed.push(i);
            }
            Intersection::Two(p1, p2) => {
                let p = closer_cross_point(p1, p2, ref3.center, d3);
                centers.insert(i, p);
                placed.push(i);
            }
        }
    }

    SweepOutcome {
        placed: placed
            .iter()
            .map(|&i| Placement {
                ip: fleet.aps[i].ip,
                center: centers[&i],
            })
            .collect(),
        deferred: deferred_once
            .iter()
            .filter(|&&i| !centers.contains_key(&i))
            .map(|&i| fleet.aps[i].ip)
            .collect(),
    }
}
