//! RF derivations: channel frequencies, FSPL distances, coverage radii
//! and the neighbor score.
//!
//! Free-space path loss: `FSPL(dB) = 32.44 + 20*log10(F_GHz) + 20*log10(d_m)`.
//! Solving for `d_m` gives both the inter-AP distance estimate and the
//! coverage radius at which a transmission falls to the effective noise
//! floor.

use crate::model::ChannelState;

/// FSPL reference constant for F in GHz and d in meters.
pub const FSPL_CONST: f64 = 32.44;

/// Transmit power assumed for radios that have not reported one yet, in dBm.
pub const DEFAULT_TXPWR: i32 = 20;

/// Score assigned to a radio with an empty neighbor table, so it sorts
/// behind every radio that heard at least one neighbor.
pub const NO_NEIGHBOR_SCORE: f64 = i64::MIN as f64;

/// Map an IEEE 802.11 channel number to its center frequency in GHz.
///
/// Channel 0 means the radio has not settled on a channel; it maps to the
/// 1.0 GHz sentinel, which makes the frequency term of FSPL vanish.
pub fn ieee2ghz(chnl: u16) -> f64 {
    let mhz: u32 = match chnl {
        0 => return 1.0,
        14 => 2484,
        c if c < 14 => 2407 + 5 * c as u32,
        c if c < 27 => 2512 + 20 * (c as u32 - 15),
        c => 5000 + 5 * c as u32,
    };
    mhz as f64 / 1000.0
}

/// Distance in whole canvas dots implied by a path loss at a frequency.
pub fn fspl_distance_dots(fspl_db: f64, ghz: f64, meters_per_dot: f64) -> f64 {
    let meters = 10f64.powf((fspl_db - FSPL_CONST - 20.0 * ghz.log10()) / 20.0);
    (meters / meters_per_dot).floor()
}

/// Coverage radius in whole canvas dots: the distance at which a signal
/// transmitted at `txpwr` decays to the fleet noise floor plus margin.
pub fn coverage_radius_dots(
    txpwr: i32,
    chnl: u16,
    fleet_nfloor: i32,
    margin: i32,
    meters_per_dot: f64,
) -> f64 {
    let nfloor = (fleet_nfloor + margin) as f64;
    let ghz = ieee2ghz(chnl);
    let meters = 10f64.powf((txpwr as f64 - FSPL_CONST - 20.0 * ghz.log10() - nfloor) / 20.0);
    (meters / meters_per_dot).floor()
}

/// Score a radio's neighbor table.
///
/// Each entry contributes its SNR over the fleet noise floor, weighted by
/// how far the neighbor has progressed through the channel-selection state
/// machine; settled neighbors are the most informative references.
pub fn neighbor_score<'a, I>(nbrs: I, fleet_nfloor: i32) -> f64
where
    I: IntoIterator<Item = (Option<&'a ChannelState>, i32)>,
{
    let mut score = 0.0;
    let mut seen = false;
    for (state, rssi) in nbrs {
        seen = true;
        let snr = (rssi - fleet_nfloor) as f64;
        let div = match state {
            Some(ChannelState::Disable) | Some(ChannelState::Enable) => 2.0,
            Some(ChannelState::Scanning) | Some(ChannelState::Listening) => 4.0,
            Some(ChannelState::Init) | Some(ChannelState::SchedWaiting) => 6.0,
            _ => 8.0,
        };
        score += snr / div;
    }
    if seen {
        score
    } else {
        NO_NEIGHBOR_SCORE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ieee2ghz_band_edges() {
        assert_eq!(ieee2ghz(1), 2.412);
        assert_eq!(ieee2ghz(6), 2.437);
        assert_eq!(ieee2ghz(13), 2.472);
        assert_eq!(ieee2ghz(14), 2.484);
        assert_eq!(ieee2ghz(36), 5.18);
        assert_eq!(ieee2ghz(165), 5.825);
    }

    #[test]
    fn test_ieee2ghz_undetermined_channel() {
        assert_eq!(ieee2ghz(0), 1.0);
    }

    #[test]
    fn test_ieee2ghz_public_safety_gap() {
        // Channels 15..26 sit in the 2.5 GHz block
        assert_eq!(ieee2ghz(15), 2.512);
        assert_eq!(ieee2ghz(26), 2.732);
    }

    #[test]
    fn test_fspl_distance() {
        // 80 dB loss at channel 6 (2.437 GHz), 0.1 m per dot
        let d = fspl_distance_dots(80.0, ieee2ghz(6), 0.1);
        let meters = 10f64.powf((80.0 - 32.44 - 20.0 * 2.437f64.log10()) / 20.0);
        assert_eq!(d, (meters / 0.1).floor());
        assert_eq!(d, 979.0);
    }

    #[test]
    fn test_coverage_radius() {
        // txpwr 20 dBm on channel 36, fleet floor -90 with margin 50:
        // effective floor -40, radius ~4.61 m -> 46 dots at 0.1 m/dot
        let r = coverage_radius_dots(20, 36, -90, 50, 0.1);
        assert_eq!(r, 46.0);
    }

    #[test]
    fn test_coverage_radius_is_pure() {
        let a = coverage_radius_dots(18, 11, -95, 50, 0.25);
        let b = coverage_radius_dots(18, 11, -95, 50, 0.25);
        assert_eq!(a, b);
    }

    #[test]
    fn test_neighbor_score_weighting() {
        // Three neighbors with identical SNR 40 in Enable/Scanning/Init:
        // 40/2 + 40/4 + 40/6 = 36.66...
        let states = [
            ChannelState::Enable,
            ChannelState::Scanning,
            ChannelState::Init,
        ];
        let entries = states.iter().map(|s| (Some(s), -50)).collect::<Vec<_>>();
        let score = neighbor_score(entries, -90);
        assert!((score - (20.0 + 10.0 + 40.0 / 6.0)).abs() < 1e-9);
    }

    #[test]
    fn test_neighbor_score_unknown_state() {
        let score = neighbor_score([(None::<&ChannelState>, -50)], -90);
        assert_eq!(score, 5.0);
    }

    #[test]
    fn test_neighbor_score_empty() {
        let score = neighbor_score(std::iter::empty(), -90);
        assert_eq!(score, NO_NEIGHBOR_SCORE);
    }
}
