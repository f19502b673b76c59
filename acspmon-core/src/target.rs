//! Probe target-set specifier
//!
//! The monitored fleet lives on one subnet, given on startup as either a
//! CIDR block, a bare `a.b.c.0` (shorthand for /24), or `a.b.c.n:m` for
//! `m` consecutive addresses starting at host `n`.

use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::Serialize;

use crate::error::TargetSpecError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TargetSpec {
    /// `a.b.c.d/mask`, including the degenerate /32 single host
    Cidr { base: Ipv4Addr, prefix: u8 },
    /// `a.b.c.n:m`: m consecutive addresses starting at n
    Range { start: Ipv4Addr, count: u16 },
}

impl FromStr for TargetSpec {
    type Err = TargetSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((ip_str, count_str)) = s.split_once(':') {
            let start: Ipv4Addr = ip_str
                .parse()
                .map_err(|_| TargetSpecError::BadAddress(s.to_string()))?;
            let count: u16 = count_str
                .parse()
                .map_err(|_| TargetSpecError::BadCount(count_str.to_string()))?;
            return Ok(TargetSpec::Range { start, count });
        }

        if let Some((ip_str, prefix_str)) = s.split_once('/') {
            let base: Ipv4Addr = ip_str
                .parse()
                .map_err(|_| TargetSpecError::BadAddress(s.to_string()))?;
            let prefix: u8 = prefix_str
                .parse()
                .ok()
                .filter(|p| *p <= 32)
                .ok_or_else(|| TargetSpecError::BadPrefix(prefix_str.to_string()))?;
            return Ok(TargetSpec::Cidr { base, prefix });
        }

        let base: Ipv4Addr = s
            .parse()
            .map_err(|_| TargetSpecError::BadAddress(s.to_string()))?;
        // A bare .0 address means the whole /24; anything else is a
        // single host.
        let prefix = if base.octets()[3] == 0 { 24 } else { 32 };
        Ok(TargetSpec::Cidr { base, prefix })
    }
}

impl TargetSpec {
    /// Expand to the list of addresses to probe. CIDR blocks skip the
    /// network and broadcast addresses; ranges stop at the end of the
    /// last octet.
    pub fn expand(&self) -> Vec<Ipv4Addr> {
        match *self {
            TargetSpec::Cidr { base, prefix } => {
                if prefix >= 31 {
                    return vec![base];
                }
                let mask: u32 = if prefix == 0 {
                    0
                } else {
                    !0u32 << (32 - prefix)
                };
                let network = u32::from(base) & mask;
                let broadcast = network | !mask;
                (network + 1..broadcast).map(Ipv4Addr::from).collect()
            }
            TargetSpec::Range { start, count } => {
                let [a, b, c, d] = start.octets();
                (0..count)
                    .map_while(|i| {
                        let host = d as u16 + i;
                        if host > 255 {
                            None
                        } else {
                            Some(Ipv4Addr::new(a, b, c, host as u8))
                        }
                    })
                    .collect()
            }
        }
    }
}

impl std::fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetSpec::Cidr { base, prefix } => write!(f, "{}/{}", base, prefix),
            TargetSpec::Range { start, count } => write!(f, "{}:{}", start, count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cidr() {
        let spec: TargetSpec = "192.168.1.0/24".parse().unwrap();
        assert_eq!(
            spec,
            TargetSpec::Cidr {
                base: Ipv4Addr::new(192, 168, 1, 0),
                prefix: 24
            }
        );
    }

    #[test]
    fn test_bare_dot_zero_is_slash_24() {
        let spec: TargetSpec = "10.0.5.0".parse().unwrap();
        assert_eq!(
            spec,
            TargetSpec::Cidr {
                base: Ipv4Addr::new(10, 0, 5, 0),
                prefix: 24
            }
        );
        assert_eq!(spec.expand().len(), 254);
    }

    #[test]
    fn test_single_host() {
        let spec: TargetSpec = "10.0.5.7".parse().unwrap();
        assert_eq!(spec.expand(), vec![Ipv4Addr::new(10, 0, 5, 7)]);
    }

    #[test]
    fn test_parse_range() {
        let spec: TargetSpec = "10.0.5.20:5".parse().unwrap();
        let hosts = spec.expand();
        assert_eq!(
            hosts,
            (20..25).map(|d| Ipv4Addr::new(10, 0, 5, d)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_range_stops_at_octet_end() {
        let spec: TargetSpec = "10.0.5.250:10".parse().unwrap();
        let hosts = spec.expand();
        assert_eq!(hosts.len(), 6); // .250 through .255
        assert_eq!(*hosts.last().unwrap(), Ipv4Addr::new(10, 0, 5, 255));
    }

    #[test]
    fn test_cidr_expansion_skips_network_and_broadcast() {
        let spec: TargetSpec = "192.168.1.0/30".parse().unwrap();
        assert_eq!(
            spec.expand(),
            vec![
                Ipv4Addr::new(192, 168, 1, 1),
                Ipv4Addr::new(192, 168, 1, 2),
            ]
        );
    }

    #[test]
    fn test_bad_specs_rejected() {
        assert!("not-an-ip".parse::<TargetSpec>().is_err());
        assert!("10.0.0.0/40".parse::<TargetSpec>().is_err());
        assert!("10.0.0.1:x".parse::<TargetSpec>().is_err());
    }
}
