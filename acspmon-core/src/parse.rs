//! Parsers for the semi-structured AP shell command output
//!
//! All parsers take the already line-split output (command echo and shell
//! prompt stripped by the session layer) and return fully-formed records;
//! nothing is applied to the model until a whole row parsed.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ParseError;
use crate::model::{ChannelState, IfName};

static PTN_MODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Mode=(.+?);").unwrap());
static PTN_PHYMODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Phymode=(.+?);").unwrap());
static PTN_NFLOOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Noise floor=(.+?)dBm;").unwrap());
static PTN_REASON: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(.+?\)").unwrap());
static PTN_NBR_RSSI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+(-[0-9]+)[ \t]+").unwrap());

fn excerpt(s: &str) -> String {
    s.chars().take(160).collect()
}

fn parse_num<T: std::str::FromStr>(token: &str, line: &str) -> Result<T, ParseError> {
    token.parse().map_err(|_| ParseError::BadNumber {
        token: token.to_string(),
        line: excerpt(line),
    })
}

/// Replace whitespace between `start` and `end` markers with '-' so that
/// multi-word tokens survive whitespace splitting. The filled span runs
/// from each occurrence of `start` through the first character of the
/// following `end`. Nested marker pairs are not supported.
pub fn fillwhite(text: &str, start: &str, end: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut a = 0usize;
    let mut s = text.find(start);
    let mut e = text.find(end);
    let end_head = match end.chars().next() {
        Some(c) => c.len_utf8(),
        None => return text.to_string(),
    };

    while let (Some(si), Some(ei)) = (s, e) {
        if ei <= si {
            break;
        }
        out.push_str(&text[a..si]);
        let span_end = ei + end_head;
        for ch in text[si..span_end].chars() {
            if ch == ' ' || ch == '\t' {
                out.push('-');
            } else {
                out.push(ch);
            }
        }
        a = span_end;
        s = text[a..].find(start).map(|i| i + a);
        e = text[a..].find(end).map(|i| i + a);
    }
    out.push_str(&text[a..]);
    out
}

/// Fields extracted from `show interface <ifname>`.
#[derive(Debug, Clone, PartialEq)]
pub struct RadioStats {
    pub mode: String,
    pub phymode: String,
    /// Instantaneous noise floor in dBm
    pub nfloor: i32,
}

/// Parse the full-screen `show interface <ifname>` output.
pub fn parse_radio_stats(raw: &str) -> Result<RadioStats, ParseError> {
    let capture = |ptn: &Regex, field: &'static str| -> Result<String, ParseError> {
        ptn.captures(raw)
            .map(|c| c[1].to_string())
            .ok_or_else(|| ParseError::MissingField {
                field,
                line: excerpt(raw),
            })
    };

    let mode = capture(&PTN_MODE, "Mode")?;
    let phymode = capture(&PTN_PHYMODE, "Phymode")?;
    let nfloor_str = capture(&PTN_NFLOOR, "Noise floor")?;
    let nfloor = parse_num(nfloor_str.trim(), raw)?;

    Ok(RadioStats {
        mode,
        phymode,
        nfloor,
    })
}

/// First row of a `show interface | in <ifname>` filter.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceBrief {
    pub mac: String,
    pub state: String,
}

pub fn parse_interface_brief(lines: &[String]) -> Result<InterfaceBrief, ParseError> {
    let line = lines.first().ok_or(ParseError::TooShort {
        expected: 1,
        actual: 0,
    })?;
    let cols: Vec<&str> = line.split_whitespace().collect();
    if cols.len() < 4 {
        return Err(ParseError::BadRow {
            count: cols.len(),
            line: excerpt(line),
        });
    }
    Ok(InterfaceBrief {
        mac: cols[1].to_string(),
        state: cols[3].to_string(),
    })
}

/// MAC and hive from the `mgt0` interface row.
#[derive(Debug, Clone, PartialEq)]
pub struct Mgt0Info {
    pub mac: String,
    pub hive: String,
}

pub fn parse_mgt0(lines: &[String]) -> Result<Mgt0Info, ParseError> {
    let line = lines.first().ok_or(ParseError::TooShort {
        expected: 1,
        actual: 0,
    })?;
    let cols: Vec<&str> = line.split_whitespace().collect();
    if cols.len() < 8 {
        return Err(ParseError::BadRow {
            count: cols.len(),
            line: excerpt(line),
        });
    }
    Ok(Mgt0Info {
        mac: cols[1].to_string(),
        hive: cols[7].to_string(),
    })
}

/// Platform/model name from `show version | in Platform`.
pub fn parse_platform(lines: &[String]) -> Result<String, ParseError> {
    let line = lines.first().ok_or(ParseError::TooShort {
        expected: 1,
        actual: 0,
    })?;
    let cols: Vec<&str> = line.split_whitespace().collect();
    if cols.len() < 2 {
        return Err(ParseError::BadRow {
            count: cols.len(),
            line: excerpt(line),
        });
    }
    Ok(cols[1].to_string())
}

/// One radio's row of the `show acsp` table.
#[derive(Debug, Clone, PartialEq)]
pub struct AcspRow {
    pub chnl_state: ChannelState,
    pub chnl_disabled_reason: Option<String>,
    pub chnl: u16,
    pub width: Option<u16>,
    pub pwr_state: String,
    pub pwr_disabled_reason: Option<String>,
    pub txpwr: i32,
}

/// Split a parenthesized disabled-reason suffix off a state token.
fn strip_reason(token: &str) -> (String, Option<String>) {
    match PTN_REASON.find(token) {
        Some(m) => {
            let reason = m.as_str().to_string();
            let mut bare = String::with_capacity(token.len());
            bare.push_str(&token[..m.start()]);
            bare.push_str(&token[m.end()..]);
            (bare, Some(reason))
        }
        None => (token.to_string(), None),
    }
}

/// Parse one radio's row out of the stripped `show acsp` output.
///
/// The wifi0 row sits at line index 3, the wifi1 row at index 4. Whether a
/// channel-width column is present is detected from the header line.
pub fn parse_acsp_table(lines: &[String], ifname: IfName) -> Result<AcspRow, ParseError> {
    let idx = match ifname {
        IfName::Wifi0 => 3,
        IfName::Wifi1 => 4,
    };
    let line = lines.get(idx).ok_or(ParseError::TooShort {
        expected: idx + 1,
        actual: lines.len(),
    })?;

    let mut row = fillwhite(line, "(", ")");
    row = fillwhite(&row, "Channel", "Req");
    row = fillwhite(&row, "DFS", "CAC");
    row = fillwhite(&row, "Sched", "Waiting");
    let cols: Vec<&str> = row.split_whitespace().collect();

    let has_width = lines.get(1).map(|h| h.contains("width")).unwrap_or(false);
    let pwr_idx = if has_width { 4 } else { 3 };
    if cols.len() <= pwr_idx + 1 {
        return Err(ParseError::BadRow {
            count: cols.len(),
            line: excerpt(&row),
        });
    }

    let (state_token, chnl_disabled_reason) = strip_reason(cols[1]);
    let chnl_state = ChannelState::parse(&state_token);
    let chnl = parse_num(cols[2], &row)?;
    let width = if has_width {
        Some(parse_num(cols[3], &row)?)
    } else {
        None
    };
    let (pwr_state, pwr_disabled_reason) = strip_reason(cols[pwr_idx]);
    let txpwr = parse_num(cols[pwr_idx + 1], &row)?;

    Ok(AcspRow {
        chnl_state,
        chnl_disabled_reason,
        chnl,
        width,
        pwr_state,
        pwr_disabled_reason,
        txpwr,
    })
}

/// Aggregated neighbor observation across all virtual-AP rows that carry
/// one radio's hardware-address prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborRollup {
    /// Mean RSSI over the matching rows, in dBm
    pub rssi_mean: i32,
    /// Total stations across the matching rows
    pub sta_cnt: i32,
    /// Mean CRC error rate over the matching rows
    pub crc_err: i32,
    /// Total channel utilization across the matching rows
    pub tot_cu: i32,
    pub rows: usize,
}

/// Roll up all `show acsp neighbor` rows belonging to the radio with the
/// given hardware address. A radio is matched by its MAC minus the final
/// character, since each of its virtual APs differs only in the last
/// nibble. Returns `Ok(None)` when the radio was not heard at all.
pub fn parse_neighbor_rows(
    lines: &[String],
    mac: &str,
) -> Result<Option<NeighborRollup>, ParseError> {
    if mac.is_empty() {
        return Ok(None);
    }
    let prefix = &mac[..mac.len() - 1];
    let rows: Vec<&String> = lines.iter().filter(|l| l.contains(prefix)).collect();
    if rows.is_empty() {
        return Ok(None);
    }

    let mut tot_rssi: i64 = 0;
    let mut tot_sta: i32 = 0;
    let mut tot_crc: i32 = 0;
    let mut tot_cu: i32 = 0;

    for row in &rows {
        let caps = PTN_NBR_RSSI
            .captures(row)
            .ok_or_else(|| ParseError::MissingField {
                field: "rssi",
                line: excerpt(row),
            })?;
        tot_rssi += parse_num::<i32>(&caps[1], row)? as i64;

        let cols: Vec<&str> = row.split_whitespace().collect();
        if cols.len() < 4 {
            return Err(ParseError::BadRow {
                count: cols.len(),
                line: excerpt(row),
            });
        }
        tot_sta += parse_num::<i32>(cols[cols.len() - 2], row)?;

        // The third column from the right is either "<cu><crc>" packed
        // into one token, or a bare crc digit with the utilization one
        // column further left.
        let third = cols[cols.len() - 3];
        let crc_digit = third
            .chars()
            .last()
            .and_then(|c| c.to_digit(10))
            .ok_or_else(|| ParseError::BadNumber {
                token: third.to_string(),
                line: excerpt(row),
            })?;
        tot_crc += crc_digit as i32;
        if third.len() > 3 {
            tot_cu += parse_num::<i32>(&third[..3], row)?;
        } else {
            tot_cu += parse_num::<i32>(cols[cols.len() - 4], row)?;
        }
    }

    let n = rows.len();
    Ok(Some(NeighborRollup {
        rssi_mean: tot_rssi.div_euclid(n as i64) as i32,
        sta_cnt: tot_sta,
        crc_err: tot_crc.div_euclid(n as i32),
        tot_cu,
        rows: n,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fillwhite_basic() {
        assert_eq!(fillwhite("a(b c)d", "(", ")"), "a(b-c)d");
    }

    #[test]
    fn test_fillwhite_multiple_spans() {
        assert_eq!(fillwhite("x(a b)y(c d)z", "(", ")"), "x(a-b)y(c-d)z");
    }

    #[test]
    fn test_fillwhite_word_markers() {
        assert_eq!(
            fillwhite("wifi0  Channel Req  6", "Channel", "Req"),
            "wifi0  Channel-Req  6"
        );
        assert_eq!(fillwhite("DFS \tCAC", "DFS", "CAC"), "DFS--CAC");
    }

    #[test]
    fn test_fillwhite_no_markers() {
        assert_eq!(fillwhite("plain text", "(", ")"), "plain text");
        // end before start leaves the text alone
        assert_eq!(fillwhite(")a(", "(", ")"), ")a(");
    }

    #[test]
    fn test_parse_radio_stats() {
        let raw = "AC=4; Summary=...; Mode=access; Phymode=11ng; \
                   State=U; Chan=6; Noise floor=-93dBm; Tx power=18dBm;";
        let stats = parse_radio_stats(raw).unwrap();
        assert_eq!(stats.mode, "access");
        assert_eq!(stats.phymode, "11ng");
        assert_eq!(stats.nfloor, -93);
    }

    #[test]
    fn test_parse_radio_stats_missing_field() {
        let raw = "Mode=access; State=U;";
        let err = parse_radio_stats(raw).unwrap_err();
        assert!(matches!(err, ParseError::MissingField { field: "Phymode", .. }));
    }

    #[test]
    fn test_parse_interface_brief() {
        let lines = vec![
            "Wifi0     0819:a6f0:3c40  1500  U  access mode".to_string(),
        ];
        let brief = parse_interface_brief(&lines).unwrap();
        assert_eq!(brief.mac, "0819:a6f0:3c40");
        assert_eq!(brief.state, "U");
    }

    #[test]
    fn test_parse_mgt0() {
        let lines =
            vec!["Mgt0  0819:a6f0:3c40  1500  U  10.0.0.2  255.255.255.0  -  hive0".to_string()];
        let info = parse_mgt0(&lines).unwrap();
        assert_eq!(info.mac, "0819:a6f0:3c40");
        assert_eq!(info.hive, "hive0");
    }

    #[test]
    fn test_parse_platform() {
        let lines = vec!["Platform:            AP330".to_string()];
        assert_eq!(parse_platform(&lines).unwrap(), "AP330");
    }

    fn acsp_output(with_width: bool) -> Vec<String> {
        if with_width {
            vec![
                "ACSP state:".to_string(),
                "Ifname  Channel-select-state  Channel  Channel-width  Power-select-state  Tx-power(dBm)".to_string(),
                "------  --------------------  -------  -------------  ------------------  -------------".to_string(),
                "wifi0   Channel Req           6        20             Enable              18".to_string(),
                "wifi1   Disable(Link down)    36       40             Enable              11".to_string(),
            ]
        } else {
            vec![
                "ACSP state:".to_string(),
                "Ifname  Channel-select-state  Channel  Power-select-state  Tx-power(dBm)".to_string(),
                "------  --------------------  -------  ------------------  -------------".to_string(),
                "wifi0   Enable                11       Disable(by user)    14".to_string(),
                "wifi1   Sched Waiting         149      Enable              17".to_string(),
            ]
        }
    }

    #[test]
    fn test_parse_acsp_row_with_width() {
        let row = parse_acsp_table(&acsp_output(true), IfName::Wifi0).unwrap();
        assert_eq!(row.chnl_state, ChannelState::ChannelReq);
        assert_eq!(row.chnl_disabled_reason, None);
        assert_eq!(row.chnl, 6);
        assert_eq!(row.width, Some(20));
        assert_eq!(row.pwr_state, "Enable");
        assert_eq!(row.txpwr, 18);
    }

    #[test]
    fn test_parse_acsp_row_disabled_reason() {
        let row = parse_acsp_table(&acsp_output(true), IfName::Wifi1).unwrap();
        assert_eq!(row.chnl_state, ChannelState::Disable);
        assert_eq!(row.chnl_disabled_reason.as_deref(), Some("(Link-down)"));
        assert_eq!(row.chnl, 36);
        assert_eq!(row.width, Some(40));
    }

    #[test]
    fn test_parse_acsp_row_without_width() {
        let row = parse_acsp_table(&acsp_output(false), IfName::Wifi0).unwrap();
        assert_eq!(row.chnl_state, ChannelState::Enable);
        assert_eq!(row.chnl, 11);
        assert_eq!(row.width, None);
        assert_eq!(row.pwr_state, "Disable");
        assert_eq!(row.pwr_disabled_reason.as_deref(), Some("(by-user)"));
        assert_eq!(row.txpwr, 14);

        let row1 = parse_acsp_table(&acsp_output(false), IfName::Wifi1).unwrap();
        assert_eq!(row1.chnl_state, ChannelState::SchedWaiting);
        assert_eq!(row1.chnl, 149);
    }

    #[test]
    fn test_acsp_state_token_rerenders_identically() {
        // String-level idempotence after normalization: the parsed state
        // plus reason renders back to the normalized token.
        let lines = acsp_output(true);
        let row = parse_acsp_table(&lines, IfName::Wifi0).unwrap();
        assert_eq!(row.chnl_state.to_string(), "Channel-Req");

        let row1 = parse_acsp_table(&lines, IfName::Wifi1).unwrap();
        let rendered = format!(
            "{}{}",
            row1.chnl_state,
            row1.chnl_disabled_reason.as_deref().unwrap_or("")
        );
        assert_eq!(rendered, "Disable(Link-down)");
    }

    #[test]
    fn test_parse_acsp_short_output() {
        let lines = vec!["ACSP state:".to_string()];
        let err = parse_acsp_table(&lines, IfName::Wifi0).unwrap_err();
        assert!(matches!(err, ParseError::TooShort { .. }));
    }

    #[test]
    fn test_neighbor_rollup_packed_cu() {
        let lines = vec![
            "0819:a6f0:3c41  access  6   -62   hive0  1203  5  78".to_string(),
            "0819:a6f0:3c42  access  6   -66   hive0  1101  3  70".to_string(),
            "0819:a6aa:bb01  access  11  -70   hive0  0802  1  66".to_string(),
        ];
        let rollup = parse_neighbor_rows(&lines, "0819:a6f0:3c40")
            .unwrap()
            .unwrap();
        assert_eq!(rollup.rows, 2);
        assert_eq!(rollup.rssi_mean, -64);
        assert_eq!(rollup.sta_cnt, 8);
        assert_eq!(rollup.crc_err, 2); // (3 + 1) / 2
        assert_eq!(rollup.tot_cu, 230); // 120 + 110
    }

    #[test]
    fn test_neighbor_rollup_split_cu() {
        let lines = vec!["0819:a6f0:3c41  access  6  -60  hive0  88  3  4  78".to_string()];
        let rollup = parse_neighbor_rows(&lines, "0819:a6f0:3c40")
            .unwrap()
            .unwrap();
        assert_eq!(rollup.rssi_mean, -60);
        assert_eq!(rollup.sta_cnt, 4);
        assert_eq!(rollup.crc_err, 3);
        assert_eq!(rollup.tot_cu, 88);
    }

    #[test]
    fn test_neighbor_rollup_not_heard() {
        let lines = vec!["0819:a6f0:3c41  access  6  -60  hive0  88  3  4  78".to_string()];
        assert_eq!(parse_neighbor_rows(&lines, "ffff:ffff:ff00").unwrap(), None);
    }
}
