//! Render snapshots for the drawing collaborator
//!
//! The monitor itself never draws; it publishes [`RenderView`] values
//! that a canvas front end can turn into circles and text without
//! touching the model or its locks.

use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::model::{ChannelState, IfName, Radio};

/// Which radio of each AP is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RadioDisplayed {
    Wifi0,
    Wifi1,
    All,
}

impl RadioDisplayed {
    pub fn parse(s: &str) -> Option<RadioDisplayed> {
        match s {
            "0" => Some(RadioDisplayed::Wifi0),
            "1" => Some(RadioDisplayed::Wifi1),
            "a" | "all" => Some(RadioDisplayed::All),
            _ => None,
        }
    }

    pub fn matches(&self, ifname: IfName) -> bool {
        match self {
            RadioDisplayed::All => true,
            RadioDisplayed::Wifi0 => ifname == IfName::Wifi0,
            RadioDisplayed::Wifi1 => ifname == IfName::Wifi1,
        }
    }
}

/// Drawing instructions for one radio's coverage circle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderView {
    pub ifname: IfName,
    pub center: Point,
    /// Radius in canvas dots
    pub radius: f64,
    /// Fill color; `None` renders unfilled
    pub fill: Option<String>,
    /// Fill with a sparse stipple pattern (radio not settled)
    pub stipple: bool,
    pub outline: Option<String>,
    /// Dashed outline marks an AP whose session is gone
    pub dashed: bool,
    pub text: String,
    pub text_color: String,
    /// wifi0 text goes above the circle, wifi1 text below
    pub text_below: bool,
    /// AP label drawn at the center point
    pub label: Option<String>,
}

/// Options the drawing collaborator can toggle at runtime.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub transparent: bool,
    pub show_run_ts: bool,
    pub displayed: RadioDisplayed,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            transparent: false,
            show_run_ts: false,
            displayed: RadioDisplayed::All,
        }
    }
}

/// Map a channel number to its display color.
///
/// 2.4 GHz channels run a red to yellow to white ramp, 5 GHz channels a
/// blue to cyan to white ramp. Channel 36 is collapsed onto 37 so the 5
/// GHz ramp has no degenerate endpoint.
pub fn chnl2color(chnl: u16) -> String {
    let clamp = |v: i32| v.clamp(0, 255);
    let (r, g, b);
    if chnl < 15 {
        let n = (512.0 - (511.0 / 14.0) * chnl as f64) as i32;
        if n < 128 {
            r = 128 + n;
            g = 0;
            b = 0;
        } else if n < 384 {
            r = 255;
            g = n - 127;
            b = 0;
        } else {
            r = 255;
            g = 255;
            b = n - 382;
        }
    } else {
        let c = if chnl == 36 { 37 } else { chnl };
        let n = (512.0 - (511.0 / (165.0 - 36.0)) * (c as f64 - 36.0)) as i32;
        if n < 128 {
            b = 128 + n;
            g = 0;
            r = 0;
        } else if n < 384 {
            b = 255;
            g = n - 127;
            r = 0;
        } else {
            b = 255;
            g = 255;
            r = n - 382;
        }
    }
    format!("#{:02x}{:02x}{:02x}", clamp(r), clamp(g), clamp(b))
}

/// Build the drawing instructions for one radio, or `None` when the
/// radio is filtered out or does not run channel selection.
pub fn render_radio(
    radio: &Radio,
    ap_active: bool,
    label: Option<String>,
    opts: &RenderOptions,
) -> Option<RenderView> {
    if !opts.displayed.matches(radio.name) {
        return None;
    }
    if !radio.supports_acsp() {
        return None;
    }

    let chnl = radio.acsp.chnl;
    let state = radio.acsp.chnl_state.as_ref();

    let mut fill = Some(chnl2color(chnl));
    let mut stipple = false;
    match state {
        Some(ChannelState::Disable) => {
            if radio.acsp.chnl_disabled_reason.as_deref() == Some("(Link-down)") {
                fill = Some("gray".to_string());
            }
        }
        Some(ChannelState::Enable) => {}
        _ => {
            fill = Some("gray".to_string());
            stipple = true;
        }
    }

    let mut text_color = match state {
        Some(ChannelState::Disable) => "magenta",
        Some(ChannelState::Enable) => "black",
        _ => "green",
    }
    .to_string();

    let state_str = state.map(|s| s.to_string()).unwrap_or_else(|| "?".to_string());
    let mut text = format!(
        "{}/{}/{}\n{}/{}/{}/{}",
        radio.name,
        radio
            .mode
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "?".to_string()),
        radio.phymode.as_deref().unwrap_or("?"),
        state_str,
        chnl,
        radio.acsp.pwr_state.as_deref().unwrap_or("?"),
        radio
            .acsp
            .txpwr
            .map(|p| p.to_string())
            .unwrap_or_else(|| "?".to_string()),
    );
    if opts.show_run_ts && state == Some(&ChannelState::Enable) {
        if let Some(ts) = &radio.acsp.chnl_run_ts {
            text.push_str(&format!("\n({})", ts));
        }
    }

    let mut outline = None;
    let mut dashed = false;
    if opts.transparent || !ap_active {
        fill = None;
        outline = Some("black".to_string());
        if !ap_active {
            dashed = true;
            text_color = "gray".to_string();
        }
    }

    Some(RenderView {
        ifname: radio.name,
        center: radio.center.unwrap_or_default(),
        radius: radio.coverage_r,
        fill,
        stipple,
        outline,
        dashed,
        text,
        text_color,
        text_below: radio.name == IfName::Wifi1,
        label,
    })
}
