// ============================================================================
// FILTER MODEL — kinds, arguments, invocations
// ============================================================================
//
// Front ends describe a render as an ordered list of `FilterInvocation`s.
// Names coming from the outside world (CLI flags, chain files, UI ids) are
// resolved to a `FilterKind` exactly once, here, so the engine only ever
// matches on the enum.
// ============================================================================

pub mod catalog;
pub mod kernels;

use serde::{Deserialize, Serialize};

use crate::error::{FilterError, FilterResult};

/// The two hue-strip presets ("OS" and "O2" in the X-ray vocabulary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HueBand {
    Narrow,
    Wide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterKind {
    Identity,
    Contrast,
    Brightness,
    Saturation,
    Negative,
    /// Caller-supplied 4x5 matrix: 20 numeric args, offsets in 0..255 units.
    ColorMatrix,
    Invert,
    BlackWhite,
    Sharpen,
    Emboss,
    DetectEdges,
    HueStrip(HueBand),
    LightnessRemap,
    SenEqualize,
    HighPenetration,
}

impl FilterKind {
    pub const ALL: [FilterKind; 16] = [
        FilterKind::Identity,
        FilterKind::Contrast,
        FilterKind::Brightness,
        FilterKind::Saturation,
        FilterKind::Negative,
        FilterKind::ColorMatrix,
        FilterKind::Invert,
        FilterKind::BlackWhite,
        FilterKind::Sharpen,
        FilterKind::Emboss,
        FilterKind::DetectEdges,
        FilterKind::HueStrip(HueBand::Narrow),
        FilterKind::HueStrip(HueBand::Wide),
        FilterKind::LightnessRemap,
        FilterKind::SenEqualize,
        FilterKind::HighPenetration,
    ];

    /// Resolve an external filter name.  Accepts the canonical names plus the
    /// ids used by the X-ray viewer front end (`osFilter`, `O2Filter`,
    /// `variance`, ...).  Matching is case-insensitive.
    pub fn from_name(name: &str) -> FilterResult<Self> {
        let kind = match name.trim().to_ascii_lowercase().as_str() {
            "identity" | "none" => FilterKind::Identity,
            "contrast" => FilterKind::Contrast,
            "brightness" => FilterKind::Brightness,
            "saturation" => FilterKind::Saturation,
            "negative" => FilterKind::Negative,
            "colormatrix" => FilterKind::ColorMatrix,
            "invert" => FilterKind::Invert,
            "blackwhite" | "bw" => FilterKind::BlackWhite,
            "sharpen" => FilterKind::Sharpen,
            "emboss" => FilterKind::Emboss,
            "detectedges" => FilterKind::DetectEdges,
            "huestrip" | "huestripnarrow" | "osfilter" | "os" => {
                FilterKind::HueStrip(HueBand::Narrow)
            }
            "huestripwide" | "o2filter" | "o2" => FilterKind::HueStrip(HueBand::Wide),
            "lightnessremap" | "variance" | "varabsorption" => FilterKind::LightnessRemap,
            "senequalize" | "senfilter" | "sen" => FilterKind::SenEqualize,
            "highpenetration" | "highpenetrationfilter" => FilterKind::HighPenetration,
            _ => return Err(FilterError::UnknownFilterKind(name.to_string())),
        };
        Ok(kind)
    }

    /// Canonical name, the inverse of `from_name`.
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::Identity => "identity",
            FilterKind::Contrast => "contrast",
            FilterKind::Brightness => "brightness",
            FilterKind::Saturation => "saturation",
            FilterKind::Negative => "negative",
            FilterKind::ColorMatrix => "colorMatrix",
            FilterKind::Invert => "invert",
            FilterKind::BlackWhite => "blackWhite",
            FilterKind::Sharpen => "sharpen",
            FilterKind::Emboss => "emboss",
            FilterKind::DetectEdges => "detectEdges",
            FilterKind::HueStrip(HueBand::Narrow) => "hueStripNarrow",
            FilterKind::HueStrip(HueBand::Wide) => "hueStripWide",
            FilterKind::LightnessRemap => "lightnessRemap",
            FilterKind::SenEqualize => "senEqualize",
            FilterKind::HighPenetration => "highPenetration",
        }
    }
}

impl std::fmt::Display for FilterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One element of an invocation's argument array: sliders send numbers, the
/// equalizer-style controls send flags.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterArg {
    Number(f64),
    Flag(bool),
}

impl FilterArg {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FilterArg::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterInvocation {
    pub kind: FilterKind,
    pub args: Vec<FilterArg>,
}

impl FilterInvocation {
    pub fn new(kind: FilterKind) -> Self {
        Self { kind, args: Vec::new() }
    }

    pub fn with_args(kind: FilterKind, args: Vec<FilterArg>) -> Self {
        Self { kind, args }
    }

    /// Shorthand for the common single-slider case.
    pub fn with_amount(kind: FilterKind, amount: f64) -> Self {
        Self { kind, args: vec![FilterArg::Number(amount)] }
    }

    pub fn passthrough() -> Self {
        Self::new(FilterKind::Identity)
    }

    pub fn named(name: &str, args: Vec<FilterArg>) -> FilterResult<Self> {
        Ok(Self { kind: FilterKind::from_name(name)?, args })
    }

    /// Numeric argument `i`, or `None` when absent or not a finite number.
    pub fn number(&self, i: usize) -> Option<f64> {
        self.args.get(i).and_then(FilterArg::as_number)
    }

    /// Parse a CLI-style spec: `name` or `name=a,b,c` where each value is a
    /// number or `true`/`false`.
    pub fn parse_spec(spec: &str) -> FilterResult<Self> {
        let (name, rest) = match spec.split_once('=') {
            Some((n, r)) => (n, Some(r)),
            None => (spec, None),
        };
        let mut args = Vec::new();
        if let Some(rest) = rest {
            for raw in rest.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let arg = match raw {
                    "true" => FilterArg::Flag(true),
                    "false" => FilterArg::Flag(false),
                    _ => FilterArg::Number(raw.parse::<f64>().map_err(|_| {
                        FilterError::ChainFile(format!("bad argument '{}' in '{}'", raw, spec))
                    })?),
                };
                args.push(arg);
            }
        }
        Self::named(name, args)
    }
}

/// Wire form of an invocation, as found in chain files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawInvocation {
    pub kind: String,
    #[serde(default)]
    pub args: Vec<FilterArg>,
}

impl From<&FilterInvocation> for RawInvocation {
    fn from(inv: &FilterInvocation) -> Self {
        Self { kind: inv.kind.name().to_string(), args: inv.args.clone() }
    }
}

/// Resolve raw invocations.  Unknown kinds become pass-through stages (and are
/// logged) so one bad entry never changes the length of the chain.
pub fn resolve_chain(raw: &[RawInvocation]) -> Vec<FilterInvocation> {
    raw.iter()
        .map(|r| match FilterInvocation::named(&r.kind, r.args.clone()) {
            Ok(inv) => inv,
            Err(e) => {
                crate::log_warn!("{}, stage treated as identity", e);
                FilterInvocation::passthrough()
            }
        })
        .collect()
}

/// Parse a JSON chain file body: `[{"kind": "contrast", "args": [1.5]}, ...]`.
pub fn parse_chain_json(text: &str) -> FilterResult<Vec<FilterInvocation>> {
    let raw: Vec<RawInvocation> = serde_json::from_str(text)?;
    Ok(resolve_chain(&raw))
}

pub fn chain_to_json(chain: &[FilterInvocation]) -> FilterResult<String> {
    let raw: Vec<RawInvocation> = chain.iter().map(RawInvocation::from).collect();
    Ok(serde_json::to_string_pretty(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn front_end_ids_resolve_to_kinds() {
        assert_eq!(FilterKind::from_name("osFilter").unwrap(), FilterKind::HueStrip(HueBand::Narrow));
        assert_eq!(FilterKind::from_name("O2Filter").unwrap(), FilterKind::HueStrip(HueBand::Wide));
        assert_eq!(FilterKind::from_name("variance").unwrap(), FilterKind::LightnessRemap);
        assert_eq!(FilterKind::from_name("blackWhite").unwrap(), FilterKind::BlackWhite);
        assert_eq!(FilterKind::from_name("colorMatrix").unwrap(), FilterKind::ColorMatrix);
    }

    #[test]
    fn canonical_names_round_trip() {
        for kind in FilterKind::ALL {
            assert_eq!(FilterKind::from_name(kind.name()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_is_reported() {
        match FilterKind::from_name("sepia") {
            Err(FilterError::UnknownFilterKind(name)) => assert_eq!(name, "sepia"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parse_spec_reads_numbers_and_flags() {
        let inv = FilterInvocation::parse_spec("contrast=1.5").unwrap();
        assert_eq!(inv.kind, FilterKind::Contrast);
        assert_eq!(inv.number(0), Some(1.5));

        let inv = FilterInvocation::parse_spec("variance=false,true").unwrap();
        assert_eq!(inv.args, vec![FilterArg::Flag(false), FilterArg::Flag(true)]);

        assert!(FilterInvocation::parse_spec("contrast=abc").is_err());
    }

    #[test]
    fn chain_json_keeps_length_with_unknown_kinds() {
        let chain = parse_chain_json(
            r#"[{"kind": "invert"}, {"kind": "sepia", "args": [1]}, {"kind": "contrast", "args": [2]}]"#,
        )
        .unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[1].kind, FilterKind::Identity);
        assert_eq!(chain[2].number(0), Some(2.0));
    }

    #[test]
    fn chain_json_is_stable() {
        let chain = vec![
            FilterInvocation::with_amount(FilterKind::Contrast, 0.5),
            FilterInvocation::new(FilterKind::HueStrip(HueBand::Wide)),
        ];
        let text = chain_to_json(&chain).unwrap();
        assert_eq!(parse_chain_json(&text).unwrap(), chain);
    }
}
