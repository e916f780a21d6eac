// Front-end configuration surface.  Pure data: the engine never consults it,
// a toolbar reads it to build its controls and the CLI prints it with
// `--list-filters`.

use serde::Serialize;

use super::kernels::VARIANCE_BANDS;
use super::{FilterKind, HueBand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UiType {
    /// On/off button, no arguments.
    Toggle,
    /// Single numeric argument within `min..=max`.
    Slider,
    /// Row of bars, exactly one lit; sent as a flag array.
    Equalizer,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    pub id: &'static str,
    pub kind: FilterKind,
    pub label: &'static str,
    pub ui: UiType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<f64>,
    /// Number of bars for `Equalizer` controls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bars: Option<usize>,
    /// Ids switched off when this one is switched on.
    #[serde(skip_serializing_if = "no_ids")]
    pub disables: &'static [&'static str],
}

fn no_ids(ids: &&'static [&'static str]) -> bool {
    ids.is_empty()
}

impl FilterConfig {
    const fn toggle(id: &'static str, kind: FilterKind, label: &'static str) -> Self {
        Self {
            id,
            kind,
            label,
            ui: UiType::Toggle,
            min: None,
            max: None,
            step: None,
            default: None,
            bars: None,
            disables: &[],
        }
    }

    const fn disabling(mut self, ids: &'static [&'static str]) -> Self {
        self.disables = ids;
        self
    }
}

/// The toolbar set of the X-ray viewer, in display order.
pub fn filter_catalog() -> Vec<FilterConfig> {
    vec![
        FilterConfig::toggle("sharpen", FilterKind::Sharpen, "SEN"),
        FilterConfig::toggle("emboss", FilterKind::Emboss, "HI").disabling(&["sharpen"]),
        FilterConfig::toggle("invert", FilterKind::Invert, "Invert").disabling(&["contrast"]),
        FilterConfig::toggle("blackWhite", FilterKind::BlackWhite, "BW"),
        FilterConfig {
            ui: UiType::Slider,
            min: Some(-4.0),
            max: Some(5.0),
            step: Some(0.5),
            default: Some(0.0),
            ..FilterConfig::toggle("contrast", FilterKind::Contrast, "Contrast")
        },
        FilterConfig::toggle("osFilter", FilterKind::HueStrip(HueBand::Narrow), "OS")
            .disabling(&["O2Filter"]),
        FilterConfig::toggle("O2Filter", FilterKind::HueStrip(HueBand::Wide), "O2")
            .disabling(&["osFilter"]),
        FilterConfig {
            ui: UiType::Equalizer,
            bars: Some(VARIANCE_BANDS.len()),
            ..FilterConfig::toggle("variance", FilterKind::LightnessRemap, "VAR")
        },
        FilterConfig::toggle("senFilter", FilterKind::SenEqualize, "CLAHE"),
        FilterConfig::toggle("highPenetrationFilter", FilterKind::HighPenetration, "HP"),
    ]
}

pub fn config_for(id: &str) -> Option<FilterConfig> {
    filter_catalog().into_iter().find(|c| c.id == id)
}

/// True when switching `enabled` on should switch `other` off.
pub fn is_disabled_by(other: &str, enabled: &str) -> bool {
    config_for(enabled).is_some_and(|c| c.disables.iter().any(|d| *d == other))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_resolve_to_their_kind() {
        for cfg in filter_catalog() {
            assert_eq!(FilterKind::from_name(cfg.id).unwrap(), cfg.kind, "{}", cfg.id);
        }
    }

    #[test]
    fn disables_point_at_known_ids() {
        let ids: Vec<_> = filter_catalog().iter().map(|c| c.id).collect();
        for cfg in filter_catalog() {
            for d in cfg.disables {
                assert!(ids.contains(d), "{} disables unknown {}", cfg.id, d);
            }
        }
    }

    #[test]
    fn hue_presets_are_mutually_exclusive() {
        assert!(is_disabled_by("O2Filter", "osFilter"));
        assert!(is_disabled_by("osFilter", "O2Filter"));
        assert!(is_disabled_by("contrast", "invert"));
        assert!(!is_disabled_by("invert", "contrast"));
    }

    #[test]
    fn contrast_slider_bounds() {
        let c = config_for("contrast").unwrap();
        assert_eq!(c.ui, UiType::Slider);
        assert_eq!((c.min, c.max, c.step), (Some(-4.0), Some(5.0), Some(0.5)));
    }

    #[test]
    fn serializes_without_empty_fields() {
        let json = serde_json::to_value(config_for("blackWhite").unwrap()).unwrap();
        assert_eq!(json["ui"], "toggle");
        assert_eq!(json["kind"], "blackWhite");
        assert!(json.get("min").is_none());
        assert!(json.get("disables").is_none());
    }
}
