//! Built-in color presets.
//!
//! Nail polish and hair style presets are embedded at compile time from
//! `contrib/presets/*.toml` and parsed once on first access.

use crate::types::{hex_to_rgb, HairSettings, NailPattern, NailSettings, Rgb};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const NAIL_PRESETS_TOML: &str = include_str!("../../../contrib/presets/nails.toml");
const HAIR_PRESETS_TOML: &str = include_str!("../../../contrib/presets/hair.toml");

static NAIL_PRESETS: OnceLock<Vec<NailPreset>> = OnceLock::new();
static HAIR_STYLES: OnceLock<Vec<HairStyle>> = OnceLock::new();

#[derive(Debug, Clone, Deserialize)]
struct NailPresetFile {
    #[serde(default)]
    preset: Vec<NailPreset>,
}

#[derive(Debug, Clone, Deserialize)]
struct HairPresetFile {
    #[serde(default)]
    style: Vec<HairStyle>,
}

/// A named polish color from `[[preset]]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NailPreset {
    pub name: String,
    pub hex: String,
    #[serde(default)]
    pub pattern: NailPattern,
}

impl NailPreset {
    pub fn color(&self) -> Rgb {
        Rgb::parse_or(&self.hex, NailSettings::DEFAULT_COLOR)
    }

    /// Default nail settings with this preset's color and pattern.
    pub fn settings(&self) -> NailSettings {
        NailSettings {
            color: self.color(),
            pattern: self.pattern,
            ..NailSettings::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HairCategory {
    Short,
    Medium,
    Long,
    Curly,
}

/// A named hair style from `[[style]]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HairStyle {
    pub name: String,
    pub category: HairCategory,
    pub color: String,
    #[serde(default)]
    pub premium: bool,
}

impl HairStyle {
    pub fn rgb(&self) -> Rgb {
        Rgb::parse_or(&self.color, HairSettings::FALLBACK_COLOR)
    }

    pub fn settings(&self) -> HairSettings {
        HairSettings {
            color: self.rgb(),
            ..HairSettings::default()
        }
    }
}

pub fn nail_presets() -> &'static [NailPreset] {
    NAIL_PRESETS.get_or_init(|| match toml::from_str::<NailPresetFile>(NAIL_PRESETS_TOML) {
        Ok(file) => file.preset,
        Err(e) => {
            tracing::error!(error = %e, "bad nail preset TOML");
            Vec::new()
        }
    })
}

pub fn hair_styles() -> &'static [HairStyle] {
    HAIR_STYLES.get_or_init(|| match toml::from_str::<HairPresetFile>(HAIR_PRESETS_TOML) {
        Ok(file) => file.style,
        Err(e) => {
            tracing::error!(error = %e, "bad hair preset TOML");
            Vec::new()
        }
    })
}

/// Case-insensitive lookup by preset name.
pub fn find_nail_preset(name: &str) -> Option<&'static NailPreset> {
    nail_presets()
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
}

/// Case-insensitive lookup by style name.
pub fn find_hair_style(name: &str) -> Option<&'static HairStyle> {
    hair_styles()
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(name))
}

/// Resolve a nail color given either a preset name or a hex string.
pub fn resolve_nail_color(name_or_hex: &str) -> Rgb {
    find_nail_preset(name_or_hex)
        .map(NailPreset::color)
        .or_else(|| hex_to_rgb(name_or_hex))
        .unwrap_or(NailSettings::DEFAULT_COLOR)
}

/// Resolve a hair color given either a style name or a hex string.
pub fn resolve_hair_color(name_or_hex: &str) -> Rgb {
    find_hair_style(name_or_hex)
        .map(HairStyle::rgb)
        .or_else(|| hex_to_rgb(name_or_hex))
        .unwrap_or(HairSettings::FALLBACK_COLOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_nail_presets_parse() {
        let presets = nail_presets();
        assert_eq!(presets.len(), 10);
        assert!(presets.iter().all(|p| hex_to_rgb(&p.hex).is_some()));
    }

    #[test]
    fn test_embedded_hair_styles_parse() {
        let styles = hair_styles();
        assert_eq!(styles.len(), 10);
        assert_eq!(styles.iter().filter(|s| s.premium).count(), 4);
        assert!(styles.iter().all(|s| hex_to_rgb(&s.color).is_some()));
    }

    #[test]
    fn test_find_classic_red() {
        let red = find_nail_preset("classic red").unwrap();
        assert_eq!(red.color(), Rgb::new(220, 20, 60));
        assert_eq!(red.settings().opacity, 0.85);
    }

    #[test]
    fn test_french_preset_pattern() {
        let french = find_nail_preset("White French").unwrap();
        assert_eq!(french.pattern, NailPattern::French);
    }

    #[test]
    fn test_resolve_colors() {
        assert_eq!(resolve_nail_color("#000080"), Rgb::new(0, 0, 128));
        assert_eq!(resolve_nail_color("not a color"), NailSettings::DEFAULT_COLOR);
        assert_eq!(resolve_hair_color("Burgundy Red"), Rgb::new(128, 0, 32));
        assert_eq!(resolve_hair_color("zzz"), Rgb::new(0, 0, 0));
    }

    #[test]
    fn test_hair_style_category() {
        let afro = find_hair_style("Afro").unwrap();
        assert_eq!(afro.category, HairCategory::Curly);
    }
}
