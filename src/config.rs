use std::path::Path;

use ab_glyph::FontVec;
use common_types::RouteError;
use map_tools::{BarrierSettings, CalibrationSettings, SegmentSettings, TrimSettings};
use pathfinding::{PlannerSettings, RenderSettings};
use serde::Deserialize;

/// Every tunable of the route engine. Missing sections and keys fall back to
/// the defaults used for the exported store maps.
///
/// ```toml
/// [trim]
/// tolerance = 90
///
/// [segmentation]
/// seed = 7
///
/// [planner]
/// max_expansions = 80000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub trim: TrimSettings,
    pub calibration: CalibrationSettings,
    pub segmentation: SegmentSettings,
    pub barrier: BarrierSettings,
    pub planner: PlannerSettings,
    pub render: RenderSettings,
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, RouteError> {
        toml::from_str(s).map_err(|e| RouteError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, RouteError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RouteError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}

static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");

/// DejaVu Sans Mono, shipped with the crate so text is drawn without a font path.
pub fn default_font() -> Result<FontVec, RouteError> {
    FontVec::try_from_vec(BUNDLED_FONT.to_vec()).map_err(|e| RouteError::Font(e.to_string()))
}

/// Load a TrueType/OpenType font for label and item text.
pub fn load_font(path: &Path) -> Result<FontVec, RouteError> {
    let bytes = std::fs::read(path).map_err(|e| RouteError::Font(format!("{}: {e}", path.display())))?;
    FontVec::try_from_vec(bytes).map_err(|e| RouteError::Font(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_store_map_defaults() {
        let cfg = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.trim.right_border, 16);
        assert_eq!(cfg.trim.top_border, 66);
        assert_eq!(cfg.trim.background, [247, 247, 247]);
        assert_eq!(cfg.barrier.open_floor, [224, 224, 224]);
        assert_eq!(cfg.calibration.bias_x, 30.0);
        assert_eq!(cfg.calibration.bias_y, 25.0);
        assert_eq!(cfg.planner.max_expansions, 50_000);
        assert_eq!(cfg.segmentation.text_scale, 12.0);
        assert_eq!(cfg.render.text_scale, 12.0);
    }

    #[test]
    fn partial_sections_override_single_keys() {
        let cfg = EngineConfig::from_toml_str(
            r#"
            [trim]
            tolerance = 90

            [segmentation]
            seed = 7
            text_scale = 9.5

            [render]
            path_color = [0, 200, 0]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.trim.tolerance, 90);
        assert_eq!(cfg.trim.top_border, 66);
        assert_eq!(cfg.segmentation.seed, Some(7));
        assert_eq!(cfg.segmentation.text_scale, 9.5);
        assert_eq!(cfg.render.text_scale, 12.0);
        assert_eq!(cfg.render.path_color, [0, 200, 0]);
        assert_eq!(cfg.render.marker_radius, 5);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let err = EngineConfig::from_toml_str("[planner]\nmax_expansions = \"lots\"").unwrap_err();
        assert!(matches!(err, RouteError::Config(_)));
    }

    #[test]
    fn bundled_font_loads() {
        use ab_glyph::Font;
        let font = default_font().unwrap();
        assert!(font.glyph_id('a').0 != 0);
    }

    #[test]
    fn missing_font_file_is_reported() {
        let err = load_font(Path::new("/definitely/not/here.ttf")).unwrap_err();
        assert!(matches!(err, RouteError::Font(_)));
    }
}
