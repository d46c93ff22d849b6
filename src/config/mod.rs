//!
//! The settings the engine consumes and produces
//!
//! Persistence belongs to the caller: these helpers only convert to and from JSON.
//!

use std::path::Path;

use image::Rgba;
use serde::{Serialize, Deserialize};

use crate::calibration::error::CalibrationError;
use crate::calibration::{CalibrationQuadrilateral, PixelPoint};
use crate::hardware::{BedVolume, ExtruderEnvelope};
use crate::projection::{ViewParameters, Viewport};
use crate::render::error::RenderError;
use crate::render::parse_hex_color;
use error::ConfigError;

pub mod error;

///
/// Everything a session needs that outlives it.
///
/// # Fields:
/// - `view`: The view parameters, clipped into bounds when read through `view()`
/// - `pixels`: The marked bed corners in the base photo
/// - `bed`: The printable volume
/// - `extruder`: The extruder envelope used for masking
/// - `color`: The render colour as `#rrggbb`
/// - `viewport`: The render size
///
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HologramConfig {
    pub view: ViewParameters,
    pub pixels: Vec<PixelPoint>,
    pub bed: BedVolume,
    pub extruder: ExtruderEnvelope,
    pub color: String,
    pub viewport: Viewport,
}

impl Default for HologramConfig {
    fn default() -> Self {
        HologramConfig {
            view: ViewParameters::default(),
            pixels: vec![
                PixelPoint { x: 50., y: 50. },
                PixelPoint { x: 550., y: 50. },
                PixelPoint { x: 550., y: 350. },
                PixelPoint { x: 50., y: 350. },
            ],
            bed: BedVolume::default(),
            extruder: ExtruderEnvelope::default(),
            color: "#ff0000".to_owned(),
            viewport: Viewport::default(),
        }
    }
}

impl HologramConfig {
    pub fn from_json(json: &str) -> Result<HologramConfig, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<HologramConfig, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|err| ConfigError::Io { path: path.display().to_string(), reason: err.to_string() })?;
        HologramConfig::from_json(&json)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?).map_err(|err| ConfigError::Io { path: path.display().to_string(), reason: err.to_string() })
    }

    ///
    /// # Returns:
    /// - The stored view parameters, clipped into bounds
    ///
    pub fn view(&self) -> ViewParameters {
        self.view.clamped()
    }

    pub fn quadrilateral(&self) -> Result<CalibrationQuadrilateral, CalibrationError> {
        CalibrationQuadrilateral::from_pixels(&self.pixels)
    }

    pub fn render_color(&self) -> Result<Rgba<u8>, RenderError> {
        parse_hex_color(&self.color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    #[test]
    fn defaults_are_usable() {
        let config = HologramConfig::default();

        assert_eq!(config.quadrilateral().unwrap().anchor(), Point2::new(300., 200.));
        assert_eq!(config.render_color().unwrap(), Rgba([255, 0, 0, 255]));
        assert_eq!(config.view(), ViewParameters::default());
        assert_eq!(config.viewport, Viewport::new(640, 480));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config = HologramConfig::from_json(r##"{ "color": "#00ff00", "bed": { "length": 180, "width": 180, "depth": 180 } }"##).unwrap();

        assert_eq!(config.color, "#00ff00");
        assert_eq!(*config.bed.length(), 180.);
        assert_eq!(config.pixels, HologramConfig::default().pixels);
    }

    #[test]
    fn out_of_bounds_view_is_clipped_on_read() {
        let json = r#"{ "view": { "elevation": 500, "azimuth": -90, "roll": 0, "focal_length": 0.01, "scale": 1 } }"#;
        let view = HologramConfig::from_json(json).unwrap().view();

        assert_eq!(view.elevation, 360.);
        assert_eq!(view.focal_length, 0.075);
    }

    #[test]
    fn round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hologram.json");

        let mut config = HologramConfig::default();
        config.view = ViewParameters::new(45., -30., 2., 0.5, 1.5);
        config.save(&path).unwrap();

        assert_eq!(HologramConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(HologramConfig::from_json("{ nope"), Err(ConfigError::Malformed(_))));
        assert!(matches!(HologramConfig::load("/not/a/settings.json"), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn too_few_points_fail_to_make_a_quadrilateral() {
        let mut config = HologramConfig::default();
        config.pixels.pop();
        assert!(config.quadrilateral().is_err());
    }
}
