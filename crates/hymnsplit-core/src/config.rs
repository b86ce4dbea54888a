//! Splitter configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! oversampling = 3.0
//! viewer_scale = 1.5
//! click_policy = "nearest"
//! incomplete_render_policy = "abort"
//!
//! [output_page]
//! width = 612.0
//! height = 792.0
//! ```

use crate::coords::PageSize;
use crate::error::HymnSplitError;
use crate::raster::{IncompletePolicy, RasterOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// How a click near existing lines is interpreted
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClickPolicy {
    /// Toggle the nearest line within tolerance, whenever it was drawn
    #[default]
    Nearest,
    /// Toggle only the page's latest line, and only shortly after it was drawn
    Recent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SplitterConfig {
    /// Size of every crop-mode output page, in points
    pub output_page: PageSize,
    /// Crop-mode raster scale relative to 72 units per inch
    pub oversampling: f64,
    /// Scale of the crop-mode viewer
    pub viewer_scale: f64,
    /// Rendered units within which a click hits an existing line
    pub click_tolerance: f64,
    pub double_click_window_ms: u64,
    pub click_policy: ClickPolicy,
    pub min_crop_height: f64,
    pub default_crop_height: f64,
    pub incomplete_render_policy: IncompletePolicy,
    pub greyscale: bool,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            output_page: PageSize::LETTER,
            oversampling: 3.0,
            viewer_scale: 1.5,
            click_tolerance: 10.0,
            double_click_window_ms: 500,
            click_policy: ClickPolicy::Nearest,
            min_crop_height: 40.0,
            default_crop_height: 200.0,
            incomplete_render_policy: IncompletePolicy::Abort,
            greyscale: false,
        }
    }
}

impl SplitterConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, HymnSplitError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            HymnSplitError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(s: &str) -> Result<Self, HymnSplitError> {
        let config: Self = toml::from_str(s)
            .map_err(|e| HymnSplitError::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), HymnSplitError> {
        let positive = [
            ("output_page.width", self.output_page.width),
            ("output_page.height", self.output_page.height),
            ("oversampling", self.oversampling),
            ("viewer_scale", self.viewer_scale),
            ("default_crop_height", self.default_crop_height),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(HymnSplitError::Config(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if self.click_tolerance < 0.0 || self.min_crop_height < 0.0 {
            return Err(HymnSplitError::Config(
                "Tolerances must not be negative".into(),
            ));
        }
        Ok(())
    }

    pub fn raster_options(&self, greyscale: bool) -> RasterOptions {
        RasterOptions {
            oversampling: self.oversampling,
            viewer_scale: self.viewer_scale,
            greyscale,
            output_page: self.output_page,
            incomplete: self.incomplete_render_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_toml_gives_defaults() {
        assert_eq!(
            SplitterConfig::from_toml("").unwrap(),
            SplitterConfig::default()
        );
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = SplitterConfig::from_toml(
            r#"
            oversampling = 2.0
            click_policy = "recent"
            incomplete_render_policy = "skip_page"

            [output_page]
            width = 595.0
            height = 842.0
            "#,
        )
        .unwrap();
        assert_eq!(config.oversampling, 2.0);
        assert_eq!(config.click_policy, ClickPolicy::Recent);
        assert_eq!(config.incomplete_render_policy, IncompletePolicy::SkipPage);
        assert_eq!(config.output_page, PageSize::new(595.0, 842.0));
        assert_eq!(config.click_tolerance, 10.0);
    }

    #[test]
    fn test_rejects_non_positive_scale() {
        let err = SplitterConfig::from_toml("viewer_scale = 0.0").unwrap_err();
        assert!(matches!(err, HymnSplitError::Config(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(SplitterConfig::from_toml("oversampling = \"lots\"").is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(SplitterConfig::from_file("/nonexistent/hymnsplit.toml").is_err());
    }
}
