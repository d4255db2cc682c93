//! Editor and sync configuration.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;
use thiserror::Error;

use crate::clock::Millis;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Inclusive numeric range for tool sizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeRange {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl SizeRange {
    pub const fn new(min: f64, max: f64, default: f64) -> Self {
        Self { min, max, default }
    }

    /// Clamp a value into the range. NaN falls back to the default.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.default;
        }
        value.clamp(self.min, self.max)
    }

    pub fn range(&self) -> RangeInclusive<f64> {
        self.min..=self.max
    }
}

/// How concurrent writes to the same element are ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    #[default]
    LastWriteWins,
    CausalTransform,
}

/// Collaboration timing and policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum spacing between applied cursor updates.
    pub cursor_throttle_ms: Millis,
    /// Writes by another participant closer than this are reported as conflicts.
    pub conflict_window_ms: Millis,
    /// Presence records idle longer than this are purged.
    pub presence_timeout_ms: Millis,
    /// Interval between presence sweeps.
    pub presence_sweep_ms: Millis,
    /// How long a participant counts as actively drawing after an edit.
    pub activity_window_ms: Millis,
    pub strategy: ResolutionStrategy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cursor_throttle_ms: 8.33,
            conflict_window_ms: 50.0,
            presence_timeout_ms: 60_000.0,
            presence_sweep_ms: 30_000.0,
            activity_window_ms: 1_000.0,
            strategy: ResolutionStrategy::LastWriteWins,
        }
    }
}

/// Editor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub max_history: usize,
    pub canvas_width: f64,
    pub canvas_height: f64,
    pub fill_color: String,
    pub stroke_color: String,
    pub brush_size: SizeRange,
    pub pen_size: SizeRange,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Buffered brush points are written into the path every this many points.
    pub brush_flush_points: usize,
    /// A pen click closer than this to the first vertex closes the polygon.
    pub pen_close_distance: f64,
    pub sync: SyncConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_history: 50,
            canvas_width: 800.0,
            canvas_height: 800.0,
            fill_color: "#ffffff".to_string(),
            stroke_color: "#000000".to_string(),
            brush_size: SizeRange::new(1.0, 100.0, 20.0),
            pen_size: SizeRange::new(1.0, 50.0, 2.0),
            min_zoom: 0.1,
            max_zoom: 10.0,
            brush_flush_points: 32,
            pen_close_distance: 10.0,
            sync: SyncConfig::default(),
        }
    }
}

impl EditorConfig {
    /// Parse configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&text)?;
        log::info!("loaded editor config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_history == 0 {
            return Err(ConfigError::Invalid("max_history must be positive".into()));
        }
        if !(self.min_zoom > 0.0 && self.min_zoom <= self.max_zoom) {
            return Err(ConfigError::Invalid(format!(
                "zoom limits out of order: {} > {}",
                self.min_zoom, self.max_zoom
            )));
        }
        for (name, range) in [("brush_size", &self.brush_size), ("pen_size", &self.pen_size)] {
            if range.min > range.max || !range.range().contains(&range.default) {
                return Err(ConfigError::Invalid(format!("{name} range is inconsistent")));
            }
        }
        if self.brush_flush_points == 0 {
            return Err(ConfigError::Invalid("brush_flush_points must be positive".into()));
        }
        Ok(())
    }
}
