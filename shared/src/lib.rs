use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ===== WIRE TYPES =====

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleState {
    Active,
    AwaitingApproval,
}

impl ScheduleState {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleState::Active => "active",
            ScheduleState::AwaitingApproval => "awaiting_approval",
        }
    }
}

/// Row returned by `GET /api/schedules?start=..&end=..`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub id: String,
    pub state: ScheduleState,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A predicted satellite pass, acquisition (`aos`) to loss of signal (`los`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Pass {
    pub satellite: String,
    pub norad_id: u32,
    pub aos: DateTime<Utc>,
    pub los: DateTime<Utc>,
    pub tca: DateTime<Utc>,
    pub max_elevation_deg: f64,
    pub aos_azimuth_deg: f64,
    pub los_azimuth_deg: f64,
    pub duration_seconds: i64,
    #[serde(default)]
    pub orbit_number: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PredictResponse {
    pub passes: Vec<Pass>,
    pub satellite_count: usize,
}

/// Generic timed event. Every descriptive field is optional because events
/// come from heterogeneous producers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ===== CONFIG TYPES =====

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct TimelineConfig {
    pub app: AppSection,
    pub viewport: ViewportSection,
    pub gesture: GestureSection,
    pub fetch: FetchSection,
    pub lanes: LanesSection,
    pub server: ServerSection,
}

impl TimelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: TimelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.app.is_supported_version() {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}",
                self.app.version
            )));
        }

        let viewport = &self.viewport;
        // Every float check is written so that NaN fails it.
        if !(viewport.min_duration_hours > 0.0 && viewport.min_duration_hours.is_finite()) {
            return Err(ConfigError::Invalid(
                "viewport.min_duration_hours must be positive".into(),
            ));
        }
        if !(viewport.max_duration_hours > viewport.min_duration_hours
            && viewport.max_duration_hours.is_finite())
        {
            return Err(ConfigError::Invalid(format!(
                "viewport.max_duration_hours ({}) must exceed min_duration_hours ({})",
                viewport.max_duration_hours, viewport.min_duration_hours
            )));
        }
        if !(viewport.initial_duration_hours > 0.0 && viewport.initial_duration_hours.is_finite()) {
            return Err(ConfigError::Invalid(
                "viewport.initial_duration_hours must be positive".into(),
            ));
        }
        if !(viewport.virtual_width >= 1_000.0 && viewport.virtual_width.is_finite()) {
            return Err(ConfigError::Invalid(
                "viewport.virtual_width must be at least 1000".into(),
            ));
        }
        if !(0.0..0.5).contains(&viewport.recenter_threshold) {
            return Err(ConfigError::Invalid(
                "viewport.recenter_threshold must be within [0, 0.5)".into(),
            ));
        }
        if !(viewport.zoom_step > 1.0 && viewport.zoom_step.is_finite()) {
            return Err(ConfigError::Invalid("viewport.zoom_step must exceed 1".into()));
        }
        if !(viewport.pan_fraction > 0.0 && viewport.pan_fraction.is_finite()) {
            return Err(ConfigError::Invalid(
                "viewport.pan_fraction must be positive".into(),
            ));
        }

        let gesture = &self.gesture;
        if !(gesture.drag_threshold_px > 0.0 && gesture.drag_threshold_px.is_finite()) {
            return Err(ConfigError::Invalid(
                "gesture.drag_threshold_px must be positive".into(),
            ));
        }
        if !(gesture.wheel_zoom_factor > 1.0 && gesture.wheel_zoom_factor.is_finite()) {
            return Err(ConfigError::Invalid(
                "gesture.wheel_zoom_factor must exceed 1".into(),
            ));
        }

        if self.fetch.debounce_ms == 0 {
            return Err(ConfigError::Invalid("fetch.debounce_ms must be positive".into()));
        }
        if !(self.fetch.buffer_multiple >= 0.0 && self.fetch.buffer_multiple.is_finite()) {
            return Err(ConfigError::Invalid(
                "fetch.buffer_multiple must not be negative".into(),
            ));
        }
        if let Some(hours) = self.fetch.buffer_fixed_hours {
            if !(hours >= 0.0 && hours.is_finite()) {
                return Err(ConfigError::Invalid(
                    "fetch.buffer_fixed_hours must not be negative".into(),
                ));
            }
        }

        let lanes = &self.lanes;
        if !(lanes.row_height_px > 0.0 && lanes.row_height_px.is_finite()) {
            return Err(ConfigError::Invalid("lanes.row_height_px must be positive".into()));
        }
        if !(lanes.min_item_width_px >= 0.0 && lanes.min_item_width_px.is_finite()) {
            return Err(ConfigError::Invalid(
                "lanes.min_item_width_px must not be negative".into(),
            ));
        }

        Ok(())
    }
}

// AppSection carries the config format version so older files can be rejected
// instead of being half-applied.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppSection {
    pub version: String,
}

impl AppSection {
    pub const CURRENT_VERSION: &'static str = "1.0.0";

    pub fn is_supported_version(&self) -> bool {
        matches!(self.version.as_str(), "1.0.0")
    }
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ViewportSection {
    pub min_duration_hours: f64,
    pub max_duration_hours: f64,
    pub initial_duration_hours: f64,
    /// Width of the bounded virtual scroll space, in pixels.
    pub virtual_width: f64,
    /// Fraction of the viewport width that triggers a recenter near an edge.
    pub recenter_threshold: f64,
    pub zoom_step: f64,
    /// Fraction of the view duration moved by a single pan step.
    pub pan_fraction: f64,
}

impl Default for ViewportSection {
    fn default() -> Self {
        Self {
            min_duration_hours: 1.0,
            max_duration_hours: 14.0 * 24.0,
            initial_duration_hours: 24.0,
            virtual_width: 1_000_000.0,
            recenter_threshold: 0.2,
            zoom_step: 2.0,
            pan_fraction: 0.2,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GestureSection {
    pub drag_threshold_px: f64,
    pub wheel_zoom_factor: f64,
}

impl Default for GestureSection {
    fn default() -> Self {
        Self {
            drag_threshold_px: 3.0,
            wheel_zoom_factor: 1.2,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FetchSection {
    pub debounce_ms: u64,
    /// Total padding around the view as a multiple of its duration, split
    /// evenly before and after.
    pub buffer_multiple: f64,
    /// Fixed padding on each side; takes precedence over `buffer_multiple`.
    pub buffer_fixed_hours: Option<f64>,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            buffer_multiple: 2.0,
            buffer_fixed_hours: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LaneOrder {
    #[default]
    FirstSeen,
    Alphabetical,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LanesSection {
    pub order: LaneOrder,
    pub row_height_px: f64,
    pub min_item_width_px: f64,
    pub schedule_label: String,
    pub event_default_label: String,
}

impl Default for LanesSection {
    fn default() -> Self {
        Self {
            order: LaneOrder::FirstSeen,
            row_height_px: 28.0,
            min_item_width_px: 2.0,
            schedule_label: "Schedules".to_string(),
            event_default_label: "Events".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServerSection {
    pub base_url: String,
    pub schedules_path: String,
    pub predict_path: String,
    /// Events are optional; the lane is simply empty without an endpoint.
    pub events_path: Option<String>,
    pub api_key: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            schedules_path: "/api/schedules".to_string(),
            predict_path: "/api/predict".to_string(),
            events_path: None,
            api_key: None,
        }
    }
}
