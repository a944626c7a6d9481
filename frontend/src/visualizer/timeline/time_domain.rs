//! Time domain for timeline time representations and calculations
//!
//! Complete domain containing all time-related types and their operations:
//! TimeMs, DurationMs, MsPerPixel, ViewRange, VirtualSpace, CoordinateMapper

use crate::error::ValidationError;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::ops::{Add, Mul, Sub};

// Time conversion constants
pub const MS_PER_SECOND: f64 = 1_000.0;
pub const MS_PER_MINUTE: f64 = 60.0 * MS_PER_SECOND;
pub const MS_PER_HOUR: f64 = 60.0 * MS_PER_MINUTE;
pub const MS_PER_DAY: f64 = 24.0 * MS_PER_HOUR;

pub const DEFAULT_VIRTUAL_WIDTH: f64 = 1_000_000.0;

/// Wall-clock instant as milliseconds since the Unix epoch (UTC).
///
/// Fractional milliseconds are kept so pixel mapping round-trips without
/// integer truncation.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct TimeMs(pub f64);

impl TimeMs {
    pub const EPOCH: TimeMs = TimeMs(0.0);

    pub fn from_millis(millis: f64) -> Self {
        TimeMs(millis)
    }

    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        TimeMs(datetime.timestamp_millis() as f64)
    }

    pub fn millis(self) -> f64 {
        self.0
    }

    /// Rounded to whole milliseconds; `None` outside chrono's range.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        if !self.0.is_finite() {
            return None;
        }
        DateTime::from_timestamp_millis(self.0.round() as i64)
    }

    pub fn duration_since(self, earlier: TimeMs) -> DurationMs {
        DurationMs(self.0 - earlier.0)
    }

    pub fn add_duration(self, duration: DurationMs) -> TimeMs {
        TimeMs(self.0 + duration.0)
    }

    pub fn sub_duration(self, duration: DurationMs) -> TimeMs {
        TimeMs(self.0 - duration.0)
    }

    /// Largest multiple of `interval` (measured from the epoch) not after `self`.
    pub fn floor_to(self, interval: DurationMs) -> TimeMs {
        if interval.0 <= 0.0 {
            return self;
        }
        TimeMs((self.0 / interval.0).floor() * interval.0)
    }

    pub fn is_multiple_of(self, interval: DurationMs) -> bool {
        if interval.0 <= 0.0 {
            return false;
        }
        let remainder = self.0.rem_euclid(interval.0);
        remainder < 0.5 || interval.0 - remainder < 0.5
    }
}

impl fmt::Display for TimeMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(datetime) => write!(
                f,
                "{}",
                datetime.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            None => write!(f, "{}ms", self.0),
        }
    }
}

/// Represents a (possibly negative) duration in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct DurationMs(pub f64);

impl DurationMs {
    pub const ZERO: DurationMs = DurationMs(0.0);

    pub fn from_millis(millis: f64) -> Self {
        DurationMs(millis)
    }

    pub fn from_minutes(minutes: f64) -> Self {
        DurationMs(minutes * MS_PER_MINUTE)
    }

    pub fn from_hours(hours: f64) -> Self {
        DurationMs(hours * MS_PER_HOUR)
    }

    pub fn from_days(days: f64) -> Self {
        DurationMs(days * MS_PER_DAY)
    }

    pub fn millis(self) -> f64 {
        self.0
    }

    pub fn hours(self) -> f64 {
        self.0 / MS_PER_HOUR
    }

    pub fn clamp(self, min: DurationMs, max: DurationMs) -> DurationMs {
        DurationMs(self.0.clamp(min.0, max.0))
    }
}

impl fmt::Display for DurationMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let abs = self.0.abs();
        if abs >= MS_PER_DAY {
            write!(f, "{:.1}d", self.0 / MS_PER_DAY)
        } else if abs >= MS_PER_HOUR {
            write!(f, "{:.1}h", self.0 / MS_PER_HOUR)
        } else if abs >= MS_PER_MINUTE {
            write!(f, "{:.1}min", self.0 / MS_PER_MINUTE)
        } else if abs >= MS_PER_SECOND {
            write!(f, "{:.1}s", self.0 / MS_PER_SECOND)
        } else {
            write!(f, "{}ms", self.0)
        }
    }
}

impl Add for DurationMs {
    type Output = DurationMs;

    fn add(self, rhs: DurationMs) -> DurationMs {
        DurationMs(self.0 + rhs.0)
    }
}

impl Sub for DurationMs {
    type Output = DurationMs;

    fn sub(self, rhs: DurationMs) -> DurationMs {
        DurationMs(self.0 - rhs.0)
    }
}

impl Mul<f64> for DurationMs {
    type Output = DurationMs;

    fn mul(self, rhs: f64) -> DurationMs {
        DurationMs(self.0 * rhs)
    }
}

/// Represents timeline resolution as milliseconds per pixel.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct MsPerPixel(pub f64);

impl MsPerPixel {
    pub fn for_span(duration: DurationMs, width_px: f64) -> Self {
        MsPerPixel(duration.0 / width_px)
    }

    pub fn millis(self) -> f64 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0.is_finite() && self.0 > 0.0
    }
}

impl fmt::Display for MsPerPixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= MS_PER_MINUTE {
            write!(f, "{:.1}min/px", self.0 / MS_PER_MINUTE)
        } else if self.0 >= MS_PER_SECOND {
            write!(f, "{:.1}s/px", self.0 / MS_PER_SECOND)
        } else {
            write!(f, "{:.1}ms/px", self.0)
        }
    }
}

/// Visible wall-clock window. Always `end > start`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRange {
    pub start: TimeMs,
    pub end: TimeMs,
}

impl ViewRange {
    pub fn new(start: TimeMs, end: TimeMs) -> Result<Self, ValidationError> {
        if !start.0.is_finite() || !end.0.is_finite() {
            return Err(ValidationError::NonFinite);
        }
        if end <= start {
            return Err(ValidationError::EmptyRange { start, end });
        }
        Ok(ViewRange { start, end })
    }

    /// Builds a range from a known-positive duration.
    pub(crate) fn from_start(start: TimeMs, duration: DurationMs) -> Self {
        ViewRange {
            start,
            end: start.add_duration(duration),
        }
    }

    /// Parses user-entered RFC3339 bounds.
    pub fn parse(start: &str, end: &str) -> Result<Self, ValidationError> {
        let parse = |raw: &str| {
            DateTime::parse_from_rfc3339(raw.trim())
                .map(|datetime| TimeMs::from_datetime(datetime.with_timezone(&Utc)))
                .map_err(|error| ValidationError::InvalidBound {
                    input: raw.to_string(),
                    reason: error.to_string(),
                })
        };
        ViewRange::new(parse(start)?, parse(end)?)
    }

    pub fn duration(self) -> DurationMs {
        self.end.duration_since(self.start)
    }

    pub fn center(self) -> TimeMs {
        self.start.add_duration(self.duration() * 0.5)
    }

    pub fn contains(self, time: TimeMs) -> bool {
        time >= self.start && time <= self.end
    }

    pub fn covers(self, other: ViewRange) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    pub fn overlaps(self, start: TimeMs, end: TimeMs) -> bool {
        start < self.end && end > self.start
    }
}

impl fmt::Display for ViewRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.start, self.end)
    }
}

/// Fixed-size coordinate range `[0, width)` onto which a sliding time window
/// is mapped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualSpace {
    pub width: f64,
}

impl VirtualSpace {
    pub fn new(width: f64) -> Self {
        VirtualSpace {
            width: if width.is_finite() && width > 0.0 {
                width
            } else {
                DEFAULT_VIRTUAL_WIDTH
            },
        }
    }

    pub fn contains(self, position: f64) -> bool {
        position >= 0.0 && position < self.width
    }

    pub fn midpoint(self) -> f64 {
        (self.width / 2.0).floor()
    }
}

impl Default for VirtualSpace {
    fn default() -> Self {
        VirtualSpace::new(DEFAULT_VIRTUAL_WIDTH)
    }
}

/// Pure time↔pixel mapping over the virtual space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    /// Instant at virtual position 0.
    pub anchor_time: TimeMs,
    pub ms_per_pixel: MsPerPixel,
}

impl CoordinateMapper {
    pub fn new(anchor_time: TimeMs, ms_per_pixel: MsPerPixel) -> Self {
        debug_assert!(ms_per_pixel.is_valid());
        CoordinateMapper {
            anchor_time,
            ms_per_pixel,
        }
    }

    pub fn pixel_to_time(&self, pixel: f64) -> TimeMs {
        TimeMs(self.anchor_time.0 + pixel * self.ms_per_pixel.0)
    }

    pub fn time_to_pixel(&self, time: TimeMs) -> f64 {
        (time.0 - self.anchor_time.0) / self.ms_per_pixel.0
    }

    /// Anchor that places `time` at virtual position `pixel`.
    pub fn anchored_at(time: TimeMs, pixel: f64, ms_per_pixel: MsPerPixel) -> Self {
        CoordinateMapper::new(TimeMs(time.0 - pixel * ms_per_pixel.0), ms_per_pixel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> CoordinateMapper {
        // 2025-01-01T00:00:00Z, one hour across 1200 px
        CoordinateMapper::new(
            TimeMs(1_735_689_600_000.0),
            MsPerPixel::for_span(DurationMs::from_hours(1.0), 1200.0),
        )
    }

    #[test]
    fn pixel_time_round_trip() {
        let mapper = mapper();
        for pixel in [0.0, 0.5, 1.0, 123.25, 500_000.0, 999_999.0] {
            let back = mapper.time_to_pixel(mapper.pixel_to_time(pixel));
            assert!((back - pixel).abs() < 1e-6, "{pixel} came back as {back}");
        }
    }

    #[test]
    fn time_pixel_round_trip() {
        let mapper = mapper();
        let time = TimeMs(1_735_700_000_123.0);
        let back = mapper.pixel_to_time(mapper.time_to_pixel(time));
        assert!((back.0 - time.0).abs() < 1e-3);
    }

    #[test]
    fn anchored_at_places_time_on_pixel() {
        let time = TimeMs(1_735_689_600_000.0);
        let mapper = CoordinateMapper::anchored_at(time, 500_000.0, MsPerPixel(3_000.0));
        assert_eq!(mapper.pixel_to_time(500_000.0), time);
    }

    #[test]
    fn rejects_empty_ranges() {
        let t = TimeMs(1_000.0);
        assert!(matches!(
            ViewRange::new(t, t),
            Err(ValidationError::EmptyRange { .. })
        ));
        assert!(matches!(
            ViewRange::new(TimeMs(f64::NAN), t),
            Err(ValidationError::NonFinite)
        ));
    }

    #[test]
    fn parses_rfc3339_bounds() {
        let range = ViewRange::parse("2025-01-01T00:00:00Z", "2025-01-01T02:00:00+00:00").unwrap();
        assert_eq!(range.duration(), DurationMs::from_hours(2.0));
        assert!(matches!(
            ViewRange::parse("yesterday", "2025-01-01T02:00:00Z"),
            Err(ValidationError::InvalidBound { .. })
        ));
    }

    #[test]
    fn floors_to_interval_boundaries() {
        let quarter = DurationMs::from_minutes(15.0);
        let time = TimeMs(1_735_689_600_000.0 + 20.0 * MS_PER_MINUTE);
        assert_eq!(time.floor_to(quarter), TimeMs(1_735_689_600_000.0 + 15.0 * MS_PER_MINUTE));
        assert!(TimeMs(1_735_689_600_000.0).is_multiple_of(DurationMs::from_days(1.0)));
    }

    #[test]
    fn covers_is_inclusive() {
        let outer = ViewRange::new(TimeMs(0.0), TimeMs(100.0)).unwrap();
        assert!(outer.covers(outer));
        assert!(outer.covers(ViewRange::new(TimeMs(10.0), TimeMs(90.0)).unwrap()));
        assert!(!outer.covers(ViewRange::new(TimeMs(10.0), TimeMs(101.0)).unwrap()));
    }

    #[test]
    fn displays_resolution() {
        assert_eq!(MsPerPixel(3_000.0).to_string(), "3.0s/px");
        assert_eq!(DurationMs::from_hours(36.0).to_string(), "1.5d");
    }
}
