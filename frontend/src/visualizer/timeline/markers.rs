//! Gridline markers for the timeline header
//!
//! Interval choice is table driven by the view duration. Times are floored
//! to interval boundaries in UTC, counted from the Unix epoch. Weekly major
//! ticks therefore land on Thursdays.

use super::time_domain::{CoordinateMapper, DurationMs, TimeMs, ViewRange, VirtualSpace};

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub time: TimeMs,
    /// Position in virtual space.
    pub position: f64,
    pub major: bool,
    pub label: String,
}

/// `(view duration ≤ hours, minor minutes, major hours)`
const INTERVAL_TABLE: [(f64, f64, f64); 5] = [
    (2.0, 15.0, 1.0),
    (6.0, 30.0, 2.0),
    (12.0, 60.0, 6.0),
    (48.0, 120.0, 12.0),
    (168.0, 360.0, 24.0),
];
const WIDEST_INTERVALS: (f64, f64) = (24.0 * 60.0, 7.0 * 24.0);

/// Minor and major gridline spacing for a view duration.
pub fn marker_intervals(view_duration: DurationMs) -> (DurationMs, DurationMs) {
    let hours = view_duration.hours();
    let (minor_minutes, major_hours) = INTERVAL_TABLE
        .iter()
        .find(|(limit, _, _)| hours <= *limit)
        .map(|&(_, minor, major)| (minor, major))
        .unwrap_or(WIDEST_INTERVALS);
    (
        DurationMs::from_minutes(minor_minutes),
        DurationMs::from_hours(major_hours),
    )
}

pub fn marker_label(time: TimeMs, major: bool) -> String {
    let Some(datetime) = time.to_datetime() else {
        return String::new();
    };
    if major && time.is_multiple_of(DurationMs::from_days(1.0)) {
        datetime.format("%b %d").to_string()
    } else {
        datetime.format("%H:%M").to_string()
    }
}

/// Markers covering `view`, keeping only those that land inside the virtual space.
pub fn generate_markers(
    view: ViewRange,
    mapper: &CoordinateMapper,
    virtual_space: VirtualSpace,
) -> Vec<Marker> {
    let (minor, major) = marker_intervals(view.duration());
    let first = view.start.floor_to(minor);
    let steps = ((view.end.0 - first.0) / minor.0).floor() as u64;

    (0..=steps)
        // Multiplying from the floored start keeps boundaries exact.
        .map(|step| TimeMs(first.0 + step as f64 * minor.0))
        .filter_map(|time| {
            let position = mapper.time_to_pixel(time);
            if !virtual_space.contains(position) {
                return None;
            }
            let major = time.is_multiple_of(major);
            Some(Marker {
                time,
                position,
                major,
                label: marker_label(time, major),
            })
        })
        .collect()
}
