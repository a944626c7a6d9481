//! Row/lane building for heterogeneous timeline items
//!
//! Schedules always occupy the first lane. Passes get one lane per
//! satellite, events one lane per source label. The remaining lanes keep the
//! order in which their first item was encountered unless alphabetical
//! ordering is configured.

use crate::items::TimedItem;
use indexmap::IndexMap;
use shared::{EventRecord, LaneOrder, LanesSection};

use super::time_domain::CoordinateMapper;

#[derive(Debug, Clone, PartialEq)]
pub struct LaneSettings {
    pub order: LaneOrder,
    pub row_height_px: f64,
    pub min_item_width_px: f64,
    pub schedule_label: String,
    pub event_default_label: String,
}

impl Default for LaneSettings {
    fn default() -> Self {
        LaneSettings::from(&LanesSection::default())
    }
}

impl From<&LanesSection> for LaneSettings {
    fn from(section: &LanesSection) -> Self {
        LaneSettings {
            order: section.order,
            row_height_px: section.row_height_px,
            min_item_width_px: section.min_item_width_px,
            schedule_label: section.schedule_label.clone(),
            event_default_label: section.event_default_label.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LaneKind {
    Schedule,
    Satellite,
    EventSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lane {
    pub kind: LaneKind,
    pub label: String,
    pub items: Vec<TimedItem>,
}

/// Source label of an event: first non-blank of source, provider, origin,
/// kind and type, else `default_label`.
pub fn event_lane_label<'a>(event: &'a EventRecord, default_label: &'a str) -> &'a str {
    [
        &event.source,
        &event.provider,
        &event.origin,
        &event.kind,
        &event.event_type,
    ]
    .into_iter()
    .filter_map(|field| field.as_deref())
    .map(str::trim)
    .find(|label| !label.is_empty())
    .unwrap_or(default_label)
}

/// Groups items into lanes. Pure; the same input always yields the same lanes.
pub fn build_lanes<'a>(
    items: impl IntoIterator<Item = &'a TimedItem>,
    settings: &LaneSettings,
) -> LaneLayout {
    let mut schedule_lane = Lane {
        kind: LaneKind::Schedule,
        label: settings.schedule_label.clone(),
        items: Vec::new(),
    };
    let mut grouped: IndexMap<(LaneKind, String), Vec<TimedItem>> = IndexMap::new();

    for item in items {
        let key = match item {
            TimedItem::Schedule(_) => {
                schedule_lane.items.push(item.clone());
                continue;
            }
            TimedItem::Pass(pass) => (LaneKind::Satellite, pass.satellite.clone()),
            TimedItem::Event(event) => (
                LaneKind::EventSource,
                event_lane_label(event, &settings.event_default_label).to_string(),
            ),
        };
        grouped.entry(key).or_default().push(item.clone());
    }

    if settings.order == LaneOrder::Alphabetical {
        grouped.sort_by(|(kind_a, label_a), _, (kind_b, label_b), _| {
            label_a.cmp(label_b).then(kind_a.cmp(kind_b))
        });
    }

    let mut lanes = Vec::with_capacity(grouped.len() + 1);
    lanes.push(schedule_lane);
    lanes.extend(
        grouped
            .into_iter()
            .map(|((kind, label), items)| Lane { kind, label, items }),
    );

    LaneLayout {
        lanes,
        row_height_px: settings.row_height_px,
        min_item_width_px: settings.min_item_width_px,
    }
}

/// Lanes plus the geometry needed to place and hit-test their items.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneLayout {
    pub lanes: Vec<Lane>,
    pub row_height_px: f64,
    pub min_item_width_px: f64,
}

impl Default for LaneLayout {
    fn default() -> Self {
        build_lanes(std::iter::empty(), &LaneSettings::default())
    }
}

impl LaneLayout {
    pub fn total_height(&self) -> f64 {
        self.lanes.len() as f64 * self.row_height_px
    }

    pub fn item_count(&self) -> usize {
        self.lanes.iter().map(|lane| lane.items.len()).sum()
    }

    /// Virtual-space `[left, right)` an item occupies, at least the minimum width.
    pub fn item_span(&self, mapper: &CoordinateMapper, item: &TimedItem) -> (f64, f64) {
        let left = mapper.time_to_pixel(item.start_time());
        let right = mapper.time_to_pixel(item.end_time());
        (left, right.max(left + self.min_item_width_px))
    }

    /// Item under virtual position `virtual_x` in the row containing `y`.
    /// Later items are drawn on top, so they win.
    pub fn item_at(&self, mapper: &CoordinateMapper, virtual_x: f64, y: f64) -> Option<&TimedItem> {
        if !y.is_finite() || y < 0.0 || !virtual_x.is_finite() {
            return None;
        }
        let row = (y / self.row_height_px).floor() as usize;
        self.lanes.get(row)?.items.iter().rev().find(|item| {
            let (left, right) = self.item_span(mapper, item);
            virtual_x >= left && virtual_x < right
        })
    }
}
