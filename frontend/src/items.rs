//! Heterogeneous timeline items
//!
//! Wraps the wire records from `shared` behind one enum so lanes, hit
//! testing and activation handle every kind uniformly.

use crate::visualizer::timeline::time_domain::TimeMs;
use shared::{EventRecord, Pass, ScheduleEntry};
use std::borrow::Cow;

/// Which data source produced an item. Ids are unique only within a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceTag {
    Schedule,
    Pass,
    Event,
}

impl SourceTag {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceTag::Schedule => "schedule",
            SourceTag::Pass => "pass",
            SourceTag::Event => "event",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimedItem {
    Schedule(ScheduleEntry),
    Pass(Pass),
    Event(EventRecord),
}

impl TimedItem {
    pub fn id(&self) -> Cow<'_, str> {
        match self {
            TimedItem::Schedule(entry) => Cow::Borrowed(&entry.id),
            // Predictions carry no id; satellite plus AOS is unique per source.
            TimedItem::Pass(pass) => {
                Cow::Owned(format!("{}-{}", pass.norad_id, pass.aos.timestamp_millis()))
            }
            TimedItem::Event(event) => Cow::Borrowed(&event.id),
        }
    }

    pub fn start_time(&self) -> TimeMs {
        match self {
            TimedItem::Schedule(entry) => TimeMs::from_datetime(entry.start),
            TimedItem::Pass(pass) => TimeMs::from_datetime(pass.aos),
            TimedItem::Event(event) => TimeMs::from_datetime(event.start),
        }
    }

    pub fn end_time(&self) -> TimeMs {
        match self {
            TimedItem::Schedule(entry) => TimeMs::from_datetime(entry.end),
            TimedItem::Pass(pass) => TimeMs::from_datetime(pass.los),
            TimedItem::Event(event) => TimeMs::from_datetime(event.end),
        }
    }

    pub fn label(&self) -> Cow<'_, str> {
        match self {
            TimedItem::Schedule(entry) => Cow::Borrowed(&entry.id),
            TimedItem::Pass(pass) => Cow::Owned(format!(
                "{} ({:.0}°)",
                pass.satellite, pass.max_elevation_deg
            )),
            TimedItem::Event(event) => {
                Cow::Borrowed(event.title.as_deref().unwrap_or(&event.id))
            }
        }
    }

    pub fn source_tag(&self) -> SourceTag {
        match self {
            TimedItem::Schedule(_) => SourceTag::Schedule,
            TimedItem::Pass(_) => SourceTag::Pass,
            TimedItem::Event(_) => SourceTag::Event,
        }
    }

    pub fn status(&self) -> Option<&str> {
        match self {
            TimedItem::Schedule(entry) => Some(entry.state.as_str()),
            TimedItem::Pass(_) => None,
            TimedItem::Event(event) => event.status.as_deref(),
        }
    }
}

impl From<ScheduleEntry> for TimedItem {
    fn from(entry: ScheduleEntry) -> Self {
        TimedItem::Schedule(entry)
    }
}

impl From<Pass> for TimedItem {
    fn from(pass: Pass) -> Self {
        TimedItem::Pass(pass)
    }
}

impl From<EventRecord> for TimedItem {
    fn from(event: EventRecord) -> Self {
        TimedItem::Event(event)
    }
}
