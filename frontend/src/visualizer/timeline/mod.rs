//! Timeline domain entry point.
//!
//! Exposes the time domain, the viewport controller, marker and lane
//! builders, the per-source fetch coordinator and the service tying them
//! together.

pub mod fetch_coordinator;
pub mod lanes;
pub mod markers;
pub mod time_domain;
pub mod timeline_service;
pub mod viewport_controller;

pub use fetch_coordinator::{FetchCoordinator, FetchEvent, FetchStatus};
pub use lanes::{Lane, LaneLayout};
pub use markers::Marker;
pub use time_domain::{CoordinateMapper, DurationMs, MsPerPixel, TimeMs, ViewRange, VirtualSpace};
pub use timeline_service::{TimelineHost, TimelineService};
pub use viewport_controller::{ViewportController, ViewportSettings};
