//! Interactive timeline engine for ground-station schedules, predicted
//! passes and generic events.
//!
//! The engine maps wall-clock time onto a bounded virtual scroll space,
//! turns pointer input into pan/zoom/tap gestures and keeps one fetch
//! coordinator per data source in sync with the visible window.

pub mod connection;
pub mod dataflow;
pub mod error;
pub mod items;
pub mod platform;
pub mod visualizer;

pub use connection::{
    CredentialGate, DataSource, EventSource, HttpResponse, HttpTransport, PassSource,
    ScheduleSource, StaticCredential,
};
pub use error::{FetchError, ValidationError};
pub use items::{SourceTag, TimedItem};
pub use visualizer::interaction::gesture::{
    ActivationSink, GestureOutcome, NoPointerCapture, PointerCapture, PointerId,
};
pub use visualizer::timeline::{
    FetchStatus, LaneLayout, Marker, TimelineHost, TimelineService, ViewRange,
};
