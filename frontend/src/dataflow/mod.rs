//! Dataflow primitives shared by the timeline engine
//!
//! - **[`Relay`]** - fan-out event streaming over unbounded channels
//!
//! Relays carry the published notifications of the engine:
//! view-range-changed, fetch events and rebuilt lanes. State itself stays owned by
//! the component that mutates it.

pub mod relay;

pub use relay::{Relay, RelayError, relay};
