//! Platform abstraction layer
//!
//! Provides the clock, timers and local task spawning used by the engine,
//! selected at compile time for native hosts or the browser.

#[cfg(not(target_arch = "wasm32"))]
pub mod native;
#[cfg(not(target_arch = "wasm32"))]
pub use native::{now, sleep, spawn_local};

#[cfg(target_arch = "wasm32")]
pub mod web;
#[cfg(target_arch = "wasm32")]
pub use web::{now, sleep, spawn_local};
