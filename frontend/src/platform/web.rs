//! Browser platform implementation using gloo timers and the JS clock.

use crate::visualizer::timeline::time_domain::TimeMs;
use futures::future::{FutureExt, LocalBoxFuture};
use std::future::Future;
use std::time::Duration;

pub fn now() -> TimeMs {
    TimeMs(js_sys::Date::now())
}

pub fn sleep(duration: Duration) -> LocalBoxFuture<'static, ()> {
    gloo_timers::future::sleep(duration).boxed_local()
}

pub fn spawn_local<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}
