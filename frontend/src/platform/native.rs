//! Native platform implementation on top of tokio.
//!
//! `spawn_local` requires the caller to run inside a `tokio::task::LocalSet`.

use crate::visualizer::timeline::time_domain::TimeMs;
use futures::future::{FutureExt, LocalBoxFuture};
use std::future::Future;
use std::time::Duration;

pub fn now() -> TimeMs {
    TimeMs::from_datetime(chrono::Utc::now())
}

pub fn sleep(duration: Duration) -> LocalBoxFuture<'static, ()> {
    tokio::time::sleep(duration).boxed_local()
}

pub fn spawn_local<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    tokio::task::spawn_local(future);
}
