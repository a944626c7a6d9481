//! View-driven range cache and fetch coordination
//!
//! One coordinator actor per data source. It watches view-range-changed,
//! skips views already covered by the loaded window, debounces the rest and
//! requests a padded window around the view. Every issued request captures
//! the request token; a response is applied only while its token is still
//! the latest one, so overlapping requests resolve to the last issued.

use crate::connection::{CredentialGate, DataSource};
use crate::dataflow::Relay;
use crate::error::FetchError;
use crate::items::{SourceTag, TimedItem};
use crate::platform;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use futures::future::{Fuse, FutureExt, LocalBoxFuture};
use futures::stream::FuturesUnordered;
use futures::{StreamExt, select};
use shared::FetchSection;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use super::time_domain::{DurationMs, ViewRange};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BufferPolicy {
    /// Pad each side by `multiple / 2` view durations.
    Multiple(f64),
    /// Pad each side by a fixed duration.
    Fixed(DurationMs),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchSettings {
    pub debounce: Duration,
    pub buffer: BufferPolicy,
}

impl Default for FetchSettings {
    fn default() -> Self {
        FetchSettings::from(&FetchSection::default())
    }
}

impl From<&FetchSection> for FetchSettings {
    fn from(section: &FetchSection) -> Self {
        FetchSettings {
            debounce: Duration::from_millis(section.debounce_ms),
            buffer: match section.buffer_fixed_hours {
                Some(hours) => BufferPolicy::Fixed(DurationMs::from_hours(hours)),
                None => BufferPolicy::Multiple(section.buffer_multiple),
            },
        }
    }
}

/// Window requested for `view`: the view padded on both sides.
pub fn padded_window(view: ViewRange, buffer: BufferPolicy) -> ViewRange {
    let padding = match buffer {
        BufferPolicy::Multiple(multiple) => view.duration() * (multiple / 2.0),
        BufferPolicy::Fixed(padding) => padding,
    };
    let padding = if padding.0.is_finite() && padding.0 > 0.0 {
        padding
    } else {
        DurationMs::ZERO
    };
    ViewRange {
        start: view.start.sub_duration(padding),
        end: view.end.add_duration(padding),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchStatus {
    Idle,
    /// Waiting for the debounce to settle.
    Pending,
    Loading,
    Loaded,
    /// Recoverable; previous items stay visible.
    Failed(String),
    Unauthenticated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchCommand {
    ViewChanged(ViewRange),
    Refresh { force: bool },
    CredentialsChanged,
    /// Forced refresh of the last view.
    Retry,
}

#[derive(Debug, Clone)]
pub enum FetchEvent {
    ItemsChanged {
        source: SourceTag,
        items: Rc<Vec<TimedItem>>,
    },
    StatusChanged {
        source: SourceTag,
        status: FetchStatus,
    },
}

#[derive(Debug)]
pub struct FetchState {
    pub items: Rc<Vec<TimedItem>>,
    pub loaded_range: Option<ViewRange>,
    pub token: u64,
    pub status: FetchStatus,
    pub last_view: Option<ViewRange>,
    /// Token of the request still awaiting its response.
    in_flight: Option<u64>,
}

impl Default for FetchState {
    fn default() -> Self {
        FetchState {
            items: Rc::new(Vec::new()),
            loaded_range: None,
            token: 0,
            status: FetchStatus::Idle,
            last_view: None,
            in_flight: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingRequest {
    view: ViewRange,
    force: bool,
}

type FetchResult = (u64, ViewRange, Result<Vec<TimedItem>, FetchError>);

/// Handle to a running coordinator actor.
#[derive(Clone)]
pub struct FetchCoordinator {
    source: SourceTag,
    state: Rc<RefCell<FetchState>>,
    command_sender: UnboundedSender<FetchCommand>,
    fetch_event_relay: Relay<FetchEvent>,
}

impl FetchCoordinator {
    /// Spawns the actor on the local executor. It runs until both the view
    /// stream and every handle are gone.
    pub fn spawn(
        source: Rc<dyn DataSource>,
        gate: Rc<dyn CredentialGate>,
        settings: FetchSettings,
        view_range_changed: UnboundedReceiver<ViewRange>,
    ) -> Self {
        let (command_sender, commands) = unbounded();
        let state = Rc::new(RefCell::new(FetchState::default()));
        let fetch_event_relay = Relay::default();
        let source_tag = source.source_tag();

        let actor = CoordinatorActor {
            source,
            gate,
            settings,
            state: Rc::clone(&state),
            fetch_event_relay: fetch_event_relay.clone(),
            pending: None,
        };
        platform::spawn_local(actor.run(view_range_changed, commands));

        FetchCoordinator {
            source: source_tag,
            state,
            command_sender,
            fetch_event_relay,
        }
    }

    pub fn source_tag(&self) -> SourceTag {
        self.source
    }

    pub fn subscribe(&self) -> UnboundedReceiver<FetchEvent> {
        self.fetch_event_relay.subscribe()
    }

    pub fn send(&self, command: FetchCommand) {
        if self.command_sender.unbounded_send(command).is_err() {
            log::warn!("{} coordinator is no longer running", self.source.as_str());
        }
    }

    pub fn refresh(&self, force: bool) {
        self.send(FetchCommand::Refresh { force });
    }

    pub fn retry(&self) {
        self.send(FetchCommand::Retry);
    }

    pub fn credentials_changed(&self) {
        self.send(FetchCommand::CredentialsChanged);
    }

    pub fn items(&self) -> Rc<Vec<TimedItem>> {
        Rc::clone(&self.state.borrow().items)
    }

    pub fn loaded_range(&self) -> Option<ViewRange> {
        self.state.borrow().loaded_range
    }

    pub fn status(&self) -> FetchStatus {
        self.state.borrow().status.clone()
    }

    pub fn token(&self) -> u64 {
        self.state.borrow().token
    }
}

struct CoordinatorActor {
    source: Rc<dyn DataSource>,
    gate: Rc<dyn CredentialGate>,
    settings: FetchSettings,
    state: Rc<RefCell<FetchState>>,
    fetch_event_relay: Relay<FetchEvent>,
    pending: Option<PendingRequest>,
}

impl CoordinatorActor {
    async fn run(
        mut self,
        mut view_range_changed: UnboundedReceiver<ViewRange>,
        mut commands: UnboundedReceiver<FetchCommand>,
    ) {
        let mut debounce: Fuse<LocalBoxFuture<'static, ()>> = Fuse::terminated();
        let mut in_flight: FuturesUnordered<LocalBoxFuture<'static, FetchResult>> =
            FuturesUnordered::new();

        loop {
            select! {
                view = view_range_changed.next() => {
                    if let Some(view) = view {
                        self.request(view, false, &mut debounce);
                    }
                }
                command = commands.next() => {
                    if let Some(command) = command {
                        self.handle_command(command, &mut debounce);
                    }
                }
                () = debounce => {
                    if let Some(fetch) = self.issue() {
                        in_flight.push(fetch);
                    }
                }
                (token, window, result) = in_flight.select_next_some() => {
                    self.apply(token, window, result);
                }
                complete => break,
            }
        }
        log::debug!("{} coordinator stopped", self.source.source_tag().as_str());
    }

    fn handle_command(
        &mut self,
        command: FetchCommand,
        debounce: &mut Fuse<LocalBoxFuture<'static, ()>>,
    ) {
        let last_view = self.state.borrow().last_view;
        match command {
            FetchCommand::ViewChanged(view) => self.request(view, false, debounce),
            FetchCommand::Refresh { force } => {
                if let Some(view) = last_view {
                    self.request(view, force, debounce);
                }
            }
            FetchCommand::Retry => {
                if let Some(view) = last_view {
                    self.request(view, true, debounce);
                }
            }
            FetchCommand::CredentialsChanged => match last_view {
                Some(view) => self.request(view, false, debounce),
                None if !self.gate.has_credential() => self.clear_unauthenticated(debounce),
                None => {}
            },
        }
    }

    /// Decides between cache hit and (re)arming the debounce.
    fn request(
        &mut self,
        view: ViewRange,
        force: bool,
        debounce: &mut Fuse<LocalBoxFuture<'static, ()>>,
    ) {
        self.state.borrow_mut().last_view = Some(view);

        if !self.gate.has_credential() {
            self.clear_unauthenticated(debounce);
            return;
        }

        let covered = self
            .state
            .borrow()
            .loaded_range
            .is_some_and(|loaded| loaded.covers(view));
        let force = force || self.pending.is_some_and(|pending| pending.force);
        if covered && !force {
            self.cache_hit(view, debounce);
            return;
        }

        self.pending = Some(PendingRequest { view, force });
        *debounce = platform::sleep(self.settings.debounce).fuse();
        self.set_status(FetchStatus::Pending);
    }

    fn cache_hit(&mut self, view: ViewRange, debounce: &mut Fuse<LocalBoxFuture<'static, ()>>) {
        log::debug!("{} cache hit for {view}", self.source.source_tag().as_str());
        self.pending = None;
        *debounce = Fuse::terminated();

        // An outstanding request for another window must not replace data
        // that already covers the view.
        let superseded = {
            let mut state = self.state.borrow_mut();
            match state.in_flight.take() {
                Some(token) if token == state.token => {
                    state.token += 1;
                    true
                }
                _ => false,
            }
        };
        let status = self.state.borrow().status.clone();
        if superseded || status == FetchStatus::Pending {
            self.set_status(FetchStatus::Loaded);
        }
    }

    /// Debounce fired: bump the token and start the request.
    fn issue(&mut self) -> Option<LocalBoxFuture<'static, FetchResult>> {
        let pending = self.pending.take()?;
        if !self.gate.has_credential() {
            let mut idle = Fuse::terminated();
            self.clear_unauthenticated(&mut idle);
            return None;
        }

        let window = padded_window(pending.view, self.settings.buffer);
        let token = {
            let mut state = self.state.borrow_mut();
            state.token += 1;
            state.in_flight = Some(state.token);
            state.token
        };
        log::info!(
            "Fetching {} for {window} (request {token})",
            self.source.source_tag().as_str()
        );
        self.set_status(FetchStatus::Loading);

        Some(
            self.source
                .fetch_items(window)
                .map(move |result| (token, window, result))
                .boxed_local(),
        )
    }

    fn apply(&mut self, token: u64, window: ViewRange, result: Result<Vec<TimedItem>, FetchError>) {
        let source = self.source.source_tag();
        {
            let mut state = self.state.borrow_mut();
            if token != state.token {
                log::debug!(
                    "Discarding stale {} response {token} (latest {})",
                    source.as_str(),
                    state.token
                );
                return;
            }
            state.in_flight = None;
        }

        match result {
            Ok(items) => {
                log::info!("Loaded {} {} items for {window}", items.len(), source.as_str());
                let items = Rc::new(items);
                {
                    let mut state = self.state.borrow_mut();
                    state.items = Rc::clone(&items);
                    state.loaded_range = Some(window);
                }
                self.fetch_event_relay
                    .send(FetchEvent::ItemsChanged { source, items });
                self.set_status(FetchStatus::Loaded);
            }
            Err(FetchError::Unauthorized) => {
                log::info!("{} request rejected as unauthorized", source.as_str());
                let mut idle = Fuse::terminated();
                self.clear_unauthenticated(&mut idle);
            }
            Err(error) => {
                log::warn!("Fetching {} failed: {error}", source.as_str());
                self.set_status(FetchStatus::Failed(error.to_string()));
            }
        }
    }

    /// Drops items and the loaded window and invalidates any outstanding request.
    fn clear_unauthenticated(&mut self, debounce: &mut Fuse<LocalBoxFuture<'static, ()>>) {
        self.pending = None;
        *debounce = Fuse::terminated();

        let had_items = {
            let mut state = self.state.borrow_mut();
            if state.in_flight.take().is_some() {
                state.token += 1;
            }
            state.loaded_range = None;
            let had_items = !state.items.is_empty();
            if had_items {
                state.items = Rc::new(Vec::new());
            }
            had_items
        };
        if had_items {
            self.fetch_event_relay.send(FetchEvent::ItemsChanged {
                source: self.source.source_tag(),
                items: Rc::new(Vec::new()),
            });
        }
        self.set_status(FetchStatus::Unauthenticated);
    }

    fn set_status(&mut self, status: FetchStatus) {
        {
            let mut state = self.state.borrow_mut();
            if state.status == status {
                return;
            }
            state.status = status.clone();
        }
        self.fetch_event_relay.send(FetchEvent::StatusChanged {
            source: self.source.source_tag(),
            status,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::StaticCredential;
    use crate::dataflow::relay;
    use crate::items::fixtures::schedule;
    use crate::visualizer::timeline::time_domain::TimeMs;
    use std::collections::VecDeque;
    use tokio::task::LocalSet;
    use tokio::time::sleep;

    const T: f64 = 1_735_689_600_000.0;
    const MINUTE: f64 = 60_000.0;
    const HOUR: f64 = 60.0 * MINUTE;

    fn range(start_minutes: f64, end_minutes: f64) -> ViewRange {
        ViewRange::new(
            TimeMs(T + start_minutes * MINUTE),
            TimeMs(T + end_minutes * MINUTE),
        )
        .unwrap()
    }

    /// Responds with queued results after a per-call delay.
    #[derive(Default)]
    struct ScriptedSource {
        requested: RefCell<Vec<ViewRange>>,
        script: RefCell<VecDeque<(Duration, Result<Vec<TimedItem>, FetchError>)>>,
    }

    impl ScriptedSource {
        fn respond(&self, delay_ms: u64, result: Result<Vec<TimedItem>, FetchError>) {
            self.script
                .borrow_mut()
                .push_back((Duration::from_millis(delay_ms), result));
        }

        fn requests(&self) -> Vec<ViewRange> {
            self.requested.borrow().clone()
        }
    }

    impl DataSource for ScriptedSource {
        fn source_tag(&self) -> SourceTag {
            SourceTag::Schedule
        }

        fn fetch_items(&self, window: ViewRange) -> LocalBoxFuture<'static, Result<Vec<TimedItem>, FetchError>> {
            self.requested.borrow_mut().push(window);
            let (delay, result) = self
                .script
                .borrow_mut()
                .pop_front()
                .unwrap_or((Duration::ZERO, Ok(Vec::new())));
            async move {
                sleep(delay).await;
                result
            }
            .boxed_local()
        }
    }

    fn one_item(id: &str) -> Vec<TimedItem> {
        vec![schedule(id, "2025-01-01T00:00:00Z", "2025-01-01T00:30:00Z")]
    }

    struct Harness {
        source: Rc<ScriptedSource>,
        credential: Rc<StaticCredential>,
        views: Relay<ViewRange>,
        coordinator: FetchCoordinator,
    }

    fn harness() -> Harness {
        let source = Rc::new(ScriptedSource::default());
        let credential = Rc::new(StaticCredential::new(true));
        let (views, view_stream) = relay::<ViewRange>();
        let coordinator = FetchCoordinator::spawn(
            source.clone(),
            credential.clone(),
            FetchSettings::default(),
            view_stream,
        );
        Harness {
            source,
            credential,
            views,
            coordinator,
        }
    }

    async fn settle(ms: u64) {
        sleep(Duration::from_millis(ms)).await;
    }

    #[test]
    fn padded_window_uses_half_multiple_each_side() {
        let view = range(0.0, 60.0);
        assert_eq!(padded_window(view, BufferPolicy::Multiple(2.0)), range(-60.0, 120.0));
        assert_eq!(
            padded_window(view, BufferPolicy::Fixed(DurationMs(30.0 * MINUTE))),
            range(-30.0, 90.0)
        );
        assert_eq!(padded_window(view, BufferPolicy::Multiple(0.0)), view);
    }

    #[tokio::test(start_paused = true)]
    async fn buffered_window_serves_nearby_views() {
        LocalSet::new()
            .run_until(async {
                let h = harness();
                h.source.respond(10, Ok(one_item("a")));

                h.views.send(range(0.0, 60.0));
                settle(300).await;
                assert_eq!(h.source.requests(), vec![range(-60.0, 120.0)]);
                assert_eq!(h.coordinator.loaded_range(), Some(range(-60.0, 120.0)));
                assert_eq!(h.coordinator.status(), FetchStatus::Loaded);

                h.views.send(range(10.0, 70.0));
                settle(300).await;
                assert_eq!(h.source.requests().len(), 1, "covered view must not fetch");
                assert_eq!(h.coordinator.items().len(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_collapses_bursts_to_trailing_view() {
        LocalSet::new()
            .run_until(async {
                let h = harness();
                for step in 0..5 {
                    h.views.send(range(step as f64 * 600.0, step as f64 * 600.0 + 60.0));
                    settle(50).await;
                }
                assert!(h.source.requests().is_empty());
                assert_eq!(h.coordinator.status(), FetchStatus::Pending);

                settle(250).await;
                assert_eq!(h.source.requests(), vec![range(2340.0, 2520.0)]);
                assert_eq!(h.coordinator.token(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn last_issued_request_wins() {
        LocalSet::new()
            .run_until(async {
                let h = harness();
                h.source.respond(1_000, Ok(one_item("slow")));
                h.source.respond(10, Ok(one_item("fast")));

                h.views.send(range(0.0, 60.0));
                settle(250).await;
                h.views.send(range(6000.0, 6060.0));
                settle(2_000).await;

                assert_eq!(h.source.requests().len(), 2);
                assert_eq!(h.coordinator.token(), 2);
                assert_eq!(h.coordinator.items()[0].id(), "fast");
                assert_eq!(h.coordinator.loaded_range(), Some(range(5940.0, 6120.0)));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn force_bypasses_cache_but_not_debounce() {
        LocalSet::new()
            .run_until(async {
                let h = harness();
                h.views.send(range(0.0, 60.0));
                settle(300).await;

                h.coordinator.refresh(false);
                settle(300).await;
                assert_eq!(h.source.requests().len(), 1);

                h.coordinator.refresh(true);
                settle(100).await;
                assert_eq!(h.source.requests().len(), 1, "still debouncing");
                settle(200).await;
                assert_eq!(h.source.requests().len(), 2);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_items_until_retry() {
        LocalSet::new()
            .run_until(async {
                let h = harness();
                h.source.respond(0, Ok(one_item("kept")));
                h.source.respond(0, Err(FetchError::Network("connection reset".into())));
                h.source.respond(0, Ok(one_item("fresh")));
                let mut events = h.coordinator.subscribe();

                h.views.send(range(0.0, 60.0));
                settle(300).await;
                h.coordinator.retry();
                settle(300).await;

                assert_eq!(h.coordinator.items()[0].id(), "kept");
                assert!(matches!(h.coordinator.status(), FetchStatus::Failed(_)));

                h.coordinator.retry();
                settle(300).await;
                assert_eq!(h.coordinator.items()[0].id(), "fresh");
                assert_eq!(h.coordinator.status(), FetchStatus::Loaded);

                let mut item_sets = 0;
                while let Some(Some(event)) = events.next().now_or_never() {
                    if matches!(event, FetchEvent::ItemsChanged { .. }) {
                        item_sets += 1;
                    }
                }
                assert_eq!(item_sets, 2);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn missing_credential_clears_without_network() {
        LocalSet::new()
            .run_until(async {
                let h = harness();
                h.views.send(range(0.0, 60.0));
                settle(300).await;
                assert_eq!(h.coordinator.items().len(), 0);
                assert!(h.coordinator.loaded_range().is_some());

                h.credential.set(false);
                h.coordinator.credentials_changed();
                settle(10).await;
                assert_eq!(h.coordinator.status(), FetchStatus::Unauthenticated);
                assert_eq!(h.coordinator.loaded_range(), None);

                h.views.send(range(600.0, 660.0));
                settle(300).await;
                assert_eq!(h.source.requests().len(), 1);

                h.credential.set(true);
                h.coordinator.credentials_changed();
                settle(300).await;
                assert_eq!(h.source.requests().len(), 2);
                assert_eq!(h.coordinator.status(), FetchStatus::Loaded);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_response_clears_items() {
        LocalSet::new()
            .run_until(async {
                let h = harness();
                h.source.respond(0, Ok(one_item("a")));
                h.source.respond(0, Err(FetchError::Unauthorized));

                h.views.send(range(0.0, 60.0));
                settle(300).await;
                assert_eq!(h.coordinator.items().len(), 1);

                h.coordinator.refresh(true);
                settle(300).await;
                assert!(h.coordinator.items().is_empty());
                assert_eq!(h.coordinator.loaded_range(), None);
                assert_eq!(h.coordinator.status(), FetchStatus::Unauthenticated);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn returning_to_covered_view_supersedes_outstanding_request() {
        LocalSet::new()
            .run_until(async {
                let h = harness();
                h.source.respond(0, Ok(one_item("home")));
                h.source.respond(1_000, Ok(one_item("away")));

                h.views.send(range(0.0, 60.0));
                settle(300).await;
                h.views.send(range(6000.0, 6060.0));
                settle(300).await;
                h.views.send(range(0.0, 60.0));
                settle(2_000).await;

                assert_eq!(h.source.requests().len(), 2);
                assert_eq!(h.coordinator.items()[0].id(), "home");
                assert_eq!(h.coordinator.loaded_range(), Some(range(-60.0, 120.0)));
                assert_eq!(h.coordinator.status(), FetchStatus::Loaded);
            })
            .await;
    }

    #[test]
    fn settings_follow_config() {
        let section = FetchSection {
            debounce_ms: 50,
            buffer_multiple: 4.0,
            buffer_fixed_hours: Some(2.0),
        };
        let settings = FetchSettings::from(&section);
        assert_eq!(settings.debounce, Duration::from_millis(50));
        assert_eq!(settings.buffer, BufferPolicy::Fixed(DurationMs(2.0 * HOUR)));
    }
}
