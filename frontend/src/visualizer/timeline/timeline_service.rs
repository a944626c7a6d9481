//! Timeline service
//!
//! Single owner of the engine state: the viewport controller, the gesture
//! handler and one fetch coordinator per data source. Host events go in
//! through the methods below; view-range-changed, per-source fetch events
//! and rebuilt lanes come out through relays.

use crate::connection::{CredentialGate, DataSource};
use crate::dataflow::Relay;
use crate::error::ValidationError;
use crate::items::{SourceTag, TimedItem};
use crate::platform;
use crate::visualizer::interaction::gesture::{
    ActivationSink, GestureHandler, GestureOutcome, GestureSettings, PointerCapture, PointerId,
};
use futures::StreamExt;
use futures::channel::mpsc::UnboundedReceiver;
use futures::stream::select_all;
use indexmap::IndexMap;
use shared::TimelineConfig;
use std::cell::RefCell;
use std::rc::Rc;

use super::fetch_coordinator::{FetchCoordinator, FetchEvent, FetchSettings, FetchStatus};
use super::lanes::{LaneLayout, LaneSettings, build_lanes};
use super::markers::{Marker, generate_markers};
use super::time_domain::{CoordinateMapper, DurationMs, TimeMs, ViewRange};
use super::viewport_controller::{ScrollSink, ViewportController, ViewportSettings};

/// Host hooks the engine calls back into.
pub struct TimelineHost {
    pub credential: Rc<dyn CredentialGate>,
    pub pointer_capture: Rc<RefCell<dyn PointerCapture>>,
    pub activation: Box<dyn ActivationSink>,
}

pub struct TimelineService {
    controller: ViewportController,
    gestures: GestureHandler,
    coordinators: Vec<FetchCoordinator>,
    lanes: Rc<RefCell<Rc<LaneLayout>>>,
    lanes_rebuilt_relay: Relay<Rc<LaneLayout>>,
}

impl TimelineService {
    /// Builds the engine centered on now. Data sources are queried in the
    /// given order and their lanes follow the same order. Must be called
    /// inside the local executor.
    pub fn new(
        config: &TimelineConfig,
        sources: Vec<Rc<dyn DataSource>>,
        host: TimelineHost,
    ) -> Self {
        let controller = ViewportController::centered_on_now(ViewportSettings::from(&config.viewport));
        TimelineService::with_controller(config, controller, sources, host)
    }

    pub fn with_controller(
        config: &TimelineConfig,
        controller: ViewportController,
        sources: Vec<Rc<dyn DataSource>>,
        host: TimelineHost,
    ) -> Self {
        let fetch_settings = FetchSettings::from(&config.fetch);
        let coordinators: Vec<FetchCoordinator> = sources
            .into_iter()
            .map(|source| {
                FetchCoordinator::spawn(
                    source,
                    Rc::clone(&host.credential),
                    fetch_settings,
                    controller.subscribe(),
                )
            })
            .collect();

        let lane_settings = LaneSettings::from(&config.lanes);
        let lanes = Rc::new(RefCell::new(Rc::new(build_lanes(
            std::iter::empty(),
            &lane_settings,
        ))));
        let lanes_rebuilt_relay = Relay::default();
        platform::spawn_local(rebuild_lanes(
            coordinators.iter().map(FetchCoordinator::source_tag).collect(),
            select_all(coordinators.iter().map(FetchCoordinator::subscribe)),
            lane_settings,
            Rc::clone(&lanes),
            lanes_rebuilt_relay.clone(),
        ));

        let gestures = GestureHandler::new(
            GestureSettings::from(&config.gesture),
            host.pointer_capture,
            host.activation,
        );

        TimelineService {
            controller,
            gestures,
            coordinators,
            lanes,
            lanes_rebuilt_relay,
        }
    }

    // ===== SUBSCRIPTIONS =====

    pub fn view_range_changed(&self) -> UnboundedReceiver<ViewRange> {
        self.controller.subscribe()
    }

    pub fn lanes_rebuilt(&self) -> UnboundedReceiver<Rc<LaneLayout>> {
        self.lanes_rebuilt_relay.subscribe()
    }

    pub fn fetch_events(&self) -> impl futures::Stream<Item = FetchEvent> + Unpin + use<> {
        select_all(self.coordinators.iter().map(FetchCoordinator::subscribe))
    }

    // ===== SNAPSHOTS =====

    pub fn controller(&self) -> &ViewportController {
        &self.controller
    }

    pub fn view_range(&self) -> ViewRange {
        self.controller.view_range()
    }

    pub fn mapper(&self) -> CoordinateMapper {
        self.controller.mapper()
    }

    pub fn lanes(&self) -> Rc<LaneLayout> {
        Rc::clone(&self.lanes.borrow())
    }

    /// Gridlines for the current view. Computed on demand because a silent
    /// recenter changes positions without a view-range notification.
    pub fn markers(&self) -> Vec<Marker> {
        generate_markers(
            self.controller.view_range(),
            &self.controller.mapper(),
            self.controller.settings().virtual_space,
        )
    }

    pub fn statuses(&self) -> Vec<(SourceTag, FetchStatus)> {
        self.coordinators
            .iter()
            .map(|coordinator| (coordinator.source_tag(), coordinator.status()))
            .collect()
    }

    /// No source is waiting on its debounce or a response.
    pub fn is_settled(&self) -> bool {
        self.coordinators.iter().all(|coordinator| {
            !matches!(coordinator.status(), FetchStatus::Pending | FetchStatus::Loading)
        })
    }

    pub fn items(&self) -> Vec<TimedItem> {
        self.coordinators
            .iter()
            .flat_map(|coordinator| coordinator.items().iter().cloned().collect::<Vec<_>>())
            .collect()
    }

    // ===== HOST INPUT =====

    pub fn set_scroll_sink(&mut self, sink: ScrollSink) {
        self.controller.set_scroll_sink(sink);
    }

    pub fn set_viewport_width(&mut self, width_px: f64) {
        self.controller.set_viewport_width(width_px);
    }

    pub fn on_scroll(&mut self, offset: f64) -> bool {
        self.controller.on_scroll(offset)
    }

    pub fn pointer_down(&mut self, pointer_id: PointerId, client_x: f64) -> GestureOutcome {
        self.gestures.pointer_down(&self.controller, pointer_id, client_x)
    }

    pub fn pointer_move(&mut self, pointer_id: PointerId, client_x: f64) -> GestureOutcome {
        self.gestures.pointer_move(&mut self.controller, pointer_id, client_x)
    }

    pub fn pointer_up(&mut self, pointer_id: PointerId, client_x: f64, y: f64) -> GestureOutcome {
        let lanes = self.lanes();
        self.gestures
            .pointer_up(&self.controller, &*lanes, pointer_id, client_x, y)
    }

    pub fn pointer_cancel(&mut self, pointer_id: PointerId) -> GestureOutcome {
        self.gestures.pointer_cancel(&self.controller, pointer_id)
    }

    pub fn wheel(&mut self, focal_x: f64, delta_y: f64) -> bool {
        self.gestures.wheel(&mut self.controller, focal_x, delta_y)
    }

    // ===== NAVIGATION =====

    pub fn pan(&mut self, delta: DurationMs) {
        self.controller.pan(delta);
    }

    pub fn pan_left(&mut self, faster: bool) {
        self.controller.pan_left(faster);
    }

    pub fn pan_right(&mut self, faster: bool) {
        self.controller.pan_right(faster);
    }

    pub fn zoom_about(&mut self, focal_px: f64, factor: f64) -> bool {
        self.controller.zoom_about(focal_px, factor)
    }

    pub fn zoom_in(&mut self) -> bool {
        self.controller.zoom_in()
    }

    pub fn zoom_out(&mut self) -> bool {
        self.controller.zoom_out()
    }

    pub fn center_on_time(&mut self, time: TimeMs) {
        self.controller.center_on_time(time);
    }

    pub fn jump_to_now(&mut self) {
        self.controller.jump_to_now();
    }

    pub fn set_view_range(&mut self, range: ViewRange) -> ViewRange {
        self.controller.set_view_range(range)
    }

    pub fn set_view_range_from_input(
        &mut self,
        start: &str,
        end: &str,
    ) -> Result<ViewRange, ValidationError> {
        self.controller.set_view_range_from_input(start, end)
    }

    // ===== DATA =====

    pub fn refresh(&self, force: bool) {
        self.coordinators.iter().for_each(|coordinator| coordinator.refresh(force));
    }

    pub fn retry(&self) {
        self.coordinators.iter().for_each(FetchCoordinator::retry);
    }

    pub fn credentials_changed(&self) {
        self.coordinators
            .iter()
            .for_each(FetchCoordinator::credentials_changed);
    }
}

/// Rebuilds lanes whenever any source replaces its item set.
async fn rebuild_lanes(
    source_order: Vec<SourceTag>,
    mut fetch_events: impl futures::Stream<Item = FetchEvent> + Unpin,
    settings: LaneSettings,
    lanes: Rc<RefCell<Rc<LaneLayout>>>,
    lanes_rebuilt_relay: Relay<Rc<LaneLayout>>,
) {
    let mut item_sets: IndexMap<SourceTag, Rc<Vec<TimedItem>>> = source_order
        .into_iter()
        .map(|source| (source, Rc::new(Vec::new())))
        .collect();

    while let Some(event) = fetch_events.next().await {
        let FetchEvent::ItemsChanged { source, items } = event else {
            continue;
        };
        item_sets.insert(source, items);
        let layout = Rc::new(build_lanes(
            item_sets.values().flat_map(|items| items.iter()),
            &settings,
        ));
        log::debug!(
            "Rebuilt {} lanes with {} items",
            layout.lanes.len(),
            layout.item_count()
        );
        *lanes.borrow_mut() = Rc::clone(&layout);
        lanes_rebuilt_relay.send(layout);
    }
}
