//! Pointer gesture state machine for the timeline surface
//!
//! `Idle → ArmedDown → Dragging → Idle`. A press only becomes a drag once
//! the pointer travels the threshold; releasing before that is a tap, which
//! activates the item under the pointer. Dragging repositions the view from
//! the values captured at drag start, never from incremental deltas, and
//! publishes the view range once when the drag ends.

use crate::items::TimedItem;
use crate::visualizer::timeline::lanes::LaneLayout;
use crate::visualizer::timeline::time_domain::{TimeMs, ViewRange};
use crate::visualizer::timeline::viewport_controller::ViewportController;
use shared::GestureSection;
use std::cell::RefCell;
use std::rc::Rc;

pub type PointerId = i32;

/// Host facility routing all events of one pointer to the timeline surface.
pub trait PointerCapture {
    fn capture(&mut self, pointer_id: PointerId);
    fn release(&mut self, pointer_id: PointerId);
}

/// For hosts that route pointer events without an explicit capture.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPointerCapture;

impl PointerCapture for NoPointerCapture {
    fn capture(&mut self, _pointer_id: PointerId) {}

    fn release(&mut self, _pointer_id: PointerId) {}
}

/// Receives items confirmed by a tap.
pub trait ActivationSink {
    fn on_item_activated(&mut self, item: &TimedItem);
}

impl<F> ActivationSink for F
where
    F: FnMut(&TimedItem),
{
    fn on_item_activated(&mut self, item: &TimedItem) {
        self(item)
    }
}

/// Finds the item under a viewport-relative point.
pub trait HitTest {
    fn item_at(&self, controller: &ViewportController, x: f64, y: f64) -> Option<TimedItem>;
}

impl HitTest for LaneLayout {
    fn item_at(&self, controller: &ViewportController, x: f64, y: f64) -> Option<TimedItem> {
        LaneLayout::item_at(self, &controller.mapper(), controller.scroll_offset() + x, y).cloned()
    }
}

/// Captured pointer, released when the session ends for any reason.
pub struct PointerSession {
    pointer_id: PointerId,
    capture: Rc<RefCell<dyn PointerCapture>>,
}

impl PointerSession {
    fn begin(pointer_id: PointerId, capture: Rc<RefCell<dyn PointerCapture>>) -> Self {
        capture.borrow_mut().capture(pointer_id);
        PointerSession {
            pointer_id,
            capture,
        }
    }
}

impl Drop for PointerSession {
    fn drop(&mut self) {
        if let Ok(mut capture) = self.capture.try_borrow_mut() {
            capture.release(self.pointer_id);
        }
    }
}

pub struct DragSession {
    pub pointer_id: PointerId,
    pub start_client_x: f64,
    pub start_view_start_time: TimeMs,
    pub start_scroll_offset: f64,
    pub dragging: bool,
    pub moved: bool,
    /// Controller epoch the start values were captured under.
    epoch: u64,
    last_client_x: f64,
    _pointer: PointerSession,
}

impl DragSession {
    fn rebase(&mut self, controller: &ViewportController) {
        self.start_client_x = self.last_client_x;
        self.start_view_start_time = controller.view_start();
        self.start_scroll_offset = controller.scroll_offset();
        self.epoch = controller.epoch();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureState {
    Idle,
    ArmedDown,
    Dragging,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GestureOutcome {
    /// Event belonged to another pointer or no gesture.
    Ignored,
    Armed,
    /// Hover positioning only.
    Hover(TimeMs),
    /// View moved by a drag; default handling such as text selection must be suppressed.
    Panned(ViewRange),
    DragEnded(ViewRange),
    Tapped(Option<TimedItem>),
    Cancelled,
}

impl GestureOutcome {
    pub fn suppress_default(&self) -> bool {
        matches!(self, GestureOutcome::Panned(_) | GestureOutcome::DragEnded(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureSettings {
    pub drag_threshold_px: f64,
    pub wheel_zoom_factor: f64,
}

impl Default for GestureSettings {
    fn default() -> Self {
        GestureSettings::from(&GestureSection::default())
    }
}

impl From<&GestureSection> for GestureSettings {
    fn from(section: &GestureSection) -> Self {
        GestureSettings {
            drag_threshold_px: section.drag_threshold_px,
            wheel_zoom_factor: section.wheel_zoom_factor,
        }
    }
}

pub struct GestureHandler {
    settings: GestureSettings,
    capture: Rc<RefCell<dyn PointerCapture>>,
    activation: Box<dyn ActivationSink>,
    session: Option<DragSession>,
}

impl GestureHandler {
    pub fn new(
        settings: GestureSettings,
        capture: Rc<RefCell<dyn PointerCapture>>,
        activation: Box<dyn ActivationSink>,
    ) -> Self {
        GestureHandler {
            settings,
            capture,
            activation,
            session: None,
        }
    }

    pub fn state(&self) -> GestureState {
        match &self.session {
            None => GestureState::Idle,
            Some(session) if session.dragging => GestureState::Dragging,
            Some(_) => GestureState::ArmedDown,
        }
    }

    pub fn session(&self) -> Option<&DragSession> {
        self.session.as_ref()
    }

    pub fn pointer_down(
        &mut self,
        controller: &ViewportController,
        pointer_id: PointerId,
        client_x: f64,
    ) -> GestureOutcome {
        if self.session.is_some() || !client_x.is_finite() {
            return GestureOutcome::Ignored;
        }
        self.session = Some(DragSession {
            pointer_id,
            start_client_x: client_x,
            start_view_start_time: controller.view_start(),
            start_scroll_offset: controller.scroll_offset(),
            dragging: false,
            moved: false,
            epoch: controller.epoch(),
            last_client_x: client_x,
            _pointer: PointerSession::begin(pointer_id, Rc::clone(&self.capture)),
        });
        GestureOutcome::Armed
    }

    pub fn pointer_move(
        &mut self,
        controller: &mut ViewportController,
        pointer_id: PointerId,
        client_x: f64,
    ) -> GestureOutcome {
        if !client_x.is_finite() {
            return GestureOutcome::Ignored;
        }
        let threshold = self.settings.drag_threshold_px;
        let Some(session) = self.session.as_mut() else {
            return GestureOutcome::Hover(controller.time_at_viewport_x(client_x));
        };
        if session.pointer_id != pointer_id {
            return GestureOutcome::Ignored;
        }

        if !session.dragging {
            if (client_x - session.start_client_x).abs() < threshold {
                session.last_client_x = client_x;
                return GestureOutcome::Hover(controller.time_at_viewport_x(client_x));
            }
            session.dragging = true;
        }

        // Zoom or resize under the drag invalidates the captured start values.
        if session.epoch != controller.epoch() {
            session.rebase(controller);
        }
        session.moved = true;
        session.last_client_x = client_x;
        let range = controller.drag_to(
            session.start_view_start_time,
            client_x - session.start_client_x,
        );
        session.epoch = controller.epoch();
        GestureOutcome::Panned(range)
    }

    /// Ends the gesture. A drag publishes the final view range once; a tap
    /// activates the item under the pointer, if any.
    pub fn pointer_up(
        &mut self,
        controller: &ViewportController,
        hit_test: &dyn HitTest,
        pointer_id: PointerId,
        client_x: f64,
        y: f64,
    ) -> GestureOutcome {
        let Some(session) = self.take_session(pointer_id) else {
            return GestureOutcome::Ignored;
        };
        if session.moved {
            drop(session);
            controller.emit_current();
            return GestureOutcome::DragEnded(controller.view_range());
        }
        drop(session);

        let item = hit_test.item_at(controller, client_x, y);
        if let Some(item) = &item {
            log::debug!("Activating {} {}", item.source_tag().as_str(), item.id());
            self.activation.on_item_activated(item);
        }
        GestureOutcome::Tapped(item)
    }

    /// Aborts the gesture without activation. A drag that already moved the
    /// view still publishes its final range.
    pub fn pointer_cancel(
        &mut self,
        controller: &ViewportController,
        pointer_id: PointerId,
    ) -> GestureOutcome {
        match self.take_session(pointer_id) {
            Some(session) if session.moved => {
                drop(session);
                controller.emit_current();
                GestureOutcome::DragEnded(controller.view_range())
            }
            Some(_) => GestureOutcome::Cancelled,
            None => GestureOutcome::Ignored,
        }
    }

    /// Wheel zoom about the pointer. Scrolling down zooms out.
    pub fn wheel(&self, controller: &mut ViewportController, focal_x: f64, delta_y: f64) -> bool {
        let factor = self.settings.wheel_zoom_factor;
        if delta_y > 0.0 {
            controller.zoom_about(focal_x, factor)
        } else if delta_y < 0.0 {
            controller.zoom_about(focal_x, 1.0 / factor)
        } else {
            false
        }
    }

    fn take_session(&mut self, pointer_id: PointerId) -> Option<DragSession> {
        match &self.session {
            Some(session) if session.pointer_id == pointer_id => self.session.take(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::fixtures::schedule;
    use crate::visualizer::timeline::lanes::{LaneSettings, build_lanes};
    use crate::visualizer::timeline::time_domain::DurationMs;
    use crate::visualizer::timeline::viewport_controller::tests::{controller_with, drain};

    #[derive(Default)]
    struct RecordingCapture {
        captured: Vec<PointerId>,
        released: Vec<PointerId>,
    }

    impl PointerCapture for RecordingCapture {
        fn capture(&mut self, pointer_id: PointerId) {
            self.captured.push(pointer_id);
        }

        fn release(&mut self, pointer_id: PointerId) {
            self.released.push(pointer_id);
        }
    }

    struct Fixture {
        controller: ViewportController,
        handler: GestureHandler,
        capture: Rc<RefCell<RecordingCapture>>,
        activated: Rc<RefCell<Vec<String>>>,
        layout: LaneLayout,
    }

    /// One hour across 1200 px (3 s/px) with a schedule covering the whole view.
    fn fixture() -> Fixture {
        let controller = controller_with(1.0, 1200.0);
        let capture = Rc::new(RefCell::new(RecordingCapture::default()));
        let activated = Rc::new(RefCell::new(Vec::new()));
        let handler = GestureHandler::new(
            GestureSettings::default(),
            capture.clone(),
            Box::new({
                let activated = Rc::clone(&activated);
                move |item: &TimedItem| activated.borrow_mut().push(item.id().into_owned())
            }),
        );
        let items = vec![schedule("s1", "2024-12-31T23:00:00Z", "2025-01-01T02:00:00Z")];
        Fixture {
            controller,
            handler,
            capture,
            activated,
            layout: build_lanes(&items, &LaneSettings::default()),
        }
    }

    #[test]
    fn drag_past_threshold_emits_once_without_activation() {
        let mut f = fixture();
        let mut events = f.controller.subscribe();
        let start = f.controller.view_start();

        assert_eq!(f.handler.pointer_down(&f.controller, 1, 100.0), GestureOutcome::Armed);
        let outcome = f.handler.pointer_move(&mut f.controller, 1, 96.0);
        assert!(outcome.suppress_default());
        assert_eq!(f.handler.state(), GestureState::Dragging);
        assert!(drain(&mut events).is_empty());

        let outcome = f.handler.pointer_up(&f.controller, &f.layout, 1, 96.0, 10.0);

        assert!(matches!(outcome, GestureOutcome::DragEnded(_)));
        assert_eq!(drain(&mut events).len(), 1);
        assert!(f.activated.borrow().is_empty());
        let moved_by = f.controller.view_start().duration_since(start);
        assert!((moved_by.0 - 4.0 * 3_000.0).abs() < 1.0);
        assert_eq!(f.handler.state(), GestureState::Idle);
    }

    #[test]
    fn small_movement_is_hover_then_tap() {
        let mut f = fixture();
        let mut events = f.controller.subscribe();

        f.handler.pointer_down(&f.controller, 1, 100.0);
        let outcome = f.handler.pointer_move(&mut f.controller, 1, 98.0);
        assert!(matches!(outcome, GestureOutcome::Hover(_)));
        assert_eq!(f.handler.state(), GestureState::ArmedDown);

        let outcome = f.handler.pointer_up(&f.controller, &f.layout, 1, 98.0, 10.0);

        assert!(matches!(outcome, GestureOutcome::Tapped(Some(_))));
        assert_eq!(*f.activated.borrow(), vec!["s1".to_string()]);
        assert!(drain(&mut events).is_empty());
    }

    #[test]
    fn tap_on_empty_row_activates_nothing() {
        let mut f = fixture();
        f.handler.pointer_down(&f.controller, 1, 100.0);
        let outcome = f.handler.pointer_up(&f.controller, &f.layout, 1, 100.0, 200.0);
        assert_eq!(outcome, GestureOutcome::Tapped(None));
        assert!(f.activated.borrow().is_empty());
    }

    #[test]
    fn drag_positions_from_start_reference() {
        let mut f = fixture();
        let start = f.controller.view_start();
        f.handler.pointer_down(&f.controller, 1, 500.0);
        for x in [520.0, 560.0, 530.0] {
            f.handler.pointer_move(&mut f.controller, 1, x);
        }
        // Net displacement is 30 px to the right, i.e. 90 s earlier.
        let moved_by = start.duration_since(f.controller.view_start());
        assert!((moved_by.0 - 90_000.0).abs() < 1.0);
    }

    #[test]
    fn second_pointer_is_ignored_until_release() {
        let mut f = fixture();
        f.handler.pointer_down(&f.controller, 1, 100.0);
        assert_eq!(f.handler.pointer_down(&f.controller, 2, 300.0), GestureOutcome::Ignored);
        assert_eq!(f.handler.pointer_move(&mut f.controller, 2, 400.0), GestureOutcome::Ignored);
        assert_eq!(
            f.handler.pointer_up(&f.controller, &f.layout, 2, 400.0, 10.0),
            GestureOutcome::Ignored
        );
        assert_eq!(f.handler.session().map(|session| session.pointer_id), Some(1));

        f.handler.pointer_up(&f.controller, &f.layout, 1, 100.0, 10.0);
        assert_eq!(f.handler.pointer_down(&f.controller, 2, 300.0), GestureOutcome::Armed);
    }

    #[test]
    fn pointer_capture_is_released_on_every_exit() {
        let mut f = fixture();

        f.handler.pointer_down(&f.controller, 1, 100.0);
        f.handler.pointer_up(&f.controller, &f.layout, 1, 100.0, 10.0);

        f.handler.pointer_down(&f.controller, 2, 100.0);
        assert_eq!(f.handler.pointer_cancel(&f.controller, 2), GestureOutcome::Cancelled);

        f.handler.pointer_down(&f.controller, 3, 100.0);
        drop(f.handler);

        let capture = f.capture.borrow();
        assert_eq!(capture.captured, vec![1, 2, 3]);
        assert_eq!(capture.released, vec![1, 2, 3]);
    }

    #[test]
    fn cancelled_drag_still_publishes_final_range() {
        let mut f = fixture();
        let mut events = f.controller.subscribe();
        f.handler.pointer_down(&f.controller, 1, 100.0);
        f.handler.pointer_move(&mut f.controller, 1, 150.0);
        assert!(matches!(
            f.handler.pointer_cancel(&f.controller, 1),
            GestureOutcome::DragEnded(_)
        ));
        assert_eq!(drain(&mut events).len(), 1);
        assert!(f.activated.borrow().is_empty());
    }

    #[test]
    fn zoom_during_drag_rebases_reference() {
        let mut f = fixture();
        f.handler.pointer_down(&f.controller, 1, 100.0);
        f.handler.pointer_move(&mut f.controller, 1, 110.0);
        assert!(f.handler.wheel(&mut f.controller, 600.0, 1.0));
        let before = f.controller.view_start();
        let mspp = f.controller.ms_per_pixel().0;

        f.handler.pointer_move(&mut f.controller, 1, 115.0);

        let moved_by = before.duration_since(f.controller.view_start());
        assert!((moved_by.0 - 5.0 * mspp).abs() < 1.0);
    }

    #[test]
    fn wheel_direction_selects_zoom() {
        let mut f = fixture();
        let initial = f.controller.view_duration();
        assert!(f.handler.wheel(&mut f.controller, 600.0, 120.0));
        assert!(f.controller.view_duration() > initial);
        assert!(!f.handler.wheel(&mut f.controller, 600.0, 0.0));
        f.handler.wheel(&mut f.controller, 600.0, -120.0);
        assert!(f.controller.view_duration() >= DurationMs::from_hours(1.0));
    }
}
