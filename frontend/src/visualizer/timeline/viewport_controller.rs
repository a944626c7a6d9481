//! Viewport control for the horizontally infinite timeline
//!
//! Owns the visible window and the virtual-space mapping behind it. The
//! window lives in wall-clock time and is unbounded; the scroll offset lives
//! in the bounded virtual space `[0, W)` and is kept away from its edges by
//! recentering, which rewrites the anchor without moving the visible window.
//!
//! Every change that moves the visible window is published once on
//! `view_range_changed_relay`. Recentering and intra-drag moves are silent.

use crate::dataflow::Relay;
use crate::error::ValidationError;
use crate::platform;
use futures::channel::mpsc::UnboundedReceiver;
use shared::ViewportSection;
use std::collections::VecDeque;

use super::time_domain::{
    CoordinateMapper, DurationMs, MsPerPixel, TimeMs, ViewRange, VirtualSpace,
};

// Used until the host reports the real viewport width
const FALLBACK_VIEWPORT_WIDTH: f64 = 1_000.0;

/// Faster panning multiplies the regular step.
const FAST_PAN_MULTIPLIER: f64 = 3.0;

/// Host scroll reports within this distance of a written offset are echoes.
const ECHO_TOLERANCE_PX: f64 = 0.5;

/// Written offsets whose echo has not arrived yet. Older ones are dropped.
const MAX_PENDING_ECHOES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSettings {
    pub min_duration: DurationMs,
    pub max_duration: DurationMs,
    pub initial_duration: DurationMs,
    pub virtual_space: VirtualSpace,
    /// Fraction of the viewport width kept between the scroll offset and
    /// either virtual edge.
    pub recenter_threshold: f64,
    pub zoom_step: f64,
    pub pan_fraction: f64,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        ViewportSettings::from(&ViewportSection::default())
    }
}

impl From<&ViewportSection> for ViewportSettings {
    fn from(section: &ViewportSection) -> Self {
        ViewportSettings {
            min_duration: DurationMs::from_hours(section.min_duration_hours),
            max_duration: DurationMs::from_hours(section.max_duration_hours),
            initial_duration: DurationMs::from_hours(section.initial_duration_hours),
            virtual_space: VirtualSpace::new(section.virtual_width),
            recenter_threshold: section.recenter_threshold,
            zoom_step: section.zoom_step,
            pan_fraction: section.pan_fraction,
        }
    }
}

impl ViewportSettings {
    pub fn clamp_duration(&self, duration: DurationMs) -> DurationMs {
        duration.clamp(self.min_duration, self.max_duration)
    }

    /// Duration after one zoom step by `factor`. A step that leaves less than
    /// another step of headroom settles on the bound it is heading for, so
    /// steps near the bounds are not exact multiples: at the defaults,
    /// 100 h zoomed out by 2 gives 336 h and 3 h zoomed in by 2 gives 1 h.
    pub fn zoom_duration(&self, current: DurationMs, factor: f64) -> DurationMs {
        let next = self.clamp_duration(current * factor);
        if factor > 1.0 && next * factor > self.max_duration {
            self.max_duration
        } else if factor < 1.0 && next * factor < self.min_duration {
            self.min_duration
        } else {
            next
        }
    }
}

/// Callback writing a scroll position into the host's scroll container.
pub type ScrollSink = Box<dyn FnMut(f64)>;

pub struct ViewportController {
    settings: ViewportSettings,
    view_duration: DurationMs,
    viewport_width: f64,
    width_reported: bool,
    /// Time at virtual position 0.
    anchor_time: TimeMs,
    /// Virtual position of the viewport's left edge.
    scroll_offset: f64,
    /// Bumped whenever the offset↔time relation changes under a drag.
    epoch: u64,
    /// Offsets we wrote ourselves; their scroll echoes must not count as user input.
    pending_echoes: VecDeque<f64>,
    /// Last offset the host is known to show, either reported or written.
    host_offset: Option<f64>,
    scroll_sink: Option<ScrollSink>,
    view_range_changed_relay: Relay<ViewRange>,
}

impl std::fmt::Debug for ViewportController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewportController")
            .field("view", &self.view_range())
            .field("viewport_width", &self.viewport_width)
            .field("scroll_offset", &self.scroll_offset)
            .field("anchor_time", &self.anchor_time)
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl ViewportController {
    /// Creates a controller showing `initial`, with its duration clamped to
    /// the configured bounds about the range center.
    pub fn new(settings: ViewportSettings, initial: ViewRange) -> Self {
        let view_duration = settings.clamp_duration(initial.duration());
        let view_start = initial.center().sub_duration(view_duration * 0.5);
        let scroll_offset = settings.virtual_space.midpoint();
        let ms_per_pixel = MsPerPixel::for_span(view_duration, FALLBACK_VIEWPORT_WIDTH);

        ViewportController {
            settings,
            view_duration,
            viewport_width: FALLBACK_VIEWPORT_WIDTH,
            width_reported: false,
            anchor_time: CoordinateMapper::anchored_at(view_start, scroll_offset, ms_per_pixel)
                .anchor_time,
            scroll_offset,
            epoch: 0,
            pending_echoes: VecDeque::new(),
            host_offset: None,
            scroll_sink: None,
            view_range_changed_relay: Relay::default(),
        }
    }

    /// Controller centered on the current wall-clock time.
    pub fn centered_on_now(settings: ViewportSettings) -> Self {
        let duration = settings.clamp_duration(settings.initial_duration);
        let start = platform::now().sub_duration(duration * 0.5);
        ViewportController::new(settings, ViewRange::from_start(start, duration))
    }

    pub fn settings(&self) -> &ViewportSettings {
        &self.settings
    }

    pub fn view_range_changed_relay(&self) -> &Relay<ViewRange> {
        &self.view_range_changed_relay
    }

    pub fn subscribe(&self) -> UnboundedReceiver<ViewRange> {
        self.view_range_changed_relay.subscribe()
    }

    /// Installs the host scroll writer and brings the host to the current offset.
    pub fn set_scroll_sink(&mut self, sink: ScrollSink) {
        self.scroll_sink = Some(sink);
        self.host_offset = None;
        self.pending_echoes.clear();
        self.sync_scroll();
    }

    // ===== STATE ACCESS =====

    pub fn ms_per_pixel(&self) -> MsPerPixel {
        MsPerPixel::for_span(self.view_duration, self.viewport_width)
    }

    pub fn mapper(&self) -> CoordinateMapper {
        CoordinateMapper::new(self.anchor_time, self.ms_per_pixel())
    }

    pub fn view_start(&self) -> TimeMs {
        self.mapper().pixel_to_time(self.scroll_offset)
    }

    pub fn view_duration(&self) -> DurationMs {
        self.view_duration
    }

    pub fn view_range(&self) -> ViewRange {
        ViewRange::from_start(self.view_start(), self.view_duration)
    }

    pub fn viewport_width(&self) -> f64 {
        self.viewport_width
    }

    pub fn scroll_offset(&self) -> f64 {
        self.scroll_offset
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Wall-clock time under a viewport-relative x coordinate.
    pub fn time_at_viewport_x(&self, x: f64) -> TimeMs {
        self.mapper().pixel_to_time(self.scroll_offset + x)
    }

    // ===== HOST INPUT =====

    /// Applies a new viewport width. The visible window keeps its position and
    /// duration; only the resolution changes. The first valid width counts
    /// as the initial load and is published.
    pub fn set_viewport_width(&mut self, width_px: f64) {
        if !width_px.is_finite() || width_px <= 0.0 {
            log::debug!("Ignoring invalid viewport width {width_px}");
            return;
        }
        let first_report = !self.width_reported;
        self.width_reported = true;
        if width_px == self.viewport_width && !first_report {
            return;
        }

        let view_start = self.view_start();
        self.viewport_width = width_px;
        self.rebase_anchor(view_start);
        self.epoch += 1;

        if first_report {
            self.emit_current();
        }
        self.maybe_recenter();
    }

    /// Scroll position reported by the host. Echoes of our own writes are
    /// swallowed; genuine user scrolling moves the window and is published.
    pub fn on_scroll(&mut self, offset: f64) -> bool {
        if !offset.is_finite() {
            return false;
        }
        if let Some(index) = self
            .pending_echoes
            .iter()
            .position(|written| (written - offset).abs() < ECHO_TOLERANCE_PX)
        {
            // Echoes arrive in write order; anything older was coalesced away.
            self.pending_echoes.drain(..=index);
            return false;
        }
        self.host_offset = Some(offset);
        if offset == self.scroll_offset {
            return false;
        }
        self.scroll_offset = offset;
        self.emit_current();
        self.maybe_recenter();
        true
    }

    // ===== NAVIGATION =====

    /// Shifts the window by `delta_ms` (positive moves later in time).
    pub fn pan(&mut self, delta_ms: DurationMs) {
        if !delta_ms.0.is_finite() || delta_ms.0 == 0.0 {
            return;
        }
        self.scroll_offset += delta_ms.0 / self.ms_per_pixel().0;
        self.emit_current();
        self.maybe_recenter();
        self.sync_scroll();
    }

    pub fn pan_left(&mut self, faster: bool) {
        self.pan(self.pan_step(faster) * -1.0);
    }

    pub fn pan_right(&mut self, faster: bool) {
        self.pan(self.pan_step(faster));
    }

    fn pan_step(&self, faster: bool) -> DurationMs {
        let step = self.view_duration * self.settings.pan_fraction;
        if faster { step * FAST_PAN_MULTIPLIER } else { step }
    }

    /// Multiplies the view duration by `factor`, keeping the time under the
    /// viewport-relative `focal_px` fixed. Returns whether anything changed.
    pub fn zoom_about(&mut self, focal_px: f64, factor: f64) -> bool {
        if !factor.is_finite() || factor <= 0.0 || !focal_px.is_finite() {
            log::debug!("Ignoring zoom with factor {factor} at {focal_px}px");
            return false;
        }
        let focal_px = focal_px.clamp(0.0, self.viewport_width);
        let focal_time = self.time_at_viewport_x(focal_px);

        let new_duration = self.settings.zoom_duration(self.view_duration, factor);
        if new_duration == self.view_duration {
            return false;
        }

        self.view_duration = new_duration;
        let new_start = focal_time.sub_duration(DurationMs(focal_px * self.ms_per_pixel().0));
        self.rebase_anchor(new_start);
        self.epoch += 1;

        log::debug!("Zoomed to {} ({})", new_duration, self.ms_per_pixel());
        self.emit_current();
        self.maybe_recenter();
        true
    }

    pub fn zoom_in(&mut self) -> bool {
        self.zoom_about(self.viewport_width / 2.0, 1.0 / self.settings.zoom_step)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.zoom_about(self.viewport_width / 2.0, self.settings.zoom_step)
    }

    pub fn center_on_time(&mut self, time: TimeMs) {
        if !time.0.is_finite() {
            return;
        }
        self.place_window(time.sub_duration(self.view_duration * 0.5));
        self.emit_current();
    }

    pub fn jump_to_now(&mut self) {
        self.center_on_time(platform::now());
    }

    /// Shows `range`, clamping its duration about its center.
    pub fn set_view_range(&mut self, range: ViewRange) -> ViewRange {
        self.view_duration = self.settings.clamp_duration(range.duration());
        self.place_window(range.center().sub_duration(self.view_duration * 0.5));
        self.emit_current();
        self.view_range()
    }

    /// Parses and applies user-entered RFC3339 bounds. On error nothing changes.
    pub fn set_view_range_from_input(
        &mut self,
        start: &str,
        end: &str,
    ) -> Result<ViewRange, ValidationError> {
        let range = ViewRange::parse(start, end)?;
        Ok(self.set_view_range(range))
    }

    // ===== DRAGGING =====

    /// Repositions the window so it starts `delta_px` pixels before
    /// `start_view_start`. Not published; the drag end publishes once.
    pub fn drag_to(&mut self, start_view_start: TimeMs, delta_px: f64) -> ViewRange {
        if delta_px.is_finite() {
            let mspp = self.ms_per_pixel();
            let target_start = start_view_start.sub_duration(DurationMs(delta_px * mspp.0));
            self.scroll_offset = self.mapper().time_to_pixel(target_start);
            self.maybe_recenter();
            self.sync_scroll();
        }
        self.view_range()
    }

    /// Publishes the current window.
    pub fn emit_current(&self) {
        self.view_range_changed_relay.send(self.view_range());
    }

    // ===== RECENTERING =====

    pub fn needs_recenter(&self) -> bool {
        let margin = self.settings.recenter_threshold * self.viewport_width;
        let width = self.settings.virtual_space.width;
        self.scroll_offset < margin || self.scroll_offset + self.viewport_width > width - margin
    }

    fn maybe_recenter(&mut self) {
        if self.needs_recenter() {
            self.recenter();
        }
    }

    /// Moves the scroll offset back to the virtual midpoint and re-derives the
    /// anchor so the visible window stays exactly where it was. Silent.
    pub fn recenter(&mut self) {
        let view_start = self.view_start();
        let midpoint = self.settings.virtual_space.midpoint();
        self.anchor_time =
            CoordinateMapper::anchored_at(view_start, midpoint, self.ms_per_pixel()).anchor_time;
        self.scroll_offset = midpoint;
        self.epoch += 1;
        log::debug!("Recentered virtual space at {view_start}");
        self.sync_scroll();
    }

    fn place_window(&mut self, view_start: TimeMs) {
        self.rebase_anchor(view_start);
        self.recenter();
    }

    /// Re-derives the anchor so the current scroll offset maps to `view_start`.
    fn rebase_anchor(&mut self, view_start: TimeMs) {
        self.anchor_time =
            CoordinateMapper::anchored_at(view_start, self.scroll_offset, self.ms_per_pixel())
                .anchor_time;
    }

    /// Writes the final offset of an operation to the host, once. Callers
    /// settle recentering first so intermediate offsets never reach the host.
    fn sync_scroll(&mut self) {
        let Some(sink) = self.scroll_sink.as_mut() else {
            return;
        };
        if self.host_offset == Some(self.scroll_offset) {
            return;
        }
        if self.pending_echoes.len() == MAX_PENDING_ECHOES {
            self.pending_echoes.pop_front();
        }
        self.pending_echoes.push_back(self.scroll_offset);
        self.host_offset = Some(self.scroll_offset);
        sink(self.scroll_offset);
    }
}
