//! Screen edges and touch borders reserved by effects.
//!
//! Pointer edges sit on the one-pixel border of an output that has no neighbour on that side, and
//! corners on its outermost pixels. Touch borders are thin strips along an output edge where a
//! one-finger touchscreen swipe inwards drives the reserving effect.

use std::collections::HashMap;
use std::time::Duration;

use glaze_config::ScreenEdge;
use smithay::utils::{Logical, Point, Rectangle, Size};

use super::gestures::{
    GestureEvent, GestureEvents, GestureId, GestureRecognizer, SwipeDirection, SwipeGesture,
};
use crate::output::{Edge, OutputId, Outputs};

/// Time between the end of one activation and the next possible one.
const REACTIVATION_DELAY: Duration = Duration::from_millis(350);
/// Part of the reactivation delay already covered by the time needed to trigger an edge.
const TIME_THRESHOLD: Duration = Duration::from_millis(150);

/// Width of the strip along an edge where a touch swipe can start.
pub const TOUCH_TARGET: f64 = 8.;
/// Swipe distance needed to trigger a touch border, before dividing by the output scale.
const TOUCH_MINIMUM_DELTA: f64 = 44.;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeTrigger {
    /// Pointer reached a reserved edge.
    Activated,
    /// Touch swipe from a reserved border, progress in `[0, 1]`.
    TouchProgress(f64),
    TouchTriggered,
    TouchCancelled,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeEvent {
    pub owner: &'static str,
    pub edge: ScreenEdge,
    pub trigger: EdgeTrigger,
}

#[derive(Debug, Clone, PartialEq)]
struct PointerEdge {
    output: OutputId,
    edge: ScreenEdge,
    geometry: Rectangle<i32, Logical>,
}

#[derive(Debug, Clone)]
struct TouchBorder {
    owner: &'static str,
    edge: ScreenEdge,
}

#[derive(Debug, Clone, Copy)]
struct TouchTracking {
    id: i32,
    start: Point<f64, Logical>,
    last: Point<f64, Logical>,
}

pub struct ScreenEdges {
    reservations: Vec<(&'static str, ScreenEdge)>,
    touch_reservations: Vec<(&'static str, ScreenEdge)>,

    edges: Vec<PointerEdge>,
    hovered: Option<usize>,
    cooldown: Duration,
    last_activation: Option<Duration>,

    recognizer: GestureRecognizer,
    touch_borders: HashMap<GestureId, TouchBorder>,
    touch: Option<TouchTracking>,
    touch_border_distance: f64,
}

impl ScreenEdges {
    pub fn new(config: &glaze_config::Gestures) -> Self {
        Self {
            reservations: Vec::new(),
            touch_reservations: Vec::new(),
            edges: Vec::new(),
            hovered: None,
            cooldown: REACTIVATION_DELAY.saturating_sub(TIME_THRESHOLD),
            last_activation: None,
            recognizer: GestureRecognizer::new(),
            touch_borders: HashMap::new(),
            touch: None,
            touch_border_distance: config.touch_border_distance,
        }
    }

    pub fn reconfigure(&mut self, config: &glaze_config::Gestures) {
        self.touch_border_distance = config.touch_border_distance;
    }

    pub fn reserve(&mut self, owner: &'static str, edge: ScreenEdge) {
        if !self.reservations.contains(&(owner, edge)) {
            debug!("{owner} reserved screen edge {edge:?}");
            self.reservations.push((owner, edge));
        }
    }

    pub fn reserve_touch(&mut self, owner: &'static str, edge: ScreenEdge) {
        if !edge.is_straight() {
            warn!("{owner}: touch borders must be straight edges, ignoring {edge:?}");
            return;
        }

        if !self.touch_reservations.contains(&(owner, edge)) {
            debug!("{owner} reserved touch border {edge:?}");
            self.touch_reservations.push((owner, edge));
        }
    }

    /// Releases every edge and touch border held by `owner`.
    ///
    /// Needs a [`ScreenEdges::recompute`] afterwards to drop touch borders already registered.
    pub fn unreserve_all(&mut self, owner: &'static str) {
        self.reservations.retain(|(o, _)| *o != owner);
        self.touch_reservations.retain(|(o, _)| *o != owner);
    }

    pub fn is_reserved(&self, edge: ScreenEdge) -> bool {
        self.reservations.iter().any(|(_, e)| *e == edge)
    }

    pub fn is_touch_reserved(&self, edge: ScreenEdge) -> bool {
        self.touch_reservations.iter().any(|(_, e)| *e == edge)
    }

    /// Rebuilds edge geometry after outputs or reservations change.
    ///
    /// Returns cancellation events for touch swipes that were in flight.
    pub fn recompute(&mut self, outputs: &Outputs) -> Vec<EdgeEvent> {
        let _span = tracy_client::span!("ScreenEdges::recompute");

        self.edges.clear();
        self.hovered = None;

        for output in outputs.iter().filter(|o| !o.is_placeholder()) {
            let free = |edge| outputs.neighbour(output.id(), edge).is_none();
            let (left, right, top, bottom) =
                (free(Edge::Left), free(Edge::Right), free(Edge::Top), free(Edge::Bottom));

            let g = output.geometry();
            let (x0, y0) = (g.loc.x, g.loc.y);
            let (x1, y1) = (x0 + g.size.w - 1, y0 + g.size.h - 1);
            let line = |x: i32, y: i32, w: i32, h: i32| -> Rectangle<i32, Logical> {
                Rectangle::new(Point::from((x, y)), Size::from((w, h)))
            };

            let candidates = [
                (ScreenEdge::TopLeft, top && left, line(x0, y0, 1, 1)),
                (ScreenEdge::TopRight, top && right, line(x1, y0, 1, 1)),
                (ScreenEdge::BottomLeft, bottom && left, line(x0, y1, 1, 1)),
                (ScreenEdge::BottomRight, bottom && right, line(x1, y1, 1, 1)),
                (ScreenEdge::Top, top, line(x0 + 1, y0, g.size.w - 2, 1)),
                (ScreenEdge::Bottom, bottom, line(x0 + 1, y1, g.size.w - 2, 1)),
                (ScreenEdge::Left, left, line(x0, y0 + 1, 1, g.size.h - 2)),
                (ScreenEdge::Right, right, line(x1, y0 + 1, 1, g.size.h - 2)),
            ];

            for (edge, exists, geometry) in candidates {
                if exists && geometry.size.w > 0 && geometry.size.h > 0 {
                    self.edges.push(PointerEdge {
                        output: output.id(),
                        edge,
                        geometry,
                    });
                }
            }
        }

        let mut events = Vec::new();
        for id in self.touch_borders.keys().copied().collect::<Vec<_>>() {
            let gesture_events = self.recognizer.unregister(id);
            self.forward_gesture_events(gesture_events, &mut events);
            self.touch_borders.remove(&id);
        }
        self.touch = None;

        for (owner, edge) in self.touch_reservations.clone() {
            for output in outputs.iter().filter(|o| !o.is_placeholder()) {
                let g = output.geometry().to_f64();
                let min = TOUCH_MINIMUM_DELTA / output.scale();
                let (direction, strip) = match edge {
                    ScreenEdge::Left => (
                        SwipeDirection::Right,
                        Rectangle::new(g.loc, (TOUCH_TARGET, g.size.h).into()),
                    ),
                    ScreenEdge::Right => (
                        SwipeDirection::Left,
                        Rectangle::new(
                            Point::from((g.loc.x + g.size.w - TOUCH_TARGET, g.loc.y)),
                            (TOUCH_TARGET, g.size.h).into(),
                        ),
                    ),
                    ScreenEdge::Top => (
                        SwipeDirection::Down,
                        Rectangle::new(g.loc, (g.size.w, TOUCH_TARGET).into()),
                    ),
                    ScreenEdge::Bottom => (
                        SwipeDirection::Up,
                        Rectangle::new(
                            Point::from((g.loc.x, g.loc.y + g.size.h - TOUCH_TARGET)),
                            (g.size.w, TOUCH_TARGET).into(),
                        ),
                    ),
                    _ => continue,
                };

                let gesture = SwipeGesture::new(direction)
                    .with_fingers(1)
                    .with_start_geometry(strip)
                    .with_minimum_delta(Point::from((min, min)));
                let id = self.recognizer.register_swipe(gesture);
                self.touch_borders.insert(id, TouchBorder { owner, edge });
            }
        }

        trace!(
            "{} pointer edges, {} touch borders",
            self.edges.len(),
            self.touch_borders.len()
        );

        events
    }

    pub fn edge_output(&self, edge: ScreenEdge) -> impl Iterator<Item = OutputId> + '_ {
        self.edges
            .iter()
            .filter(move |e| e.edge == edge)
            .map(|e| e.output)
    }

    /// Checks the pointer against the reserved edges.
    ///
    /// An edge activates when the pointer enters it and the previous activation is far enough in
    /// the past. Pointer motion is never consumed.
    pub fn pointer_moved(&mut self, pos: Point<f64, Logical>, now: Duration) -> Vec<EdgeEvent> {
        let pixel = Point::<i32, Logical>::from((pos.x.floor() as i32, pos.y.floor() as i32));
        let hovered = self.edges.iter().position(|e| {
            let g = e.geometry;
            g.loc.x <= pixel.x
                && pixel.x < g.loc.x + g.size.w
                && g.loc.y <= pixel.y
                && pixel.y < g.loc.y + g.size.h
        });

        let entered = hovered.is_some() && hovered != self.hovered;
        self.hovered = hovered;

        let Some(idx) = hovered.filter(|_| entered) else {
            return Vec::new();
        };

        let edge = self.edges[idx].edge;
        if !self.is_reserved(edge) {
            return Vec::new();
        }

        if let Some(last) = self.last_activation {
            if now.saturating_sub(last) < self.cooldown {
                trace!("screen edge {edge:?} still cooling down");
                return Vec::new();
            }
        }

        self.last_activation = Some(now);
        debug!("screen edge {edge:?} activated");

        self.reservations
            .iter()
            .filter(|(_, e)| *e == edge)
            .map(|(owner, edge)| EdgeEvent {
                owner,
                edge: *edge,
                trigger: EdgeTrigger::Activated,
            })
            .collect()
    }

    pub fn is_touch_active(&self) -> bool {
        self.touch.is_some()
    }

    /// Starts a touch swipe if `pos` lies on a reserved border. Returns whether it did.
    pub fn touch_down(&mut self, id: i32, pos: Point<f64, Logical>) -> bool {
        if self.touch.is_some() || self.touch_borders.is_empty() {
            return false;
        }

        let mut started = Vec::new();
        if self.recognizer.start_swipe(1, Some(pos), &mut started) == 0 {
            self.recognizer.cancel_swipe();
            return false;
        }

        self.touch = Some(TouchTracking {
            id,
            start: pos,
            last: pos,
        });
        true
    }

    /// Continues a touch swipe. Returns `None` when the touch point is not ours.
    pub fn touch_motion(&mut self, id: i32, pos: Point<f64, Logical>) -> Option<Vec<EdgeEvent>> {
        let touch = self.touch.as_mut().filter(|t| t.id == id)?;
        let delta = pos - touch.last;
        touch.last = pos;

        let mut events = Vec::new();
        let gesture_events = self.recognizer.update_swipe(delta);
        self.forward_gesture_events(gesture_events, &mut events);
        Some(events)
    }

    pub fn touch_up(&mut self, id: i32) -> Option<Vec<EdgeEvent>> {
        self.touch.filter(|t| t.id == id)?;

        let mut events = Vec::new();
        let gesture_events = self.recognizer.end_swipe();
        self.forward_gesture_events(gesture_events, &mut events);
        self.touch = None;
        Some(events)
    }

    pub fn touch_cancel(&mut self) -> Vec<EdgeEvent> {
        let mut events = Vec::new();
        if self.touch.take().is_some() {
            let gesture_events = self.recognizer.cancel_swipe();
            self.forward_gesture_events(gesture_events, &mut events);
        }
        events
    }

    fn touch_progress(&self, edge: ScreenEdge) -> f64 {
        let Some(touch) = self.touch else {
            return 0.;
        };

        let delta = touch.last - touch.start;
        let moved = match edge {
            ScreenEdge::Left | ScreenEdge::Right => delta.x.abs(),
            _ => delta.y.abs(),
        };

        (moved / self.touch_border_distance).min(1.)
    }

    fn forward_gesture_events(&self, gesture_events: GestureEvents, out: &mut Vec<EdgeEvent>) {
        for (id, event) in gesture_events {
            let Some(border) = self.touch_borders.get(&id) else {
                continue;
            };

            let trigger = match event {
                GestureEvent::Started => continue,
                GestureEvent::Progress(_) => {
                    EdgeTrigger::TouchProgress(self.touch_progress(border.edge))
                }
                GestureEvent::Triggered => EdgeTrigger::TouchTriggered,
                GestureEvent::Cancelled => EdgeTrigger::TouchCancelled,
            };

            out.push(EdgeEvent {
                owner: border.owner,
                edge: border.edge,
                trigger,
            });
        }
    }
}
