//! Recognition of touchpad and touchscreen swipes and pinches.
//!
//! Gestures are registered up front with their direction and finger count. While fingers move, the
//! recognizer narrows the set of active gestures down to the ones matching the movement and
//! reports [`GestureEvent`]s for each of them. The caller maps gesture ids back to whoever
//! registered them.

use smithay::utils::{Logical, Point, Rectangle};

use crate::utils::id::IdCounter;

static GESTURE_ID_COUNTER: IdCounter = IdCounter::new();

/// Accumulated movement needed before a swipe locks to an axis.
const AXIS_LOCK_THRESHOLD: f64 = 5.;

/// Scale change needed for a pinch to trigger when nothing else is configured.
pub const DEFAULT_MINIMUM_SCALE_DELTA: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GestureId(u32);

impl GestureId {
    fn next() -> Self {
        Self(GESTURE_ID_COUNTER.next())
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinchDirection {
    Expanding,
    Contracting,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEvent {
    Started,
    /// Progress towards the minimum delta, in `[0, 1]`.
    Progress(f64),
    Triggered,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwipeGesture {
    pub direction: SwipeDirection,
    pub min_fingers: Option<u32>,
    pub max_fingers: Option<u32>,
    /// Area the swipe has to start in, edges included.
    pub start_geometry: Option<Rectangle<f64, Logical>>,
    /// Movement needed to trigger. Only the component along the direction matters.
    pub minimum_delta: Option<Point<f64, Logical>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PinchGesture {
    pub direction: PinchDirection,
    pub min_fingers: Option<u32>,
    pub max_fingers: Option<u32>,
    pub minimum_scale_delta: f64,
}

impl SwipeGesture {
    pub fn new(direction: SwipeDirection) -> Self {
        Self {
            direction,
            min_fingers: None,
            max_fingers: None,
            start_geometry: None,
            minimum_delta: None,
        }
    }

    pub fn with_fingers(mut self, fingers: u32) -> Self {
        self.min_fingers = Some(fingers);
        self.max_fingers = Some(fingers);
        self
    }

    pub fn with_start_geometry(mut self, geometry: Rectangle<f64, Logical>) -> Self {
        self.start_geometry = Some(geometry);
        self
    }

    pub fn with_minimum_delta(mut self, delta: Point<f64, Logical>) -> Self {
        self.minimum_delta = Some(delta);
        self
    }

    fn accepts_fingers(&self, count: u32) -> bool {
        accepts_fingers(self.min_fingers, self.max_fingers, count)
    }

    fn accepts_start(&self, pos: Point<f64, Logical>) -> bool {
        let Some(geo) = self.start_geometry else {
            return true;
        };

        geo.loc.x <= pos.x
            && pos.x <= geo.loc.x + geo.size.w
            && geo.loc.y <= pos.y
            && pos.y <= geo.loc.y + geo.size.h
    }

    fn axis(&self) -> Axis {
        match self.direction {
            SwipeDirection::Up | SwipeDirection::Down => Axis::Vertical,
            SwipeDirection::Left | SwipeDirection::Right => Axis::Horizontal,
        }
    }

    pub fn minimum_delta_reached(&self, delta: Point<f64, Logical>) -> bool {
        let Some(min) = self.minimum_delta else {
            return true;
        };

        match self.direction {
            SwipeDirection::Up => delta.y <= -min.y,
            SwipeDirection::Down => delta.y >= min.y,
            SwipeDirection::Left => delta.x <= -min.x,
            SwipeDirection::Right => delta.x >= min.x,
        }
    }

    pub fn progress(&self, delta: Point<f64, Logical>) -> f64 {
        let Some(min) = self.minimum_delta else {
            return 1.;
        };

        let (moved, needed) = match self.axis() {
            Axis::Horizontal => (delta.x, min.x),
            Axis::Vertical => (delta.y, min.y),
        };

        if needed == 0. {
            return 1.;
        }

        (moved.abs() / needed.abs()).min(1.)
    }
}

impl PinchGesture {
    pub fn new(direction: PinchDirection) -> Self {
        Self {
            direction,
            min_fingers: None,
            max_fingers: None,
            minimum_scale_delta: DEFAULT_MINIMUM_SCALE_DELTA,
        }
    }

    pub fn with_fingers(mut self, fingers: u32) -> Self {
        self.min_fingers = Some(fingers);
        self.max_fingers = Some(fingers);
        self
    }

    fn accepts_fingers(&self, count: u32) -> bool {
        accepts_fingers(self.min_fingers, self.max_fingers, count)
    }

    pub fn minimum_scale_delta_reached(&self, scale: f64) -> bool {
        (scale - 1.).abs() >= self.minimum_scale_delta
    }

    pub fn progress(&self, scale: f64) -> f64 {
        if self.minimum_scale_delta <= 0. {
            return 1.;
        }

        ((scale - 1.).abs() / self.minimum_scale_delta).min(1.)
    }
}

fn accepts_fingers(min: Option<u32>, max: Option<u32>, count: u32) -> bool {
    min.map_or(true, |min| min <= count) && max.map_or(true, |max| count <= max)
}

/// Events produced by one call into the recognizer.
pub type GestureEvents = Vec<(GestureId, GestureEvent)>;

#[derive(Debug)]
pub struct GestureRecognizer {
    swipes: Vec<(GestureId, SwipeGesture)>,
    pinches: Vec<(GestureId, PinchGesture)>,

    active_swipes: Vec<GestureId>,
    active_pinches: Vec<GestureId>,

    finger_count: u32,
    swipe_in_progress: bool,
    swipe_start: Option<Point<f64, Logical>>,
    swipe_axis: Option<Axis>,
    current_delta: Point<f64, Logical>,

    pinch_in_progress: bool,
    current_scale: f64,
}

impl Default for GestureRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl GestureRecognizer {
    pub fn new() -> Self {
        Self {
            swipes: Vec::new(),
            pinches: Vec::new(),
            active_swipes: Vec::new(),
            active_pinches: Vec::new(),
            finger_count: 0,
            swipe_in_progress: false,
            swipe_start: None,
            swipe_axis: None,
            current_delta: Point::new(0., 0.),
            pinch_in_progress: false,
            current_scale: 1.,
        }
    }

    pub fn register_swipe(&mut self, gesture: SwipeGesture) -> GestureId {
        let id = GestureId::next();
        self.swipes.push((id, gesture));
        id
    }

    pub fn register_pinch(&mut self, gesture: PinchGesture) -> GestureId {
        let id = GestureId::next();
        self.pinches.push((id, gesture));
        id
    }

    /// Removes a gesture. An active gesture is cancelled first.
    pub fn unregister(&mut self, id: GestureId) -> GestureEvents {
        let mut events = Vec::new();

        if let Some(idx) = self.active_swipes.iter().position(|x| *x == id) {
            self.active_swipes.remove(idx);
            events.push((id, GestureEvent::Cancelled));
        }
        if let Some(idx) = self.active_pinches.iter().position(|x| *x == id) {
            self.active_pinches.remove(idx);
            events.push((id, GestureEvent::Cancelled));
        }

        self.swipes.retain(|(x, _)| *x != id);
        self.pinches.retain(|(x, _)| *x != id);

        events
    }

    pub fn swipe(&self, id: GestureId) -> Option<&SwipeGesture> {
        self.swipes.iter().find(|(x, _)| *x == id).map(|(_, g)| g)
    }

    pub fn pinch(&self, id: GestureId) -> Option<&PinchGesture> {
        self.pinches.iter().find(|(x, _)| *x == id).map(|(_, g)| g)
    }

    pub fn is_registered(&self, id: GestureId) -> bool {
        self.swipe(id).is_some() || self.pinch(id).is_some()
    }

    pub fn active_swipes(&self) -> &[GestureId] {
        &self.active_swipes
    }

    pub fn active_pinches(&self) -> &[GestureId] {
        &self.active_pinches
    }

    /// Starts a swipe, returning how many gestures became active.
    ///
    /// With a `start_pos`, gestures that have a start geometry only start when the position lies
    /// within it.
    pub fn start_swipe(
        &mut self,
        fingers: u32,
        start_pos: Option<Point<f64, Logical>>,
        events: &mut GestureEvents,
    ) -> usize {
        self.finger_count = fingers;
        self.swipe_in_progress = true;
        self.swipe_start = start_pos;

        if !self.active_swipes.is_empty() || !self.active_pinches.is_empty() {
            return 0;
        }

        let mut count = 0;
        for (id, gesture) in &self.swipes {
            if !gesture.accepts_fingers(fingers) {
                continue;
            }

            if let Some(pos) = start_pos {
                if !gesture.accepts_start(pos) {
                    continue;
                }
            } else if gesture.start_geometry.is_some() {
                continue;
            }

            if let Some(axis) = self.swipe_axis {
                if gesture.axis() != axis {
                    continue;
                }
            }

            self.active_swipes.push(*id);
            events.push((*id, GestureEvent::Started));
            count += 1;
        }

        count
    }

    pub fn update_swipe(&mut self, delta: Point<f64, Logical>) -> GestureEvents {
        let mut events = Vec::new();
        if !self.swipe_in_progress {
            return events;
        }

        self.current_delta += delta;

        if delta.x.abs() < 1. && delta.y.abs() < 1. {
            return events;
        }

        let total = self.current_delta;
        let direction = match self.swipe_axis {
            Some(Axis::Horizontal) => horizontal_direction(total.x),
            Some(Axis::Vertical) => vertical_direction(total.y),
            None => {
                if total.x.abs() == total.y.abs() {
                    // Diagonal movement matches nothing.
                    for id in self.active_swipes.drain(..) {
                        events.push((id, GestureEvent::Cancelled));
                    }
                    return events;
                }

                let axis = if total.x.abs() > total.y.abs() {
                    Axis::Horizontal
                } else {
                    Axis::Vertical
                };

                if total.x.abs() >= AXIS_LOCK_THRESHOLD || total.y.abs() >= AXIS_LOCK_THRESHOLD {
                    self.swipe_axis = Some(axis);
                }

                match axis {
                    Axis::Horizontal => horizontal_direction(total.x),
                    Axis::Vertical => vertical_direction(total.y),
                }
            }
        };

        // Gestures of the other direction may start once all current ones are gone.
        for _ in 0..2 {
            if self.active_swipes.is_empty() {
                self.start_swipe(self.finger_count, self.swipe_start, &mut events);
            }

            let swipes = &self.swipes;
            self.active_swipes.retain(|id| {
                let matches = swipes
                    .iter()
                    .any(|(x, g)| x == id && g.direction == direction);
                if !matches {
                    events.push((*id, GestureEvent::Cancelled));
                }
                matches
            });
        }

        for id in &self.active_swipes {
            let Some(gesture) = self.swipe(*id) else {
                continue;
            };
            if gesture.minimum_delta.is_some() {
                events.push((*id, GestureEvent::Progress(gesture.progress(total))));
            }
        }

        events
    }

    pub fn cancel_swipe(&mut self) -> GestureEvents {
        let events = self
            .active_swipes
            .drain(..)
            .map(|id| (id, GestureEvent::Cancelled))
            .collect();
        self.reset_swipe();
        events
    }

    pub fn end_swipe(&mut self) -> GestureEvents {
        let total = self.current_delta;
        let mut events = Vec::new();
        for id in std::mem::take(&mut self.active_swipes) {
            let reached = self
                .swipe(id)
                .is_some_and(|gesture| gesture.minimum_delta_reached(total));
            let event = if reached {
                GestureEvent::Triggered
            } else {
                GestureEvent::Cancelled
            };
            events.push((id, event));
        }
        self.reset_swipe();
        events
    }

    fn reset_swipe(&mut self) {
        self.swipe_in_progress = false;
        self.swipe_start = None;
        self.swipe_axis = None;
        self.current_delta = Point::new(0., 0.);
    }

    pub fn start_pinch(&mut self, fingers: u32, events: &mut GestureEvents) -> usize {
        self.finger_count = fingers;
        self.pinch_in_progress = true;
        self.current_scale = 1.;

        if !self.active_swipes.is_empty() || !self.active_pinches.is_empty() {
            return 0;
        }

        let mut count = 0;
        for (id, gesture) in &self.pinches {
            if !gesture.accepts_fingers(fingers) {
                continue;
            }

            self.active_pinches.push(*id);
            events.push((*id, GestureEvent::Started));
            count += 1;
        }

        count
    }

    /// Updates a pinch with the absolute scale since it began. Rotation does not matter.
    pub fn update_pinch(&mut self, scale: f64, _angle_delta: f64) -> GestureEvents {
        let mut events = Vec::new();
        if !self.pinch_in_progress {
            return events;
        }

        self.current_scale = scale;
        let direction = if scale < 1. {
            PinchDirection::Contracting
        } else {
            PinchDirection::Expanding
        };

        for _ in 0..2 {
            if self.active_pinches.is_empty() {
                let fingers = self.finger_count;
                self.start_pinch(fingers, &mut events);
                self.current_scale = scale;
            }

            let pinches = &self.pinches;
            self.active_pinches.retain(|id| {
                let matches = pinches
                    .iter()
                    .any(|(x, g)| x == id && g.direction == direction);
                if !matches {
                    events.push((*id, GestureEvent::Cancelled));
                }
                matches
            });
        }

        for id in &self.active_pinches {
            if let Some(gesture) = self.pinch(*id) {
                events.push((*id, GestureEvent::Progress(gesture.progress(scale))));
            }
        }

        events
    }

    pub fn cancel_pinch(&mut self) -> GestureEvents {
        let events = self
            .active_pinches
            .drain(..)
            .map(|id| (id, GestureEvent::Cancelled))
            .collect();
        self.pinch_in_progress = false;
        self.current_scale = 1.;
        events
    }

    pub fn end_pinch(&mut self) -> GestureEvents {
        let scale = self.current_scale;
        let mut events = Vec::new();
        for id in std::mem::take(&mut self.active_pinches) {
            let reached = self
                .pinch(id)
                .is_some_and(|gesture| gesture.minimum_scale_delta_reached(scale));
            let event = if reached {
                GestureEvent::Triggered
            } else {
                GestureEvent::Cancelled
            };
            events.push((id, event));
        }
        self.pinch_in_progress = false;
        self.current_scale = 1.;
        events
    }
}

fn horizontal_direction(dx: f64) -> SwipeDirection {
    if dx < 0. {
        SwipeDirection::Left
    } else {
        SwipeDirection::Right
    }
}

fn vertical_direction(dy: f64) -> SwipeDirection {
    if dy < 0. {
        SwipeDirection::Up
    } else {
        SwipeDirection::Down
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn pt(x: f64, y: f64) -> Point<f64, Logical> {
        Point::from((x, y))
    }

    fn count(events: &GestureEvents, id: GestureId, kind: GestureEvent) -> usize {
        events
            .iter()
            .filter(|(x, e)| {
                *x == id && std::mem::discriminant(e) == std::mem::discriminant(&kind)
            })
            .count()
    }

    #[test]
    fn minimum_delta() {
        let gesture = SwipeGesture::new(SwipeDirection::Down);
        assert!(gesture.minimum_delta_reached(pt(0., 0.)));

        let gesture = gesture.with_minimum_delta(pt(2., 3.));
        assert!(!gesture.minimum_delta_reached(pt(0., 0.)));
        assert!(gesture.minimum_delta_reached(pt(2., 3.)));

        let left = SwipeGesture::new(SwipeDirection::Left).with_minimum_delta(pt(30., 30.));
        assert!(left.minimum_delta_reached(pt(-30., 0.)));
        assert!(!left.minimum_delta_reached(pt(-29., 0.)));
        assert!(!left.minimum_delta_reached(pt(30., 0.)));
    }

    #[test]
    fn swipe_progress_and_trigger() {
        let mut recognizer = GestureRecognizer::new();
        let id = recognizer.register_swipe(
            SwipeGesture::new(SwipeDirection::Up).with_minimum_delta(pt(30., 30.)),
        );

        let mut events = Vec::new();
        assert_eq!(recognizer.start_swipe(1, None, &mut events), 1);
        assert_eq!(events, [(id, GestureEvent::Started)]);

        let events = recognizer.update_swipe(pt(0., -15.));
        assert_eq!(events, [(id, GestureEvent::Progress(0.5))]);

        let events = recognizer.end_swipe();
        assert_eq!(events, [(id, GestureEvent::Cancelled)]);

        let mut events = Vec::new();
        recognizer.start_swipe(1, None, &mut events);
        let events = recognizer.update_swipe(pt(0., -40.));
        assert_eq!(events, [(id, GestureEvent::Progress(1.))]);
        assert_eq!(recognizer.end_swipe(), [(id, GestureEvent::Triggered)]);
    }

    #[test]
    fn swipe_without_minimum_delta_triggers() {
        let mut recognizer = GestureRecognizer::new();
        let id = recognizer.register_swipe(SwipeGesture::new(SwipeDirection::Right));

        let mut events = Vec::new();
        recognizer.start_swipe(1, None, &mut events);
        let events = recognizer.update_swipe(pt(10., 1.));
        assert!(events.is_empty());
        assert_eq!(recognizer.end_swipe(), [(id, GestureEvent::Triggered)]);
    }

    #[test]
    fn wrong_directions_are_cancelled() {
        let mut recognizer = GestureRecognizer::new();
        let up = recognizer.register_swipe(SwipeGesture::new(SwipeDirection::Up).with_fingers(4));
        let down =
            recognizer.register_swipe(SwipeGesture::new(SwipeDirection::Down).with_fingers(4));
        let left =
            recognizer.register_swipe(SwipeGesture::new(SwipeDirection::Left).with_fingers(4));
        let right =
            recognizer.register_swipe(SwipeGesture::new(SwipeDirection::Right).with_fingers(4));

        let mut events = Vec::new();
        assert_eq!(recognizer.start_swipe(4, None, &mut events), 4);

        let events = recognizer.update_swipe(pt(1., 20.));
        assert_eq!(count(&events, up, GestureEvent::Cancelled), 1);
        assert_eq!(count(&events, left, GestureEvent::Cancelled), 1);
        assert_eq!(count(&events, right, GestureEvent::Cancelled), 1);
        assert_eq!(count(&events, down, GestureEvent::Cancelled), 0);
        assert_eq!(recognizer.active_swipes(), [down]);

        // The vertical axis is locked, sideways jitter does not matter.
        let events = recognizer.update_swipe(pt(-12., 2.));
        assert!(events.is_empty());
        assert_eq!(recognizer.end_swipe(), [(down, GestureEvent::Triggered)]);
    }

    #[test]
    fn diagonal_cancels() {
        let mut recognizer = GestureRecognizer::new();
        let id = recognizer.register_swipe(SwipeGesture::new(SwipeDirection::Down));

        let mut events = Vec::new();
        recognizer.start_swipe(1, None, &mut events);
        assert_eq!(
            recognizer.update_swipe(pt(1., 1.)),
            [(id, GestureEvent::Cancelled)]
        );
        assert!(recognizer.end_swipe().is_empty());
    }

    #[test]
    fn sub_pixel_movement_accumulates() {
        let mut recognizer = GestureRecognizer::new();
        let id = recognizer.register_swipe(
            SwipeGesture::new(SwipeDirection::Right).with_minimum_delta(pt(10., 10.)),
        );

        let mut events = Vec::new();
        recognizer.start_swipe(1, None, &mut events);
        for _ in 0..4 {
            assert!(recognizer.update_swipe(pt(0.5, 0.)).is_empty());
        }
        let events = recognizer.update_swipe(pt(3., 0.));
        assert_eq!(events, [(id, GestureEvent::Progress(0.5))]);
    }

    #[test]
    fn finger_count_bounds() {
        let mut recognizer = GestureRecognizer::new();
        let mut gesture = SwipeGesture::new(SwipeDirection::Down);
        gesture.min_fingers = Some(2);
        gesture.max_fingers = Some(3);
        recognizer.register_swipe(gesture);

        for (fingers, started) in [(1, 0), (2, 1), (3, 1), (4, 0)] {
            let mut events = Vec::new();
            assert_eq!(recognizer.start_swipe(fingers, None, &mut events), started);
            recognizer.cancel_swipe();
        }
    }

    #[test]
    fn start_geometry_includes_edges() {
        let mut recognizer = GestureRecognizer::new();
        recognizer.register_swipe(
            SwipeGesture::new(SwipeDirection::Down)
                .with_start_geometry(Rectangle::new(pt(0., 0.), (100., 8.).into())),
        );

        for (pos, started) in [
            (pt(0., 0.), 1),
            (pt(100., 8.), 1),
            (pt(50., 9.), 0),
            (pt(-1., 4.), 0),
        ] {
            let mut events = Vec::new();
            assert_eq!(recognizer.start_swipe(1, Some(pos), &mut events), started);
            recognizer.cancel_swipe();
        }

        // Positional gestures never start from a touchpad swipe.
        let mut events = Vec::new();
        assert_eq!(recognizer.start_swipe(1, None, &mut events), 0);
    }

    #[test]
    fn unregister_cancels_active() {
        let mut recognizer = GestureRecognizer::new();
        let id = recognizer.register_swipe(SwipeGesture::new(SwipeDirection::Down));

        let mut events = Vec::new();
        recognizer.start_swipe(1, None, &mut events);
        assert_eq!(recognizer.unregister(id), [(id, GestureEvent::Cancelled)]);
        assert!(!recognizer.is_registered(id));
        assert!(recognizer.unregister(id).is_empty());
    }

    #[test]
    fn pinch_contracting() {
        let mut recognizer = GestureRecognizer::new();
        let contract = recognizer
            .register_pinch(PinchGesture::new(PinchDirection::Contracting).with_fingers(4));
        let expand =
            recognizer.register_pinch(PinchGesture::new(PinchDirection::Expanding).with_fingers(4));

        let mut events = Vec::new();
        assert_eq!(recognizer.start_pinch(4, &mut events), 2);

        let events = recognizer.update_pinch(0.88, 15.);
        assert_eq!(count(&events, expand, GestureEvent::Cancelled), 1);
        let progress = events.iter().find_map(|(id, e)| match e {
            GestureEvent::Progress(p) if *id == contract => Some(*p),
            _ => None,
        });
        assert_abs_diff_eq!(progress.unwrap_or(0.), 0.6, epsilon = 1e-9);

        assert_eq!(recognizer.end_pinch(), [(contract, GestureEvent::Cancelled)]);
    }

    #[test]
    fn pinch_direction_change_restarts() {
        let mut recognizer = GestureRecognizer::new();
        let contract = recognizer.register_pinch(PinchGesture::new(PinchDirection::Contracting));
        let expand = recognizer.register_pinch(PinchGesture::new(PinchDirection::Expanding));

        let mut events = Vec::new();
        recognizer.start_pinch(2, &mut events);
        recognizer.update_pinch(0.9, 0.);
        assert_eq!(recognizer.active_pinches(), [contract]);

        let events = recognizer.update_pinch(1.3, 0.);
        assert!(events.contains(&(contract, GestureEvent::Cancelled)));
        assert_eq!(count(&events, expand, GestureEvent::Started), 1);
        assert_eq!(recognizer.active_pinches(), [expand]);
        assert_eq!(recognizer.end_pinch(), [(expand, GestureEvent::Triggered)]);
    }
}
