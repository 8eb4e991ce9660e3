//! Global accelerators, pointer-axis shortcuts and gesture shortcuts.

use std::collections::{HashMap, HashSet};

use glaze_config::{Action, Binds, Modifiers};
use smithay::input::keyboard::{FilterResult, Keysym};
use smithay::utils::{Logical, Point};

use super::gestures::{
    GestureEvent, GestureEvents, GestureId, GestureRecognizer, PinchDirection, PinchGesture,
    SwipeDirection, SwipeGesture,
};
use super::togglable_state::ToggleAction;

/// What happened to a gesture bound to an action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionEvent {
    Progress(f64),
    Triggered,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureShortcutEvent {
    pub owner: &'static str,
    pub action: ToggleAction,
    pub event: ActionEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GestureDevice {
    Touchpad,
    Touchscreen,
}

#[derive(Debug, Clone, Copy)]
struct GestureBinding {
    owner: &'static str,
    action: ToggleAction,
    device: GestureDevice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AxisShortcut {
    owner: &'static str,
    modifiers: Modifiers,
    direction: AxisDirection,
}

pub struct GlobalShortcuts {
    binds: Binds,
    /// Which effect performs each action.
    actions: HashMap<Action, &'static str>,
    /// Keys whose press triggered a shortcut; their release is swallowed too.
    suppressed_keys: HashSet<u32>,

    axis: Vec<AxisShortcut>,

    touchpad: GestureRecognizer,
    touchscreen: GestureRecognizer,
    gestures: HashMap<GestureId, GestureBinding>,

    touch_points: HashMap<i32, Point<f64, Logical>>,
    /// Touch points of a touchscreen gesture, swallowed until lifted.
    gesture_touch_points: HashSet<i32>,
}

impl GlobalShortcuts {
    pub fn new(binds: Binds) -> Self {
        Self {
            binds,
            actions: HashMap::new(),
            suppressed_keys: HashSet::new(),
            axis: Vec::new(),
            touchpad: GestureRecognizer::new(),
            touchscreen: GestureRecognizer::new(),
            gestures: HashMap::new(),
            touch_points: HashMap::new(),
            gesture_touch_points: HashSet::new(),
        }
    }

    pub fn set_binds(&mut self, binds: Binds) {
        self.binds = binds;
    }

    pub fn binds(&self) -> &Binds {
        &self.binds
    }

    pub fn register_action(&mut self, owner: &'static str, action: Action) {
        if let Some(prev) = self.actions.insert(action, owner) {
            if prev != owner {
                warn!("{owner} took over {action:?} from {prev}");
            }
        }
    }

    pub fn action_owner(&self, action: Action) -> Option<&'static str> {
        self.actions.get(&action).copied()
    }

    pub fn register_axis(
        &mut self,
        owner: &'static str,
        modifiers: Modifiers,
        direction: AxisDirection,
    ) {
        let shortcut = AxisShortcut {
            owner,
            modifiers,
            direction,
        };
        if !self.axis.contains(&shortcut) {
            self.axis.push(shortcut);
        }
    }

    pub fn register_touchpad_pinch(
        &mut self,
        owner: &'static str,
        direction: PinchDirection,
        fingers: u32,
        action: ToggleAction,
    ) -> GestureId {
        let id = self
            .touchpad
            .register_pinch(PinchGesture::new(direction).with_fingers(fingers));
        self.bind_gesture(id, owner, action, GestureDevice::Touchpad);
        id
    }

    pub fn register_touchpad_swipe(
        &mut self,
        owner: &'static str,
        direction: SwipeDirection,
        fingers: u32,
        action: ToggleAction,
    ) -> GestureId {
        let gesture = SwipeGesture::new(direction)
            .with_fingers(fingers)
            .with_minimum_delta(Point::from((200., 200.)));
        let id = self.touchpad.register_swipe(gesture);
        self.bind_gesture(id, owner, action, GestureDevice::Touchpad);
        id
    }

    pub fn register_touchscreen_swipe(
        &mut self,
        owner: &'static str,
        direction: SwipeDirection,
        fingers: u32,
        action: ToggleAction,
    ) -> GestureId {
        let gesture = SwipeGesture::new(direction)
            .with_fingers(fingers)
            .with_minimum_delta(Point::from((200., 200.)));
        let id = self.touchscreen.register_swipe(gesture);
        self.bind_gesture(id, owner, action, GestureDevice::Touchscreen);
        id
    }

    fn bind_gesture(
        &mut self,
        id: GestureId,
        owner: &'static str,
        action: ToggleAction,
        device: GestureDevice,
    ) {
        trace!("{owner} registered {device:?} gesture {} for {action:?}", id.get());
        self.gestures.insert(
            id,
            GestureBinding {
                owner,
                action,
                device,
            },
        );
    }

    /// Drops everything registered by `owner`, cancelling its gestures in flight.
    pub fn unregister_owner(&mut self, owner: &'static str) -> Vec<GestureShortcutEvent> {
        self.actions.retain(|_, o| *o != owner);
        self.axis.retain(|s| s.owner != owner);

        let ids: Vec<_> = self
            .gestures
            .iter()
            .filter(|(_, b)| b.owner == owner)
            .map(|(id, _)| *id)
            .collect();

        let mut out = Vec::new();
        for id in ids {
            let mut events = self.touchpad.unregister(id);
            events.extend(self.touchscreen.unregister(id));
            self.map_events(events, &mut out);
            self.gestures.remove(&id);
        }
        out
    }

    /// Checks a key event against the accelerators.
    ///
    /// Presses that match a bind registered by an effect are intercepted along with their later
    /// release.
    pub fn key(
        &mut self,
        keycode: u32,
        keysym: Keysym,
        pressed: bool,
        modifiers: Modifiers,
    ) -> FilterResult<Option<(&'static str, Action)>> {
        if !pressed && !self.suppressed_keys.contains(&keycode) {
            return FilterResult::Forward;
        }

        if !pressed {
            self.suppressed_keys.remove(&keycode);
            return FilterResult::Intercept(None);
        }

        let Some(action) = self.binds.find(keysym, modifiers).map(|bind| bind.action) else {
            return FilterResult::Forward;
        };
        let Some(owner) = self.action_owner(action) else {
            trace!("no effect handles {action:?}");
            return FilterResult::Forward;
        };

        self.suppressed_keys.insert(keycode);
        FilterResult::Intercept(Some((owner, action)))
    }

    pub fn axis(
        &self,
        horizontal: f64,
        vertical: f64,
        modifiers: Modifiers,
    ) -> Option<(&'static str, AxisDirection)> {
        let direction = if vertical.abs() >= horizontal.abs() {
            if vertical == 0. {
                return None;
            } else if vertical < 0. {
                AxisDirection::Up
            } else {
                AxisDirection::Down
            }
        } else if horizontal < 0. {
            AxisDirection::Left
        } else {
            AxisDirection::Right
        };

        self.axis
            .iter()
            .find(|s| s.modifiers == modifiers && s.direction == direction)
            .map(|s| (s.owner, direction))
    }

    pub fn swipe_begin(&mut self, fingers: u32) -> bool {
        let mut events = Vec::new();
        self.touchpad.start_swipe(fingers, None, &mut events) > 0
    }

    pub fn swipe_update(&mut self, delta: Point<f64, Logical>) -> Option<Vec<GestureShortcutEvent>> {
        if self.touchpad.active_swipes().is_empty() {
            return None;
        }

        let events = self.touchpad.update_swipe(delta);
        Some(self.mapped(events))
    }

    pub fn swipe_end(&mut self, cancelled: bool) -> Option<Vec<GestureShortcutEvent>> {
        if self.touchpad.active_swipes().is_empty() {
            self.touchpad.cancel_swipe();
            return None;
        }

        let events = if cancelled {
            self.touchpad.cancel_swipe()
        } else {
            self.touchpad.end_swipe()
        };
        Some(self.mapped(events))
    }

    pub fn pinch_begin(&mut self, fingers: u32) -> bool {
        let mut events = Vec::new();
        self.touchpad.start_pinch(fingers, &mut events) > 0
    }

    pub fn pinch_update(&mut self, scale: f64, angle_delta: f64) -> Option<Vec<GestureShortcutEvent>> {
        if self.touchpad.active_pinches().is_empty() {
            return None;
        }

        let events = self.touchpad.update_pinch(scale, angle_delta);
        Some(self.mapped(events))
    }

    pub fn pinch_end(&mut self, cancelled: bool) -> Option<Vec<GestureShortcutEvent>> {
        if self.touchpad.active_pinches().is_empty() {
            self.touchpad.cancel_pinch();
            return None;
        }

        let events = if cancelled {
            self.touchpad.cancel_pinch()
        } else {
            self.touchpad.end_pinch()
        };
        Some(self.mapped(events))
    }

    /// Tracks a new touch point. Returns the events of a touchscreen gesture it starts or
    /// cancels, or `None` when the point is not part of a gesture.
    pub fn touch_down(
        &mut self,
        id: i32,
        pos: Point<f64, Logical>,
    ) -> Option<Vec<GestureShortcutEvent>> {
        self.touch_points.insert(id, pos);
        let fingers = self.touch_points.len() as u32;
        if fingers < 2 {
            return None;
        }

        // A different finger count makes for a different gesture.
        let mut events = self.touchscreen.cancel_swipe();
        let mut started = Vec::new();
        let count = self.touchscreen.start_swipe(fingers, None, &mut started);

        if count == 0 {
            if events.is_empty() {
                return None;
            }
        } else {
            self.gesture_touch_points
                .extend(self.touch_points.keys().copied());
        }

        events.extend(started);
        Some(self.mapped(events))
    }

    pub fn touch_motion(
        &mut self,
        id: i32,
        pos: Point<f64, Logical>,
    ) -> Option<Vec<GestureShortcutEvent>> {
        let point = self.touch_points.get_mut(&id)?;
        let prev = std::mem::replace(point, pos);
        if !self.gesture_touch_points.contains(&id) {
            return None;
        }

        if self.touchscreen.active_swipes().is_empty() {
            return Some(Vec::new());
        }

        // Every finger contributes its share of the movement.
        let fingers = self.touch_points.len().max(1) as f64;
        let delta = pos - prev;
        let delta = Point::from((delta.x / fingers, delta.y / fingers));
        let events = self.touchscreen.update_swipe(delta);
        Some(self.mapped(events))
    }

    pub fn touch_up(&mut self, id: i32) -> Option<Vec<GestureShortcutEvent>> {
        self.touch_points.remove(&id);
        if !self.gesture_touch_points.remove(&id) {
            return None;
        }

        let events = self.touchscreen.end_swipe();
        Some(self.mapped(events))
    }

    pub fn touch_cancel(&mut self) -> Vec<GestureShortcutEvent> {
        self.touch_points.clear();
        self.gesture_touch_points.clear();
        let events = self.touchscreen.cancel_swipe();
        self.mapped(events)
    }

    fn mapped(&self, events: GestureEvents) -> Vec<GestureShortcutEvent> {
        let mut out = Vec::new();
        self.map_events(events, &mut out);
        out
    }

    fn map_events(&self, events: GestureEvents, out: &mut Vec<GestureShortcutEvent>) {
        for (id, event) in events {
            let Some(binding) = self.gestures.get(&id) else {
                continue;
            };

            let event = match event {
                GestureEvent::Started => continue,
                GestureEvent::Progress(p) => ActionEvent::Progress(p),
                GestureEvent::Triggered => ActionEvent::Triggered,
                GestureEvent::Cancelled => ActionEvent::Cancelled,
            };

            out.push(GestureShortcutEvent {
                owner: binding.owner,
                action: binding.action,
                event,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn shortcuts() -> GlobalShortcuts {
        GlobalShortcuts::new(Binds::default())
    }

    #[test]
    fn intercepts_press_and_release() {
        let mut shortcuts = shortcuts();
        shortcuts.register_action("zoom", Action::ZoomIn);

        let key = shortcuts.binds().keys_for(Action::ZoomIn).next().unwrap();
        let result = shortcuts.key(13, key.keysym, true, key.modifiers);
        assert!(matches!(
            result,
            FilterResult::Intercept(Some(("zoom", Action::ZoomIn)))
        ));

        // The release is swallowed even after the modifiers went away.
        let result = shortcuts.key(13, key.keysym, false, Modifiers::empty());
        assert!(matches!(result, FilterResult::Intercept(None)));

        let result = shortcuts.key(13, key.keysym, false, Modifiers::empty());
        assert!(matches!(result, FilterResult::Forward));
    }

    #[test]
    fn unhandled_actions_forward() {
        let mut shortcuts = shortcuts();
        let key = shortcuts
            .binds()
            .keys_for(Action::ToggleOverview)
            .next()
            .unwrap();
        let result = shortcuts.key(17, key.keysym, true, key.modifiers);
        assert!(matches!(result, FilterResult::Forward));

        shortcuts.register_action("overview", Action::ToggleOverview);
        let result = shortcuts.key(17, key.keysym, true, key.modifiers);
        assert!(matches!(result, FilterResult::Intercept(Some(_))));

        shortcuts.unregister_owner("overview");
        let result = shortcuts.key(18, key.keysym, true, key.modifiers);
        assert!(matches!(result, FilterResult::Forward));
    }

    #[test]
    fn axis_needs_exact_modifiers() {
        let mut shortcuts = shortcuts();
        let mods = Modifiers::CTRL | Modifiers::SUPER;
        shortcuts.register_axis("zoom", mods, AxisDirection::Up);
        shortcuts.register_axis("zoom", mods, AxisDirection::Down);

        assert_eq!(
            shortcuts.axis(0., -10., mods),
            Some(("zoom", AxisDirection::Up))
        );
        assert_eq!(shortcuts.axis(0., -10., Modifiers::CTRL), None);
        assert_eq!(shortcuts.axis(10., 0., mods), None);
        assert_eq!(shortcuts.axis(0., 0., mods), None);
    }

    #[test]
    fn pinch_progress_reaches_owner() {
        let mut shortcuts = shortcuts();
        shortcuts.register_touchpad_pinch(
            "overview",
            PinchDirection::Contracting,
            4,
            ToggleAction::Activate,
        );

        assert!(!shortcuts.pinch_begin(3));
        assert!(shortcuts.pinch_end(false).is_none());

        assert!(shortcuts.pinch_begin(4));
        let events = shortcuts.pinch_update(0.88, 0.).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].owner, "overview");
        match events[0].event {
            ActionEvent::Progress(p) => assert_abs_diff_eq!(p, 0.6, epsilon = 1e-9),
            other => panic!("unexpected {other:?}"),
        }

        let events = shortcuts.pinch_end(false).unwrap();
        assert_eq!(events[0].event, ActionEvent::Cancelled);
    }

    #[test]
    fn unregister_cancels_gesture_in_flight() {
        let mut shortcuts = shortcuts();
        shortcuts.register_touchpad_swipe("grid", SwipeDirection::Up, 4, ToggleAction::Toggle);

        assert!(shortcuts.swipe_begin(4));
        let events = shortcuts.unregister_owner("grid");
        assert_eq!(
            events,
            [GestureShortcutEvent {
                owner: "grid",
                action: ToggleAction::Toggle,
                event: ActionEvent::Cancelled,
            }]
        );
        assert!(shortcuts.swipe_update(Point::from((0., -50.))).is_none());
    }

    #[test]
    fn touchscreen_swipe() {
        let mut shortcuts = shortcuts();
        shortcuts.register_touchscreen_swipe("grid", SwipeDirection::Up, 3, ToggleAction::Toggle);

        assert!(shortcuts.touch_down(0, Point::from((100., 500.))).is_none());
        assert!(shortcuts.touch_down(1, Point::from((200., 500.))).is_none());
        assert!(shortcuts.touch_down(2, Point::from((300., 500.))).is_some());

        for id in 0..3 {
            let x = 100. * (id + 1) as f64;
            assert!(shortcuts
                .touch_motion(id, Point::from((x, 200.)))
                .is_some());
        }

        let events = shortcuts.touch_up(0).unwrap();
        assert_eq!(events[0].event, ActionEvent::Triggered);
        assert!(shortcuts.touch_up(1).is_some());
        assert!(shortcuts.touch_up(2).is_some());
        assert!(shortcuts.touch_motion(2, Point::from((0., 0.))).is_none());
    }
}
