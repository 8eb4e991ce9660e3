use std::time::Duration;

use smithay::backend::input::{ButtonState, KeyState};
use smithay::input::keyboard::FilterResult;
use smithay::utils::{Logical, Point, Serial};

use super::Glaze;
use crate::effect::CursorImage;
use crate::input::screen_edge::EdgeTrigger;
use crate::input::shortcuts::{ActionEvent, GestureShortcutEvent};
use crate::input::togglable_state::ToggleAction;
use crate::input::{placeholder, FilterOrder, InputEvent};
use crate::seat::SurfaceEvent;
use crate::window::WindowId;

/// Upper bound on rounds of gesture and edge events produced while handling earlier ones.
const MAX_PENDING_ROUNDS: usize = 16;

impl Glaze {
    /// Runs an input event through the filter chain, then any events injected meanwhile.
    pub fn process_input_event(&mut self, event: InputEvent) {
        let _span = tracy_client::span!("Glaze::process_input_event");

        self.dispatch_input_event(event);
        while let Some(event) = self.seat.take_injected() {
            self.dispatch_input_event(event);
        }
    }

    fn dispatch_input_event(&mut self, event: InputEvent) {
        let old_cursor = self.seat.cursor_pos();
        let serial = self.seat.update(&event);

        if let InputEvent::PointerMotion { position, .. } = &event {
            self.ctx.set_cursor_pos(*position);
        }

        let filters = self.filters.installed().to_vec();
        for order in filters {
            if self.run_filter(order, &event, serial) {
                trace!("{order:?} consumed {event:?}");
                break;
            }
        }

        if let InputEvent::PointerMotion { position, .. } = &event {
            self.cursor_moved(*position, old_cursor);
        }

        self.dispatch_pending_input_events();
        self.apply_pointer_warp();
        if let Some(window) = self.ctx.take_activation_request() {
            self.focus_window(Some(window));
        }
    }

    fn run_filter(&mut self, order: FilterOrder, event: &InputEvent, serial: Serial) -> bool {
        match order {
            FilterOrder::PlaceholderOutput => placeholder::consumes(event),
            FilterOrder::Dpms => self.dpms_filter(event),
            FilterOrder::LockScreen => self.lock_screen_filter(event, serial),
            FilterOrder::ScreenEdge => self.screen_edge_filter(event),
            FilterOrder::GlobalShortcut => self.global_shortcut_filter(event),
            FilterOrder::Effects => self.effects_filter(event),
            FilterOrder::Forward => {
                self.forward(event, serial);
                true
            }
        }
    }

    fn dpms_filter(&mut self, event: &InputEvent) -> bool {
        let wakes = match event {
            InputEvent::Keyboard(key) => key.state == KeyState::Pressed,
            InputEvent::PointerButton { state, .. } => *state == ButtonState::Pressed,
            InputEvent::PointerMotion { .. }
            | InputEvent::PointerAxis { .. }
            | InputEvent::TouchDown { .. } => true,
            _ => false,
        };

        if wakes {
            self.set_monitors_active(true);
        }
        true
    }

    fn lock_screen_filter(&mut self, event: &InputEvent, serial: Serial) -> bool {
        if !self.ctx.is_screen_locked() {
            return false;
        }

        if let Some(surface) = self.lock_surface {
            self.deliver(surface, event, serial);
        }
        true
    }

    fn screen_edge_filter(&mut self, event: &InputEvent) -> bool {
        match event {
            InputEvent::PointerMotion { position, time, .. } => {
                let now = Duration::from_millis(u64::from(*time));
                let events = self.ctx.edges.pointer_moved(*position, now);
                self.ctx.push_edge_events(events);
                false
            }
            InputEvent::TouchDown { id, position, .. } => self.ctx.edges.touch_down(*id, *position),
            InputEvent::TouchMotion { id, position, .. } => {
                match self.ctx.edges.touch_motion(*id, *position) {
                    Some(events) => {
                        self.ctx.push_edge_events(events);
                        true
                    }
                    None => false,
                }
            }
            InputEvent::TouchUp { id, .. } => match self.ctx.edges.touch_up(*id) {
                Some(events) => {
                    self.ctx.push_edge_events(events);
                    true
                }
                None => false,
            },
            InputEvent::TouchCancel => {
                let events = self.ctx.edges.touch_cancel();
                self.ctx.push_edge_events(events);
                false
            }
            _ => false,
        }
    }

    fn global_shortcut_filter(&mut self, event: &InputEvent) -> bool {
        let modifiers = self.seat.modifiers();
        let shortcuts = &mut self.ctx.shortcuts;

        let gesture_events = match event {
            InputEvent::Keyboard(key) => {
                let pressed = key.state == KeyState::Pressed;
                return match shortcuts.key(key.keycode, key.keysym, pressed, modifiers) {
                    FilterResult::Forward => false,
                    FilterResult::Intercept(None) => true,
                    FilterResult::Intercept(Some((owner, action))) => {
                        match self.effects.get_mut(owner) {
                            Some(effect) => {
                                if !effect.handle_action(&mut self.ctx, action) {
                                    debug!("{owner} did not handle {action:?}");
                                }
                            }
                            None => warn!("{owner} registered {action:?} but is not loaded"),
                        }
                        true
                    }
                };
            }
            InputEvent::PointerAxis {
                horizontal,
                vertical,
                ..
            } => {
                let Some((owner, direction)) = shortcuts.axis(*horizontal, *vertical, modifiers)
                else {
                    return false;
                };
                return self
                    .effects
                    .get_mut(owner)
                    .is_some_and(|effect| effect.axis(&mut self.ctx, direction));
            }
            InputEvent::SwipeBegin { fingers, .. } => return shortcuts.swipe_begin(*fingers),
            InputEvent::SwipeUpdate { delta, .. } => shortcuts.swipe_update(*delta),
            InputEvent::SwipeEnd { cancelled, .. } => shortcuts.swipe_end(*cancelled),
            InputEvent::PinchBegin { fingers, .. } => return shortcuts.pinch_begin(*fingers),
            InputEvent::PinchUpdate {
                scale, angle_delta, ..
            } => shortcuts.pinch_update(*scale, *angle_delta),
            InputEvent::PinchEnd { cancelled, .. } => shortcuts.pinch_end(*cancelled),
            InputEvent::TouchDown { id, position, .. } => shortcuts.touch_down(*id, *position),
            InputEvent::TouchMotion { id, position, .. } => shortcuts.touch_motion(*id, *position),
            InputEvent::TouchUp { id, .. } => shortcuts.touch_up(*id),
            InputEvent::TouchCancel => {
                let events = shortcuts.touch_cancel();
                self.ctx.push_gesture_events(events);
                return false;
            }
            InputEvent::PointerMotion { .. } | InputEvent::PointerButton { .. } => return false,
        };

        match gesture_events {
            Some(events) => {
                self.ctx.push_gesture_events(events);
                true
            }
            None => false,
        }
    }

    fn effects_filter(&mut self, event: &InputEvent) -> bool {
        match event {
            InputEvent::Keyboard(key) => {
                let Some(owner) = self.ctx.keyboard_grab() else {
                    return false;
                };
                if let Some(effect) = self.effects.get_mut(owner) {
                    effect.grabbed_keyboard_event(&mut self.ctx, key);
                }
                true
            }
            event if event.is_pointer() => {
                let Some((owner, _)) = self.ctx.mouse_interception() else {
                    return false;
                };
                if let Some(effect) = self.effects.get_mut(owner) {
                    effect.intercepted_pointer_event(&mut self.ctx, event);
                }
                true
            }
            InputEvent::TouchDown { id, position, time } => {
                for effect in self.effects.iter_mut() {
                    if effect.is_active(&self.ctx)
                        && effect.touch_down(&mut self.ctx, *id, *position, *time)
                    {
                        return true;
                    }
                }
                false
            }
            InputEvent::TouchMotion { id, position, time } => {
                for effect in self.effects.iter_mut() {
                    if effect.is_active(&self.ctx)
                        && effect.touch_motion(&mut self.ctx, *id, *position, *time)
                    {
                        return true;
                    }
                }
                false
            }
            InputEvent::TouchUp { id, time } => {
                for effect in self.effects.iter_mut() {
                    if effect.is_active(&self.ctx) && effect.touch_up(&mut self.ctx, *id, *time) {
                        return true;
                    }
                }
                false
            }
            InputEvent::TouchCancel => {
                for effect in self.effects.iter_mut() {
                    effect.touch_cancel(&mut self.ctx);
                }
                false
            }
            _ => false,
        }
    }

    /// Delivers the event to the surface it belongs to.
    fn forward(&mut self, event: &InputEvent, serial: Serial) {
        let cursor = self.seat.cursor_pos();

        let target = match event {
            InputEvent::PointerMotion { position, .. } => {
                self.pointer_grab.or_else(|| self.ctx.windows.window_at(*position))
            }
            InputEvent::PointerButton {
                state: ButtonState::Pressed,
                ..
            } => {
                let under = self
                    .pointer_grab
                    .or_else(|| self.ctx.windows.window_at(cursor));
                if self.pointer_grab.is_none() {
                    if let Some(id) = under {
                        if self.seat.focused_surface() != Some(id) {
                            self.focus_window(Some(id));
                        }
                    }
                    self.pointer_grab = under;
                }
                under
            }
            InputEvent::PointerButton {
                state: ButtonState::Released,
                ..
            } => {
                let target = self.pointer_grab;
                if !self.seat.any_button_pressed() {
                    self.pointer_grab = None;
                }
                target
            }
            InputEvent::PointerAxis { .. } => self.ctx.windows.window_at(cursor),
            InputEvent::Keyboard(_) => self.seat.focused_surface(),
            InputEvent::TouchDown { id, position, .. } => {
                let under = self.ctx.windows.window_at(*position);
                if let Some(window) = under {
                    self.touch_targets.insert(*id, window);
                }
                under
            }
            InputEvent::TouchMotion { id, .. } => self.touch_targets.get(id).copied(),
            InputEvent::TouchUp { id, .. } => self.touch_targets.remove(id),
            InputEvent::TouchCancel => {
                let targets: Vec<_> = self.touch_targets.drain().map(|(_, w)| w).collect();
                for window in dedup(targets) {
                    self.deliver(window, event, serial);
                }
                return;
            }
            _ if event.is_gesture() => self.ctx.windows.window_at(cursor),
            _ => None,
        };

        if let Some(window) = target {
            self.deliver(window, event, serial);
        }
    }

    fn deliver(&mut self, window: WindowId, event: &InputEvent, serial: Serial) {
        if let Some(surface) = self.ctx.windows.surface_mut(window) {
            surface.deliver(&SurfaceEvent {
                event: event.clone(),
                serial,
            });
        }
    }

    /// Updates the cursor image effects may draw in place of the hardware cursor.
    pub fn set_cursor_image(&mut self, image: Option<CursorImage>) {
        self.ctx.set_cursor_image(image);
        if self.ctx.is_cursor_hidden() {
            self.ctx.add_repaint_full();
            self.flush_repaints();
        }
    }

    fn cursor_moved(&mut self, pos: Point<f64, Logical>, old: Point<f64, Logical>) {
        for effect in self.effects.iter_mut() {
            effect.cursor_moved(&mut self.ctx, pos, old);
        }
    }

    /// Moves the pointer where an effect asked for.
    fn apply_pointer_warp(&mut self) {
        let Some(pos) = self.ctx.take_pointer_warp() else {
            return;
        };

        let old = self.seat.cursor_pos();
        self.seat.set_cursor_pos(pos);
        self.ctx.set_cursor_pos(pos);
        self.cursor_moved(pos, old);
    }

    /// Hands queued gesture and screen edge events to the effects that registered them.
    pub(super) fn dispatch_pending_input_events(&mut self) {
        for _ in 0..MAX_PENDING_ROUNDS {
            let (gestures, edges) = self.ctx.take_pending_input_events();
            if gestures.is_empty() && edges.is_empty() {
                return;
            }

            for GestureShortcutEvent {
                owner,
                action,
                event,
            } in gestures
            {
                match self.effects.get_mut(owner) {
                    Some(effect) => effect.gesture(&mut self.ctx, action, event),
                    None => trace!("dropping gesture event for unloaded {owner}"),
                }
            }

            for edge_event in edges {
                let Some(effect) = self.effects.get_mut(edge_event.owner) else {
                    continue;
                };

                let event = match edge_event.trigger {
                    EdgeTrigger::Activated => {
                        if !effect.border_activated(&mut self.ctx, edge_event.edge) {
                            trace!("{} ignored {:?}", edge_event.owner, edge_event.edge);
                        }
                        continue;
                    }
                    EdgeTrigger::TouchProgress(progress) => ActionEvent::Progress(progress),
                    EdgeTrigger::TouchTriggered => ActionEvent::Triggered,
                    EdgeTrigger::TouchCancelled => ActionEvent::Cancelled,
                };
                effect.gesture(&mut self.ctx, ToggleAction::Toggle, event);
            }
        }

        warn!("effects keep producing input events, dropping the rest");
        let _ = self.ctx.take_pending_input_events();
    }
}

fn dedup(mut windows: Vec<WindowId>) -> Vec<WindowId> {
    windows.sort();
    windows.dedup();
    windows
}
