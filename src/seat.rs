//! Input state shared by all devices of the session.

use std::collections::{HashMap, VecDeque};

use smithay::backend::input::{ButtonState, KeyState};
use smithay::input::keyboard::Keysym;
use smithay::utils::{Logical, Point, Serial, SerialCounter};

use glaze_config::Modifiers;

use crate::input::InputEvent;
use crate::window::WindowId;

/// An input event as delivered to a surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceEvent {
    pub event: InputEvent,
    pub serial: Serial,
}

pub struct Seat {
    name: String,
    serial_counter: SerialCounter,
    focus: Option<WindowId>,
    cursor: Point<f64, Logical>,
    /// Pressed pointer buttons with the serial of their press.
    pressed_buttons: Vec<(u32, Serial)>,
    pressed_keys: Vec<u32>,
    modifiers: Modifiers,
    /// Touch points with the window they went down on.
    touch_points: HashMap<i32, Option<WindowId>>,
    injected: VecDeque<InputEvent>,
}

impl Seat {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            serial_counter: SerialCounter::new(),
            focus: None,
            cursor: Point::from((0., 0.)),
            pressed_buttons: Vec::new(),
            pressed_keys: Vec::new(),
            modifiers: Modifiers::empty(),
            touch_points: HashMap::new(),
            injected: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn next_serial(&self) -> Serial {
        self.serial_counter.next_serial()
    }

    pub fn focused_surface(&self) -> Option<WindowId> {
        self.focus
    }

    pub fn set_focus(&mut self, focus: Option<WindowId>) {
        if self.focus != focus {
            trace!("keyboard focus: {:?} -> {:?}", self.focus, focus);
            self.focus = focus;
        }
    }

    pub fn cursor_pos(&self) -> Point<f64, Logical> {
        self.cursor
    }

    pub fn set_cursor_pos(&mut self, pos: Point<f64, Logical>) {
        self.cursor = pos;
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn pressed_buttons(&self) -> impl Iterator<Item = (u32, Serial)> + '_ {
        self.pressed_buttons.iter().copied()
    }

    pub fn any_button_pressed(&self) -> bool {
        !self.pressed_buttons.is_empty()
    }

    pub fn button_serial(&self, button: u32) -> Option<Serial> {
        self.pressed_buttons
            .iter()
            .find(|(b, _)| *b == button)
            .map(|(_, serial)| *serial)
    }

    pub fn is_key_pressed(&self, keycode: u32) -> bool {
        self.pressed_keys.contains(&keycode)
    }

    pub fn touch_target(&self, id: i32) -> Option<Option<WindowId>> {
        self.touch_points.get(&id).copied()
    }

    /// Queues a synthetic event to be dispatched after the current one.
    pub fn inject(&mut self, event: InputEvent) {
        self.injected.push_back(event);
    }

    pub fn take_injected(&mut self) -> Option<InputEvent> {
        self.injected.pop_front()
    }

    /// Updates the tracked device state from a raw event.
    ///
    /// Runs for every event before the filter chain so that grabs and shortcuts see consistent
    /// button and modifier state. Returns the serial assigned to the event.
    pub fn update(&mut self, event: &InputEvent) -> Serial {
        let serial = self.next_serial();

        match event {
            InputEvent::PointerMotion { position, .. } => self.cursor = *position,
            InputEvent::PointerButton { button, state, .. } => match state {
                ButtonState::Pressed => {
                    if !self.pressed_buttons.iter().any(|(b, _)| b == button) {
                        self.pressed_buttons.push((*button, serial));
                    }
                }
                ButtonState::Released => self.pressed_buttons.retain(|(b, _)| b != button),
            },
            InputEvent::Keyboard(key) => {
                match key.state {
                    KeyState::Pressed => {
                        if !self.pressed_keys.contains(&key.keycode) {
                            self.pressed_keys.push(key.keycode);
                        }
                    }
                    KeyState::Released => self.pressed_keys.retain(|k| *k != key.keycode),
                }

                if let Some(modifier) = modifier_for_keysym(key.keysym) {
                    self.modifiers
                        .set(modifier, key.state == KeyState::Pressed);
                }
            }
            InputEvent::TouchDown { id, .. } => {
                self.touch_points.insert(*id, self.focus);
            }
            InputEvent::TouchUp { id, .. } => {
                self.touch_points.remove(id);
            }
            InputEvent::TouchCancel => self.touch_points.clear(),
            _ => (),
        }

        serial
    }
}

fn modifier_for_keysym(keysym: Keysym) -> Option<Modifiers> {
    use smithay::input::keyboard::keysyms::*;

    match keysym.raw() {
        KEY_Control_L | KEY_Control_R => Some(Modifiers::CTRL),
        KEY_Shift_L | KEY_Shift_R => Some(Modifiers::SHIFT),
        KEY_Alt_L | KEY_Alt_R => Some(Modifiers::ALT),
        KEY_Super_L | KEY_Super_R => Some(Modifiers::SUPER),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use smithay::input::keyboard::keysyms::{KEY_Super_L, KEY_a};

    use super::*;
    use crate::input::{KeyboardEvent, BTN_LEFT};

    fn key(keycode: u32, keysym: u32, state: KeyState) -> InputEvent {
        InputEvent::Keyboard(KeyboardEvent {
            keycode,
            keysym: Keysym::from(keysym),
            state,
            time: 0,
        })
    }

    #[test]
    fn serials_are_monotonic() {
        let seat = Seat::new("seat0");
        let a = seat.next_serial();
        let b = seat.next_serial();
        assert!(u32::from(b) > u32::from(a));
    }

    #[test]
    fn tracks_buttons_with_serials() {
        let mut seat = Seat::new("seat0");
        let press = InputEvent::PointerButton {
            button: BTN_LEFT,
            state: ButtonState::Pressed,
            time: 1,
        };
        let serial = seat.update(&press);
        assert_eq!(seat.button_serial(BTN_LEFT), Some(serial));

        // A repeated press keeps the first serial.
        seat.update(&press);
        assert_eq!(seat.pressed_buttons().count(), 1);
        assert_eq!(seat.button_serial(BTN_LEFT), Some(serial));

        seat.update(&InputEvent::PointerButton {
            button: BTN_LEFT,
            state: ButtonState::Released,
            time: 2,
        });
        assert!(!seat.any_button_pressed());
    }

    #[test]
    fn tracks_modifiers() {
        let mut seat = Seat::new("seat0");
        seat.update(&key(125, KEY_Super_L, KeyState::Pressed));
        seat.update(&key(30, KEY_a, KeyState::Pressed));
        assert_eq!(seat.modifiers(), Modifiers::SUPER);
        assert!(seat.is_key_pressed(30));

        seat.update(&key(125, KEY_Super_L, KeyState::Released));
        assert_eq!(seat.modifiers(), Modifiers::empty());
    }

    #[test]
    fn injected_events_are_fifo() {
        let mut seat = Seat::new("seat0");
        seat.inject(InputEvent::TouchCancel);
        seat.inject(InputEvent::TouchUp { id: 1, time: 0 });
        assert_eq!(seat.take_injected(), Some(InputEvent::TouchCancel));
        assert_eq!(
            seat.take_injected(),
            Some(InputEvent::TouchUp { id: 1, time: 0 })
        );
        assert_eq!(seat.take_injected(), None);
    }
}
