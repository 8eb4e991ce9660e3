//! Input events and the ordered filter chain they pass through.
//!
//! Raw device events are dispatched to the installed filters in [`FilterOrder`]. The first filter
//! that consumes an event stops propagation. [`FilterOrder::Forward`] is always installed last and
//! hands the event to the focused surface through the seat.

use smithay::backend::input::{ButtonState, KeyState};
use smithay::input::keyboard::Keysym;
use smithay::utils::{Logical, Point};

pub mod gestures;
pub mod placeholder;
pub mod screen_edge;
pub mod shortcuts;
pub mod togglable_state;

pub const BTN_LEFT: u32 = 0x110;
pub const BTN_RIGHT: u32 = 0x111;
pub const BTN_MIDDLE: u32 = 0x112;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyboardEvent {
    pub keycode: u32,
    pub keysym: Keysym,
    pub state: KeyState,
    /// Milliseconds, monotonic per device.
    pub time: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    PointerMotion {
        position: Point<f64, Logical>,
        delta: Point<f64, Logical>,
        time: u32,
    },
    PointerButton {
        button: u32,
        state: ButtonState,
        time: u32,
    },
    PointerAxis {
        horizontal: f64,
        vertical: f64,
        time: u32,
    },
    Keyboard(KeyboardEvent),
    TouchDown {
        id: i32,
        position: Point<f64, Logical>,
        time: u32,
    },
    TouchMotion {
        id: i32,
        position: Point<f64, Logical>,
        time: u32,
    },
    TouchUp {
        id: i32,
        time: u32,
    },
    TouchCancel,
    SwipeBegin {
        fingers: u32,
        time: u32,
    },
    SwipeUpdate {
        delta: Point<f64, Logical>,
        time: u32,
    },
    SwipeEnd {
        cancelled: bool,
        time: u32,
    },
    PinchBegin {
        fingers: u32,
        time: u32,
    },
    PinchUpdate {
        /// Absolute scale since the gesture began.
        scale: f64,
        angle_delta: f64,
        time: u32,
    },
    PinchEnd {
        cancelled: bool,
        time: u32,
    },
}

impl InputEvent {
    pub fn time(&self) -> Option<u32> {
        match self {
            InputEvent::PointerMotion { time, .. }
            | InputEvent::PointerButton { time, .. }
            | InputEvent::PointerAxis { time, .. }
            | InputEvent::TouchDown { time, .. }
            | InputEvent::TouchMotion { time, .. }
            | InputEvent::TouchUp { time, .. }
            | InputEvent::SwipeBegin { time, .. }
            | InputEvent::SwipeUpdate { time, .. }
            | InputEvent::SwipeEnd { time, .. }
            | InputEvent::PinchBegin { time, .. }
            | InputEvent::PinchUpdate { time, .. }
            | InputEvent::PinchEnd { time, .. } => Some(*time),
            InputEvent::Keyboard(key) => Some(key.time),
            InputEvent::TouchCancel => None,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(
            self,
            InputEvent::PointerMotion { .. }
                | InputEvent::PointerButton { .. }
                | InputEvent::PointerAxis { .. }
        )
    }

    pub fn is_touch(&self) -> bool {
        matches!(
            self,
            InputEvent::TouchDown { .. }
                | InputEvent::TouchMotion { .. }
                | InputEvent::TouchUp { .. }
                | InputEvent::TouchCancel
        )
    }

    pub fn is_gesture(&self) -> bool {
        matches!(
            self,
            InputEvent::SwipeBegin { .. }
                | InputEvent::SwipeUpdate { .. }
                | InputEvent::SwipeEnd { .. }
                | InputEvent::PinchBegin { .. }
                | InputEvent::PinchUpdate { .. }
                | InputEvent::PinchEnd { .. }
        )
    }
}

/// Position of a filter in the chain. Lower runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterOrder {
    /// Swallows input while only the placeholder output exists.
    PlaceholderOutput,
    /// Wakes powered-off outputs, swallowing the waking event.
    Dpms,
    /// Sends everything straight to the lock screen.
    LockScreen,
    ScreenEdge,
    GlobalShortcut,
    /// Keyboard grabs, mouse interception and touch handled by effects.
    Effects,
    /// Delivery to the focused surface.
    Forward,
}

/// Installed filters, kept sorted.
#[derive(Debug, Clone)]
pub struct InputFilters {
    installed: Vec<FilterOrder>,
}

impl InputFilters {
    pub fn new() -> Self {
        Self {
            installed: vec![
                FilterOrder::ScreenEdge,
                FilterOrder::GlobalShortcut,
                FilterOrder::Effects,
                FilterOrder::Forward,
            ],
        }
    }

    pub fn install(&mut self, order: FilterOrder) -> bool {
        match self.installed.binary_search(&order) {
            Ok(_) => false,
            Err(idx) => {
                debug!("installing input filter {order:?}");
                self.installed.insert(idx, order);
                true
            }
        }
    }

    pub fn remove(&mut self, order: FilterOrder) -> bool {
        if order == FilterOrder::Forward {
            warn!("the forwarding input filter cannot be removed");
            return false;
        }

        match self.installed.binary_search(&order) {
            Ok(idx) => {
                debug!("removing input filter {order:?}");
                self.installed.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    pub fn is_installed(&self, order: FilterOrder) -> bool {
        self.installed.binary_search(&order).is_ok()
    }

    pub fn installed(&self) -> &[FilterOrder] {
        &self.installed
    }
}

impl Default for InputFilters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_stay_sorted() {
        let mut filters = InputFilters::new();
        assert!(filters.install(FilterOrder::PlaceholderOutput));
        assert!(!filters.install(FilterOrder::PlaceholderOutput));
        assert!(filters.install(FilterOrder::LockScreen));
        assert_eq!(
            filters.installed(),
            [
                FilterOrder::PlaceholderOutput,
                FilterOrder::LockScreen,
                FilterOrder::ScreenEdge,
                FilterOrder::GlobalShortcut,
                FilterOrder::Effects,
                FilterOrder::Forward,
            ]
        );

        assert!(filters.remove(FilterOrder::PlaceholderOutput));
        assert!(!filters.remove(FilterOrder::PlaceholderOutput));
        assert!(!filters.remove(FilterOrder::Forward));
        assert!(filters.is_installed(FilterOrder::Forward));
    }
}
