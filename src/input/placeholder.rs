//! Filter active while no real output exists.
//!
//! Without an output the user cannot see what they interact with, so all input is swallowed.
//! Media keys still pass so that volume and playback keep working.

use smithay::input::keyboard::keysyms::{
    KEY_XF86AudioLowerVolume, KEY_XF86AudioMedia, KEY_XF86AudioMicMute, KEY_XF86AudioMute,
    KEY_XF86AudioNext, KEY_XF86AudioPause, KEY_XF86AudioPlay, KEY_XF86AudioPrev,
    KEY_XF86AudioRaiseVolume, KEY_XF86AudioStop, KEY_XF86MonBrightnessDown,
    KEY_XF86MonBrightnessUp,
};
use smithay::input::keyboard::Keysym;

use super::InputEvent;

pub fn is_media_key(keysym: Keysym) -> bool {
    matches!(
        keysym.raw(),
        KEY_XF86AudioRaiseVolume
            | KEY_XF86AudioLowerVolume
            | KEY_XF86AudioMute
            | KEY_XF86AudioMicMute
            | KEY_XF86AudioPlay
            | KEY_XF86AudioPause
            | KEY_XF86AudioStop
            | KEY_XF86AudioNext
            | KEY_XF86AudioPrev
            | KEY_XF86AudioMedia
            | KEY_XF86MonBrightnessUp
            | KEY_XF86MonBrightnessDown
    )
}

/// Whether the placeholder filter consumes the event.
pub fn consumes(event: &InputEvent) -> bool {
    match event {
        InputEvent::Keyboard(key) => !is_media_key(key.keysym),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use smithay::backend::input::KeyState;
    use smithay::input::keyboard::keysyms::{KEY_a, KEY_XF86AudioRaiseVolume};

    use super::*;
    use crate::input::KeyboardEvent;

    fn key(keysym: u32) -> InputEvent {
        InputEvent::Keyboard(KeyboardEvent {
            keycode: 0,
            keysym: Keysym::from(keysym),
            state: KeyState::Pressed,
            time: 0,
        })
    }

    #[test]
    fn media_keys_pass() {
        assert!(consumes(&key(KEY_a)));
        assert!(!consumes(&key(KEY_XF86AudioRaiseVolume)));
        assert!(consumes(&InputEvent::TouchCancel));
    }
}
