use serde::{Deserialize, Serialize};

use crate::utils::{FloatOrInt, MergeWith};

/// Finger counts and distances for the gestures that drive whole-screen effects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gestures {
    /// Touchpad pinch that toggles the overview.
    pub pinch_fingers: u32,
    /// Touchpad swipe that toggles the overview (up) and desktop grid (down).
    pub swipe_fingers: u32,
    /// Touchscreen swipe for the same actions.
    pub touchscreen_swipe_fingers: u32,
    /// Logical distance a touch-border swipe needs for full progress.
    pub touch_border_distance: f64,
}

impl Default for Gestures {
    fn default() -> Self {
        Self {
            pinch_fingers: 4,
            swipe_fingers: 4,
            touchscreen_swipe_fingers: 3,
            touch_border_distance: 500.,
        }
    }
}

#[derive(knuffel::Decode, Debug, Default, Clone, Copy, PartialEq)]
pub struct GesturesPart {
    #[knuffel(child, unwrap(argument))]
    pub pinch_fingers: Option<u32>,
    #[knuffel(child, unwrap(argument))]
    pub swipe_fingers: Option<u32>,
    #[knuffel(child, unwrap(argument))]
    pub touchscreen_swipe_fingers: Option<u32>,
    #[knuffel(child, unwrap(argument))]
    pub touch_border_distance: Option<FloatOrInt<1, 65535>>,
}

impl MergeWith<GesturesPart> for Gestures {
    fn merge_with(&mut self, part: &GesturesPart) {
        merge!((self, part), touch_border_distance);
        merge_clone!(
            (self, part),
            pinch_fingers,
            swipe_fingers,
            touchscreen_swipe_fingers,
        );
    }
}

impl Gestures {
    /// Finger counts below 2 cannot form a touchpad gesture.
    pub fn pinch_fingers(&self) -> u32 {
        crate::utils::clamp_warn("pinch fingers", self.pinch_fingers, 2, 5)
    }

    pub fn swipe_fingers(&self) -> u32 {
        crate::utils::clamp_warn("swipe fingers", self.swipe_fingers, 3, 5)
    }

    pub fn touchscreen_swipe_fingers(&self) -> u32 {
        crate::utils::clamp_warn(
            "touchscreen swipe fingers",
            self.touchscreen_swipe_fingers,
            1,
            10,
        )
    }
}
