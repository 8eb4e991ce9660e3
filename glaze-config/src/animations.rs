use serde::{Deserialize, Serialize};

use crate::utils::{FloatOrInt, MergeWith};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Animations {
    pub off: bool,
    /// Multiplier applied to every animation duration.
    pub slowdown: f64,
    /// Fade-in duration of newly mapped windows.
    pub window_open_ms: u32,
    /// Fade-out duration of closed windows, kept alive until it ends.
    pub window_close_ms: u32,
}

impl Default for Animations {
    fn default() -> Self {
        Self {
            off: false,
            slowdown: 1.,
            window_open_ms: 150,
            window_close_ms: 150,
        }
    }
}

#[derive(knuffel::Decode, Debug, Default, Clone, Copy, PartialEq)]
pub struct AnimationsPart {
    #[knuffel(child)]
    pub off: bool,
    #[knuffel(child)]
    pub on: bool,
    #[knuffel(child, unwrap(argument))]
    pub slowdown: Option<FloatOrInt<0, { i32::MAX }>>,
    #[knuffel(child, unwrap(argument))]
    pub window_open_ms: Option<u32>,
    #[knuffel(child, unwrap(argument))]
    pub window_close_ms: Option<u32>,
}

impl MergeWith<AnimationsPart> for Animations {
    fn merge_with(&mut self, part: &AnimationsPart) {
        self.off |= part.off;
        if part.on {
            self.off = false;
        }

        merge!((self, part), slowdown);
        merge_clone!((self, part), window_open_ms, window_close_ms);
    }
}
