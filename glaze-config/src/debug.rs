use serde::{Deserialize, Serialize};

use crate::utils::{Flag, MergeWith};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Debug {
    /// Time without a finished frame after which the GPU is considered frozen.
    pub watchdog_timeout_ms: u32,
    pub disable_watchdog: bool,
    /// Start the GL backend even if a previous run flagged it as unsafe.
    pub ignore_unsafe_gl_flag: bool,
    /// Time a client has to answer a ping.
    pub ping_timeout_ms: u32,
    /// Repaint every output in full each frame.
    pub disable_damage_tracking: bool,
}

impl Default for Debug {
    fn default() -> Self {
        Self {
            watchdog_timeout_ms: 15_000,
            disable_watchdog: false,
            ignore_unsafe_gl_flag: false,
            ping_timeout_ms: 5_000,
            disable_damage_tracking: false,
        }
    }
}

#[derive(knuffel::Decode, Debug, Default, Clone, Copy, PartialEq)]
pub struct DebugPart {
    #[knuffel(child, unwrap(argument))]
    pub watchdog_timeout_ms: Option<u32>,
    #[knuffel(child)]
    pub disable_watchdog: Option<Flag>,
    #[knuffel(child)]
    pub ignore_unsafe_gl_flag: Option<Flag>,
    #[knuffel(child, unwrap(argument))]
    pub ping_timeout_ms: Option<u32>,
    #[knuffel(child)]
    pub disable_damage_tracking: Option<Flag>,
}

impl MergeWith<DebugPart> for Debug {
    fn merge_with(&mut self, part: &DebugPart) {
        merge!(
            (self, part),
            disable_watchdog,
            ignore_unsafe_gl_flag,
            disable_damage_tracking,
        );
        merge_clone!((self, part), watchdog_timeout_ms, ping_timeout_ms);
    }
}
