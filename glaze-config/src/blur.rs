use serde::{Deserialize, Serialize};

use crate::utils::{Flag, MergeWith};

pub const MAX_BLUR_STRENGTH: u8 = 15;
pub const MAX_NOISE_STRENGTH: u8 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Blur {
    pub off: bool,
    /// Position in the blur strength table, 1 to 15.
    pub strength: u8,
    /// Amplitude of the dithering noise added on top of the blur, 0 disables it.
    pub noise_strength: u8,
    /// A single downsample and upsample pass, without noise.
    pub simple: bool,
    /// Whether docks and panels also get the extended blur from windows around them.
    pub blur_docks: bool,
}

impl Default for Blur {
    fn default() -> Self {
        Self {
            off: false,
            strength: 12,
            noise_strength: 5,
            simple: false,
            blur_docks: false,
        }
    }
}

#[derive(knuffel::Decode, Debug, Default, Clone, Copy, PartialEq)]
pub struct BlurPart {
    #[knuffel(child)]
    pub off: Option<Flag>,
    #[knuffel(child, unwrap(argument))]
    pub strength: Option<u8>,
    #[knuffel(child, unwrap(argument))]
    pub noise_strength: Option<u8>,
    #[knuffel(child)]
    pub simple: Option<Flag>,
    #[knuffel(child)]
    pub blur_docks: Option<Flag>,
}

impl MergeWith<BlurPart> for Blur {
    fn merge_with(&mut self, part: &BlurPart) {
        merge!((self, part), off, simple, blur_docks);
        merge_clone!((self, part), strength, noise_strength);
    }
}

impl Blur {
    /// Strength clamped to the table range.
    pub fn strength(&self) -> u8 {
        crate::utils::clamp_warn("blur strength", self.strength, 1, MAX_BLUR_STRENGTH)
    }

    pub fn noise_strength(&self) -> u8 {
        crate::utils::clamp_warn("blur noise strength", self.noise_strength, 0, MAX_NOISE_STRENGTH)
    }
}
