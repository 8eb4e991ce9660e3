use std::str::FromStr;

use miette::miette;
use serde::{Deserialize, Serialize};

use crate::utils::{Flag, FloatOrInt, MergeWith};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WobblySettings {
    /// Use one of the preset wobbliness levels.
    Auto,
    /// Take every physics knob from the config.
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wobbly {
    pub off: bool,
    pub settings: WobblySettings,
    pub wobblyness_level: u8,
    /// In auto mode, override stiffness, drag and move factor of the preset.
    pub advanced_mode: bool,
    /// Spring stiffness in percent.
    pub stiffness: f64,
    /// Velocity retained per step in percent.
    pub drag: f64,
    /// Position change per unit of velocity in percent.
    pub move_factor: f64,
    pub x_tesselation: u32,
    pub y_tesselation: u32,
    pub min_velocity: f64,
    pub max_velocity: f64,
    pub stop_velocity: f64,
    pub min_acceleration: f64,
    pub max_acceleration: f64,
    pub stop_acceleration: f64,
    pub move_wobble: bool,
    pub resize_wobble: bool,
    /// Wobble windows into place when they are mapped.
    pub open_wobble: bool,
    /// Collapse windows while they close.
    pub close_wobble: bool,
}

impl Default for Wobbly {
    fn default() -> Self {
        Self {
            off: false,
            settings: WobblySettings::Auto,
            wobblyness_level: 0,
            advanced_mode: false,
            stiffness: 15.,
            drag: 80.,
            move_factor: 10.,
            x_tesselation: 20,
            y_tesselation: 20,
            min_velocity: 0.,
            max_velocity: 1000.,
            stop_velocity: 0.5,
            min_acceleration: 0.,
            max_acceleration: 1000.,
            stop_acceleration: 0.5,
            move_wobble: true,
            resize_wobble: true,
            open_wobble: false,
            close_wobble: false,
        }
    }
}

#[derive(knuffel::Decode, Debug, Default, Clone, Copy, PartialEq)]
pub struct WobblyPart {
    #[knuffel(child)]
    pub off: Option<Flag>,
    #[knuffel(child, unwrap(argument, str))]
    pub settings: Option<WobblySettings>,
    #[knuffel(child, unwrap(argument))]
    pub wobblyness_level: Option<u8>,
    #[knuffel(child)]
    pub advanced_mode: Option<Flag>,
    #[knuffel(child, unwrap(argument))]
    pub stiffness: Option<FloatOrInt<0, 100>>,
    #[knuffel(child, unwrap(argument))]
    pub drag: Option<FloatOrInt<0, 100>>,
    #[knuffel(child, unwrap(argument))]
    pub move_factor: Option<FloatOrInt<0, 100>>,
    #[knuffel(child, unwrap(argument))]
    pub x_tesselation: Option<u32>,
    #[knuffel(child, unwrap(argument))]
    pub y_tesselation: Option<u32>,
    #[knuffel(child, unwrap(argument))]
    pub min_velocity: Option<FloatOrInt<0, 65535>>,
    #[knuffel(child, unwrap(argument))]
    pub max_velocity: Option<FloatOrInt<0, 65535>>,
    #[knuffel(child, unwrap(argument))]
    pub stop_velocity: Option<FloatOrInt<0, 65535>>,
    #[knuffel(child, unwrap(argument))]
    pub min_acceleration: Option<FloatOrInt<0, 65535>>,
    #[knuffel(child, unwrap(argument))]
    pub max_acceleration: Option<FloatOrInt<0, 65535>>,
    #[knuffel(child, unwrap(argument))]
    pub stop_acceleration: Option<FloatOrInt<0, 65535>>,
    #[knuffel(child)]
    pub move_wobble: Option<Flag>,
    #[knuffel(child)]
    pub resize_wobble: Option<Flag>,
    #[knuffel(child)]
    pub open_wobble: Option<Flag>,
    #[knuffel(child)]
    pub close_wobble: Option<Flag>,
}

impl MergeWith<WobblyPart> for Wobbly {
    fn merge_with(&mut self, part: &WobblyPart) {
        merge!(
            (self, part),
            off,
            advanced_mode,
            stiffness,
            drag,
            move_factor,
            min_velocity,
            max_velocity,
            stop_velocity,
            min_acceleration,
            max_acceleration,
            stop_acceleration,
            move_wobble,
            resize_wobble,
            open_wobble,
            close_wobble,
        );
        merge_clone!(
            (self, part),
            settings,
            wobblyness_level,
            x_tesselation,
            y_tesselation,
        );
    }
}

impl FromStr for WobblySettings {
    type Err = miette::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "custom" => Ok(Self::Custom),
            _ => Err(miette!(r#"invalid wobbly settings, can be "auto" or "custom""#)),
        }
    }
}
