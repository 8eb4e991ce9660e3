use std::str::FromStr;

use miette::miette;
use serde::{Deserialize, Serialize};

use crate::binds::{ModifierKeys, Modifiers};
use crate::utils::{Flag, FloatOrInt, MergeWith};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MousePointer {
    /// Draw the cursor scaled with the zoom factor.
    Scale,
    /// Draw the cursor at its normal size.
    Keep,
    /// Do not draw the cursor while zoomed.
    Hide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseTracking {
    /// Zoomed area follows the cursor proportionally to its position on the screen.
    Proportional,
    /// Zoomed area is centered on the cursor.
    Centered,
    /// Zoomed area pans when the cursor pushes against a screen edge.
    Push,
    /// Zoomed area stays put.
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Zoom {
    pub off: bool,
    /// Multiplier applied on every zoom in or out step.
    pub zoom_factor: f64,
    pub mouse_pointer: MousePointer,
    pub mouse_tracking: MouseTracking,
    /// Milliseconds a focus change has to trail the last mouse move before it takes over.
    pub focus_delay: u32,
    /// Divisor of the screen size used by the directional move actions.
    pub move_factor: f64,
    pub initial_zoom: f64,
    pub enable_focus_tracking: bool,
    pub enable_text_caret_tracking: bool,
    /// Zoom level from which the pixel grid shader is used.
    pub pixel_grid_zoom: f64,
    pub pointer_axis_gesture_modifiers: Modifiers,
}

impl Default for Zoom {
    fn default() -> Self {
        Self {
            off: false,
            zoom_factor: 1.2,
            mouse_pointer: MousePointer::Scale,
            mouse_tracking: MouseTracking::Proportional,
            focus_delay: 350,
            move_factor: 20.,
            initial_zoom: 1.,
            enable_focus_tracking: false,
            enable_text_caret_tracking: false,
            pixel_grid_zoom: 15.,
            pointer_axis_gesture_modifiers: Modifiers::CTRL | Modifiers::SUPER,
        }
    }
}

#[derive(knuffel::Decode, Debug, Default, Clone, Copy, PartialEq)]
pub struct ZoomPart {
    #[knuffel(child)]
    pub off: Option<Flag>,
    #[knuffel(child, unwrap(argument))]
    pub zoom_factor: Option<FloatOrInt<0, 100>>,
    #[knuffel(child, unwrap(argument, str))]
    pub mouse_pointer: Option<MousePointer>,
    #[knuffel(child, unwrap(argument, str))]
    pub mouse_tracking: Option<MouseTracking>,
    #[knuffel(child, unwrap(argument))]
    pub focus_delay: Option<u32>,
    #[knuffel(child, unwrap(argument))]
    pub move_factor: Option<FloatOrInt<0, 100>>,
    #[knuffel(child, unwrap(argument))]
    pub initial_zoom: Option<FloatOrInt<1, 100>>,
    #[knuffel(child)]
    pub enable_focus_tracking: Option<Flag>,
    #[knuffel(child)]
    pub enable_text_caret_tracking: Option<Flag>,
    #[knuffel(child, unwrap(argument))]
    pub pixel_grid_zoom: Option<FloatOrInt<1, 100>>,
    #[knuffel(child, unwrap(argument, str))]
    pub pointer_axis_gesture_modifiers: Option<ModifierKeys>,
}

impl MergeWith<ZoomPart> for Zoom {
    fn merge_with(&mut self, part: &ZoomPart) {
        merge!(
            (self, part),
            off,
            zoom_factor,
            move_factor,
            initial_zoom,
            enable_focus_tracking,
            enable_text_caret_tracking,
            pixel_grid_zoom,
        );
        merge_clone!((self, part), mouse_pointer, mouse_tracking, focus_delay);
        if let Some(mods) = part.pointer_axis_gesture_modifiers {
            self.pointer_axis_gesture_modifiers = mods.0;
        }
    }
}

impl Zoom {
    /// Zoom step factor, never below 0.1.
    pub fn zoom_factor(&self) -> f64 {
        if self.zoom_factor < 0.1 {
            warn!("zoom factor {} is too small, using 0.1", self.zoom_factor);
            0.1
        } else {
            self.zoom_factor
        }
    }

    pub fn move_factor(&self) -> f64 {
        self.move_factor.max(0.1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Magnifier {
    pub off: bool,
    pub width: u32,
    pub height: u32,
    pub zoom_factor: f64,
    pub initial_zoom: f64,
    pub pointer_axis_gesture_modifiers: Modifiers,
}

impl Default for Magnifier {
    fn default() -> Self {
        Self {
            off: true,
            width: 200,
            height: 200,
            zoom_factor: 1.2,
            initial_zoom: 1.,
            pointer_axis_gesture_modifiers: Modifiers::CTRL | Modifiers::SUPER,
        }
    }
}

#[derive(knuffel::Decode, Debug, Default, Clone, Copy, PartialEq)]
pub struct MagnifierPart {
    #[knuffel(child)]
    pub off: Option<Flag>,
    #[knuffel(child, unwrap(argument))]
    pub width: Option<u32>,
    #[knuffel(child, unwrap(argument))]
    pub height: Option<u32>,
    #[knuffel(child, unwrap(argument))]
    pub zoom_factor: Option<FloatOrInt<0, 100>>,
    #[knuffel(child, unwrap(argument))]
    pub initial_zoom: Option<FloatOrInt<1, 100>>,
    #[knuffel(child, unwrap(argument, str))]
    pub pointer_axis_gesture_modifiers: Option<ModifierKeys>,
}

impl MergeWith<MagnifierPart> for Magnifier {
    fn merge_with(&mut self, part: &MagnifierPart) {
        merge!((self, part), off, zoom_factor, initial_zoom);
        merge_clone!((self, part), width, height);
        if let Some(mods) = part.pointer_axis_gesture_modifiers {
            self.pointer_axis_gesture_modifiers = mods.0;
        }
    }
}

impl FromStr for MousePointer {
    type Err = miette::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scale" => Ok(Self::Scale),
            "keep" => Ok(Self::Keep),
            "hide" => Ok(Self::Hide),
            _ => Err(miette!(
                r#"invalid mouse pointer mode, can be "scale", "keep" or "hide""#
            )),
        }
    }
}

impl FromStr for MouseTracking {
    type Err = miette::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proportional" => Ok(Self::Proportional),
            "centered" => Ok(Self::Centered),
            "push" => Ok(Self::Push),
            "disabled" => Ok(Self::Disabled),
            _ => Err(miette!(
                r#"invalid mouse tracking mode, can be "proportional", "centered", "push" or "disabled""#
            )),
        }
    }
}
