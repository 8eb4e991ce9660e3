use std::str::FromStr;

use miette::miette;
use serde::{Deserialize, Serialize};

use crate::utils::{Flag, MergeWith};

/// Screen edge or corner that can be reserved for activation.
#[derive(knuffel::DecodeScalar, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScreenEdge {
    Top,
    TopRight,
    Right,
    BottomRight,
    Bottom,
    BottomLeft,
    Left,
    TopLeft,
}

impl ScreenEdge {
    /// Whether this is a straight edge rather than a corner.
    ///
    /// Only straight edges can be used for touch activation.
    pub fn is_straight(self) -> bool {
        matches!(self, Self::Top | Self::Right | Self::Bottom | Self::Left)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverviewLayout {
    /// Even grid, every window in the cell nearest to it.
    Closest,
    /// Windows stay where they are, overlapping ones are pushed apart.
    Natural,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub off: bool,
    pub layout_mode: OverviewLayout,
    pub border_activate: Vec<ScreenEdge>,
    pub touch_border_activate: Vec<ScreenEdge>,
    pub ignore_minimized: bool,
    pub animation_duration_ms: u32,
}

impl Default for Overview {
    fn default() -> Self {
        Self {
            off: false,
            layout_mode: OverviewLayout::Natural,
            border_activate: vec![ScreenEdge::TopLeft],
            touch_border_activate: Vec::new(),
            ignore_minimized: false,
            animation_duration_ms: 300,
        }
    }
}

#[derive(knuffel::Decode, Debug, Default, Clone, PartialEq)]
pub struct OverviewPart {
    #[knuffel(child)]
    pub off: Option<Flag>,
    #[knuffel(child, unwrap(argument, str))]
    pub layout_mode: Option<OverviewLayout>,
    #[knuffel(child, unwrap(arguments))]
    pub border_activate: Option<Vec<ScreenEdge>>,
    #[knuffel(child, unwrap(arguments))]
    pub touch_border_activate: Option<Vec<ScreenEdge>>,
    #[knuffel(child)]
    pub ignore_minimized: Option<Flag>,
    #[knuffel(child, unwrap(argument))]
    pub animation_duration_ms: Option<u32>,
}

impl MergeWith<OverviewPart> for Overview {
    fn merge_with(&mut self, part: &OverviewPart) {
        merge!((self, part), off, ignore_minimized);
        merge_clone!(
            (self, part),
            layout_mode,
            border_activate,
            touch_border_activate,
            animation_duration_ms,
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridLayout {
    /// Rows are picked to make the grid as square as possible.
    Automatic,
    /// Rows come from `custom_layout_rows`.
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameAlignment {
    Disabled,
    Top,
    Center,
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesktopGrid {
    pub off: bool,
    pub layout_mode: GridLayout,
    pub custom_layout_rows: u32,
    pub border_activate: Vec<ScreenEdge>,
    pub touch_border_activate: Vec<ScreenEdge>,
    pub show_add_remove: bool,
    pub desktop_name_alignment: NameAlignment,
    pub animation_duration_ms: u32,
}

impl Default for DesktopGrid {
    fn default() -> Self {
        Self {
            off: false,
            layout_mode: GridLayout::Automatic,
            custom_layout_rows: 2,
            border_activate: Vec::new(),
            touch_border_activate: Vec::new(),
            show_add_remove: true,
            desktop_name_alignment: NameAlignment::Disabled,
            animation_duration_ms: 300,
        }
    }
}

#[derive(knuffel::Decode, Debug, Default, Clone, PartialEq)]
pub struct DesktopGridPart {
    #[knuffel(child)]
    pub off: Option<Flag>,
    #[knuffel(child, unwrap(argument, str))]
    pub layout_mode: Option<GridLayout>,
    #[knuffel(child, unwrap(argument))]
    pub custom_layout_rows: Option<u32>,
    #[knuffel(child, unwrap(arguments))]
    pub border_activate: Option<Vec<ScreenEdge>>,
    #[knuffel(child, unwrap(arguments))]
    pub touch_border_activate: Option<Vec<ScreenEdge>>,
    #[knuffel(child)]
    pub show_add_remove: Option<Flag>,
    #[knuffel(child, unwrap(argument, str))]
    pub desktop_name_alignment: Option<NameAlignment>,
    #[knuffel(child, unwrap(argument))]
    pub animation_duration_ms: Option<u32>,
}

impl MergeWith<DesktopGridPart> for DesktopGrid {
    fn merge_with(&mut self, part: &DesktopGridPart) {
        merge!((self, part), off, show_add_remove);
        merge_clone!(
            (self, part),
            layout_mode,
            custom_layout_rows,
            border_activate,
            touch_border_activate,
            desktop_name_alignment,
            animation_duration_ms,
        );
    }
}

impl FromStr for OverviewLayout {
    type Err = miette::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "closest" => Ok(Self::Closest),
            "natural" => Ok(Self::Natural),
            _ => Err(miette!(r#"invalid layout mode, can be "closest" or "natural""#)),
        }
    }
}

impl FromStr for GridLayout {
    type Err = miette::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automatic" => Ok(Self::Automatic),
            "custom" => Ok(Self::Custom),
            _ => Err(miette!(r#"invalid layout mode, can be "automatic" or "custom""#)),
        }
    }
}

impl FromStr for NameAlignment {
    type Err = miette::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(Self::Disabled),
            "top" => Ok(Self::Top),
            "center" => Ok(Self::Center),
            "bottom" => Ok(Self::Bottom),
            _ => Err(miette!(
                r#"invalid alignment, can be "disabled", "top", "center" or "bottom""#
            )),
        }
    }
}
