//! Outputs known to the pipeline.
//!
//! The set of outputs is never empty: when the last real output goes away, a placeholder output
//! takes its place so that the render loop, animations and input routing keep working.

use std::fmt;
use std::time::Duration;

use anyhow::ensure;
use smithay::utils::{Logical, Physical, Point, Rectangle, Size, Transform};

use crate::frame_clock::FrameClock;
use crate::utils::id::IdCounter;
use crate::utils::{rect, united};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(u32);

static OUTPUT_ID_COUNTER: IdCounter = IdCounter::new();

impl OutputId {
    fn next() -> Self {
        Self(OUTPUT_ID_COUNTER.next())
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output-{}", self.0)
    }
}

const PLACEHOLDER_SIZE: (i32, i32) = (1920, 1080);
const PLACEHOLDER_REFRESH_MHZ: u32 = 60_000;

#[derive(Debug, Default)]
pub enum RedrawState {
    /// Nothing to draw.
    #[default]
    Idle,
    /// A redraw is queued.
    Queued,
    /// A frame was submitted and awaits its vblank.
    WaitingForVBlank { redraw_needed: bool },
}

impl RedrawState {
    pub fn queue_redraw(self) -> Self {
        match self {
            RedrawState::Idle => RedrawState::Queued,
            RedrawState::Queued => RedrawState::Queued,
            RedrawState::WaitingForVBlank { .. } => RedrawState::WaitingForVBlank {
                redraw_needed: true,
            },
        }
    }
}

/// Per-channel gamma lookup tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GammaRamp {
    pub red: Vec<u16>,
    pub green: Vec<u16>,
    pub blue: Vec<u16>,
}

/// Description of an output being plugged in.
#[derive(Debug, Clone)]
pub struct OutputInfo {
    pub name: String,
    pub geometry: Rectangle<i32, Logical>,
    pub scale: f64,
    pub transform: Transform,
    pub refresh_mhz: u32,
}

#[derive(Debug)]
pub struct Output {
    id: OutputId,
    name: String,
    geometry: Rectangle<i32, Logical>,
    scale: f64,
    transform: Transform,
    refresh_mhz: u32,
    gamma_ramp: Option<GammaRamp>,
    placeholder: bool,
    pub frame_clock: FrameClock,
    pub redraw_state: RedrawState,
    /// Presentation time of the previous frame on this output.
    pub last_frame_time: Option<Duration>,
    /// Whether some effect asked for another frame.
    pub unfinished_animations_remain: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    Added(OutputId),
    Removed(OutputId),
    GeometryChanged(OutputId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}

#[derive(Debug)]
pub struct Outputs {
    outputs: Vec<Output>,
}

impl Output {
    fn new(info: OutputInfo, placeholder: bool) -> Self {
        Self {
            id: OutputId::next(),
            name: info.name,
            geometry: info.geometry,
            scale: info.scale,
            transform: info.transform,
            refresh_mhz: info.refresh_mhz,
            gamma_ramp: None,
            placeholder,
            frame_clock: FrameClock::new(info.refresh_mhz),
            redraw_state: RedrawState::Idle,
            last_frame_time: None,
            unfinished_animations_remain: false,
        }
    }

    fn placeholder() -> Self {
        let (w, h) = PLACEHOLDER_SIZE;
        Self::new(
            OutputInfo {
                name: String::from("placeholder"),
                geometry: rect(0, 0, w, h),
                scale: 1.,
                transform: Transform::Normal,
                refresh_mhz: PLACEHOLDER_REFRESH_MHZ,
            },
            true,
        )
    }

    pub fn id(&self) -> OutputId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> Rectangle<i32, Logical> {
        self.geometry
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn refresh_rate(&self) -> u32 {
        self.refresh_mhz
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn gamma_ramp(&self) -> Option<&GammaRamp> {
        self.gamma_ramp.as_ref()
    }

    /// Size of the framebuffer in device pixels, before the output transform.
    pub fn physical_size(&self) -> Size<i32, Physical> {
        let size = self.geometry.size.to_f64().to_physical(self.scale).to_i32_round();
        self.transform.transform_size(size)
    }

    pub fn contains(&self, point: Point<f64, Logical>) -> bool {
        let g = self.geometry;
        f64::from(g.loc.x) <= point.x
            && point.x < f64::from(g.loc.x + g.size.w)
            && f64::from(g.loc.y) <= point.y
            && point.y < f64::from(g.loc.y + g.size.h)
    }
}

impl Outputs {
    pub fn new() -> Self {
        Self {
            outputs: vec![Output::placeholder()],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Output> + '_ {
        self.outputs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Output> + '_ {
        self.outputs.iter_mut()
    }

    pub fn ids(&self) -> Vec<OutputId> {
        self.outputs.iter().map(|o| o.id).collect()
    }

    pub fn get(&self, id: OutputId) -> Option<&Output> {
        self.outputs.iter().find(|o| o.id == id)
    }

    pub fn get_mut(&mut self, id: OutputId) -> Option<&mut Output> {
        self.outputs.iter_mut().find(|o| o.id == id)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn has_real_outputs(&self) -> bool {
        self.outputs.iter().any(|o| !o.placeholder)
    }

    pub fn placeholder(&self) -> Option<OutputId> {
        self.outputs.iter().find(|o| o.placeholder).map(|o| o.id)
    }

    /// Adds a real output, retiring the placeholder if it was in use.
    pub fn add(&mut self, info: OutputInfo) -> (OutputId, Vec<OutputEvent>) {
        let output = Output::new(info, false);
        let id = output.id;
        debug!(
            "adding output {id} {:?} at {:?} scale {}",
            output.name, output.geometry, output.scale
        );
        self.outputs.push(output);

        let mut events = vec![OutputEvent::Added(id)];
        if let Some(idx) = self.outputs.iter().position(|o| o.placeholder) {
            let placeholder = self.outputs.remove(idx);
            debug!("removing placeholder output {}", placeholder.id);
            events.push(OutputEvent::Removed(placeholder.id));
        }
        (id, events)
    }

    /// Removes a real output, adding the placeholder when it was the last one.
    pub fn remove(&mut self, id: OutputId) -> Vec<OutputEvent> {
        let Some(idx) = self.outputs.iter().position(|o| o.id == id) else {
            return Vec::new();
        };
        if self.outputs[idx].placeholder {
            warn!("refusing to remove the placeholder output");
            return Vec::new();
        }

        let mut events = Vec::new();
        if self.outputs.len() == 1 {
            let placeholder = Output::placeholder();
            debug!("adding placeholder output {}", placeholder.id);
            events.push(OutputEvent::Added(placeholder.id));
            self.outputs.push(placeholder);
        }

        let output = self.outputs.remove(idx);
        debug!("removed output {} {:?}", output.id, output.name);
        events.push(OutputEvent::Removed(id));
        events
    }

    pub fn set_geometry(
        &mut self,
        id: OutputId,
        geometry: Rectangle<i32, Logical>,
        scale: f64,
    ) -> Vec<OutputEvent> {
        let Some(output) = self.get_mut(id) else {
            return Vec::new();
        };
        if output.geometry == geometry && output.scale == scale {
            return Vec::new();
        }

        output.geometry = geometry;
        output.scale = scale;
        vec![OutputEvent::GeometryChanged(id)]
    }

    pub fn set_gamma_ramp(&mut self, id: OutputId, ramp: Option<GammaRamp>) -> anyhow::Result<()> {
        let output = self
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("no output {id}"))?;

        if let Some(ramp) = &ramp {
            ensure!(!ramp.red.is_empty(), "gamma ramp must not be empty");
            ensure!(
                ramp.red.len() == ramp.green.len() && ramp.red.len() == ramp.blue.len(),
                "gamma ramp channels must have equal sizes"
            );
        }

        output.gamma_ramp = ramp;
        Ok(())
    }

    /// Output under a point in global logical coordinates.
    pub fn output_at(&self, point: Point<f64, Logical>) -> Option<OutputId> {
        self.outputs.iter().find(|o| o.contains(point)).map(|o| o.id)
    }

    /// Bounding rectangle of all outputs.
    pub fn virtual_screen_geometry(&self) -> Rectangle<i32, Logical> {
        self.outputs
            .iter()
            .fold(Rectangle::default(), |acc, o| united(acc, o.geometry))
    }

    /// Another output directly touching `edge` of the given output.
    pub fn neighbour(&self, id: OutputId, edge: Edge) -> Option<OutputId> {
        let g = self.get(id)?.geometry;
        let (left, top) = (g.loc.x, g.loc.y);
        let (right, bottom) = (left + g.size.w, top + g.size.h);

        self.outputs.iter().filter(|o| o.id != id).find_map(|o| {
            let h = o.geometry;
            let (hl, ht) = (h.loc.x, h.loc.y);
            let (hr, hb) = (hl + h.size.w, ht + h.size.h);
            let overlaps_x = hl < right && left < hr;
            let overlaps_y = ht < bottom && top < hb;
            let touches = match edge {
                Edge::Left => hr == left && overlaps_y,
                Edge::Right => hl == right && overlaps_y,
                Edge::Top => hb == top && overlaps_x,
                Edge::Bottom => ht == bottom && overlaps_x,
            };
            touches.then_some(o.id)
        })
    }
}

impl Default for Outputs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, x: i32) -> OutputInfo {
        OutputInfo {
            name: name.to_owned(),
            geometry: rect(x, 0, 1920, 1080),
            scale: 1.,
            transform: Transform::Normal,
            refresh_mhz: 60_000,
        }
    }

    #[test]
    fn placeholder_keeps_set_non_empty() {
        let mut outputs = Outputs::new();
        let placeholder = outputs.placeholder().unwrap();
        assert!(!outputs.has_real_outputs());

        let (a, events) = outputs.add(info("A", 0));
        assert_eq!(
            events,
            [OutputEvent::Added(a), OutputEvent::Removed(placeholder)]
        );
        assert_eq!(outputs.placeholder(), None);

        let events = outputs.remove(a);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], OutputEvent::Added(_)));
        assert_eq!(events[1], OutputEvent::Removed(a));
        assert_eq!(outputs.len(), 1);
        assert!(outputs.placeholder().is_some());
    }

    #[test]
    fn placeholder_cannot_be_removed() {
        let mut outputs = Outputs::new();
        let placeholder = outputs.placeholder().unwrap();
        assert!(outputs.remove(placeholder).is_empty());
        assert_eq!(outputs.len(), 1);
    }

    #[test]
    fn neighbours() {
        let mut outputs = Outputs::new();
        let (a, _) = outputs.add(info("A", 0));
        let (b, _) = outputs.add(info("B", 1920));
        assert_eq!(outputs.neighbour(a, Edge::Right), Some(b));
        assert_eq!(outputs.neighbour(a, Edge::Left), None);
        assert_eq!(outputs.neighbour(b, Edge::Left), Some(a));
        assert_eq!(outputs.neighbour(b, Edge::Top), None);
        assert_eq!(outputs.virtual_screen_geometry(), rect(0, 0, 3840, 1080));
    }

    #[test]
    fn rotated_physical_size() {
        let mut outputs = Outputs::new();
        let (a, _) = outputs.add(OutputInfo {
            transform: Transform::_90,
            scale: 2.,
            geometry: rect(0, 0, 540, 960),
            ..info("A", 0)
        });
        assert_eq!(
            outputs.get(a).unwrap().physical_size(),
            Size::from((1920, 1080))
        );
    }

    #[test]
    fn gamma_ramp_validation() {
        let mut outputs = Outputs::new();
        let (a, _) = outputs.add(info("A", 0));
        let bad = GammaRamp {
            red: vec![0; 256],
            green: vec![0; 256],
            blue: vec![0; 255],
        };
        assert!(outputs.set_gamma_ramp(a, Some(bad)).is_err());
        let good = GammaRamp {
            red: vec![0; 256],
            green: vec![0; 256],
            blue: vec![0; 256],
        };
        outputs.set_gamma_ramp(a, Some(good.clone())).unwrap();
        assert_eq!(outputs.get(a).unwrap().gamma_ramp(), Some(&good));
    }
}
