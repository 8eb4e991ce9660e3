use std::cell::RefCell;
use std::rc::Rc;

use smithay::utils::{Logical, Rectangle, Serial};

use super::{Surface, WindowFlags, WindowId};
use crate::seat::SurfaceEvent;
use crate::utils::region::{size_rect, Region};

/// Shared record of what a [`StaticSurface`] received.
#[derive(Debug, Default)]
pub struct SurfaceLog {
    pub events: Vec<SurfaceEvent>,
    pub pings: Vec<Serial>,
}

/// Surface with fixed properties, used by the headless backend and tests.
#[derive(Debug)]
pub struct StaticSurface {
    pub geometry: Rectangle<i32, Logical>,
    pub shape: Option<Region>,
    pub opaque: Region,
    pub damage: Region,
    pub opacity: f64,
    pub flags: WindowFlags,
    pub decoration_has_alpha: bool,
    pub decoration_blur: Option<Region>,
    pub decoration_inner: Option<Rectangle<i32, Logical>>,
    pub blur_region: Option<Region>,
    pub caption: String,
    pub desktop: Option<u32>,
    pub transient_for: Option<WindowId>,
    pub log: Rc<RefCell<SurfaceLog>>,
}

impl StaticSurface {
    pub fn new(geometry: Rectangle<i32, Logical>) -> Self {
        Self {
            geometry,
            shape: None,
            opaque: Region::new(),
            damage: Region::new(),
            opacity: 1.,
            flags: WindowFlags::NORMAL,
            decoration_has_alpha: false,
            decoration_blur: None,
            decoration_inner: None,
            blur_region: None,
            caption: String::new(),
            desktop: None,
            transient_for: None,
            log: Rc::new(RefCell::new(SurfaceLog::default())),
        }
    }

    /// Fully opaque surface.
    pub fn opaque(geometry: Rectangle<i32, Logical>) -> Self {
        Self {
            opaque: Region::from_rect(size_rect(geometry.size)),
            ..Self::new(geometry)
        }
    }

    pub fn with_flags(self, flags: WindowFlags) -> Self {
        Self { flags, ..self }
    }

    pub fn with_caption(self, caption: &str) -> Self {
        Self {
            caption: caption.to_owned(),
            ..self
        }
    }

    pub fn with_desktop(self, desktop: Option<u32>) -> Self {
        Self { desktop, ..self }
    }

    pub fn log(&self) -> Rc<RefCell<SurfaceLog>> {
        self.log.clone()
    }
}

impl Surface for StaticSurface {
    fn geometry(&self) -> Rectangle<i32, Logical> {
        self.geometry
    }

    fn shape(&self) -> Region {
        self.shape
            .clone()
            .unwrap_or_else(|| Region::from_rect(size_rect(self.geometry.size)))
    }

    fn opaque_region(&self) -> Region {
        self.opaque.clone()
    }

    fn decoration_inner_rect(&self) -> Rectangle<i32, Logical> {
        self.decoration_inner
            .unwrap_or_else(|| size_rect(self.geometry.size))
    }

    fn take_damage(&mut self) -> Region {
        std::mem::take(&mut self.damage)
    }

    fn opacity(&self) -> f64 {
        self.opacity
    }

    fn flags(&self) -> WindowFlags {
        self.flags
    }

    fn decoration_has_alpha(&self) -> bool {
        self.decoration_has_alpha
    }

    fn decoration_blur_region(&self) -> Option<Region> {
        self.decoration_blur.clone()
    }

    fn blur_region(&self) -> Option<Region> {
        self.blur_region.clone()
    }

    fn caption(&self) -> String {
        self.caption.clone()
    }

    fn desktop(&self) -> Option<u32> {
        self.desktop
    }

    fn transient_for(&self) -> Option<WindowId> {
        self.transient_for
    }

    fn deliver(&mut self, event: &SurfaceEvent) {
        self.log.borrow_mut().events.push(event.clone());
    }

    fn ping(&mut self, serial: Serial) {
        self.log.borrow_mut().pings.push(serial);
    }
}
