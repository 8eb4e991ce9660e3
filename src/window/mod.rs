//! Windows as seen by the compositing pipeline.
//!
//! Client surfaces are external. The pipeline keeps an arena of [`WindowEntry`] in stacking order,
//! each holding the live surface and an [`EffectWindow`] snapshot that effects read. A closed
//! window stays in the arena while effects hold references to it, painted from its last snapshot.

use std::fmt;

use bitflags::bitflags;
use smithay::utils::{Logical, Point, Rectangle, Serial};

use crate::seat::SurfaceEvent;
use crate::utils::id::IdCounter;
use crate::utils::region::{size_rect, Region};

mod ping;
mod surface;

pub use ping::{PingTracker, Pong};
pub use surface::{StaticSurface, SurfaceLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(u32);

static WINDOW_ID_COUNTER: IdCounter = IdCounter::new();

impl WindowId {
    fn next() -> Self {
        Self(WINDOW_ID_COUNTER.next())
    }

    pub fn get(self) -> u32 {
        self.0
    }

    #[cfg(test)]
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window-{}", self.0)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WindowFlags: u32 {
        const NORMAL = 1;
        const DOCK = 1 << 1;
        const DESKTOP = 1 << 2;
        const FULLSCREEN = 1 << 3;
        const MINIMIZED = 1 << 4;
        /// Notifications, on-screen displays and other shell surfaces.
        const SPECIAL = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceRole {
    Toplevel,
    Popup,
    Layer,
    Cursor,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleError {
    /// The surface already has a different role.
    AlreadyHasRole {
        current: SurfaceRole,
        requested: SurfaceRole,
    },
    NoSuchWindow,
}

impl fmt::Display for RoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleError::AlreadyHasRole { current, requested } => {
                write!(f, "surface already has role {current:?}, cannot become {requested:?}")
            }
            RoleError::NoSuchWindow => f.write_str("no such window"),
        }
    }
}

impl std::error::Error for RoleError {}

/// A client-owned drawable.
///
/// Regions and rectangles other than [`Surface::geometry`] are relative to the window origin.
pub trait Surface: fmt::Debug {
    /// Frame geometry in global logical coordinates.
    fn geometry(&self) -> Rectangle<i32, Logical>;

    fn shape(&self) -> Region {
        Region::from_rect(size_rect(self.geometry().size))
    }

    fn opaque_region(&self) -> Region {
        Region::new()
    }

    fn contents_rect(&self) -> Rectangle<i32, Logical> {
        size_rect(self.geometry().size)
    }

    /// Area inside the server-side decoration.
    fn decoration_inner_rect(&self) -> Rectangle<i32, Logical> {
        self.contents_rect()
    }

    /// Pixels changed since the last call. Calling this clears the damage.
    fn take_damage(&mut self) -> Region;

    fn opacity(&self) -> f64 {
        1.
    }

    fn flags(&self) -> WindowFlags {
        WindowFlags::NORMAL
    }

    fn decoration_has_alpha(&self) -> bool {
        false
    }

    /// Blur-behind region the decoration asks for, if the decoration supports blur.
    fn decoration_blur_region(&self) -> Option<Region> {
        None
    }

    /// Blur-behind region set by the client, relative to the contents rect.
    ///
    /// `Some` with an empty region asks for the whole window.
    fn blur_region(&self) -> Option<Region> {
        None
    }

    fn caption(&self) -> String {
        String::new()
    }

    fn icon(&self) -> Option<String> {
        None
    }

    /// Virtual desktop, or `None` when on all desktops.
    fn desktop(&self) -> Option<u32> {
        None
    }

    fn transient_for(&self) -> Option<WindowId> {
        None
    }

    /// Input reaching this surface.
    fn deliver(&mut self, _event: &SurfaceEvent) {}

    fn ping(&mut self, _serial: Serial) {}
}

/// Snapshot of a window, taken whenever the surface commits.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectWindow {
    pub id: WindowId,
    pub geometry: Rectangle<i32, Logical>,
    pub shape: Region,
    pub opaque: Region,
    pub contents: Rectangle<i32, Logical>,
    pub decoration_inner: Rectangle<i32, Logical>,
    pub opacity: f64,
    pub flags: WindowFlags,
    pub decoration_has_alpha: bool,
    pub decoration_blur: Option<Region>,
    pub blur_region: Option<Region>,
    pub caption: String,
    pub icon: Option<String>,
    pub desktop: Option<u32>,
    pub transient_for: Option<WindowId>,
    /// Set by an effect to keep blur behind the window while it is transformed.
    pub force_blur: bool,
    /// The client is gone and the window is only kept for effects.
    pub deleted: bool,
}

impl EffectWindow {
    fn from_surface(id: WindowId, surface: &dyn Surface) -> Self {
        let mut window = Self {
            id,
            geometry: surface.geometry(),
            shape: Region::new(),
            opaque: Region::new(),
            contents: Rectangle::default(),
            decoration_inner: Rectangle::default(),
            opacity: 1.,
            flags: WindowFlags::empty(),
            decoration_has_alpha: false,
            decoration_blur: None,
            blur_region: None,
            caption: String::new(),
            icon: None,
            desktop: None,
            transient_for: None,
            force_blur: false,
            deleted: false,
        };
        window.update(surface);
        window
    }

    fn update(&mut self, surface: &dyn Surface) {
        self.geometry = surface.geometry();
        self.shape = surface.shape();
        // Opaque region never exceeds the shape.
        self.opaque = surface.opaque_region().intersected(&self.shape);
        self.contents = surface.contents_rect();
        self.decoration_inner = surface.decoration_inner_rect();
        self.opacity = surface.opacity().clamp(0., 1.);
        self.flags = surface.flags();
        self.decoration_has_alpha = surface.decoration_has_alpha();
        self.decoration_blur = surface.decoration_blur_region();
        self.blur_region = surface.blur_region();
        self.caption = surface.caption();
        self.icon = surface.icon();
        self.desktop = surface.desktop();
        self.transient_for = surface.transient_for();
    }

    pub fn pos(&self) -> Point<i32, Logical> {
        self.geometry.loc
    }

    /// Window rectangle relative to its own origin.
    pub fn rect(&self) -> Rectangle<i32, Logical> {
        size_rect(self.geometry.size)
    }

    /// Whether any part of the shape lets what is below show through.
    pub fn has_alpha(&self) -> bool {
        !self.opaque.contains(&self.shape)
    }

    pub fn has_decoration(&self) -> bool {
        self.decoration_inner != self.rect()
    }

    pub fn is_dock(&self) -> bool {
        self.flags.contains(WindowFlags::DOCK)
    }

    pub fn is_desktop(&self) -> bool {
        self.flags.contains(WindowFlags::DESKTOP)
    }

    pub fn is_fullscreen(&self) -> bool {
        self.flags.contains(WindowFlags::FULLSCREEN)
    }

    pub fn is_minimized(&self) -> bool {
        self.flags.contains(WindowFlags::MINIMIZED)
    }

    pub fn is_special(&self) -> bool {
        self.flags.contains(WindowFlags::SPECIAL)
    }

    pub fn is_normal(&self) -> bool {
        self.flags.contains(WindowFlags::NORMAL)
    }

    pub fn is_on_desktop(&self, desktop: u32) -> bool {
        self.desktop.map_or(true, |d| d == desktop)
    }

    /// Whether the window takes part in painting at all.
    pub fn is_visible(&self) -> bool {
        !self.is_minimized() && !crate::utils::is_empty(self.geometry)
    }

    /// Global opaque region.
    pub fn global_opaque(&self) -> Region {
        self.opaque.translated(self.pos())
    }

    pub fn global_shape(&self) -> Region {
        self.shape.translated(self.pos())
    }
}

#[derive(Debug)]
pub struct WindowEntry {
    surface: Option<Box<dyn Surface>>,
    snapshot: EffectWindow,
    role: Option<SurfaceRole>,
    refs: u32,
    closed: bool,
}

impl WindowEntry {
    pub fn id(&self) -> WindowId {
        self.snapshot.id
    }

    pub fn window(&self) -> &EffectWindow {
        &self.snapshot
    }

    pub fn role(&self) -> Option<SurfaceRole> {
        self.role
    }

    pub fn refs(&self) -> u32 {
        self.refs
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn surface_mut(&mut self) -> Option<&mut (dyn Surface + 'static)> {
        self.surface.as_deref_mut()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Nothing references the window, it is gone.
    Deleted,
    /// Effects still reference the window.
    KeptAlive,
}

/// Windows in stacking order, bottom first.
#[derive(Debug, Default)]
pub struct Windows {
    entries: Vec<WindowEntry>,
}

impl Windows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, surface: Box<dyn Surface>) -> WindowId {
        let id = WindowId::next();
        let snapshot = EffectWindow::from_surface(id, surface.as_ref());
        debug!("adding {id} {:?} at {:?}", snapshot.caption, snapshot.geometry);
        self.entries.push(WindowEntry {
            surface: Some(surface),
            snapshot,
            role: None,
            refs: 0,
            closed: false,
        });
        id
    }

    pub fn assign_role(&mut self, id: WindowId, role: SurfaceRole) -> Result<(), RoleError> {
        let entry = self.entry_mut(id).ok_or(RoleError::NoSuchWindow)?;
        match entry.role {
            Some(current) if current != role => Err(RoleError::AlreadyHasRole {
                current,
                requested: role,
            }),
            _ => {
                entry.role = Some(role);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: WindowId) -> Option<&EffectWindow> {
        self.entry(id).map(|e| &e.snapshot)
    }

    pub fn entry(&self, id: WindowId) -> Option<&WindowEntry> {
        self.entries.iter().find(|e| e.snapshot.id == id)
    }

    pub fn entry_mut(&mut self, id: WindowId) -> Option<&mut WindowEntry> {
        self.entries.iter_mut().find(|e| e.snapshot.id == id)
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.entry(id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// All windows, deleted ones included, bottom first.
    pub fn stacking_order(&self) -> impl DoubleEndedIterator<Item = &EffectWindow> + '_ {
        self.entries.iter().map(|e| &e.snapshot)
    }

    pub fn ids(&self) -> Vec<WindowId> {
        self.entries.iter().map(|e| e.snapshot.id).collect()
    }

    /// Topmost live window under the point.
    pub fn window_at(&self, point: Point<f64, Logical>) -> Option<WindowId> {
        self.entries
            .iter()
            .rev()
            .filter(|e| !e.closed && e.snapshot.is_visible())
            .find(|e| {
                let local = point - e.snapshot.pos().to_f64();
                let local = Point::from((local.x.floor() as i32, local.y.floor() as i32));
                e.snapshot.shape.contains_point(local)
            })
            .map(|e| e.snapshot.id)
    }

    pub fn raise(&mut self, id: WindowId) {
        if let Some(idx) = self.entries.iter().position(|e| e.snapshot.id == id) {
            let entry = self.entries.remove(idx);
            self.entries.push(entry);
        }
    }

    /// Re-reads the surface, returning the damaged area in global coordinates.
    ///
    /// Moving or resizing damages both the old and the new geometry.
    pub fn refresh(&mut self, id: WindowId) -> Option<Region> {
        let entry = self.entry_mut(id)?;
        let surface = entry.surface.as_mut()?;

        let old = entry.snapshot.geometry;
        let old_opacity = entry.snapshot.opacity;
        let mut damage = surface.take_damage();
        entry.snapshot.update(surface.as_ref());

        let new = entry.snapshot.geometry;
        damage.translate(new.loc);
        if old != new || old_opacity != entry.snapshot.opacity {
            damage.add_rect(old);
            damage.add_rect(new);
        }
        Some(damage)
    }

    pub fn set_force_blur(&mut self, id: WindowId, force: bool) {
        if let Some(entry) = self.entry_mut(id) {
            entry.snapshot.force_blur = force;
        }
    }

    /// Takes a keep-alive reference on a window.
    pub fn ref_window(&mut self, id: WindowId) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.refs += 1;
                true
            }
            None => false,
        }
    }

    /// Drops a keep-alive reference. Returns the window if that deleted it.
    pub fn unref_window(&mut self, id: WindowId) -> Option<EffectWindow> {
        let idx = self.entries.iter().position(|e| e.snapshot.id == id)?;
        let entry = &mut self.entries[idx];
        if entry.refs == 0 {
            warn!("unbalanced unref of {id}");
            return None;
        }

        entry.refs -= 1;
        if entry.refs == 0 && entry.closed {
            let entry = self.entries.remove(idx);
            trace!("releasing {id}");
            return Some(entry.snapshot);
        }
        None
    }

    /// Marks the window closed and drops its surface.
    ///
    /// The caller must have given effects the chance to reference the window before this.
    pub fn close(&mut self, id: WindowId) -> Option<(CloseOutcome, EffectWindow)> {
        let idx = self.entries.iter().position(|e| e.snapshot.id == id)?;
        let entry = &mut self.entries[idx];
        if entry.closed {
            return None;
        }

        entry.closed = true;
        entry.surface = None;
        entry.snapshot.deleted = true;

        if entry.refs == 0 {
            let entry = self.entries.remove(idx);
            Some((CloseOutcome::Deleted, entry.snapshot))
        } else {
            debug!("keeping {id} alive for {} references", entry.refs);
            Some((CloseOutcome::KeptAlive, entry.snapshot.clone()))
        }
    }

    pub fn surface_mut(&mut self, id: WindowId) -> Option<&mut (dyn Surface + 'static)> {
        self.entry_mut(id).and_then(|e| e.surface_mut())
    }

    pub fn ping(&mut self, id: WindowId, serial: Serial) -> bool {
        match self.surface_mut(id) {
            Some(surface) => {
                surface.ping(serial);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::rect;

    fn surface(x: i32, y: i32) -> Box<StaticSurface> {
        Box::new(StaticSurface::new(rect(x, y, 100, 100)))
    }

    #[test]
    fn second_role_is_rejected() {
        let mut windows = Windows::new();
        let id = windows.add(surface(0, 0));
        windows.assign_role(id, SurfaceRole::Toplevel).unwrap();
        windows.assign_role(id, SurfaceRole::Toplevel).unwrap();
        assert_eq!(
            windows.assign_role(id, SurfaceRole::Popup),
            Err(RoleError::AlreadyHasRole {
                current: SurfaceRole::Toplevel,
                requested: SurfaceRole::Popup
            })
        );
        assert_eq!(windows.entry(id).unwrap().role(), Some(SurfaceRole::Toplevel));
    }

    #[test]
    fn keep_alive_references() {
        let mut windows = Windows::new();
        let id = windows.add(surface(0, 0));
        assert!(windows.ref_window(id));
        assert!(windows.ref_window(id));

        let (outcome, window) = windows.close(id).unwrap();
        assert_eq!(outcome, CloseOutcome::KeptAlive);
        assert!(window.deleted);
        assert!(windows.surface_mut(id).is_none());
        assert!(windows.contains(id));

        assert!(windows.unref_window(id).is_none());
        assert!(windows.unref_window(id).is_some());
        assert!(!windows.contains(id));
    }

    #[test]
    fn close_without_references_deletes() {
        let mut windows = Windows::new();
        let id = windows.add(surface(0, 0));
        let (outcome, _) = windows.close(id).unwrap();
        assert_eq!(outcome, CloseOutcome::Deleted);
        assert!(windows.is_empty());
        assert!(windows.close(id).is_none());
    }

    #[test]
    fn opaque_is_clipped_to_shape() {
        let mut s = StaticSurface::new(rect(0, 0, 100, 100));
        s.opaque = Region::from_rect(rect(50, 50, 100, 100));
        let mut windows = Windows::new();
        let id = windows.add(Box::new(s));
        assert_eq!(
            windows.get(id).unwrap().opaque,
            Region::from_rect(rect(50, 50, 50, 50))
        );
    }

    #[test]
    fn damage_is_taken_once() {
        let mut s = StaticSurface::new(rect(10, 10, 100, 100));
        s.damage = Region::from_rect(rect(0, 0, 5, 5));
        let mut windows = Windows::new();
        let id = windows.add(Box::new(s));

        let damage = windows.refresh(id).unwrap();
        assert_eq!(damage, Region::from_rect(rect(10, 10, 5, 5)));
        assert!(windows.refresh(id).unwrap().is_empty());
    }

    #[test]
    fn window_at_picks_topmost() {
        let mut windows = Windows::new();
        let a = windows.add(surface(0, 0));
        let b = windows.add(surface(50, 50));
        assert_eq!(windows.window_at(Point::from((60., 60.))), Some(b));
        assert_eq!(windows.window_at(Point::from((10., 10.))), Some(a));
        windows.raise(a);
        assert_eq!(windows.window_at(Point::from((60., 60.))), Some(a));
        assert_eq!(windows.window_at(Point::from((500., 10.))), None);
    }
}
