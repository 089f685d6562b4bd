//! Backend independent drawing resources and their per-consumer realizations.
//!
//! A [`Resource`] describes a brush, gradient, bitmap or path. Every render
//! target that draws with it gets its own realization, created lazily by the
//! target's backend on first use and cached under the target's
//! [`ConsumerId`]. Parameter changes either patch the cached realizations in
//! place or force them to be recreated, depending on what changed.
//!
//! Applications use the typed wrappers ([`SolidBrush`], [`LinearGradient`],
//! [`Bitmap`], [`Path`]), which are cheap to clone and can be shared between
//! painters.

mod id_pool;
mod kind;
mod registry;
mod slots;

pub use id_pool::{ConsumerId, IdPool};
pub use kind::{GradientStop, NativeHandle, NativeResource, PathCommand, ResourceKind, ResourceTag};
pub use registry::ResourceRegistry;
pub use slots::{Slot, SlotLayout, SlotState, SlotStore};

use crate::errors::RenderError;
use crate::geometry::{Point, Rect};
use crate::render::backend::{RenderTarget, ResourceBackend};
use crate::render::Color;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use uuid::Uuid;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId(Uuid);

impl ResourceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A logical drawing resource plus its realization cache.
///
/// Lock order is `kind` before `slots`. The slot lock is held while a backend
/// creates or updates a realization, so realizations of one resource are never
/// built concurrently.
#[derive(Debug)]
pub struct Resource {
    id: ResourceId,
    kind: RwLock<ResourceKind>,
    slots: Mutex<SlotStore<NativeHandle>>,
}

impl Resource {
    pub fn new(kind: ResourceKind) -> Arc<Self> {
        Arc::new(Self {
            id: ResourceId::new(),
            kind: RwLock::new(kind),
            slots: Mutex::new(SlotStore::new()),
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn tag(&self) -> ResourceTag {
        self.kind().tag()
    }

    /// Current parameters.
    pub fn kind(&self) -> RwLockReadGuard<'_, ResourceKind> {
        self.kind.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Changes the parameters. Existing realizations are patched in place on
    /// their next use.
    pub fn update(&self, f: impl FnOnce(&mut ResourceKind)) {
        let mut kind = self.kind.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut kind);
        self.lock_slots().mark_dirty();
    }

    /// Changes the parameters structurally. Existing realizations are
    /// recreated on their next use.
    pub fn rebuild(&self, f: impl FnOnce(&mut ResourceKind)) {
        let mut kind = self.kind.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut kind);
        self.lock_slots().invalidate();
    }

    /// Marks every realization dirty without touching the parameters.
    pub fn needs_update(&self) {
        self.lock_slots().mark_dirty();
    }

    /// Forces every realization to be recreated on next use.
    pub fn invalidate(&self) {
        self.lock_slots().invalidate();
    }

    /// Returns the realization for the consumer behind `target`, creating or
    /// refreshing it through `backend` as needed.
    ///
    /// `first_touch` is set when the consumer starts holding this resource;
    /// it then takes a reference on the slot, which [`Resource::release`]
    /// gives back.
    pub fn realize<B>(
        &self,
        first_touch: bool,
        backend: &mut B,
        target: &mut dyn RenderTarget,
    ) -> Result<NativeHandle, RenderError>
    where
        B: ResourceBackend + ?Sized,
    {
        let id = target.consumer();
        let kind = self.kind();
        let mut slots = self.lock_slots();

        let cached = slots.get(id).map(|slot| (slot.value.clone(), slot.state));
        let (handle, replaced) = match cached {
            None => {
                let handle = backend.create(&kind, target)?;
                log::trace!("resource {}: created {} for consumer {id}", self.id, kind.tag());
                slots.set(id, handle.clone(), true)?;
                return Ok(handle);
            }
            Some((handle, SlotState::Fresh)) => (handle, None),
            Some((handle, SlotState::Dirty)) => {
                if backend.update(&kind, &handle, target)? {
                    slots.mark_fresh(id);
                    (handle, None)
                } else {
                    let fresh = backend.create(&kind, target)?;
                    let old = slots.set(id, fresh.clone(), false)?;
                    (fresh, old)
                }
            }
            Some((_, SlotState::Stale)) => {
                let fresh = backend.create(&kind, target)?;
                log::trace!("resource {}: recreated {} for consumer {id}", self.id, kind.tag());
                let old = slots.set(id, fresh.clone(), false)?;
                (fresh, old)
            }
        };

        if first_touch {
            slots.add_ref(id)?;
        }
        drop(slots);
        drop(replaced);
        Ok(handle)
    }

    /// Gives back one reference held by consumer `id`. The realization is
    /// dropped with the last reference.
    pub fn release(&self, id: ConsumerId) -> Result<(), RenderError> {
        let released = self.lock_slots().clear(id)?;
        if released.is_some() {
            log::trace!("resource {}: released realization of consumer {id}", self.id);
        }
        Ok(())
    }

    /// Drops every realization regardless of references.
    pub fn purge(&self) -> usize {
        let drained = self.lock_slots().drain();
        drained.len()
    }

    /// Cached realization for `id`, if any.
    pub fn cached(&self, id: ConsumerId) -> Option<NativeHandle> {
        self.lock_slots().get(id).map(|slot| slot.value.clone())
    }

    pub fn ref_count(&self, id: ConsumerId) -> u32 {
        self.lock_slots().get(id).map(|slot| slot.refs).unwrap_or(0)
    }

    pub fn slot_state(&self, id: ConsumerId) -> Option<SlotState> {
        self.lock_slots().get(id).map(|slot| slot.state)
    }

    pub fn realizations(&self) -> usize {
        self.lock_slots().len()
    }

    pub fn layout(&self) -> SlotLayout {
        self.lock_slots().layout()
    }

    fn lock_slots(&self) -> MutexGuard<'_, SlotStore<NativeHandle>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Access to the [`Resource`] behind a typed wrapper.
pub trait AsResource {
    fn resource(&self) -> &Arc<Resource>;
}

/// Resources that can fill or stroke geometry.
pub trait Brush: AsResource {}

macro_rules! typed_resource {
    ($name:ident) => {
        impl AsResource for $name {
            fn resource(&self) -> &Arc<Resource> {
                &self.inner
            }
        }
    };
}

#[derive(Debug, Clone)]
pub struct SolidBrush {
    inner: Arc<Resource>,
}

impl SolidBrush {
    pub fn new(color: Color) -> Self {
        Self {
            inner: Resource::new(ResourceKind::SolidBrush { color }),
        }
    }

    pub fn color(&self) -> Color {
        match &*self.inner.kind() {
            ResourceKind::SolidBrush { color } => *color,
            _ => Color::TRANSPARENT,
        }
    }

    pub fn set_color(&self, new: Color) {
        self.inner.update(|kind| {
            if let ResourceKind::SolidBrush { color } = kind {
                *color = new;
            }
        });
    }

    /// Scales the alpha of the current colour.
    pub fn set_opacity(&self, opacity: f32) {
        let color = self.color();
        self.set_color(Color::new(color.r, color.g, color.b, opacity.clamp(0.0, 1.0)));
    }
}

typed_resource!(SolidBrush);
impl Brush for SolidBrush {}

#[derive(Debug, Clone)]
pub struct LinearGradient {
    inner: Arc<Resource>,
}

impl LinearGradient {
    pub fn new(start: Point, end: Point, stops: Vec<GradientStop>) -> Self {
        Self {
            inner: Resource::new(ResourceKind::LinearGradient { start, end, stops }),
        }
    }

    /// Moves the gradient line. Realizations are patched in place.
    pub fn set_points(&self, new_start: Point, new_end: Point) {
        self.inner.update(|kind| {
            if let ResourceKind::LinearGradient { start, end, .. } = kind {
                *start = new_start;
                *end = new_end;
            }
        });
    }

    /// Replaces the colour stops. Realizations are recreated.
    pub fn set_stops(&self, new_stops: Vec<GradientStop>) {
        self.inner.rebuild(|kind| {
            if let ResourceKind::LinearGradient { stops, .. } = kind {
                *stops = new_stops;
            }
        });
    }
}

typed_resource!(LinearGradient);
impl Brush for LinearGradient {}

#[derive(Debug, Clone)]
pub struct Bitmap {
    inner: Arc<Resource>,
}

impl Bitmap {
    /// Creates a bitmap from tightly packed RGBA8 pixels.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, RenderError> {
        check_pixels(width, height, &pixels)?;
        Ok(Self {
            inner: Resource::new(ResourceKind::Bitmap { width, height, pixels }),
        })
    }

    pub fn size(&self) -> (u32, u32) {
        match &*self.inner.kind() {
            ResourceKind::Bitmap { width, height, .. } => (*width, *height),
            _ => (0, 0),
        }
    }

    /// Replaces the image. Same-sized images are uploaded into the existing
    /// realizations, anything else recreates them.
    pub fn set_pixels(&self, new_width: u32, new_height: u32, new_pixels: Vec<u8>) -> Result<(), RenderError> {
        check_pixels(new_width, new_height, &new_pixels)?;

        let apply = |kind: &mut ResourceKind| {
            if let ResourceKind::Bitmap { width, height, pixels } = kind {
                *width = new_width;
                *height = new_height;
                *pixels = new_pixels;
            }
        };

        if self.size() == (new_width, new_height) {
            self.inner.update(apply);
        } else {
            self.inner.rebuild(apply);
        }
        Ok(())
    }
}

fn check_pixels(width: u32, height: u32, pixels: &[u8]) -> Result<(), RenderError> {
    let expected = width as usize * height as usize * 4;
    if width == 0 || height == 0 || pixels.len() != expected {
        return Err(RenderError::InvalidResource(format!(
            "bitmap {width}x{height} needs {expected} bytes, got {}",
            pixels.len()
        )));
    }
    Ok(())
}

typed_resource!(Bitmap);

#[derive(Debug, Clone)]
pub struct Path {
    inner: Arc<Resource>,
}

impl Path {
    pub fn new(commands: Vec<PathCommand>) -> Self {
        Self {
            inner: Resource::new(ResourceKind::Path { commands }),
        }
    }

    pub fn rect(rect: Rect) -> Self {
        Self::new(vec![
            PathCommand::MoveTo(Point::new(rect.x, rect.y)),
            PathCommand::LineTo(Point::new(rect.x + rect.width, rect.y)),
            PathCommand::LineTo(Point::new(rect.x + rect.width, rect.y + rect.height)),
            PathCommand::LineTo(Point::new(rect.x, rect.y + rect.height)),
            PathCommand::Close,
        ])
    }

    pub fn commands(&self) -> Vec<PathCommand> {
        match &*self.inner.kind() {
            ResourceKind::Path { commands } => commands.clone(),
            _ => Vec::new(),
        }
    }

    /// Replaces the geometry. Realizations are recreated.
    pub fn set_commands(&self, new_commands: Vec<PathCommand>) {
        self.inner.rebuild(|kind| {
            if let ResourceKind::Path { commands } = kind {
                *commands = new_commands;
            }
        });
    }
}

typed_resource!(Path);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::{RenderDevice, WindowHandle};
    use crate::render::backends::null::NullDevice;

    fn two_targets(device: &mut NullDevice, ids: &mut IdPool) -> (Box<dyn RenderTarget>, Box<dyn RenderTarget>) {
        let a = device.create_target(WindowHandle(1), ids).unwrap().unwrap();
        let b = device.create_target(WindowHandle(2), ids).unwrap().unwrap();
        (a, b)
    }

    #[test]
    fn consumers_realize_independently() {
        let mut device = NullDevice::new();
        let probe = device.probe();
        let mut ids = IdPool::new();
        let (mut t1, mut t2) = two_targets(&mut device, &mut ids);
        assert_eq!((t1.consumer().get(), t2.consumer().get()), (1, 2));

        let brush = SolidBrush::new(Color::BLACK);
        let res = brush.resource();
        assert!(res.cached(t1.consumer()).is_none());
        assert!(res.cached(t2.consumer()).is_none());

        let h1 = res.realize(true, &mut device, t1.as_mut()).unwrap();
        let h2 = res.realize(true, &mut device, t2.as_mut()).unwrap();
        assert!(!h1.same(&h2));
        assert_eq!(res.ref_count(t1.consumer()), 1);
        assert_eq!(res.ref_count(t2.consumer()), 1);
        assert_eq!(probe.stats().resources_created, 2);

        res.release(t1.consumer()).unwrap();
        assert!(res.cached(t1.consumer()).is_none());
        let still = res.cached(t2.consumer()).unwrap();
        assert!(still.same(&h2));
        assert_eq!(res.ref_count(t2.consumer()), 1);

        drop(h1);
        assert_eq!(probe.stats().resources_dropped, 1);
    }

    #[test]
    fn cached_realization_is_reused() {
        let mut device = NullDevice::new();
        let probe = device.probe();
        let mut ids = IdPool::new();
        let mut target = device.create_target(WindowHandle(1), &mut ids).unwrap().unwrap();

        let path = Path::rect(Rect::new(0.0, 0.0, 4.0, 4.0));
        let first = path.resource().realize(true, &mut device, target.as_mut()).unwrap();
        let again = path.resource().realize(false, &mut device, target.as_mut()).unwrap();

        assert!(first.same(&again));
        assert_eq!(probe.stats().resources_created, 1);
        assert_eq!(path.resource().ref_count(target.consumer()), 1);
    }

    #[test]
    fn update_keeps_identity() {
        let mut device = NullDevice::new();
        let probe = device.probe();
        let mut ids = IdPool::new();
        let mut target = device.create_target(WindowHandle(1), &mut ids).unwrap().unwrap();

        let brush = SolidBrush::new(Color::BLACK);
        let before = brush.resource().realize(true, &mut device, target.as_mut()).unwrap();

        brush.set_color(Color::WHITE);
        assert_eq!(brush.resource().slot_state(target.consumer()), Some(SlotState::Dirty));

        let after = brush.resource().realize(false, &mut device, target.as_mut()).unwrap();
        assert!(before.same(&after));
        assert_eq!(brush.resource().slot_state(target.consumer()), Some(SlotState::Fresh));
        assert_eq!(probe.stats().resources_updated, 1);
        assert_eq!(probe.stats().resources_created, 1);
    }

    #[test]
    fn structural_change_recreates() {
        let mut device = NullDevice::new();
        let probe = device.probe();
        let mut ids = IdPool::new();
        let mut target = device.create_target(WindowHandle(1), &mut ids).unwrap().unwrap();

        let path = Path::new(vec![PathCommand::MoveTo(Point::new(0.0, 0.0))]);
        let before = path.resource().realize(true, &mut device, target.as_mut()).unwrap();

        path.set_commands(vec![PathCommand::MoveTo(Point::new(1.0, 1.0)), PathCommand::Close]);
        let after = path.resource().realize(false, &mut device, target.as_mut()).unwrap();

        assert!(!before.same(&after));
        assert_eq!(path.resource().ref_count(target.consumer()), 1);
        drop(before);
        assert_eq!(probe.stats().resources_dropped, 1);
    }

    #[test]
    fn backend_can_refuse_in_place_update() {
        let mut device = NullDevice::new().with_in_place_updates(false);
        let mut ids = IdPool::new();
        let mut target = device.create_target(WindowHandle(1), &mut ids).unwrap().unwrap();

        let brush = SolidBrush::new(Color::BLACK);
        let before = brush.resource().realize(true, &mut device, target.as_mut()).unwrap();
        brush.set_opacity(0.5);
        let after = brush.resource().realize(false, &mut device, target.as_mut()).unwrap();

        assert!(!before.same(&after));
        assert_eq!(brush.resource().ref_count(target.consumer()), 1);
    }

    #[test]
    fn shared_consumer_takes_extra_reference() {
        let mut device = NullDevice::new();
        let mut ids = IdPool::new();
        let mut target = device.create_target(WindowHandle(1), &mut ids).unwrap().unwrap();

        let brush = SolidBrush::new(Color::BLACK);
        brush.resource().realize(true, &mut device, target.as_mut()).unwrap();
        brush.resource().realize(true, &mut device, target.as_mut()).unwrap();
        assert_eq!(brush.resource().ref_count(target.consumer()), 2);

        brush.resource().release(target.consumer()).unwrap();
        assert!(brush.resource().cached(target.consumer()).is_some());
        brush.resource().release(target.consumer()).unwrap();
        assert!(brush.resource().cached(target.consumer()).is_none());
        assert!(matches!(
            brush.resource().release(target.consumer()),
            Err(RenderError::RefCountUnderflow(_))
        ));
    }

    #[test]
    fn bitmap_pixels_are_validated() {
        assert!(matches!(Bitmap::new(2, 2, vec![0; 3]), Err(RenderError::InvalidResource(_))));

        let bitmap = Bitmap::new(1, 1, vec![0, 0, 0, 255]).unwrap();
        assert!(bitmap.set_pixels(2, 1, vec![0; 4]).is_err());
        bitmap.set_pixels(2, 1, vec![0; 8]).unwrap();
        assert_eq!(bitmap.size(), (2, 1));
    }

    #[test]
    fn purge_drops_everything() {
        let mut device = NullDevice::new();
        let probe = device.probe();
        let mut ids = IdPool::new();
        let (mut t1, mut t2) = two_targets(&mut device, &mut ids);

        let gradient = LinearGradient::new(
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            vec![GradientStop::new(0.0, Color::BLACK), GradientStop::new(1.0, Color::WHITE)],
        );
        gradient.resource().realize(true, &mut device, t1.as_mut()).unwrap();
        gradient.resource().realize(true, &mut device, t2.as_mut()).unwrap();

        assert_eq!(gradient.resource().purge(), 2);
        assert_eq!(gradient.resource().realizations(), 0);
        assert_eq!(probe.stats().resources_dropped, 2);
    }
}
