use crate::errors::RenderError;
use crate::render::backend::{DrawOp, PresentStatus, RenderDevice, RenderTarget, ResourceBackend, SurfaceSize, WindowHandle};
use crate::render::Color;
use crate::resource::{ConsumerId, IdPool, NativeHandle, NativeResource, ResourceKind, ResourceTag};
use anyhow::{anyhow, Result};
use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Null device that does not perform any rendering.
///
/// It realizes every resource kind, counts what it is asked to do, and can be
/// scripted through a [`NullProbe`] to refuse windows or report specific
/// present results.
pub struct NullDevice {
    probe: NullProbe,
    in_place_updates: bool,
    shared_context: bool,
    /// Consumer shared by all targets of a window, with its target count.
    contexts: HashMap<WindowHandle, (ConsumerId, usize)>,
}

impl NullDevice {
    /// Creates a new instance of the null device.
    pub fn new() -> Self {
        Self {
            probe: NullProbe::default(),
            in_place_updates: true,
            shared_context: false,
            contexts: HashMap::new(),
        }
    }

    /// When disabled, every resource update asks for a new realization.
    pub fn with_in_place_updates(mut self, on: bool) -> Self {
        self.in_place_updates = on;
        self
    }

    /// All targets created for the same window share one consumer identifier.
    pub fn with_shared_context(mut self) -> Self {
        self.shared_context = true;
        self
    }

    pub fn probe(&self) -> NullProbe {
        self.probe.clone()
    }

    fn allocate(&mut self, window: WindowHandle, ids: &mut IdPool) -> ConsumerId {
        if !self.shared_context {
            return ids.allocate();
        }
        let (id, count) = self.contexts.entry(window).or_insert_with(|| (ids.allocate(), 0));
        *count += 1;
        *id
    }

    fn free(&mut self, window: WindowHandle, id: ConsumerId, ids: &mut IdPool) {
        if self.shared_context {
            if let Some((_, count)) = self.contexts.get_mut(&window) {
                *count -= 1;
                if *count > 0 {
                    return;
                }
            }
            self.contexts.remove(&window);
        }
        ids.free(id);
    }
}

impl Default for NullDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceBackend for NullDevice {
    fn name(&self) -> &str {
        "NullDevice"
    }

    fn create(&mut self, kind: &ResourceKind, _target: &mut dyn RenderTarget) -> Result<NativeHandle, RenderError> {
        self.probe.shared.resources_created.fetch_add(1, Ordering::SeqCst);
        let native = NullResource {
            tag: kind.tag(),
            dropped: self.probe.shared.clone(),
        };
        Ok(NativeHandle::new(kind.tag(), Arc::new(native)))
    }

    fn update(&mut self, _kind: &ResourceKind, handle: &NativeHandle, _target: &mut dyn RenderTarget) -> Result<bool, RenderError> {
        if !self.in_place_updates {
            return Ok(false);
        }
        handle
            .downcast::<NullResource>()
            .ok_or_else(|| RenderError::Backend(anyhow!("NullDevice used with non-Null resource")))?;
        self.probe.shared.resources_updated.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

impl RenderDevice for NullDevice {
    fn create_target(&mut self, window: WindowHandle, ids: &mut IdPool) -> Result<Option<Box<dyn RenderTarget>>> {
        if self.probe.lock_script().refused.contains(&window) {
            log::debug!("NullDevice: refusing {window}");
            return Ok(None);
        }

        let consumer = self.allocate(window, ids);
        self.probe.shared.targets_created.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Box::new(NullTarget::new(window, consumer))))
    }

    fn resize_target(&mut self, target: &mut dyn RenderTarget, size: SurfaceSize, scale: f32) -> Result<()> {
        let t = target
            .as_any_mut()
            .downcast_mut::<NullTarget>()
            .ok_or_else(|| anyhow!("NullDevice used with non-Null target"))?;

        t.size = size;
        t.scale = scale;
        Ok(())
    }

    fn present_target(&mut self, target: &mut dyn RenderTarget, _wait_for_vsync: bool) -> PresentStatus {
        self.probe.shared.presents.fetch_add(1, Ordering::SeqCst);
        let window = target.window();
        self.probe
            .lock_script()
            .presents
            .get_mut(&window)
            .and_then(VecDeque::pop_front)
            .unwrap_or(PresentStatus::Success)
    }

    fn destroy_target(&mut self, target: Box<dyn RenderTarget>, ids: &mut IdPool) {
        self.probe.shared.targets_destroyed.fetch_add(1, Ordering::SeqCst);
        self.free(target.window(), target.consumer(), ids);
    }
}

pub struct NullTarget {
    window: WindowHandle,
    consumer: ConsumerId,
    /// Size of the target in pixels.
    size: SurfaceSize,
    scale: f32,
    /// Frame ID for the target, used to track rendering frames.
    frame_id: u64,
    draws: usize,
}

impl NullTarget {
    pub fn new(window: WindowHandle, consumer: ConsumerId) -> Self {
        Self {
            window,
            consumer,
            size: SurfaceSize::default(),
            scale: 1.0,
            frame_id: 0,
            draws: 0,
        }
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// Draw operations submitted during the last frame.
    pub fn draws(&self) -> usize {
        self.draws
    }
}

impl RenderTarget for NullTarget {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn window(&self) -> WindowHandle {
        self.window
    }
    fn consumer(&self) -> ConsumerId {
        self.consumer
    }
    fn size(&self) -> SurfaceSize {
        self.size
    }
    fn scale(&self) -> f32 {
        self.scale
    }

    fn begin_frame(&mut self, _background: Color) {
        self.frame_id = self.frame_id.wrapping_add(1);
        self.draws = 0;
    }

    fn draw(&mut self, _op: DrawOp<'_>) -> Result<()> {
        self.draws += 1;
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct NullResource {
    tag: ResourceTag,
    dropped: Arc<Shared>,
}

impl NullResource {
    pub fn tag(&self) -> ResourceTag {
        self.tag
    }
}

impl NativeResource for NullResource {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for NullResource {
    fn drop(&mut self) {
        self.dropped.resources_dropped.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counters of a [`NullDevice`] at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullStats {
    pub targets_created: usize,
    pub targets_destroyed: usize,
    pub resources_created: usize,
    pub resources_updated: usize,
    pub resources_dropped: usize,
    pub presents: usize,
}

#[derive(Debug, Default)]
struct Script {
    presents: HashMap<WindowHandle, VecDeque<PresentStatus>>,
    refused: HashSet<WindowHandle>,
}

#[derive(Debug, Default)]
struct Shared {
    targets_created: AtomicUsize,
    targets_destroyed: AtomicUsize,
    resources_created: AtomicUsize,
    resources_updated: AtomicUsize,
    resources_dropped: AtomicUsize,
    presents: AtomicUsize,
    script: Mutex<Script>,
}

/// Observes and scripts a [`NullDevice`], from any thread.
#[derive(Debug, Clone, Default)]
pub struct NullProbe {
    shared: Arc<Shared>,
}

impl NullProbe {
    pub fn stats(&self) -> NullStats {
        let s = &self.shared;
        NullStats {
            targets_created: s.targets_created.load(Ordering::SeqCst),
            targets_destroyed: s.targets_destroyed.load(Ordering::SeqCst),
            resources_created: s.resources_created.load(Ordering::SeqCst),
            resources_updated: s.resources_updated.load(Ordering::SeqCst),
            resources_dropped: s.resources_dropped.load(Ordering::SeqCst),
            presents: s.presents.load(Ordering::SeqCst),
        }
    }

    /// Queues present results for `window`. Once used up, presents succeed.
    pub fn script_presents(&self, window: WindowHandle, statuses: impl IntoIterator<Item = PresentStatus>) {
        self.lock_script().presents.entry(window).or_default().extend(statuses);
    }

    /// Makes target creation for `window` return `None`.
    pub fn refuse_window(&self, window: WindowHandle) {
        self.lock_script().refused.insert(window);
    }

    pub fn accept_window(&self, window: WindowHandle) {
        self.lock_script().refused.remove(&window);
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.shared.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_presents_run_out_to_success() {
        let mut device = NullDevice::new();
        let probe = device.probe();
        let mut ids = IdPool::new();
        let mut target = device.create_target(WindowHandle(7), &mut ids).unwrap().unwrap();

        probe.script_presents(WindowHandle(7), [PresentStatus::Recreate, PresentStatus::Failure]);
        assert_eq!(device.present_target(target.as_mut(), false), PresentStatus::Recreate);
        assert_eq!(device.present_target(target.as_mut(), false), PresentStatus::Failure);
        assert_eq!(device.present_target(target.as_mut(), false), PresentStatus::Success);
        assert_eq!(probe.stats().presents, 3);
    }

    #[test]
    fn refused_windows_get_no_target() {
        let mut device = NullDevice::new();
        let probe = device.probe();
        let mut ids = IdPool::new();

        probe.refuse_window(WindowHandle(1));
        assert!(device.create_target(WindowHandle(1), &mut ids).unwrap().is_none());
        assert_eq!(ids.live(), 0);

        probe.accept_window(WindowHandle(1));
        assert!(device.create_target(WindowHandle(1), &mut ids).unwrap().is_some());
    }

    #[test]
    fn shared_context_reuses_the_consumer_per_window() {
        let mut device = NullDevice::new().with_shared_context();
        let mut ids = IdPool::new();

        let a = device.create_target(WindowHandle(1), &mut ids).unwrap().unwrap();
        let b = device.create_target(WindowHandle(1), &mut ids).unwrap().unwrap();
        let c = device.create_target(WindowHandle(2), &mut ids).unwrap().unwrap();
        assert_eq!(a.consumer(), b.consumer());
        assert_ne!(a.consumer(), c.consumer());

        let shared = a.consumer();
        device.destroy_target(a, &mut ids);
        assert!(ids.is_allocated(shared));
        device.destroy_target(b, &mut ids);
        assert!(!ids.is_allocated(shared));
    }

    #[test]
    fn resize_reaches_the_target() {
        let mut device = NullDevice::new();
        let mut ids = IdPool::new();
        let mut target = device.create_target(WindowHandle(1), &mut ids).unwrap().unwrap();

        device.resize_target(target.as_mut(), SurfaceSize::new(640, 480), 2.0).unwrap();
        assert_eq!(target.size(), SurfaceSize::new(640, 480));
        assert_eq!(target.scale(), 2.0);
    }
}
