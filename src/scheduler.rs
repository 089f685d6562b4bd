//! Render scheduler.
//!
//! The [`Scheduler`] owns every painter and the [`RenderContext`] they render
//! with. Painters that asked for another frame (continuous painters) are
//! serviced once per pass, in the order they became continuous. The render
//! thread runs passes until no painter is ready and then sleeps on the wake
//! event; see [`bridge`](crate::bridge).

use crate::bridge::RenderCommand;
use crate::config::RenderConfig;
use crate::errors::RenderError;
use crate::events::RenderEvent;
use crate::painter::{Painter, PainterId, RenderFn};
use crate::render::backend::{RenderDevice, SurfaceSize, WindowHandle};
use crate::render::Color;
use crate::resource::{IdPool, ResourceRegistry};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, Notify};

/// Everything painters need from the render side while they work.
pub struct RenderContext {
    pub(crate) device: Box<dyn RenderDevice>,
    pub(crate) ids: IdPool,
    pub(crate) registry: ResourceRegistry,
    pub(crate) wake: Arc<Notify>,
    pub(crate) wait_for_vsync: bool,
    events: broadcast::Sender<RenderEvent>,
}

impl RenderContext {
    pub fn new(device: Box<dyn RenderDevice>, wait_for_vsync: bool, events: broadcast::Sender<RenderEvent>) -> Self {
        Self {
            device,
            ids: IdPool::new(),
            registry: ResourceRegistry::new(),
            wake: Arc::new(Notify::new()),
            wait_for_vsync,
            events,
        }
    }

    pub fn device(&self) -> &dyn RenderDevice {
        self.device.as_ref()
    }

    pub fn ids(&self) -> &IdPool {
        &self.ids
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub(crate) fn emit(&self, event: RenderEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

pub struct Scheduler {
    ctx: RenderContext,
    painters: HashMap<PainterId, Arc<Mutex<Painter>>>,
    /// Continuous painters, in the order they became continuous
    active: Vec<PainterId>,
    background: Color,
    started: bool,
    exiting: bool,
}

impl Scheduler {
    pub fn new(config: &RenderConfig, device: Box<dyn RenderDevice>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            ctx: RenderContext::new(device, config.wait_for_vsync, events),
            painters: HashMap::new(),
            active: Vec::new(),
            background: config.background,
            started: false,
            exiting: false,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RenderEvent> {
        self.ctx.events.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<RenderEvent> {
        self.ctx.events.clone()
    }

    /// Event the render loop sleeps on while no painter is ready.
    pub fn wake_handle(&self) -> Arc<Notify> {
        self.ctx.wake.clone()
    }

    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    pub fn start(&mut self) {
        if !self.started {
            self.started = true;
            log::debug!("scheduler started on {}", self.ctx.device.name());
            self.ctx.emit(RenderEvent::SchedulerStarted);
        }
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting
    }

    pub fn create_painter(&mut self, callback: RenderFn, background: Option<Color>) -> PainterId {
        let id = PainterId::new();
        let painter = Painter::new(id, callback, background.unwrap_or(self.background));
        self.painters.insert(id, Arc::new(Mutex::new(painter)));
        id
    }

    pub fn painter(&self, id: PainterId) -> Result<Arc<Mutex<Painter>>, RenderError> {
        self.painters.get(&id).cloned().ok_or(RenderError::PainterNotFound(id))
    }

    pub fn painter_count(&self) -> usize {
        self.painters.len()
    }

    /// Continuous painters in service order.
    pub fn active(&self) -> &[PainterId] {
        &self.active
    }

    pub fn attach(&mut self, id: PainterId, window: WindowHandle) -> Result<bool, RenderError> {
        self.with_painter(id, |painter, ctx| painter.attach(ctx, window))
    }

    pub fn detach(&mut self, id: PainterId) -> Result<(), RenderError> {
        self.with_painter(id, |painter, ctx| {
            painter.detach(ctx);
            Ok(())
        })
    }

    pub fn resize(&mut self, id: PainterId, size: SurfaceSize, scale: f32) -> Result<(), RenderError> {
        self.with_painter(id, |painter, ctx| painter.resize(ctx, size, scale))
    }

    pub fn repaint(&mut self, id: PainterId) -> Result<bool, RenderError> {
        self.with_painter(id, |painter, ctx| painter.repaint(ctx))
    }

    pub fn expose(&mut self, id: PainterId) -> Result<(), RenderError> {
        self.with_painter(id, |painter, ctx| painter.expose(ctx))
    }

    pub fn set_background(&mut self, id: PainterId, color: Color) -> Result<(), RenderError> {
        self.with_painter(id, |painter, _| {
            painter.set_background(color);
            Ok(())
        })
    }

    /// Detaches the painter and forgets it.
    pub fn destroy_painter(&mut self, id: PainterId) -> Result<(), RenderError> {
        self.detach(id)?;
        self.painters.remove(&id);
        self.active.retain(|p| *p != id);
        log::debug!("painter {id}: destroyed");
        Ok(())
    }

    /// Snapshot of the continuous painters that can render a frame now.
    pub fn collect_ready(&self) -> Vec<(PainterId, Arc<Mutex<Painter>>)> {
        self.active
            .iter()
            .filter_map(|id| {
                let painter = self.painters.get(id)?;
                let guard = lock(painter);
                (guard.is_continuous() && guard.ready()).then(|| (*id, painter.clone()))
            })
            .collect()
    }

    pub fn has_work(&self) -> bool {
        !self.collect_ready().is_empty()
    }

    /// Renders one frame of a snapshotted painter. Errors are logged and
    /// published, never returned. Returns `false` if the painter was no
    /// longer ready.
    pub fn service(&mut self, id: PainterId, painter: &Arc<Mutex<Painter>>) -> bool {
        let mut guard = lock(painter);
        if !self.painters.contains_key(&id) || !guard.is_continuous() || !guard.ready() {
            return false;
        }

        match guard.render_frame(&mut self.ctx, false) {
            Ok(_) => {}
            Err(RenderError::PresentFailed(_)) => {}
            Err(e) => {
                log::error!("painter {id}: render failed: {e}");
                self.ctx.emit(RenderEvent::RenderFailed {
                    painter: id,
                    error: e.to_string(),
                });
            }
        }

        let continuous = guard.is_continuous();
        drop(guard);
        self.sync_active(id, continuous);
        true
    }

    /// Services every ready continuous painter once. Returns how many were
    /// serviced.
    pub fn run_pass(&mut self) -> usize {
        let mut serviced = 0;
        for (id, painter) in self.collect_ready() {
            if self.service(id, &painter) {
                serviced += 1;
            }
        }
        serviced
    }

    /// Detaches every painter and drops all realizations. Idempotent.
    pub fn shutdown(&mut self) {
        if self.exiting {
            return;
        }
        self.exiting = true;

        for (_, painter) in self.painters.drain() {
            lock(&painter).detach(&mut self.ctx);
        }
        self.active.clear();

        let purged = self.ctx.registry.purge_all();
        log::debug!("scheduler stopped, purged {purged} realizations");
        self.ctx.emit(RenderEvent::SchedulerStopped);
    }

    /// Runs one bridge command. Returns `false` once the scheduler shut down.
    pub fn execute(&mut self, cmd: RenderCommand) -> bool {
        match cmd {
            RenderCommand::CreatePainter { callback, background, reply } => {
                let _ = reply.send(self.create_painter(callback, background));
            }
            RenderCommand::Attach { painter, window, reply } => {
                let _ = reply.send(self.attach(painter, window));
            }
            RenderCommand::Detach { painter, reply } => {
                let _ = reply.send(self.detach(painter));
            }
            RenderCommand::Resize { painter, size, scale, reply } => {
                let _ = reply.send(self.resize(painter, size, scale));
            }
            RenderCommand::Repaint { painter, reply } => {
                let _ = reply.send(self.repaint(painter));
            }
            RenderCommand::Expose { painter, reply } => {
                let _ = reply.send(self.expose(painter));
            }
            RenderCommand::SetBackground { painter, color, reply } => {
                let _ = reply.send(self.set_background(painter, color));
            }
            RenderCommand::DestroyPainter { painter, reply } => {
                let result = self.destroy_painter(painter);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            log::debug!("destroying painter {painter}: {e}");
                        }
                    }
                }
            }
            RenderCommand::Shutdown { reply } => {
                self.shutdown();
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
                return false;
            }
        }
        !self.exiting
    }

    fn with_painter<T>(
        &mut self,
        id: PainterId,
        f: impl FnOnce(&mut Painter, &mut RenderContext) -> Result<T, RenderError>,
    ) -> Result<T, RenderError> {
        let painter = self.painter(id)?;
        let mut guard = lock(&painter);
        let result = f(&mut guard, &mut self.ctx);
        let continuous = guard.is_continuous();
        drop(guard);

        self.sync_active(id, continuous);
        result
    }

    fn sync_active(&mut self, id: PainterId, continuous: bool) {
        let registered = self.active.contains(&id);
        if continuous && !registered {
            self.active.push(id);
            self.ctx.wake.notify_one();
        } else if !continuous && registered {
            self.active.retain(|p| *p != id);
        } else {
            return;
        }
        log::trace!("painter {id}: continuous = {continuous}");
        self.ctx.emit(RenderEvent::ContinuousChanged { painter: id, continuous });
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock(painter: &Mutex<Painter>) -> MutexGuard<'_, Painter> {
    painter.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::render::backend::PresentStatus;
    use crate::render::backends::null::{NullDevice, NullProbe};
    use crate::resource::{AsResource, SolidBrush};
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scheduler() -> (Scheduler, NullProbe) {
        let _ = env_logger::builder().is_test(true).try_init();
        let device = NullDevice::new();
        let probe = device.probe();
        let config = RenderConfig::builder().wait_for_vsync(false).build().unwrap();
        (Scheduler::new(&config, Box::new(device)), probe)
    }

    fn drain(rx: &mut broadcast::Receiver<RenderEvent>) -> Vec<RenderEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn continuous_painter_stops_after_returning_false() {
        let (mut scheduler, _probe) = scheduler();
        let mut events = scheduler.subscribe();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let id = scheduler.create_painter(
            Box::new(move |_, _| Ok(counter.fetch_add(1, Ordering::SeqCst) < 3)),
            None,
        );
        assert!(scheduler.attach(id, WindowHandle(1)).unwrap());

        assert!(scheduler.repaint(id).unwrap());
        assert_eq!(scheduler.active(), &[id]);

        assert_eq!(scheduler.run_pass(), 1);
        assert_eq!(scheduler.run_pass(), 1);
        assert_eq!(scheduler.run_pass(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(scheduler.active().is_empty());

        assert_eq!(scheduler.run_pass(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let changes: Vec<bool> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                RenderEvent::ContinuousChanged { continuous, .. } => Some(continuous),
                _ => None,
            })
            .collect();
        assert_eq!(changes, vec![true, false]);
    }

    #[test]
    fn repaint_of_continuous_painter_is_only_a_hint() {
        let (mut scheduler, _probe) = scheduler();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let id = scheduler.create_painter(
            Box::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }),
            None,
        );
        scheduler.attach(id, WindowHandle(1)).unwrap();

        scheduler.repaint(id).unwrap();
        scheduler.repaint(id).unwrap();
        scheduler.repaint(id).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn painters_are_serviced_in_registration_order() {
        let (mut scheduler, _probe) = scheduler();
        let order = Arc::new(Mutex::new(Vec::new()));

        let ids: Vec<PainterId> = (0..3)
            .map(|n| {
                let order = order.clone();
                let id = scheduler.create_painter(
                    Box::new(move |_, _| {
                        order.lock().unwrap().push(n);
                        Ok(true)
                    }),
                    None,
                );
                scheduler.attach(id, WindowHandle(n)).unwrap();
                id
            })
            .collect();

        for id in [ids[2], ids[0], ids[1]] {
            scheduler.repaint(id).unwrap();
        }
        order.lock().unwrap().clear();

        assert_eq!(scheduler.run_pass(), 3);
        assert_eq!(*order.lock().unwrap(), vec![2, 0, 1]);
    }

    #[test]
    fn recreate_rebuilds_only_the_affected_consumer() {
        let (mut scheduler, probe) = scheduler();
        let brush = SolidBrush::new(Color::BLACK);

        let draw = |brush: SolidBrush| -> RenderFn {
            Box::new(move |_, g| {
                g.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), &brush)?;
                Ok(false)
            })
        };
        let first = scheduler.create_painter(draw(brush.clone()), None);
        let second = scheduler.create_painter(draw(brush.clone()), None);
        scheduler.attach(first, WindowHandle(1)).unwrap();
        scheduler.attach(second, WindowHandle(2)).unwrap();
        scheduler.repaint(first).unwrap();
        scheduler.repaint(second).unwrap();

        let consumer = |id: PainterId, s: &Scheduler| {
            s.painter(id).unwrap().lock().unwrap().target().unwrap().consumer()
        };
        let (c1, c2) = (consumer(first, &scheduler), consumer(second, &scheduler));
        let old_first = brush.resource().cached(c1).unwrap();
        let old_second = brush.resource().cached(c2).unwrap();

        probe.script_presents(WindowHandle(1), [PresentStatus::Recreate]);
        assert!(scheduler.repaint(first).unwrap());
        assert_eq!(probe.stats().targets_destroyed, 1);

        let new_c1 = consumer(first, &scheduler);
        assert!(brush.resource().cached(new_c1).is_none());
        assert!(brush.resource().cached(c2).unwrap().same(&old_second));

        // the painter renders again on the next pass with a fresh realization
        assert_eq!(scheduler.run_pass(), 1);
        let new_first = brush.resource().cached(new_c1).unwrap();
        assert!(!new_first.same(&old_first));
        assert!(brush.resource().cached(c2).unwrap().same(&old_second));
        assert!(scheduler.active().is_empty());
    }

    #[test]
    fn failed_present_detaches_the_painter() {
        let (mut scheduler, probe) = scheduler();
        let mut events = scheduler.subscribe();
        let id = scheduler.create_painter(Box::new(|_, _| Ok(true)), None);
        scheduler.attach(id, WindowHandle(9)).unwrap();

        probe.script_presents(WindowHandle(9), [PresentStatus::Failure]);
        let err = scheduler.repaint(id).unwrap_err();
        assert!(matches!(err, RenderError::PresentFailed(p) if p == id));

        let painter = scheduler.painter(id).unwrap();
        assert!(!painter.lock().unwrap().is_attached());
        assert!(scheduler.active().is_empty());
        assert_eq!(scheduler.context().ids().live(), 0);
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, RenderEvent::PainterFailed { painter, .. } if *painter == id)));
    }

    #[test]
    fn callback_errors_do_not_stop_other_painters() {
        let (mut scheduler, _probe) = scheduler();
        let mut events = scheduler.subscribe();

        let failures = Arc::new(AtomicUsize::new(0));
        let counter = failures.clone();
        let broken = scheduler.create_painter(
            Box::new(move |_, _| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(true)
                } else {
                    Err(anyhow!("boom"))
                }
            }),
            None,
        );
        let panicking = scheduler.create_painter(
            Box::new({
                let mut first = true;
                move |_, _| {
                    if std::mem::take(&mut first) {
                        return Ok(true);
                    }
                    panic!("callback panicked");
                }
            }),
            None,
        );
        let healthy_calls = Arc::new(AtomicUsize::new(0));
        let counter = healthy_calls.clone();
        let healthy = scheduler.create_painter(
            Box::new(move |_, _| Ok(counter.fetch_add(1, Ordering::SeqCst) < 2)),
            None,
        );

        for (n, id) in [broken, panicking, healthy].into_iter().enumerate() {
            scheduler.attach(id, WindowHandle(n as u64)).unwrap();
            scheduler.repaint(id).unwrap();
        }

        assert_eq!(scheduler.run_pass(), 3);
        assert_eq!(scheduler.active(), &[broken, panicking, healthy]);

        // failing painters keep their slot and are retried every pass
        assert_eq!(scheduler.run_pass(), 3);
        assert_eq!(scheduler.active(), &[broken, panicking]);
        assert_eq!(healthy_calls.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.run_pass(), 2);

        let failed: Vec<PainterId> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                RenderEvent::RenderFailed { painter, .. } => Some(painter),
                _ => None,
            })
            .collect();
        assert_eq!(failed, vec![broken, panicking, broken, panicking, broken, panicking]);
        assert_eq!(failures.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn refused_recreate_leaves_continuous_mode() {
        let (mut scheduler, probe) = scheduler();
        let mut events = scheduler.subscribe();
        let window = WindowHandle(1);
        let id = scheduler.create_painter(Box::new(|_, _| Ok(true)), None);
        scheduler.attach(id, window).unwrap();

        probe.script_presents(window, [PresentStatus::Recreate]);
        probe.refuse_window(window);
        assert!(!scheduler.repaint(id).unwrap());

        {
            let painter = scheduler.painter(id).unwrap();
            let painter = painter.lock().unwrap();
            assert!(!painter.is_attached());
            assert!(!painter.is_continuous());
        }
        assert!(scheduler.active().is_empty());
        assert_eq!(scheduler.context().ids().live(), 0);
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, RenderEvent::PainterDetached { painter } if *painter == id)));

        // attaching again does not resume rendering on its own
        probe.accept_window(window);
        assert!(scheduler.attach(id, window).unwrap());
        assert_eq!(scheduler.run_pass(), 0);
    }

    #[test]
    fn per_frame_resources_are_not_retained() {
        let (mut scheduler, probe) = scheduler();
        let id = scheduler.create_painter(
            Box::new(|_, g| {
                let scratch = SolidBrush::new(Color::WHITE);
                g.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), &scratch)?;
                Ok(true)
            }),
            None,
        );
        scheduler.attach(id, WindowHandle(1)).unwrap();
        scheduler.repaint(id).unwrap();

        for _ in 0..1000 {
            assert_eq!(scheduler.run_pass(), 1);
        }

        assert!(scheduler.context().registry().len() <= 64);
        let painter = scheduler.painter(id).unwrap();
        assert_eq!(painter.lock().unwrap().graphics_state().unwrap().attached(), 0);
        let stats = probe.stats();
        assert_eq!(stats.resources_created, 1001);
        assert_eq!(stats.resources_created, stats.resources_dropped);
    }

    #[test]
    fn unknown_painter_is_an_error() {
        let (mut scheduler, _probe) = scheduler();
        let ghost = PainterId::new();
        assert!(matches!(scheduler.repaint(ghost), Err(RenderError::PainterNotFound(_))));
        assert!(matches!(scheduler.destroy_painter(ghost), Err(RenderError::PainterNotFound(_))));
    }

    #[test]
    fn shutdown_releases_everything() {
        let (mut scheduler, probe) = scheduler();
        let mut events = scheduler.subscribe();
        let brush = SolidBrush::new(Color::WHITE);

        for n in 0..3 {
            let brush = brush.clone();
            let id = scheduler.create_painter(
                Box::new(move |_, g| {
                    g.fill_rect(Rect::new(0.0, 0.0, 2.0, 2.0), &brush)?;
                    Ok(true)
                }),
                None,
            );
            scheduler.attach(id, WindowHandle(n)).unwrap();
            scheduler.repaint(id).unwrap();
        }
        assert_eq!(brush.resource().realizations(), 3);

        scheduler.shutdown();
        scheduler.shutdown();

        assert_eq!(scheduler.painter_count(), 0);
        assert_eq!(brush.resource().realizations(), 0);
        assert_eq!(scheduler.context().ids().live(), 0);
        let stats = probe.stats();
        assert_eq!(stats.targets_created, stats.targets_destroyed);
        assert_eq!(stats.resources_created, stats.resources_dropped);

        let stopped = drain(&mut events)
            .into_iter()
            .filter(|e| *e == RenderEvent::SchedulerStopped)
            .count();
        assert_eq!(stopped, 1);
    }
}
