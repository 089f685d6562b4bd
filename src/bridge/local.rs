//! Single threaded renderer.
//!
//! UI and render work share the calling thread: bridge calls run directly on
//! the scheduler and the application drives continuous painters by calling
//! [`LocalRenderer::pump`] from its event loop.

use crate::bridge::{RenderCommand, RenderHandle};
use crate::config::RenderConfig;
use crate::errors::RenderError;
use crate::events::RenderEvent;
use crate::painter::PainterId;
use crate::render::backend::RenderDevice;
use crate::scheduler::Scheduler;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use tokio::sync::broadcast;

pub(crate) struct LocalShared {
    scheduler: Mutex<Scheduler>,
    /// Painters whose handles were dropped while the scheduler was busy
    deferred: Mutex<Vec<PainterId>>,
}

impl LocalShared {
    /// Runs `cmd` right away. A scheduler that is already busy means the
    /// call came from inside a render callback.
    pub(crate) fn execute(&self, cmd: RenderCommand) -> Result<(), RenderError> {
        let mut scheduler = self.try_lock()?;
        if scheduler.is_exiting() {
            return Err(RenderError::ChannelClosed);
        }
        scheduler.execute(cmd);
        Ok(())
    }

    pub(crate) fn release(&self, painter: PainterId) {
        match self.try_lock() {
            Ok(mut scheduler) => {
                if let Err(e) = scheduler.destroy_painter(painter) {
                    log::debug!("destroying painter {painter}: {e}");
                }
            }
            Err(_) => self.lock_deferred().push(painter),
        }
    }

    fn try_lock(&self) -> Result<MutexGuard<'_, Scheduler>, RenderError> {
        match self.scheduler.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => Err(RenderError::Reentrant),
        }
    }

    fn lock_deferred(&self) -> MutexGuard<'_, Vec<PainterId>> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct LocalRenderer {
    shared: Arc<LocalShared>,
    handle: RenderHandle,
}

impl LocalRenderer {
    pub fn new(config: &RenderConfig, device: Box<dyn RenderDevice>) -> Self {
        let mut scheduler = Scheduler::new(config, device);
        scheduler.start();
        let events = scheduler.event_sender();

        let shared = Arc::new(LocalShared {
            scheduler: Mutex::new(scheduler),
            deferred: Mutex::new(Vec::new()),
        });
        let handle = RenderHandle::local(shared.clone(), events);
        Self { shared, handle }
    }

    pub fn handle(&self) -> RenderHandle {
        self.handle.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RenderEvent> {
        self.handle.subscribe()
    }

    /// Runs one scheduler pass. Returns how many painters rendered a frame.
    pub fn pump(&self) -> Result<usize, RenderError> {
        let mut scheduler = self.shared.try_lock()?;

        let deferred: Vec<PainterId> = self.shared.lock_deferred().drain(..).collect();
        for painter in deferred {
            if let Err(e) = scheduler.destroy_painter(painter) {
                log::debug!("destroying painter {painter}: {e}");
            }
        }

        Ok(scheduler.run_pass())
    }

    /// Is any continuous painter ready for a frame?
    pub fn has_work(&self) -> bool {
        self.shared.try_lock().map(|s| s.has_work()).unwrap_or(false)
    }

    /// Access to the scheduler between passes.
    pub fn with_scheduler<T>(&self, f: impl FnOnce(&mut Scheduler) -> T) -> Result<T, RenderError> {
        let mut scheduler = self.shared.try_lock()?;
        Ok(f(&mut scheduler))
    }

    pub fn shutdown(self) -> Result<(), RenderError> {
        self.shared.try_lock()?.shutdown();
        Ok(())
    }
}

impl Drop for LocalRenderer {
    fn drop(&mut self) {
        if let Ok(mut scheduler) = self.shared.try_lock() {
            scheduler.shutdown();
        }
    }
}
