//! Cross-thread bridge between the UI side and the render side.
//!
//! All backend work happens on the render side. The UI side holds a
//! [`RenderHandle`] and [`PainterHandle`]s whose methods send a
//! [`RenderCommand`] and block on its reply, so they keep a synchronous call
//! contract. With [`ThreadingMode::SingleThreaded`] the same handles call
//! straight into the scheduler instead.

mod command;
mod handle;
mod local;
mod thread;

pub use command::RenderCommand;
pub use handle::{PainterHandle, RenderHandle};
pub use local::LocalRenderer;
pub use thread::RenderThread;

use crate::config::{RenderConfig, ThreadingMode};
use crate::errors::RenderError;
use crate::events::RenderEvent;
use crate::render::backend::RenderDevice;
use crate::render::create_device;
use tokio::sync::broadcast;

/// A running render side.
pub enum Renderer {
    Thread(RenderThread),
    Local(LocalRenderer),
}

impl Renderer {
    pub fn handle(&self) -> RenderHandle {
        match self {
            Renderer::Thread(t) => t.handle(),
            Renderer::Local(l) => l.handle(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RenderEvent> {
        match self {
            Renderer::Thread(t) => t.subscribe(),
            Renderer::Local(l) => l.subscribe(),
        }
    }

    pub fn shutdown(self) -> Result<(), RenderError> {
        match self {
            Renderer::Thread(t) => t.shutdown(),
            Renderer::Local(l) => l.shutdown(),
        }
    }
}

/// Starts rendering with `device`, on a dedicated thread or on the calling
/// thread depending on `config.threading`.
pub fn launch(config: RenderConfig, device: Box<dyn RenderDevice>) -> Result<Renderer, RenderError> {
    log::debug!("launching {} renderer ({:?})", device.name(), config.threading);
    match config.threading {
        ThreadingMode::Dedicated => Ok(Renderer::Thread(RenderThread::spawn(&config, device)?)),
        ThreadingMode::SingleThreaded => Ok(Renderer::Local(LocalRenderer::new(&config, device))),
    }
}

/// Starts rendering with the device `config.backend` names.
pub fn launch_default(config: RenderConfig) -> Result<Renderer, RenderError> {
    let device = create_device(config.backend);
    launch(config, device)
}
