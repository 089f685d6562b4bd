use crate::bridge::local::LocalShared;
use crate::bridge::RenderCommand;
use crate::errors::RenderError;
use crate::events::RenderEvent;
use crate::geometry::Size;
use crate::painter::PainterId;
use crate::render::backend::{SurfaceSize, WindowHandle};
use crate::render::{Color, Graphics};
use std::sync::Arc;
use std::thread::ThreadId;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};

#[derive(Clone)]
enum Link {
    /// Render loop on its own thread
    Thread {
        cmd_tx: mpsc::Sender<RenderCommand>,
        render_thread: ThreadId,
    },
    /// Render work runs on the calling thread
    Local(Arc<LocalShared>),
}

/// Synchronous entry point into the render side.
///
/// Every call runs on the render side and blocks until it has completed
/// there; errors raised on the render side are returned to the caller.
/// Blocking calls must not be made from inside an async runtime, and calls
/// from the render side itself (e.g. a render callback) fail with
/// [`RenderError::Reentrant`].
#[derive(Clone)]
pub struct RenderHandle {
    link: Link,
    events: broadcast::Sender<RenderEvent>,
}

impl std::fmt::Debug for RenderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let link = match &self.link {
            Link::Thread { render_thread, .. } => format!("Thread({render_thread:?})"),
            Link::Local(_) => "Local".to_string(),
        };
        f.debug_struct("RenderHandle").field("link", &link).finish()
    }
}

impl RenderHandle {
    pub(crate) fn threaded(
        cmd_tx: mpsc::Sender<RenderCommand>,
        events: broadcast::Sender<RenderEvent>,
        render_thread: ThreadId,
    ) -> Self {
        Self {
            link: Link::Thread { cmd_tx, render_thread },
            events,
        }
    }

    pub(crate) fn local(shared: Arc<LocalShared>, events: broadcast::Sender<RenderEvent>) -> Self {
        Self {
            link: Link::Local(shared),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RenderEvent> {
        self.events.subscribe()
    }

    /// Creates a detached painter that renders with `callback`.
    pub fn create_painter<F>(&self, callback: F) -> Result<PainterHandle, RenderError>
    where
        F: FnMut(Size, &mut Graphics<'_>) -> anyhow::Result<bool> + Send + 'static,
    {
        self.spawn_painter(Box::new(callback), None)
    }

    /// Like [`RenderHandle::create_painter`], clearing frames to `background`.
    pub fn create_painter_with_background<F>(&self, callback: F, background: Color) -> Result<PainterHandle, RenderError>
    where
        F: FnMut(Size, &mut Graphics<'_>) -> anyhow::Result<bool> + Send + 'static,
    {
        self.spawn_painter(Box::new(callback), Some(background))
    }

    fn spawn_painter(
        &self,
        callback: crate::painter::RenderFn,
        background: Option<Color>,
    ) -> Result<PainterHandle, RenderError> {
        let id = self.request(|reply| RenderCommand::CreatePainter {
            callback,
            background,
            reply,
        })?;
        Ok(PainterHandle {
            id,
            renderer: self.clone(),
            released: false,
        })
    }

    /// Stops the render side: every painter is detached and all realizations
    /// are dropped.
    pub fn shutdown(&self) -> Result<(), RenderError> {
        self.request(|reply| RenderCommand::Shutdown { reply: Some(reply) })
    }

    /// Is the caller on the render thread?
    pub fn is_render_thread(&self) -> bool {
        match &self.link {
            Link::Thread { render_thread, .. } => std::thread::current().id() == *render_thread,
            Link::Local(_) => false,
        }
    }

    /// Runs a command on the render side and waits for its reply.
    fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> RenderCommand) -> Result<T, RenderError> {
        let (tx, mut rx) = oneshot::channel();
        match &self.link {
            Link::Thread { cmd_tx, render_thread } => {
                if std::thread::current().id() == *render_thread {
                    return Err(RenderError::Reentrant);
                }
                cmd_tx.blocking_send(make(tx)).map_err(|_| RenderError::ChannelClosed)?;
                rx.blocking_recv().map_err(|_| RenderError::ChannelClosed)
            }
            Link::Local(shared) => {
                shared.execute(make(tx))?;
                rx.try_recv().map_err(|_| RenderError::ChannelClosed)
            }
        }
    }

    fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, RenderError>>) -> RenderCommand,
    ) -> Result<T, RenderError> {
        self.request(make)?
    }

    /// Destroys a painter without waiting for it.
    fn release(&self, painter: PainterId) {
        match &self.link {
            Link::Thread { cmd_tx, .. } => match cmd_tx.try_send(RenderCommand::DestroyPainter { painter, reply: None }) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(_)) => {
                    log::warn!("painter {painter}: command queue full, painter leaks until shutdown");
                }
            },
            Link::Local(shared) => shared.release(painter),
        }
    }
}

/// UI side handle of one painter. Dropping it destroys the painter.
#[derive(Debug)]
pub struct PainterHandle {
    id: PainterId,
    renderer: RenderHandle,
    released: bool,
}

impl PainterHandle {
    pub fn id(&self) -> PainterId {
        self.id
    }

    /// Binds the painter to `window`. Returns `false` if the device cannot
    /// render to the window yet.
    pub fn attach(&self, window: WindowHandle) -> Result<bool, RenderError> {
        let painter = self.id;
        self.renderer.call(|reply| RenderCommand::Attach { painter, window, reply })
    }

    pub fn detach(&self) -> Result<(), RenderError> {
        let painter = self.id;
        self.renderer.call(|reply| RenderCommand::Detach { painter, reply })
    }

    /// The window is going away; releases everything rendered for it.
    pub fn window_destroyed(&self) -> Result<(), RenderError> {
        self.detach()
    }

    pub fn resize(&self, size: SurfaceSize, scale: f32) -> Result<(), RenderError> {
        let painter = self.id;
        self.renderer.call(|reply| RenderCommand::Resize {
            painter,
            size,
            scale,
            reply,
        })
    }

    /// Renders a frame now, or hints the scheduler for continuous painters.
    pub fn repaint(&self) -> Result<bool, RenderError> {
        let painter = self.id;
        self.renderer.call(|reply| RenderCommand::Repaint { painter, reply })
    }

    /// The window needs painting.
    pub fn expose(&self) -> Result<(), RenderError> {
        let painter = self.id;
        self.renderer.call(|reply| RenderCommand::Expose { painter, reply })
    }

    pub fn set_background(&self, color: Color) -> Result<(), RenderError> {
        let painter = self.id;
        self.renderer.call(|reply| RenderCommand::SetBackground { painter, color, reply })
    }

    /// Destroys the painter and waits for it to be gone.
    pub fn destroy(mut self) -> Result<(), RenderError> {
        self.released = true;
        let painter = self.id;
        self.renderer.call(|reply| RenderCommand::DestroyPainter {
            painter,
            reply: Some(reply),
        })
    }
}

impl Drop for PainterHandle {
    fn drop(&mut self) {
        if !self.released {
            self.renderer.release(self.id);
        }
    }
}
