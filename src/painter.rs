//! Painters bind a render callback to a window.
//!
//! A [`Painter`] owns the render target created for its window, the
//! per-consumer resource references of that target, and the counters that
//! tell the scheduler whether a new frame can be rendered. Painters live on
//! the render side; the UI side talks to them through
//! [`PainterHandle`](crate::bridge::PainterHandle).
//!
//! State machine:
//!
//! ```text
//! Detached --attach--> Attached --callback returns true--> Continuous
//!     ^                   |   \--callback returns false--> OneShot
//!     +------detach-------+
//! ```

use crate::errors::RenderError;
use crate::events::RenderEvent;
use crate::geometry::Size;
use crate::render::backend::{PresentStatus, RenderTarget, SurfaceSize, WindowHandle};
use crate::render::{Color, Graphics, GraphicsState};
use crate::scheduler::RenderContext;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use uuid::Uuid;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PainterId(Uuid);

impl PainterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PainterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PainterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Application render callback.
///
/// Receives the logical size of the frame and a drawing context. Returns
/// whether the painter should render again next frame.
pub type RenderFn = Box<dyn FnMut(Size, &mut Graphics<'_>) -> anyhow::Result<bool> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PainterState {
    Detached,
    Attached,
    OneShot,
    Continuous,
}

pub struct Painter {
    id: PainterId,
    callback: RenderFn,
    window: Option<WindowHandle>,
    target: Option<Box<dyn RenderTarget>>,
    graphics: Option<GraphicsState>,
    size: SurfaceSize,
    scale: f32,
    background: Color,
    /// Render again next scheduler pass
    continuous: bool,
    /// Frames only reach the screen through a window paint
    synchronized_present: bool,
    resized: bool,
    /// Has rendered at least once since attaching
    rendered: bool,
    repaint_counter: u64,
    current_repaint: u64,
}

impl fmt::Debug for Painter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Painter")
            .field("id", &self.id)
            .field("window", &self.window)
            .field("state", &self.state())
            .field("repaint_counter", &self.repaint_counter)
            .field("current_repaint", &self.current_repaint)
            .finish()
    }
}

impl Painter {
    pub fn new(id: PainterId, callback: RenderFn, background: Color) -> Self {
        Self {
            id,
            callback,
            window: None,
            target: None,
            graphics: None,
            size: SurfaceSize::default(),
            scale: 1.0,
            background,
            continuous: false,
            synchronized_present: false,
            resized: false,
            rendered: false,
            repaint_counter: 0,
            current_repaint: 0,
        }
    }

    pub fn id(&self) -> PainterId {
        self.id
    }

    pub fn window(&self) -> Option<WindowHandle> {
        self.window
    }

    pub fn target(&self) -> Option<&dyn RenderTarget> {
        self.target.as_deref()
    }

    pub fn graphics_state(&self) -> Option<&GraphicsState> {
        self.graphics.as_ref()
    }

    pub fn state(&self) -> PainterState {
        match (self.target.is_some(), self.continuous, self.rendered) {
            (false, _, _) => PainterState::Detached,
            (true, true, _) => PainterState::Continuous,
            (true, false, true) => PainterState::OneShot,
            (true, false, false) => PainterState::Attached,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.target.is_some()
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous
    }

    /// Presents through window paints.
    pub fn is_synchronized(&self) -> bool {
        self.synchronized_present
    }

    /// No frame is waiting to be put on screen.
    pub fn ready(&self) -> bool {
        self.is_attached() && self.current_repaint == self.repaint_counter
    }

    pub fn repaint_counter(&self) -> u64 {
        self.repaint_counter
    }

    pub fn set_background(&mut self, color: Color) {
        self.background = color;
    }

    /// Binds the painter to `window`. Attaching to the current window does
    /// nothing; another window replaces the current one. Returns `false` when
    /// the device has no target for the window yet.
    pub fn attach(&mut self, ctx: &mut RenderContext, window: WindowHandle) -> Result<bool, RenderError> {
        if self.window == Some(window) && self.is_attached() {
            return Ok(true);
        }
        self.detach(ctx);

        if !self.setup(ctx, window)? {
            log::debug!("painter {}: no render target for {window} yet", self.id);
            return Ok(false);
        }

        if let Some(state) = &self.graphics {
            ctx.emit(RenderEvent::PainterAttached {
                painter: self.id,
                window,
                consumer: state.consumer(),
            });
        }
        log::debug!("painter {}: attached to {window}", self.id);
        Ok(true)
    }

    /// Releases the render target and every realization made for it.
    /// Detaching a detached painter does nothing.
    pub fn detach(&mut self, ctx: &mut RenderContext) {
        if !self.is_attached() {
            self.window = None;
            return;
        }
        self.teardown(ctx);
        self.window = None;
        self.continuous = false;
        self.synchronized_present = false;

        ctx.emit(RenderEvent::PainterDetached { painter: self.id });
        log::debug!("painter {}: detached", self.id);
    }

    /// Resizes the render target. Nothing happens if size and scale are
    /// unchanged.
    pub fn resize(&mut self, ctx: &mut RenderContext, size: SurfaceSize, scale: f32) -> Result<(), RenderError> {
        if self.size == size && self.scale == scale {
            return Ok(());
        }
        self.size = size;
        self.scale = scale;
        self.resized = true;

        if let Some(target) = self.target.as_deref_mut() {
            ctx.device.resize_target(target, size, scale)?;
        }
        Ok(())
    }

    /// Renders one frame, unless the painter is continuous: then the
    /// scheduler renders it and this only wakes the scheduler.
    pub fn repaint(&mut self, ctx: &mut RenderContext) -> Result<bool, RenderError> {
        if !self.is_attached() {
            return Ok(false);
        }
        if self.continuous {
            ctx.wake.notify_one();
            return Ok(true);
        }
        self.render_frame(ctx, false)
    }

    /// Handles a paint request of the window.
    pub fn expose(&mut self, ctx: &mut RenderContext) -> Result<(), RenderError> {
        if !self.is_attached() {
            return Ok(());
        }

        let render_now = if self.synchronized_present && self.resized {
            true
        } else if !self.ready() {
            // pending frame only needs the blit
            false
        } else if self.continuous {
            ctx.wake.notify_one();
            return Ok(());
        } else {
            true
        };

        if render_now {
            self.render_frame(ctx, true)?;
        }
        if !self.ready() {
            self.after_ui_repaint(ctx);
        }
        Ok(())
    }

    /// Puts a frame that waited for a window paint on screen.
    pub fn after_ui_repaint(&mut self, ctx: &mut RenderContext) {
        let Some(target) = self.target.as_deref_mut() else {
            return;
        };
        target.ui_repaint();
        self.current_repaint = self.repaint_counter;

        if self.continuous {
            ctx.wake.notify_one();
        }
    }

    /// Renders and presents one frame. Returns whether the painter wants
    /// another frame.
    pub(crate) fn render_frame(&mut self, ctx: &mut RenderContext, from_ui_paint: bool) -> Result<bool, RenderError> {
        let (Some(target), Some(state)) = (self.target.as_deref_mut(), self.graphics.as_mut()) else {
            return Ok(false);
        };

        self.repaint_counter += 1;
        self.resized = false;
        self.rendered = true;
        log::trace!("painter {}: frame {}", self.id, self.repaint_counter);

        let logical = Size::new(
            target.size().width as f32 / target.scale(),
            target.size().height as f32 / target.scale(),
        );

        target.begin_frame(self.background);
        let outcome = {
            let callback = &mut self.callback;
            let mut graphics = Graphics::new(ctx.device.as_mut(), &mut *target, state, &mut ctx.registry, logical);
            panic::catch_unwind(AssertUnwindSafe(|| callback(logical, &mut graphics)))
        };
        let ended = target.end_frame();
        state.prune();

        let more = match outcome {
            Ok(Ok(more)) => more,
            Ok(Err(e)) => return Err(self.callback_failed(RenderError::Callback(e))),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                return Err(self.callback_failed(RenderError::CallbackPanicked(message)));
            }
        };
        if let Err(e) = ended {
            return Err(self.callback_failed(RenderError::Backend(e)));
        }

        let more = match ctx.device.present_target(target, ctx.wait_for_vsync) {
            PresentStatus::Success => {
                self.current_repaint = self.repaint_counter;
                self.synchronized_present = false;
                more
            }
            PresentStatus::NeedsUiThreadRepaint => {
                self.synchronized_present = true;
                if !from_ui_paint {
                    if let Some(window) = self.window {
                        ctx.emit(RenderEvent::UiRepaintRequested { painter: self.id, window });
                    }
                }
                more
            }
            PresentStatus::Recreate => {
                self.current_repaint = self.repaint_counter;
                // render again next pass with the new target, if there is one
                self.recreate(ctx)?
            }
            PresentStatus::Failure => {
                log::warn!("painter {}: present failed, detaching", self.id);
                self.detach(ctx);
                let error = RenderError::PresentFailed(self.id);
                ctx.emit(RenderEvent::PainterFailed {
                    painter: self.id,
                    error: error.to_string(),
                });
                return Err(error);
            }
        };

        self.continuous = more;
        Ok(more)
    }

    /// A failed frame is dropped. Continuous painters stay continuous and
    /// try again next pass.
    fn callback_failed(&mut self, error: RenderError) -> RenderError {
        self.current_repaint = self.repaint_counter;
        error
    }

    /// Rebuilds the render target and all realizations for the same window.
    /// Returns `false` when the device has no new target; the painter is
    /// then detached.
    fn recreate(&mut self, ctx: &mut RenderContext) -> Result<bool, RenderError> {
        let Some(window) = self.window else {
            return Ok(false);
        };
        log::debug!("painter {}: recreating render target for {window}", self.id);
        self.teardown(ctx);

        let recreated = self.setup(ctx, window);
        if matches!(recreated, Ok(true)) {
            ctx.emit(RenderEvent::TargetRecreated { painter: self.id });
        } else {
            log::debug!("painter {}: no render target for {window} after recreate", self.id);
            self.window = None;
            self.continuous = false;
            self.synchronized_present = false;
            ctx.emit(RenderEvent::PainterDetached { painter: self.id });
        }
        recreated
    }

    fn setup(&mut self, ctx: &mut RenderContext, window: WindowHandle) -> Result<bool, RenderError> {
        let Some(mut target) = ctx.device.create_target(window, &mut ctx.ids)? else {
            return Ok(false);
        };

        if !self.size.is_empty() {
            if let Err(e) = ctx.device.resize_target(target.as_mut(), self.size, self.scale) {
                ctx.device.destroy_target(target, &mut ctx.ids);
                return Err(e.into());
            }
        }

        self.graphics = Some(GraphicsState::new(target.consumer()));
        self.target = Some(target);
        self.window = Some(window);
        self.rendered = false;
        self.current_repaint = self.repaint_counter;
        Ok(true)
    }

    fn teardown(&mut self, ctx: &mut RenderContext) {
        if let Some(mut state) = self.graphics.take() {
            state.release_all();
        }
        if let Some(target) = self.target.take() {
            ctx.device.destroy_target(target, &mut ctx.ids);
        }
    }
}

impl Drop for Painter {
    fn drop(&mut self) {
        if self.is_attached() {
            log::warn!("painter {} dropped while attached; its target was not destroyed", self.id);
        }
    }
}
