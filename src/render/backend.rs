use crate::errors::RenderError;
use crate::geometry::{Point, Rect};
use crate::render::Color;
use crate::resource::{ConsumerId, IdPool, NativeHandle, ResourceKind};
use std::any::Any;
use std::fmt;

/// Size of a surface in pixels. It's a simple struct to hold width and height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Opaque identifier of a platform window, handed out by the window layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(pub u64);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window:{}", self.0)
    }
}

/// Outcome of presenting a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    /// Frame is on screen.
    Success,
    /// Target (and everything realized for it) must be rebuilt. Transient.
    Recreate,
    /// Frame is ready but only the UI thread can put it on screen, during
    /// the next paint of the window.
    NeedsUiThreadRepaint,
    /// The target is unusable.
    Failure,
}

/// One drawing operation, with its resources already realized for the
/// target it is submitted to.
#[derive(Debug, Clone, Copy)]
pub enum DrawOp<'a> {
    FillRect { rect: Rect, brush: &'a NativeHandle },
    StrokeRect { rect: Rect, brush: &'a NativeHandle, width: f32 },
    Line { from: Point, to: Point, brush: &'a NativeHandle, width: f32 },
    FillPath { path: &'a NativeHandle, brush: &'a NativeHandle },
    StrokePath { path: &'a NativeHandle, brush: &'a NativeHandle, width: f32 },
    Bitmap { bitmap: &'a NativeHandle, dest: Rect, opacity: f32 },
}

/// Per-backend dispatch for resource realization.
///
/// Both calls receive the target the realization is made for, since native
/// objects usually belong to the device context behind it.
pub trait ResourceBackend {
    fn name(&self) -> &str;

    /// Builds a new realization of `kind`. Kinds the backend cannot draw are
    /// reported as [`RenderError::NotSupported`].
    fn create(&mut self, kind: &ResourceKind, target: &mut dyn RenderTarget) -> Result<NativeHandle, RenderError>;

    /// Patches an existing realization after `kind` changed. Returns
    /// `Ok(false)` when the change cannot be applied in place; the caller then
    /// creates a new realization instead.
    fn update(
        &mut self,
        kind: &ResourceKind,
        handle: &NativeHandle,
        target: &mut dyn RenderTarget,
    ) -> Result<bool, RenderError>;
}

/// Platform device. Creates, resizes, presents and destroys render targets.
/// All calls happen on the render thread.
pub trait RenderDevice: ResourceBackend + Send {
    /// Creates a render target for `window`, taking its consumer identifier
    /// from `ids`. `Ok(None)` means the window cannot be rendered to yet.
    fn create_target(&mut self, window: WindowHandle, ids: &mut IdPool) -> anyhow::Result<Option<Box<dyn RenderTarget>>>;

    fn resize_target(&mut self, target: &mut dyn RenderTarget, size: SurfaceSize, scale: f32) -> anyhow::Result<()>;

    fn present_target(&mut self, target: &mut dyn RenderTarget, wait_for_vsync: bool) -> PresentStatus;

    /// Tears the target down and returns its consumer identifier to `ids`.
    fn destroy_target(&mut self, target: Box<dyn RenderTarget>, ids: &mut IdPool);
}

/// Type-erased render target so painters can hold it without generics.
pub trait RenderTarget: Send {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn window(&self) -> WindowHandle;
    fn consumer(&self) -> ConsumerId;
    fn size(&self) -> SurfaceSize;
    fn scale(&self) -> f32;

    /// Starts a frame, clearing it to `background`.
    fn begin_frame(&mut self, background: Color);
    fn draw(&mut self, op: DrawOp<'_>) -> anyhow::Result<()>;
    fn end_frame(&mut self) -> anyhow::Result<()>;

    /// Puts the last ended frame on screen from within a window paint.
    /// Only targets that present with [`PresentStatus::NeedsUiThreadRepaint`]
    /// need this.
    fn ui_repaint(&mut self) {}
}
