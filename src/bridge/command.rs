use crate::errors::RenderError;
use crate::painter::{PainterId, RenderFn};
use crate::render::backend::{SurfaceSize, WindowHandle};
use crate::render::Color;
use std::fmt;
use tokio::sync::oneshot;

type Reply<T> = oneshot::Sender<Result<T, RenderError>>;

/// Calls the UI side makes into the render side. Each carries the channel
/// its result travels back on.
pub enum RenderCommand {
    CreatePainter {
        callback: RenderFn,
        background: Option<Color>,
        reply: oneshot::Sender<PainterId>,
    },
    Attach {
        painter: PainterId,
        window: WindowHandle,
        reply: Reply<bool>,
    },
    Detach {
        painter: PainterId,
        reply: Reply<()>,
    },
    Resize {
        painter: PainterId,
        size: SurfaceSize,
        scale: f32,
        reply: Reply<()>,
    },
    Repaint {
        painter: PainterId,
        reply: Reply<bool>,
    },
    Expose {
        painter: PainterId,
        reply: Reply<()>,
    },
    SetBackground {
        painter: PainterId,
        color: Color,
        reply: Reply<()>,
    },
    /// Sent without a reply when a painter handle is dropped
    DestroyPainter {
        painter: PainterId,
        reply: Option<Reply<()>>,
    },
    Shutdown {
        reply: Option<oneshot::Sender<()>>,
    },
}

impl fmt::Debug for RenderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderCommand::CreatePainter { background, .. } => {
                f.debug_struct("CreatePainter").field("background", background).finish()
            }
            RenderCommand::Attach { painter, window, .. } => f
                .debug_struct("Attach")
                .field("painter", painter)
                .field("window", window)
                .finish(),
            RenderCommand::Detach { painter, .. } => f.debug_struct("Detach").field("painter", painter).finish(),
            RenderCommand::Resize { painter, size, scale, .. } => f
                .debug_struct("Resize")
                .field("painter", painter)
                .field("size", size)
                .field("scale", scale)
                .finish(),
            RenderCommand::Repaint { painter, .. } => f.debug_struct("Repaint").field("painter", painter).finish(),
            RenderCommand::Expose { painter, .. } => f.debug_struct("Expose").field("painter", painter).finish(),
            RenderCommand::SetBackground { painter, color, .. } => f
                .debug_struct("SetBackground")
                .field("painter", painter)
                .field("color", color)
                .finish(),
            RenderCommand::DestroyPainter { painter, .. } => {
                f.debug_struct("DestroyPainter").field("painter", painter).finish()
            }
            RenderCommand::Shutdown { .. } => f.write_str("Shutdown"),
        }
    }
}
