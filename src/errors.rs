use crate::config::ConfigError;
use crate::painter::PainterId;
use crate::resource::{ConsumerId, ResourceTag};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("{backend} backend does not support {kind} resources")]
    NotSupported { backend: String, kind: ResourceTag },

    #[error("reference count underflow for consumer {0}")]
    RefCountUnderflow(ConsumerId),

    #[error("realization for consumer {0} stored without a reference")]
    Unreferenced(ConsumerId),

    #[error("Painter not found: {0}")]
    PainterNotFound(PainterId),

    #[error("Presenting the frame of painter {0} failed; the painter was detached")]
    PresentFailed(PainterId),

    #[error("Render callback failed: {0:#}")]
    Callback(anyhow::Error),

    #[error("Render callback panicked: {0}")]
    CallbackPanicked(String),

    #[error("Invalid resource data: {0}")]
    InvalidResource(String),

    #[error("Render thread is gone")]
    ChannelClosed,

    #[error("Blocking call into the renderer from the render thread itself")]
    Reentrant,

    #[error("Failed to spawn the render thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}
