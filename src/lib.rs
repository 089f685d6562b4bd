pub mod bridge;
pub mod config;
pub mod errors;
pub mod events;
pub mod geometry;
pub mod painter;
pub mod render;
pub mod resource;
pub mod scheduler;

pub use bridge::{launch, launch_default, PainterHandle, RenderHandle, Renderer};
pub use config::{BackendKind, RenderConfig, ThreadingMode};
pub use errors::RenderError;
pub use events::RenderEvent;
pub use painter::PainterId;
