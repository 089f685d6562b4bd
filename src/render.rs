pub mod backend;

/// Rendering backends.
pub mod backends {
    pub mod null;
    /// Software backend that records frames as display lists
    pub mod recording;
}

mod graphics;
pub use graphics::{Graphics, GraphicsState};

mod render_list;
pub use render_list::*;

use crate::config::BackendKind;
use backend::RenderDevice;

/// Builds the device for `kind`.
pub fn create_device(kind: BackendKind) -> Box<dyn RenderDevice> {
    match kind {
        BackendKind::Null => Box::new(backends::null::NullDevice::new()),
        BackendKind::Recording => Box::new(backends::recording::RecordingDevice::new()),
    }
}
