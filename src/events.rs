//! Render events.
//!
//! The render side publishes [`RenderEvent`]s on a broadcast channel. The
//! window layer subscribes to learn when a frame needs a UI thread repaint,
//! and applications use it to find out about painters that failed.

use crate::painter::PainterId;
use crate::render::backend::WindowHandle;
use crate::resource::ConsumerId;

#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    // ****************************************
    // ** Scheduler lifecycle
    /// Render loop is running
    SchedulerStarted,
    /// Render loop has stopped and released all painters
    SchedulerStopped,

    // ****************************************
    // ** Painter lifecycle
    /// Painter got a render target for a window
    PainterAttached {
        painter: PainterId,
        window: WindowHandle,
        consumer: ConsumerId,
    },
    /// Painter lost its render target
    PainterDetached { painter: PainterId },
    /// Render target and its realizations were rebuilt after a transient present failure
    TargetRecreated { painter: PainterId },
    /// Presenting failed for good; the painter was detached
    PainterFailed { painter: PainterId, error: String },

    // ****************************************
    // ** Rendering
    /// Render callback failed during a scheduler pass
    RenderFailed { painter: PainterId, error: String },
    /// A finished frame waits for the window to be painted
    UiRepaintRequested { painter: PainterId, window: WindowHandle },
    /// Painter entered or left continuous mode
    ContinuousChanged { painter: PainterId, continuous: bool },
}
