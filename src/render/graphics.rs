use crate::errors::RenderError;
use crate::geometry::{Point, Rect, Size};
use crate::render::backend::{DrawOp, RenderDevice, RenderTarget};
use crate::resource::{AsResource, Bitmap, Brush, ConsumerId, NativeHandle, Path, Resource, ResourceId, ResourceRegistry};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Resources a consumer holds a reference on.
///
/// Lives as long as the painter's render target. Releasing it gives every
/// reference back, dropping the realizations nobody else shares.
#[derive(Debug)]
pub struct GraphicsState {
    consumer: ConsumerId,
    attached: HashMap<ResourceId, Weak<Resource>>,
}

impl GraphicsState {
    pub fn new(consumer: ConsumerId) -> Self {
        Self {
            consumer,
            attached: HashMap::new(),
        }
    }

    pub fn consumer(&self) -> ConsumerId {
        self.consumer
    }

    /// Number of resources this consumer holds.
    pub fn attached(&self) -> usize {
        self.attached.len()
    }

    /// Forgets resources the application has dropped. Their realizations
    /// went with them.
    pub fn prune(&mut self) {
        self.attached.retain(|_, weak| weak.strong_count() > 0);
    }

    pub fn release_all(&mut self) {
        for (id, weak) in self.attached.drain() {
            let Some(resource) = weak.upgrade() else {
                continue;
            };
            if let Err(e) = resource.release(self.consumer) {
                log::warn!("releasing resource {id} for consumer {} failed: {e}", self.consumer);
            }
        }
    }
}

/// Drawing context handed to a render callback for one frame.
pub struct Graphics<'a> {
    device: &'a mut dyn RenderDevice,
    target: &'a mut dyn RenderTarget,
    state: &'a mut GraphicsState,
    registry: &'a mut ResourceRegistry,
    size: Size,
}

impl<'a> Graphics<'a> {
    pub(crate) fn new(
        device: &'a mut dyn RenderDevice,
        target: &'a mut dyn RenderTarget,
        state: &'a mut GraphicsState,
        registry: &'a mut ResourceRegistry,
        size: Size,
    ) -> Self {
        Self {
            device,
            target,
            state,
            registry,
            size,
        }
    }

    /// Logical size of the frame.
    pub fn size(&self) -> Size {
        self.size
    }

    pub fn consumer(&self) -> ConsumerId {
        self.state.consumer
    }

    pub fn target(&self) -> &dyn RenderTarget {
        &*self.target
    }

    /// Returns the realization of `resource` for this frame's consumer.
    pub fn realize(&mut self, resource: &Arc<Resource>) -> Result<NativeHandle, RenderError> {
        let id = resource.id();
        let first_touch = !self.state.attached.contains_key(&id);
        if first_touch {
            self.registry.register(resource);
            self.state.attached.insert(id, Arc::downgrade(resource));
        }

        resource.realize(first_touch, &mut *self.device, &mut *self.target).inspect_err(|_| {
            if first_touch {
                self.state.attached.remove(&id);
            }
        })
    }

    pub fn fill_rect(&mut self, rect: Rect, brush: &impl Brush) -> Result<(), RenderError> {
        let brush = self.realize(brush.resource())?;
        self.target.draw(DrawOp::FillRect { rect, brush: &brush })?;
        Ok(())
    }

    pub fn stroke_rect(&mut self, rect: Rect, brush: &impl Brush, width: f32) -> Result<(), RenderError> {
        let brush = self.realize(brush.resource())?;
        self.target.draw(DrawOp::StrokeRect { rect, brush: &brush, width })?;
        Ok(())
    }

    pub fn line(&mut self, from: Point, to: Point, brush: &impl Brush, width: f32) -> Result<(), RenderError> {
        let brush = self.realize(brush.resource())?;
        self.target.draw(DrawOp::Line { from, to, brush: &brush, width })?;
        Ok(())
    }

    pub fn fill_path(&mut self, path: &Path, brush: &impl Brush) -> Result<(), RenderError> {
        let path = self.realize(path.resource())?;
        let brush = self.realize(brush.resource())?;
        self.target.draw(DrawOp::FillPath { path: &path, brush: &brush })?;
        Ok(())
    }

    pub fn stroke_path(&mut self, path: &Path, brush: &impl Brush, width: f32) -> Result<(), RenderError> {
        let path = self.realize(path.resource())?;
        let brush = self.realize(brush.resource())?;
        self.target.draw(DrawOp::StrokePath { path: &path, brush: &brush, width })?;
        Ok(())
    }

    pub fn draw_bitmap(&mut self, bitmap: &Bitmap, dest: Rect, opacity: f32) -> Result<(), RenderError> {
        let bitmap = self.realize(bitmap.resource())?;
        self.target.draw(DrawOp::Bitmap { bitmap: &bitmap, dest, opacity })?;
        Ok(())
    }
}
