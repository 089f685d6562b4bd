//! Software device that records frames into [`RenderList`]s.
//!
//! Each target records the frame in progress, keeps the last finished frame
//! pending, and only makes it visible from [`RenderTarget::ui_repaint`]: like
//! a device that draws into an offscreen bitmap which the window paint
//! handler blits. Presenting therefore always asks for a UI thread repaint.
//! Bitmaps are not supported.

use crate::errors::RenderError;
use crate::geometry::Point;
use crate::render::backend::{DrawOp, PresentStatus, RenderDevice, RenderTarget, ResourceBackend, SurfaceSize, WindowHandle};
use crate::render::{Color, DisplayItem, RenderList};
use crate::resource::{ConsumerId, GradientStop, IdPool, NativeHandle, NativeResource, PathCommand, ResourceKind};
use anyhow::{anyhow, bail, Result};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

const BACKEND_NAME: &str = "recording";

/// Frames made visible per window, shared with whoever wants to look.
#[derive(Debug, Clone, Default)]
pub struct Screen {
    frames: Arc<Mutex<HashMap<WindowHandle, RenderList>>>,
}

impl Screen {
    /// Last frame put on screen for `window`.
    pub fn frame(&self, window: WindowHandle) -> Option<RenderList> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).get(&window).cloned()
    }

    fn show(&self, window: WindowHandle, frame: RenderList) {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).insert(window, frame);
    }

    fn forget(&self, window: WindowHandle) {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).remove(&window);
    }
}

#[derive(Debug, Default)]
pub struct RecordingDevice {
    screen: Screen,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn screen(&self) -> Screen {
        self.screen.clone()
    }
}

impl ResourceBackend for RecordingDevice {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn create(&mut self, kind: &ResourceKind, _target: &mut dyn RenderTarget) -> Result<NativeHandle, RenderError> {
        let native: Arc<dyn NativeResource> = match kind {
            ResourceKind::SolidBrush { color } => Arc::new(RecordedBrush { color: Mutex::new(*color) }),
            ResourceKind::LinearGradient { start, end, stops } => Arc::new(RecordedGradient {
                line: Mutex::new((*start, *end)),
                stops: stops.clone(),
            }),
            ResourceKind::Path { commands } => Arc::new(RecordedPath { commands: commands.clone() }),
            ResourceKind::Bitmap { .. } => {
                return Err(RenderError::NotSupported {
                    backend: BACKEND_NAME.to_string(),
                    kind: kind.tag(),
                })
            }
        };
        Ok(NativeHandle::new(kind.tag(), native))
    }

    fn update(&mut self, kind: &ResourceKind, handle: &NativeHandle, _target: &mut dyn RenderTarget) -> Result<bool, RenderError> {
        match kind {
            ResourceKind::SolidBrush { color } => {
                let Some(brush) = handle.downcast::<RecordedBrush>() else {
                    return Ok(false);
                };
                *brush.color.lock().unwrap_or_else(PoisonError::into_inner) = *color;
                Ok(true)
            }
            ResourceKind::LinearGradient { start, end, stops } => {
                let Some(gradient) = handle.downcast::<RecordedGradient>() else {
                    return Ok(false);
                };
                if gradient.stops != *stops {
                    return Ok(false);
                }
                *gradient.line.lock().unwrap_or_else(PoisonError::into_inner) = (*start, *end);
                Ok(true)
            }
            ResourceKind::Path { .. } => Ok(false),
            ResourceKind::Bitmap { .. } => Err(RenderError::NotSupported {
                backend: BACKEND_NAME.to_string(),
                kind: kind.tag(),
            }),
        }
    }
}

impl RenderDevice for RecordingDevice {
    fn create_target(&mut self, window: WindowHandle, ids: &mut IdPool) -> Result<Option<Box<dyn RenderTarget>>> {
        Ok(Some(Box::new(RecordingTarget {
            window,
            consumer: ids.allocate(),
            size: SurfaceSize::default(),
            scale: 1.0,
            recording: RenderList::new(),
            pending: None,
            screen: self.screen.clone(),
        })))
    }

    fn resize_target(&mut self, target: &mut dyn RenderTarget, size: SurfaceSize, scale: f32) -> Result<()> {
        let t = target
            .as_any_mut()
            .downcast_mut::<RecordingTarget>()
            .ok_or_else(|| anyhow!("RecordingDevice used with foreign target"))?;
        t.size = size;
        t.scale = scale;
        Ok(())
    }

    fn present_target(&mut self, target: &mut dyn RenderTarget, _wait_for_vsync: bool) -> PresentStatus {
        match target.as_any().downcast_ref::<RecordingTarget>() {
            Some(t) if t.pending.is_some() => PresentStatus::NeedsUiThreadRepaint,
            Some(_) => PresentStatus::Success,
            None => PresentStatus::Failure,
        }
    }

    fn destroy_target(&mut self, target: Box<dyn RenderTarget>, ids: &mut IdPool) {
        self.screen.forget(target.window());
        ids.free(target.consumer());
    }
}

pub struct RecordingTarget {
    window: WindowHandle,
    consumer: ConsumerId,
    size: SurfaceSize,
    scale: f32,
    recording: RenderList,
    pending: Option<RenderList>,
    screen: Screen,
}

impl RecordingTarget {
    /// Finished frame waiting for a UI thread repaint.
    pub fn pending(&self) -> Option<&RenderList> {
        self.pending.as_ref()
    }
}

fn brush_color(brush: &NativeHandle) -> Result<Color> {
    match brush.downcast::<RecordedBrush>() {
        Some(b) => Ok(*b.color.lock().unwrap_or_else(PoisonError::into_inner)),
        None => bail!("{:?} cannot be used as a solid colour", brush.tag()),
    }
}

impl RenderTarget for RecordingTarget {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn window(&self) -> WindowHandle {
        self.window
    }
    fn consumer(&self) -> ConsumerId {
        self.consumer
    }
    fn size(&self) -> SurfaceSize {
        self.size
    }
    fn scale(&self) -> f32 {
        self.scale
    }

    fn begin_frame(&mut self, background: Color) {
        self.recording.clear();
        self.recording.add_command(DisplayItem::Clear { color: background });
    }

    fn draw(&mut self, op: DrawOp<'_>) -> Result<()> {
        let item = match op {
            DrawOp::FillRect { rect, brush } => match brush.downcast::<RecordedGradient>() {
                Some(gradient) => {
                    let (start, end) = *gradient.line.lock().unwrap_or_else(PoisonError::into_inner);
                    DisplayItem::GradientRect {
                        x: rect.x,
                        y: rect.y,
                        w: rect.width,
                        h: rect.height,
                        start,
                        end,
                        stops: gradient.stops.clone(),
                    }
                }
                None => DisplayItem::Rect {
                    x: rect.x,
                    y: rect.y,
                    w: rect.width,
                    h: rect.height,
                    color: brush_color(brush)?,
                },
            },
            DrawOp::StrokeRect { rect, brush, width } => DisplayItem::StrokeRect {
                x: rect.x,
                y: rect.y,
                w: rect.width,
                h: rect.height,
                width,
                color: brush_color(brush)?,
            },
            DrawOp::Line { from, to, brush, width } => DisplayItem::Line {
                from,
                to,
                width,
                color: brush_color(brush)?,
            },
            DrawOp::FillPath { path, brush } | DrawOp::StrokePath { path, brush, .. } => {
                let recorded = path
                    .downcast::<RecordedPath>()
                    .ok_or_else(|| anyhow!("RecordingDevice used with foreign path"))?;
                let width = match op {
                    DrawOp::StrokePath { width, .. } => Some(width),
                    _ => None,
                };
                DisplayItem::Path {
                    commands: recorded.commands.clone(),
                    color: brush_color(brush)?,
                    width,
                }
            }
            DrawOp::Bitmap { .. } => bail!("RecordingDevice cannot draw bitmaps"),
        };

        self.recording.add_command(item);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        self.pending = Some(std::mem::take(&mut self.recording));
        Ok(())
    }

    fn ui_repaint(&mut self) {
        if let Some(frame) = self.pending.take() {
            self.screen.show(self.window, frame);
        }
    }
}

#[derive(Debug)]
struct RecordedBrush {
    color: Mutex<Color>,
}

impl NativeResource for RecordedBrush {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
struct RecordedGradient {
    line: Mutex<(Point, Point)>,
    stops: Vec<GradientStop>,
}

impl NativeResource for RecordedGradient {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
struct RecordedPath {
    commands: Vec<PathCommand>,
}

impl NativeResource for RecordedPath {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::resource::{AsResource, Bitmap, SolidBrush};

    #[test]
    fn frames_become_visible_on_ui_repaint() {
        let mut device = RecordingDevice::new();
        let screen = device.screen();
        let mut ids = IdPool::new();
        let mut target = device.create_target(WindowHandle(3), &mut ids).unwrap().unwrap();

        let brush = SolidBrush::new(Color::WHITE);
        let handle = brush.resource().realize(true, &mut device, target.as_mut()).unwrap();

        target.begin_frame(Color::BLACK);
        target
            .draw(DrawOp::FillRect { rect: Rect::new(1.0, 2.0, 3.0, 4.0), brush: &handle })
            .unwrap();
        target.end_frame().unwrap();

        assert_eq!(device.present_target(target.as_mut(), true), PresentStatus::NeedsUiThreadRepaint);
        assert!(screen.frame(WindowHandle(3)).is_none());

        target.ui_repaint();
        let frame = screen.frame(WindowHandle(3)).unwrap();
        assert_eq!(
            frame.items,
            vec![
                DisplayItem::Clear { color: Color::BLACK },
                DisplayItem::Rect { x: 1.0, y: 2.0, w: 3.0, h: 4.0, color: Color::WHITE },
            ]
        );
        assert_eq!(device.present_target(target.as_mut(), true), PresentStatus::Success);
    }

    #[test]
    fn brush_updates_are_patched_in_place() {
        let mut device = RecordingDevice::new();
        let mut ids = IdPool::new();
        let mut target = device.create_target(WindowHandle(1), &mut ids).unwrap().unwrap();

        let brush = SolidBrush::new(Color::BLACK);
        let before = brush.resource().realize(true, &mut device, target.as_mut()).unwrap();
        brush.set_color(Color::WHITE);
        let after = brush.resource().realize(false, &mut device, target.as_mut()).unwrap();

        assert!(before.same(&after));
        assert_eq!(brush_color(&after).unwrap(), Color::WHITE);
    }

    #[test]
    fn bitmaps_are_not_supported() {
        let mut device = RecordingDevice::new();
        let mut ids = IdPool::new();
        let mut target = device.create_target(WindowHandle(1), &mut ids).unwrap().unwrap();

        let bitmap = Bitmap::new(1, 1, vec![255; 4]).unwrap();
        let err = bitmap.resource().realize(true, &mut device, target.as_mut()).unwrap_err();
        assert!(matches!(err, RenderError::NotSupported { .. }));
        assert_eq!(bitmap.resource().realizations(), 0);
    }
}
