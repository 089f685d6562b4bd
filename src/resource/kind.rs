//! Resource parameters and the native handles backends produce for them.

use crate::geometry::Point;
use crate::render::Color;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Colour stop of a gradient. `offset` runs from `0.0` to `1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Color,
}

impl GradientStop {
    pub fn new(offset: f32, color: Color) -> Self {
        Self { offset, color }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathCommand {
    MoveTo(Point),
    LineTo(Point),
    QuadTo { ctrl: Point, to: Point },
    Close,
}

/// Backend independent description of a drawing resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceKind {
    SolidBrush {
        color: Color,
    },
    LinearGradient {
        start: Point,
        end: Point,
        stops: Vec<GradientStop>,
    },
    /// RGBA8 pixels, row major, no padding.
    Bitmap {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
    Path {
        commands: Vec<PathCommand>,
    },
}

impl ResourceKind {
    pub fn tag(&self) -> ResourceTag {
        match self {
            ResourceKind::SolidBrush { .. } => ResourceTag::SolidBrush,
            ResourceKind::LinearGradient { .. } => ResourceTag::LinearGradient,
            ResourceKind::Bitmap { .. } => ResourceTag::Bitmap,
            ResourceKind::Path { .. } => ResourceTag::Path,
        }
    }
}

/// Discriminant of [`ResourceKind`], used in errors and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceTag {
    SolidBrush,
    LinearGradient,
    Bitmap,
    Path,
}

impl fmt::Display for ResourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceTag::SolidBrush => write!(f, "solid brush"),
            ResourceTag::LinearGradient => write!(f, "linear gradient"),
            ResourceTag::Bitmap => write!(f, "bitmap"),
            ResourceTag::Path => write!(f, "path"),
        }
    }
}

/// Backend specific realization of a resource.
///
/// Cleanup happens in `Drop`. Implementations that support in-place updates
/// keep their mutable state behind interior mutability, since a handle can be
/// shared with the frame that is currently drawing with it.
pub trait NativeResource: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
}

/// A realization, tagged with the kind of resource it realizes.
#[derive(Debug, Clone)]
pub enum NativeHandle {
    Brush(Arc<dyn NativeResource>),
    Gradient(Arc<dyn NativeResource>),
    Bitmap(Arc<dyn NativeResource>),
    Path(Arc<dyn NativeResource>),
}

impl NativeHandle {
    /// Wraps a backend object into the variant matching `tag`.
    pub fn new(tag: ResourceTag, native: Arc<dyn NativeResource>) -> Self {
        match tag {
            ResourceTag::SolidBrush => NativeHandle::Brush(native),
            ResourceTag::LinearGradient => NativeHandle::Gradient(native),
            ResourceTag::Bitmap => NativeHandle::Bitmap(native),
            ResourceTag::Path => NativeHandle::Path(native),
        }
    }

    pub fn tag(&self) -> ResourceTag {
        match self {
            NativeHandle::Brush(_) => ResourceTag::SolidBrush,
            NativeHandle::Gradient(_) => ResourceTag::LinearGradient,
            NativeHandle::Bitmap(_) => ResourceTag::Bitmap,
            NativeHandle::Path(_) => ResourceTag::Path,
        }
    }

    pub fn native(&self) -> &Arc<dyn NativeResource> {
        match self {
            NativeHandle::Brush(n) | NativeHandle::Gradient(n) | NativeHandle::Bitmap(n) | NativeHandle::Path(n) => n,
        }
    }

    pub fn downcast<T: NativeResource>(&self) -> Option<&T> {
        self.native().as_any().downcast_ref::<T>()
    }

    /// Do both handles refer to the same native object?
    pub fn same(&self, other: &NativeHandle) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(self.native()), Arc::as_ptr(other.native()))
    }
}
