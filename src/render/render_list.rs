//! Render list and display items.
//!
//! This module defines a lightweight, immediate-style render list
//! consisting of [`DisplayItem`] commands. The recording backend fills one
//! per frame, which makes it possible to inspect exactly what a painter drew
//! without a real graphics library.
//!
//! # Example
//!
//! ```rust
//! use gosub_render::render::{Color, DisplayItem, RenderList};
//!
//! let mut list = RenderList::new();
//!
//! // Clear background
//! list.add_command(DisplayItem::Clear { color: Color::from_u8(0, 0, 0, 255) });
//!
//! // Draw a white rectangle
//! list.add_command(DisplayItem::Rect {
//!     x: 10.0,
//!     y: 20.0,
//!     w: 100.0,
//!     h: 50.0,
//!     color: Color::from_u8(255, 255, 255, 255),
//! });
//! assert_eq!(list.len(), 2);
//! ```

use crate::geometry::Point;
use crate::resource::{GradientStop, PathCommand};

/// RGBA color used for drawing commands.
///
/// Channels are represented as `f32` in the range `0.0 ..= 1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    /// Red channel
    pub r: f32,
    /// Green channel
    pub g: f32,
    /// Blue channel
    pub b: f32,
    /// Alpha channel (opacity)
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);

    /// Creates a new color from `f32` channel values in the range `0.0 ..= 1.0`.
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Color {
        Color { r, g, b, a }
    }

    /// Creates a new color from `u8` channel values in the range `0 ..= 255`.
    pub fn from_u8(r: u8, g: u8, b: u8, a: u8) -> Color {
        Color {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: a as f32 / 255.0,
        }
    }

    /// Same colour with its alpha multiplied by `opacity`.
    pub fn with_opacity(self, opacity: f32) -> Color {
        Color { a: self.a * opacity, ..self }
    }

    /// Returns the channels as `u8` (0–255), in RGBA order.
    pub fn to_u8(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a].map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
    }
}

/// A single display item representing a drawing command.
///
/// These commands are appended to a [`RenderList`] by the recording backend.
#[derive(Clone, Debug, PartialEq)]
pub enum DisplayItem {
    /// Clear the entire surface with the given color.
    Clear {
        /// The color to clear the surface with.
        color: Color,
    },

    /// Draw a filled rectangle at `(x, y)` with width `w` and height `h`.
    Rect {
        /// The x-coordinate of the rectangle's top-left corner.
        x: f32,
        /// The y-coordinate of the rectangle's top-left corner.
        y: f32,
        /// The width of the rectangle.
        w: f32,
        /// The height of the rectangle.
        h: f32,
        /// The color to fill the rectangle with.
        color: Color,
    },

    /// Outline of a rectangle, `width` units wide.
    StrokeRect { x: f32, y: f32, w: f32, h: f32, width: f32, color: Color },

    /// Rectangle filled with a linear gradient running from `start` to `end`.
    GradientRect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        start: Point,
        end: Point,
        stops: Vec<GradientStop>,
    },

    Line { from: Point, to: Point, width: f32, color: Color },

    /// A path, filled when `width` is `None`, stroked otherwise.
    Path {
        commands: Vec<PathCommand>,
        color: Color,
        width: Option<f32>,
    },
}

/// A list of display items to be rendered.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderList {
    /// Sequence of drawing commands to execute.
    pub items: Vec<DisplayItem>,
}

impl RenderList {
    /// Creates a new, empty render list.
    pub fn new() -> Self {
        RenderList { items: Vec::new() }
    }

    /// Adds a new display item (drawing command) to the list.
    pub fn add_command(&mut self, command: DisplayItem) {
        self.items.push(command);
    }

    /// Clears all display items from the list.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
