//! Renderer configuration.
//!
//! `RenderConfig` controls which device renders, where the render loop runs
//! and how it paces continuous painters. It provides sensible defaults via
//! [`Default`] and a fluent [`RenderConfig::builder()`] for customization
//! with validation.
//!
//! # Examples
//!
//! ```rust
//! use gosub_render::config::{BackendKind, RenderConfig, ThreadingMode};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = RenderConfig::builder()
//!     .backend(BackendKind::Recording)
//!     .threading(ThreadingMode::SingleThreaded)
//!     .max_fps(30)
//!     .build()?; // returns Result<RenderConfig, ConfigError>
//! assert_eq!(cfg.max_fps, Some(30));
//! # Ok(()) }
//! ```
//!
//! # Fields (summary)
//! - `backend`: Device to render with (default: null, or `GOSUB_RENDER_BACKEND` via `backend_from_env`).
//! - `threading`: Dedicated render thread or single threaded (default: dedicated).
//! - `wait_for_vsync`: Passed to every present (default: `true`).
//! - `max_fps`: Upper bound on continuous passes per second, `None` for unpaced.
//! - `command_capacity`: Size of the bridge command queue (default: 64).
//! - `event_capacity`: Size of the render event channel (default: 128).
//! - `background`: Colour new painters clear their frames to (default: white).

use crate::render::Color;
use std::fmt;
use std::str::FromStr;

/// Environment variable that selects the render backend.
pub const BACKEND_ENV: &str = "GOSUB_RENDER_BACKEND";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// Draws nothing
    #[default]
    Null,
    /// Records frames as display lists
    Recording,
}

impl BackendKind {
    /// Reads the backend from [`BACKEND_ENV`]. Unset means the default.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(BACKEND_ENV) {
            Ok(value) => value.parse(),
            Err(_) => Ok(Self::default()),
        }
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "null" => Ok(BackendKind::Null),
            "recording" | "software" => Ok(BackendKind::Recording),
            _ => Err(ConfigError::UnsupportedBackend(s.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Null => write!(f, "null"),
            BackendKind::Recording => write!(f, "recording"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThreadingMode {
    /// Render loop runs on its own thread; calls from the UI thread block
    #[default]
    Dedicated,
    /// UI and render work share the calling thread
    SingleThreaded,
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub backend: BackendKind,
    pub threading: ThreadingMode,
    pub wait_for_vsync: bool,
    pub max_fps: Option<u32>,
    pub command_capacity: usize,
    pub event_capacity: usize,
    pub background: Color,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            threading: ThreadingMode::default(),
            wait_for_vsync: true,
            max_fps: None,
            command_capacity: 64,
            event_capacity: 128,
            background: Color::WHITE,
        }
    }
}

impl RenderConfig {
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder::default()
    }
}

/// Builder for [`RenderConfig`].
#[derive(Debug, Clone, Default)]
pub struct RenderConfigBuilder {
    inner: RenderConfig,
    backend_from_env: bool,
}

impl RenderConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut RenderConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn backend(self, kind: BackendKind) -> Self { self.map(|c| c.backend = kind) }
    pub fn threading(self, mode: ThreadingMode) -> Self { self.map(|c| c.threading = mode) }
    pub fn wait_for_vsync(self, on: bool) -> Self { self.map(|c| c.wait_for_vsync = on) }
    pub fn max_fps(self, fps: u32) -> Self { self.map(|c| c.max_fps = Some(fps)) }
    pub fn unpaced(self) -> Self { self.map(|c| c.max_fps = None) }
    pub fn command_capacity(self, n: usize) -> Self { self.map(|c| c.command_capacity = n) }
    pub fn event_capacity(self, n: usize) -> Self { self.map(|c| c.event_capacity = n) }
    pub fn background(self, color: Color) -> Self { self.map(|c| c.background = color) }

    /// Take the backend from [`BACKEND_ENV`] when building.
    pub fn backend_from_env(mut self) -> Self {
        self.backend_from_env = true;
        self
    }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut RenderConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(mut self) -> Result<RenderConfig, ConfigError> {
        if self.backend_from_env {
            self.inner.backend = BackendKind::from_env()?;
        }
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UnsupportedBackend(String),
    ZeroFps,
    ZeroCommandCapacity,
    ZeroEventCapacity,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnsupportedBackend(name) =>
                write!(f, "unsupported render backend '{name}' (expected null, recording or software)"),
            ConfigError::ZeroFps =>
                write!(f, "max_fps must be at least 1"),
            ConfigError::ZeroCommandCapacity =>
                write!(f, "command_capacity must be at least 1"),
            ConfigError::ZeroEventCapacity =>
                write!(f, "event_capacity must be at least 1"),
        }
    }
}
impl std::error::Error for ConfigError {}

fn validate(c: &RenderConfig) -> Result<(), ConfigError> {
    if c.max_fps == Some(0) {
        return Err(ConfigError::ZeroFps);
    }
    if c.command_capacity == 0 {
        return Err(ConfigError::ZeroCommandCapacity);
    }
    if c.event_capacity == 0 {
        return Err(ConfigError::ZeroEventCapacity);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = RenderConfig::builder().build().unwrap();
        assert_eq!(cfg.backend, BackendKind::Null);
        assert_eq!(cfg.threading, ThreadingMode::Dedicated);
        assert!(cfg.wait_for_vsync);
        assert_eq!(cfg.max_fps, None);
    }

    #[test]
    fn builder_rejects_zero_limits() {
        assert_eq!(RenderConfig::builder().max_fps(0).build().unwrap_err(), ConfigError::ZeroFps);
        assert_eq!(
            RenderConfig::builder().command_capacity(0).build().unwrap_err(),
            ConfigError::ZeroCommandCapacity
        );
        assert_eq!(
            RenderConfig::builder().with(|c| c.event_capacity = 0).build().unwrap_err(),
            ConfigError::ZeroEventCapacity
        );
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("null".parse::<BackendKind>().unwrap(), BackendKind::Null);
        assert_eq!("Recording".parse::<BackendKind>().unwrap(), BackendKind::Recording);
        assert_eq!("software".parse::<BackendKind>().unwrap(), BackendKind::Recording);
        assert_eq!(
            "direct2d".parse::<BackendKind>().unwrap_err(),
            ConfigError::UnsupportedBackend("direct2d".into())
        );
    }
}
