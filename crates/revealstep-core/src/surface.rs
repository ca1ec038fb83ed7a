#![forbid(unsafe_code)]

//! Surface adapter boundary.
//!
//! The engine never touches a document tree. It asks a [`SurfaceAdapter`] to
//! embed or remove a sandboxed surface in a container and to probe resource
//! paths; the adapter reports back asynchronously through
//! [`Engine::surface_loaded`](crate::engine::Engine::surface_loaded) and
//! [`Engine::probe_resolved`](crate::engine::Engine::probe_resolved), quoting
//! the [`SurfaceTicket`] it was given.

use std::fmt;

use crate::slide::{ContainerId, SlideIndex, SurfaceId};
use crate::style::SurfaceStyle;

/// Class name carried by every embedded surface.
pub const SURFACE_CLASS: &str = "iframe-visualization";

/// Sandbox permissions granted to embedded documents.
pub const SURFACE_SANDBOX: &str = "allow-popups allow-scripts allow-forms allow-same-origin";

/// `scrolling` attribute used when the author gives none.
pub const DEFAULT_SCROLLING: &str = "yes";

/// Authoring attributes of a visualization container, already parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub id: ContainerId,
    /// Resource path as authored, before any prefix mapping.
    pub file: String,
    pub style: SurfaceStyle,
    /// Materialize ahead of time when within the view distance.
    pub preload: bool,
    /// Let the surface overflow its container.
    pub overflow_shown: bool,
    /// Value of the surface's `scrolling` attribute.
    pub scrolling: String,
}

impl ContainerSpec {
    #[must_use]
    pub fn new(id: ContainerId, file: impl Into<String>) -> Self {
        Self {
            id,
            file: file.into(),
            style: SurfaceStyle::default(),
            preload: false,
            overflow_shown: false,
            scrolling: DEFAULT_SCROLLING.to_owned(),
        }
    }

    /// Merge an inline style string over the defaults (builder pattern).
    #[must_use]
    pub fn with_style(mut self, inline: &str) -> Self {
        self.style = SurfaceStyle::with_overrides(inline);
        self
    }

    #[must_use]
    pub fn preload(mut self, preload: bool) -> Self {
        self.preload = preload;
        self
    }

    #[must_use]
    pub fn overflow_shown(mut self, overflow_shown: bool) -> Self {
        self.overflow_shown = overflow_shown;
        self
    }

    #[must_use]
    pub fn scrolling(mut self, scrolling: impl Into<String>) -> Self {
        self.scrolling = scrolling.into();
        self
    }
}

/// Identifies one materialization of a surface.
///
/// Callbacks quoting a ticket whose generation is no longer current are
/// dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceTicket {
    pub surface: SurfaceId,
    pub generation: u64,
}

/// Everything an adapter needs to embed one surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedRequest {
    pub ticket: SurfaceTicket,
    pub container: ContainerId,
    pub slide: SlideIndex,
    pub is_background: bool,
    /// Final resource path.
    pub src: String,
    pub style: SurfaceStyle,
    /// Leave the container's overflow alone. Otherwise the adapter hides it
    /// unless the container already sets one
    /// (see [`container_overflow`](crate::style::container_overflow)).
    pub overflow_shown: bool,
    pub scrolling: String,
    pub class: &'static str,
    pub sandbox: &'static str,
}

/// Adapter failure. Never fatal: the container simply stays empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    /// The container element could not be found.
    MissingContainer(ContainerId),
    /// The document layer rejected an operation.
    Dom(String),
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingContainer(id) => write!(f, "container {id} not found"),
            Self::Dom(msg) => write!(f, "document error: {msg}"),
        }
    }
}

impl std::error::Error for SurfaceError {}

/// Creates and destroys embedded surfaces.
pub trait SurfaceAdapter {
    /// Embed a surface. Load completion is reported later through the
    /// engine.
    fn embed(&mut self, request: &EmbedRequest) -> Result<(), SurfaceError>;

    /// Remove the surface hosted by `container`, if any.
    fn remove(&mut self, container: ContainerId);

    /// Whether `container` already hosts a surface the engine did not create.
    fn has_surface(&self, container: ContainerId) -> bool;

    /// Start an existence check for `url`. The answer is reported later
    /// through the engine.
    fn probe(&mut self, ticket: SurfaceTicket, url: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_flags() {
        let spec = ContainerSpec::new(ContainerId(1), "chart.html")
            .with_style("width: 40vw")
            .preload(true)
            .scrolling("no");
        assert!(spec.preload);
        assert_eq!(spec.scrolling, "no");
        assert!(!spec.overflow_shown);
        assert_eq!(spec.style.get("width"), Some("40vw"));
    }

    #[test]
    fn error_display() {
        assert_eq!(
            SurfaceError::MissingContainer(ContainerId(4)).to_string(),
            "container c4 not found"
        );
    }
}
