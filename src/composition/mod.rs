//! Aspect-adaptive 9:16 composition.

/// Wide/tall source classification.
pub mod aspect;
/// Per-frame layer compositor.
pub mod compositor;
/// Overlay tracks tiled to the main timeline.
pub mod overlay;
/// Per-run layer geometry.
pub mod plan;
