//! Pixel-level effects applied while compositing.

pub mod blend;
pub mod blur;
pub mod color;
pub mod guide;
pub mod watermark;
