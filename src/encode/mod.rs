//! Output sinks and post-encode container rewriting.
//!
//! Sinks consume composited frames in timeline order.

/// `ffmpeg`-based MP4 sink.
pub mod ffmpeg;
/// Container metadata rewriting.
pub mod metadata;
/// Artifact naming and sink factories.
pub mod outputs;
/// Generic frame sink trait and built-in sinks.
pub mod sink;
