//! Per-invocation render: speed sync, segmentation and the chunked frame loop.

/// Random effect parameters of a run.
pub mod params;
/// The frame loop feeding the output sinks.
pub mod pipeline;
/// Episode segmentation.
pub mod segment;
/// Shared picture/sound time scaling.
pub mod speed;
