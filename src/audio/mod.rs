/// Echo, rate shift and loudness shaping.
pub mod effects;
/// Interleaved `f32` sample buffers.
pub mod track;
