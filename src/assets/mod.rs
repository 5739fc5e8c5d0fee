/// `ffprobe`/`ffmpeg` decoding of inputs and overlays.
pub mod media;
/// Frame-addressable sources.
pub mod source;
/// Text rasterization for watermarks and labels.
pub mod text;
