//! reelsync turns arbitrary-aspect videos into vertical short-form episodes.
//!
//! One invocation of the pipeline:
//!
//! - classifies the source as wide or tall and composes it onto a 9:16 canvas over a blurred,
//!   zoomed copy of itself
//! - grades the foreground, stamps a watermark and mixes looping overlays
//! - retimes picture and sound by one shared random factor and runs the audio effect chain
//! - cuts the result into randomly sized, labeled episodes and hands every artifact to a
//!   [`FrameSink`]
#![forbid(unsafe_code)]

pub mod assets;
pub mod audio;
pub mod batch;
pub mod composition;
pub mod config;
pub mod effects;
pub mod encode;
pub mod foundation;
pub mod render;

pub use crate::assets::source::{FrameSource, MemoryVideo, VideoInfo};
pub use crate::audio::track::AudioTrack;
pub use crate::batch::{Status, allocate_run_dir, process_batch, process_file};
pub use crate::composition::{aspect::AspectBranch, overlay::OverlayMixer};
pub use crate::config::PipelineConfig;
pub use crate::encode::outputs::{FileOutputs, MemoryOutputs, OutputFactory, OutputKind};
pub use crate::encode::sink::{FrameSink, InMemorySink, SinkConfig};
pub use crate::foundation::cancel::CancelToken;
pub use crate::foundation::core::{Canvas, Fps, Frame, Rect};
pub use crate::foundation::error::{ReelError, ReelResult};
pub use crate::render::params::EffectParameters;
pub use crate::render::pipeline::{Pipeline, RunReport};
pub use crate::render::segment::{Segment, plan_segments};
