use std::{path::PathBuf, sync::Arc};

use crate::foundation::{
    core::{Fps, Frame},
    error::{ReelError, ReelResult},
};

/// Container-level facts about a video asset. Immutable once probed.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct VideoInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub duration_sec: f64,
    pub fps: Fps,
    pub has_audio: bool,
}

impl VideoInfo {
    /// Number of addressable frames, at least one.
    pub fn frame_count(&self) -> u64 {
        self.fps.secs_to_frames_round(self.duration_sec).max(1)
    }

    /// Frame shown at source time `t`, clamped into the stream.
    pub fn frame_index_at(&self, t: f64) -> u64 {
        if !t.is_finite() || t <= 0.0 {
            return 0;
        }
        self.fps
            .secs_to_frames_floor(t)
            .min(self.frame_count() - 1)
    }
}

/// Frame-addressable visual stream.
///
/// Callers mostly walk forward in time; implementations are free to make backward access slow.
pub trait FrameSource: Send {
    fn info(&self) -> &VideoInfo;

    fn frame_at(&mut self, t: f64) -> ReelResult<Arc<Frame>>;
}

/// Frames held in memory. Used for synthetic sources and tests.
#[derive(Clone, Debug)]
pub struct MemoryVideo {
    info: VideoInfo,
    frames: Vec<Arc<Frame>>,
}

impl MemoryVideo {
    pub fn new(frames: Vec<Frame>, fps: Fps) -> ReelResult<Self> {
        Self::from_shared(frames.into_iter().map(Arc::new).collect(), fps)
    }

    /// `frame_count` frames of one flat color, sharing a single buffer.
    pub fn solid(width: u32, height: u32, fps: Fps, frame_count: u64, rgb: [u8; 3]) -> ReelResult<Self> {
        if frame_count == 0 {
            return Err(ReelError::validation("memory video needs at least one frame"));
        }
        let frame = Arc::new(Frame::from_pixel(width, height, image::Rgb(rgb)));
        Self::from_shared(vec![frame; frame_count as usize], fps)
    }

    pub fn from_fn(
        width: u32,
        height: u32,
        fps: Fps,
        frame_count: u64,
        mut f: impl FnMut(u64) -> Frame,
    ) -> ReelResult<Self> {
        let frames = (0..frame_count)
            .map(|i| {
                let frame = f(i);
                if frame.dimensions() != (width, height) {
                    return Err(ReelError::validation("memory video frames must share one size"));
                }
                Ok(Arc::new(frame))
            })
            .collect::<ReelResult<Vec<_>>>()?;
        Self::from_shared(frames, fps)
    }

    fn from_shared(frames: Vec<Arc<Frame>>, fps: Fps) -> ReelResult<Self> {
        let first = frames
            .first()
            .ok_or_else(|| ReelError::validation("memory video needs at least one frame"))?;
        let (width, height) = first.dimensions();
        if width == 0 || height == 0 {
            return Err(ReelError::validation("memory video frames must be non-empty"));
        }
        if frames.iter().any(|f| f.dimensions() != (width, height)) {
            return Err(ReelError::validation("memory video frames must share one size"));
        }
        let info = VideoInfo {
            path: PathBuf::from("memory"),
            width,
            height,
            duration_sec: fps.frames_to_secs(frames.len() as u64),
            fps,
            has_audio: false,
        };
        Ok(Self { info, frames })
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.info.path = path.into();
        self
    }

    pub fn with_has_audio(mut self, has_audio: bool) -> Self {
        self.info.has_audio = has_audio;
        self
    }
}

impl FrameSource for MemoryVideo {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn frame_at(&mut self, t: f64) -> ReelResult<Arc<Frame>> {
        let idx = self.info.frame_index_at(t) as usize;
        let idx = idx.min(self.frames.len() - 1);
        Ok(self.frames[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fps30() -> Fps {
        Fps::new(30, 1).unwrap()
    }

    #[test]
    fn duration_follows_frame_count() {
        let v = MemoryVideo::solid(4, 2, fps30(), 90, [1, 2, 3]).unwrap();
        assert!((v.info().duration_sec - 3.0).abs() < 1e-9);
        assert_eq!(v.info().frame_count(), 90);
    }

    #[test]
    fn frame_lookup_clamps_to_stream() {
        let mut v = MemoryVideo::from_fn(1, 1, fps30(), 3, |i| {
            Frame::from_pixel(1, 1, image::Rgb([i as u8, 0, 0]))
        })
        .unwrap();
        assert_eq!(v.frame_at(-1.0).unwrap().get_pixel(0, 0)[0], 0);
        assert_eq!(v.frame_at(1.0 / 30.0).unwrap().get_pixel(0, 0)[0], 1);
        assert_eq!(v.frame_at(99.0).unwrap().get_pixel(0, 0)[0], 2);
    }

    #[test]
    fn mixed_sizes_are_rejected() {
        let frames = vec![Frame::new(2, 2), Frame::new(3, 2)];
        assert!(MemoryVideo::new(frames, fps30()).is_err());
        assert!(MemoryVideo::new(Vec::new(), fps30()).is_err());
    }
}
