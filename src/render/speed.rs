use crate::{
    audio::track::{AudioTrack, frame_to_sample},
    foundation::{
        core::Fps,
        error::{ReelError, ReelResult},
    },
};

/// One time-scale factor shared by picture and sound.
///
/// Output frame `k` shows timeline time `k / fps × factor`; audio is resampled by the same
/// factor and then cut to the sample count of exactly `output_frames` video frames.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct SpeedSync {
    pub factor: f64,
    pub source_duration: f64,
    pub fps: Fps,
}

impl SpeedSync {
    pub fn new(factor: f64, source_duration: f64, fps: Fps) -> ReelResult<Self> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(ReelError::validation("speed factor must be finite and > 0"));
        }
        if !(source_duration.is_finite() && source_duration > 0.0) {
            return Err(ReelError::validation("source duration must be > 0"));
        }
        Ok(Self {
            factor,
            source_duration,
            fps,
        })
    }

    pub fn output_frames(&self) -> u64 {
        self.fps
            .secs_to_frames_round(self.source_duration / self.factor)
            .max(1)
    }

    /// Duration of the encoded result, a whole number of output frames.
    pub fn output_duration(&self) -> f64 {
        self.fps.frames_to_secs(self.output_frames())
    }

    /// Main-timeline time sampled by output frame `k`.
    pub fn timeline_time(&self, k: u64) -> f64 {
        (self.fps.frames_to_secs(k) * self.factor).min(self.source_duration)
    }

    pub fn audio_frames(&self, sample_rate: u32) -> usize {
        frame_to_sample(self.output_frames(), self.fps, sample_rate) as usize
    }

    /// Plays `track` `factor` times faster and pins its length to the video's.
    pub fn retime_audio(&self, track: &AudioTrack) -> ReelResult<AudioTrack> {
        let retimed = track.retimed(self.factor)?;
        Ok(retimed.fit_to_frames(self.audio_frames(track.sample_rate)))
    }
}
