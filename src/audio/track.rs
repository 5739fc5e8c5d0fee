use std::sync::Arc;

use crate::foundation::error::{ReelError, ReelResult};

/// Interleaved `f32` PCM. Transforms return a new track and never touch the source buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioTrack {
    pub sample_rate: u32,
    pub channels: u16,
    samples: Arc<Vec<f32>>,
}

impl AudioTrack {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<f32>) -> ReelResult<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(ReelError::validation(
                "audio sample_rate and channels must be non-zero",
            ));
        }
        if !samples.len().is_multiple_of(usize::from(channels)) {
            return Err(ReelError::validation(
                "interleaved sample count must be a multiple of the channel count",
            ));
        }
        Ok(Self {
            sample_rate,
            channels,
            samples: Arc::new(samples),
        })
    }

    pub fn silent(sample_rate: u32, channels: u16, frames: usize) -> ReelResult<Self> {
        Self::new(sample_rate, channels, vec![0.0; frames * usize::from(channels)])
    }

    fn derive(&self, samples: Vec<f32>) -> Self {
        Self {
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples: Arc::new(samples),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample frames (one value per channel each).
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    /// Frames `[start, end)`, clamped to the track.
    pub fn slice_frames(&self, start: usize, end: usize) -> Self {
        let ch = usize::from(self.channels);
        let end = end.min(self.frames());
        let start = start.min(end);
        self.derive(self.samples[start * ch..end * ch].to_vec())
    }

    /// Reads the track `rate` times faster: output frame `i` is source position `i * rate`,
    /// linearly interpolated. Duration scales by `1 / rate`.
    pub fn retimed(&self, rate: f64) -> ReelResult<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ReelError::validation("retime rate must be finite and > 0"));
        }
        let src_frames = self.frames();
        let out_frames = ((src_frames as f64) / rate).round() as usize;
        Ok(self.resample_to(out_frames, rate))
    }

    fn resample_to(&self, out_frames: usize, rate: f64) -> Self {
        let ch = usize::from(self.channels);
        let src = self.samples.as_slice();
        let src_frames = self.frames();
        let mut out = vec![0.0f32; out_frames * ch];
        if src_frames == 0 {
            return self.derive(out);
        }

        for i in 0..out_frames {
            let pos = (i as f64) * rate;
            let f0 = (pos.floor() as usize).min(src_frames - 1);
            let f1 = (f0 + 1).min(src_frames - 1);
            let frac = (pos - f0 as f64).clamp(0.0, 1.0) as f32;
            for c in 0..ch {
                let v0 = src[f0 * ch + c];
                let v1 = src[f1 * ch + c];
                out[i * ch + c] = v0 + (v1 - v0) * frac;
            }
        }
        self.derive(out)
    }

    /// Truncates, or pads by holding the last sample frame, to exactly `frames`.
    pub fn fit_to_frames(&self, frames: usize) -> Self {
        let ch = usize::from(self.channels);
        let mut out = Vec::with_capacity(frames * ch);
        let keep = frames.min(self.frames());
        out.extend_from_slice(&self.samples[..keep * ch]);
        if frames > keep {
            let hold: Vec<f32> = if keep == 0 {
                vec![0.0; ch]
            } else {
                self.samples[(keep - 1) * ch..keep * ch].to_vec()
            };
            for _ in keep..frames {
                out.extend_from_slice(&hold);
            }
        }
        self.derive(out)
    }

    pub fn with_gain(&self, gain: f32) -> Self {
        self.derive(self.samples.iter().map(|s| s * gain).collect())
    }

    pub fn map_samples(&self, f: impl Fn(f32) -> f32) -> Self {
        self.derive(self.samples.iter().map(|&s| f(s)).collect())
    }

    pub(crate) fn from_parts_like(&self, samples: Vec<f32>) -> Self {
        self.derive(samples)
    }

    /// Little-endian `f32` bytes, the layout `ffmpeg -f f32le` reads.
    pub fn to_f32le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 4);
        for &s in self.samples.iter() {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        bytes
    }
}

/// Sample frame aligned with the start of video frame `frame` at `fps`.
pub fn frame_to_sample(frame: u64, fps: crate::foundation::core::Fps, sample_rate: u32) -> u64 {
    let num = u128::from(frame) * u128::from(sample_rate) * u128::from(fps.den);
    let den = u128::from(fps.num);
    ((num + (den / 2)) / den) as u64
}
