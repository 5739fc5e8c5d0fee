use crate::{
    audio::track::AudioTrack,
    config::AudioConfig,
    foundation::{error::ReelResult, math::db_to_gain},
};

/// Echo, rate perturbation and loudness shaping, applied in that order to an already
/// time-scaled track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AudioEffectChain {
    pub echo_delay_secs: f64,
    pub echo_gain: f32,
    pub pitch_factor: f64,
    pub gain: f32,
    pub peak_ceiling: f32,
}

impl AudioEffectChain {
    pub fn new(cfg: &AudioConfig, pitch_factor: f64, gain_db: f64) -> Self {
        Self {
            echo_delay_secs: cfg.echo_delay_ms / 1000.0,
            echo_gain: db_to_gain(-cfg.echo_attenuation_db),
            pitch_factor,
            gain: db_to_gain(gain_db),
            peak_ceiling: cfg.peak_ceiling,
        }
    }

    /// Runs the chain and reconciles the result to exactly `target_frames` sample frames.
    #[tracing::instrument(skip(self, track), fields(frames = track.frames()))]
    pub fn apply(&self, track: &AudioTrack, target_frames: usize) -> ReelResult<AudioTrack> {
        let echoed = add_echo(track, self.echo_delay_secs, self.echo_gain);
        let shifted = shift_rate(&echoed, self.pitch_factor)?;
        let shaped = shape_loudness(&shifted, self.gain, self.peak_ceiling);
        Ok(shaped.fit_to_frames(target_frames))
    }
}

/// Mixes a delayed, attenuated copy of the track onto itself. Length is unchanged; the tail of
/// the echo past the end is dropped.
pub fn add_echo(track: &AudioTrack, delay_secs: f64, gain: f32) -> AudioTrack {
    let ch = usize::from(track.channels);
    let delay = (delay_secs * f64::from(track.sample_rate)).round().max(0.0) as usize;
    let src = track.samples();
    let mut out = src.to_vec();
    if gain == 0.0 || delay >= track.frames() {
        return track.from_parts_like(out);
    }
    for (dst, &s) in out[delay * ch..].iter_mut().zip(src.iter()) {
        *dst += s * gain;
    }
    track.from_parts_like(out)
}

/// Plays the samples back `factor` times faster without pitch correction: pitch and duration
/// move together.
pub fn shift_rate(track: &AudioTrack, factor: f64) -> ReelResult<AudioTrack> {
    if factor == 1.0 {
        return Ok(track.clone());
    }
    track.retimed(factor)
}

/// Applies `gain`, then scales the whole track down if its peak exceeds `ceiling`, then clamps
/// to `[-1, 1]`.
pub fn shape_loudness(track: &AudioTrack, gain: f32, ceiling: f32) -> AudioTrack {
    let gained = track.with_gain(gain);
    let peak = gained.peak();
    let norm = if peak > ceiling && peak > 0.0 {
        ceiling / peak
    } else {
        1.0
    };
    gained.map_samples(|s| (s * norm).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(frames: usize, sample_rate: u32) -> AudioTrack {
        let mut s = vec![0.0f32; frames];
        s[0] = 1.0;
        AudioTrack::new(sample_rate, 1, s).unwrap()
    }

    #[test]
    fn echo_is_additive_and_delayed() {
        let t = impulse(200, 1000);
        let e = add_echo(&t, 0.080, 0.5);
        assert_eq!(e.frames(), 200);
        assert_eq!(e.samples()[0], 1.0);
        assert_eq!(e.samples()[80], 0.5);
        assert_eq!(e.samples()[79], 0.0);
        // input untouched
        assert_eq!(t.samples()[80], 0.0);
    }

    #[test]
    fn echo_longer_than_track_is_a_noop() {
        let t = impulse(10, 1000);
        assert_eq!(add_echo(&t, 0.080, 0.5), t);
    }

    #[test]
    fn rate_shift_changes_duration_with_pitch() {
        let t = AudioTrack::silent(44_100, 2, 44_100).unwrap();
        let up = shift_rate(&t, 1.03).unwrap();
        assert!((up.duration_secs() - 1.0 / 1.03).abs() < 1e-4);
        let down = shift_rate(&t, 0.97).unwrap();
        assert!((down.duration_secs() - 1.0 / 0.97).abs() < 1e-4);
    }

    #[test]
    fn loudness_respects_ceiling() {
        let t = AudioTrack::new(1000, 1, vec![0.9, -0.5, 0.2, 0.0]).unwrap();
        let shaped = shape_loudness(&t, 2.0, 0.98);
        assert!((shaped.peak() - 0.98).abs() < 1e-6);
        let quiet = shape_loudness(&t, 0.5, 0.98);
        assert!((quiet.samples()[0] - 0.45).abs() < 1e-6);
    }

    #[test]
    fn chain_output_matches_target_length() {
        let cfg = AudioConfig::default();
        let chain = AudioEffectChain::new(&cfg, 1.03, 0.0);
        let t = AudioTrack::silent(44_100, 2, 44_100).unwrap();
        for target in [40_000usize, 44_100, 50_000] {
            assert_eq!(chain.apply(&t, target).unwrap().frames(), target);
        }
    }
}
