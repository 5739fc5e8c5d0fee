//! Duration-bounded episode cuts of the synced output.

use std::ops::Range;

use rand::Rng;

use crate::{
    config::SegmentConfig,
    foundation::{
        core::Fps,
        error::{ReelError, ReelResult},
    },
};

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    /// 1-based.
    pub episode: usize,
    pub label: String,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Output frames belonging to this segment, clipped to `total_frames`.
    ///
    /// Adjacent segments share their boundary frame index, so ranges never overlap or leave
    /// gaps. A segment shorter than half a frame still owns one frame.
    pub fn frame_range(&self, fps: Fps, total_frames: u64) -> Range<u64> {
        let start = fps.secs_to_frames_round(self.start).min(total_frames);
        let end = fps
            .secs_to_frames_round(self.end)
            .max(start + 1)
            .min(total_frames);
        start..end
    }
}

/// Cuts `[0, total - epsilon)` into consecutive segments of random length.
///
/// Every segment but the last has a length drawn from `cfg.duration`; the last one ends at
/// `total - epsilon` and may be shorter.
#[tracing::instrument(skip(cfg, rng), fields(min = cfg.duration.min, max = cfg.duration.max))]
pub fn plan_segments<R: Rng + ?Sized>(
    total: f64,
    cfg: &SegmentConfig,
    rng: &mut R,
) -> ReelResult<Vec<Segment>> {
    if !(total.is_finite() && total >= 0.0) {
        return Err(ReelError::validation("segment plan needs a finite duration"));
    }
    cfg.duration.validate("segments.duration")?;
    if cfg.duration.min <= 0.0 {
        return Err(ReelError::validation("segment duration min must be > 0"));
    }

    let limit = total - cfg.epsilon;
    let mut out = Vec::new();
    let mut t = 0.0;
    while t < limit {
        let len = cfg.duration.sample(rng);
        let end = (t + len).min(limit);
        let episode = out.len() + 1;
        out.push(Segment {
            start: t,
            end,
            episode,
            label: format!("{}{}", cfg.label_prefix, episode),
        });
        t = end;
    }
    tracing::debug!(count = out.len(), "planned segments");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::random::{UniformRange, run_rng};

    fn cfg() -> SegmentConfig {
        SegmentConfig::default()
    }

    fn check_partition(segs: &[Segment], total: f64, eps: f64) {
        let mut expect_start = 0.0;
        for (i, s) in segs.iter().enumerate() {
            assert_eq!(s.start, expect_start);
            assert!(s.end > s.start);
            assert_eq!(s.episode, i + 1);
            assert!(s.end <= total);
            expect_start = s.end;
        }
        if let Some(last) = segs.last() {
            assert!((last.end - (total - eps)).abs() < 1e-9);
        }
    }

    #[test]
    fn partitions_for_many_durations_and_seeds() {
        let c = cfg();
        for seed in 0..50 {
            for total in [0.5, 59.0, 61.0, 100.0, 137.2, 600.0, 3600.0] {
                let segs = plan_segments(total, &c, &mut run_rng(seed)).unwrap();
                assert!(!segs.is_empty());
                check_partition(&segs, total, c.epsilon);
                for s in &segs[..segs.len() - 1] {
                    let d = s.duration();
                    assert!(d >= c.duration.min - 1e-9 && d <= c.duration.max + 1e-9);
                }
                assert!(segs.last().unwrap().duration() <= c.duration.max + 1e-9);
                let expected = (total / c.duration.midpoint()).ceil() as i64;
                let n = segs.len() as i64;
                let tol = (total / c.duration.min - total / c.duration.max).ceil() as i64 + 1;
                assert!((n - expected).abs() <= tol, "total={total} n={n}");
            }
        }
    }

    #[test]
    fn labels_count_up_from_one() {
        let segs = plan_segments(200.0, &cfg(), &mut run_rng(1)).unwrap();
        let labels: Vec<_> = segs.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels[0], "Ep1");
        assert_eq!(labels[1], "Ep2");
    }

    #[test]
    fn short_total_gives_one_segment() {
        let segs = plan_segments(50.0, &cfg(), &mut run_rng(9)).unwrap();
        assert_eq!(segs.len(), 1);
        assert!((segs[0].end - 49.95).abs() < 1e-9);
    }

    #[test]
    fn nothing_to_cut_below_epsilon() {
        assert!(plan_segments(0.04, &cfg(), &mut run_rng(0)).unwrap().is_empty());
        assert!(plan_segments(0.0, &cfg(), &mut run_rng(0)).unwrap().is_empty());
    }

    #[test]
    fn fixed_length_cuts_exactly() {
        let c = SegmentConfig {
            duration: UniformRange::fixed(10.0),
            epsilon: 0.0,
            ..cfg()
        };
        let segs = plan_segments(25.0, &c, &mut run_rng(0)).unwrap();
        let bounds: Vec<_> = segs.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(bounds, vec![(0.0, 10.0), (10.0, 20.0), (20.0, 25.0)]);
    }

    #[test]
    fn frame_ranges_tile_the_output() {
        let fps = Fps::new(30, 1).unwrap();
        let total_frames = 30 * 200;
        let segs = plan_segments(200.0, &cfg(), &mut run_rng(3)).unwrap();
        let mut next = 0;
        for s in &segs {
            let r = s.frame_range(fps, total_frames);
            assert_eq!(r.start, next);
            assert!(!r.is_empty());
            next = r.end;
        }
        // The epsilon tail is not part of any segment.
        assert_eq!(next, fps.secs_to_frames_round(200.0 - 0.05));
    }

    #[test]
    fn rejects_non_positive_minimum() {
        let c = SegmentConfig {
            duration: UniformRange::new(0.0, 5.0),
            ..cfg()
        };
        assert!(plan_segments(10.0, &c, &mut run_rng(0)).is_err());
    }
}
