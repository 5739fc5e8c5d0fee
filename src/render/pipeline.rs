//! One invocation: compose, retime, cut and encode a single source.

use std::{ops::Range, path::PathBuf, sync::Arc};

use rayon::prelude::*;

use crate::{
    assets::{
        source::{FrameSource, VideoInfo},
        text::{TextRaster, TextRenderer},
    },
    audio::{
        effects::AudioEffectChain,
        track::{AudioTrack, frame_to_sample},
    },
    composition::{
        aspect::AspectBranch,
        compositor::{Compositor, FrameInputs},
        overlay::OverlayMixer,
        plan::{CompositionPlan, LayerFx},
    },
    config::PipelineConfig,
    effects::{
        blend::stamp_raster,
        color::ColorGrade,
        watermark::{Corner, WatermarkStamper},
    },
    encode::{
        outputs::{OutputFactory, OutputKind},
        sink::{FrameSink, SinkConfig},
    },
    foundation::{
        cancel::CancelToken,
        core::Frame,
        error::{ReelError, ReelResult},
    },
    render::{
        params::EffectParameters,
        segment::{Segment, plan_segments},
        speed::SpeedSync,
    },
};

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct OutputRecord {
    pub kind: OutputKind,
    pub frames: u64,
    pub path: Option<PathBuf>,
}

/// What a finished run produced, and from which random draws.
#[derive(Clone, Debug, serde::Serialize)]
pub struct RunReport {
    pub seed: u64,
    pub params: EffectParameters,
    pub source: VideoInfo,
    pub branch: AspectBranch,
    pub overlays: usize,
    pub has_audio: bool,
    pub output_frames: u64,
    pub output_duration: f64,
    pub segments: Vec<Segment>,
    /// False when some episode went out without its label (no usable font).
    pub labels_stamped: bool,
    pub outputs: Vec<OutputRecord>,
}

pub struct Pipeline<'a> {
    cfg: &'a PipelineConfig,
    params: EffectParameters,
    text: &'a TextRenderer,
}

struct SegmentCut {
    kind: OutputKind,
    frames: Range<u64>,
    label: TextRaster,
    audio: Option<AudioTrack>,
}

struct FrameJob {
    main: Arc<Frame>,
    overlays: Vec<Option<Arc<Frame>>>,
    grade: ColorGrade,
    corner: Corner,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        cfg: &'a PipelineConfig,
        params: EffectParameters,
        text: &'a TextRenderer,
    ) -> ReelResult<Self> {
        cfg.validate()?;
        Ok(Self { cfg, params, text })
    }

    /// Layer stack for a source of `info`'s size with the loaded overlays on top.
    pub fn compositor_for(&self, info: &VideoInfo, overlays: &OverlayMixer) -> ReelResult<Compositor> {
        let cfg = self.cfg;
        let mut plan = CompositionPlan::for_source(info.width, info.height, &cfg.composition);
        if cfg.color.enabled {
            plan = plan.with_foreground_effect(LayerFx::ColorGrade);
        }
        if cfg.guide_line.enabled {
            plan = plan.with_foreground_effect(LayerFx::GuideLine {
                thickness: cfg.guide_line.thickness_px,
                color: cfg.guide_line.color,
            });
        }

        let watermark = if cfg.watermark.text.trim().is_empty() {
            None
        } else {
            let raster = self.text.render(
                &cfg.watermark.text,
                cfg.watermark.font_size,
                cfg.watermark.color,
            )?;
            if raster.is_empty() {
                tracing::warn!("no usable font, watermark skipped");
            }
            Some(WatermarkStamper {
                raster,
                opacity: cfg.watermark.opacity,
                margin_px: cfg.watermark.margin_px,
            })
        };
        if watermark.is_some() {
            plan = plan.with_watermark();
        }

        for (i, track) in overlays.tracks().enumerate() {
            if let Some((w, h)) = overlays.frame_size(i) {
                plan = plan.with_overlay(i, w, h, track.opacity);
            }
        }
        Ok(Compositor::new(plan, watermark))
    }

    #[tracing::instrument(
        skip_all,
        fields(source = %main.info().path.display(), seed = self.params.seed)
    )]
    pub fn run(
        &self,
        main: &mut dyn FrameSource,
        audio: Option<&AudioTrack>,
        overlays: &mut OverlayMixer,
        outputs: &mut dyn OutputFactory,
        cancel: &CancelToken,
    ) -> ReelResult<RunReport> {
        let cfg = self.cfg;
        let info = main.info().clone();
        let fps = cfg.encode.fps;
        let canvas = cfg.composition.target;

        let compositor = self.compositor_for(&info, overlays)?;
        let branch = compositor.plan().branch;
        let sync = SpeedSync::new(self.params.speed_factor, info.duration_sec, fps)?;
        let total_frames = sync.output_frames();
        let output_duration = sync.output_duration();
        tracing::info!(
            ?branch,
            speed = self.params.speed_factor,
            frames = total_frames,
            overlays = overlays.len(),
            "rendering"
        );

        let audio = audio.map(|a| self.process_audio(a, &sync)).transpose()?;

        let segments = plan_segments(
            output_duration,
            &cfg.segments,
            &mut self.params.segment_rng(),
        )?;
        let cuts = self.cut_segments(&segments, total_frames, audio.as_ref())?;
        if cuts.is_empty() {
            tracing::warn!(duration = output_duration, "output too short to cut any segment");
        }
        let labels_stamped = cuts.iter().all(|c| !c.label.is_empty());
        if !labels_stamped {
            tracing::warn!("no usable font, episode labels skipped");
        }

        let sink_cfg = |audio: Option<AudioTrack>| SinkConfig {
            width: canvas.width,
            height: canvas.height,
            fps,
            audio,
        };

        let mut records = Vec::new();
        let mut full = if cfg.write_full_output {
            let mut sink = outputs.open(OutputKind::Full)?;
            sink.begin(sink_cfg(audio.clone()))?;
            Some(sink)
        } else {
            None
        };

        let pool = if cfg.threading.parallel {
            Some(build_thread_pool(cfg.threading.threads)?)
        } else {
            None
        };
        let chunk_size = normalized_chunk_size(cfg.threading.chunk_size);
        let (label_x, label_y) = cfg.segments.label_position;

        let mut active: Option<(usize, Box<dyn FrameSink>)> = None;
        let mut next_cut = 0usize;
        let mut chunk_start = 0u64;
        while chunk_start < total_frames {
            cancel.check()?;
            let chunk_end = (chunk_start + chunk_size).min(total_frames);
            let jobs = self.gather(chunk_start..chunk_end, &sync, main, overlays)?;
            let frames = composite_chunk(&compositor, &jobs, pool.as_ref())?;

            for (k, mut frame) in (chunk_start..chunk_end).zip(frames) {
                if let Some(sink) = full.as_mut() {
                    sink.push_frame(k, &frame)?;
                }

                if active.is_none()
                    && let Some(cut) = cuts.get(next_cut)
                    && cut.frames.start == k
                {
                    let mut sink = outputs.open(cut.kind)?;
                    sink.begin(sink_cfg(cut.audio.clone()))?;
                    active = Some((next_cut, sink));
                    next_cut += 1;
                }

                let done = match active.as_mut() {
                    Some((i, sink)) => {
                        let cut = &cuts[*i];
                        let (x, y) = (i64::from(label_x), i64::from(label_y));
                        stamp_raster(&mut frame, &cut.label, x, y, 1.0);
                        sink.push_frame(k - cut.frames.start, &frame)?;
                        k + 1 >= cut.frames.end
                    }
                    None => false,
                };
                if done && let Some((i, mut sink)) = active.take() {
                    sink.end()?;
                    let cut = &cuts[i];
                    let path = outputs.finished(cut.kind)?;
                    records.push(OutputRecord {
                        kind: cut.kind,
                        frames: cut.frames.end - cut.frames.start,
                        path,
                    });
                }
            }
            tracing::debug!(done = chunk_end, total = total_frames, "chunk rendered");
            chunk_start = chunk_end;
        }

        if let Some((i, _)) = active {
            return Err(ReelError::evaluation(format!(
                "segment {} was not closed at end of render",
                cuts[i].kind.file_name()
            )));
        }
        if let Some(mut sink) = full {
            sink.end()?;
            let path = outputs.finished(OutputKind::Full)?;
            records.push(OutputRecord {
                kind: OutputKind::Full,
                frames: total_frames,
                path,
            });
        }

        tracing::info!(segments = segments.len(), "run finished");
        Ok(RunReport {
            seed: self.params.seed,
            params: self.params,
            source: info,
            branch,
            overlays: overlays.len(),
            has_audio: audio.is_some(),
            output_frames: total_frames,
            output_duration,
            segments,
            labels_stamped,
            outputs: records,
        })
    }

    /// Speed sync, then the effect chain when enabled. Always exactly as long as the video.
    fn process_audio(&self, track: &AudioTrack, sync: &SpeedSync) -> ReelResult<AudioTrack> {
        if !self.cfg.audio.enabled {
            return sync.retime_audio(track);
        }
        let retimed = track.retimed(sync.factor)?;
        let chain =
            AudioEffectChain::new(&self.cfg.audio, self.params.pitch_factor, self.params.gain_db);
        chain.apply(&retimed, sync.audio_frames(track.sample_rate))
    }

    fn cut_segments(
        &self,
        segments: &[Segment],
        total_frames: u64,
        audio: Option<&AudioTrack>,
    ) -> ReelResult<Vec<SegmentCut>> {
        let fps = self.cfg.encode.fps;
        let seg_cfg = &self.cfg.segments;
        let mut cuts = Vec::with_capacity(segments.len());
        for seg in segments {
            let frames = seg.frame_range(fps, total_frames);
            if frames.is_empty() {
                tracing::debug!(episode = seg.episode, "segment shorter than a frame, dropped");
                continue;
            }
            let label = self
                .text
                .render(&seg.label, seg_cfg.label_font_size, seg_cfg.label_color)?;
            let audio = audio.map(|a| {
                a.slice_frames(
                    frame_to_sample(frames.start, fps, a.sample_rate) as usize,
                    frame_to_sample(frames.end, fps, a.sample_rate) as usize,
                )
            });
            cuts.push(SegmentCut {
                kind: OutputKind::Segment(seg.episode),
                frames,
                label,
                audio,
            });
        }
        Ok(cuts)
    }

    /// Pulls source frames for a chunk. Sources are read strictly in order.
    fn gather(
        &self,
        frames: Range<u64>,
        sync: &SpeedSync,
        main: &mut dyn FrameSource,
        overlays: &mut OverlayMixer,
    ) -> ReelResult<Vec<FrameJob>> {
        frames
            .map(|k| {
                let t = sync.timeline_time(k);
                Ok(FrameJob {
                    main: main.frame_at(t)?,
                    overlays: overlays.frames_at(t)?,
                    grade: self.params.grade_for_frame(&self.cfg.color, k),
                    corner: self.params.corner_for_frame(&self.cfg.watermark, k),
                })
            })
            .collect()
    }
}

fn composite_chunk(
    compositor: &Compositor,
    jobs: &[FrameJob],
    pool: Option<&rayon::ThreadPool>,
) -> ReelResult<Vec<Frame>> {
    let render = |job: &FrameJob| {
        compositor.compose(&FrameInputs {
            main: &job.main,
            overlays: &job.overlays,
            grade: job.grade,
            corner: job.corner,
        })
    };
    match pool {
        Some(pool) => pool.install(|| jobs.par_iter().map(render).collect()),
        None => jobs.iter().map(render).collect(),
    }
}

pub(crate) fn build_thread_pool(threads: Option<usize>) -> ReelResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(ReelError::validation(
            "render threading 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| ReelError::evaluation(format!("failed to build rayon thread pool: {e}")))
}

fn normalized_chunk_size(chunk_size: usize) -> u64 {
    chunk_size.max(1) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threads_is_rejected() {
        assert!(build_thread_pool(Some(0)).is_err());
        assert!(build_thread_pool(Some(2)).is_ok());
    }

    #[test]
    fn chunk_size_floor_is_one() {
        assert_eq!(normalized_chunk_size(0), 1);
        assert_eq!(normalized_chunk_size(16), 16);
    }
}
