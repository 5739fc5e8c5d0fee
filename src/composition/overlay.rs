//! Overlay tracks tiled over the main timeline.

use std::{path::PathBuf, sync::Arc};

use crate::{
    assets::{
        media::{FfmpegVideoReader, overlay_paths_present},
        source::FrameSource,
    },
    foundation::{
        core::{Canvas, Frame},
        error::{ReelError, ReelResult},
    },
};

/// Timing of one overlay clip repeated back to back until it covers the main timeline.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct OverlayTrack {
    pub source_duration: f64,
    pub timeline_duration: f64,
    pub opacity: f32,
}

impl OverlayTrack {
    pub fn new(source_duration: f64, timeline_duration: f64, opacity: f32) -> ReelResult<Self> {
        if !(source_duration.is_finite() && source_duration > 0.0) {
            return Err(ReelError::validation("overlay duration must be > 0"));
        }
        if !(timeline_duration.is_finite() && timeline_duration > 0.0) {
            return Err(ReelError::validation("timeline duration must be > 0"));
        }
        Ok(Self {
            source_duration,
            timeline_duration,
            opacity,
        })
    }

    /// How many copies of the clip are laid end to end; the last one is trimmed.
    pub fn repetitions(&self) -> u64 {
        (self.timeline_duration / self.source_duration).ceil().max(1.0) as u64
    }

    /// Always exactly the main timeline duration.
    pub fn duration(&self) -> f64 {
        self.timeline_duration
    }

    /// Time inside the overlay clip shown at main timeline time `t`. `None` outside the timeline.
    pub fn local_time(&self, t: f64) -> Option<f64> {
        if !(t >= 0.0 && t < self.timeline_duration) {
            return None;
        }
        Some(t.rem_euclid(self.source_duration))
    }
}

struct LoadedOverlay {
    track: OverlayTrack,
    source: Box<dyn FrameSource>,
}

/// The overlay tracks of one run, in stacking order.
///
/// Overlays that are missing on disk, or that cannot be opened, are left out.
pub struct OverlayMixer {
    overlays: Vec<LoadedOverlay>,
}

impl OverlayMixer {
    pub fn empty() -> Self {
        Self {
            overlays: Vec::new(),
        }
    }

    /// Opens every overlay in `paths` that exists, decoded straight at `canvas` size.
    #[tracing::instrument(skip(paths), fields(candidates = paths.len()))]
    pub fn load(
        paths: &[PathBuf],
        canvas: Canvas,
        timeline_duration: f64,
        opacity: f32,
    ) -> ReelResult<Self> {
        let mut mixer = Self::empty();
        let present = overlay_paths_present(paths);
        for missing in paths.iter().filter(|p| !present.contains(p)) {
            tracing::debug!(path = %missing.display(), "overlay not found, skipping");
        }
        for path in present {
            match FfmpegVideoReader::open_scaled(&path, canvas) {
                Ok(reader) => mixer.push(Box::new(reader), timeline_duration, opacity)?,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "overlay unreadable, skipping");
                }
            }
        }
        Ok(mixer)
    }

    pub fn push(
        &mut self,
        source: Box<dyn FrameSource>,
        timeline_duration: f64,
        opacity: f32,
    ) -> ReelResult<()> {
        let track = OverlayTrack::new(source.info().duration_sec, timeline_duration, opacity)?;
        self.overlays.push(LoadedOverlay { track, source });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    pub fn tracks(&self) -> impl Iterator<Item = &OverlayTrack> {
        self.overlays.iter().map(|o| &o.track)
    }

    /// Frame dimensions of overlay `index`.
    pub fn frame_size(&self, index: usize) -> Option<(u32, u32)> {
        self.overlays
            .get(index)
            .map(|o| (o.source.info().width, o.source.info().height))
    }

    /// Current frame of every overlay at main timeline time `t`, indexed like the tracks.
    pub fn frames_at(&mut self, t: f64) -> ReelResult<Vec<Option<Arc<Frame>>>> {
        self.overlays
            .iter_mut()
            .map(|o| match o.track.local_time(t) {
                Some(local) => o.source.frame_at(local).map(Some),
                None => Ok(None),
            })
            .collect()
    }
}
