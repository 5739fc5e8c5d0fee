//! Runs many inputs, each into its own numbered run directory.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use rayon::prelude::*;

use crate::{
    assets::{
        media::{FfmpegVideoReader, decode_audio, probe_video, source_label},
        text::TextRenderer,
    },
    composition::overlay::OverlayMixer,
    config::PipelineConfig,
    encode::{
        metadata::{FfmpegMetadataRewriter, MetadataRecord},
        outputs::FileOutputs,
    },
    foundation::{
        cancel::CancelToken,
        error::{ReelError, ReelResult},
        random::fresh_seed,
    },
    render::{
        params::EffectParameters,
        pipeline::{Pipeline, RunReport, build_thread_pool},
    },
};

/// Coarse per-input progress reported to the operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Processing,
    /// Finished; artifacts are in the run directory.
    Done(PathBuf),
    Error(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processing => f.write_str("processing"),
            Self::Done(dir) => write!(f, "done -> {}", dir.display()),
            Self::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

#[derive(Debug)]
pub struct FileOutcome {
    pub input: PathBuf,
    /// Run directory and report on success.
    pub result: ReelResult<(PathBuf, RunReport)>,
}

impl FileOutcome {
    pub fn status(&self) -> Status {
        match &self.result {
            Ok((dir, _)) => Status::Done(dir.clone()),
            Err(e) => Status::Error(e.to_string()),
        }
    }

    pub fn run_dir(&self) -> Option<&Path> {
        self.result.as_ref().ok().map(|(dir, _)| dir.as_path())
    }

    pub fn report(&self) -> Option<&RunReport> {
        self.result.as_ref().ok().map(|(_, report)| report)
    }
}

/// Reserves the next free `run_{n}` directory under `root`.
///
/// `create_dir` is the reservation, so concurrent callers never share a directory.
pub fn allocate_run_dir(root: &Path) -> ReelResult<PathBuf> {
    use anyhow::Context as _;

    std::fs::create_dir_all(root)
        .with_context(|| format!("failed to create output root '{}'", root.display()))?;
    let mut n = next_run_number(root)?;
    loop {
        let dir = root.join(format!("run_{n}"));
        match std::fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("failed to create run directory '{}'", dir.display()))
                    .into());
            }
        }
    }
}

fn next_run_number(root: &Path) -> ReelResult<u64> {
    use anyhow::Context as _;

    let entries = std::fs::read_dir(root)
        .with_context(|| format!("failed to list output root '{}'", root.display()))?;
    let max = entries
        .flatten()
        .filter_map(|e| {
            e.file_name()
                .to_str()
                .and_then(|n| n.strip_prefix("run_"))
                .and_then(|n| n.parse::<u64>().ok())
        })
        .max()
        .unwrap_or(0);
    Ok(max + 1)
}

/// Probes, decodes and renders one input into a fresh run directory under `out_root`.
#[tracing::instrument(skip(cfg, text, cancel), fields(input = %input.display()))]
pub fn process_file(
    input: &Path,
    out_root: &Path,
    cfg: &PipelineConfig,
    text: &TextRenderer,
    cancel: &CancelToken,
) -> ReelResult<(PathBuf, RunReport)> {
    cfg.validate()?;
    cancel.check()?;
    let info = probe_video(input)?;
    let seed = cfg.seed.unwrap_or_else(fresh_seed);
    tracing::info!(
        seed,
        width = info.width,
        height = info.height,
        duration = info.duration_sec,
        "probed input"
    );

    let params = EffectParameters::draw(cfg, seed);
    let audio = if info.has_audio {
        decode_audio(input, cfg.audio.sample_rate)?
    } else {
        None
    };
    let mut overlays = OverlayMixer::load(
        &cfg.overlays.paths(),
        cfg.composition.target,
        info.duration_sec,
        cfg.overlays.opacity,
    )?;
    let mut main = FfmpegVideoReader::from_info(info, None);

    let pipeline = Pipeline::new(cfg, params, text)?;
    in_run_dir(out_root, |run_dir| {
        let mut outputs = FileOutputs::new(run_dir, cfg.encode.clone());
        if cfg.metadata.enabled {
            outputs = outputs.with_metadata(
                Box::new(FfmpegMetadataRewriter),
                MetadataRecord::new(cfg.metadata.tags.clone()),
            );
        }
        pipeline.run(&mut main, audio.as_ref(), &mut overlays, &mut outputs, cancel)
    })
}

/// Runs `f` inside a freshly reserved run directory.
///
/// On error the directory is removed together with any artifact already finished in it.
fn in_run_dir<T>(
    out_root: &Path,
    f: impl FnOnce(&Path) -> ReelResult<T>,
) -> ReelResult<(PathBuf, T)> {
    let run_dir = allocate_run_dir(out_root)?;
    match f(&run_dir) {
        Ok(v) => Ok((run_dir, v)),
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_dir_all(&run_dir) {
                tracing::warn!(
                    dir = %run_dir.display(),
                    error = %cleanup,
                    "failed to remove run directory of a failed run"
                );
            }
            Err(e)
        }
    }
}

/// Processes `inputs` on up to `jobs` worker threads.
///
/// Each input succeeds or fails on its own; `on_status` sees every transition.
pub fn process_batch(
    inputs: &[PathBuf],
    out_root: &Path,
    cfg: &PipelineConfig,
    jobs: usize,
    cancel: &CancelToken,
    on_status: &(dyn Fn(&Path, &Status) + Sync),
) -> ReelResult<Vec<FileOutcome>> {
    if jobs == 0 {
        return Err(ReelError::validation("jobs must be >= 1"));
    }
    cfg.validate()?;
    let text = TextRenderer::new(cfg.font_dir.as_deref());
    let pool = build_thread_pool(Some(jobs))?;

    let outcomes = pool.install(|| {
        inputs
            .par_iter()
            .map(|input| {
                on_status(input, &Status::Processing);
                let result = process_file(input, out_root, cfg, &text, cancel);
                if let Err(e) = &result {
                    tracing::error!(input = %source_label(input), error = %e, "input failed");
                }
                let outcome = FileOutcome {
                    input: input.clone(),
                    result,
                };
                on_status(input, &outcome.status());
                outcome
            })
            .collect::<Vec<_>>()
    });
    Ok(outcomes)
}
