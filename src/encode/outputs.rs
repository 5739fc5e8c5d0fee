//! Where a run's artifacts go.

use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use crate::{
    config::EncodeSettings,
    encode::{
        ffmpeg::{FfmpegSink, FfmpegSinkOpts},
        metadata::{MetadataRecord, MetadataRewriter},
        sink::{FrameSink, InMemorySink, SinkConfig},
    },
    foundation::{
        core::Frame,
        error::{ReelError, ReelResult},
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// The whole synced artifact.
    Full,
    /// Episode `n`, 1-based.
    Segment(usize),
}

impl OutputKind {
    pub fn file_name(self) -> String {
        match self {
            Self::Full => "final_output.mp4".to_string(),
            Self::Segment(n) => format!("segment_{n}.mp4"),
        }
    }
}

/// Opens one sink per artifact of a run.
pub trait OutputFactory {
    fn open(&mut self, kind: OutputKind) -> ReelResult<Box<dyn FrameSink>>;

    /// Called once the sink for `kind` ended cleanly. Returns where the artifact landed, if
    /// anywhere on disk.
    fn finished(&mut self, kind: OutputKind) -> ReelResult<Option<PathBuf>>;
}

/// MP4 files in one run directory, encoded by `ffmpeg`.
pub struct FileOutputs {
    dir: PathBuf,
    settings: EncodeSettings,
    metadata: Option<(Box<dyn MetadataRewriter>, MetadataRecord)>,
}

impl FileOutputs {
    pub fn new(dir: impl Into<PathBuf>, settings: EncodeSettings) -> Self {
        Self {
            dir: dir.into(),
            settings,
            metadata: None,
        }
    }

    /// Rewrites the container tags of the full artifact once it is encoded.
    pub fn with_metadata(
        mut self,
        rewriter: Box<dyn MetadataRewriter>,
        record: MetadataRecord,
    ) -> Self {
        self.metadata = Some((rewriter, record));
        self
    }

    pub fn path_for(&self, kind: OutputKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }
}

impl OutputFactory for FileOutputs {
    fn open(&mut self, kind: OutputKind) -> ReelResult<Box<dyn FrameSink>> {
        let opts = FfmpegSinkOpts::new(self.path_for(kind), self.settings.clone());
        Ok(Box::new(FfmpegSink::new(opts)))
    }

    fn finished(&mut self, kind: OutputKind) -> ReelResult<Option<PathBuf>> {
        let path = self.path_for(kind);
        if kind == OutputKind::Full
            && let Some((rewriter, record)) = &self.metadata
        {
            rewriter.rewrite(&path, record)?;
        }
        tracing::info!(path = %path.display(), "wrote output");
        Ok(Some(path))
    }
}

/// Keeps every artifact in memory. Used by tests and dry runs.
#[derive(Default)]
pub struct MemoryOutputs {
    sinks: BTreeMap<OutputKind, Arc<Mutex<InMemorySink>>>,
    finished: Vec<OutputKind>,
}

impl MemoryOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(&self) -> Vec<OutputKind> {
        self.sinks.keys().copied().collect()
    }

    pub fn finished_kinds(&self) -> &[OutputKind] {
        &self.finished
    }

    /// Runs `f` on the captured sink for `kind`.
    pub fn with_sink<T>(&self, kind: OutputKind, f: impl FnOnce(&InMemorySink) -> T) -> Option<T> {
        let sink = self.sinks.get(&kind)?;
        let guard = sink.lock().ok()?;
        Some(f(&guard))
    }
}

impl OutputFactory for MemoryOutputs {
    fn open(&mut self, kind: OutputKind) -> ReelResult<Box<dyn FrameSink>> {
        let sink = Arc::new(Mutex::new(InMemorySink::new()));
        self.sinks.insert(kind, sink.clone());
        Ok(Box::new(SharedSink(sink)))
    }

    fn finished(&mut self, kind: OutputKind) -> ReelResult<Option<PathBuf>> {
        self.finished.push(kind);
        Ok(None)
    }
}

struct SharedSink(Arc<Mutex<InMemorySink>>);

impl SharedSink {
    fn lock(&self) -> ReelResult<std::sync::MutexGuard<'_, InMemorySink>> {
        self.0
            .lock()
            .map_err(|_| ReelError::evaluation("memory sink lock poisoned"))
    }
}

impl FrameSink for SharedSink {
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()> {
        self.lock()?.begin(cfg)
    }

    fn push_frame(&mut self, idx: u64, frame: &Frame) -> ReelResult<()> {
        self.lock()?.push_frame(idx, frame)
    }

    fn end(&mut self) -> ReelResult<()> {
        self.lock()?.end()
    }
}
