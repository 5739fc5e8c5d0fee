use std::{
    ffi::OsString,
    io::{Read, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
};

use crate::{
    config::EncodeSettings,
    encode::sink::{FrameSink, SinkConfig},
    foundation::{
        core::Frame,
        error::{ReelError, ReelResult},
    },
};

/// Options for [`FfmpegSink`] MP4 output.
#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    pub out_path: PathBuf,
    /// Overwrite the output file if it already exists.
    pub overwrite: bool,
    pub settings: EncodeSettings,
}

impl FfmpegSinkOpts {
    pub fn new(out_path: impl Into<PathBuf>, settings: EncodeSettings) -> Self {
        Self {
            out_path: out_path.into(),
            overwrite: true,
            settings,
        }
    }
}

/// Spawns the system `ffmpeg` and streams raw `rgb24` frames to its stdin.
///
/// Encodes into `<out>.partial` and renames on a clean `end`. A sink dropped before `end`
/// kills the encoder and removes the partial file.
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    audio_file: Option<tempfile::NamedTempFile>,

    cfg: Option<SinkConfig>,
    last_idx: Option<u64>,
}

impl FfmpegSink {
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        Self {
            opts,
            child: None,
            stdin: None,
            stderr_drain: None,
            audio_file: None,
            cfg: None,
            last_idx: None,
        }
    }

    pub fn partial_path(&self) -> PathBuf {
        partial_path(&self.opts.out_path)
    }

    fn kill(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.stderr_drain.take() {
            let _ = handle.join();
        }
        let _ = std::fs::remove_file(self.partial_path());
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()> {
        if cfg.width == 0 || cfg.height == 0 {
            return Err(ReelError::validation(
                "ffmpeg sink width/height must be non-zero",
            ));
        }
        if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
            return Err(ReelError::validation(
                "ffmpeg sink width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        self.opts.settings.validate()?;

        ensure_parent_dir(&self.opts.out_path)?;
        if !self.opts.overwrite && self.opts.out_path.exists() {
            return Err(ReelError::validation(format!(
                "output file '{}' already exists",
                self.opts.out_path.display()
            )));
        }

        if !is_ffmpeg_on_path() {
            return Err(ReelError::process(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }

        let audio_path = match cfg.audio.as_ref() {
            Some(track) => {
                let mut f = tempfile::Builder::new()
                    .prefix("reelsync-audio-")
                    .suffix(".f32le")
                    .tempfile()
                    .map_err(|e| ReelError::process(format!("failed to create audio temp file: {e}")))?;
                f.write_all(&track.to_f32le_bytes())
                    .and_then(|()| f.flush())
                    .map_err(|e| ReelError::process(format!("failed to write audio temp file: {e}")))?;
                let path = f.path().to_path_buf();
                self.audio_file = Some(f);
                Some(path)
            }
            None => None,
        };

        let args = encode_args(
            &cfg,
            &self.opts.settings,
            audio_path.as_deref(),
            &self.partial_path(),
        );
        tracing::debug!(out = %self.opts.out_path.display(), "spawning ffmpeg encoder");

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ReelError::process(format!(
                    "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelError::process("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::process("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.last_idx = None;
        Ok(())
    }

    fn push_frame(&mut self, idx: u64, frame: &Frame) -> ReelResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| ReelError::evaluation("ffmpeg sink not started"))?;
        if let Some(last) = self.last_idx
            && idx <= last
        {
            return Err(ReelError::evaluation(
                "ffmpeg sink received out-of-order frame index",
            ));
        }
        self.last_idx = Some(idx);

        if frame.dimensions() != (cfg.width, cfg.height) {
            return Err(ReelError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                cfg.width,
                cfg.height
            )));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ReelError::evaluation("ffmpeg sink is already finalized"));
        };
        stdin.write_all(frame.as_raw()).map_err(|e| {
            ReelError::process(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        Ok(())
    }

    fn end(&mut self) -> ReelResult<()> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| ReelError::evaluation("ffmpeg sink not started"))?;

        let status = child
            .wait()
            .map_err(|e| ReelError::process(format!("failed to wait for ffmpeg to finish: {e}")))?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ReelError::evaluation("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| ReelError::process(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };
        self.audio_file = None;

        let partial = self.partial_path();
        if !status.success() {
            let _ = std::fs::remove_file(&partial);
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(ReelError::process(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }

        std::fs::rename(&partial, &self.opts.out_path).map_err(|e| {
            ReelError::process(format!(
                "failed to move '{}' into place: {e}",
                partial.display()
            ))
        })?;
        self.cfg = None;
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.kill();
        }
    }
}

/// Full `ffmpeg` argument vector for one encode. Never passed through a shell.
pub fn encode_args(
    cfg: &SinkConfig,
    settings: &EncodeSettings,
    audio_path: Option<&Path>,
    out_path: &Path,
) -> Vec<OsString> {
    let mut args = Vec::<OsString>::new();
    let size = format!("{}x{}", cfg.width, cfg.height);
    let rate = format!("{}/{}", cfg.fps.num, cfg.fps.den);
    push_args(
        &mut args,
        &[
            "-y", "-loglevel", "error", "-f", "rawvideo", "-pix_fmt", "rgb24", "-s", &size, "-r",
            &rate, "-i", "pipe:0",
        ],
    );

    let audio = cfg.audio.as_ref().zip(audio_path);
    if let Some((track, path)) = audio {
        let ar = track.sample_rate.to_string();
        let ac = track.channels.to_string();
        push_args(&mut args, &["-f", "f32le", "-ar", &ar, "-ac", &ac, "-i"]);
        args.push(path.as_os_str().to_owned());
    }

    push_args(
        &mut args,
        &[
            "-map",
            "0:v:0",
            "-c:v",
            &settings.video_codec,
            "-b:v",
            &settings.bitrate,
            "-pix_fmt",
            &settings.pix_fmt,
        ],
    );
    if audio.is_some() {
        push_args(&mut args, &["-map", "1:a:0", "-c:a", &settings.audio_codec]);
    } else {
        args.push("-an".into());
    }
    push_args(&mut args, &["-movflags", "+faststart", "-f", "mp4"]);
    args.push(out_path.as_os_str().to_owned());
    args
}

fn push_args(args: &mut Vec<OsString>, items: &[&str]) {
    args.extend(items.iter().map(OsString::from));
}

/// `<out>.partial`, next to the final output.
pub fn partial_path(out: &Path) -> PathBuf {
    let mut name = out.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ReelResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::track::AudioTrack, foundation::core::Fps};

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn cfg(audio: Option<AudioTrack>) -> SinkConfig {
        SinkConfig {
            width: 720,
            height: 1280,
            fps: Fps::new(60, 1).unwrap(),
            audio,
        }
    }

    #[test]
    fn video_only_args() {
        let args = strings(&encode_args(
            &cfg(None),
            &EncodeSettings::default(),
            None,
            Path::new("out/segment_1.mp4.partial"),
        ));
        let joined = args.join(" ");
        assert!(joined.contains("-s 720x1280 -r 60/1 -i pipe:0"));
        assert!(joined.contains("-c:v libx265 -b:v 8000k -pix_fmt yuv420p"));
        assert!(args.contains(&"-an".to_string()));
        assert_eq!(args.last().unwrap(), "out/segment_1.mp4.partial");
        assert_eq!(args[args.len() - 3..args.len() - 1], ["-f", "mp4"]);
    }

    #[test]
    fn audio_input_is_mapped() {
        let track = AudioTrack::silent(44_100, 2, 10).unwrap();
        let args = strings(&encode_args(
            &cfg(Some(track)),
            &EncodeSettings::default(),
            Some(Path::new("/tmp/a.f32le")),
            Path::new("x.mp4"),
        ));
        let joined = args.join(" ");
        assert!(joined.contains("-f f32le -ar 44100 -ac 2 -i /tmp/a.f32le"));
        assert!(joined.contains("-map 1:a:0 -c:a aac"));
        assert!(!args.contains(&"-an".to_string()));
    }

    #[test]
    fn paths_with_spaces_stay_one_argument() {
        let args = encode_args(
            &cfg(None),
            &EncodeSettings::default(),
            None,
            Path::new("my run/final output.mp4"),
        );
        assert_eq!(args.last().unwrap(), "my run/final output.mp4");
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("a/segment_2.mp4")),
            PathBuf::from("a/segment_2.mp4.partial")
        );
    }

    #[test]
    fn odd_dimensions_are_rejected_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(
            dir.path().join("x.mp4"),
            EncodeSettings::default(),
        ));
        let mut c = cfg(None);
        c.width = 719;
        assert!(matches!(sink.begin(c), Err(ReelError::Validation(_))));
    }
}
