use std::{
    io::{BufReader, Read},
    path::{Path, PathBuf},
    process::{Child, ChildStdout, Command, Stdio},
    sync::Arc,
};

use crate::{
    assets::source::{FrameSource, VideoInfo},
    audio::track::AudioTrack,
    foundation::{
        core::{Canvas, Fps, Frame},
        error::{ReelError, ReelResult},
    },
};

pub const MIX_CHANNELS: u16 = 2;

#[tracing::instrument]
pub fn probe_video(source_path: &Path) -> ReelResult<VideoInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
        avg_frame_rate: Option<String>,
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        #[serde(default)]
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    if !source_path.is_file() {
        return Err(ReelError::asset(format!(
            "input '{}' does not exist or is not a file",
            source_path.display()
        )));
    }

    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(source_path)
        .output()
        .map_err(|e| ReelError::process(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(ReelError::asset(format!(
            "ffprobe could not read '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| ReelError::asset(format!("ffprobe json parse failed: {e}")))?;
    let video_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| {
            ReelError::asset(format!("no video stream in '{}'", source_path.display()))
        })?;
    let width = video_stream
        .width
        .filter(|w| *w > 0)
        .ok_or_else(|| ReelError::asset("missing video width from ffprobe"))?;
    let height = video_stream
        .height
        .filter(|h| *h > 0)
        .ok_or_else(|| ReelError::asset("missing video height from ffprobe"))?;

    let rate = [&video_stream.avg_frame_rate, &video_stream.r_frame_rate]
        .into_iter()
        .filter_map(|r| r.as_deref().and_then(parse_ff_ratio))
        .next()
        .ok_or_else(|| ReelError::asset("invalid video frame rate from ffprobe"))?;
    let fps = Fps::new(rate.0, rate.1)?;

    let duration_sec = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video_stream.duration.as_deref())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| {
            ReelError::asset(format!("unknown duration for '{}'", source_path.display()))
        })?;
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(VideoInfo {
        path: source_path.to_path_buf(),
        width,
        height,
        duration_sec,
        fps,
        has_audio,
    })
}

/// Decodes the audio stream as interleaved stereo `f32`. `None` when the file has no audio.
#[tracing::instrument]
pub fn decode_audio(path: &Path, sample_rate: u32) -> ReelResult<Option<AudioTrack>> {
    let out = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            &MIX_CHANNELS.to_string(),
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| ReelError::process(format!("failed to run ffmpeg for audio decode: {e}")))?;

    if !out.status.success() {
        let msg = String::from_utf8_lossy(&out.stderr);
        // ffmpeg reports a missing audio stream as an error.
        if msg.contains("Stream specifier")
            || msg.contains("matches no streams")
            || msg.contains("does not contain any stream")
        {
            return Ok(None);
        }
        return Err(ReelError::asset(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            msg.trim()
        )));
    }

    if !out.stdout.len().is_multiple_of(4) {
        return Err(ReelError::evaluation(
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }
    let samples = out
        .stdout
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect::<Vec<_>>();
    if samples.is_empty() {
        return Ok(None);
    }
    AudioTrack::new(sample_rate, MIX_CHANNELS, samples).map(Some)
}

/// Streams `rgb24` frames out of an `ffmpeg` child, resampled to the probed frame rate.
///
/// Forward access reads sequentially; a backward seek respawns the decoder at the requested
/// frame. Past the end of the stream the last decoded frame is held.
pub struct FfmpegVideoReader {
    info: VideoInfo,
    scale_to: Option<Canvas>,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
    next_index: u64,
    current: Option<(u64, Arc<Frame>)>,
    at_eof: bool,
}

impl FfmpegVideoReader {
    /// Probes `path`; ffmpeg scales every frame to `size` while decoding.
    pub fn open_scaled(path: &Path, size: Canvas) -> ReelResult<Self> {
        Ok(Self::from_info(probe_video(path)?, Some(size)))
    }

    pub fn from_info(info: VideoInfo, scale_to: Option<Canvas>) -> Self {
        Self {
            info,
            scale_to,
            child: None,
            stdout: None,
            next_index: 0,
            current: None,
            at_eof: false,
        }
    }

    fn frame_size(&self) -> (u32, u32) {
        match self.scale_to {
            Some(c) => (c.width, c.height),
            None => (self.info.width, self.info.height),
        }
    }

    fn spawn_at(&mut self, index: u64) -> ReelResult<()> {
        self.stop();

        let fps = self.info.fps;
        let mut filter = format!("fps={}/{}", fps.num, fps.den);
        if let Some(c) = self.scale_to {
            filter.push_str(&format!(",scale={}:{}", c.width, c.height));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .args(["-v", "error"]);
        if index > 0 {
            cmd.args(["-ss", &format!("{:.6}", fps.frames_to_secs(index))]);
        }
        cmd.arg("-i")
            .arg(&self.info.path)
            .args(["-an", "-vf", &filter, "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"]);

        let mut child = cmd.spawn().map_err(|e| {
            ReelError::process(format!(
                "failed to spawn ffmpeg decoder (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReelError::process("failed to open ffmpeg stdout (unexpected)"))?;

        self.stdout = Some(BufReader::with_capacity(1 << 20, stdout));
        self.child = Some(child);
        self.next_index = index;
        self.at_eof = false;
        Ok(())
    }

    fn read_next(&mut self) -> ReelResult<bool> {
        let (w, h) = self.frame_size();
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(false);
        };
        let mut buf = vec![0u8; w as usize * h as usize * 3];
        match stdout.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.at_eof = true;
                self.stop();
                return Ok(false);
            }
            Err(e) => {
                return Err(ReelError::process(format!(
                    "failed reading frames from ffmpeg for '{}': {e}",
                    self.info.path.display()
                )));
            }
        }
        let frame = Frame::from_raw(w, h, buf)
            .ok_or_else(|| ReelError::evaluation("decoded frame buffer has wrong size"))?;
        self.current = Some((self.next_index, Arc::new(frame)));
        self.next_index += 1;
        Ok(true)
    }

    fn stop(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl FrameSource for FfmpegVideoReader {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn frame_at(&mut self, t: f64) -> ReelResult<Arc<Frame>> {
        let want = self.info.frame_index_at(t);
        if let Some((idx, frame)) = &self.current
            && *idx == want
        {
            return Ok(frame.clone());
        }

        if self.at_eof
            && let Some((idx, frame)) = &self.current
            && want > *idx
        {
            return Ok(frame.clone());
        }

        let behind = self.current.as_ref().is_some_and(|(idx, _)| want < *idx);
        if behind || (self.child.is_none() && !self.at_eof) {
            self.spawn_at(want)?;
        }

        while self.next_index <= want {
            if !self.read_next()? {
                break;
            }
        }

        self.current
            .as_ref()
            .map(|(_, f)| f.clone())
            .ok_or_else(|| {
                ReelError::asset(format!(
                    "ffmpeg produced no frames for '{}'",
                    self.info.path.display()
                ))
            })
    }
}

impl Drop for FfmpegVideoReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let mut parts = s.split('/');
    let a = parts.next()?.trim().parse::<u32>().ok()?;
    let b = match parts.next() {
        Some(b) => b.trim().parse::<u32>().ok()?,
        None => 1,
    };
    if a == 0 || b == 0 {
        return None;
    }
    Some((a, b))
}

pub fn source_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn overlay_paths_present(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths.iter().filter(|p| p.is_file()).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_parsing() {
        assert_eq!(parse_ff_ratio("30000/1001"), Some((30_000, 1001)));
        assert_eq!(parse_ff_ratio("25"), Some((25, 1)));
        assert_eq!(parse_ff_ratio("0/0"), None);
        assert_eq!(parse_ff_ratio("abc"), None);
    }

    #[test]
    fn missing_file_is_an_asset_error() {
        let err = probe_video(Path::new("definitely/not/here.mp4")).unwrap_err();
        assert!(matches!(err, ReelError::Asset(_)));
    }

    #[test]
    fn missing_overlays_are_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("a.mp4");
        std::fs::write(&present, b"x").unwrap();
        let paths = vec![present.clone(), dir.path().join("b.mp4")];
        assert_eq!(overlay_paths_present(&paths), vec![present]);
    }
}
