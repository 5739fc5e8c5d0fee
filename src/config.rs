//! Pipeline configuration.
//!
//! Every knob of the transformation lives here. A config file is plain JSON; any omitted field
//! takes its default, so `{}` is a valid config.

use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path, path::PathBuf};

use anyhow::Context as _;

use crate::foundation::{
    core::{Canvas, Fps},
    error::{ReelError, ReelResult},
    random::{JitterMode, UniformRange},
};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub composition: CompositionConfig,
    pub color: ColorConfig,
    pub watermark: WatermarkConfig,
    pub guide_line: GuideLineConfig,
    pub overlays: OverlayConfig,
    pub speed: SpeedConfig,
    pub audio: AudioConfig,
    pub segments: SegmentConfig,
    pub encode: EncodeSettings,
    pub metadata: MetadataConfig,
    pub threading: RenderThreading,
    /// Extra directory scanned for `.ttf`/`.otf`/`.ttc` fonts used by text stamps.
    pub font_dir: Option<PathBuf>,
    /// Fixed seed for every random draw of a run. A fresh seed is drawn when unset.
    pub seed: Option<u64>,
    /// Also write the whole synced artifact as `final_output.mp4`.
    pub write_full_output: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            composition: CompositionConfig::default(),
            color: ColorConfig::default(),
            watermark: WatermarkConfig::default(),
            guide_line: GuideLineConfig::default(),
            overlays: OverlayConfig::default(),
            speed: SpeedConfig::default(),
            audio: AudioConfig::default(),
            segments: SegmentConfig::default(),
            encode: EncodeSettings::default(),
            metadata: MetadataConfig::default(),
            threading: RenderThreading::default(),
            font_dir: None,
            seed: None,
            write_full_output: true,
        }
    }
}

impl PipelineConfig {
    pub fn from_path(path: &Path) -> ReelResult<Self> {
        let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse config JSON '{}'", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ReelResult<()> {
        self.composition.validate()?;

        self.color.gamma.validate("color.gamma")?;
        self.color.contrast.validate("color.contrast")?;
        if self.color.gamma.min <= 0.0 {
            return Err(ReelError::validation("color.gamma must be > 0"));
        }
        if self.color.contrast.min < 0.0 {
            return Err(ReelError::validation("color.contrast must be >= 0"));
        }

        check_unit("watermark.opacity", self.watermark.opacity)?;
        check_unit("overlays.opacity", self.overlays.opacity)?;
        if self.watermark.font_size <= 0.0 || self.segments.label_font_size <= 0.0 {
            return Err(ReelError::validation("text font sizes must be > 0"));
        }

        self.speed.factor.validate("speed.factor")?;
        if self.speed.factor.min <= 0.0 {
            return Err(ReelError::validation("speed.factor must be > 0"));
        }

        self.audio.pitch.validate("audio.pitch")?;
        self.audio.gain_db.validate("audio.gain_db")?;
        if self.audio.pitch.min <= 0.0 {
            return Err(ReelError::validation("audio.pitch must be > 0"));
        }
        if self.audio.sample_rate == 0 {
            return Err(ReelError::validation("audio.sample_rate must be non-zero"));
        }
        if self.audio.echo_delay_ms < 0.0 || self.audio.echo_attenuation_db < 0.0 {
            return Err(ReelError::validation(
                "audio echo delay and attenuation must be >= 0",
            ));
        }
        if !(self.audio.peak_ceiling > 0.0 && self.audio.peak_ceiling <= 1.0) {
            return Err(ReelError::validation("audio.peak_ceiling must be in (0, 1]"));
        }

        self.segments.duration.validate("segments.duration")?;
        if self.segments.duration.min <= 0.0 {
            return Err(ReelError::validation("segments.duration.min must be > 0"));
        }
        if self.segments.epsilon < 0.0 {
            return Err(ReelError::validation("segments.epsilon must be >= 0"));
        }

        self.encode.validate()?;
        if self.threading.chunk_size == 0 {
            return Err(ReelError::validation("threading.chunk_size must be > 0"));
        }
        Ok(())
    }
}

fn check_unit(name: &str, v: f32) -> ReelResult<()> {
    if !(0.0..=1.0).contains(&v) {
        return Err(ReelError::validation(format!("{name} must be in [0, 1]")));
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CompositionConfig {
    pub target: Canvas,
    /// width/height at or above this ratio takes the wide branch.
    pub wide_threshold: f64,
    pub zoom_x: f64,
    pub zoom_y: f64,
    /// Fraction trimmed from each dimension of a tall source (split evenly between both sides).
    pub tall_crop_fraction: f64,
    /// Portrait crop taken from a wide source, as width/height.
    pub wide_crop_aspect: f64,
    pub blur_radius: u32,
    pub blur_sigma: f32,
    /// The background is blurred at 1/downsample of the canvas size, then upscaled.
    pub blur_downsample: u32,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            target: Canvas {
                width: 720,
                height: 1280,
            },
            wide_threshold: 1.3,
            zoom_x: 1.15,
            zoom_y: 1.40,
            tall_crop_fraction: 0.03,
            wide_crop_aspect: 9.0 / 16.0,
            blur_radius: 25,
            blur_sigma: 12.5,
            blur_downsample: 4,
        }
    }
}

impl CompositionConfig {
    fn validate(&self) -> ReelResult<()> {
        if self.target.width == 0 || self.target.height == 0 {
            return Err(ReelError::validation("target resolution must be non-zero"));
        }
        if !self.target.width.is_multiple_of(2) || !self.target.height.is_multiple_of(2) {
            return Err(ReelError::validation(
                "target resolution must be even (required for yuv420p output)",
            ));
        }
        if !(self.wide_threshold.is_finite() && self.wide_threshold > 0.0) {
            return Err(ReelError::validation("wide_threshold must be > 0"));
        }
        if !(self.zoom_x >= 1.0 && self.zoom_y >= 1.0) {
            return Err(ReelError::validation("background zoom must be >= 1"));
        }
        if !(0.0..0.5).contains(&self.tall_crop_fraction) {
            return Err(ReelError::validation("tall_crop_fraction must be in [0, 0.5)"));
        }
        if !(self.wide_crop_aspect.is_finite() && self.wide_crop_aspect > 0.0) {
            return Err(ReelError::validation("wide_crop_aspect must be > 0"));
        }
        if self.blur_radius > 0 && !(self.blur_sigma.is_finite() && self.blur_sigma > 0.0) {
            return Err(ReelError::validation("blur_sigma must be > 0"));
        }
        if self.blur_downsample == 0 {
            return Err(ReelError::validation("blur_downsample must be >= 1"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub enabled: bool,
    pub gamma: UniformRange,
    pub contrast: UniformRange,
    pub jitter: JitterMode,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gamma: UniformRange::new(0.95, 1.05),
            contrast: UniformRange::new(0.95, 1.05),
            jitter: JitterMode::PerRun,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    /// Empty text disables the stamp.
    pub text: String,
    pub font_size: f32,
    pub color: [u8; 3],
    pub opacity: f32,
    pub margin_px: u32,
    pub jitter: JitterMode,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            text: "reelsync".to_string(),
            font_size: 18.0,
            color: [255, 255, 255],
            opacity: 0.3,
            margin_px: 10,
            jitter: JitterMode::PerRun,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GuideLineConfig {
    pub enabled: bool,
    pub thickness_px: u32,
    pub color: [u8; 3],
}

impl Default for GuideLineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            thickness_px: 3,
            color: [255, 255, 255],
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub dir: PathBuf,
    pub files: Vec<String>,
    pub opacity: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("overlays"),
            files: vec!["line_sang.mp4".to_string(), "line_trang.mp4".to_string()],
            opacity: 0.05,
        }
    }
}

impl OverlayConfig {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| self.dir.join(f)).collect()
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    pub factor: UniformRange,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            factor: UniformRange::new(0.90, 1.10),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    pub sample_rate: u32,
    pub echo_delay_ms: f64,
    pub echo_attenuation_db: f64,
    pub pitch: UniformRange,
    pub gain_db: UniformRange,
    pub peak_ceiling: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: 44_100,
            echo_delay_ms: 80.0,
            echo_attenuation_db: 6.0,
            pitch: UniformRange::new(0.97, 1.03),
            gain_db: UniformRange::new(-1.5, 1.5),
            peak_ceiling: 0.98,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    pub duration: UniformRange,
    pub epsilon: f64,
    pub label_prefix: String,
    pub label_font_size: f32,
    pub label_position: (u32, u32),
    pub label_color: [u8; 3],
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            duration: UniformRange::new(60.0, 75.0),
            epsilon: 0.05,
            label_prefix: "Ep".to_string(),
            label_font_size: 30.0,
            label_position: (10, 10),
            label_color: [255, 255, 255],
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EncodeSettings {
    pub fps: Fps,
    pub video_codec: String,
    pub audio_codec: String,
    pub bitrate: String,
    pub pix_fmt: String,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            fps: Fps { num: 60, den: 1 },
            video_codec: "libx265".to_string(),
            audio_codec: "aac".to_string(),
            bitrate: "8000k".to_string(),
            pix_fmt: "yuv420p".to_string(),
        }
    }
}

impl EncodeSettings {
    pub fn validate(&self) -> ReelResult<()> {
        Fps::new(self.fps.num, self.fps.den)?;
        for (name, v) in [
            ("encode.video_codec", &self.video_codec),
            ("encode.audio_codec", &self.audio_codec),
            ("encode.bitrate", &self.bitrate),
            ("encode.pix_fmt", &self.pix_fmt),
        ] {
            if v.trim().is_empty() || v.starts_with('-') {
                return Err(ReelError::validation(format!(
                    "{name} must be a non-empty value not starting with '-'"
                )));
            }
        }
        Ok(())
    }
}

/// Container tags written after existing metadata is stripped from the full output.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub enabled: bool,
    pub tags: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderThreading {
    pub parallel: bool,
    pub chunk_size: usize,
    pub threads: Option<usize>,
}

impl Default for RenderThreading {
    fn default() -> Self {
        Self {
            parallel: false,
            chunk_size: 16,
            threads: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_json_yields_defaults() {
        let cfg: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, PipelineConfig::default());
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"segments":{"duration":{"min":61,"max":75}},"seed":9}"#)
                .unwrap();
        assert_eq!(cfg.segments.duration, UniformRange::new(61.0, 75.0));
        assert_eq!(cfg.segments.epsilon, 0.05);
        assert_eq!(cfg.seed, Some(9));
        assert_eq!(cfg.composition.target.width, 720);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = PipelineConfig::default();
        cfg.composition.target.width = 721;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.segments.duration = UniformRange::new(0.0, 10.0);
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.speed.factor = UniformRange::new(1.1, 0.9);
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.overlays.opacity = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.encode.bitrate = "-y".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn from_path_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{"write_full_output":false}"#).unwrap();
        let cfg = PipelineConfig::from_path(&path).unwrap();
        assert!(!cfg.write_full_output);

        std::fs::write(&path, r#"{"audio":{"sample_rate":0}}"#).unwrap();
        assert!(PipelineConfig::from_path(&path).is_err());
    }
}
