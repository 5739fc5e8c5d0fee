//! Strips container metadata from a finished MP4 and writes a configured tag set.

use std::{
    collections::BTreeMap,
    ffi::OsString,
    path::{Path, PathBuf},
    process::Command,
};

use crate::foundation::error::{ReelError, ReelResult};

/// Tags written into an output container. Values come from configuration only.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetadataRecord {
    pub tags: BTreeMap<String, String>,
}

impl MetadataRecord {
    pub fn new(tags: BTreeMap<String, String>) -> Self {
        Self { tags }
    }

    pub fn validate(&self) -> ReelResult<()> {
        for (k, v) in &self.tags {
            let key_ok = !k.is_empty()
                && !k.starts_with('-')
                && k.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':');
            if !key_ok {
                return Err(ReelError::validation(format!("invalid metadata key '{k}'")));
            }
            if v.contains('\0') {
                return Err(ReelError::validation(format!(
                    "metadata value for '{k}' contains NUL"
                )));
            }
        }
        Ok(())
    }
}

pub trait MetadataRewriter: Send + Sync {
    /// Replaces all container metadata of `path` in place.
    fn rewrite(&self, path: &Path, record: &MetadataRecord) -> ReelResult<()>;
}

/// Remuxes through `ffmpeg -map_metadata -1 -c copy`; streams are not re-encoded.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegMetadataRewriter;

impl FfmpegMetadataRewriter {
    pub fn build_args(input: &Path, output: &Path, record: &MetadataRecord) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-loglevel".into(), "error".into()];
        args.push("-i".into());
        args.push(input.as_os_str().to_owned());
        args.extend(["-map", "0", "-map_metadata", "-1"].map(OsString::from));
        for (k, v) in &record.tags {
            args.push("-metadata".into());
            args.push(format!("{k}={v}").into());
        }
        args.extend(["-c", "copy", "-f", "mp4"].map(OsString::from));
        args.push(output.as_os_str().to_owned());
        args
    }
}

impl MetadataRewriter for FfmpegMetadataRewriter {
    #[tracing::instrument(skip(self, record), fields(tags = record.tags.len()))]
    fn rewrite(&self, path: &Path, record: &MetadataRecord) -> ReelResult<()> {
        record.validate()?;
        let tmp = rewrite_tmp_path(path);
        let out = Command::new("ffmpeg")
            .args(Self::build_args(path, &tmp, record))
            .output()
            .map_err(|e| ReelError::process(format!("failed to run ffmpeg for metadata: {e}")))?;
        if !out.status.success() {
            let _ = std::fs::remove_file(&tmp);
            return Err(ReelError::process(format!(
                "ffmpeg metadata rewrite failed for '{}': {}",
                path.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        std::fs::rename(&tmp, path).map_err(|e| {
            ReelError::process(format!("failed to replace '{}': {e}", path.display()))
        })?;
        Ok(())
    }
}

fn rewrite_tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".meta");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> MetadataRecord {
        MetadataRecord::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn args_strip_then_tag_then_copy() {
        let rec = record(&[("title", "Ep 1; rm -rf /"), ("comment", "a b")]);
        let args: Vec<String> = FfmpegMetadataRewriter::build_args(
            Path::new("in.mp4"),
            Path::new("in.mp4.meta"),
            &rec,
        )
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
        let joined = args.join(" ");
        assert!(joined.contains("-map_metadata -1 -metadata comment=a b -metadata title=Ep 1; rm -rf /"));
        assert!(joined.ends_with("-c copy -f mp4 in.mp4.meta"));
        // Each tag travels as a single argument.
        assert!(args.contains(&"title=Ep 1; rm -rf /".to_string()));
    }

    #[test]
    fn validation_rejects_option_like_keys() {
        assert!(record(&[("-y", "x")]).validate().is_err());
        assert!(record(&[("", "x")]).validate().is_err());
        assert!(record(&[("a=b", "x")]).validate().is_err());
        assert!(record(&[("com.apple:x", "x")]).validate().is_err());
        assert!(record(&[("encoder", "x"), ("creation_time", "2026-01-01")]).validate().is_ok());
    }

    #[test]
    fn empty_record_only_strips() {
        let args = FfmpegMetadataRewriter::build_args(
            Path::new("a.mp4"),
            Path::new("b.mp4"),
            &MetadataRecord::default(),
        );
        assert!(!args.iter().any(|a| a == "-metadata"));
    }
}
