use async_trait::async_trait;
use std::ffi::OsString;
use std::process::Stdio;
use tokio::process::Command;

use super::{CutJob, TranscodeError, Transcoder};
use crate::time::format_seconds;
use crate::utils::stderr_excerpt;

/// Segment cutter backed by the ffmpeg executable
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.ffmpeg_path
    }

    /// Fail unless `<ffmpeg> -version` runs and exits cleanly
    pub async fn check_availability(&self) -> Result<(), TranscodeError> {
        let status = Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| TranscodeError::NotFound {
                program: self.ffmpeg_path.clone(),
                source,
            })?;

        if !status.success() {
            return Err(TranscodeError::Unusable {
                program: self.ffmpeg_path.clone(),
                code: status.code(),
            });
        }

        Ok(())
    }

    /// Arguments for one cut, in ffmpeg's expected order
    pub fn command_args(job: &CutJob) -> Vec<OsString> {
        vec![
            "-ss".into(),
            format_seconds(job.start).into(),
            "-to".into(),
            format_seconds(job.end).into(),
            "-i".into(),
            job.input.clone().into_os_string(),
            "-vn".into(),
            "-acodec".into(),
            job.format.codec().into(),
            "-b:a".into(),
            job.bitrate.clone().into(),
            "-y".into(),
            job.output.clone().into_os_string(),
        ]
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn cut(&self, job: &CutJob) -> Result<(), TranscodeError> {
        let args = Self::command_args(job);
        tracing::debug!("Running {} {:?}", self.ffmpeg_path, args);

        let output = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| TranscodeError::NotFound {
                program: self.ffmpeg_path.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranscodeError::Failed {
                code: output.status.code(),
                excerpt: stderr_excerpt(&stderr),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::AudioOutputFormat;
    use std::path::PathBuf;

    #[test]
    fn test_command_args_layout() {
        let job = CutJob {
            input: PathBuf::from("in.mp4"),
            output: PathBuf::from("out/a.m4a"),
            start: 1.5,
            end: 90.0,
            format: AudioOutputFormat::M4a,
            bitrate: "128k".to_string(),
        };

        let args: Vec<String> = FfmpegTranscoder::command_args(&job)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            vec![
                "-ss", "1.5", "-to", "90", "-i", "in.mp4", "-vn", "-acodec", "aac", "-b:a",
                "128k", "-y", "out/a.m4a",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let transcoder = FfmpegTranscoder::new("definitely-not-a-real-ffmpeg-binary");
        let err = transcoder.check_availability().await.unwrap_err();
        assert!(matches!(err, TranscodeError::NotFound { .. }));
    }
}
