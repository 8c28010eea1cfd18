use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub mod ffmpeg;

pub use ffmpeg::FfmpegTranscoder;

use crate::segments::{read_segments, ColumnLayout, Segment, SegmentError, SegmentPlan};
use crate::time::format_clock;
use crate::utils::sanitize_segment_name;

/// Audio formats a segment can be written as
#[derive(ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioOutputFormat {
    /// MPEG layer 3
    #[default]
    Mp3,
    /// AAC in an MP4 container
    M4a,
    /// Uncompressed PCM
    Wav,
}

impl AudioOutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioOutputFormat::Mp3 => "mp3",
            AudioOutputFormat::M4a => "m4a",
            AudioOutputFormat::Wav => "wav",
        }
    }

    /// ffmpeg encoder name for `-acodec`
    pub fn codec(&self) -> &'static str {
        match self {
            AudioOutputFormat::Mp3 => "libmp3lame",
            AudioOutputFormat::M4a => "aac",
            AudioOutputFormat::Wav => "pcm_s16le",
        }
    }
}

impl fmt::Display for AudioOutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A single cut handed to the transcoder
#[derive(Debug, Clone, PartialEq)]
pub struct CutJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub start: f64,
    pub end: f64,
    pub format: AudioOutputFormat,
    pub bitrate: String,
}

#[derive(thiserror::Error, Debug)]
pub enum TranscodeError {
    #[error("Transcoder '{program}' could not be started: {source}")]
    NotFound {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transcoder '{program}' is not usable (exit code {code:?})")]
    Unusable { program: String, code: Option<i32> },

    #[error("Transcoder exited with code {code:?}: {excerpt}")]
    Failed { code: Option<i32>, excerpt: String },
}

/// Cuts one slice of audio out of a media file
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn cut(&self, job: &CutJob) -> Result<(), TranscodeError>;
}

/// Settings shared by every segment of a run
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub output_dir: PathBuf,
    pub format: AudioOutputFormat,
    pub bitrate: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFailure {
    pub ordinal: usize,
    pub row: usize,
    pub message: String,
}

/// Outcome of an extraction run
#[derive(Debug, Clone, Default)]
pub struct ExtractionSummary {
    /// Data rows read from the segment file
    pub requested: usize,

    /// Segments that passed validation and were handed to the transcoder
    pub attempted: usize,

    pub succeeded: usize,
    pub outputs: Vec<PathBuf>,
    pub failures: Vec<SegmentFailure>,
}

impl ExtractionSummary {
    pub fn skipped(&self) -> usize {
        self.requested.saturating_sub(self.attempted)
    }
}

impl fmt::Display for ExtractionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.succeeded, self.requested)
    }
}

/// Output file name for the `ordinal`-th (1-based) valid segment
pub fn output_filename(
    segment: &Segment,
    base_name: &str,
    ordinal: usize,
    format: AudioOutputFormat,
) -> String {
    match &segment.name {
        Some(name) => format!("{}.{}", sanitize_segment_name(name), format.extension()),
        None => format!("{}_segment_{}.{}", base_name, ordinal, format.extension()),
    }
}

/// Cut every segment of `plan` out of `input`, one at a time
pub async fn extract_segments(
    transcoder: &dyn Transcoder,
    input: &Path,
    plan: &SegmentPlan,
    options: &ExtractOptions,
) -> ExtractionSummary {
    let base_name = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());

    let mut summary = ExtractionSummary {
        requested: plan.rows_read,
        attempted: plan.segments.len(),
        ..ExtractionSummary::default()
    };

    for (index, segment) in plan.segments.iter().enumerate() {
        let ordinal = index + 1;
        let output = options
            .output_dir
            .join(output_filename(segment, &base_name, ordinal, options.format));

        tracing::info!(
            "Extracting segment {}: {} to {}",
            ordinal,
            format_clock(segment.start),
            format_clock(segment.end)
        );

        let job = CutJob {
            input: input.to_path_buf(),
            output: output.clone(),
            start: segment.start,
            end: segment.end,
            format: options.format,
            bitrate: options.bitrate.clone(),
        };

        match transcoder.cut(&job).await {
            Ok(()) => {
                tracing::info!("Created: {}", output.display());
                summary.succeeded += 1;
                summary.outputs.push(output);
            }
            Err(err) => {
                tracing::warn!(
                    "Segment {} (row {}) failed: {}",
                    ordinal,
                    segment.row,
                    err
                );
                summary.failures.push(SegmentFailure {
                    ordinal,
                    row: segment.row,
                    message: err.to_string(),
                });
            }
        }
    }

    summary
}

/// Read `csv`, then cut each valid segment out of `input` into `options.output_dir`
pub async fn trim_file(
    transcoder: &dyn Transcoder,
    input: &Path,
    csv: &Path,
    layout: &ColumnLayout,
    options: &ExtractOptions,
) -> Result<ExtractionSummary, SegmentError> {
    let plan = read_segments(csv, layout)?;

    fs_err::create_dir_all(&options.output_dir).map_err(|source| SegmentError::Io {
        path: options.output_dir.clone(),
        source,
    })?;

    Ok(extract_segments(transcoder, input, &plan, options).await)
}
