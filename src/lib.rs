//! Audio Harvest - cut audio segments out of media files and harvest media from URL lists
//!
//! Two pipelines share this library: `extract-audio` slices a video into audio
//! segments listed in a CSV file using ffmpeg, and `harvest-urls` downloads
//! media (YouTube audio tracks or files linked from generic pages) and can
//! trim each download with the same segment logic.

pub mod cli;
pub mod config;
pub mod extract;
pub mod extractors;
pub mod harvest;
pub mod segments;
pub mod time;
pub mod utils;

pub use config::Config;
pub use extract::{AudioOutputFormat, ExtractionSummary, FfmpegTranscoder, Transcoder};
pub use extractors::{FetchError, MediaDownloader};
pub use harvest::{Harvester, UrlEntry};
pub use segments::{ColumnLayout, Segment, SegmentError};
pub use time::{parse_time, TimeParseError};
