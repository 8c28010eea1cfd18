use clap::{Args, Parser};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::extract::{AudioOutputFormat, ExtractOptions};
use crate::segments::ColumnLayout;

/// Flags shared by both binaries
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Configuration file (defaults to ./audio-harvest.yaml, then the user config dir)
    #[arg(long, value_name = "FILE", env = "AUDIO_HARVEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

#[derive(Parser, Debug)]
#[command(
    name = "extract-audio",
    about = "Extract audio segments from video files (MP4, WebM, MOV, etc.)",
    version,
    long_about = "Cuts one audio file per CSV row out of a video using ffmpeg. Rows with unreadable or inverted time ranges are skipped with a warning."
)]
pub struct ExtractCli {
    /// Input video file path
    #[arg(value_name = "VIDEO")]
    pub video: PathBuf,

    /// CSV file with segment timestamps
    #[arg(value_name = "CSV")]
    pub csv: PathBuf,

    /// Output directory for audio files [default: ./audio_segments]
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output audio format [default: mp3]
    #[arg(short, long, value_enum)]
    pub format: Option<AudioOutputFormat>,

    /// Column index (0-based) for start time [default: 0]
    #[arg(long, value_name = "INDEX")]
    pub start_col: Option<usize>,

    /// Column index (0-based) for end time [default: 1]
    #[arg(long, value_name = "INDEX")]
    pub end_col: Option<usize>,

    /// Column index (0-based) for custom segment names
    #[arg(long, value_name = "INDEX")]
    pub name_col: Option<usize>,

    /// CSV has no header row
    #[arg(long)]
    pub no_header: bool,

    /// Audio bitrate (e.g., 128k, 192k, 256k) [default: 192k]
    #[arg(long)]
    pub bitrate: Option<String>,

    /// Path to FFmpeg executable [default: ffmpeg]
    #[arg(long, value_name = "PATH")]
    pub ffmpeg_path: Option<String>,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl ExtractCli {
    /// Column layout from flags, falling back to the config's trim columns
    pub fn layout(&self, config: &Config) -> ColumnLayout {
        let defaults = config.trim.columns;
        ColumnLayout {
            start_col: self.start_col.unwrap_or(defaults.start_col),
            end_col: self.end_col.unwrap_or(defaults.end_col),
            name_col: self.name_col.or(defaults.name_col),
            has_header: defaults.has_header && !self.no_header,
        }
    }

    pub fn extract_options(&self, config: &Config) -> ExtractOptions {
        ExtractOptions {
            output_dir: self
                .output_dir
                .clone()
                .unwrap_or_else(|| config.paths.segments_dir.clone()),
            format: self.format.unwrap_or(config.trim.format),
            bitrate: self
                .bitrate
                .clone()
                .unwrap_or_else(|| config.trim.bitrate.clone()),
        }
    }

    pub fn ffmpeg_path(&self, config: &Config) -> String {
        self.ffmpeg_path
            .clone()
            .unwrap_or_else(|| config.tools.ffmpeg.clone())
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "harvest-urls",
    about = "Download media from a CSV list of URLs and optionally trim each download",
    version,
    long_about = "Each row is `url, optional trim CSV, optional custom name`. YouTube links are fetched with yt-dlp; other links are followed through redirects and scanned for media files."
)]
pub struct HarvestCli {
    /// CSV file with URLs
    #[arg(value_name = "CSV")]
    pub csv: PathBuf,

    /// Root directory for the full/, trimmed/ and temp/ folders
    #[arg(long, value_name = "DIR")]
    pub downloads_dir: Option<PathBuf>,

    /// Path to FFmpeg executable
    #[arg(long, value_name = "PATH")]
    pub ffmpeg_path: Option<String>,

    /// Path to yt-dlp executable
    #[arg(long, value_name = "PATH")]
    pub yt_dlp_path: Option<String>,

    /// Print the effective configuration before starting
    #[arg(long)]
    pub show_config: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl HarvestCli {
    /// Apply command-line overrides on top of the loaded config
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(root) = &self.downloads_dir {
            let segments_dir = config.paths.segments_dir.clone();
            config.paths = crate::config::PathsConfig::under(root);
            config.paths.segments_dir = segments_dir;
        }
        if let Some(ffmpeg) = &self.ffmpeg_path {
            config.tools.ffmpeg = ffmpeg.clone();
        }
        if let Some(yt_dlp) = &self.yt_dlp_path {
            config.tools.yt_dlp = yt_dlp.clone();
        }
        config
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `--verbose` when set.
pub fn init_tracing(common: &CommonArgs) {
    let default_filter = if common.verbose {
        "audio_harvest=debug"
    } else {
        "audio_harvest=info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if common.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_defaults_match_config() {
        let cli = ExtractCli::parse_from(["extract-audio", "clip.mp4", "cuts.csv"]);
        let config = Config::default();

        assert_eq!(cli.layout(&config), ColumnLayout::default());
        let options = cli.extract_options(&config);
        assert_eq!(options.output_dir, PathBuf::from("./audio_segments"));
        assert_eq!(options.format, AudioOutputFormat::Mp3);
        assert_eq!(options.bitrate, "192k");
        assert_eq!(cli.ffmpeg_path(&config), "ffmpeg");
    }

    #[test]
    fn test_extract_flags_override_config() {
        let cli = ExtractCli::parse_from([
            "extract-audio",
            "clip.mp4",
            "cuts.csv",
            "-o",
            "out",
            "-f",
            "wav",
            "--start-col",
            "2",
            "--end-col",
            "3",
            "--name-col",
            "0",
            "--no-header",
            "--bitrate",
            "320k",
            "--ffmpeg-path",
            "/usr/local/bin/ffmpeg",
        ]);
        let config = Config::default();

        let layout = cli.layout(&config);
        assert_eq!(layout.start_col, 2);
        assert_eq!(layout.end_col, 3);
        assert_eq!(layout.name_col, Some(0));
        assert!(!layout.has_header);

        let options = cli.extract_options(&config);
        assert_eq!(options.format, AudioOutputFormat::Wav);
        assert_eq!(options.bitrate, "320k");
        assert_eq!(cli.ffmpeg_path(&config), "/usr/local/bin/ffmpeg");
    }

    #[test]
    fn test_rejects_unknown_format() {
        let result = ExtractCli::try_parse_from(["extract-audio", "a.mp4", "b.csv", "-f", "flac"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_harvest_overrides() {
        let cli = HarvestCli::parse_from([
            "harvest-urls",
            "urls.csv",
            "--downloads-dir",
            "/data/dl",
            "--yt-dlp-path",
            "/opt/yt-dlp",
        ]);
        let config = cli.apply(Config::default());

        assert_eq!(config.paths.full_dir, PathBuf::from("/data/dl/full"));
        assert_eq!(config.paths.temp_dir, PathBuf::from("/data/dl/temp"));
        assert_eq!(config.tools.yt_dlp, "/opt/yt-dlp");
        assert_eq!(config.tools.ffmpeg, "ffmpeg");
    }
}
