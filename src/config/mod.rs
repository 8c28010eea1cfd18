use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::extract::AudioOutputFormat;
use crate::segments::ColumnLayout;

const LOCAL_CONFIG: &str = "audio-harvest.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External executables
    pub tools: ToolsConfig,

    /// Working directories
    pub paths: PathsConfig,

    /// Segment extraction defaults
    pub trim: TrimConfig,

    /// HTTP client settings for the harvester
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg: String,
    pub yt_dlp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Complete downloads
    pub full_dir: PathBuf,

    /// Segments cut out of downloads
    pub trimmed_dir: PathBuf,

    /// Staging area for in-progress downloads
    pub temp_dir: PathBuf,

    /// Default output directory for `extract-audio`
    pub segments_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimConfig {
    pub format: AudioOutputFormat,
    pub bitrate: String,
    pub columns: ColumnLayout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_redirects: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            yt_dlp: "yt-dlp".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let mut paths = Self::under(Path::new("downloads"));
        paths.segments_dir = PathBuf::from("./audio_segments");
        paths
    }
}

impl PathsConfig {
    /// Download directories rooted at `root`
    pub fn under(root: &Path) -> Self {
        Self {
            full_dir: root.join("full"),
            trimmed_dir: root.join("trimmed"),
            temp_dir: root.join("temp"),
            segments_dir: root.join("segments"),
        }
    }
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            format: AudioOutputFormat::Mp3,
            bitrate: "192k".to_string(),
            columns: ColumnLayout::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("audio-harvest/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 120,
            max_redirects: 10,
        }
    }
}

impl Config {
    /// Load configuration from `explicit`, the local file, the user config
    /// directory, or fall back to defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover(),
        };

        let Some(path) = path else {
            tracing::debug!("No config file found, using defaults");
            return Ok(Self::default());
        };

        tracing::debug!("Loading config from {}", path.display());
        let content = fs_err::read_to_string(&path)
            .context("Failed to read config file")?;

        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse and validate YAML configuration
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    fn discover() -> Option<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from(LOCAL_CONFIG);
        if local_config.exists() {
            return Some(local_config);
        }

        let user_config = dirs::config_dir()?.join("audio-harvest").join("config.yaml");
        user_config.exists().then_some(user_config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.trim.bitrate.trim().is_empty() {
            anyhow::bail!("trim.bitrate must not be empty");
        }

        if self.http.max_redirects == 0 {
            anyhow::bail!("http.max_redirects must be at least 1");
        }

        self.trim
            .columns
            .validate()
            .context("Invalid trim.columns")?;

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  ffmpeg: {}", self.tools.ffmpeg);
        println!("  yt-dlp: {}", self.tools.yt_dlp);
        println!("  Full downloads: {}", self.paths.full_dir.display());
        println!("  Trimmed output: {}", self.paths.trimmed_dir.display());
        println!("  Temp staging: {}", self.paths.temp_dir.display());
        println!("  Trim format: {} @ {}", self.trim.format, self.trim.bitrate);
        println!(
            "  Trim columns: start={} end={} name={:?} header={}",
            self.trim.columns.start_col,
            self.trim.columns.end_col,
            self.trim.columns.name_col,
            self.trim.columns.has_header
        );
    }
}
