use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use url::Url;

use super::{canonical_watch_url, extract_video_id, FetchError, MediaDownloader};
use crate::config::PathsConfig;
use crate::utils::{sanitize_download_name, stderr_excerpt};

/// Phrases yt-dlp uses when a video exists but cannot be fetched
const UNAVAILABLE_MARKERS: &[&str] = &[
    "video unavailable",
    "private video",
    "has been removed",
    "is not available",
    "members-only",
    "sign in to confirm your age",
    "copyright claim",
];

/// Subset of `yt-dlp --dump-json` output we rely on
#[derive(Debug, Clone, Deserialize)]
pub struct VideoInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub formats: Vec<StreamFormat>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamFormat {
    pub format_id: String,
    pub ext: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    /// Average audio bitrate in kbit/s
    pub abr: Option<f64>,
}

impl StreamFormat {
    pub fn is_audio_only(&self) -> bool {
        let no_video = self.vcodec.as_deref() == Some("none");
        let has_audio = self.acodec.as_deref().is_some_and(|codec| codec != "none");
        no_video && has_audio
    }

    fn is_mp4_family(&self) -> bool {
        matches!(self.ext.as_deref(), Some("m4a") | Some("mp4"))
    }

    /// Extension the downloaded stream is stored under
    pub fn file_extension(&self) -> &'static str {
        if self.is_mp4_family() {
            "m4a"
        } else {
            "webm"
        }
    }
}

/// Best audio-only stream: mp4-family streams first, then anything, each by bitrate
pub fn select_audio_stream(formats: &[StreamFormat]) -> Option<&StreamFormat> {
    let audio_only = || formats.iter().filter(|f| f.is_audio_only());

    highest_bitrate(audio_only().filter(|f| f.is_mp4_family()))
        .or_else(|| highest_bitrate(audio_only()))
}

fn highest_bitrate<'a>(
    candidates: impl Iterator<Item = &'a StreamFormat>,
) -> Option<&'a StreamFormat> {
    candidates.max_by(|a, b| a.abr.unwrap_or(0.0).total_cmp(&b.abr.unwrap_or(0.0)))
}

/// Map yt-dlp's stderr to an error kind
pub fn classify_failure(stderr: &str) -> FetchError {
    let lower = stderr.to_lowercase();
    let excerpt = stderr_excerpt(stderr);

    if UNAVAILABLE_MARKERS.iter().any(|marker| lower.contains(marker)) {
        FetchError::Unavailable(excerpt)
    } else {
        FetchError::NetworkFailure(excerpt)
    }
}

/// YouTube audio downloader using yt-dlp
pub struct YoutubeDownloader {
    yt_dlp_path: String,
    paths: PathsConfig,
}

impl YoutubeDownloader {
    pub fn new(yt_dlp_path: impl Into<String>, paths: PathsConfig) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
            paths,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>, FetchError> {
        tracing::debug!("Running {} {:?}", self.yt_dlp_path, args);

        let output = Command::new(&self.yt_dlp_path)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| {
                FetchError::Unavailable(format!(
                    "{} is not available ({}). Please install it: https://github.com/yt-dlp/yt-dlp",
                    self.yt_dlp_path, err
                ))
            })?;

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        Ok(output.stdout)
    }

    /// Get video information using yt-dlp
    pub async fn video_info(&self, watch_url: &str) -> Result<VideoInfo, FetchError> {
        let stdout = self
            .run(&["--dump-json", "--no-playlist", "--no-warnings", watch_url])
            .await?;

        serde_json::from_slice(&stdout).map_err(|err| {
            FetchError::FormatMismatch(format!("Unreadable yt-dlp metadata: {}", err))
        })
    }

    async fn fetch_stream(
        &self,
        watch_url: &str,
        format_id: &str,
        staged: &Path,
    ) -> Result<(), FetchError> {
        let staged = staged.to_string_lossy().into_owned();
        self.run(&[
            "--format",
            format_id,
            "--output",
            staged.as_str(),
            "--no-playlist",
            "--no-progress",
            "--no-part",
            watch_url,
        ])
        .await?;

        Ok(())
    }
}

#[async_trait]
impl MediaDownloader for YoutubeDownloader {
    async fn download(&self, url: &Url, custom_name: Option<&str>) -> Result<PathBuf, FetchError> {
        let video_id = extract_video_id(url.as_str()).ok_or_else(|| {
            FetchError::Unrecognized(format!("Invalid YouTube URL format: {}", url))
        })?;
        let watch_url = canonical_watch_url(&video_id);

        let info = self.video_info(&watch_url).await?;
        let stream = select_audio_stream(&info.formats)
            .ok_or_else(|| FetchError::FormatMismatch("No suitable audio stream found".to_string()))?;

        let title = info.title.as_deref().unwrap_or(&video_id);
        let base_name = custom_name
            .map(sanitize_download_name)
            .filter(|name| !name.is_empty())
            .or_else(|| Some(sanitize_download_name(title)).filter(|name| !name.is_empty()))
            .unwrap_or_else(|| video_id.clone());

        let extension = stream.file_extension();
        let staged = self
            .paths
            .temp_dir
            .join(format!("temp_{}.{}", video_id, extension));
        let target = self
            .paths
            .full_dir
            .join(format!("{}.{}", base_name, extension));

        tracing::info!("Downloading YouTube audio: {}", title);
        tracing::debug!(
            "Selected stream {} ({}, {:?} kbit/s)",
            stream.format_id,
            stream.ext.as_deref().unwrap_or("?"),
            stream.abr
        );

        let progress = ProgressBar::new_spinner();
        progress.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        progress.set_message("Downloading audio with yt-dlp...");
        progress.enable_steady_tick(Duration::from_millis(120));

        let fetched = self.fetch_stream(&watch_url, &stream.format_id, &staged).await;
        match &fetched {
            Ok(()) => progress.finish_with_message("Download complete"),
            Err(_) => {
                progress.abandon_with_message("Download failed");
                let _ = fs_err::remove_file(&staged);
            }
        }
        fetched?;

        fs_err::rename(&staged, &target)?;
        tracing::info!("Downloaded: {}", target.display());

        Ok(target)
    }

    fn platform_name(&self) -> &'static str {
        "YouTube"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(id: &str, ext: &str, vcodec: &str, acodec: &str, abr: Option<f64>) -> StreamFormat {
        StreamFormat {
            format_id: id.to_string(),
            ext: Some(ext.to_string()),
            vcodec: Some(vcodec.to_string()),
            acodec: Some(acodec.to_string()),
            abr,
        }
    }

    #[test]
    fn test_prefers_mp4_audio_by_bitrate() {
        let formats = vec![
            format("18", "mp4", "avc1", "mp4a.40.2", Some(96.0)),
            format("139", "m4a", "none", "mp4a.40.5", Some(48.0)),
            format("140", "m4a", "none", "mp4a.40.2", Some(129.5)),
            format("251", "webm", "none", "opus", Some(160.0)),
        ];

        let best = select_audio_stream(&formats).unwrap();
        assert_eq!(best.format_id, "140");
        assert_eq!(best.file_extension(), "m4a");
    }

    #[test]
    fn test_falls_back_to_any_audio_only() {
        let formats = vec![
            format("249", "webm", "none", "opus", Some(50.0)),
            format("251", "webm", "none", "opus", Some(160.0)),
            format("22", "mp4", "avc1", "mp4a.40.2", None),
        ];

        let best = select_audio_stream(&formats).unwrap();
        assert_eq!(best.format_id, "251");
        assert_eq!(best.file_extension(), "webm");
    }

    #[test]
    fn test_no_audio_only_stream() {
        let formats = vec![
            format("22", "mp4", "avc1", "mp4a.40.2", None),
            format("sb0", "mhtml", "none", "none", None),
        ];
        assert!(select_audio_stream(&formats).is_none());
    }

    #[test]
    fn test_video_info_parses_dump_json() {
        let json = r#"{
            "id": "dQw4w9WgXcQ",
            "title": "Some Talk",
            "duration": 212,
            "formats": [
                {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 129.5},
                {"format_id": "sb0", "ext": "mhtml"}
            ]
        }"#;

        let info: VideoInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.title.as_deref(), Some("Some Talk"));
        assert_eq!(info.formats.len(), 2);
        assert!(!info.formats[1].is_audio_only());
        assert_eq!(select_audio_stream(&info.formats).unwrap().format_id, "140");
    }

    #[test]
    fn test_classify_failure() {
        let unavailable = "ERROR: [youtube] abc: Video unavailable. This video is private\n";
        assert!(matches!(classify_failure(unavailable), FetchError::Unavailable(_)));

        let network = "ERROR: Unable to download webpage: <urlopen error [Errno -3]>\n";
        assert!(matches!(classify_failure(network), FetchError::NetworkFailure(_)));
    }

    #[tokio::test]
    async fn test_rejects_recognized_host_without_id() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = YoutubeDownloader::new("yt-dlp", PathsConfig::under(dir.path()));
        let url = Url::parse("https://www.youtube.com/feed/trending").unwrap();

        let err = downloader.download(&url, None).await.unwrap_err();
        assert!(matches!(err, FetchError::Unrecognized(_)));
    }
}
