use async_trait::async_trait;
use std::path::PathBuf;
use url::Url;

pub mod direct;
pub mod links;
pub mod youtube;

pub use direct::{DirectDownloader, Landing};
pub use youtube::YoutubeDownloader;

/// Hosts whose pages are resolved through the platform downloader
pub const RECOGNIZED_VIDEO_HOSTS: &[&str] = &["youtube.com", "youtu.be"];

/// Why a download did not produce a file
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("Media unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected media format: {0}")]
    FormatMismatch(String),

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Unrecognized URL: {0}")]
    Unrecognized(String),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::NetworkFailure(err.to_string())
    }
}

/// Media containers recognized in links and responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaContainer {
    Mp3,
    M4a,
    Aac,
    Wav,
    Flac,
    Ogg,
    Opus,
    Webm,
    Mp4,
    M4v,
    Mov,
    Mkv,
    Avi,
}

impl MediaContainer {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaContainer::Mp3 => "mp3",
            MediaContainer::M4a => "m4a",
            MediaContainer::Aac => "aac",
            MediaContainer::Wav => "wav",
            MediaContainer::Flac => "flac",
            MediaContainer::Ogg => "ogg",
            MediaContainer::Opus => "opus",
            MediaContainer::Webm => "webm",
            MediaContainer::Mp4 => "mp4",
            MediaContainer::M4v => "m4v",
            MediaContainer::Mov => "mov",
            MediaContainer::Mkv => "mkv",
            MediaContainer::Avi => "avi",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp3" => Some(MediaContainer::Mp3),
            "m4a" => Some(MediaContainer::M4a),
            "aac" => Some(MediaContainer::Aac),
            "wav" => Some(MediaContainer::Wav),
            "flac" => Some(MediaContainer::Flac),
            "ogg" | "oga" => Some(MediaContainer::Ogg),
            "opus" => Some(MediaContainer::Opus),
            "webm" => Some(MediaContainer::Webm),
            "mp4" => Some(MediaContainer::Mp4),
            "m4v" => Some(MediaContainer::M4v),
            "mov" => Some(MediaContainer::Mov),
            "mkv" => Some(MediaContainer::Mkv),
            "avi" => Some(MediaContainer::Avi),
            _ => None,
        }
    }

    /// Map a Content-Type header value to a container
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase();

        match mime.as_str() {
            "audio/mpeg" | "audio/mp3" => Some(MediaContainer::Mp3),
            "audio/mp4" | "audio/x-m4a" | "audio/m4a" => Some(MediaContainer::M4a),
            "audio/aac" => Some(MediaContainer::Aac),
            "audio/wav" | "audio/x-wav" | "audio/wave" => Some(MediaContainer::Wav),
            "audio/flac" | "audio/x-flac" => Some(MediaContainer::Flac),
            "audio/ogg" => Some(MediaContainer::Ogg),
            "audio/opus" => Some(MediaContainer::Opus),
            "audio/webm" | "video/webm" => Some(MediaContainer::Webm),
            "video/mp4" => Some(MediaContainer::Mp4),
            "video/quicktime" => Some(MediaContainer::Mov),
            "video/x-matroska" => Some(MediaContainer::Mkv),
            "video/x-msvideo" => Some(MediaContainer::Avi),
            _ => None,
        }
    }

    /// Container implied by the extension of the last path segment
    pub fn from_url(url: &Url) -> Option<Self> {
        let file_name = url.path_segments()?.last()?;
        let (_, ext) = file_name.rsplit_once('.')?;
        Self::from_extension(ext)
    }
}

/// Whether a Content-Type header describes audio or video
pub fn is_media_content_type(content_type: &str) -> bool {
    let lower = content_type.trim().to_lowercase();
    lower.starts_with("audio/") || lower.starts_with("video/")
}

/// Downloads media behind a URL into the full-downloads directory
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Fetch `url`, naming the result after `custom_name` when given
    async fn download(&self, url: &Url, custom_name: Option<&str>) -> Result<PathBuf, FetchError>;

    /// Get the name of this platform
    fn platform_name(&self) -> &'static str;
}

/// Parse a URL that may be missing its scheme, like `youtu.be/ID`
pub fn parse_loose_url(raw: &str) -> Result<Url, FetchError> {
    Url::parse(raw)
        .or_else(|_| Url::parse(&format!("https://{}", raw)))
        .map_err(|_| FetchError::Unrecognized(format!("Invalid URL format: {}", raw)))
}

/// Case-insensitive substring match of the URL's host against the recognized set
pub fn is_recognized_video_host(url: &str) -> bool {
    parse_loose_url(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_lowercase))
        .is_some_and(|host| RECOGNIZED_VIDEO_HOSTS.iter().any(|known| host.contains(known)))
}

/// Pull the video id out of the YouTube URL shapes in common use
pub fn extract_video_id(url: &str) -> Option<String> {
    let parsed = parse_loose_url(url).ok()?;

    let host = parsed.host_str()?.to_lowercase();
    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());

    let candidate = if host == "youtu.be" || host.ends_with(".youtu.be") {
        segments.next().map(str::to_string)
    } else if host == "youtube.com" || host.ends_with(".youtube.com") {
        match segments.next() {
            Some("watch") => parsed
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            Some("embed") | Some("shorts") | Some("v") | Some("live") => {
                segments.next().map(str::to_string)
            }
            _ => None,
        }
    } else {
        None
    };

    candidate.filter(|id| is_valid_video_id(id))
}

fn is_valid_video_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Canonical watch URL for a video id
pub fn canonical_watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}
