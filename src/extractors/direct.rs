use async_trait::async_trait;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{redirect, Client, Response, StatusCode};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use super::{
    is_media_content_type, is_recognized_video_host, links, FetchError, MediaContainer,
    MediaDownloader,
};
use crate::config::{HttpConfig, PathsConfig};
use crate::utils::{format_file_size, sanitize_download_name};

/// What a generic URL turned out to be
#[derive(Debug)]
pub enum Landing {
    /// A redirect pointed at a recognized video host; it was not followed
    VideoHost(Url),

    /// The page is itself media; the body has not been read yet
    Media(Response),

    /// Media links found in the page, in document order, with the page URL
    Links { page: Url, candidates: Vec<Url> },
}

/// Plain HTTP fetcher for redirects, pages and media files
pub struct DirectDownloader {
    client: Client,
    paths: PathsConfig,
}

impl DirectDownloader {
    pub fn new(http: &HttpConfig, paths: PathsConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(http.user_agent.clone())
            .redirect(redirect_policy(http.max_redirects))
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()?;

        Ok(Self { client, paths })
    }

    /// GET `url`, following redirects; `response.url()` is where it landed
    pub async fn open(&self, url: &Url) -> Result<Response, FetchError> {
        let response = self.client.get(url.clone()).send().await?;
        check_status(response.status(), url)?;

        if response.url() != url {
            tracing::debug!("Resolved {} -> {}", url, response.url());
        }

        Ok(response)
    }

    /// Follow `url` and decide what it offers, with a single request.
    ///
    /// A page that is itself audio or video keeps its unread body.
    pub async fn visit(&self, url: &Url) -> Result<Landing, FetchError> {
        let response = self.client.get(url.clone()).send().await?;

        if let Some(target) = video_host_redirect(&response) {
            tracing::debug!("Resolved {} -> {}", url, target);
            return Ok(Landing::VideoHost(target));
        }

        check_status(response.status(), url)?;
        let page = response.url().clone();
        if &page != url {
            tracing::debug!("Resolved {} -> {}", url, page);
        }

        if let Some(ct) = content_type(&response) {
            if is_media_content_type(&ct) {
                tracing::debug!("{} is served as {}, using it directly", page, ct);
                return Ok(Landing::Media(response));
            }
        }

        let markup = response.text().await?;
        let mut candidates = links::scan_media_links(&markup, &page);

        if candidates.is_empty() && MediaContainer::from_url(&page).is_some() {
            candidates.push(page.clone());
        }

        tracing::debug!("Found {} media links on {}", candidates.len(), page);
        Ok(Landing::Links { page, candidates })
    }

    /// Store an opened media response under the full-downloads directory
    pub async fn save(
        &self,
        response: Response,
        custom_name: Option<&str>,
    ) -> Result<PathBuf, FetchError> {
        let content_type = content_type(&response);
        let final_url = response.url().clone();

        if let Some(ct) = content_type.as_deref() {
            if ct.trim().to_lowercase().starts_with("text/html") {
                return Err(FetchError::FormatMismatch(format!(
                    "{} returned an HTML page, not media",
                    final_url
                )));
            }
        }

        let extension = determine_extension(&final_url, content_type.as_deref());
        let base_name = download_base_name(&final_url, custom_name);

        tracing::info!("Downloading media: {}", final_url);
        let staged = self.stage(response, &extension).await?;

        let target = self
            .paths
            .full_dir
            .join(format!("{}.{}", base_name, extension));
        fs_err::rename(&staged, &target)?;

        tracing::info!("Downloaded: {}", target.display());
        Ok(target)
    }

    /// Stream `response` into the temp directory, returning the staged path
    async fn stage(&self, response: Response, extension: &str) -> Result<PathBuf, FetchError> {
        let staged = self
            .paths
            .temp_dir
            .join(format!("temp_{}.{}", &Uuid::new_v4().to_string()[..8], extension));

        let progress = ProgressBar::new(response.content_length().unwrap_or(0));
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        progress.set_message("Downloading media...");

        let result = write_stream(response, &staged, &progress).await;
        match result {
            Ok(bytes) => {
                progress.finish_with_message("Download complete");
                tracing::debug!("Staged {} ({})", staged.display(), format_file_size(bytes));
                Ok(staged)
            }
            Err(err) => {
                progress.abandon_with_message("Download failed");
                let _ = fs_err::remove_file(&staged);
                Err(err)
            }
        }
    }
}

#[async_trait]
impl MediaDownloader for DirectDownloader {
    async fn download(&self, url: &Url, custom_name: Option<&str>) -> Result<PathBuf, FetchError> {
        let response = self.open(url).await?;
        self.save(response, custom_name).await
    }

    fn platform_name(&self) -> &'static str {
        "Direct URL"
    }
}

async fn write_stream(
    response: Response,
    path: &Path,
    progress: &ProgressBar,
) -> Result<u64, FetchError> {
    let mut file = fs_err::File::create(path)?;
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        progress.set_position(downloaded);
    }

    file.flush()?;
    Ok(downloaded)
}

/// Follow redirects like `Policy::limited`, but stop in front of a recognized
/// video host so its page is never fetched over plain HTTP
fn redirect_policy(max_redirects: usize) -> redirect::Policy {
    redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() > max_redirects {
            attempt.error("too many redirects")
        } else if is_recognized_video_host(attempt.url().as_str()) {
            attempt.stop()
        } else {
            attempt.follow()
        }
    })
}

/// Target of a redirect response that was stopped at a recognized video host
fn video_host_redirect(response: &Response) -> Option<Url> {
    if !response.status().is_redirection() {
        return None;
    }

    let location = response
        .headers()
        .get(reqwest::header::LOCATION)?
        .to_str()
        .ok()?;
    let target = response.url().join(location).ok()?;

    is_recognized_video_host(target.as_str()).then_some(target)
}

fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .map(|s| s.to_string())
}

fn check_status(status: StatusCode, url: &Url) -> Result<(), FetchError> {
    if status.is_success() {
        return Ok(());
    }

    let message = format!("HTTP {} for {}", status, url);
    if matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE) {
        Err(FetchError::Unavailable(message))
    } else {
        Err(FetchError::NetworkFailure(message))
    }
}

/// File extension for a download: URL path first, then Content-Type
pub fn determine_extension(url: &Url, content_type: Option<&str>) -> String {
    if let Some(container) = MediaContainer::from_url(url) {
        return container.as_str().to_string();
    }

    content_type
        .and_then(MediaContainer::from_content_type)
        .map(|container| container.as_str().to_string())
        .unwrap_or_else(|| "bin".to_string())
}

/// Base file name: the custom name, else the decoded URL file stem
pub fn download_base_name(url: &Url, custom_name: Option<&str>) -> String {
    let from_url = || {
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|file_name| !file_name.is_empty())
            .map(|file_name| {
                let stem = file_name
                    .rsplit_once('.')
                    .map(|(stem, _)| stem)
                    .unwrap_or(file_name);
                urlencoding::decode(stem)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| stem.to_string())
            })
    };

    custom_name
        .map(sanitize_download_name)
        .filter(|name| !name.is_empty())
        .or_else(|| from_url().map(|name| sanitize_download_name(&name)))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("download_{}", &Uuid::new_v4().to_string()[..8]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determine_extension() {
        let url = Url::parse("https://cdn.example.com/a/track.flac").unwrap();
        assert_eq!(determine_extension(&url, Some("audio/mpeg")), "flac");

        let opaque = Url::parse("https://cdn.example.com/stream?id=9").unwrap();
        assert_eq!(determine_extension(&opaque, Some("audio/mpeg")), "mp3");
        assert_eq!(determine_extension(&opaque, Some("application/octet-stream")), "bin");
        assert_eq!(determine_extension(&opaque, None), "bin");
    }

    #[test]
    fn test_download_base_name() {
        let url = Url::parse("https://cdn.example.com/media/My%20Great%20Talk.mp3").unwrap();
        assert_eq!(download_base_name(&url, None), "My_Great_Talk");
        assert_eq!(download_base_name(&url, Some("Keynote: day 1")), "Keynote_day_1");

        // custom names that sanitize to nothing fall back to the URL
        assert_eq!(download_base_name(&url, Some("???")), "My_Great_Talk");

        let bare = Url::parse("https://cdn.example.com/").unwrap();
        assert!(download_base_name(&bare, None).starts_with("download_"));
    }

    #[test]
    fn test_check_status_kinds() {
        let url = Url::parse("https://example.com/a.mp3").unwrap();
        assert!(check_status(StatusCode::OK, &url).is_ok());
        assert!(matches!(
            check_status(StatusCode::NOT_FOUND, &url),
            Err(FetchError::Unavailable(_))
        ));
        assert!(matches!(
            check_status(StatusCode::BAD_GATEWAY, &url),
            Err(FetchError::NetworkFailure(_))
        ));
    }
}
