use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::extract::{trim_file, ExtractOptions, ExtractionSummary, Transcoder};
use crate::extractors::{
    is_recognized_video_host, parse_loose_url, DirectDownloader, FetchError, Landing,
    MediaDownloader, YoutubeDownloader,
};
use crate::segments::SegmentError;
use crate::utils::{extract_domain, parse_http_url};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One row of the URL list
#[derive(Debug, Clone, PartialEq)]
pub struct UrlEntry {
    /// 1-based line number in the list file
    pub row: usize,
    pub url: String,
    pub trim_reference: Option<PathBuf>,
    pub custom_name: Option<String>,
}

/// Read the URL list; blank rows are dropped without a warning
pub fn read_url_entries(path: &Path) -> anyhow::Result<Vec<UrlEntry>> {
    use anyhow::Context;

    let data = fs_err::read(path).context("Failed to read URL list")?;
    Ok(parse_url_entries(&data))
}

pub fn parse_url_entries(data: &[u8]) -> Vec<UrlEntry> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);

    let mut entries = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                let row = err.position().map(|p| p.line() as usize).unwrap_or(index + 1);
                tracing::warn!("Row {}: unreadable ({}) - skipping", row, err);
                continue;
            }
        };

        let row = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(index + 1);
        let field = |i: usize| record.get(i).map(str::trim).filter(|s| !s.is_empty());

        let Some(url) = field(0) else {
            continue;
        };

        entries.push(UrlEntry {
            row,
            url: url.to_string(),
            trim_reference: field(1).map(PathBuf::from),
            custom_name: field(2).map(str::to_string),
        });
    }

    entries
}

/// Try `candidates` in order and return the first success.
///
/// Stops at the first `Ok`; later candidates are never attempted.
pub async fn first_success<'a, C, T, F, Fut>(
    candidates: &'a [C],
    mut attempt: F,
) -> Result<T, FetchError>
where
    C: Display,
    F: FnMut(&'a C) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let total = candidates.len();
    let mut last_error = None;

    for (index, candidate) in candidates.iter().enumerate() {
        match attempt(candidate).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::warn!("Candidate {}/{} ({}) failed: {}", index + 1, total, candidate, err);
                last_error = Some(err);
            }
        }
    }

    Err(match last_error {
        Some(err) => FetchError::Unavailable(format!(
            "all {} candidate links failed, last error: {}",
            total, err
        )),
        None => FetchError::FormatMismatch("no candidate links to try".to_string()),
    })
}

/// What happened to one URL entry
#[derive(Debug)]
pub struct EntryReport {
    pub file: PathBuf,
    pub trim: Option<Result<ExtractionSummary, SegmentError>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    pub entries: usize,
    pub downloaded: usize,
    pub trimmed: usize,
    pub failed: usize,
}

/// Downloads every entry of a URL list, trimming where asked
pub struct Harvester {
    config: Config,
    youtube: YoutubeDownloader,
    direct: DirectDownloader,
    transcoder: Box<dyn Transcoder>,
}

impl Harvester {
    pub fn new(config: Config, transcoder: Box<dyn Transcoder>) -> Result<Self, FetchError> {
        let youtube = YoutubeDownloader::new(config.tools.yt_dlp.clone(), config.paths.clone());
        let direct = DirectDownloader::new(&config.http, config.paths.clone())?;

        Ok(Self {
            config,
            youtube,
            direct,
            transcoder,
        })
    }

    /// Process entries one after another; a failed row never stops the batch
    pub async fn run(&self, entries: &[UrlEntry]) -> HarvestSummary {
        let mut summary = HarvestSummary {
            entries: entries.len(),
            ..HarvestSummary::default()
        };

        for entry in entries {
            match self.process_entry(entry).await {
                Ok(report) => {
                    summary.downloaded += 1;
                    match report.trim {
                        Some(Ok(trim)) => {
                            tracing::info!(
                                "Row {}: trimmed {} segments from {}",
                                entry.row,
                                trim,
                                report.file.display()
                            );
                            summary.trimmed += 1;
                        }
                        Some(Err(err)) => {
                            tracing::warn!("Row {}: trimming failed: {}", entry.row, err);
                        }
                        None => {}
                    }
                }
                Err(err) => {
                    tracing::warn!("Row {}: skipping - {}", entry.row, err);
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    pub async fn process_entry(&self, entry: &UrlEntry) -> Result<EntryReport, FetchError> {
        tracing::info!("Processing URL #{}: {}", entry.row, entry.url);
        if let Some(name) = &entry.custom_name {
            tracing::info!("Custom name: {}", name);
        }
        if let Some(reference) = &entry.trim_reference {
            tracing::info!("Trim CSV: {}", reference.display());
        }

        let file = self.fetch(entry).await?;

        let trim = match &entry.trim_reference {
            Some(reference) => Some(self.trim_download(&file, reference).await),
            None => None,
        };

        Ok(EntryReport { file, trim })
    }

    /// Classify the entry's URL and download it the matching way
    pub async fn fetch(&self, entry: &UrlEntry) -> Result<PathBuf, FetchError> {
        let custom_name = entry.custom_name.as_deref();

        if is_recognized_video_host(&entry.url) {
            let url = parse_loose_url(&entry.url)?;
            return self.youtube.download(&url, custom_name).await;
        }

        let url = parse_http_url(&entry.url)
            .map_err(|err| FetchError::Unrecognized(err.to_string()))?;
        let (page, candidates) = match self.direct.visit(&url).await? {
            Landing::VideoHost(target) => {
                tracing::info!("Redirected to {}", self.youtube.platform_name());
                return self.youtube.download(&target, custom_name).await;
            }
            Landing::Media(response) => return self.direct.save(response, custom_name).await,
            Landing::Links { page, candidates } => (page, candidates),
        };

        if candidates.is_empty() {
            return Err(FetchError::FormatMismatch(format!(
                "No media links found on {}",
                extract_domain(page.as_str()).unwrap_or_else(|| page.to_string())
            )));
        }

        tracing::info!("Found {} candidate media links", candidates.len());
        first_success(&candidates, |candidate| {
            self.direct.download(candidate, custom_name)
        })
        .await
    }

    async fn trim_download(
        &self,
        file: &Path,
        reference: &Path,
    ) -> Result<ExtractionSummary, SegmentError> {
        let options = ExtractOptions {
            output_dir: self.config.paths.trimmed_dir.clone(),
            format: self.config.trim.format,
            bitrate: self.config.trim.bitrate.clone(),
        };

        trim_file(
            self.transcoder.as_ref(),
            file,
            reference,
            &self.config.trim.columns,
            &options,
        )
        .await
    }
}
