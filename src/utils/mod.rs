use anyhow::{Context, Result};
use url::Url;

use crate::config::PathsConfig;

const MAX_DOWNLOAD_NAME_CHARS: usize = 100;
const EXCERPT_LINES: usize = 3;
const EXCERPT_CHARS: usize = 300;

/// Parse a URL and require an HTTP(S) scheme
pub fn parse_http_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)
        .map_err(|_| anyhow::anyhow!("Invalid URL format: {}", url))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    Ok(parsed)
}

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Make a user-supplied segment name safe as a file name.
///
/// Only the characters Windows forbids in file names are replaced; spacing
/// and punctuation are otherwise kept.
pub fn sanitize_segment_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

/// Strict file name for downloaded media: word characters and hyphens,
/// whitespace runs collapsed to `_`, capped at 100 characters
pub fn sanitize_download_name(name: &str) -> String {
    let mut out = String::new();
    let mut in_space = false;

    for c in name.trim().chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
        } else if c.is_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
            in_space = false;
        }
    }

    out.chars().take(MAX_DOWNLOAD_NAME_CHARS).collect()
}

/// Last few non-empty lines of a tool's stderr, capped in length
pub fn stderr_excerpt(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        return "no error output".to_string();
    }

    let tail = &lines[lines.len().saturating_sub(EXCERPT_LINES)..];
    let joined = tail.join(" | ");

    if joined.chars().count() > EXCERPT_CHARS {
        let cut: String = joined.chars().take(EXCERPT_CHARS).collect();
        format!("{}...", cut)
    } else {
        joined
    }
}

/// Extract domain from URL for display purposes
pub fn extract_domain(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .host_str()
        .map(|host| host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// Create the full, trimmed and temp download directories
pub fn setup_directories(paths: &PathsConfig) -> Result<()> {
    for dir in [&paths.full_dir, &paths.trimmed_dir, &paths.temp_dir] {
        fs_err::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }
    Ok(())
}

/// Report external tools that do not answer `-version`/`--version`
pub async fn check_dependencies(ffmpeg: &str, yt_dlp: &str) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(yt_dlp, "--version").await {
        missing.push(format!("{} - required for YouTube downloads", yt_dlp));
    }

    if !check_command_available(ffmpeg, "-version").await {
        missing.push(format!("{} - required for trimming downloads", ffmpeg));
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str, version_flag: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(version_flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1048576), "1.0 MB");
    }

    #[test]
    fn test_sanitize_segment_name() {
        assert_eq!(sanitize_segment_name("a\\b/c*d?e:f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_segment_name("Chorus (take 2)"), "Chorus (take 2)");
    }

    #[test]
    fn test_sanitize_download_name() {
        assert_eq!(sanitize_download_name("Hello, World!"), "Hello_World");
        assert_eq!(sanitize_download_name("  My   Song - live  "), "My_Song_-_live");
        assert_eq!(sanitize_download_name("Café Ünïcode"), "Café_Ünïcode");
        assert_eq!(sanitize_download_name("???"), "");

        let long = "a".repeat(150);
        assert_eq!(sanitize_download_name(&long).len(), MAX_DOWNLOAD_NAME_CHARS);
    }

    #[test]
    fn test_stderr_excerpt_keeps_tail() {
        let stderr = "ffmpeg version 6\n  built with gcc\n\nInput #0\nclip.mp4: No such file or directory\n";
        assert_eq!(
            stderr_excerpt(stderr),
            "built with gcc | Input #0 | clip.mp4: No such file or directory"
        );
    }

    #[test]
    fn test_stderr_excerpt_empty_and_long() {
        assert_eq!(stderr_excerpt("\n \n"), "no error output");

        let long = "x".repeat(500);
        let excerpt = stderr_excerpt(&long);
        assert_eq!(excerpt.len(), EXCERPT_CHARS + 3);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(extract_domain("https://www.youtube.com/watch?v=123"), Some("youtube.com".to_string()));
        assert_eq!(extract_domain("https://example.org/a.mp3"), Some("example.org".to_string()));
        assert_eq!(extract_domain("invalid-url"), None);
    }

    #[test]
    fn test_parse_http_url() {
        assert!(parse_http_url("https://example.com").is_ok());
        assert!(parse_http_url("http://example.com").is_ok());
        assert!(parse_http_url("ftp://example.com").is_err());
        assert!(parse_http_url("not-a-url").is_err());
    }

    #[test]
    fn test_setup_directories() {
        let root = tempfile::tempdir().unwrap();
        let paths = PathsConfig::under(root.path());

        setup_directories(&paths).unwrap();

        assert!(paths.full_dir.is_dir());
        assert!(paths.trimmed_dir.is_dir());
        assert!(paths.temp_dir.is_dir());
    }
}
