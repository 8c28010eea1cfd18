use anyhow::Result;
use clap::Parser;
use console::style;

use audio_harvest::cli::{init_tracing, HarvestCli};
use audio_harvest::extract::FfmpegTranscoder;
use audio_harvest::harvest::{read_url_entries, Harvester};
use audio_harvest::{utils, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = HarvestCli::parse();
    init_tracing(&cli.common);

    let config = cli.apply(Config::load(cli.common.config.as_deref())?);
    config.validate()?;

    if cli.show_config {
        config.display();
    }

    // Missing tools only break the rows that need them
    let missing_deps = utils::check_dependencies(&config.tools.ffmpeg, &config.tools.yt_dlp).await;
    if !missing_deps.is_empty() {
        eprintln!("{}", style("Dependency check warnings:").yellow());
        for dep in missing_deps {
            eprintln!("   • {}", dep);
        }
    }

    utils::setup_directories(&config.paths)?;
    let entries = read_url_entries(&cli.csv)?;
    tracing::info!("Loaded {} URLs from {}", entries.len(), cli.csv.display());

    let transcoder = FfmpegTranscoder::new(config.tools.ffmpeg.clone());
    let full_dir = config.paths.full_dir.clone();
    let harvester = Harvester::new(config, Box::new(transcoder))?;

    let summary = harvester.run(&entries).await;

    println!();
    println!(
        "{} {}/{} URLs into {} ({} trimmed, {} failed)",
        style("Downloaded").green().bold(),
        summary.downloaded,
        summary.entries,
        full_dir.display(),
        summary.trimmed,
        summary.failed
    );

    Ok(())
}
