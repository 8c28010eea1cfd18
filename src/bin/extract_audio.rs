use anyhow::{Context, Result};
use clap::Parser;
use console::style;

use audio_harvest::cli::{init_tracing, ExtractCli};
use audio_harvest::extract::{trim_file, FfmpegTranscoder};
use audio_harvest::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ExtractCli::parse();
    init_tracing(&cli.common);

    let config = Config::load(cli.common.config.as_deref())?;

    // Column clashes are usage errors and must surface before any IO
    let layout = cli.layout(&config);
    layout.validate()?;

    let transcoder = FfmpegTranscoder::new(cli.ffmpeg_path(&config));
    transcoder
        .check_availability()
        .await
        .with_context(|| {
            format!(
                "FFmpeg not found at '{}'. Install with: sudo apt install ffmpeg",
                transcoder.program()
            )
        })?;

    if !cli.video.is_file() {
        anyhow::bail!("Input video not found: {}", cli.video.display());
    }

    let options = cli.extract_options(&config);
    let summary = trim_file(&transcoder, &cli.video, &cli.csv, &layout, &options).await?;

    println!();
    for failure in &summary.failures {
        println!(
            "{} segment {} (row {}): {}",
            style("Failed").red().bold(),
            failure.ordinal,
            failure.row,
            failure.message
        );
    }
    println!(
        "{} {} segments into {}",
        style("Successfully extracted").green().bold(),
        summary,
        options.output_dir.display()
    );
    if summary.skipped() > 0 {
        println!("  ({} rows skipped, see warnings above)", summary.skipped());
    }

    Ok(())
}
