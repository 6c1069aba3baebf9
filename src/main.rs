mod config;
mod discord;
mod enrich;
mod error;
mod extract;
mod metadata;
mod render;
mod screenshot;
mod store;
mod tags;
mod translate;

use std::time::Instant;

use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "link_archive", about = "Archive links shared in a Discord thread as a static page")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull every URL posted in the thread into the data file
    FetchLinks,
    /// Fetch title, description, image and keywords for each link
    FetchMetadata,
    /// Derive tags from the collected metadata
    GenerateTags,
    /// Capture a viewport screenshot of each link
    CaptureScreenshots,
    /// Render index.html
    GeneratePage,
    /// Render tags.html
    GenerateTagsPage,
    /// All stages in order
    Run,
    /// Summarize the data file
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    let result = match cli.command {
        Commands::FetchLinks => extract::run(&settings).await.map(|_| ()),
        Commands::FetchMetadata => enrich::run(&settings).await.map(|_| ()),
        Commands::GenerateTags => tags::run(&settings).map(|_| ()),
        Commands::CaptureScreenshots => screenshot::run(&settings).await.map(|_| ()),
        Commands::GeneratePage => render::run_index(&settings).map(|_| ()),
        Commands::GenerateTagsPage => render::run_tags_page(&settings).map(|_| ()),
        Commands::Run => run_pipeline(&settings).await,
        Commands::Stats => {
            let links = store::load_links(&settings.data_path)?;
            let s = store::get_stats(&links);
            println!("Links:       {}", s.total);
            println!("Enriched:    {}", s.enriched);
            println!("Tagged:      {}", s.tagged);
            println!(
                "Screenshots: {} ok, {} failed, {} pending",
                s.screenshots,
                s.screenshot_failures,
                s.total - s.screenshots - s.screenshot_failures
            );
            println!("Authors:     {}", s.authors);
            println!("Tags:        {}", s.tags);
            println!("Domains:     {}", s.domains);

            let top = render::aggregate_tags(&links);
            if !top.is_empty() {
                println!("\n--- Top tags ---");
                for t in top.iter().take(10) {
                    println!("  {:<24} {:>4}", truncate(&t.name, 24), t.count);
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run_pipeline(settings: &Settings) -> anyhow::Result<()> {
    settings.discord()?;

    let t = Instant::now();
    let extracted = extract::run(settings).await?;
    println!("[1/6] Extracted {} links in {}", extracted, format_duration(t.elapsed()));

    let t = Instant::now();
    let enriched = enrich::run(settings).await?;
    println!(
        "[2/6] Enriched {} links ({} titled) in {}",
        enriched.total,
        enriched.titled,
        format_duration(t.elapsed())
    );

    let t = Instant::now();
    let tagged = tags::run(settings)?;
    println!("[3/6] {} unique tags in {}", tagged, format_duration(t.elapsed()));

    let t = Instant::now();
    let shots = screenshot::run(settings).await?;
    println!(
        "[4/6] Screenshots ({} captured, {} skipped, {} failed) in {}",
        shots.captured,
        shots.skipped,
        shots.failed,
        format_duration(t.elapsed())
    );

    let index = render::run_index(settings)?;
    println!("[5/6] {}", index.display());
    let tags_page = render::run_tags_page(settings)?;
    println!("[6/6] {}", tags_page.display());
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
