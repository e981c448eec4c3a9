use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;

use showpull::{
    FeedPublisher, MediaPipeline, NoopReporter, ProgressEvent, ProgressReporter, ReqwestClient,
    RunOptions, SharedProgressReporter, load_config, run,
};

// Emoji with fallback for terminals without Unicode support
static TV: Emoji<'_, '_> = Emoji("📺 ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static BROOM: Emoji<'_, '_> = Emoji("🧹 ", "[-] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "[=] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Mirror a web video show into an audio podcast feed
#[derive(Parser, Debug)]
#[command(name = "showpull")]
#[command(about = "Mirror a web video show into an audio podcast feed")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Media root directory, overrides the configuration
    #[arg(short, long)]
    dest_dir: Option<PathBuf>,

    /// Maximum number of new entries to process this run
    #[arg(short, long)]
    limit: Option<usize>,

    /// Discover and list new entries without downloading or saving
    #[arg(long)]
    dry_run: bool,

    /// Quiet mode - suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Append log output to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        let main_bar = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} {wide_msg}")
        {
            main_bar.set_style(style);
        }
        main_bar.enable_steady_tick(std::time::Duration::from_millis(100));

        Self { main_bar }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::IntermediatesCleanedUp { count } => {
                self.main_bar.println(format!(
                    "{BROOM}Removed {} leftover intermediate file(s)",
                    count.to_string().yellow()
                ));
            }

            ProgressEvent::FetchingListing { page, url } => {
                self.main_bar.set_message(format!(
                    "{SEARCH}Listing page {}: {}",
                    (page + 1).to_string().cyan(),
                    url.dimmed()
                ));
            }

            ProgressEvent::ListingParsed {
                page,
                candidates,
                stale,
            } => {
                let note = if stale { " (older than horizon)" } else { "" };
                self.main_bar.set_message(format!(
                    "{SEARCH}Listing page {}: {} entries{}",
                    (page + 1).to_string().cyan(),
                    candidates.to_string().cyan(),
                    note.dimmed()
                ));
            }

            ProgressEvent::DiscoveryCompleted { pages, new_entries } => {
                self.main_bar.println(format!(
                    "{HEADPHONES}{} pages scanned, {} new",
                    pages.to_string().cyan(),
                    new_entries.to_string().yellow().bold()
                ));
            }

            ProgressEvent::EntryStarting {
                index,
                total,
                title,
            } => {
                self.main_bar.set_message(format!(
                    "{DOWNLOAD}[{}/{}] {}",
                    (index + 1).to_string().cyan(),
                    total.to_string().cyan(),
                    truncate_title(&title, 60)
                ));
            }

            ProgressEvent::EntryAlreadyPresent { title } => {
                self.main_bar.println(format!(
                    "  {SKIP}{}",
                    truncate_title(&title, 60).dimmed()
                ));
            }

            ProgressEvent::EntryCompleted { title } => {
                self.main_bar.println(format!(
                    "  {SUCCESS}{}",
                    truncate_title(&title, 60).green()
                ));
            }

            ProgressEvent::EntryFailed { title, error } => {
                self.main_bar.println(format!(
                    "  {FAILURE}{} - {}",
                    truncate_title(&title, 40).red(),
                    error.red()
                ));
            }

            ProgressEvent::FeedWritten { path, items } => {
                self.main_bar.println(format!(
                    "{FOLDER}Feed: {} ({} items)",
                    path.display().to_string().cyan(),
                    items.to_string().cyan()
                ));
            }

            ProgressEvent::RunCompleted {
                processed_count,
                existing_count,
                failed_count,
            } => {
                self.main_bar.finish_and_clear();
                println!(
                    "\n{PARTY}{} {} processed, {} already present, {} failed",
                    "Run complete:".bold().green(),
                    processed_count.to_string().green().bold(),
                    existing_count.to_string().yellow(),
                    if failed_count > 0 {
                        failed_count.to_string().red().bold()
                    } else {
                        failed_count.to_string().green()
                    }
                );
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let cut: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

/// Log to the given file, or to stderr. On a terminal with progress output
/// only warnings are logged unless `RUST_LOG` says otherwise.
fn init_tracing(log_file: Option<&PathBuf>, progress: bool) -> Result<()> {
    let default_level = if progress && log_file.is_none() {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(UtcTime::rfc_3339());

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_file.as_ref(), !args.quiet)?;

    if let Err(e) = run_cli(&args).await {
        error!("{e:#}");
        if !args.quiet {
            eprintln!("{CROSS}{}", format!("{e:#}").red());
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run_cli(args: &Args) -> Result<()> {
    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dest_dir) = &args.dest_dir {
        config.dest_dir = dest_dir.clone();
    }

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            TV,
            "showpull".bold().magenta(),
            format!("- {}", config.feed.title).dimmed()
        );
    }
    info!(show = %config.name, dest_dir = %config.dest_dir.display(), "Starting run");

    let client = ReqwestClient::new();
    let pipeline =
        MediaPipeline::from_tools(&config.dest_dir, &config.tools, config.enrich_details);
    let publisher = FeedPublisher::from_config(&config);
    let options = RunOptions {
        limit: args.limit,
        dry_run: args.dry_run,
    };

    let indicatif = (!args.quiet).then(|| Arc::new(IndicatifReporter::new()));
    let reporter: SharedProgressReporter = match &indicatif {
        Some(indicatif) => indicatif.clone(),
        None => NoopReporter::shared(),
    };

    let result = run(&config, &client, &pipeline, &publisher, &options, reporter).await;
    if let Some(indicatif) = &indicatif {
        indicatif.main_bar.finish_and_clear();
    }
    let summary = result.context("Run failed")?;

    if args.quiet {
        return Ok(());
    }

    if args.dry_run {
        println!("\n{}", "New entries (dry run):".bold());
        for entry in &summary.pending {
            println!("  {}", entry.to_string().cyan());
        }
        if summary.pending.is_empty() {
            println!("  {}", "nothing new".dimmed());
        }
        return Ok(());
    }

    if !summary.failed_entries.is_empty() {
        println!("\n{}", "Failed entries:".red().bold());
        for (title, error) in &summary.failed_entries {
            println!("  {}{} - {}", CROSS, title.yellow(), error.dimmed());
        }
    }

    println!(
        "\n{FOLDER}Output: {}\n",
        config.dest_dir.display().to_string().cyan()
    );

    Ok(())
}
