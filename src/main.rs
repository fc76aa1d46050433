//! # Transcript Harness CLI (`tsh`)
//!
//! ## Usage
//!
//! ```bash
//! tsh --config ./config/tsh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tsh init` | Create the SQLite database and schema |
//! | `tsh check` | Validate the config and show the effective settings |
//! | `tsh scan` | Scan the configured SharePoint folder and store transcripts |
//! | `tsh list` | List stored transcripts |
//! | `tsh get <id>` | Show one transcript with its summary |
//! | `tsh summarize <id>` | Generate the AI summary for a transcript |
//! | `tsh activity` | Show recent scan activity |
//! | `tsh serve` | Start the HTTP API |
//!
//! Logs go to stderr; set `TSH_LOG` (e.g. `TSH_LOG=debug`) to change the level.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use transcript_harness::activity::scan_sink;
use transcript_harness::config::{self, Config, GRAPH_SECRET_ENV, OPENAI_KEY_ENV};
use transcript_harness::{db, logging, migrate, scan, server, store, summarize};

/// Transcript Harness: find meeting transcripts in SharePoint, pair them
/// with their recordings, and store them for search and summaries.
#[derive(Parser)]
#[command(
    name = "tsh",
    about = "Transcript Harness: SharePoint meeting transcript discovery and summaries",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tsh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Validate the configuration and print it with secrets redacted.
    Check,

    /// Scan the configured folder for transcripts.
    ///
    /// Pairs each meeting recording with its transcript, then upserts
    /// every transcript found. Re-running is safe.
    Scan {
        /// Show what would be stored without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// List stored transcripts, most recent first.
    List {
        #[arg(long, default_value = "20")]
        limit: i64,
    },

    /// Show one transcript by id.
    Get { id: String },

    /// Generate (or regenerate) the summary of a transcript.
    Summarize { id: String },

    /// Show recent activity log entries.
    Activity {
        #[arg(long, default_value = "50")]
        limit: i64,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Check => print_check(&cfg),
        Commands::Scan { dry_run } => run_scan(&cfg, dry_run).await?,
        Commands::List { limit } => {
            let pool = db::connect(&cfg).await?;
            let transcripts = store::list_transcripts(&pool, limit).await?;
            pool.close().await;

            if transcripts.is_empty() {
                println!("No transcripts stored. Run `tsh scan` first.");
            }
            for t in &transcripts {
                let video = t.video_file_name.as_deref().unwrap_or("-");
                println!("{}  {}  {}  [{}]", t.id, t.captured_at, t.title, video);
            }
        }
        Commands::Get { id } => {
            let pool = db::connect(&cfg).await?;
            let transcript = store::get_transcript(&pool, &id).await?;
            pool.close().await;

            let Some(t) = transcript else {
                eprintln!("Error: transcript not found: {}", id);
                std::process::exit(1);
            };
            println!("--- Transcript ---");
            println!("id:          {}", t.id);
            println!("title:       {}", t.title);
            println!("file:        {}", t.file_name);
            println!("source_url:  {}", t.source_url);
            println!("captured_at: {}", t.captured_at);
            if let Some(ref video) = t.video_file_name {
                println!("video:       {}", video);
            }
            if let Some(ref url) = t.video_url {
                println!("video_url:   {}", url);
            }
            println!("updated_at:  {}", t.updated_at);
            println!();
            if let Some(ref summary) = t.summary {
                print_summary(summary);
                println!();
            }
            println!("--- Content ---");
            println!("{}", t.content.as_deref().unwrap_or_default());
        }
        Commands::Summarize { id } => {
            let openai = cfg.openai()?;
            let pool = db::connect(&cfg).await?;
            let Some(transcript) = store::get_transcript(&pool, &id).await? else {
                pool.close().await;
                eprintln!("Error: transcript not found: {}", id);
                std::process::exit(1);
            };
            let summary = summarize::summarize_stored(openai, &pool, &transcript).await;
            pool.close().await;
            print_summary(&summary?);
        }
        Commands::Activity { limit } => {
            let pool = db::connect(&cfg).await?;
            let entries = store::list_activity(&pool, limit).await?;
            pool.close().await;

            for e in entries.iter().rev() {
                println!(
                    "{}  {:<5}  {:<20}  {}",
                    e.created_at, e.level, e.action, e.message
                );
            }
        }
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}

async fn run_scan(cfg: &Config, dry_run: bool) -> Result<()> {
    let pool = db::connect(cfg).await?;
    migrate::create_schema(&pool).await?;

    let sink = scan_sink(&pool, dry_run);
    let report = scan::run_folder_scan(cfg, sink.as_ref()).await?;

    println!(
        "scan {}{}",
        cfg.graph.normalized_folder(),
        if dry_run { " (dry-run)" } else { "" }
    );
    println!(
        "  recordings matched: {}/{}",
        report.matched_count, report.total_count
    );
    println!("  transcripts found: {}", report.records.len());
    for record in &report.records {
        match &record.associated_video_file_name {
            Some(video) => println!("    {}  <-  {}", record.file_name, video),
            None => println!("    {}", record.file_name),
        }
    }
    if !report.errors.is_empty() {
        println!("  errors: {}", report.errors.len());
        for err in &report.errors {
            println!("    {}: {}", err.file_name, err.message);
        }
    }

    if !dry_run {
        let stats = store::persist_report(&pool, &report).await?;
        println!(
            "  stored: {} inserted, {} updated, {} unchanged",
            stats.inserted, stats.updated, stats.unchanged
        );
    }
    pool.close().await;
    println!("ok");
    Ok(())
}

fn print_check(cfg: &Config) {
    let graph = &cfg.graph;
    println!("config ok");
    println!("  db.path:            {}", cfg.db.path.display());
    println!("  graph.tenant_id:    {}", graph.tenant_id);
    println!("  graph.client_id:    {}", graph.client_id);
    match (&graph.drive_id, &graph.site_hostname) {
        (Some(drive), _) => println!("  graph.drive_id:     {}", drive),
        (None, Some(host)) => println!(
            "  graph.site:         {}{} ({})",
            host,
            graph.site_path.as_deref().unwrap_or(""),
            graph.library
        ),
        (None, None) => {}
    }
    println!("  graph.folder_path:  /{}", graph.normalized_folder());
    println!("  {}: {}", GRAPH_SECRET_ENV, secret_status(GRAPH_SECRET_ENV));
    match &cfg.openai {
        Some(openai) => {
            println!("  openai.endpoint:    {}", openai.endpoint);
            println!("  openai.deployment:  {}", openai.deployment);
            println!("  {}: {}", OPENAI_KEY_ENV, secret_status(OPENAI_KEY_ENV));
        }
        None => println!("  openai:             disabled"),
    }
    println!("  server.bind:        {}", cfg.server.bind);
}

fn secret_status(var: &str) -> &'static str {
    if config::secret_from_env(var).is_ok() {
        "set"
    } else {
        "missing"
    }
}

fn print_summary(summary: &transcript_harness::models::Summary) {
    println!("--- Summary ({}, {}) ---", summary.model, summary.created_at);
    println!("{}", summary.summary);
    if !summary.key_points.is_empty() {
        println!();
        println!("Key points:");
        for point in &summary.key_points {
            println!("  - {}", point);
        }
    }
    if !summary.action_items.is_empty() {
        println!();
        println!("Action items:");
        for item in &summary.action_items {
            println!("  - {}", item);
        }
    }
}
