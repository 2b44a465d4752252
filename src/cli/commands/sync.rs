//! Sync command implementation
//!
//! Runs the forms → submissions → attachments cascade once.

use crate::adapters::database::create_sink_and_state;
use crate::adapters::kobo::{kobo_plan, KoboClient};
use crate::config::load_config;
use crate::core::cascade::{CascadeOptions, CascadeOrchestrator, RunStatus, RunSummary};
use crate::core::state::CursorStore;
use crate::domain::WriteDisposition;
use clap::Args;
use std::sync::Arc;
use tokio::sync::watch;

/// Arguments for the sync command
#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Dry run mode - extract without writing rows or watermarks
    #[arg(long)]
    pub dry_run: bool,

    /// Override write disposition (append, merge or replace)
    #[arg(long)]
    pub disposition: Option<String>,

    /// Override the number of forms processed concurrently
    #[arg(long)]
    pub parallel: Option<usize>,
}

impl SyncArgs {
    /// Execute the sync command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting sync command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };

        if let Some(ref disposition) = self.disposition {
            match disposition.parse::<WriteDisposition>() {
                Ok(parsed) => {
                    tracing::info!(disposition = %parsed, "Overriding write disposition from CLI");
                    config.sync.write_disposition = parsed;
                }
                Err(e) => {
                    eprintln!("{e}");
                    return Ok(2);
                }
            }
        }

        if let Some(parallel) = self.parallel {
            tracing::info!(parallel, "Overriding parallel parents from CLI");
            config.sync.parallel_parents = parallel;
        }

        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        let plan = match kobo_plan(&config.kobo, &config.sync) {
            Ok(plan) => plan,
            Err(e) => {
                eprintln!("Invalid resource configuration: {e}");
                return Ok(2);
            }
        };

        let dry_run = config.application.dry_run;
        if dry_run {
            tracing::info!("Dry run mode enabled - no data will be written");
            println!("🔍 DRY RUN MODE - No data will be written to the database");
            println!();
        }

        if !self.yes && !dry_run {
            println!("Sync Configuration:");
            println!("  Server: {}", config.kobo.base_url);
            println!("  Project view: {}", config.kobo.project_view);
            println!(
                "  Resources: {}",
                plan.levels()
                    .iter()
                    .map(|level| level.name.as_str())
                    .collect::<Vec<_>>()
                    .join(" → ")
            );
            println!("  Write disposition: {}", config.sync.write_disposition);
            println!("  Parallel forms: {}", config.sync.parallel_parents);
            println!();
            print!("Proceed with sync? [y/N]: ");
            use std::io::{self, Write};
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;

            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Sync cancelled.");
                return Ok(0);
            }
        }

        let (sink, state) = match create_sink_and_state(&config) {
            Ok(pair) => pair,
            Err(e) => {
                eprintln!("Failed to initialize destination: {e}");
                return Ok(4);
            }
        };

        if let Err(e) = sink.test_connection().await {
            eprintln!("Failed to connect to {}: {e}", sink.destination_name());
            return Ok(4);
        }
        if let Err(e) = sink.ensure_schema().await {
            eprintln!("Failed to prepare {}: {e}", sink.destination_name());
            return Ok(4);
        }

        let cursors = match CursorStore::open(state, &config.application.pipeline_name).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                eprintln!("Failed to load watermarks: {e}");
                return Ok(4);
            }
        };

        let client = match KoboClient::new(&config.kobo) {
            Ok(client) => client,
            Err(e) => {
                eprintln!("Failed to create KoboToolbox client: {e}");
                return Ok(4);
            }
        };
        if let Err(e) = client.health_check().await {
            eprintln!("Failed to reach KoboToolbox at {}: {e}", client.base_url());
            return Ok(4);
        }

        let options = CascadeOptions {
            parallel_parents: config.sync.parallel_parents,
            dry_run,
        };
        let orchestrator = CascadeOrchestrator::new(Arc::new(client), cursors, sink, options)
            .with_shutdown(shutdown_signal);

        println!("🚀 Starting sync...");
        println!();
        let summary = orchestrator.run(&plan).await;

        print_summary(&summary);
        Ok(exit_code(&summary))
    }
}

/// Exit code for a finished run
pub fn exit_code(summary: &RunSummary) -> i32 {
    match summary.status() {
        RunStatus::Succeeded => 0,
        RunStatus::Failed => 1,
        RunStatus::Interrupted => 130,
    }
}

fn print_summary(summary: &RunSummary) {
    println!("📊 Sync Summary (load {}):", summary.load_id);
    println!(
        "  {:<20} {:<22} {:>10} {:>10} {:>10} {:>10}",
        "Resource", "State", "Parents", "Extracted", "Written", "Cursors"
    );
    println!("  {}", "-".repeat(88));
    for level in &summary.levels {
        println!(
            "  {:<20} {:<22} {:>10} {:>10} {:>10} {:>10}",
            level.resource,
            level.state.to_string(),
            format!("{}/{}", level.parents_processed, level.parents_total),
            level.records_extracted,
            level.rows_written,
            level.watermarks_committed
        );
    }
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    println!();

    match summary.status() {
        RunStatus::Succeeded => println!("✅ Sync completed successfully!"),
        RunStatus::Interrupted => {
            println!("⚠️  Sync interrupted gracefully. Committed watermarks are kept.");
            println!("   Run the same command to resume.");
        }
        RunStatus::Failed => {
            println!(
                "❌ Sync failed at resource '{}'",
                summary.failed_resource.as_deref().unwrap_or("unknown")
            );
            if let Some(ref error) = summary.error {
                println!("   Error: {error}");
            }
            if summary.retryable {
                println!("   The error looks transient; rerunning may succeed.");
            }
            if summary.committed_watermarks.is_empty() {
                println!("   No watermark has been committed yet.");
            } else {
                println!("   Last committed watermarks:");
                for watermark in &summary.committed_watermarks {
                    println!("     {} = {}", watermark.id, watermark.value.to_rfc3339());
                }
            }
        }
    }
    println!();
}
