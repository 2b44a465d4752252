//! Status command implementation
//!
//! Lists the committed watermarks of the configured pipeline.

use crate::adapters::database::create_sink_and_state;
use crate::config::load_config;
use crate::core::state::Watermark;
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug, Default)]
pub struct StatusArgs {
    /// Filter by resource name (e.g. kobo_submission)
    #[arg(long)]
    pub resource: Option<String>,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking sync status");

        println!("📊 Sync Status");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let (_, state) = match create_sink_and_state(&config) {
            Ok(pair) => pair,
            Err(e) => {
                println!("❌ Failed to connect to database");
                println!("   Error: {e}");
                return Ok(4);
            }
        };

        let watermarks = match state.get_all_watermarks().await {
            Ok(w) => w,
            Err(e) => {
                println!("❌ Failed to load watermarks");
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        let filtered = self.filter(&config.application.pipeline_name, &watermarks);

        if filtered.is_empty() {
            if watermarks.is_empty() {
                println!("No sync history found.");
                println!("Run 'harvest sync' to start loading data.");
            } else {
                println!("No watermarks match the specified filters.");
            }
            return Ok(0);
        }

        println!("Found {} watermark(s):", filtered.len());
        println!();
        println!(
            "{:<20} {:<26} {:<28} {:<26} {:<36}",
            "Resource", "Cursor", "Partition", "Value", "Last Load"
        );
        println!("{}", "-".repeat(136));

        for watermark in filtered {
            println!(
                "{:<20} {:<26} {:<28} {:<26} {:<36}",
                watermark.resource_name,
                watermark.cursor_field,
                if watermark.partition.is_empty() {
                    "(all)"
                } else {
                    watermark.partition.as_str()
                },
                watermark.value.format("%Y-%m-%d %H:%M:%S"),
                watermark.last_load_id.as_deref().unwrap_or("-")
            );
        }

        println!();
        Ok(0)
    }

    fn filter<'a>(&self, pipeline_name: &str, watermarks: &'a [Watermark]) -> Vec<&'a Watermark> {
        watermarks
            .iter()
            .filter(|w| w.pipeline_name == pipeline_name)
            .filter(|w| {
                self.resource
                    .as_deref()
                    .map_or(true, |resource| w.resource_name == resource)
            })
            .collect()
    }
}
