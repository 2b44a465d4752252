//! Validate config command implementation

use crate::adapters::kobo::kobo_plan;
use crate::config::load_config;
use crate::config::schema::DatabaseTarget;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates as well; failures are configuration errors either way
        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration file loaded successfully");
                c
            }
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let plan = match kobo_plan(&config.kobo, &config.sync) {
            Ok(plan) => plan,
            Err(e) => {
                println!("❌ Resource configuration is invalid");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Pipeline: {}", config.application.pipeline_name);
        println!("  Log Level: {}", config.application.log_level);
        println!("  KoboToolbox Server: {}", config.kobo.base_url);
        println!("  Project View: {}", config.kobo.project_view);
        println!("  Page Size: {}", config.kobo.page_size);

        match config.database_target {
            DatabaseTarget::PostgreSQL => {
                if let Some(ref pg_config) = config.postgresql {
                    use secrecy::ExposeSecret;
                    println!("  Database Target: PostgreSQL");
                    println!(
                        "  PostgreSQL Connection: {}",
                        pg_config
                            .connection_string
                            .expose_secret()
                            .as_ref()
                            .split('@')
                            .next_back()
                            .unwrap_or("***")
                    );
                    println!("  Schema: {}", pg_config.schema);
                    println!("  Max Connections: {}", pg_config.max_connections);
                }
            }
            DatabaseTarget::Memory => println!("  Database Target: memory (nothing persists)"),
        }

        println!("  Write Disposition: {}", config.sync.write_disposition);
        println!("  Parallel Forms: {}", config.sync.parallel_parents);
        for spec in plan.levels() {
            let cursor = spec
                .cursor
                .as_ref()
                .map(|c| format!("{} ({}, from {})", c.field, c.missing_policy, c.initial_value))
                .unwrap_or_else(|| "none".to_string());
            println!(
                "  Resource {}: table '{}', loaded: {}, cursor: {}",
                spec.name, spec.table_name, spec.selected, cursor
            );
        }
        println!();
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_validate_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "database_target = \"memory\"\n\n[kobo]\nbase_url = \"https://kf.kobotoolbox.org\"\ntoken = \"abc\"\nproject_view = \"pv1\"\n"
        )
        .unwrap();

        let code = ValidateArgs {}
            .execute(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_validate_invalid_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "database_target = \"memory\"\n\n[kobo]\nbase_url = \"ftp://kf\"\ntoken = \"abc\"\nproject_view = \"pv1\"\n"
        )
        .unwrap();

        let code = ValidateArgs {}
            .execute(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(code, 2);
    }
}
