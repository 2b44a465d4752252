//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{DatabaseTarget, HarvestConfig};
use super::secret::secret_string;
use crate::domain::errors::HarvestError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into HarvestConfig
/// 4. Applies environment variable overrides (HARVEST_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns `Configuration` if the file is missing or unreadable, a referenced
/// environment variable is unset, the TOML is malformed, or validation fails.
///
/// # Examples
///
/// ```no_run
/// use harvest::config::loader::load_config;
///
/// let config = load_config("harvest.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<HarvestConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(HarvestError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        HarvestError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: HarvestConfig = toml::from_str(&contents)
        .map_err(|e| HarvestError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        HarvestError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| HarvestError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut lines = Vec::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    processed_line = processed_line.replace(&format!("${{{var_name}}}"), &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        lines.push(processed_line);
    }

    if !missing_vars.is_empty() {
        return Err(HarvestError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(lines.join("\n"))
}

/// Applies environment variable overrides using HARVEST_* prefix
///
/// Environment variables follow the pattern: HARVEST_<SECTION>_<KEY>
/// For example: HARVEST_KOBO_BASE_URL, HARVEST_SYNC_PARALLEL_PARENTS
fn apply_env_overrides(config: &mut HarvestConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("HARVEST_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("HARVEST_APPLICATION_DRY_RUN") {
        config.application.dry_run = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("HARVEST_APPLICATION_PIPELINE_NAME") {
        config.application.pipeline_name = val;
    }

    // Kobo overrides
    if let Ok(val) = std::env::var("HARVEST_KOBO_BASE_URL") {
        config.kobo.base_url = val;
    }
    if let Ok(val) = std::env::var("HARVEST_KOBO_TOKEN") {
        config.kobo.token = secret_string(val);
    }
    if let Ok(val) = std::env::var("HARVEST_KOBO_PROJECT_VIEW") {
        config.kobo.project_view = val;
    }
    if let Ok(val) = std::env::var("HARVEST_KOBO_TIMEOUT_SECONDS") {
        if let Ok(timeout) = val.parse() {
            config.kobo.timeout_seconds = timeout;
        }
    }
    if let Ok(val) = std::env::var("HARVEST_KOBO_PAGE_SIZE") {
        if let Ok(size) = val.parse() {
            config.kobo.page_size = size;
        }
    }

    // Sync overrides
    if let Ok(val) = std::env::var("HARVEST_SYNC_SUBMISSION_TIME_START") {
        config.sync.submission_time_start = val;
    }
    if let Ok(val) = std::env::var("HARVEST_SYNC_PARALLEL_PARENTS") {
        if let Ok(parallel) = val.parse() {
            config.sync.parallel_parents = parallel;
        }
    }
    if let Ok(val) = std::env::var("HARVEST_SYNC_WRITE_DISPOSITION") {
        config.sync.write_disposition = val.parse()?;
    }
    if let Ok(val) = std::env::var("HARVEST_SYNC_LOAD_ATTACHMENTS") {
        config.sync.load_attachments = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("HARVEST_SYNC_LOAD_AUDIT") {
        config.sync.load_audit = val.parse().unwrap_or(false);
    }

    // Database overrides
    if let Ok(val) = std::env::var("HARVEST_DATABASE_TARGET") {
        config.database_target = match val.to_lowercase().as_str() {
            "postgresql" => DatabaseTarget::PostgreSQL,
            "memory" => DatabaseTarget::Memory,
            other => {
                return Err(HarvestError::Configuration(format!(
                    "HARVEST_DATABASE_TARGET must be 'postgresql' or 'memory', got '{other}'"
                )))
            }
        };
    }
    if let Some(ref mut pg_config) = config.postgresql {
        if let Ok(val) = std::env::var("HARVEST_POSTGRESQL_CONNECTION_STRING") {
            pg_config.connection_string = secret_string(val);
        }
        if let Ok(val) = std::env::var("HARVEST_POSTGRESQL_MAX_CONNECTIONS") {
            if let Ok(max) = val.parse() {
                pg_config.max_connections = max;
            }
        }
    }

    // Logging overrides
    if let Ok(val) = std::env::var("HARVEST_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("HARVEST_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}
