use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::{DirectorConfig, JobDefinition};
use crate::error::ConfigError;
use crate::job::JobType;

const SCHEMA_JSON: &str = include_str!("../../schema/director-config-v1.json");

/// Loads a director configuration. `.yaml`/`.yml` files are parsed as YAML,
/// everything else as JSON.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<DirectorConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    if is_yaml {
        let value: serde_json::Value = serde_yaml::from_str(&content)?;
        load_config_from_value(value)
    } else {
        load_config_from_str(&content)
    }
}

pub fn load_config_from_str(content: &str) -> Result<DirectorConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;
    load_config_from_value(json_value)
}

fn load_config_from_value(json_value: serde_json::Value) -> Result<DirectorConfig, ConfigError> {
    validate_schema(&json_value)?;

    let config: DirectorConfig = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Semantic checks that the schema cannot express.
pub fn validate_config(config: &DirectorConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.director.max_concurrent_jobs == 0 {
        return Err(ConfigError::Validation {
            message: "director.max_concurrent_jobs must be at least 1".to_string(),
        });
    }

    check_unique("client", config.clients.iter().map(|c| c.name.as_str()))?;
    check_unique("storage", config.storages.iter().map(|s| s.name.as_str()))?;
    check_unique("pool", config.pools.iter().map(|p| p.name.as_str()))?;
    check_unique("job", config.jobs.iter().map(|j| j.name.as_str()))?;

    for pool in &config.pools {
        if let Some(storage) = &pool.storage {
            require(config.storage(storage).is_some(), "Storage", storage, &pool.name)?;
        }
        if let Some(next) = &pool.next_pool {
            require(config.pool(next).is_some(), "Pool", next, &pool.name)?;
        }
        if pool.migration_low_bytes > pool.migration_high_bytes {
            return Err(ConfigError::Validation {
                message: format!(
                    "Pool '{}': migration_low_bytes exceeds migration_high_bytes",
                    pool.name
                ),
            });
        }
    }

    for job in &config.jobs {
        validate_job(config, job)?;
    }

    Ok(())
}

fn validate_job(config: &DirectorConfig, job: &JobDefinition) -> Result<(), ConfigError> {
    if let Some(client) = &job.client {
        require(config.client(client).is_some(), "Client", client, &job.name)?;
    }
    if let Some(pool) = &job.pool {
        require(config.pool(pool).is_some(), "Pool", pool, &job.name)?;
    }
    for storage in &job.storage {
        require(config.storage(storage).is_some(), "Storage", storage, &job.name)?;
    }

    if matches!(job.job_type, JobType::Backup) && job.client.is_none() {
        return Err(ConfigError::Validation {
            message: format!("Backup job '{}' needs a client", job.name),
        });
    }

    if let Some(selection) = &job.selection {
        if !matches!(job.job_type, JobType::Migrate | JobType::Copy) {
            return Err(ConfigError::Validation {
                message: format!(
                    "Job '{}': selection is only valid for migrate and copy jobs",
                    job.name
                ),
            });
        }
        if job.pool.is_none() {
            return Err(ConfigError::Validation {
                message: format!("Job '{}': selection needs a pool", job.name),
            });
        }
        match (&selection.pattern, selection.selection_type.needs_pattern()) {
            (None, true) => {
                return Err(ConfigError::InvalidPattern {
                    job: job.name.clone(),
                    reason: "selection type requires a pattern".to_string(),
                })
            }
            (Some(pattern), _) if selection.selection_type.is_regex() => {
                if let Err(e) = regex::Regex::new(pattern) {
                    return Err(ConfigError::InvalidPattern {
                        job: job.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
            _ => {}
        }
    }

    if job.always_incremental.is_some() && (job.client.is_none() || job.fileset.is_none()) {
        return Err(ConfigError::Validation {
            message: format!(
                "Always-incremental job '{}' needs both client and fileset",
                job.name
            ),
        });
    }

    Ok(())
}

fn check_unique<'a>(
    kind: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateResource {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

fn require(
    present: bool,
    kind: &'static str,
    name: &str,
    referenced_by: &str,
) -> Result<(), ConfigError> {
    if present {
        Ok(())
    } else {
        Err(ConfigError::UnknownResource {
            kind,
            name: name.to_string(),
            referenced_by: referenced_by.to_string(),
        })
    }
}
