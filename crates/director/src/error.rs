use std::path::PathBuf;
use thiserror::Error;

use crate::job::JobId;

#[derive(Error, Debug)]
pub enum DirectorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Admission error: {0}")]
    Admission(#[from] AdmissionError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Bootstrap error: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("Restore tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),

    #[error("Failed to start {what}: {source}")]
    Startup {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid selection pattern in job '{job}': {reason}")]
    InvalidPattern { job: String, reason: String },

    #[error("{kind} '{name}' referenced by '{referenced_by}' is not defined")]
    UnknownResource {
        kind: &'static str,
        name: String,
        referenced_by: String,
    },

    #[error("Duplicate {kind} name '{name}'")]
    DuplicateResource { kind: &'static str, name: String },
}

/// Reasons a submission never reaches the run queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Job queue is shut down")]
    QueueClosed,

    #[error("Job definition '{0}' is not defined")]
    UnknownJobDefinition(String),

    #[error("{kind} '{name}' is not defined")]
    ResourceMissing { kind: &'static str, name: String },

    #[error("JobId {existing} already running. Duplicate job '{job}' not allowed")]
    DuplicateRejected { job: String, existing: JobId },

    #[error("Selection is empty: {0}")]
    MalformedSelection(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Catalog query failed: {0}")]
    Query(String),

    #[error("JobId {0} not found in catalog")]
    JobNotFound(JobId),

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("Failed to connect to {agent} at {address}: {reason}")]
    Connect {
        agent: String,
        address: String,
        reason: String,
    },

    #[error("Protocol error with {agent}: {reason}")]
    Protocol { agent: String, reason: String },

    #[error("{agent} terminated the job: {reason}")]
    Terminated { agent: String, reason: String },

    #[error("Interrupted by cancellation")]
    Canceled,
}

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("No files selected")]
    EmptySelection,

    #[error("No files found to restore")]
    ZeroFiles,

    #[error("No volumes recorded for JobId {0}")]
    NoVolumes(JobId),

    #[error("Invalid file regex '{pattern}': {reason}")]
    InvalidFileRegex { pattern: String, reason: String },

    #[error("Failed to write bootstrap file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid path: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),
}

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("Invalid selection pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Job '{0}' has no selection pattern")]
    MissingPattern(String),

    #[error("Job '{0}' has no pool to select from")]
    MissingPool(String),

    #[error("Pool '{0}' is not defined")]
    UnknownPool(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

pub type Result<T> = std::result::Result<T, DirectorError>;
