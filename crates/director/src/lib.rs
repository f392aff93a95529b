pub mod agent;
pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod director;
pub mod error;
pub mod events;
pub mod job;
pub mod logging;
pub mod migrate;
pub mod scheduler;
pub mod tree;

pub use bootstrap::{BootstrapOutput, BootstrapRecord, FileIndexSelector, VolumeParams};
pub use catalog::{Catalog, MemoryCatalog};
pub use config::{load_config, load_config_from_str, DirectorConfig, JobDefinition};
pub use director::{Director, RestoreSession};
pub use error::{
    AdmissionError, AgentError, BootstrapError, CatalogError, ConfigError, DirectorError, Result,
    SelectionError, TreeError,
};
pub use events::{JobEvent, JobEventBroadcaster};
pub use job::{JobHandle, JobId, JobLevel, JobRegistry, JobRequest, JobStatus, JobSummary, JobType};
pub use scheduler::{CancelToken, JobQueue, Watchdog};
pub use tree::{NodeId, RestoreTree};
