pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, validate_config};
pub use schema::{
    AlwaysIncrementalConfig, ClientResource, DirectorConfig, DirectorSettings, DuplicatePolicy,
    JobDefinition, PoolResource, RunLimits, SelectionConfig, SelectionType, StorageResource,
};
