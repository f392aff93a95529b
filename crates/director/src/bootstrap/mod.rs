//! Bootstrap records: which file indexes of which jobs to read back, and on
//! which volumes they live.

pub mod record;
pub mod selector;
pub mod volume;
pub mod writer;

pub use record::{BootstrapNode, BootstrapRecord};
pub use selector::{FileIndexSelector, IndexRange, MAX_FILE_INDEX};
pub use volume::{JobMedia, RequiredVolume, VolumeParams};
pub use writer::{write_bootstrap_file, BootstrapOutput, BuildOptions};
