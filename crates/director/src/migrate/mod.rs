//! Catalog-driven selection of source jobs for migrate, copy and
//! consolidation control jobs.

pub mod consolidate;
pub mod selection;

pub use consolidate::{plan as plan_consolidation, ConsolidationPlan, FullConsolidationBudget};
pub use selection::{select_job_ids, SelectionContext};
