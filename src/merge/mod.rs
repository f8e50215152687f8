pub mod orchestrator;
pub mod plan;

pub use orchestrator::MergeOrchestrator;
pub use plan::{plan_merge, MergePlan};
