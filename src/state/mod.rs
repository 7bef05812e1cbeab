//! State module for tracking workflow progress
//!
//! - `WorkflowState`: where a crawl or validation run is, persisted on its report
//! - `CheckState`: where a single URL check is
//! - `Workflow`: in-memory tracker that enforces the allowed transitions

mod workflow_state;

pub use workflow_state::{CheckState, Workflow, WorkflowState};
