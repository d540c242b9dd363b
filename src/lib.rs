//! Multi-source research orchestrator
//!
//! Plans search strategies for a research topic, executes them against
//! financial content tools with per-failure-class retries, aggregates the
//! outcomes, and compiles a synthesized report. Progress streams to
//! observers as typed events; the same run also resolves to a blocking
//! final result.
//!
//! Pipeline stages, in order:
//! 1. Planning ([`planner`]): topic to validated search strategies.
//! 2. Execution ([`executor`]): strategies to search outcomes, with retries.
//! 3. Gathering ([`aggregator`]): outcomes to run statistics.
//! 4. Compilation ([`compiler`]): outcomes plus statistics to the report.
//!
//! [`workflow::ResearchWorkflow`] sequences the stages and memoizes the
//! result so streaming and blocking consumers observe the same run.

pub mod adapters;
pub mod aggregator;
pub mod compiler;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod models;
pub mod planner;
pub mod prompts;
pub mod reasoning;
pub mod retry;
pub mod workflow;

pub use config::{QualityThresholds, WorkflowConfig};
pub use error::{ResearchError, Result};
pub use events::{EventBus, ProgressEvent};
pub use models::{
    SearchOutcome, SearchQuality, Strategy, ToolType, WorkflowResult,
};
pub use workflow::{ResearchWorkflow, WorkflowState};
