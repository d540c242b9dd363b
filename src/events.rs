//! Progress event stream
//!
//! Typed, ephemeral notifications describing pipeline progress. A single
//! run pushes events through an [`EventBus`]; any observer (CLI, dashboard,
//! log sink) pulls from the paired receiver. The channel closing signals
//! run completion.

use crate::models::{ErrorKind, SearchQuality, ToolType};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

/// One variant per event tag in the streaming vocabulary. Consumers switch
/// exhaustively on this enum; every variant carries at least a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    // Planning phase
    PlanningStart {
        message: String,
    },
    PlanningConfig {
        message: String,
    },
    PlanningModel {
        message: String,
    },
    PlanningThinking {
        message: String,
    },
    StrategyPreview {
        message: String,
        strategy_index: usize,
        tool_type: ToolType,
    },
    QueryPreview {
        message: String,
        strategy_index: usize,
    },
    PlanningReady {
        message: String,
        strategy_count: usize,
    },

    // Search execution phase
    SearchStart {
        message: String,
        tool_type: ToolType,
    },
    ApiStart {
        message: String,
        tool_type: ToolType,
        attempt: u32,
    },
    ApiSuccess {
        message: String,
        tool_type: ToolType,
        execution_time: f64,
    },
    ResultQuality {
        message: String,
        tool_type: ToolType,
        quality: SearchQuality,
        content_length: usize,
    },
    ApiError {
        message: String,
        tool_type: ToolType,
        attempt: u32,
        error_kind: ErrorKind,
    },
    SearchComplete {
        message: String,
        tool_type: ToolType,
        success: bool,
    },

    // Gathering phase
    GatheringStart {
        message: String,
    },
    SuccessAnalysis {
        message: String,
    },
    PerformanceMetrics {
        message: String,
    },
    GatheringComplete {
        message: String,
    },

    // Compilation phase
    CompilationStart {
        message: String,
    },
    SynthesisStart {
        message: String,
    },
    SynthesisComplete {
        message: String,
        synthesis_time: f64,
        report_length: usize,
    },
    ReportStats {
        message: String,
    },

    // Terminal events
    WorkflowComplete {
        message: String,
        total_time: f64,
    },
    WorkflowFailed {
        message: String,
        error_kind: String,
    },
}

impl ProgressEvent {
    /// The wire tag for this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            ProgressEvent::PlanningStart { .. } => "planning_start",
            ProgressEvent::PlanningConfig { .. } => "planning_config",
            ProgressEvent::PlanningModel { .. } => "planning_model",
            ProgressEvent::PlanningThinking { .. } => "planning_thinking",
            ProgressEvent::StrategyPreview { .. } => "strategy_preview",
            ProgressEvent::QueryPreview { .. } => "query_preview",
            ProgressEvent::PlanningReady { .. } => "planning_ready",
            ProgressEvent::SearchStart { .. } => "search_start",
            ProgressEvent::ApiStart { .. } => "api_start",
            ProgressEvent::ApiSuccess { .. } => "api_success",
            ProgressEvent::ResultQuality { .. } => "result_quality",
            ProgressEvent::ApiError { .. } => "api_error",
            ProgressEvent::SearchComplete { .. } => "search_complete",
            ProgressEvent::GatheringStart { .. } => "gathering_start",
            ProgressEvent::SuccessAnalysis { .. } => "success_analysis",
            ProgressEvent::PerformanceMetrics { .. } => "performance_metrics",
            ProgressEvent::GatheringComplete { .. } => "gathering_complete",
            ProgressEvent::CompilationStart { .. } => "compilation_start",
            ProgressEvent::SynthesisStart { .. } => "synthesis_start",
            ProgressEvent::SynthesisComplete { .. } => "synthesis_complete",
            ProgressEvent::ReportStats { .. } => "report_stats",
            ProgressEvent::WorkflowComplete { .. } => "workflow_complete",
            ProgressEvent::WorkflowFailed { .. } => "workflow_failed",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ProgressEvent::PlanningStart { message }
            | ProgressEvent::PlanningConfig { message }
            | ProgressEvent::PlanningModel { message }
            | ProgressEvent::PlanningThinking { message }
            | ProgressEvent::StrategyPreview { message, .. }
            | ProgressEvent::QueryPreview { message, .. }
            | ProgressEvent::PlanningReady { message, .. }
            | ProgressEvent::SearchStart { message, .. }
            | ProgressEvent::ApiStart { message, .. }
            | ProgressEvent::ApiSuccess { message, .. }
            | ProgressEvent::ResultQuality { message, .. }
            | ProgressEvent::ApiError { message, .. }
            | ProgressEvent::SearchComplete { message, .. }
            | ProgressEvent::GatheringStart { message }
            | ProgressEvent::SuccessAnalysis { message }
            | ProgressEvent::PerformanceMetrics { message }
            | ProgressEvent::GatheringComplete { message }
            | ProgressEvent::CompilationStart { message }
            | ProgressEvent::SynthesisStart { message }
            | ProgressEvent::SynthesisComplete { message, .. }
            | ProgressEvent::ReportStats { message }
            | ProgressEvent::WorkflowComplete { message, .. }
            | ProgressEvent::WorkflowFailed { message, .. } => message,
        }
    }
}

/// Single-run event channel. Cloning the bus gives additional producers
/// (one per concurrent strategy); events interleave across producers but
/// each event is delivered atomically.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl EventBus {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A bus with no observer. Emission becomes a no-op.
    pub fn sink() -> Self {
        let (bus, _rx) = Self::channel();
        bus
    }

    /// Push an event to the observer. A dropped receiver means nobody is
    /// watching; the run must not fail because of that.
    pub fn emit(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            trace!("progress event dropped: no active observer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = ProgressEvent::ResultQuality {
            message: "Result quality: high".to_string(),
            tool_type: ToolType::News,
            quality: SearchQuality::High,
            content_length: 4200,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "result_quality");
        assert_eq!(json["tool_type"], "news");
        assert_eq!(json["quality"], "high");
        assert_eq!(json["content_length"], 4200);
    }

    #[test]
    fn event_type_matches_serde_tag() {
        let event = ProgressEvent::WorkflowComplete {
            message: "done".to_string(),
            total_time: 1.0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
    }

    #[tokio::test]
    async fn emit_without_observer_does_not_panic() {
        let bus = EventBus::sink();
        bus.emit(ProgressEvent::PlanningStart {
            message: "start".to_string(),
        });
    }

    #[tokio::test]
    async fn channel_closes_when_all_producers_drop() {
        let (bus, mut rx) = EventBus::channel();
        let clone = bus.clone();
        clone.emit(ProgressEvent::GatheringStart {
            message: "gathering".to_string(),
        });
        drop(bus);
        drop(clone);

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
