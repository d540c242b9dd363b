//! Result gathering and run-level statistics
//!
//! `aggregate` is a pure function of the outcome sequence; the metadata is
//! always recomputed in full, never maintained incrementally. The
//! [`Gatherer`] wraps it with progress narration and the sufficiency check.

use crate::events::{EventBus, ProgressEvent};
use crate::models::{RunMetadata, SearchOutcome};
use std::collections::BTreeMap;
use tracing::warn;

/// Recompute run statistics from the full set of outcomes. Failed searches
/// count toward totals, timing, and the per-tool distribution.
pub fn aggregate(outcomes: &[SearchOutcome]) -> RunMetadata {
    let total_searches = outcomes.len();
    let successful_searches = outcomes.iter().filter(|o| o.success).count();
    let total_execution_time: f64 = outcomes.iter().map(|o| o.execution_time_seconds).sum();
    let average_execution_time = if total_searches > 0 {
        total_execution_time / total_searches as f64
    } else {
        0.0
    };
    let total_content_length = outcomes.iter().map(|o| o.content_length).sum();

    let mut tool_type_distribution = BTreeMap::new();
    for outcome in outcomes {
        *tool_type_distribution.entry(outcome.tool_type).or_insert(0) += 1;
    }

    RunMetadata {
        total_searches,
        successful_searches,
        total_execution_time,
        average_execution_time,
        total_content_length,
        tool_type_distribution,
    }
}

pub struct Gatherer {
    bus: EventBus,
    min_successful_searches: usize,
}

impl Gatherer {
    pub fn new(bus: EventBus, min_successful_searches: usize) -> Self {
        Self {
            bus,
            min_successful_searches,
        }
    }

    /// Aggregate outcomes and decide whether the run has enough signal.
    /// Insufficiency is reported, not fatal: compilation proceeds with
    /// whatever is available.
    pub fn gather(&self, outcomes: &[SearchOutcome]) -> (RunMetadata, bool) {
        self.bus.emit(ProgressEvent::GatheringStart {
            message: format!("Gathering results from {} searches", outcomes.len()),
        });

        let metadata = aggregate(outcomes);

        let success_rate = if metadata.total_searches > 0 {
            metadata.successful_searches as f64 / metadata.total_searches as f64 * 100.0
        } else {
            0.0
        };
        self.bus.emit(ProgressEvent::SuccessAnalysis {
            message: format!(
                "{} of {} searches succeeded ({:.0}%)",
                metadata.successful_searches, metadata.total_searches, success_rate
            ),
        });
        self.bus.emit(ProgressEvent::PerformanceMetrics {
            message: format!(
                "Average search time {:.1}s, total content {} chars",
                metadata.average_execution_time, metadata.total_content_length
            ),
        });

        let sufficient = metadata.successful_searches >= self.min_successful_searches;
        if !sufficient {
            warn!(
                successful = metadata.successful_searches,
                required = self.min_successful_searches,
                "Run has insufficient signal; compiling with available results"
            );
        }

        self.bus.emit(ProgressEvent::GatheringComplete {
            message: if sufficient {
                "Result gathering complete".to_string()
            } else {
                format!(
                    "Result gathering complete with insufficient signal ({} of {} required successes)",
                    metadata.successful_searches, self.min_successful_searches
                )
            },
        });

        (metadata, sufficient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorKind, ErrorRecord, SearchQuality, ToolType};
    use uuid::Uuid;

    fn outcome(tool: ToolType, success: bool, time: f64, length: usize) -> SearchOutcome {
        SearchOutcome {
            strategy_id: Uuid::new_v4(),
            tool_type: tool,
            description: "test".to_string(),
            success,
            content: "x".repeat(length),
            content_length: length,
            execution_time_seconds: time,
            quality: SearchQuality::Medium,
            error: (!success).then(|| ErrorRecord::new(ErrorKind::Timeout, "slow")),
            attempt_count: 1,
        }
    }

    #[test]
    fn totals_and_distribution_count_all_attempted_searches() {
        let outcomes = vec![
            outcome(ToolType::News, true, 2.0, 1000),
            outcome(ToolType::News, false, 4.0, 0),
            outcome(ToolType::Filings, true, 6.0, 2000),
        ];

        let metadata = aggregate(&outcomes);
        assert_eq!(metadata.total_searches, 3);
        assert_eq!(metadata.successful_searches, 2);
        assert_eq!(metadata.total_execution_time, 12.0);
        assert_eq!(metadata.average_execution_time, 4.0);
        assert_eq!(metadata.total_content_length, 3000);
        assert_eq!(metadata.tool_type_distribution[&ToolType::News], 2);
        assert_eq!(metadata.tool_type_distribution[&ToolType::Filings], 1);
        assert_eq!(
            metadata.tool_type_distribution.values().sum::<usize>(),
            metadata.total_searches
        );
    }

    #[test]
    fn empty_outcome_set_yields_zeroed_metadata() {
        let metadata = aggregate(&[]);
        assert_eq!(metadata.total_searches, 0);
        assert_eq!(metadata.average_execution_time, 0.0);
        assert!(metadata.tool_type_distribution.is_empty());
    }

    #[tokio::test]
    async fn gatherer_reports_insufficiency_without_failing() {
        let (bus, mut rx) = EventBus::channel();
        let gatherer = Gatherer::new(bus, 1);

        let outcomes = vec![outcome(ToolType::News, false, 1.0, 0)];
        let (metadata, sufficient) = gatherer.gather(&outcomes);

        assert!(!sufficient);
        assert_eq!(metadata.successful_searches, 0);

        let mut tags = Vec::new();
        while let Ok(event) = rx.try_recv() {
            tags.push(event.event_type());
        }
        assert_eq!(
            tags,
            vec![
                "gathering_start",
                "success_analysis",
                "performance_metrics",
                "gathering_complete"
            ]
        );
    }
}
