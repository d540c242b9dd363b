//! Retry policy and decision log
//!
//! Pure per-failure-class decisions. The executor applies them; this module
//! never performs I/O itself. Every decision, including "no retry", lands in
//! the [`DecisionLog`] and is mirrored through `tracing` for post-hoc
//! debugging.

use crate::models::{ErrorKind, ErrorRecord, Strategy};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// What the executor should do with a failed attempt.
#[derive(Debug, Clone)]
pub struct RetryDecision {
    pub retry: bool,
    pub delay: Duration,
    /// Auth failures ask the adapter to reset its connection state first.
    pub reset_connection: bool,
    /// A transformed strategy to use for the next attempt, when the failure
    /// class calls for a mutated request.
    pub mutated: Option<Strategy>,
}

impl RetryDecision {
    fn give_up() -> Self {
        Self {
            retry: false,
            delay: Duration::ZERO,
            reset_connection: false,
            mutated: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Base delay in seconds for rate-limit backoff.
    pub base_delay_seconds: f64,
    /// Attempt ceiling, the first attempt included.
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base_delay_seconds: f64, max_attempts: u32) -> Self {
        Self {
            base_delay_seconds,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn with_base_delay(self, base_delay_seconds: f64) -> Self {
        Self {
            base_delay_seconds,
            ..self
        }
    }

    /// Decide whether to retry after `attempt_count` attempts have failed,
    /// the last of them with `error`.
    pub fn decide(
        &self,
        strategy: &Strategy,
        error: &ErrorRecord,
        attempt_count: u32,
    ) -> RetryDecision {
        if attempt_count >= self.max_attempts {
            return RetryDecision::give_up();
        }

        match error.kind {
            // Reset connection state and retry once, no delay.
            ErrorKind::Auth => RetryDecision {
                retry: attempt_count <= 1,
                delay: Duration::ZERO,
                reset_connection: attempt_count <= 1,
                mutated: None,
            },
            // Exponential backoff: base * 2^(attempt - 1), up to the ceiling.
            ErrorKind::RateLimit => {
                let exponent = attempt_count.saturating_sub(1).min(16);
                let delay = self.base_delay_seconds * f64::from(1u32 << exponent);
                RetryDecision {
                    retry: true,
                    delay: Duration::from_secs_f64(delay.max(0.0)),
                    reset_connection: false,
                    mutated: None,
                }
            }
            // Retry once with reduced query complexity.
            ErrorKind::Timeout => RetryDecision {
                retry: attempt_count <= 1,
                delay: Duration::ZERO,
                reset_connection: false,
                mutated: (attempt_count <= 1).then(|| reduce_query_complexity(strategy)),
            },
            // Retry once with broadened terms and fewer filters.
            ErrorKind::EmptyResult => RetryDecision {
                retry: attempt_count <= 1,
                delay: Duration::ZERO,
                reset_connection: false,
                mutated: (attempt_count <= 1).then(|| broaden_terms(strategy)),
            },
            // Retry once after sanitizing query text.
            ErrorKind::MalformedQuery => RetryDecision {
                retry: attempt_count <= 1,
                delay: Duration::ZERO,
                reset_connection: false,
                mutated: (attempt_count <= 1).then(|| sanitize_queries(strategy)),
            },
            ErrorKind::Unknown => RetryDecision::give_up(),
        }
    }
}

/// Keep the leading half of the queries (at least one) and cap each to its
/// first words. Deterministic counterpart of "retry with reduced complexity".
fn reduce_query_complexity(strategy: &Strategy) -> Strategy {
    const MAX_WORDS: usize = 6;

    let keep = (strategy.queries.len() + 1) / 2;
    let queries = strategy
        .queries
        .iter()
        .take(keep.max(1))
        .map(|q| {
            q.split_whitespace()
                .take(MAX_WORDS)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();

    Strategy {
        queries,
        ..strategy.clone()
    }
}

/// Drop optional parameters so the next attempt casts a wider net.
fn broaden_terms(strategy: &Strategy) -> Strategy {
    Strategy {
        parameters: strategy.parameters.without_optional_filters(),
        ..strategy.clone()
    }
}

/// Strip special characters and collapse whitespace in every query.
fn sanitize_queries(strategy: &Strategy) -> Strategy {
    let queries = strategy
        .queries
        .iter()
        .map(|q| {
            q.chars()
                .map(|c| {
                    if c.is_alphanumeric() || c.is_whitespace() {
                        c
                    } else {
                        ' '
                    }
                })
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();

    Strategy {
        queries,
        ..strategy.clone()
    }
}

//
// ================= Decision log =================
//

/// One retained record per retry decision.
#[derive(Debug, Clone, Serialize)]
pub struct RetryDecisionRecord {
    pub strategy_id: uuid::Uuid,
    pub tool_type: crate::models::ToolType,
    pub attempt_count: u32,
    pub error_kind: ErrorKind,
    pub retried: bool,
    pub delay_seconds: f64,
    pub decided_at: DateTime<Utc>,
}

/// Side channel for retry decisions, distinct from progress events.
/// Recording never fails the run.
#[derive(Clone, Default)]
pub struct DecisionLog {
    records: Arc<RwLock<Vec<RetryDecisionRecord>>>,
}

impl DecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, strategy: &Strategy, error: &ErrorRecord, decision: &RetryDecision, attempt_count: u32) {
        let record = RetryDecisionRecord {
            strategy_id: strategy.strategy_id,
            tool_type: strategy.tool_type,
            attempt_count,
            error_kind: error.kind,
            retried: decision.retry,
            delay_seconds: decision.delay.as_secs_f64(),
            decided_at: Utc::now(),
        };

        debug!(
            strategy_id = %record.strategy_id,
            tool_type = %record.tool_type,
            attempt_count = record.attempt_count,
            error_kind = %record.error_kind,
            retried = record.retried,
            delay_seconds = record.delay_seconds,
            "Retry decision"
        );

        match self.records.write() {
            Ok(mut records) => records.push(record),
            Err(_) => warn!("Decision log unavailable; decision not retained"),
        }
    }

    pub fn snapshot(&self) -> Vec<RetryDecisionRecord> {
        self.records
            .read()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DateRange, ToolParameters, ToolType};
    use uuid::Uuid;

    fn strategy() -> Strategy {
        Strategy {
            strategy_id: Uuid::new_v4(),
            tool_type: ToolType::News,
            queries: vec![
                "Micron HBM demand outlook & pricing!".to_string(),
                "AI memory market share (2025)".to_string(),
            ],
            parameters: ToolParameters {
                date_range: Some(DateRange::Last30Days),
                ..Default::default()
            },
            description: "Recent news".to_string(),
            priority: 4,
        }
    }

    fn error(kind: ErrorKind) -> ErrorRecord {
        ErrorRecord::new(kind, "boom")
    }

    #[test]
    fn auth_retries_at_most_once_with_reset() {
        let policy = RetryPolicy::new(1.0, 3);
        let s = strategy();

        let first = policy.decide(&s, &error(ErrorKind::Auth), 1);
        assert!(first.retry);
        assert!(first.reset_connection);
        assert_eq!(first.delay, Duration::ZERO);

        let second = policy.decide(&s, &error(ErrorKind::Auth), 2);
        assert!(!second.retry);
    }

    #[test]
    fn rate_limit_backoff_is_strictly_increasing_and_capped() {
        let policy = RetryPolicy::new(1.5, 4);
        let s = strategy();

        let mut previous = 0.0;
        for attempt in 1..4 {
            let decision = policy.decide(&s, &error(ErrorKind::RateLimit), attempt);
            assert!(decision.retry, "attempt {} should retry", attempt);
            let delay = decision.delay.as_secs_f64();
            assert!(delay > previous);
            assert_eq!(delay, 1.5 * f64::from(1u32 << (attempt - 1)));
            previous = delay;
        }

        // Ceiling reached: attempt 4 of 4 must not retry.
        let capped = policy.decide(&s, &error(ErrorKind::RateLimit), 4);
        assert!(!capped.retry);
    }

    #[test]
    fn unknown_never_retries() {
        let policy = RetryPolicy::new(1.0, 3);
        let decision = policy.decide(&strategy(), &error(ErrorKind::Unknown), 1);
        assert!(!decision.retry);
        assert!(decision.mutated.is_none());
    }

    #[test]
    fn timeout_reduces_query_complexity() {
        let policy = RetryPolicy::new(1.0, 3);
        let s = strategy();
        let decision = policy.decide(&s, &error(ErrorKind::Timeout), 1);
        assert!(decision.retry);

        let mutated = decision.mutated.expect("timeout retry mutates the request");
        assert_eq!(mutated.queries.len(), 1);
        assert!(mutated.queries[0].split_whitespace().count() <= 6);
    }

    #[test]
    fn empty_result_drops_optional_filters() {
        let policy = RetryPolicy::new(1.0, 3);
        let decision = policy.decide(&strategy(), &error(ErrorKind::EmptyResult), 1);

        let mutated = decision.mutated.expect("empty result broadens the request");
        assert!(mutated.parameters.date_range.is_none());
    }

    #[test]
    fn malformed_query_is_sanitized() {
        let policy = RetryPolicy::new(1.0, 3);
        let decision = policy.decide(&strategy(), &error(ErrorKind::MalformedQuery), 1);

        let mutated = decision.mutated.expect("malformed query retry mutates");
        assert_eq!(mutated.queries[0], "Micron HBM demand outlook pricing");
        assert_eq!(mutated.queries[1], "AI memory market share 2025");
    }

    #[test]
    fn decision_log_retains_every_decision() {
        let policy = RetryPolicy::new(1.0, 3);
        let log = DecisionLog::new();
        let s = strategy();

        let err = error(ErrorKind::RateLimit);
        for attempt in 1..=2 {
            let decision = policy.decide(&s, &err, attempt);
            log.record(&s, &err, &decision, attempt);
        }

        let records = log.snapshot();
        assert_eq!(records.len(), 2);
        assert!(records[0].delay_seconds < records[1].delay_seconds);
        assert!(records.iter().all(|r| r.error_kind == ErrorKind::RateLimit));
    }
}
