//! Search execution
//!
//! Runs one strategy against its tool adapter: attempt loop, retry policy
//! application, wall-time measurement, quality scoring, event emission.
//! Failures never escape this boundary; they are recorded in the outcome.

use crate::adapters::{AdapterRegistry, SearchFailure, SearchRequest};
use crate::config::QualityThresholds;
use crate::events::{EventBus, ProgressEvent};
use crate::models::{ErrorKind, ErrorRecord, SearchOutcome, SearchQuality, Strategy};
use crate::retry::{DecisionLog, RetryPolicy};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct SearchExecutor {
    registry: Arc<AdapterRegistry>,
    policy: RetryPolicy,
    decisions: DecisionLog,
    bus: EventBus,
    thresholds: QualityThresholds,
}

impl SearchExecutor {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        policy: RetryPolicy,
        decisions: DecisionLog,
        bus: EventBus,
        thresholds: QualityThresholds,
    ) -> Self {
        Self {
            registry,
            policy,
            decisions,
            bus,
            thresholds,
        }
    }

    /// Execute one strategy to completion. Retries happen inside this call;
    /// the caller only sees them through `attempt_count` and the repeated
    /// `api_start`/`api_error` events.
    pub async fn execute(
        &self,
        strategy: &Strategy,
        max_results: usize,
        rate_limit_delay: f64,
        cancel: &CancellationToken,
    ) -> SearchOutcome {
        self.bus.emit(ProgressEvent::SearchStart {
            message: format!("Executing {} search: {}", strategy.tool_type, strategy.description),
            tool_type: strategy.tool_type,
        });

        let policy = self.policy.with_base_delay(rate_limit_delay);
        let adapter = self.registry.get(strategy.tool_type);
        let start = Instant::now();
        let mut current = strategy.clone();
        let mut attempt: u32 = 0;
        let last_error;

        loop {
            attempt += 1;
            self.bus.emit(ProgressEvent::ApiStart {
                message: format!(
                    "Calling {} API (attempt {})",
                    strategy.tool_type, attempt
                ),
                tool_type: strategy.tool_type,
                attempt,
            });

            let result = match &adapter {
                Some(adapter) => {
                    let request = SearchRequest {
                        queries: &current.queries,
                        parameters: &current.parameters,
                        max_results,
                    };
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return self.finalize_cancelled(strategy, start, attempt);
                        }
                        result = adapter.search(&request) => result,
                    }
                }
                None => Err(SearchFailure::new(
                    ErrorKind::Unknown,
                    format!("No adapter registered for {}", strategy.tool_type),
                )),
            };

            let failure = match result {
                Ok(content) if !content.trim().is_empty() => {
                    return self.finalize_success(strategy, content, start, attempt);
                }
                Ok(_) => SearchFailure::new(
                    ErrorKind::EmptyResult,
                    format!("{} search returned no content", strategy.tool_type),
                ),
                Err(failure) => failure,
            };

            let error = ErrorRecord::new(failure.kind, failure.message);
            self.bus.emit(ProgressEvent::ApiError {
                message: format!(
                    "{} search attempt {} failed: {}",
                    strategy.tool_type, attempt, error.message
                ),
                tool_type: strategy.tool_type,
                attempt,
                error_kind: error.kind,
            });

            let decision = policy.decide(&current, &error, attempt);
            self.decisions.record(&current, &error, &decision, attempt);

            if !decision.retry {
                last_error = error;
                break;
            }

            if decision.reset_connection {
                if let Some(adapter) = &adapter {
                    debug!(tool_type = %strategy.tool_type, "Resetting adapter connection");
                    adapter.reset();
                }
            }

            if !decision.delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return self.finalize_cancelled(strategy, start, attempt);
                    }
                    _ = tokio::time::sleep(decision.delay) => {}
                }
            }

            if let Some(mutated) = decision.mutated {
                current = mutated;
            }
        }

        warn!(
            tool_type = %strategy.tool_type,
            attempts = attempt,
            error_kind = %last_error.kind,
            "Search exhausted all attempts"
        );

        self.bus.emit(ProgressEvent::SearchComplete {
            message: format!("{} search failed after {} attempt(s)", strategy.tool_type, attempt),
            tool_type: strategy.tool_type,
            success: false,
        });

        SearchOutcome {
            strategy_id: strategy.strategy_id,
            tool_type: strategy.tool_type,
            description: strategy.description.clone(),
            success: false,
            content: String::new(),
            content_length: 0,
            execution_time_seconds: start.elapsed().as_secs_f64(),
            quality: SearchQuality::Low,
            error: Some(last_error),
            attempt_count: attempt,
        }
    }

    fn finalize_success(
        &self,
        strategy: &Strategy,
        content: String,
        start: Instant,
        attempt: u32,
    ) -> SearchOutcome {
        let execution_time = start.elapsed().as_secs_f64();
        let content_length = content.len();
        let quality = score_quality(content_length, self.thresholds);

        self.bus.emit(ProgressEvent::ApiSuccess {
            message: format!(
                "{} search succeeded in {:.1}s",
                strategy.tool_type, execution_time
            ),
            tool_type: strategy.tool_type,
            execution_time,
        });
        self.bus.emit(ProgressEvent::ResultQuality {
            message: format!(
                "Result quality: {} ({} chars)",
                quality, content_length
            ),
            tool_type: strategy.tool_type,
            quality,
            content_length,
        });
        self.bus.emit(ProgressEvent::SearchComplete {
            message: format!("{} search complete", strategy.tool_type),
            tool_type: strategy.tool_type,
            success: true,
        });

        SearchOutcome {
            strategy_id: strategy.strategy_id,
            tool_type: strategy.tool_type,
            description: strategy.description.clone(),
            success: true,
            content,
            content_length,
            execution_time_seconds: execution_time,
            quality,
            error: None,
            attempt_count: attempt,
        }
    }

    fn finalize_cancelled(
        &self,
        strategy: &Strategy,
        start: Instant,
        attempt: u32,
    ) -> SearchOutcome {
        self.bus.emit(ProgressEvent::SearchComplete {
            message: format!("{} search cancelled", strategy.tool_type),
            tool_type: strategy.tool_type,
            success: false,
        });

        SearchOutcome {
            strategy_id: strategy.strategy_id,
            tool_type: strategy.tool_type,
            description: strategy.description.clone(),
            success: false,
            content: String::new(),
            content_length: 0,
            execution_time_seconds: start.elapsed().as_secs_f64(),
            quality: SearchQuality::Low,
            error: Some(ErrorRecord::new(
                ErrorKind::Unknown,
                "Search cancelled before completion",
            )),
            attempt_count: attempt,
        }
    }
}

/// Classify result quality by content volume.
pub fn score_quality(content_length: usize, thresholds: QualityThresholds) -> SearchQuality {
    if content_length < thresholds.low_ceiling {
        SearchQuality::Low
    } else if content_length > thresholds.high_floor {
        SearchQuality::High
    } else {
        SearchQuality::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{SearchAdapter, StaticSearchAdapter};
    use crate::models::{ToolParameters, ToolType};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use uuid::Uuid;

    fn strategy(tool: ToolType) -> Strategy {
        Strategy {
            strategy_id: Uuid::new_v4(),
            tool_type: tool,
            queries: vec!["memory demand".to_string()],
            parameters: ToolParameters::default(),
            description: "test strategy".to_string(),
            priority: 3,
        }
    }

    fn executor_with(
        registry: AdapterRegistry,
        max_attempts: u32,
    ) -> (SearchExecutor, DecisionLog) {
        let decisions = DecisionLog::new();
        let executor = SearchExecutor::new(
            Arc::new(registry),
            RetryPolicy::new(0.01, max_attempts),
            decisions.clone(),
            EventBus::sink(),
            QualityThresholds::default(),
        );
        (executor, decisions)
    }

    struct FailingAdapter {
        kind: ErrorKind,
    }

    #[async_trait::async_trait]
    impl SearchAdapter for FailingAdapter {
        fn tool_type(&self) -> ToolType {
            ToolType::News
        }

        async fn search(&self, _request: &SearchRequest<'_>) -> Result<String, SearchFailure> {
            Err(SearchFailure::new(self.kind, "synthetic failure"))
        }
    }

    /// Fails with rate_limit until `succeed_on_attempt`, then succeeds.
    struct FlakyAdapter {
        calls: AtomicU32,
        succeed_on_attempt: u32,
    }

    #[async_trait::async_trait]
    impl SearchAdapter for FlakyAdapter {
        fn tool_type(&self) -> ToolType {
            ToolType::News
        }

        async fn search(&self, _request: &SearchRequest<'_>) -> Result<String, SearchFailure> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call < self.succeed_on_attempt {
                Err(SearchFailure::new(ErrorKind::RateLimit, "slow down"))
            } else {
                Ok("content ".repeat(500))
            }
        }
    }

    struct AuthThenOkAdapter {
        calls: AtomicU32,
        reset_called: AtomicBool,
    }

    #[async_trait::async_trait]
    impl SearchAdapter for AuthThenOkAdapter {
        fn tool_type(&self) -> ToolType {
            ToolType::Filings
        }

        async fn search(&self, _request: &SearchRequest<'_>) -> Result<String, SearchFailure> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(SearchFailure::new(ErrorKind::Auth, "token expired"))
            } else {
                Ok("filing content ".repeat(100))
            }
        }

        fn reset(&self) {
            self.reset_called.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn unknown_failure_is_not_retried() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(FailingAdapter {
            kind: ErrorKind::Unknown,
        }));
        let (executor, decisions) = executor_with(registry, 3);

        let outcome = executor
            .execute(&strategy(ToolType::News), 5, 0.01, &CancellationToken::new())
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.attempt_count, 1);
        let error = outcome.error.expect("failure keeps the last error record");
        assert_eq!(error.kind, ErrorKind::Unknown);

        let records = decisions.snapshot();
        assert_eq!(records.len(), 1);
        assert!(!records[0].retried);
    }

    #[tokio::test]
    async fn rate_limit_retries_until_success_with_increasing_delay() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(FlakyAdapter {
            calls: AtomicU32::new(0),
            succeed_on_attempt: 3,
        }));
        let (executor, decisions) = executor_with(registry, 3);

        let outcome = executor
            .execute(&strategy(ToolType::News), 5, 0.01, &CancellationToken::new())
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.attempt_count, 3);

        let records = decisions.snapshot();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.retried));
        assert!(records[0].delay_seconds < records[1].delay_seconds);
    }

    #[tokio::test]
    async fn auth_failure_resets_connection_then_retries_once() {
        let adapter = Arc::new(AuthThenOkAdapter {
            calls: AtomicU32::new(0),
            reset_called: AtomicBool::new(false),
        });
        let mut registry = AdapterRegistry::new();
        registry.register(adapter.clone());
        let (executor, _) = executor_with(registry, 3);

        let outcome = executor
            .execute(
                &strategy(ToolType::Filings),
                5,
                0.01,
                &CancellationToken::new(),
            )
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.attempt_count, 2);
        assert!(adapter.reset_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn high_quality_content_emits_expected_event_sequence() {
        let (bus, mut rx) = EventBus::channel();
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(StaticSearchAdapter::new(
            ToolType::News,
            "x".repeat(4000),
        )));
        let executor = SearchExecutor::new(
            Arc::new(registry),
            RetryPolicy::new(0.01, 3),
            DecisionLog::new(),
            bus,
            QualityThresholds::default(),
        );

        let outcome = executor
            .execute(&strategy(ToolType::News), 5, 0.01, &CancellationToken::new())
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.quality, SearchQuality::High);

        let mut tags = Vec::new();
        while let Ok(event) = rx.try_recv() {
            tags.push(event.event_type());
        }
        assert_eq!(
            tags,
            vec![
                "search_start",
                "api_start",
                "api_success",
                "result_quality",
                "search_complete"
            ]
        );
    }

    #[tokio::test]
    async fn missing_adapter_fails_without_retry() {
        let (executor, _) = executor_with(AdapterRegistry::new(), 3);
        let outcome = executor
            .execute(
                &strategy(ToolType::Transcripts),
                5,
                0.01,
                &CancellationToken::new(),
            )
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.attempt_count, 1);
    }

    #[tokio::test]
    async fn cancellation_stops_waits_promptly() {
        struct SlowAdapter;

        #[async_trait::async_trait]
        impl SearchAdapter for SlowAdapter {
            fn tool_type(&self) -> ToolType {
                ToolType::News
            }

            async fn search(
                &self,
                _request: &SearchRequest<'_>,
            ) -> Result<String, SearchFailure> {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                Ok("never".to_string())
            }
        }

        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(SlowAdapter));
        let (executor, _) = executor_with(registry, 3);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let started = Instant::now();
        let outcome = executor
            .execute(&strategy(ToolType::News), 5, 0.01, &cancel)
            .await;

        assert!(!outcome.success);
        assert!(started.elapsed().as_secs() < 5);
    }

    #[test]
    fn quality_thresholds_classify_by_volume() {
        let thresholds = QualityThresholds::default();
        assert_eq!(score_quality(0, thresholds), SearchQuality::Low);
        assert_eq!(score_quality(499, thresholds), SearchQuality::Low);
        assert_eq!(score_quality(500, thresholds), SearchQuality::Medium);
        assert_eq!(score_quality(3000, thresholds), SearchQuality::Medium);
        assert_eq!(score_quality(3001, thresholds), SearchQuality::High);
    }
}
