//! Workflow orchestration
//!
//! One [`ResearchWorkflow`] value represents one run: plan, search, gather,
//! compile, in that order. The run executes at most once; streaming
//! observers and blocking callers see the same memoized result. The event
//! channel closes when the run finishes, which is the stream's completion
//! signal.

use crate::adapters::AdapterRegistry;
use crate::aggregator::Gatherer;
use crate::compiler::ReportCompiler;
use crate::config::WorkflowConfig;
use crate::error::{ResearchError, Result};
use crate::events::{EventBus, ProgressEvent};
use crate::executor::SearchExecutor;
use crate::models::{SearchOutcome, WorkflowResult};
use crate::planner::{EntityResolver, StrategyPlanner};
use crate::reasoning::ReasoningClient;
use crate::retry::{DecisionLog, RetryPolicy};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{OnceCell, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Clonable record of a fatal run failure, kept so repeated `run` calls can
/// observe the same error. Search failures never land here; they live in
/// outcome data.
#[derive(Debug, Clone)]
enum RunFailure {
    Planning(String),
    Config(String),
    Llm(String),
    Cancelled,
}

impl RunFailure {
    fn from_error(error: ResearchError) -> Self {
        match error {
            ResearchError::Planning(message) => RunFailure::Planning(message),
            ResearchError::Config(message) => RunFailure::Config(message),
            ResearchError::Cancelled => RunFailure::Cancelled,
            other => RunFailure::Llm(other.to_string()),
        }
    }

    fn to_error(&self) -> ResearchError {
        match self {
            RunFailure::Planning(message) => ResearchError::Planning(message.clone()),
            RunFailure::Config(message) => ResearchError::Config(message.clone()),
            RunFailure::Llm(message) => ResearchError::Llm(message.clone()),
            RunFailure::Cancelled => ResearchError::Cancelled,
        }
    }

    fn kind_label(&self) -> &'static str {
        match self {
            RunFailure::Planning(_) => "planning",
            RunFailure::Config(_) => "config",
            RunFailure::Llm(_) => "llm",
            RunFailure::Cancelled => "cancelled",
        }
    }
}

/// Run lifecycle. Transitions are one-directional; `Failed` is reachable
/// from any non-idle state and no state is revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    Planning,
    Searching,
    Gathering,
    Compiling,
    Done,
    Failed,
}

pub struct ResearchWorkflow {
    config: WorkflowConfig,
    reasoning: Arc<dyn ReasoningClient>,
    registry: Arc<AdapterRegistry>,
    resolver: Option<Arc<dyn EntityResolver>>,
    decisions: DecisionLog,
    cancel: CancellationToken,
    state: Mutex<WorkflowState>,
    bus: Mutex<Option<EventBus>>,
    events: Mutex<Option<UnboundedReceiver<ProgressEvent>>>,
    result: OnceCell<std::result::Result<WorkflowResult, RunFailure>>,
}

impl ResearchWorkflow {
    pub fn new(
        config: WorkflowConfig,
        reasoning: Arc<dyn ReasoningClient>,
        registry: Arc<AdapterRegistry>,
        resolver: Option<Arc<dyn EntityResolver>>,
    ) -> Result<Self> {
        config.validate()?;
        let (bus, rx) = EventBus::channel();

        Ok(Self {
            config,
            reasoning,
            registry,
            resolver,
            decisions: DecisionLog::new(),
            cancel: CancellationToken::new(),
            state: Mutex::new(WorkflowState::Idle),
            bus: Mutex::new(Some(bus)),
            events: Mutex::new(Some(rx)),
            result: OnceCell::new(),
        })
    }

    /// Take the progress event receiver. Available exactly once; the stream
    /// ends when the run finishes and all event producers drop.
    pub fn take_events(&self) -> Option<UnboundedReceiver<ProgressEvent>> {
        self.events.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Request cooperative cancellation. In-flight searches stop at their
    /// next wait point and the run fails with [`ResearchError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Retry decisions recorded so far, for post-run inspection.
    pub fn decision_log(&self) -> DecisionLog {
        self.decisions.clone()
    }

    pub fn state(&self) -> WorkflowState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(WorkflowState::Failed)
    }

    fn set_state(&self, next: WorkflowState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    /// Run the pipeline to completion and return the final result. The
    /// pipeline executes on the first call only; later calls, concurrent or
    /// sequential, return the memoized result without re-executing anything.
    pub async fn run(&self, topic: &str) -> Result<WorkflowResult> {
        let stored = self
            .result
            .get_or_init(|| async {
                let bus = self
                    .bus
                    .lock()
                    .ok()
                    .and_then(|mut slot| slot.take())
                    .unwrap_or_else(EventBus::sink);
                let started = Instant::now();

                match self.execute(topic, &bus).await {
                    Ok(result) => {
                        self.set_state(WorkflowState::Done);
                        let total_time = started.elapsed().as_secs_f64();
                        info!(topic, total_time, "Research workflow complete");
                        bus.emit(ProgressEvent::WorkflowComplete {
                            message: format!(
                                "Research workflow complete in {:.1}s",
                                total_time
                            ),
                            total_time,
                        });
                        Ok(result)
                    }
                    Err(error) => {
                        self.set_state(WorkflowState::Failed);
                        let failure = RunFailure::from_error(error);
                        warn!(topic, error = %failure.to_error(), "Research workflow failed");
                        bus.emit(ProgressEvent::WorkflowFailed {
                            message: failure.to_error().to_string(),
                            error_kind: failure.kind_label().to_string(),
                        });
                        Err(failure)
                    }
                }
                // `bus` drops here; with the stage clones gone the event
                // channel closes and streaming observers see end-of-stream.
            })
            .await;

        stored.clone().map_err(|failure| failure.to_error())
    }

    async fn execute(&self, topic: &str, bus: &EventBus) -> Result<WorkflowResult> {
        if self.cancel.is_cancelled() {
            return Err(ResearchError::Cancelled);
        }

        // Plan
        self.set_state(WorkflowState::Planning);
        let planner = StrategyPlanner::new(
            self.reasoning.clone(),
            self.resolver.clone(),
            bus.clone(),
            self.config.planner_model.clone(),
            self.config.date_range,
            self.config.number_of_entity_queries,
        );
        let today = chrono::Utc::now().date_naive();
        let mut strategies = planner
            .plan(
                topic,
                self.config.search_depth,
                self.config.number_of_queries,
                today,
            )
            .await?;
        planner
            .enrich_with_entities(topic, &mut strategies, &self.config.entity_preference)
            .await;

        if self.cancel.is_cancelled() {
            return Err(ResearchError::Cancelled);
        }

        // Search
        self.set_state(WorkflowState::Searching);
        let outcomes = self.run_searches(&strategies, bus).await;
        if self.cancel.is_cancelled() {
            return Err(ResearchError::Cancelled);
        }

        // Gather
        self.set_state(WorkflowState::Gathering);
        let gatherer = Gatherer::new(bus.clone(), self.config.min_successful_searches);
        let (metadata, sufficient) = gatherer.gather(&outcomes);

        if self.cancel.is_cancelled() {
            return Err(ResearchError::Cancelled);
        }

        // Compile
        self.set_state(WorkflowState::Compiling);
        let compiler = ReportCompiler::new(
            self.reasoning.clone(),
            bus.clone(),
            self.config.writer_model.clone(),
            self.config.max_synthesis_input_chars,
        );
        let report = compiler.compile(topic, &outcomes, &metadata, sufficient).await;

        Ok(WorkflowResult {
            final_results: report,
            source_metadata: metadata,
            outcomes,
        })
    }

    /// Fan strategies out over a bounded number of concurrent executions and
    /// return outcomes in strategy order.
    async fn run_searches(
        &self,
        strategies: &[crate::models::Strategy],
        bus: &EventBus,
    ) -> Vec<SearchOutcome> {
        let executor = Arc::new(SearchExecutor::new(
            self.registry.clone(),
            RetryPolicy::new(self.config.rate_limit_delay, self.config.max_attempts),
            self.decisions.clone(),
            bus.clone(),
            self.config.quality,
        ));
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency_limit));

        let mut handles = Vec::with_capacity(strategies.len());
        for (index, strategy) in strategies.iter().cloned().enumerate() {
            let executor = executor.clone();
            let semaphore = semaphore.clone();
            let cancel = self.cancel.clone();
            let max_results = self.config.max_results_per_strategy;
            let rate_limit_delay = self.config.rate_limit_delay;

            handles.push(tokio::spawn(async move {
                // Held for the duration of the search. The semaphore is
                // never closed, so acquisition only fails on a bug.
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("strategy semaphore closed");
                let outcome = executor
                    .execute(&strategy, max_results, rate_limit_delay, &cancel)
                    .await;
                (index, outcome)
            }));
        }

        let mut indexed = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(pair) => indexed.push(pair),
                Err(e) => warn!(error = %e, "Search task aborted"),
            }
        }
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, outcome)| outcome).collect()
    }
}
