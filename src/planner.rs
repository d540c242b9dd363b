//! Strategy planning
//!
//! The planner delegates strategy content to the reasoning collaborator but
//! owns validation and normalization: malformed collaborator output is a
//! `PlanningError`, never silently coerced. An optional entity-discovery
//! sub-step enriches strategies with matched entity IDs.

use crate::error::{ResearchError, Result};
use crate::events::{EventBus, ProgressEvent};
use crate::models::{
    DateRange, EntityHint, EntityHintSource, Strategy, ToolParameters, ToolType,
};
use crate::prompts;
use crate::reasoning::ReasoningClient;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Resolves entity search terms to matched entity IDs. Advisory: resolution
/// failures produce fewer hints, never a planning failure.
#[async_trait]
pub trait EntityResolver: Send + Sync {
    async fn resolve(&self, terms: &[String]) -> Vec<EntityHint>;
}

/// Collaborator output schema for one strategy. Enum fields are strict:
/// an unrecognized tool_type or parameter value fails deserialization.
#[derive(Debug, Deserialize)]
struct PlannedStrategy {
    tool_type: ToolType,
    #[serde(alias = "search_queries")]
    queries: Vec<String>,
    #[serde(default)]
    parameters: ToolParameters,
    description: String,
    priority: u8,
}

pub struct StrategyPlanner {
    reasoning: Arc<dyn ReasoningClient>,
    resolver: Option<Arc<dyn EntityResolver>>,
    bus: EventBus,
    model: String,
    date_range: DateRange,
    number_of_entity_queries: usize,
}

impl StrategyPlanner {
    pub fn new(
        reasoning: Arc<dyn ReasoningClient>,
        resolver: Option<Arc<dyn EntityResolver>>,
        bus: EventBus,
        model: String,
        date_range: DateRange,
        number_of_entity_queries: usize,
    ) -> Self {
        Self {
            reasoning,
            resolver,
            bus,
            model,
            date_range,
            number_of_entity_queries,
        }
    }

    /// Turn a topic into exactly `depth` validated strategies with exactly
    /// `queries_per_strategy` queries each.
    pub async fn plan(
        &self,
        topic: &str,
        depth: usize,
        queries_per_strategy: usize,
        today: NaiveDate,
    ) -> Result<Vec<Strategy>> {
        if depth < 1 || queries_per_strategy < 1 {
            return Err(ResearchError::Planning(
                "depth and queries_per_strategy must be >= 1".to_string(),
            ));
        }

        self.bus.emit(ProgressEvent::PlanningStart {
            message: format!("Analyzing research topic: {}", topic),
        });
        self.bus.emit(ProgressEvent::PlanningConfig {
            message: format!(
                "Planning {} strategies with {} queries each",
                depth, queries_per_strategy
            ),
        });
        self.bus.emit(ProgressEvent::PlanningModel {
            message: format!("Using planner model {}", self.model),
        });
        self.bus.emit(ProgressEvent::PlanningThinking {
            message: "Generating search strategies...".to_string(),
        });

        let prompt =
            prompts::build_plan_prompt(topic, depth, queries_per_strategy, self.date_range, today);
        let response = self.reasoning.generate(&prompt, &self.model).await?;

        let mut strategies = parse_plan_response(&response, depth, queries_per_strategy)?;

        // The configured window is the default; a collaborator-supplied
        // range on a strategy wins.
        for strategy in &mut strategies {
            if strategy.tool_type.supports_date_filter()
                && strategy.parameters.date_range.is_none()
            {
                strategy.parameters.date_range = Some(self.date_range);
            }
        }

        for (index, strategy) in strategies.iter().enumerate() {
            self.bus.emit(ProgressEvent::StrategyPreview {
                message: format!(
                    "Strategy {}: [{}] {} (priority {})",
                    index + 1,
                    strategy.tool_type,
                    strategy.description,
                    strategy.priority
                ),
                strategy_index: index + 1,
                tool_type: strategy.tool_type,
            });
            for query in &strategy.queries {
                self.bus.emit(ProgressEvent::QueryPreview {
                    message: format!("Query: {}", query),
                    strategy_index: index + 1,
                });
            }
        }

        self.bus.emit(ProgressEvent::PlanningReady {
            message: format!("{} search strategies ready", strategies.len()),
            strategy_count: strategies.len(),
        });

        Ok(strategies)
    }

    /// Merge entity IDs into the parameters of strategies whose tool type
    /// benefits from entity filtering. Caller-supplied IDs come first, then
    /// discovered ones. The merge is additive only.
    pub async fn enrich_with_entities(
        &self,
        topic: &str,
        strategies: &mut [Strategy],
        entity_preference: &[String],
    ) -> Vec<EntityHint> {
        let mut hints = Vec::new();

        if !entity_preference.is_empty() {
            hints.push(EntityHint {
                query: "caller preference".to_string(),
                matched_ids: entity_preference.iter().cloned().collect::<BTreeSet<_>>(),
                source: EntityHintSource::Explicit,
            });
        }

        if let Some(resolver) = &self.resolver {
            match self.discover_entity_terms(topic, strategies).await {
                Ok(terms) if !terms.is_empty() => {
                    hints.extend(resolver.resolve(&terms).await);
                }
                Ok(_) => {}
                // Discovery is advisory; a failed sub-step never fails planning.
                Err(e) => warn!(error = %e, "Entity discovery skipped"),
            }
        }

        let ids: Vec<String> = hints
            .iter()
            .flat_map(|hint| hint.matched_ids.iter().cloned())
            .collect();

        if !ids.is_empty() {
            for strategy in strategies
                .iter_mut()
                .filter(|s| s.tool_type.supports_entity_filter())
            {
                strategy
                    .parameters
                    .merge_entity_ids(ids.iter().map(String::as_str));
            }
            debug!(entity_count = ids.len(), "Merged entity IDs into strategies");
        }

        hints
    }

    async fn discover_entity_terms(
        &self,
        topic: &str,
        strategies: &[Strategy],
    ) -> Result<Vec<String>> {
        let prompt =
            prompts::build_entity_discovery_prompt(topic, strategies, self.number_of_entity_queries);
        let response = self.reasoning.generate(&prompt, &self.model).await?;

        let terms: Vec<String> = serde_json::from_str(strip_code_fences(&response))
            .map_err(|e| ResearchError::Planning(format!("Malformed entity terms: {}", e)))?;
        Ok(terms
            .into_iter()
            .take(self.number_of_entity_queries)
            .collect())
    }
}

fn strip_code_fences(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Parse and strictly validate the collaborator's strategy array.
fn parse_plan_response(
    response: &str,
    depth: usize,
    queries_per_strategy: usize,
) -> Result<Vec<Strategy>> {
    let cleaned = strip_code_fences(response);

    let planned: Vec<PlannedStrategy> = serde_json::from_str(cleaned).map_err(|e| {
        ResearchError::Planning(format!("Malformed strategy output: {}", e))
    })?;

    if planned.is_empty() {
        return Err(ResearchError::Planning(
            "Planner produced zero strategies".to_string(),
        ));
    }
    if planned.len() < depth {
        return Err(ResearchError::Planning(format!(
            "Expected {} strategies, got {}",
            depth,
            planned.len()
        )));
    }

    let mut strategies = Vec::with_capacity(depth);
    for (index, item) in planned.into_iter().take(depth).enumerate() {
        if item.queries.is_empty() {
            return Err(ResearchError::Planning(format!(
                "Strategy {} has an empty query list",
                index + 1
            )));
        }
        if item.queries.len() < queries_per_strategy {
            return Err(ResearchError::Planning(format!(
                "Strategy {} has {} queries, expected {}",
                index + 1,
                item.queries.len(),
                queries_per_strategy
            )));
        }
        if !(1..=5).contains(&item.priority) {
            return Err(ResearchError::Planning(format!(
                "Strategy {} priority {} outside 1-5",
                index + 1,
                item.priority
            )));
        }

        strategies.push(Strategy {
            strategy_id: Uuid::new_v4(),
            tool_type: item.tool_type,
            queries: item
                .queries
                .into_iter()
                .take(queries_per_strategy)
                .collect(),
            parameters: item.parameters,
            description: item.description,
            priority: item.priority,
        });
    }

    Ok(strategies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::ScriptedReasoning;
    use std::collections::BTreeSet;

    fn planner_with(responses: Vec<String>) -> StrategyPlanner {
        StrategyPlanner::new(
            Arc::new(ScriptedReasoning::new(responses)),
            None,
            EventBus::sink(),
            "test-model".to_string(),
            DateRange::Last60Days,
            3,
        )
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 28).unwrap()
    }

    const VALID_PLAN: &str = r#"```json
    [
        {
            "tool_type": "news",
            "queries": ["Micron AI memory demand", "HBM pricing trends"],
            "parameters": {"date_range": "last_30_days"},
            "description": "Recent memory market news",
            "priority": 5
        },
        {
            "tool_type": "transcripts",
            "queries": ["Micron earnings call guidance", "memory capex commentary"],
            "parameters": {"transcript_types": ["EARNINGS_CALL"]},
            "description": "Management commentary",
            "priority": 4
        }
    ]
    ```"#;

    #[tokio::test]
    async fn plan_produces_exact_counts() {
        let planner = planner_with(vec![VALID_PLAN.to_string()]);
        let strategies = planner.plan("Micron memory", 2, 2, today()).await.unwrap();

        assert_eq!(strategies.len(), 2);
        for strategy in &strategies {
            assert_eq!(strategy.queries.len(), 2);
            assert!((1..=5).contains(&strategy.priority));
        }
        assert_eq!(strategies[0].tool_type, ToolType::News);
        assert_eq!(strategies[1].tool_type, ToolType::Transcripts);
    }

    #[tokio::test]
    async fn configured_date_range_defaults_into_unfiltered_strategies() {
        let planner = planner_with(vec![VALID_PLAN.to_string()]);
        let strategies = planner.plan("Micron memory", 2, 2, today()).await.unwrap();

        // The collaborator set last_30_days on the news strategy; that wins.
        assert_eq!(
            strategies[0].parameters.date_range,
            Some(DateRange::Last30Days)
        );
        // The transcripts strategy came back unfiltered and gets the
        // configured window.
        assert_eq!(
            strategies[1].parameters.date_range,
            Some(DateRange::Last60Days)
        );
    }

    #[tokio::test]
    async fn knowledge_graph_strategies_stay_undated() {
        let plan = r#"[{
            "tool_type": "knowledge_graph",
            "queries": ["Micron"],
            "parameters": {"search_type": "companies"},
            "description": "Entity lookup",
            "priority": 3
        }]"#;
        let planner = planner_with(vec![plan.to_string()]);
        let strategies = planner.plan("Micron", 1, 1, today()).await.unwrap();
        assert_eq!(strategies[0].parameters.date_range, None);
    }

    #[tokio::test]
    async fn unknown_tool_type_is_a_planning_error() {
        let bad = r#"[{"tool_type": "web", "queries": ["q"], "description": "d", "priority": 3}]"#;
        let planner = planner_with(vec![bad.to_string()]);
        let result = planner.plan("topic", 1, 1, today()).await;
        assert!(matches!(result, Err(ResearchError::Planning(_))));
    }

    #[tokio::test]
    async fn empty_query_list_is_a_planning_error() {
        let bad =
            r#"[{"tool_type": "news", "queries": [], "description": "d", "priority": 3}]"#;
        let planner = planner_with(vec![bad.to_string()]);
        assert!(matches!(
            planner.plan("topic", 1, 1, today()).await,
            Err(ResearchError::Planning(_))
        ));
    }

    #[tokio::test]
    async fn zero_strategies_is_a_planning_error() {
        let planner = planner_with(vec!["[]".to_string()]);
        assert!(matches!(
            planner.plan("topic", 1, 1, today()).await,
            Err(ResearchError::Planning(_))
        ));
    }

    #[tokio::test]
    async fn out_of_range_priority_is_a_planning_error() {
        let bad =
            r#"[{"tool_type": "news", "queries": ["q"], "description": "d", "priority": 9}]"#;
        let planner = planner_with(vec![bad.to_string()]);
        assert!(matches!(
            planner.plan("topic", 1, 1, today()).await,
            Err(ResearchError::Planning(_))
        ));
    }

    struct FixedResolver;

    #[async_trait]
    impl EntityResolver for FixedResolver {
        async fn resolve(&self, terms: &[String]) -> Vec<EntityHint> {
            terms
                .iter()
                .map(|term| EntityHint {
                    query: term.clone(),
                    matched_ids: BTreeSet::from(["ENT-42".to_string()]),
                    source: EntityHintSource::Discovered,
                })
                .collect()
        }
    }

    #[tokio::test]
    async fn entity_merge_targets_only_filterable_tools() {
        let planner = StrategyPlanner::new(
            Arc::new(ScriptedReasoning::new([r#"["Micron"]"#.to_string()])),
            Some(Arc::new(FixedResolver)),
            EventBus::sink(),
            "test-model".to_string(),
            DateRange::Last60Days,
            3,
        );

        let mut strategies = vec![
            Strategy {
                strategy_id: Uuid::new_v4(),
                tool_type: ToolType::News,
                queries: vec!["q".to_string()],
                parameters: ToolParameters::default(),
                description: "news".to_string(),
                priority: 3,
            },
            Strategy {
                strategy_id: Uuid::new_v4(),
                tool_type: ToolType::KnowledgeGraph,
                queries: vec!["q".to_string()],
                parameters: ToolParameters::default(),
                description: "kg".to_string(),
                priority: 3,
            },
        ];

        let hints = planner
            .enrich_with_entities("Micron", &mut strategies, &["EXPL-1".to_string()])
            .await;

        assert_eq!(hints.len(), 2);
        assert_eq!(hints[0].source, EntityHintSource::Explicit);
        assert_eq!(hints[1].source, EntityHintSource::Discovered);

        // News strategy gets both explicit and discovered IDs.
        assert!(strategies[0].parameters.entity_ids.contains(&"EXPL-1".to_string()));
        assert!(strategies[0].parameters.entity_ids.contains(&"ENT-42".to_string()));
        // Knowledge-graph strategy is left untouched.
        assert!(strategies[1].parameters.entity_ids.is_empty());
    }
}
