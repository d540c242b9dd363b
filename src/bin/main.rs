use financial_research_orchestrator::{
    adapters,
    planner::EntityResolver,
    reasoning::{GeminiClient, ReasoningClient, ScriptedReasoning},
    ProgressEvent, ResearchWorkflow, WorkflowConfig,
};
use std::env;
use std::sync::Arc;
use tracing::info;

const DEMO_PLAN: &str = r#"[
    {
        "tool_type": "news",
        "queries": ["memory market AI demand", "DRAM pricing outlook"],
        "parameters": {"date_range": "last_30_days"},
        "description": "Recent memory market news",
        "priority": 5
    },
    {
        "tool_type": "transcripts",
        "queries": ["memory maker earnings guidance", "HBM capacity commentary"],
        "parameters": {"transcript_types": ["EARNINGS_CALL"]},
        "description": "Management commentary on memory demand",
        "priority": 4
    }
]"#;

const DEMO_REPORT: &str = "\
# Research Report: Memory Market Outlook

## Executive Summary
Demand for high-bandwidth memory continues to outpace supply, driven by AI
accelerator build-outs. Pricing momentum remains positive into next quarter.

## Key Findings by Source Type
Sample findings compiled from canned demo content.

## Timeline of Recent Developments
Not applicable in demo mode.

## Source Quality and Metadata
All demo sources returned high-volume content.

## Actionable Insights
Run with live credentials for production-grade findings.
";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let topic = env::args()
        .nth(1)
        .unwrap_or_else(|| "AI-driven memory market outlook".to_string());

    let config = WorkflowConfig::from_env()?;

    // Live adapters when the search service is configured, canned content
    // otherwise so the pipeline stays runnable end to end.
    let registry = match adapters::registry_from_env() {
        Some(registry) => {
            info!("Using live search adapters");
            Arc::new(registry)
        }
        None => {
            info!("Search credentials absent; using demo adapters");
            Arc::new(adapters::demo_registry())
        }
    };

    let reasoning: Arc<dyn ReasoningClient> = match env::var("GEMINI_API_KEY") {
        Ok(key) => {
            info!("Using Gemini reasoning client");
            Arc::new(GeminiClient::new(key)?)
        }
        Err(_) => {
            info!("GEMINI_API_KEY absent; using scripted reasoning");
            Arc::new(ScriptedReasoning::new([
                DEMO_PLAN.to_string(),
                DEMO_REPORT.to_string(),
            ]))
        }
    };

    let resolver: Option<Arc<dyn EntityResolver>> = adapters::entity_resolver_from_env();
    let workflow = ResearchWorkflow::new(config, reasoning, registry, resolver)?;

    let mut events = workflow
        .take_events()
        .expect("events not yet taken on a fresh workflow");
    let observer = tokio::spawn(async move {
        use ProgressEvent as E;
        while let Some(event) = events.recv().await {
            match &event {
                E::PlanningStart { .. }
                | E::PlanningConfig { .. }
                | E::PlanningModel { .. }
                | E::PlanningThinking { .. }
                | E::StrategyPreview { .. }
                | E::QueryPreview { .. }
                | E::PlanningReady { .. } => println!("[plan]    {}", event.message()),
                E::SearchStart { .. }
                | E::ApiStart { .. }
                | E::ApiSuccess { .. }
                | E::ResultQuality { .. }
                | E::ApiError { .. }
                | E::SearchComplete { .. } => println!("[search]  {}", event.message()),
                E::GatheringStart { .. }
                | E::SuccessAnalysis { .. }
                | E::PerformanceMetrics { .. }
                | E::GatheringComplete { .. } => println!("[gather]  {}", event.message()),
                E::CompilationStart { .. }
                | E::SynthesisStart { .. }
                | E::SynthesisComplete { .. }
                | E::ReportStats { .. } => println!("[compile] {}", event.message()),
                E::WorkflowComplete { message, .. } => println!("== {}", message),
                E::WorkflowFailed { message, error_kind } => {
                    eprintln!("== workflow failed ({}): {}", error_kind, message)
                }
            }
        }
    });

    info!(topic = %topic, "Starting research workflow");
    let result = workflow.run(&topic).await;
    observer.await.ok();

    match result {
        Ok(result) => {
            println!("\n=== FINAL REPORT ===\n");
            println!("{}", result.final_results);

            let stats = &result.source_metadata;
            println!("=== RUN STATISTICS ===");
            println!(
                "Searches: {} total, {} successful",
                stats.total_searches, stats.successful_searches
            );
            println!(
                "Execution: {:.1}s total, {:.1}s average",
                stats.total_execution_time, stats.average_execution_time
            );
            println!("Content: {} chars", stats.total_content_length);
            for (tool, count) in &stats.tool_type_distribution {
                println!("  {}: {}", tool, count);
            }

            let decisions = workflow.decision_log().snapshot();
            if !decisions.is_empty() {
                println!("\nRetry decisions: {}", decisions.len());
                for record in decisions {
                    println!(
                        "  {} attempt {}: {} -> retried={} delay={:.1}s",
                        record.tool_type,
                        record.attempt_count,
                        record.error_kind,
                        record.retried,
                        record.delay_seconds
                    );
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Research workflow failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
