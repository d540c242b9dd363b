//! Report compilation
//!
//! Owns selection and ordering of search content, input truncation against
//! the synthesis collaborator's context ceiling, and section assembly. The
//! synthesized prose itself comes from the reasoning collaborator; if that
//! fails twice the compiler falls back to a degraded raw-findings report
//! rather than failing the run.

use crate::events::{EventBus, ProgressEvent};
use crate::models::{RunMetadata, SearchOutcome, ToolType};
use crate::prompts;
use crate::reasoning::ReasoningClient;
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

pub struct ReportCompiler {
    reasoning: Arc<dyn ReasoningClient>,
    bus: EventBus,
    model: String,
    max_input_chars: usize,
}

impl ReportCompiler {
    pub fn new(
        reasoning: Arc<dyn ReasoningClient>,
        bus: EventBus,
        model: String,
        max_input_chars: usize,
    ) -> Self {
        Self {
            reasoning,
            bus,
            model,
            max_input_chars,
        }
    }

    /// Reduce outcomes and metadata into the final report. Synthesis is
    /// retried once with a halved input payload; after that the degraded
    /// raw-findings report is returned with the degradation clearly marked.
    pub async fn compile(
        &self,
        topic: &str,
        outcomes: &[SearchOutcome],
        metadata: &RunMetadata,
        sufficient: bool,
    ) -> String {
        self.bus.emit(ProgressEvent::CompilationStart {
            message: format!("Compiling research report for: {}", topic),
        });
        self.bus.emit(ProgressEvent::SynthesisStart {
            message: format!("Synthesizing report with {}", self.model),
        });

        let start = Instant::now();
        let selected = select_content(outcomes, self.max_input_chars);
        let prompt = prompts::build_synthesis_prompt(topic, &selected, metadata);

        let (mut report, degraded) = match self.reasoning.generate(&prompt, &self.model).await {
            Ok(report) => (report, false),
            Err(first) => {
                warn!(error = %first, "Synthesis failed; retrying with reduced payload");
                let reduced = select_content(outcomes, self.max_input_chars / 2);
                let retry_prompt = prompts::build_synthesis_prompt(topic, &reduced, metadata);
                match self.reasoning.generate(&retry_prompt, &self.model).await {
                    Ok(report) => (report, false),
                    Err(second) => {
                        warn!(error = %second, "Synthesis unusable; emitting degraded report");
                        (degraded_report(topic, outcomes, metadata), true)
                    }
                }
            }
        };

        if !sufficient {
            report = format!(
                "> Note: only {} of {} searches succeeded; findings below may be incomplete.\n\n{}",
                metadata.successful_searches, metadata.total_searches, report
            );
        }

        let synthesis_time = start.elapsed().as_secs_f64();
        self.bus.emit(ProgressEvent::SynthesisComplete {
            message: if degraded {
                format!(
                    "Synthesis unavailable; degraded raw-findings report assembled in {:.1}s",
                    synthesis_time
                )
            } else {
                format!("Report synthesized in {:.1}s", synthesis_time)
            },
            synthesis_time,
            report_length: report.len(),
        });
        self.bus.emit(ProgressEvent::ReportStats {
            message: format!(
                "Report: {} chars from {} successful searches",
                report.len(),
                metadata.successful_searches
            ),
        });

        report
    }
}

/// Concatenate successful outcome content grouped by tool type, best
/// quality first, never exceeding `max_chars` in total.
pub fn select_content(outcomes: &[SearchOutcome], max_chars: usize) -> String {
    let mut out = String::new();
    let mut remaining = max_chars;

    for tool in ToolType::ALL {
        let mut group: Vec<&SearchOutcome> = outcomes
            .iter()
            .filter(|o| o.success && o.tool_type == tool)
            .collect();
        if group.is_empty() {
            continue;
        }
        // Stable sort: quality descending, emission order within a tier.
        group.sort_by_key(|o| Reverse(o.quality));

        for outcome in group {
            let header = format!(
                "### {} / {} (quality: {})\n",
                outcome.tool_type, outcome.description, outcome.quality
            );
            // Header plus trailing separator must fit before any body does.
            if header.len() + 2 >= remaining {
                return out;
            }
            out.push_str(&header);
            remaining -= header.len() + 2;

            let mut body = String::new();
            for c in outcome.content.chars() {
                if body.len() + c.len_utf8() > remaining {
                    break;
                }
                body.push(c);
            }
            remaining -= body.len();
            out.push_str(&body);
            out.push_str("\n\n");
        }
    }

    out
}

/// Raw aggregated findings in the fixed section layout, used when the
/// synthesis collaborator is unusable.
fn degraded_report(topic: &str, outcomes: &[SearchOutcome], metadata: &RunMetadata) -> String {
    let mut report = format!(
        "# Research Report: {}\n\n\
         ## Executive Summary\n\
         Automated synthesis was unavailable for this run. The sections below \
         contain raw aggregated findings; treat them as unprocessed source material.\n\n\
         ## Key Findings by Source Type\n\n",
        topic
    );

    for tool in ToolType::ALL {
        let section = match tool {
            ToolType::News => "### News & Recent Developments\n",
            ToolType::Transcripts => "### Corporate Communications (Transcripts)\n",
            ToolType::Filings => "### Regulatory Filings\n",
            ToolType::KnowledgeGraph => "### Entity Matches\n",
        };
        report.push_str(section);

        let mut any = false;
        for outcome in outcomes.iter().filter(|o| o.success && o.tool_type == tool) {
            any = true;
            report.push_str(&format!("- {} ({} chars, quality {})\n", outcome.description, outcome.content_length, outcome.quality));
            let preview: String = outcome.content.chars().take(1000).collect();
            report.push_str(&preview);
            report.push_str("\n\n");
        }
        if !any {
            report.push_str("No successful results for this source type.\n\n");
        }
    }

    report.push_str(&format!(
        "## Timeline of Recent Developments\nNot available without synthesis.\n\n\
         ## Source Quality and Metadata\n{} of {} searches succeeded; {} chars of content collected.\n\n\
         ## Actionable Insights\nNot available without synthesis; review the raw findings above.\n",
        metadata.successful_searches, metadata.total_searches, metadata.total_content_length
    ));

    report
}
