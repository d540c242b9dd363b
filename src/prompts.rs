//! Prompt builders for the reasoning collaborator
//!
//! Three structured requests: strategy planning, entity discovery, and
//! result synthesis. Each states its output contract explicitly so the
//! planner and compiler can validate strictly instead of coercing.

use crate::models::{DateRange, RunMetadata, Strategy};
use chrono::NaiveDate;

pub fn build_plan_prompt(
    topic: &str,
    search_depth: usize,
    number_of_queries: usize,
    date_range: DateRange,
    today: NaiveDate,
) -> String {
    format!(
        r#"You are an expert at creating comprehensive search strategies for financial and business research.

Given a research topic: {topic}

Create {search_depth} different search strategies that will provide comprehensive coverage of this topic.

Available tools:
- news: Premium news content from global publishers with multilingual support
- transcripts: Corporate earnings calls, conference calls, investor meetings with section detection
- filings: SEC filings (10-K, 10-Q, 8-K, etc.) with fiscal period filtering
- knowledge_graph: Find company entities and source information for targeted searches

For each strategy, you must provide:
1. tool_type: Which tool to use (news, transcripts, filings, or knowledge_graph)
2. queries: {number_of_queries} specific, targeted search queries for that tool
3. parameters: Tool-specific parameters (use an empty object {{}} if none apply):
   - For news: {{"date_range": "last_30_days"}} (optional)
   - For transcripts: {{"transcript_types": ["EARNINGS_CALL"], "section_metadata": ["QA", "MANAGEMENT_DISCUSSION"], "fiscal_year": 2024, "fiscal_quarter": 1}} (all optional)
   - For filings: {{"filing_types": ["SEC_10_K", "SEC_10_Q"], "fiscal_year": 2024, "fiscal_quarter": 1}} (all optional)
   - For knowledge_graph: {{"search_type": "companies"}} (required)
4. description: Clear, human-readable description of what this strategy will find
5. priority: Priority level 1-5 (5 = highest priority)

Guidelines:
- Focus on complementary strategies that cover different aspects and time periods
- Prioritize strategies that will find the most relevant and recent information
- Include at least one knowledge_graph strategy if company entities are relevant
- Make search queries specific and targeted to avoid generic results
- Consider different document types (news for recent events, transcripts for management insights, filings for financial data)

RULES:
- ENUM for tool_type: news, transcripts, filings, knowledge_graph
- ENUM for search_type: companies, sources
- ENUM for filing_types: SEC_10_K, SEC_10_Q, SEC_8_K, SEC_DEF_14A, SEC_DEF_10Q, SEC_DEF_10K, SEC_DEF_8K
- ENUM for transcript_types: EARNINGS_CALL, CONFERENCE_CALL, INVESTOR_MEETING
- ENUM for section_metadata: QA, MANAGEMENT_DISCUSSION
- ENUM for date_range: last_30_days, last_60_days, last_90_days
- Return ONLY a valid JSON array of strategy objects, no explanation text

Preferred date window for recency-sensitive searches: {date_range}
Today's date: {today}"#
    )
}

pub fn build_entity_discovery_prompt(
    topic: &str,
    strategies: &[Strategy],
    number_of_entity_queries: usize,
) -> String {
    let strategy_summaries: Vec<String> = strategies
        .iter()
        .map(|s| format!("- [{}] {}", s.tool_type, s.description))
        .collect();

    format!(
        r#"You are an expert at identifying relevant companies and entities for business research.

Given the search topic: {topic}
And the planned search strategies:
{strategies}

Generate {number_of_entity_queries} specific company search terms that would help find the most relevant entities for this research.

Focus on:
- Primary company names (exact and common variations)
- Stock tickers and symbols
- Industry leaders and key players
- Subsidiary and parent company names
- Companies specifically mentioned in the topic

Guidelines:
- Use exact company names when possible (e.g., "Tesla" not "electric vehicle company")
- Include both full names and common abbreviations (e.g., "Microsoft Corporation", "Microsoft")
- Prioritize companies that are most likely to have relevant transcripts, filings, or news coverage
- Avoid generic industry terms - focus on specific company identifiers

Return ONLY a valid JSON array of search term strings."#,
        topic = topic,
        strategies = strategy_summaries.join("\n"),
        number_of_entity_queries = number_of_entity_queries,
    )
}

pub fn build_synthesis_prompt(
    topic: &str,
    search_results: &str,
    source_metadata: &RunMetadata,
) -> String {
    let metadata_json =
        serde_json::to_string_pretty(source_metadata).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"You are an expert at synthesizing financial and business research results into actionable insights.

Compile the following search results into a comprehensive, well-organized summary:

Topic: {topic}
Search Results:
{search_results}

Source Metadata:
{metadata_json}

Organize your response with these sections:

## Executive Summary
Provide a concise 2-3 sentence overview of the key findings and their implications.

## Key Findings by Source Type

### News & Recent Developments
- Recent news, announcements, and market developments
- Include dates and source credibility where available

### Corporate Communications (Transcripts)
- Management commentary, earnings call insights, and forward guidance
- Quote specific speakers and dates when possible

### Regulatory Filings
- Financial disclosures, risk factors, and compliance information
- Note filing types (10-K, 10-Q, etc.) and filing dates

## Timeline of Recent Developments
Organize key events chronologically if temporal patterns are relevant.

## Source Quality and Metadata
Brief assessment of source credibility, coverage completeness, and data recency.

## Actionable Insights
Conclude with 2-3 specific, actionable insights or recommendations based on the findings.

Guidelines:
- Prioritize the most recent and credible information
- Highlight contradictions or uncertainties in the data
- Use specific dates, figures, and quotes when available
- Maintain objectivity while identifying key trends and patterns
- Focus on information that directly addresses the original research topic"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn plan_prompt_carries_topic_counts_and_date_window() {
        let prompt = build_plan_prompt(
            "Micron memory demand",
            3,
            2,
            DateRange::Last60Days,
            NaiveDate::from_ymd_opt(2026, 8, 28).unwrap(),
        );
        assert!(prompt.contains("Micron memory demand"));
        assert!(prompt.contains("Create 3 different search strategies"));
        assert!(prompt.contains("Preferred date window for recency-sensitive searches: last_60_days"));
        assert!(prompt.contains("2026-08-28"));
    }

    #[test]
    fn synthesis_prompt_has_fixed_sections() {
        let prompt = build_synthesis_prompt("Topic", "results", &RunMetadata::default());
        for section in [
            "## Executive Summary",
            "### News & Recent Developments",
            "### Corporate Communications (Transcripts)",
            "### Regulatory Filings",
            "## Timeline of Recent Developments",
            "## Source Quality and Metadata",
            "## Actionable Insights",
        ] {
            assert!(prompt.contains(section), "missing section {}", section);
        }
    }
}
