//! Core data model for the research workflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

/// The closed set of remote content tools a strategy can target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    News,
    Transcripts,
    Filings,
    KnowledgeGraph,
}

impl ToolType {
    pub const ALL: [ToolType; 4] = [
        ToolType::News,
        ToolType::Transcripts,
        ToolType::Filings,
        ToolType::KnowledgeGraph,
    ];

    /// Tools whose results improve when filtered by entity IDs.
    pub fn supports_entity_filter(&self) -> bool {
        matches!(
            self,
            ToolType::News | ToolType::Transcripts | ToolType::Filings
        )
    }

    /// Tools whose results can be narrowed to a publication date window.
    pub fn supports_date_filter(&self) -> bool {
        matches!(
            self,
            ToolType::News | ToolType::Transcripts | ToolType::Filings
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::News => "news",
            ToolType::Transcripts => "transcripts",
            ToolType::Filings => "filings",
            ToolType::KnowledgeGraph => "knowledge_graph",
        }
    }
}

impl fmt::Display for ToolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DateRange {
    #[serde(rename = "last_30_days")]
    Last30Days,
    #[serde(rename = "last_60_days")]
    Last60Days,
    #[serde(rename = "last_90_days")]
    Last90Days,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DateRange::Last30Days => "last_30_days",
            DateRange::Last60Days => "last_60_days",
            DateRange::Last90Days => "last_90_days",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FilingType {
    #[serde(rename = "SEC_10_K")]
    Sec10K,
    #[serde(rename = "SEC_10_Q")]
    Sec10Q,
    #[serde(rename = "SEC_8_K")]
    Sec8K,
    #[serde(rename = "SEC_DEF_14A")]
    SecDef14A,
    #[serde(rename = "SEC_DEF_10Q")]
    SecDef10Q,
    #[serde(rename = "SEC_DEF_10K")]
    SecDef10K,
    #[serde(rename = "SEC_DEF_8K")]
    SecDef8K,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TranscriptType {
    EarningsCall,
    ConferenceCall,
    InvestorMeeting,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SectionType {
    #[serde(rename = "QA")]
    Qa,
    #[serde(rename = "MANAGEMENT_DISCUSSION")]
    ManagementDiscussion,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntitySearchType {
    Companies,
    Sources,
}

//
// ================= Strategy =================
//

/// Tool-specific optional parameters. All fields are optional; which ones a
/// given tool honors is the adapter's concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filing_types: Vec<FilingType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transcript_types: Vec<TranscriptType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub section_metadata: Vec<SectionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiscal_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiscal_quarter: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_type: Option<EntitySearchType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity_ids: Vec<String>,
}

impl ToolParameters {
    /// Merge entity IDs into the parameter set. Additive only: existing IDs
    /// and all other fields are left untouched.
    pub fn merge_entity_ids<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        for id in ids {
            if !self.entity_ids.iter().any(|existing| existing == id) {
                self.entity_ids.push(id.to_string());
            }
        }
    }

    /// Drop every optional filter while keeping entity IDs and the search
    /// type (knowledge_graph requires one). Used to broaden a retried search.
    pub fn without_optional_filters(&self) -> Self {
        Self {
            date_range: None,
            filing_types: Vec::new(),
            transcript_types: Vec::new(),
            section_metadata: Vec::new(),
            fiscal_year: None,
            fiscal_quarter: None,
            search_type: self.search_type,
            entity_ids: self.entity_ids.clone(),
        }
    }
}

/// A planned search unit: one tool, a set of queries, tool parameters.
/// Immutable once the planner hands it out; retry mutations operate on a
/// private copy inside the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub strategy_id: Uuid,
    pub tool_type: ToolType,
    pub queries: Vec<String>,
    pub parameters: ToolParameters,
    pub description: String,
    /// 1 (lowest) ..= 5 (highest)
    pub priority: u8,
}

//
// ================= Entity hints =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntityHintSource {
    Explicit,
    Discovered,
}

/// Advisory entity enrichment merged into strategy parameters before
/// execution. Produced either from caller preference or entity discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityHint {
    pub query: String,
    pub matched_ids: BTreeSet<String>,
    pub source: EntityHintSource,
}

//
// ================= Outcomes =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SearchQuality {
    Low,
    Medium,
    High,
}

impl fmt::Display for SearchQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchQuality::Low => "low",
            SearchQuality::Medium => "medium",
            SearchQuality::High => "high",
        };
        f.write_str(s)
    }
}

/// Failure classes the retry policy can act on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    RateLimit,
    Timeout,
    EmptyResult,
    MalformedQuery,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Timeout => "timeout",
            ErrorKind::EmptyResult => "empty_result",
            ErrorKind::MalformedQuery => "malformed_query",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// The recorded result of executing one strategy, after all retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub strategy_id: Uuid,
    pub tool_type: ToolType,
    pub description: String,
    pub success: bool,
    pub content: String,
    pub content_length: usize,
    pub execution_time_seconds: f64,
    pub quality: SearchQuality,
    pub error: Option<ErrorRecord>,
    pub attempt_count: u32,
}

//
// ================= Run metadata =================
//

/// Run-level statistics, always recomputed from the full outcome set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunMetadata {
    pub total_searches: usize,
    pub successful_searches: usize,
    pub total_execution_time: f64,
    pub average_execution_time: f64,
    pub total_content_length: usize,
    pub tool_type_distribution: BTreeMap<ToolType, usize>,
}

//
// ================= Final result =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub final_results: String,
    pub source_metadata: RunMetadata,
    pub outcomes: Vec<SearchOutcome>,
}
