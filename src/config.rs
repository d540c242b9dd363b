//! Workflow configuration
//!
//! All tunables in one place. Defaults match observed production behavior;
//! `from_env` lets the binary override them without the library touching
//! ambient process state.

use crate::error::{ResearchError, Result};
use crate::models::DateRange;
use serde::{Deserialize, Serialize};
use std::env;

/// Content-length cut points for result quality classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Below this many characters a result is `low` quality.
    pub low_ceiling: usize,
    /// Above this many characters a result is `high` quality.
    pub high_floor: usize,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            low_ceiling: 500,
            high_floor: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Number of search strategies to plan.
    pub search_depth: usize,
    pub max_results_per_strategy: usize,
    /// Queries per strategy.
    pub number_of_queries: usize,
    /// Base delay in seconds, also the base for rate-limit backoff.
    pub rate_limit_delay: f64,
    pub date_range: DateRange,
    /// Opaque reasoning-provider identifier used for planning.
    pub planner_model: String,
    /// Opaque reasoning-provider identifier used for synthesis.
    pub writer_model: String,
    /// Caller-supplied entity IDs merged into strategies ahead of discovery.
    pub entity_preference: Vec<String>,
    pub number_of_entity_queries: usize,
    pub quality: QualityThresholds,
    /// Minimum successful outcomes for the run to count as sufficient.
    pub min_successful_searches: usize,
    /// Attempt ceiling per strategy, retries included.
    pub max_attempts: u32,
    /// Combined character ceiling handed to the synthesis collaborator.
    pub max_synthesis_input_chars: usize,
    /// Concurrent strategy executions; 1 means sequential.
    pub concurrency_limit: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            search_depth: 2,
            max_results_per_strategy: 5,
            number_of_queries: 2,
            rate_limit_delay: 1.5,
            date_range: DateRange::Last90Days,
            planner_model: "gemini-2.5-flash".to_string(),
            writer_model: "gemini-2.5-flash".to_string(),
            entity_preference: Vec::new(),
            number_of_entity_queries: 3,
            quality: QualityThresholds::default(),
            min_successful_searches: 1,
            max_attempts: 3,
            max_synthesis_input_chars: 60_000,
            concurrency_limit: 4,
        }
    }
}

impl WorkflowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.search_depth < 1 {
            return Err(ResearchError::Config("search_depth must be >= 1".into()));
        }
        if self.max_results_per_strategy < 1 {
            return Err(ResearchError::Config(
                "max_results_per_strategy must be >= 1".into(),
            ));
        }
        if self.number_of_queries < 1 {
            return Err(ResearchError::Config(
                "number_of_queries must be >= 1".into(),
            ));
        }
        if self.rate_limit_delay < 0.0 {
            return Err(ResearchError::Config(
                "rate_limit_delay must be non-negative".into(),
            ));
        }
        if self.max_attempts < 1 {
            return Err(ResearchError::Config("max_attempts must be >= 1".into()));
        }
        if self.concurrency_limit < 1 {
            return Err(ResearchError::Config(
                "concurrency_limit must be >= 1".into(),
            ));
        }
        if self.quality.low_ceiling >= self.quality.high_floor {
            return Err(ResearchError::Config(
                "quality.low_ceiling must be below quality.high_floor".into(),
            ));
        }
        Ok(())
    }

    /// Defaults overridden by recognized environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = read_env("SEARCH_DEPTH")? {
            config.search_depth = v;
        }
        if let Some(v) = read_env("MAX_RESULTS_PER_STRATEGY")? {
            config.max_results_per_strategy = v;
        }
        if let Some(v) = read_env("NUMBER_OF_QUERIES")? {
            config.number_of_queries = v;
        }
        if let Some(v) = read_env("BIGDATA_RATE_LIMIT_DELAY")? {
            config.rate_limit_delay = v;
        }
        if let Ok(v) = env::var("PLANNER_MODEL") {
            config.planner_model = v;
        }
        if let Ok(v) = env::var("WRITER_MODEL") {
            config.writer_model = v;
        }
        if let Ok(v) = env::var("DATE_RANGE") {
            config.date_range = match v.as_str() {
                "last_30_days" => DateRange::Last30Days,
                "last_60_days" => DateRange::Last60Days,
                "last_90_days" => DateRange::Last90Days,
                other => {
                    return Err(ResearchError::Config(format!(
                        "Unrecognized DATE_RANGE: {}",
                        other
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }
}

fn read_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ResearchError::Config(format!("Invalid value for {}: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(WorkflowConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_depth_is_rejected() {
        let config = WorkflowConfig {
            search_depth: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_quality_thresholds_are_rejected() {
        let config = WorkflowConfig {
            quality: QualityThresholds {
                low_ceiling: 3000,
                high_floor: 500,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
