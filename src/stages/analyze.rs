use std::collections::HashSet;

use tracing::info;

use crate::error::{ParseError, PipelineError};
use crate::prompts::{analysis_prompt, ANALYSIS_SCHEMA_HINT};
use crate::reasoning::ResilientCaller;
use crate::storage::{Analysis, DecisionDNA, Scenario};

/// Stage name used in trace events and failure reports.
pub const STAGE: &str = "analyze";

/// Compares all scenarios against the user's DNA.
pub struct AnalysisStage {
    caller: ResilientCaller,
}

impl AnalysisStage {
    /// Create a new analysis stage
    pub fn new(caller: ResilientCaller) -> Self {
        Self { caller }
    }

    /// Produce one [`Analysis`] record from the scenario set and DNA.
    ///
    /// The scenario set may be partial but must not be empty. A parsed
    /// response recommending an unknown scenario id counts as a parse
    /// failure, so it goes through the retry path rather than being silently
    /// accepted.
    pub async fn analyze(
        &self,
        scenarios: &[Scenario],
        dna: &DecisionDNA,
    ) -> Result<Analysis, PipelineError> {
        if scenarios.is_empty() {
            return Err(PipelineError::InsufficientScenarios);
        }

        info!(scenarios = scenarios.len(), "Analyzing scenarios");

        let valid_ids: HashSet<String> =
            scenarios.iter().map(|s| s.scenario_id.clone()).collect();

        let prompt = analysis_prompt(scenarios, dna);
        let analysis = self
            .caller
            .call(STAGE, &prompt, Some(ANALYSIS_SCHEMA_HINT), |raw| {
                parse_analysis(raw, &valid_ids)
            })
            .await?;

        Ok(analysis)
    }
}

/// Parse and validate an analysis payload against the known scenario ids.
pub(crate) fn parse_analysis(
    raw: &str,
    valid_ids: &HashSet<String>,
) -> Result<Analysis, ParseError> {
    let mut analysis: Analysis = serde_json::from_str(raw)?;

    if !valid_ids.contains(&analysis.recommended_scenario) {
        return Err(ParseError::new(format!(
            "recommended scenario '{}' is not among the input scenario ids",
            analysis.recommended_scenario
        )));
    }

    for score in analysis.alignment_scores.values_mut() {
        if !score.is_finite() {
            return Err(ParseError::new("alignment scores must be numbers"));
        }
        *score = score.clamp(0.0, 1.0);
    }

    Ok(analysis)
}
