use tracing::info;

use crate::error::{ParseError, PipelineError};
use crate::prompts::{advice_prompt, ADVICE_SCHEMA_HINT};
use crate::reasoning::ResilientCaller;
use crate::storage::{Advice, Analysis, DecisionDNA};

/// Stage name used in trace events and failure reports.
pub const STAGE: &str = "advise";

/// Turns the analysis into personalized, actionable advice.
pub struct AdviceStage {
    caller: ResilientCaller,
}

impl AdviceStage {
    /// Create a new advice stage
    pub fn new(caller: ResilientCaller) -> Self {
        Self { caller }
    }

    /// Produce one [`Advice`] record from the analysis and DNA.
    pub async fn advise(
        &self,
        analysis: &Analysis,
        dna: &DecisionDNA,
    ) -> Result<Advice, PipelineError> {
        info!(
            recommended = %analysis.recommended_scenario,
            "Generating personalized advice"
        );

        let prompt = advice_prompt(analysis, dna);
        let advice = self
            .caller
            .call(STAGE, &prompt, Some(ADVICE_SCHEMA_HINT), parse_advice)
            .await?;

        Ok(advice)
    }
}

/// Parse and structurally validate an advice payload.
pub(crate) fn parse_advice(raw: &str) -> Result<Advice, ParseError> {
    let advice: Advice = serde_json::from_str(raw)?;

    if advice.recommendation.trim().is_empty() {
        return Err(ParseError::new("recommendation must not be empty"));
    }
    if advice.action_plan.is_empty() {
        return Err(ParseError::new(
            "action_plan must contain at least one bucket",
        ));
    }
    if advice.warning_signs.is_empty() {
        return Err(ParseError::new(
            "warning_signs must contain at least one entry",
        ));
    }

    Ok(advice)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_PAYLOAD: &str = r#"{
        "recommendation": "Take the role because it fits your DNA",
        "action_plan": {"30_days": ["Negotiate equity"]},
        "warning_signs": ["Funding delays"],
        "success_indicators": ["Revenue growth"],
        "contingency_plans": ["Return to consulting"]
    }"#;

    #[test]
    fn test_parse_advice_valid() {
        let advice = parse_advice(VALID_PAYLOAD).unwrap();
        assert_eq!(advice.action_plan["30_days"], vec!["Negotiate equity"]);
        assert_eq!(advice.warning_signs.len(), 1);
    }

    #[test]
    fn test_parse_advice_requires_action_plan_bucket() {
        let raw = VALID_PAYLOAD.replace("{\"30_days\": [\"Negotiate equity\"]}", "{}");
        let err = parse_advice(&raw).unwrap_err();
        assert!(err.to_string().contains("action_plan"));
    }

    #[test]
    fn test_parse_advice_requires_warning_sign() {
        let raw = VALID_PAYLOAD.replace("[\"Funding delays\"]", "[]");
        let err = parse_advice(&raw).unwrap_err();
        assert!(err.to_string().contains("warning_signs"));
    }

    #[test]
    fn test_parse_advice_requires_recommendation_text() {
        let raw = VALID_PAYLOAD.replace("Take the role because it fits your DNA", "  ");
        assert!(parse_advice(&raw).is_err());
    }
}
