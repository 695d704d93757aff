use serde_json::Value;
use tracing::info;

use crate::error::{ParseError, PipelineError};
use crate::prompts::{profile_prompt, DNA_SCHEMA_HINT};
use crate::reasoning::ResilientCaller;
use crate::storage::DecisionDNA;
use crate::validate::validate_user_profile;

/// Stage name used in trace events and failure reports.
pub const STAGE: &str = "profile";

/// Extracts a user's decision DNA from their profile.
pub struct ProfileStage {
    caller: ResilientCaller,
}

impl ProfileStage {
    /// Create a new profile stage
    pub fn new(caller: ResilientCaller) -> Self {
        Self { caller }
    }

    /// Turn a user profile into a [`DecisionDNA`] record.
    ///
    /// The profile must carry at least an identifier and age; bad input fails
    /// with `InvalidProfile` without calling the model.
    pub async fn extract_dna(&self, user_profile: &Value) -> Result<DecisionDNA, PipelineError> {
        let profile = validate_user_profile(user_profile)?;

        info!(
            user_id = profile.get("user_id").and_then(|v| v.as_str()).unwrap_or("unknown"),
            "Extracting decision DNA"
        );

        let prompt = profile_prompt(&profile);
        let dna = self
            .caller
            .call(STAGE, &prompt, Some(DNA_SCHEMA_HINT), parse_dna)
            .await?;

        Ok(dna)
    }
}

/// Parse and validate a decision DNA payload.
pub(crate) fn parse_dna(raw: &str) -> Result<DecisionDNA, ParseError> {
    let mut dna: DecisionDNA = serde_json::from_str(raw)?;

    if !dna.risk_tolerance.is_finite() {
        return Err(ParseError::new("risk_tolerance must be a number"));
    }
    dna.risk_tolerance = dna.risk_tolerance.clamp(0.0, 1.0);

    if dna.value_priorities.is_empty() {
        return Err(ParseError::new("value_priorities must not be empty"));
    }

    Ok(dna)
}
