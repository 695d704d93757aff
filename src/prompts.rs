//! Centralized prompt builders for the reasoning stages
//!
//! Each stage renders one prompt embedding its inputs plus a schema hint
//! describing the structured shape expected back. Centralizing them makes the
//! prompts easier to maintain, test, and version.

use serde_json::Value;

use crate::storage::{Analysis, DecisionDNA, Scenario, Timeline, Variant};

/// Schema hint for the profile stage.
pub const DNA_SCHEMA_HINT: &str = r#"{
  "risk_tolerance": 0.7,
  "time_horizon_preference": "medium",
  "value_priorities": ["career", "wealth", "freedom"],
  "decision_patterns": {"style": "analytical", "speed": "deliberate"},
  "emotional_drivers": ["achievement", "security"]
}"#;

/// Schema hint for one simulation cell.
pub const SCENARIO_SCHEMA_HINT: &str = r#"{
  "decision_path": "Take the startup role",
  "outcomes": {"career": "Senior role", "finance": "Equity growth"},
  "probability": 0.7,
  "key_events": ["Join startup", "Product launch"],
  "risks": ["Startup failure"],
  "opportunities": ["Equity upside"]
}"#;

/// Schema hint for the analysis stage.
pub const ANALYSIS_SCHEMA_HINT: &str = r#"{
  "recommended_scenario": "1yr_optimistic",
  "alignment_scores": {"1yr_optimistic": 0.8, "1yr_realistic": 0.6},
  "trade_offs": ["Higher risk vs higher reward"],
  "risk_assessment": "Main risks include...",
  "opportunity_assessment": "Key opportunities are..."
}"#;

/// Schema hint for the advice stage.
pub const ADVICE_SCHEMA_HINT: &str = r#"{
  "recommendation": "Take the role because...",
  "action_plan": {
    "30_days": ["Negotiate equity"],
    "60_days": ["Ship first feature"],
    "90_days": ["Review runway"]
  },
  "warning_signs": ["Funding delays"],
  "success_indicators": ["Revenue growth"],
  "contingency_plans": ["Return to consulting"]
}"#;

/// Prompt asking the model to extract decision DNA from a user profile.
pub fn profile_prompt(user_profile: &Value) -> String {
    format!(
        "Analyze this user profile and extract their Decision DNA:\n\n\
         User Data: {}\n\n\
         Extract:\n\
         1. Risk tolerance (0-1 scale, float)\n\
         2. Time horizon preference (short/medium/long)\n\
         3. Top value priorities from: career, family, health, wealth, freedom, creativity, impact\n\
         4. Decision patterns (how they typically decide)\n\
         5. Emotional drivers (what motivates them)",
        serde_json::to_string_pretty(user_profile).unwrap_or_default()
    )
}

/// Prompt for one (timeline, variant) simulation cell.
pub fn simulation_prompt(
    decision: &str,
    dna: &DecisionDNA,
    timeline: &Timeline,
    variant: Variant,
) -> String {
    format!(
        "Simulate the {variant} future scenario for this decision over a {timeline} horizon:\n\n\
         Decision: {decision}\n\
         Decision DNA: {dna}\n\n\
         Provide:\n\
         - decision_path: specific actions taken (string)\n\
         - outcomes: concrete results in career, finance, relationships, health, happiness (object)\n\
         - probability: likelihood 0-1 (float)\n\
         - key_events: major milestones (array of strings)\n\
         - risks: potential problems (array of strings)\n\
         - opportunities: potential gains (array of strings)",
        variant = variant,
        timeline = timeline,
        decision = decision,
        dna = serde_json::to_string(dna).unwrap_or_default(),
    )
}

/// Prompt asking the model to compare scenarios against the user's DNA.
pub fn analysis_prompt(scenarios: &[Scenario], dna: &DecisionDNA) -> String {
    format!(
        "Analyze these future scenarios based on the user's Decision DNA:\n\n\
         Scenarios: {}\n\
         Decision DNA: {}\n\n\
         Provide:\n\
         1. recommended_scenario: the scenario_id that aligns best with the user's values\n\
         2. alignment_scores: how well each scenario matches the DNA, 0-1, keyed by scenario_id\n\
         3. trade_offs: what the user gains vs loses on each path\n\
         4. risk_assessment: comprehensive risk assessment\n\
         5. opportunity_assessment: key opportunities across scenarios\n\n\
         recommended_scenario MUST be one of the provided scenario_id values.",
        serde_json::to_string_pretty(scenarios).unwrap_or_default(),
        serde_json::to_string(dna).unwrap_or_default(),
    )
}

/// Prompt asking the model for personalized, actionable advice.
pub fn advice_prompt(analysis: &Analysis, dna: &DecisionDNA) -> String {
    format!(
        "Based on this analysis and Decision DNA, provide personalized advice:\n\n\
         Analysis: {}\n\
         Decision DNA: {}\n\n\
         Provide:\n\
         1. recommendation: clear recommendation with reasoning\n\
         2. action_plan: action steps bucketed for the next 30/60/90 days\n\
         3. warning_signs: signs to watch for\n\
         4. success_indicators: signs the path is working\n\
         5. contingency_plans: fallbacks if things go wrong\n\n\
         Be direct, actionable, and personalized to their DNA.",
        serde_json::to_string_pretty(analysis).unwrap_or_default(),
        serde_json::to_string(dna).unwrap_or_default(),
    )
}
