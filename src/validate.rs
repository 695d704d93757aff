//! Input validation for pipeline entry points
//!
//! Bad inputs are rejected immediately, without retry, before any session
//! state is created.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::PipelineError;
use crate::storage::Timeline;

/// Fields a user profile must carry.
const REQUIRED_PROFILE_FIELDS: [&str; 3] = ["user_id", "age", "current_role"];

/// Optional list-valued profile fields, defaulted to empty lists.
const LIST_PROFILE_FIELDS: [&str; 4] = ["skills", "interests", "life_goals", "past_decisions"];

/// Maximum timelines per run.
pub const MAX_TIMELINES: usize = 5;

/// Minimum decision text length after trimming.
const MIN_DECISION_LEN: usize = 10;

/// Validate a user profile, returning a normalized copy.
///
/// Requires `user_id`, `age` (integer 16..=100) and `current_role`; missing
/// list-valued fields are filled in as empty lists.
pub fn validate_user_profile(profile: &Value) -> Result<Value, PipelineError> {
    let obj = profile
        .as_object()
        .ok_or_else(|| PipelineError::InvalidProfile {
            message: "profile must be a JSON object".to_string(),
        })?;

    for field in REQUIRED_PROFILE_FIELDS {
        if !obj.contains_key(field) {
            return Err(PipelineError::InvalidProfile {
                message: format!("missing required field: {}", field),
            });
        }
    }

    let age = obj.get("age").and_then(|v| v.as_i64()).ok_or_else(|| {
        PipelineError::InvalidProfile {
            message: "age must be an integer".to_string(),
        }
    })?;
    if !(16..=100).contains(&age) {
        return Err(PipelineError::InvalidProfile {
            message: format!("age must be between 16 and 100, got {}", age),
        });
    }

    let mut normalized = obj.clone();
    for field in LIST_PROFILE_FIELDS {
        match normalized.get(field) {
            None => {
                normalized.insert(field.to_string(), Value::Array(vec![]));
            }
            Some(Value::Array(_)) => {}
            Some(_) => {
                return Err(PipelineError::InvalidProfile {
                    message: format!("{} must be a list", field),
                });
            }
        }
    }

    Ok(Value::Object(normalized))
}

/// Validate decision text, returning the trimmed form.
pub fn validate_decision(decision: &str) -> Result<String, PipelineError> {
    let trimmed = decision.trim();
    if trimmed.len() < MIN_DECISION_LEN {
        return Err(PipelineError::InvalidDecision {
            message: format!(
                "decision must be at least {} characters long",
                MIN_DECISION_LEN
            ),
        });
    }
    Ok(trimmed.to_string())
}

/// Validate a timeline set: 1 to [`MAX_TIMELINES`] distinct non-empty labels.
pub fn validate_timelines(timelines: &[Timeline]) -> Result<(), PipelineError> {
    if timelines.is_empty() {
        return Err(PipelineError::InvalidTimelines {
            message: "at least one timeline is required".to_string(),
        });
    }
    if timelines.len() > MAX_TIMELINES {
        return Err(PipelineError::InvalidTimelines {
            message: format!("at most {} timelines are supported", MAX_TIMELINES),
        });
    }

    let mut seen = HashSet::new();
    for timeline in timelines {
        if timeline.as_str().is_empty() {
            return Err(PipelineError::InvalidTimelines {
                message: "timeline labels must be non-empty".to_string(),
            });
        }
        if !seen.insert(timeline.as_str()) {
            return Err(PipelineError::InvalidTimelines {
                message: format!("duplicate timeline: {}", timeline),
            });
        }
    }

    Ok(())
}
