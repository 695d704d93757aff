use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::storage::{DecisionRecord, Scenario, Session};

/// Stage name used in trace events and failure reports.
pub const STAGE: &str = "track";

/// Scores a predicted scenario against an observed outcome.
///
/// Kept behind a trait so the rule-based comparator can later be replaced by
/// a statistical model without touching the stage contract.
pub trait OutcomeScorer: Send + Sync {
    /// Accuracy of `predicted` given `actual`, 0..1.
    fn score(&self, predicted: &Scenario, actual: &HashMap<String, serde_json::Value>) -> f64;
}

/// Rule-based scorer: the fraction of outcome categories present in both the
/// prediction and the observation whose values match.
pub struct CategoricalScorer;

impl OutcomeScorer for CategoricalScorer {
    fn score(&self, predicted: &Scenario, actual: &HashMap<String, serde_json::Value>) -> f64 {
        let mut shared = 0usize;
        let mut matched = 0usize;

        for (category, actual_value) in actual {
            if let Some(predicted_value) = predicted.outcomes.get(category) {
                shared += 1;
                if values_match(predicted_value, actual_value) {
                    matched += 1;
                }
            }
        }

        if shared == 0 {
            0.0
        } else {
            matched as f64 / shared as f64
        }
    }
}

fn values_match(predicted: &serde_json::Value, actual: &serde_json::Value) -> bool {
    match (predicted.as_str(), actual.as_str()) {
        (Some(p), Some(a)) => p.trim().eq_ignore_ascii_case(a.trim()),
        _ => predicted == actual,
    }
}

/// Accuracy statistics after a tracking update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingResult {
    /// Session the record was stored in.
    pub session_id: String,
    /// Total tracked decisions in the session.
    pub record_count: usize,
    /// Tracked decisions with an observed outcome.
    pub tracked_with_outcome: usize,
    /// Mean accuracy across records with outcomes, if any.
    pub average_accuracy: Option<f64>,
    /// Accuracy of the record just stored, if it has an outcome.
    pub latest_accuracy: Option<f64>,
}

/// Rule-based decision tracker; no external call.
pub struct TrackingStage {
    scorer: Arc<dyn OutcomeScorer>,
}

impl TrackingStage {
    /// Create a tracking stage with a custom scorer
    pub fn new(scorer: Arc<dyn OutcomeScorer>) -> Self {
        Self { scorer }
    }

    /// Create a tracking stage with the rule-based categorical scorer
    pub fn rule_based() -> Self {
        Self::new(Arc::new(CategoricalScorer))
    }

    /// Append or update a decision record and recompute accuracy statistics.
    ///
    /// Records are keyed by (decision, timestamp): calling this again with a
    /// different outcome for the same key overwrites the stored record
    /// instead of duplicating it. When the record carries an outcome and
    /// references a scenario present in the session, its accuracy is scored
    /// before storing.
    pub fn track(&self, session: &mut Session, mut record: DecisionRecord) -> TrackingResult {
        if let (Some(outcome), Some(predicted_id)) =
            (&record.actual_outcome, &record.predicted_scenario)
        {
            if let Some(predicted) = session
                .scenarios
                .iter()
                .find(|s| &s.scenario_id == predicted_id)
            {
                record.accuracy = Some(self.scorer.score(predicted, outcome));
            }
        }

        let latest_accuracy = record.accuracy;

        match session
            .decision_history
            .iter_mut()
            .find(|r| r.decision == record.decision && r.timestamp == record.timestamp)
        {
            Some(existing) => *existing = record,
            None => session.decision_history.push(record),
        }

        let with_outcome: Vec<f64> = session
            .decision_history
            .iter()
            .filter_map(|r| r.accuracy)
            .collect();

        let result = TrackingResult {
            session_id: session.session_id.clone(),
            record_count: session.decision_history.len(),
            tracked_with_outcome: session
                .decision_history
                .iter()
                .filter(|r| r.actual_outcome.is_some())
                .count(),
            average_accuracy: if with_outcome.is_empty() {
                None
            } else {
                Some(with_outcome.iter().sum::<f64>() / with_outcome.len() as f64)
            },
            latest_accuracy,
        };

        info!(
            session_id = %result.session_id,
            records = result.record_count,
            with_outcome = result.tracked_with_outcome,
            "Decision tracked"
        );

        result
    }
}
