use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::{ParseError, PipelineError, ResilientCallFailure};
use crate::prompts::{simulation_prompt, SCENARIO_SCHEMA_HINT};
use crate::reasoning::ResilientCaller;
use crate::storage::{CellFailure, DecisionDNA, Scenario, Timeline, Variant};
use crate::validate::validate_timelines;

/// Stage name used in trace events and failure reports.
pub const STAGE: &str = "simulate";

/// Result of a simulation fan-out: whatever succeeded, plus what did not.
#[derive(Debug, Clone, Default)]
pub struct SimulationOutcome {
    /// Scenarios in timeline order, then fixed variant order.
    pub scenarios: Vec<Scenario>,
    /// Cells that failed after retries, in the same normalized order.
    pub failures: Vec<CellFailure>,
}

/// Fans one resilient call out per (timeline, variant) cell.
pub struct SimulationStage {
    caller: ResilientCaller,
    max_concurrency: usize,
}

impl SimulationStage {
    /// Create a new simulation stage with the given fan-out bound
    pub fn new(caller: ResilientCaller, max_concurrency: usize) -> Self {
        Self {
            caller,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Simulate the decision across every (timeline, variant) cell.
    ///
    /// Cells are independent and run concurrently under a bounded permit
    /// pool; each completion lands in a pre-assigned slot, so the returned
    /// ordering is by caller-supplied timeline order then fixed variant order
    /// regardless of completion order. If some cells fail the stage still
    /// returns the successful scenarios plus the failure list; only when
    /// every cell fails does it raise `SimulationFailed`, which carries the
    /// per-cell failures.
    pub async fn simulate(
        &self,
        decision: &str,
        dna: &DecisionDNA,
        timelines: &[Timeline],
    ) -> Result<SimulationOutcome, PipelineError> {
        validate_timelines(timelines)?;

        let mut cells = Vec::new();
        for timeline in timelines {
            for variant in Variant::ALL {
                cells.push((timeline.clone(), variant));
            }
        }
        let total = cells.len();

        info!(
            timelines = timelines.len(),
            cells = total,
            max_concurrency = self.max_concurrency,
            "Fanning out simulation cells"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut join_set = JoinSet::new();

        for (slot, (timeline, variant)) in cells.iter().cloned().enumerate() {
            let caller = self.caller.clone();
            let prompt = simulation_prompt(decision, dna, &timeline, variant);
            let semaphore = Arc::clone(&semaphore);
            let stage_name = format!("{}:{}", STAGE, Scenario::id_for(&timeline, variant));

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = caller
                    .call(
                        &stage_name,
                        &prompt,
                        Some(SCENARIO_SCHEMA_HINT),
                        scenario_parser(timeline, variant),
                    )
                    .await;
                (slot, result)
            });
        }

        let mut slots: Vec<Option<Result<Scenario, ResilientCallFailure>>> =
            (0..total).map(|_| None).collect();

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((slot, result)) => slots[slot] = Some(result),
                Err(e) => warn!(error = %e, "Simulation cell task aborted"),
            }
        }

        let mut outcome = SimulationOutcome::default();
        for (slot, (timeline, variant)) in cells.into_iter().enumerate() {
            match slots[slot].take() {
                Some(Ok(scenario)) => outcome.scenarios.push(scenario),
                Some(Err(failure)) => outcome.failures.push(CellFailure {
                    timeline,
                    variant,
                    attempts: failure.attempts,
                    error: failure.last_error,
                    last_raw: failure.last_raw,
                }),
                None => outcome.failures.push(CellFailure {
                    timeline,
                    variant,
                    attempts: 0,
                    error: "cell task aborted before completion".to_string(),
                    last_raw: None,
                }),
            }
        }

        if outcome.scenarios.is_empty() {
            return Err(PipelineError::SimulationFailed {
                total,
                failures: outcome.failures,
            });
        }

        info!(
            succeeded = outcome.scenarios.len(),
            failed = outcome.failures.len(),
            "Simulation fan-out complete"
        );

        Ok(outcome)
    }
}

/// Raw payload the model returns for one simulation cell.
#[derive(Debug, Deserialize)]
struct ScenarioPayload {
    decision_path: String,
    outcomes: HashMap<String, serde_json::Value>,
    probability: f64,
    key_events: Vec<String>,
    risks: Vec<String>,
    opportunities: Vec<String>,
}

/// Build a parser attaching cell identity to the parsed payload.
fn scenario_parser(
    timeline: Timeline,
    variant: Variant,
) -> impl Fn(&str) -> Result<Scenario, ParseError> {
    move |raw| {
        let payload: ScenarioPayload = serde_json::from_str(raw)?;

        if !(0.0..=1.0).contains(&payload.probability) {
            return Err(ParseError::new(format!(
                "probability out of range: {}",
                payload.probability
            )));
        }

        Ok(Scenario {
            scenario_id: Scenario::id_for(&timeline, variant),
            timeline: timeline.clone(),
            variant,
            decision_path: payload.decision_path,
            outcomes: payload.outcomes,
            probability: payload.probability,
            key_events: payload.key_events,
            risks: payload.risks,
            opportunities: payload.opportunities,
        })
    }
}
