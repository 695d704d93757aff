//! Pipeline orchestration.
//!
//! The [`Orchestrator`] drives a session through the stage machine
//! (created, profiled, simulated, analyzed, advised, complete), persisting
//! the session after every committed stage so a crash or stage failure
//! leaves a resumable record behind. A stage that exhausts its retries does
//! not bubble up as an error: the session is stored as `failed:<stage>` and
//! the caller receives a [`SessionResult`] carrying everything that was
//! produced before the failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::{RequestConfig, SimulationConfig};
use crate::error::{AppError, AppResult, PipelineError};
use crate::reasoning::{ReasoningClient, ResilientCaller};
use crate::stages::{
    advise, analyze, profile, simulate, AdviceStage, AnalysisStage, OutcomeScorer, ProfileStage,
    SimulationStage, TrackingResult, TrackingStage,
};
use crate::storage::{
    Advice, Analysis, CellFailure, DecisionDNA, DecisionRecord, MemoryBank, PipelineState,
    Scenario, Session, Timeline,
};
use crate::validate::{validate_decision, validate_timelines, validate_user_profile};

/// Cooperative cancellation handle.
///
/// Cancellation is checked at stage boundaries only: an in-flight stage is
/// allowed to finish, and its output is persisted before the pipeline stops.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation at the next stage boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Consume a pending cancellation request, clearing the flag.
    ///
    /// A request cancels exactly one run: the checkpoint that honors it
    /// clears the flag, so later runs on the same orchestrator proceed.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// What went wrong when a run ends in a failed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Stage that failed.
    pub stage: String,
    /// Attempts the failing call made, 0 when no call was involved.
    pub attempts: u32,
    /// Description of the failure.
    pub detail: String,
    /// Last raw model response, when one was received.
    pub last_raw: Option<String>,
}

impl StageFailure {
    fn from_error(stage: &str, err: &PipelineError) -> Self {
        match err {
            PipelineError::Call(call) => Self {
                stage: stage.to_string(),
                attempts: call.attempts,
                detail: call.last_error.clone(),
                last_raw: call.last_raw.clone(),
            },
            // Every cell failed: surface the worst attempt count and the
            // last raw payload any cell received.
            PipelineError::SimulationFailed { failures, .. } => Self {
                stage: stage.to_string(),
                attempts: failures.iter().map(|f| f.attempts).max().unwrap_or(0),
                detail: err.to_string(),
                last_raw: failures.iter().rev().find_map(|f| f.last_raw.clone()),
            },
            other => Self {
                stage: stage.to_string(),
                attempts: 0,
                detail: other.to_string(),
                last_raw: None,
            },
        }
    }
}

/// Outcome of a pipeline run, complete or partial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    /// Identifier of the (persisted) session.
    pub session_id: String,
    /// Final state the session was stored in.
    pub state: PipelineState,
    /// Decision DNA, present from the profiled state onward.
    pub decision_dna: Option<DecisionDNA>,
    /// Scenarios in timeline order then variant order; may be partial.
    pub scenarios: Vec<Scenario>,
    /// Simulation cells that failed after retries during this run.
    pub failed_cells: Vec<CellFailure>,
    /// Cross-scenario analysis, present from the analyzed state onward.
    pub analysis: Option<Analysis>,
    /// Personalized advice, present from the advised state onward.
    pub advice: Option<Advice>,
    /// Set when the run stopped before completing.
    pub failure: Option<StageFailure>,
}

impl SessionResult {
    /// Whether the run reached the terminal complete state.
    pub fn is_complete(&self) -> bool {
        self.state == PipelineState::Complete
    }
}

/// Drives sessions through the decision-simulation stage machine.
pub struct Orchestrator {
    profile: ProfileStage,
    simulation: SimulationStage,
    analysis: AnalysisStage,
    advice: AdviceStage,
    tracking: TrackingStage,
    memory: Arc<dyn MemoryBank>,
    cancel: CancelFlag,
}

impl Orchestrator {
    /// Build an orchestrator around a reasoning client and a memory bank
    pub fn new(
        client: Arc<dyn ReasoningClient>,
        memory: Arc<dyn MemoryBank>,
        request_config: RequestConfig,
        simulation_config: SimulationConfig,
    ) -> Self {
        let caller = ResilientCaller::new(client, request_config);

        Self {
            profile: ProfileStage::new(caller.clone()),
            simulation: SimulationStage::new(caller.clone(), simulation_config.max_concurrency),
            analysis: AnalysisStage::new(caller.clone()),
            advice: AdviceStage::new(caller),
            tracking: TrackingStage::rule_based(),
            memory,
            cancel: CancelFlag::new(),
        }
    }

    /// Replace the rule-based outcome scorer.
    pub fn with_scorer(mut self, scorer: Arc<dyn OutcomeScorer>) -> Self {
        self.tracking = TrackingStage::new(scorer);
        self
    }

    /// Handle that cancels this orchestrator's runs at the next stage boundary.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run the full pipeline for a new session.
    ///
    /// Input validation failures return `Err` without creating a session.
    /// Once the session exists, stage failures are not errors: the session
    /// is persisted as `failed:<stage>` and the partial result is returned.
    pub async fn run(
        &self,
        user_profile: serde_json::Value,
        decision: &str,
        timelines: &[Timeline],
    ) -> AppResult<SessionResult> {
        let profile = validate_user_profile(&user_profile).map_err(AppError::from)?;
        let decision = validate_decision(decision).map_err(AppError::from)?;
        validate_timelines(timelines).map_err(AppError::from)?;

        let mut session = Session::new(profile);
        session.decision_text = Some(decision);
        session.timelines = timelines.to_vec();

        info!(
            session_id = %session.session_id,
            user_id = session.user_id().unwrap_or("unknown"),
            timelines = timelines.len(),
            "Starting pipeline run"
        );

        self.memory
            .save_session(&session)
            .await
            .map_err(AppError::from)?;

        self.drive(session).await
    }

    /// Resume a persisted session from wherever it stopped.
    ///
    /// Stages whose output is already present are skipped; a session stored
    /// as `failed:<stage>` picks up at that stage. Resuming a complete
    /// session is a no-op that returns its stored result.
    pub async fn resume(&self, session_id: &str) -> AppResult<SessionResult> {
        let session = self.load(session_id).await?;

        info!(
            session_id = %session.session_id,
            state = %session.state,
            "Resuming pipeline run"
        );

        self.drive(session).await
    }

    /// Re-extract the decision DNA for an existing session and re-run
    /// everything derived from it.
    ///
    /// The superseded DNA is retained in the conversation history before
    /// being replaced; scenarios, analysis and advice are cleared since they
    /// were built on the old DNA.
    pub async fn reprofile(&self, session_id: &str) -> AppResult<SessionResult> {
        let mut session = self.load(session_id).await?;

        if let Some(prior) = session.decision_dna.take() {
            session.record_output(
                profile::STAGE,
                json!({ "superseded_dna": prior }),
            );
        }
        session.scenarios.clear();
        session.analysis = None;
        session.advice = None;
        session.state = PipelineState::Created;

        info!(session_id = %session.session_id, "Re-profiling session");

        self.memory
            .save_session(&session)
            .await
            .map_err(AppError::from)?;

        self.drive(session).await
    }

    /// Record a decision (and optionally its observed outcome) against a
    /// session, returning updated accuracy statistics.
    pub async fn track_outcome(
        &self,
        session_id: &str,
        record: DecisionRecord,
    ) -> AppResult<TrackingResult> {
        let mut session = self.load(session_id).await?;

        let result = self.tracking.track(&mut session, record);

        self.memory
            .save_session(&session)
            .await
            .map_err(AppError::from)?;

        Ok(result)
    }

    async fn load(&self, session_id: &str) -> AppResult<Session> {
        self.memory
            .get_session(session_id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| {
                AppError::from(PipelineError::SessionNotFound {
                    session_id: session_id.to_string(),
                })
            })
    }

    /// Run every stage whose output the session does not yet have.
    async fn drive(&self, mut session: Session) -> AppResult<SessionResult> {
        let decision = match session.decision_text.clone() {
            Some(d) => d,
            None => {
                return Err(AppError::from(PipelineError::InvalidDecision {
                    message: "session has no decision text to run against".to_string(),
                }))
            }
        };
        let timelines = if session.timelines.is_empty() {
            Timeline::defaults()
        } else {
            session.timelines.clone()
        };

        let mut failed_cells: Vec<CellFailure> = Vec::new();

        // Profile: produced once per session unless reprofile() cleared it.
        if session.decision_dna.is_none() {
            let stage = profile::STAGE;
            if let Some(result) = self.checkpoint(&mut session, stage, &failed_cells).await? {
                return Ok(result);
            }

            let profile_snapshot = session.user_profile.clone();
            session.record_input(stage, json!({ "decision": decision }));

            match self.profile.extract_dna(&profile_snapshot).await {
                Ok(dna) => {
                    session.record_output(stage, to_log_value(&dna));
                    session.decision_dna = Some(dna);
                    self.commit(&mut session, PipelineState::Profiled).await?;
                }
                Err(err) => return self.fail(session, stage, failed_cells, err).await,
            }
        }

        let dna = match session.decision_dna.clone() {
            Some(dna) => dna,
            None => {
                return Err(AppError::Internal {
                    message: "profiled session is missing its decision DNA".to_string(),
                })
            }
        };

        // Simulate: skipped when a scenario set already exists. A partial
        // set from a committed earlier run counts as existing.
        if session.scenarios.is_empty() {
            let stage = simulate::STAGE;
            if let Some(result) = self.checkpoint(&mut session, stage, &failed_cells).await? {
                return Ok(result);
            }

            session.record_input(
                stage,
                json!({ "decision": decision, "timelines": timelines }),
            );

            match self.simulation.simulate(&decision, &dna, &timelines).await {
                Ok(outcome) => {
                    failed_cells = outcome.failures;
                    session.record_output(
                        stage,
                        json!({
                            "scenarios": outcome.scenarios.len(),
                            "failed_cells": failed_cells,
                        }),
                    );
                    session.scenarios = outcome.scenarios;
                    self.commit(&mut session, PipelineState::Simulated).await?;
                }
                Err(err) => {
                    if let PipelineError::SimulationFailed { failures, .. } = &err {
                        failed_cells = failures.clone();
                    }
                    return self.fail(session, stage, failed_cells, err).await;
                }
            }
        }

        // Analyze.
        if session.analysis.is_none() {
            let stage = analyze::STAGE;
            if let Some(result) = self.checkpoint(&mut session, stage, &failed_cells).await? {
                return Ok(result);
            }

            session.record_input(
                stage,
                json!({
                    "scenario_ids": session
                        .scenarios
                        .iter()
                        .map(|s| s.scenario_id.clone())
                        .collect::<Vec<_>>(),
                }),
            );

            match self.analysis.analyze(&session.scenarios, &dna).await {
                Ok(analysis) => {
                    session.record_output(stage, to_log_value(&analysis));
                    session.analysis = Some(analysis);
                    self.commit(&mut session, PipelineState::Analyzed).await?;
                }
                Err(err) => return self.fail(session, stage, failed_cells, err).await,
            }
        }

        // Advise.
        if session.advice.is_none() {
            let stage = advise::STAGE;
            if let Some(result) = self.checkpoint(&mut session, stage, &failed_cells).await? {
                return Ok(result);
            }

            let analysis = match session.analysis.clone() {
                Some(analysis) => analysis,
                None => {
                    return Err(AppError::Internal {
                        message: "analyzed session is missing its analysis".to_string(),
                    })
                }
            };

            session.record_input(
                stage,
                json!({ "recommended_scenario": analysis.recommended_scenario }),
            );

            match self.advice.advise(&analysis, &dna).await {
                Ok(advice) => {
                    session.record_output(stage, to_log_value(&advice));
                    session.advice = Some(advice);
                    self.commit(&mut session, PipelineState::Advised).await?;
                }
                Err(err) => return self.fail(session, stage, failed_cells, err).await,
            }
        }

        self.commit(&mut session, PipelineState::Complete).await?;

        info!(session_id = %session.session_id, "Pipeline run complete");

        Ok(build_result(session, failed_cells, None))
    }

    /// Stage boundary: stop here when cancellation was requested.
    ///
    /// Returns `Ok(Some(result))` when the run should stop, with the session
    /// persisted as failed at the upcoming stage so it can be resumed.
    async fn checkpoint(
        &self,
        session: &mut Session,
        stage: &str,
        failed_cells: &[CellFailure],
    ) -> AppResult<Option<SessionResult>> {
        if !self.cancel.take() {
            return Ok(None);
        }

        warn!(
            session_id = %session.session_id,
            stage,
            "Cancellation requested; stopping before stage"
        );

        let err = PipelineError::Cancelled {
            stage: stage.to_string(),
        };
        let result = self
            .fail(session.clone(), stage, failed_cells.to_vec(), err)
            .await?;
        Ok(Some(result))
    }

    /// Persist the session in its new state.
    async fn commit(&self, session: &mut Session, state: PipelineState) -> AppResult<()> {
        session.state = state;
        self.memory
            .save_session(session)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    /// Persist the session as failed at `stage` and fold the error into the
    /// partial result.
    async fn fail(
        &self,
        mut session: Session,
        stage: &str,
        failed_cells: Vec<CellFailure>,
        err: PipelineError,
    ) -> AppResult<SessionResult> {
        error!(
            session_id = %session.session_id,
            stage,
            error = %err,
            "Stage failed; persisting partial session"
        );

        let failure = StageFailure::from_error(stage, &err);
        session.record_output(stage, json!({ "failure": failure }));
        session.state = PipelineState::Failed {
            stage: stage.to_string(),
        };
        self.memory
            .save_session(&session)
            .await
            .map_err(AppError::from)?;

        Ok(build_result(session, failed_cells, Some(failure)))
    }
}

fn build_result(
    session: Session,
    failed_cells: Vec<CellFailure>,
    failure: Option<StageFailure>,
) -> SessionResult {
    SessionResult {
        session_id: session.session_id,
        state: session.state,
        decision_dna: session.decision_dna,
        scenarios: session.scenarios,
        failed_cells,
        analysis: session.analysis,
        advice: session.advice,
        failure,
    }
}

/// Serialize a record for the conversation log, degrading to null rather
/// than failing the stage.
fn to_log_value<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}
