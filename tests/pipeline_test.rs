//! End-to-end pipeline tests
//!
//! Drives the orchestrator against an in-memory database and a scripted
//! in-process model that answers each stage by recognizing its prompt.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use futureyou::config::{RequestConfig, SimulationConfig};
use futureyou::error::{AppError, PipelineError, ReasoningResult};
use futureyou::pipeline::Orchestrator;
use futureyou::reasoning::ReasoningClient;
use futureyou::storage::{
    DecisionRecord, MemoryBank, PipelineState, SqliteMemoryBank, Timeline,
};

/// Answers every stage prompt with a conforming payload, with per-stage
/// failure toggles and call counters.
#[derive(Default)]
struct StageClient {
    fail_simulation: AtomicBool,
    fail_analysis: AtomicBool,
    profile_calls: AtomicUsize,
    analysis_calls: AtomicUsize,
}

#[async_trait]
impl ReasoningClient for StageClient {
    async fn generate(&self, prompt: &str, _schema_hint: Option<&str>) -> ReasoningResult<String> {
        if prompt.starts_with("Analyze this user profile") {
            self.profile_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(json!({
                "risk_tolerance": 0.6,
                "time_horizon_preference": "medium",
                "value_priorities": ["career", "freedom"],
                "decision_patterns": {"style": "analytical"},
                "emotional_drivers": ["growth"]
            })
            .to_string());
        }

        if prompt.starts_with("Simulate the") {
            if self.fail_simulation.load(Ordering::SeqCst) {
                return Ok("The future is too uncertain to simulate.".to_string());
            }
            return Ok(json!({
                "decision_path": "Take the offer and negotiate",
                "outcomes": {"career": "senior role", "finance": "equity"},
                "probability": 0.55,
                "key_events": ["Offer signed"],
                "risks": ["Runway"],
                "opportunities": ["Equity upside"]
            })
            .to_string());
        }

        if prompt.starts_with("Analyze these future scenarios") {
            self.analysis_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_analysis.load(Ordering::SeqCst) {
                return Ok("I would rather not commit to a recommendation.".to_string());
            }
            return Ok(json!({
                "recommended_scenario": "1yr_realistic",
                "alignment_scores": {"1yr_realistic": 0.8},
                "trade_offs": ["risk vs reward"],
                "risk_assessment": "Moderate",
                "opportunity_assessment": "Strong"
            })
            .to_string());
        }

        if prompt.starts_with("Based on this analysis") {
            return Ok(json!({
                "recommendation": "Accept the offer",
                "action_plan": {"30_days": ["Negotiate equity"]},
                "warning_signs": ["Funding delays"],
                "success_indicators": ["Revenue growth"],
                "contingency_plans": ["Return to consulting"]
            })
            .to_string());
        }

        Ok("{}".to_string())
    }
}

fn fast_config() -> RequestConfig {
    RequestConfig {
        timeout_ms: 1000,
        max_attempts: 2,
        retry_delay_ms: 1,
        max_delay_ms: 2,
    }
}

fn orchestrator_with(client: Arc<StageClient>, memory: Arc<dyn MemoryBank>) -> Orchestrator {
    Orchestrator::new(
        client,
        memory,
        fast_config(),
        SimulationConfig { max_concurrency: 3 },
    )
}

fn profile() -> serde_json::Value {
    json!({"user_id": "u1", "age": 29, "current_role": "engineer"})
}

const DECISION: &str = "Should I accept the startup offer?";

#[tokio::test]
async fn test_full_run_reaches_complete() {
    let memory: Arc<dyn MemoryBank> = Arc::new(SqliteMemoryBank::new_in_memory().await.unwrap());
    let client = Arc::new(StageClient::default());
    let orchestrator = orchestrator_with(client, memory.clone());

    let result = orchestrator
        .run(profile(), DECISION, &Timeline::defaults())
        .await
        .unwrap();

    assert!(result.is_complete());
    assert!(result.failure.is_none());
    assert!(result.decision_dna.is_some());
    assert_eq!(result.scenarios.len(), 9, "3 timelines x 3 variants");
    assert_eq!(
        result.analysis.as_ref().unwrap().recommended_scenario,
        "1yr_realistic"
    );
    assert!(result.advice.is_some());

    // The persisted copy matches the returned state and carries the stage log.
    let stored = memory.get_session(&result.session_id).await.unwrap().unwrap();
    assert_eq!(stored.state, PipelineState::Complete);
    assert!(!stored.conversation_history.is_empty());
    assert_eq!(stored.decision_text.as_deref(), Some(DECISION));
}

#[tokio::test]
async fn test_invalid_input_creates_no_session() {
    let memory: Arc<dyn MemoryBank> = Arc::new(SqliteMemoryBank::new_in_memory().await.unwrap());
    let client = Arc::new(StageClient::default());
    let orchestrator = orchestrator_with(client.clone(), memory.clone());

    let err = orchestrator
        .run(json!({"user_id": "u1"}), DECISION, &Timeline::defaults())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Pipeline(PipelineError::InvalidProfile { .. })
    ));

    let err = orchestrator
        .run(profile(), "short", &Timeline::defaults())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Pipeline(PipelineError::InvalidDecision { .. })
    ));

    assert!(memory.get_user_sessions("u1").await.unwrap().is_empty());
    assert_eq!(client.profile_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stage_failure_persists_partial_session() {
    let memory: Arc<dyn MemoryBank> = Arc::new(SqliteMemoryBank::new_in_memory().await.unwrap());
    let client = Arc::new(StageClient::default());
    client.fail_analysis.store(true, Ordering::SeqCst);
    let orchestrator = orchestrator_with(client.clone(), memory.clone());

    let result = orchestrator
        .run(profile(), DECISION, &Timeline::defaults())
        .await
        .unwrap();

    assert_eq!(
        result.state,
        PipelineState::Failed {
            stage: "analyze".to_string()
        }
    );
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.stage, "analyze");
    assert_eq!(failure.attempts, 2);
    assert!(failure.last_raw.is_some());

    // Everything committed before the failure survives.
    assert!(result.decision_dna.is_some());
    assert_eq!(result.scenarios.len(), 9);
    assert!(result.analysis.is_none());
    assert!(result.advice.is_none());

    let stored = memory.get_session(&result.session_id).await.unwrap().unwrap();
    assert_eq!(
        stored.state,
        PipelineState::Failed {
            stage: "analyze".to_string()
        }
    );
    assert_eq!(stored.scenarios.len(), 9);
}

#[tokio::test]
async fn test_all_simulation_cells_failing_keeps_cell_diagnostics() {
    let memory: Arc<dyn MemoryBank> = Arc::new(SqliteMemoryBank::new_in_memory().await.unwrap());
    let client = Arc::new(StageClient::default());
    client.fail_simulation.store(true, Ordering::SeqCst);
    let orchestrator = orchestrator_with(client, memory);

    let result = orchestrator
        .run(profile(), DECISION, &Timeline::defaults())
        .await
        .unwrap();

    assert_eq!(
        result.state,
        PipelineState::Failed {
            stage: "simulate".to_string()
        }
    );
    assert!(result.scenarios.is_empty());

    // Every cell's failure survives into the result, with its attempt count
    // and the raw payload that refused to parse.
    assert_eq!(result.failed_cells.len(), 9, "3 timelines x 3 variants");
    assert!(result.failed_cells.iter().all(|cell| cell.attempts == 2));
    assert!(result
        .failed_cells
        .iter()
        .all(|cell| cell.last_raw.as_deref() == Some("The future is too uncertain to simulate.")));

    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.stage, "simulate");
    assert_eq!(failure.attempts, 2);
    assert!(failure.last_raw.is_some());
}

#[tokio::test]
async fn test_resume_picks_up_at_failed_stage() {
    let memory: Arc<dyn MemoryBank> = Arc::new(SqliteMemoryBank::new_in_memory().await.unwrap());
    let client = Arc::new(StageClient::default());
    client.fail_analysis.store(true, Ordering::SeqCst);
    let orchestrator = orchestrator_with(client.clone(), memory.clone());

    let partial = orchestrator
        .run(profile(), DECISION, &Timeline::defaults())
        .await
        .unwrap();
    let profile_calls_before = client.profile_calls.load(Ordering::SeqCst);

    client.fail_analysis.store(false, Ordering::SeqCst);
    let resumed = orchestrator.resume(&partial.session_id).await.unwrap();

    assert!(resumed.is_complete());
    assert_eq!(resumed.session_id, partial.session_id);
    assert_eq!(resumed.scenarios.len(), 9);
    assert!(resumed.advice.is_some());

    // Earlier stages were not re-run.
    assert_eq!(
        client.profile_calls.load(Ordering::SeqCst),
        profile_calls_before,
        "resume must skip the committed profile stage"
    );
}

#[tokio::test]
async fn test_resume_of_complete_session_is_noop() {
    let memory: Arc<dyn MemoryBank> = Arc::new(SqliteMemoryBank::new_in_memory().await.unwrap());
    let client = Arc::new(StageClient::default());
    let orchestrator = orchestrator_with(client.clone(), memory.clone());

    let result = orchestrator
        .run(profile(), DECISION, &Timeline::defaults())
        .await
        .unwrap();
    let profile_calls = client.profile_calls.load(Ordering::SeqCst);
    let analysis_calls = client.analysis_calls.load(Ordering::SeqCst);

    let resumed = orchestrator.resume(&result.session_id).await.unwrap();

    assert!(resumed.is_complete());
    assert_eq!(client.profile_calls.load(Ordering::SeqCst), profile_calls);
    assert_eq!(client.analysis_calls.load(Ordering::SeqCst), analysis_calls);
}

#[tokio::test]
async fn test_resume_unknown_session() {
    let memory: Arc<dyn MemoryBank> = Arc::new(SqliteMemoryBank::new_in_memory().await.unwrap());
    let orchestrator = orchestrator_with(Arc::new(StageClient::default()), memory);

    let err = orchestrator.resume("no-such-session").await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Pipeline(PipelineError::SessionNotFound { .. })
    ));
}

#[tokio::test]
async fn test_cancellation_stops_before_first_stage() {
    let memory: Arc<dyn MemoryBank> = Arc::new(SqliteMemoryBank::new_in_memory().await.unwrap());
    let client = Arc::new(StageClient::default());
    let orchestrator = orchestrator_with(client.clone(), memory.clone());

    orchestrator.cancel_flag().cancel();

    let result = orchestrator
        .run(profile(), DECISION, &Timeline::defaults())
        .await
        .unwrap();

    assert_eq!(
        result.state,
        PipelineState::Failed {
            stage: "profile".to_string()
        }
    );
    assert!(result.failure.as_ref().unwrap().detail.contains("cancelled"));
    assert_eq!(client.profile_calls.load(Ordering::SeqCst), 0);

    // The honored request is consumed: the same orchestrator can resume the
    // cancelled session without a fresh cancel killing it again.
    assert!(!orchestrator.cancel_flag().is_cancelled());
    let resumed = orchestrator.resume(&result.session_id).await.unwrap();
    assert!(resumed.is_complete());
}

#[tokio::test]
async fn test_track_outcome_upserts_and_scores() {
    let memory: Arc<dyn MemoryBank> = Arc::new(SqliteMemoryBank::new_in_memory().await.unwrap());
    let orchestrator = orchestrator_with(Arc::new(StageClient::default()), memory.clone());

    let result = orchestrator
        .run(profile(), DECISION, &Timeline::defaults())
        .await
        .unwrap();

    let record = DecisionRecord::new(DECISION, "accept", "aligned with DNA")
        .with_predicted_scenario("1yr_realistic");
    let timestamp = record.timestamp;

    let tracked = orchestrator
        .track_outcome(&result.session_id, record)
        .await
        .unwrap();
    assert_eq!(tracked.record_count, 1);
    assert!(tracked.latest_accuracy.is_none());

    // Updating the same (decision, timestamp) with an observed outcome
    // overwrites rather than duplicating the record.
    let update = DecisionRecord::new(DECISION, "accept", "aligned with DNA")
        .with_predicted_scenario("1yr_realistic")
        .with_outcome(HashMap::from([(
            "career".to_string(),
            json!("senior role"),
        )]))
        .with_timestamp(timestamp);

    let tracked = orchestrator
        .track_outcome(&result.session_id, update)
        .await
        .unwrap();
    assert_eq!(tracked.record_count, 1);
    assert_eq!(tracked.latest_accuracy, Some(1.0));

    let stored = memory.get_session(&result.session_id).await.unwrap().unwrap();
    assert_eq!(stored.decision_history.len(), 1);
    assert_eq!(stored.decision_history[0].accuracy, Some(1.0));
}

#[tokio::test]
async fn test_reprofile_keeps_audit_trail_and_reruns_downstream() {
    let memory: Arc<dyn MemoryBank> = Arc::new(SqliteMemoryBank::new_in_memory().await.unwrap());
    let client = Arc::new(StageClient::default());
    let orchestrator = orchestrator_with(client.clone(), memory.clone());

    let first = orchestrator
        .run(profile(), DECISION, &Timeline::defaults())
        .await
        .unwrap();
    let profile_calls = client.profile_calls.load(Ordering::SeqCst);

    let second = orchestrator.reprofile(&first.session_id).await.unwrap();

    assert!(second.is_complete());
    assert_eq!(second.session_id, first.session_id);
    assert!(
        client.profile_calls.load(Ordering::SeqCst) > profile_calls,
        "reprofile must call the profile stage again"
    );

    let stored = memory.get_session(&first.session_id).await.unwrap().unwrap();
    let superseded = stored
        .conversation_history
        .iter()
        .any(|entry| entry.content.get("superseded_dna").is_some());
    assert!(superseded, "the replaced DNA must stay in the history");
}
