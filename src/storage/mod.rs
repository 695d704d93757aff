//! Session records and the persistence boundary.
//!
//! This module defines the durable data model (decision DNA, scenarios,
//! analysis, advice, decision records and the session that groups them) plus
//! the [`MemoryBank`] trait that owns the durable copy of each session.

mod sqlite;

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

pub use sqlite::SqliteMemoryBank;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;

/// Preferred planning horizon extracted from a user profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeHorizon {
    /// Prefers near-term payoffs.
    Short,
    /// Balanced horizon.
    #[default]
    Medium,
    /// Prefers long-term payoffs.
    Long,
}

impl std::fmt::Display for TimeHorizon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeHorizon::Short => write!(f, "short"),
            TimeHorizon::Medium => write!(f, "medium"),
            TimeHorizon::Long => write!(f, "long"),
        }
    }
}

impl std::str::FromStr for TimeHorizon {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "short" => Ok(TimeHorizon::Short),
            "medium" => Ok(TimeHorizon::Medium),
            "long" => Ok(TimeHorizon::Long),
            _ => Err(format!("Unknown time horizon: {}", s)),
        }
    }
}

/// A user's decision-making pattern extracted by the profile stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionDNA {
    /// Risk tolerance on a 0..1 scale (clamped on parse).
    pub risk_tolerance: f64,
    /// Preferred planning horizon.
    pub time_horizon_preference: TimeHorizon,
    /// Value priorities, highest first; never empty.
    pub value_priorities: Vec<String>,
    /// How the user typically decides (free-form structured analysis).
    pub decision_patterns: HashMap<String, serde_json::Value>,
    /// What motivates the user.
    pub emotional_drivers: Vec<String>,
}

/// One of the three fixed scenario framings generated per timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Best plausible outcome.
    Optimistic,
    /// Most likely outcome.
    Realistic,
    /// Worst plausible outcome.
    Pessimistic,
}

impl Variant {
    /// All variants in their fixed output order.
    pub const ALL: [Variant; 3] = [Variant::Optimistic, Variant::Realistic, Variant::Pessimistic];
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Optimistic => write!(f, "optimistic"),
            Variant::Realistic => write!(f, "realistic"),
            Variant::Pessimistic => write!(f, "pessimistic"),
        }
    }
}

impl std::str::FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "optimistic" => Ok(Variant::Optimistic),
            "realistic" => Ok(Variant::Realistic),
            "pessimistic" => Ok(Variant::Pessimistic),
            _ => Err(format!("Unknown variant: {}", s)),
        }
    }
}

/// A labeled future horizon (e.g. "1yr") for which scenarios are generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeline(String);

impl Timeline {
    /// Create a timeline from a label; surrounding whitespace is trimmed.
    pub fn new(label: impl Into<String>) -> Self {
        Timeline(label.into().trim().to_string())
    }

    /// The timeline label.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Default timeline set: one, three and five years out.
    pub fn defaults() -> Vec<Timeline> {
        vec![Timeline::new("1yr"), Timeline::new("3yr"), Timeline::new("5yr")]
    }
}

impl std::fmt::Display for Timeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A simulated future scenario for one (timeline, variant) cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique id within the session, `"{timeline}_{variant}"`.
    pub scenario_id: String,
    /// Timeline this scenario belongs to.
    pub timeline: Timeline,
    /// Framing of this scenario.
    pub variant: Variant,
    /// Specific actions taken in this future.
    pub decision_path: String,
    /// Concrete results by life category (career, finance, ...).
    pub outcomes: HashMap<String, serde_json::Value>,
    /// Independent likelihood estimate, 0..1. Probabilities are not a
    /// distribution across variants and need not sum to 1.
    pub probability: f64,
    /// Major milestones along this path.
    pub key_events: Vec<String>,
    /// Potential problems.
    pub risks: Vec<String>,
    /// Potential gains.
    pub opportunities: Vec<String>,
}

impl Scenario {
    /// The id a scenario in the given cell will carry.
    pub fn id_for(timeline: &Timeline, variant: Variant) -> String {
        format!("{}_{}", timeline, variant)
    }
}

/// A (timeline, variant) simulation cell whose call exhausted its retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellFailure {
    /// Timeline of the failed cell.
    pub timeline: Timeline,
    /// Variant of the failed cell.
    pub variant: Variant,
    /// Attempts made before giving up.
    pub attempts: u32,
    /// Description of the last error.
    pub error: String,
    /// Last raw model response for this cell, when one was received.
    pub last_raw: Option<String>,
}

/// Cross-scenario comparison produced by the analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Id of the scenario best aligned with the user's DNA; always one of the
    /// input scenario ids.
    pub recommended_scenario: String,
    /// Per-scenario alignment against the DNA, 0..1, keyed by scenario id.
    pub alignment_scores: HashMap<String, f64>,
    /// What the user gains vs loses on each path.
    pub trade_offs: Vec<String>,
    /// Comprehensive risk assessment across scenarios.
    pub risk_assessment: String,
    /// Key opportunities across scenarios.
    pub opportunity_assessment: String,
}

/// Actionable advice produced by the advisor stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    /// The recommendation with its reasoning.
    pub recommendation: String,
    /// Staged action plan keyed by horizon bucket (e.g. "30_days"); at least
    /// one bucket.
    pub action_plan: BTreeMap<String, Vec<String>>,
    /// Signals that the chosen path is going wrong; at least one.
    pub warning_signs: Vec<String>,
    /// Signals that the chosen path is working.
    pub success_indicators: Vec<String>,
    /// Fallback plans if things go wrong.
    pub contingency_plans: Vec<String>,
}

/// A tracked decision with its (optionally observed) outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// The decision text.
    pub decision: String,
    /// The path the user chose.
    pub chosen_path: String,
    /// Why they chose it.
    pub reasoning: String,
    /// Scenario id the user expected to play out, if any.
    pub predicted_scenario: Option<String>,
    /// Observed outcome by category, filled in later.
    pub actual_outcome: Option<HashMap<String, serde_json::Value>>,
    /// Accuracy of the prediction once an outcome is observed, 0..1.
    pub accuracy: Option<f64>,
    /// When the decision was made. Together with `decision` this is the
    /// upsert key for outcome updates.
    pub timestamp: DateTime<Utc>,
}

impl DecisionRecord {
    /// Create a record for a decision made now.
    pub fn new(
        decision: impl Into<String>,
        chosen_path: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            decision: decision.into(),
            chosen_path: chosen_path.into(),
            reasoning: reasoning.into(),
            predicted_scenario: None,
            actual_outcome: None,
            accuracy: None,
            timestamp: Utc::now(),
        }
    }

    /// Set the predicted scenario id.
    pub fn with_predicted_scenario(mut self, scenario_id: impl Into<String>) -> Self {
        self.predicted_scenario = Some(scenario_id.into());
        self
    }

    /// Set the observed outcome.
    pub fn with_outcome(mut self, outcome: HashMap<String, serde_json::Value>) -> Self {
        self.actual_outcome = Some(outcome);
        self
    }

    /// Override the timestamp (outcome updates must reuse the original one).
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Direction of a conversation history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Stage input (prompt material).
    Input,
    /// Stage output (parsed result).
    Output,
}

/// One entry in the append-only stage I/O log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// Stage that produced the entry.
    pub stage: String,
    /// Whether this was the stage's input or output.
    pub direction: Direction,
    /// The logged content.
    pub content: serde_json::Value,
    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Pipeline position of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Session created, no stage has run.
    #[default]
    Created,
    /// Decision DNA extracted.
    Profiled,
    /// Scenarios generated.
    Simulated,
    /// Analysis completed.
    Analyzed,
    /// Advice generated.
    Advised,
    /// Pipeline finished.
    Complete,
    /// A stage failed after retries were exhausted.
    Failed {
        /// Name of the failed stage.
        stage: String,
    },
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Created => write!(f, "created"),
            PipelineState::Profiled => write!(f, "profiled"),
            PipelineState::Simulated => write!(f, "simulated"),
            PipelineState::Analyzed => write!(f, "analyzed"),
            PipelineState::Advised => write!(f, "advised"),
            PipelineState::Complete => write!(f, "complete"),
            PipelineState::Failed { stage } => write!(f, "failed:{}", stage),
        }
    }
}

impl std::str::FromStr for PipelineState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(stage) = s.strip_prefix("failed:") {
            return Ok(PipelineState::Failed {
                stage: stage.to_string(),
            });
        }
        match s.to_lowercase().as_str() {
            "created" => Ok(PipelineState::Created),
            "profiled" => Ok(PipelineState::Profiled),
            "simulated" => Ok(PipelineState::Simulated),
            "analyzed" => Ok(PipelineState::Analyzed),
            "advised" => Ok(PipelineState::Advised),
            "complete" => Ok(PipelineState::Complete),
            _ => Err(format!("Unknown pipeline state: {}", s)),
        }
    }
}

/// The durable unit of state for one decision-simulation run.
///
/// The orchestrator mutates a session in place during a pipeline run; the
/// memory bank owns the durable copy and persists it after every committed
/// stage, so a crash mid-pipeline leaves a recoverable partial session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier, generated at creation.
    pub session_id: String,
    /// Immutable snapshot of the user profile input.
    pub user_profile: serde_json::Value,
    /// The decision being simulated; stored so a failed session can resume.
    pub decision_text: Option<String>,
    /// Timeline set for this run; stored so a failed session can resume.
    pub timelines: Vec<Timeline>,
    /// Extracted decision DNA; absent until the profile stage completes.
    pub decision_dna: Option<DecisionDNA>,
    /// Scenarios, growing monotonically during simulation.
    pub scenarios: Vec<Scenario>,
    /// Cross-scenario analysis, set once.
    pub analysis: Option<Analysis>,
    /// Personalized advice, set once.
    pub advice: Option<Advice>,
    /// Tracked decisions and their outcomes.
    pub decision_history: Vec<DecisionRecord>,
    /// Append-only log of stage inputs and outputs for traceability.
    pub conversation_history: Vec<ConversationEntry>,
    /// Current pipeline position.
    pub state: PipelineState,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session around a user profile snapshot
    pub fn new(user_profile: serde_json::Value) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_profile,
            decision_text: None,
            timelines: Vec::new(),
            decision_dna: None,
            scenarios: Vec::new(),
            analysis: None,
            advice: None,
            decision_history: Vec::new(),
            conversation_history: Vec::new(),
            state: PipelineState::Created,
            created_at: Utc::now(),
        }
    }

    /// The user id carried in the profile, if present.
    pub fn user_id(&self) -> Option<&str> {
        self.user_profile.get("user_id").and_then(|v| v.as_str())
    }

    /// Append a stage input to the conversation history.
    pub fn record_input(&mut self, stage: &str, content: serde_json::Value) {
        self.conversation_history.push(ConversationEntry {
            stage: stage.to_string(),
            direction: Direction::Input,
            content,
            recorded_at: Utc::now(),
        });
    }

    /// Append a stage output to the conversation history.
    pub fn record_output(&mut self, stage: &str, content: serde_json::Value) {
        self.conversation_history.push(ConversationEntry {
            stage: stage.to_string(),
            direction: Direction::Output,
            content,
            recorded_at: Utc::now(),
        });
    }
}

/// Persistence boundary for sessions.
///
/// The memory bank is the only component permitted to persist or load
/// sessions. `save_session` is an upsert; only one orchestrator is expected
/// to drive a given session at a time, so the last write wins.
#[async_trait]
pub trait MemoryBank: Send + Sync {
    /// Persist a session, inserting or replacing the stored copy.
    async fn save_session(&self, session: &Session) -> StorageResult<()>;
    /// Load a session by id.
    async fn get_session(&self, session_id: &str) -> StorageResult<Option<Session>>;
    /// Load all sessions belonging to a user, oldest first.
    async fn get_user_sessions(&self, user_id: &str) -> StorageResult<Vec<Session>>;
    /// Delete a session by id.
    async fn delete_session(&self, session_id: &str) -> StorageResult<()>;
}
