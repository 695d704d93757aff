//! # FutureYou
//!
//! A decision-simulation pipeline that turns a user profile and a decision
//! into parallel future scenarios, comparative analysis and actionable
//! advice, with every model call wrapped in bounded retries and every stage
//! boundary persisted to SQLite.
//!
//! ## Pipeline
//!
//! ```text
//! profile → simulate (fan-out per timeline × variant) → analyze → advise
//!                     ↓
//!               SQLite (sessions)
//! ```
//!
//! Each stage is one (or, for simulation, many parallel) structured calls to
//! a reasoning model. A stage that exhausts its retries leaves the session
//! stored as `failed:<stage>`; [`pipeline::Orchestrator::resume`] picks a
//! failed session up from the stage that stopped it.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use futureyou::config::Config;
//! use futureyou::pipeline::Orchestrator;
//! use futureyou::reasoning::GeminiClient;
//! use futureyou::storage::{SqliteMemoryBank, Timeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let memory = Arc::new(SqliteMemoryBank::new(&config.database).await?);
//!     let client = Arc::new(GeminiClient::new(&config.gemini, &config.request)?);
//!     let orchestrator =
//!         Orchestrator::new(client, memory, config.request, config.simulation);
//!
//!     let result = orchestrator
//!         .run(
//!             serde_json::json!({"user_id": "u1", "age": 29, "current_role": "engineer"}),
//!             "Should I accept the startup offer?",
//!             &Timeline::defaults(),
//!         )
//!         .await?;
//!
//!     println!("{}", result.state);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Configuration management loaded from environment variables.
pub mod config;
/// Error types and result aliases for each layer.
pub mod error;
/// Pipeline orchestration and the session state machine.
pub mod pipeline;
/// Stage prompts and response schema hints.
pub mod prompts;
/// Reasoning client abstraction, Gemini client and the resilient caller.
pub mod reasoning;
/// Stage implementations: profile, simulate, analyze, advise, track.
pub mod stages;
/// Session records and the memory bank persistence layer.
pub mod storage;
/// Input validation for profiles, decisions and timeline sets.
pub mod validate;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use pipeline::{CancelFlag, Orchestrator, SessionResult, StageFailure};
