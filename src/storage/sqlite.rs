use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::info;

use super::{MemoryBank, PipelineState, Session};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed memory bank
#[derive(Clone)]
pub struct SqliteMemoryBank {
    pool: SqlitePool,
}

impl SqliteMemoryBank {
    /// Create a new SQLite memory bank backed by a database file
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let bank = Self { pool };
        bank.run_migrations().await?;

        Ok(bank)
    }

    /// Create an in-memory memory bank (for tests)
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        // A single connection keeps the in-memory database alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let bank = Self { pool };
        bank.run_migrations().await?;

        Ok(bank)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration {
                message: format!("Failed to run migrations: {}", e),
            })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl MemoryBank for SqliteMemoryBank {
    async fn save_session(&self, session: &Session) -> StorageResult<()> {
        let user_profile = serde_json::to_string(&session.user_profile)?;
        let timelines = serde_json::to_string(&session.timelines)?;
        let decision_dna = session
            .decision_dna
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let scenarios = serde_json::to_string(&session.scenarios)?;
        let analysis = session
            .analysis
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let advice = session
            .advice
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let decision_history = serde_json::to_string(&session.decision_history)?;
        let conversation_history = serde_json::to_string(&session.conversation_history)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO sessions (
                session_id, user_id, user_profile, decision_text, timelines,
                decision_dna, scenarios, analysis, advice, decision_history,
                conversation_history, state, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.session_id)
        .bind(session.user_id())
        .bind(&user_profile)
        .bind(&session.decision_text)
        .bind(&timelines)
        .bind(&decision_dna)
        .bind(&scenarios)
        .bind(&analysis)
        .bind(&advice)
        .bind(&decision_history)
        .bind(&conversation_history)
        .bind(session.state.to_string())
        .bind(session.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> StorageResult<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT session_id, user_profile, decision_text, timelines,
                   decision_dna, scenarios, analysis, advice, decision_history,
                   conversation_history, state, created_at
            FROM sessions
            WHERE session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Session::try_from).transpose()
    }

    async fn get_user_sessions(&self, user_id: &str) -> StorageResult<Vec<Session>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT session_id, user_profile, decision_text, timelines,
                   decision_dna, scenarios, analysis, advice, decision_history,
                   conversation_history, state, created_at
            FROM sessions
            WHERE user_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Session::try_from).collect()
    }

    async fn delete_session(&self, session_id: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Raw database row for a session
#[derive(FromRow)]
struct SessionRow {
    session_id: String,
    user_profile: String,
    decision_text: Option<String>,
    timelines: String,
    decision_dna: Option<String>,
    scenarios: String,
    analysis: Option<String>,
    advice: Option<String>,
    decision_history: String,
    conversation_history: String,
    state: String,
    created_at: String,
}

impl TryFrom<SessionRow> for Session {
    type Error = StorageError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let state = PipelineState::from_str(&row.state)
            .map_err(|message| StorageError::Query { message })?;

        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| StorageError::Query {
                message: format!("Invalid created_at timestamp: {}", e),
            })?
            .with_timezone(&Utc);

        Ok(Session {
            session_id: row.session_id,
            user_profile: serde_json::from_str(&row.user_profile)?,
            decision_text: row.decision_text,
            timelines: serde_json::from_str(&row.timelines)?,
            decision_dna: row
                .decision_dna
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            scenarios: serde_json::from_str(&row.scenarios)?,
            analysis: row
                .analysis
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            advice: row
                .advice
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            decision_history: serde_json::from_str(&row.decision_history)?,
            conversation_history: serde_json::from_str(&row.conversation_history)?,
            state,
            created_at,
        })
    }
}
