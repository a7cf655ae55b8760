//! Data Access Layer
//!
//! Postgres persistence for dialog sessions. Each session is one JSONB
//! document keyed by its opaque session id, written with an upsert at every
//! turn boundary. Queries use runtime binding so the crate builds without a
//! live database; the schema lives in `migrations/`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use mentor_core::state::SessionState;
use mentor_core::store::SessionStore;
use sqlx::{PgPool, Row};

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Retrieves the persisted state document for a session.
    pub async fn load_state(&self, session_id: &str) -> Result<Option<SessionState>> {
        let row = sqlx::query("SELECT state_json FROM dialog_sessions WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query session state")?;

        match row {
            Some(row) => {
                let value: serde_json::Value = row.try_get("state_json")?;
                let state = serde_json::from_value(value)
                    .context("Persisted session state did not deserialize")?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Writes the state document for a session, inserting or replacing.
    pub async fn save_state(&self, session_id: &str, state: &SessionState) -> Result<()> {
        let state_json = serde_json::to_value(state)?;
        sqlx::query(
            r#"
            INSERT INTO dialog_sessions (session_id, state_json)
            VALUES ($1, $2)
            ON CONFLICT (session_id)
            DO UPDATE SET state_json = EXCLUDED.state_json, updated_at = now()
            "#,
        )
        .bind(session_id)
        .bind(state_json)
        .execute(&self.pool)
        .await
        .context("Failed to persist session state")?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for Db {
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        self.load_state(session_id).await
    }

    async fn save(&self, session_id: &str, state: &SessionState) -> Result<()> {
        self.save_state(session_id, state).await
    }
}
