use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

use super::{AnalysisRecord, Campaign, Role, Session, SessionStatus, Stage, Storage, Turn};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const SESSION_COLUMNS: &str = "id, theme, status, mode, share_token, user_id, campaign_id, \
     respondent_name, respondent_feedback, is_public, created_at, updated_at";

/// Pipeline rank of the stored status, matching `SessionStatus::rank`.
const STATUS_RANK: &str = "CASE status \
     WHEN 'interviewing' THEN 0 WHEN 'analyzed' THEN 1 WHEN 'hypothesized' THEN 2 \
     WHEN 'prd_generated' THEN 3 WHEN 'spec_generated' THEN 4 \
     WHEN 'readiness_checked' THEN 5 WHEN 'respondent_done' THEN 6 END";

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                    message: format!("Failed to create database directory: {}", e),
                })?;
            }
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create an in-memory instance backed by a single, never-recycled
    /// connection (each SQLite connection would otherwise see its own database).
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    async fn ensure_session_exists(&self, id: &str) -> StorageResult<()> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match found {
            Some(_) => Ok(()),
            None => Err(StorageError::SessionNotFound {
                session_id: id.to_string(),
            }),
        }
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_session(&self, session: &Session) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, theme, status, mode, share_token, user_id, campaign_id,
                                  respondent_name, respondent_feedback, is_public, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.theme)
        .bind(session.status.as_str())
        .bind(session.mode.as_str())
        .bind(&session.share_token)
        .bind(&session.user_id)
        .bind(&session.campaign_id)
        .bind(&session.respondent_name)
        .bind(&session.respondent_feedback)
        .bind(session.is_public)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session(&self, id: &str) -> StorageResult<Option<Session>> {
        let row: Option<SessionRow> =
            sqlx::query_as(&format!("SELECT {} FROM sessions WHERE id = ?", SESSION_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn get_session_by_token(&self, token: &str) -> StorageResult<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM sessions WHERE share_token = ?",
            SESSION_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn advance_status(&self, id: &str, next: SessionStatus) -> StorageResult<bool> {
        let result = sqlx::query(&format!(
            "UPDATE sessions SET status = ?, updated_at = ? WHERE id = ? AND {} < ?",
            STATUS_RANK
        ))
        .bind(next.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .bind(i64::from(next.rank()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        self.ensure_session_exists(id).await?;
        Ok(false)
    }

    async fn set_visibility(&self, id: &str, is_public: bool) -> StorageResult<()> {
        let result = sqlx::query("UPDATE sessions SET is_public = ?, updated_at = ? WHERE id = ?")
            .bind(is_public)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::SessionNotFound {
                session_id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn set_feedback(&self, id: &str, feedback: &str) -> StorageResult<()> {
        let result =
            sqlx::query("UPDATE sessions SET respondent_feedback = ?, updated_at = ? WHERE id = ?")
                .bind(feedback)
                .bind(Utc::now().to_rfc3339())
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::SessionNotFound {
                session_id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> StorageResult<()> {
        // Cascades to turns and analysis_results
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_sessions_by_owner(&self, user_id: &str) -> StorageResult<Vec<Session>> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM sessions WHERE user_id = ? ORDER BY created_at DESC",
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn count_sessions_by_owner(&self, user_id: &str) -> StorageResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn list_campaign_sessions(&self, campaign_id: &str) -> StorageResult<Vec<Session>> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM sessions WHERE campaign_id = ? ORDER BY created_at ASC",
            SESSION_COLUMNS
        ))
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn append_turn(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> StorageResult<Turn> {
        let created_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO turns (session_id, role, content, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Turn {
            id: result.last_insert_rowid(),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            created_at,
        })
    }

    async fn get_turns(&self, session_id: &str) -> StorageResult<Vec<Turn>> {
        let rows: Vec<TurnRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, role, content, created_at
            FROM turns
            WHERE session_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn count_user_turns(&self, session_id: &str) -> StorageResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM turns WHERE session_id = ? AND role = 'user'")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.max(0) as u64)
    }

    async fn upsert_result(&self, record: &AnalysisRecord) -> StorageResult<()> {
        let payload = serde_json::to_string(&record.payload).map_err(|e| StorageError::Query {
            message: format!("Failed to serialize payload: {}", e),
        })?;

        sqlx::query(
            r#"
            INSERT INTO analysis_results (session_id, stage, payload, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(session_id, stage) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.session_id)
        .bind(record.stage.as_str())
        .bind(&payload)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_result(
        &self,
        session_id: &str,
        stage: Stage,
    ) -> StorageResult<Option<AnalysisRecord>> {
        let row: Option<ResultRow> = sqlx::query_as(
            r#"
            SELECT session_id, stage, payload, created_at, updated_at
            FROM analysis_results
            WHERE session_id = ? AND stage = ?
            "#,
        )
        .bind(session_id)
        .bind(stage.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|r| r.into_record()))
    }

    async fn get_results(&self, session_id: &str) -> StorageResult<Vec<AnalysisRecord>> {
        let rows: Vec<ResultRow> = sqlx::query_as(
            r#"
            SELECT session_id, stage, payload, created_at, updated_at
            FROM analysis_results
            WHERE session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        let mut records: Vec<AnalysisRecord> =
            rows.into_iter().filter_map(|r| r.into_record()).collect();
        records.sort_by_key(|r| Stage::ALL.iter().position(|s| *s == r.stage));
        Ok(records)
    }

    async fn create_campaign(&self, campaign: &Campaign) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO campaigns (id, theme, owner_session_id, share_token, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&campaign.id)
        .bind(&campaign.theme)
        .bind(&campaign.owner_session_id)
        .bind(&campaign.share_token)
        .bind(campaign.created_at.to_rfc3339())
        .bind(campaign.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_campaign(&self, id: &str) -> StorageResult<Option<Campaign>> {
        let row: Option<CampaignRow> = sqlx::query_as(
            r#"
            SELECT id, theme, owner_session_id, share_token, created_at, updated_at
            FROM campaigns
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn get_campaign_by_token(&self, token: &str) -> StorageResult<Option<Campaign>> {
        let row: Option<CampaignRow> = sqlx::query_as(
            r#"
            SELECT id, theme, owner_session_id, share_token, created_at, updated_at
            FROM campaigns
            WHERE share_token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn get_campaign_by_owner_session(
        &self,
        session_id: &str,
    ) -> StorageResult<Option<Campaign>> {
        let row: Option<CampaignRow> = sqlx::query_as(
            r#"
            SELECT id, theme, owner_session_id, share_token, created_at, updated_at
            FROM campaigns
            WHERE owner_session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    theme: String,
    status: String,
    mode: String,
    share_token: Option<String>,
    user_id: Option<String>,
    campaign_id: Option<String>,
    respondent_name: Option<String>,
    respondent_feedback: Option<String>,
    is_public: bool,
    created_at: String,
    updated_at: String,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            theme: row.theme,
            status: row.status.parse().unwrap_or_default(),
            mode: row.mode.parse().unwrap_or_default(),
            share_token: row.share_token,
            user_id: row.user_id,
            campaign_id: row.campaign_id,
            respondent_name: row.respondent_name,
            respondent_feedback: row.respondent_feedback,
            is_public: row.is_public,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct TurnRow {
    id: i64,
    session_id: String,
    role: String,
    content: String,
    created_at: String,
}

impl From<TurnRow> for Turn {
    fn from(row: TurnRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            role: row.role.parse().unwrap_or(Role::User),
            content: row.content,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ResultRow {
    session_id: String,
    stage: String,
    payload: String,
    created_at: String,
    updated_at: String,
}

impl ResultRow {
    /// Rows with an unknown stage tag are skipped.
    fn into_record(self) -> Option<AnalysisRecord> {
        let stage = self.stage.parse().ok()?;
        Some(AnalysisRecord {
            session_id: self.session_id,
            stage,
            payload: serde_json::from_str(&self.payload)
                .unwrap_or(serde_json::Value::String(self.payload)),
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct CampaignRow {
    id: String,
    theme: String,
    owner_session_id: Option<String>,
    share_token: String,
    created_at: String,
    updated_at: String,
}

impl From<CampaignRow> for Campaign {
    fn from(row: CampaignRow) -> Self {
        Self {
            id: row.id,
            theme: row.theme,
            owner_session_id: row.owner_session_id,
            share_token: row.share_token,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}
