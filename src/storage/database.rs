use crate::models::{ChatMessage, Message, Role, Session};
use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::path::Path;

/// Conversation store. Exclusively owns the `sessions` and `messages`
/// tables; the pipeline and gateway only go through these operations.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database under the app data dir.
    pub async fn init(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("chat_history.db");

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .foreign_keys(true);

        Self::open(options).await
    }

    /// Open with explicit connect options. Used by `init` and by tests.
    pub async fn open(options: SqliteConnectOptions) -> Result<Self> {
        let pool = SqlitePool::connect_with(options).await?;
        ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// All sessions, most recent first.
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(
            "SELECT id, title, created_at FROM sessions ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    /// Insert a new session and return its assigned id.
    pub async fn create_session(&self, title: Option<&str>) -> Result<i64> {
        let result = sqlx::query("INSERT INTO sessions (title, created_at) VALUES (?, ?)")
            .bind(title.unwrap_or("New Chat"))
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn session_exists(&self, session_id: i64) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    /// Ordered history for a session. Message ids define conversation order.
    pub async fn get_history(&self, session_id: i64) -> Result<Vec<ChatMessage>> {
        let messages = sqlx::query_as::<_, ChatMessage>(
            "SELECT role, content FROM messages WHERE session_id = ? ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    /// Append a message to a session. Fails if the session no longer exists
    /// (foreign keys are enforced), so a delete cannot be resurrected.
    pub async fn append_message(&self, session_id: i64, role: Role, content: &str) -> Result<Message> {
        let created_at = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO messages (session_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(role)
        .bind(content)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Message {
            id: result.last_insert_rowid(),
            session_id,
            role,
            content: content.to_string(),
            created_at,
        })
    }

    /// Delete a session and all of its messages.
    pub async fn delete_session(&self, session_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete every session and message.
    pub async fn clear_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM messages").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM sessions").execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }
}

/// Probe for the expected message schema and create the tables.
///
/// If the probe fails (missing table or a pre-session-column layout) both
/// tables are dropped and recreated. This is an irreversible
/// migration-by-reset; existing history is discarded.
async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    let probe = sqlx::query("SELECT session_id FROM messages LIMIT 1")
        .fetch_optional(pool)
        .await;

    if let Err(e) = probe {
        tracing::warn!("message schema probe failed, resetting tables: {}", e);
        sqlx::query("DROP TABLE IF EXISTS messages").execute(pool).await?;
        sqlx::query("DROP TABLE IF EXISTS sessions").execute(pool).await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL REFERENCES sessions(id),
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
