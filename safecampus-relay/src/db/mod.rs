//! Database access layer
//!
//! SQLite via sqlx. Each submodule is a query façade over one concern;
//! schema creation is idempotent and runs once at startup. A failure to
//! open or migrate the store is process-fatal by design.

pub mod feedback;
pub mod friends;
pub mod messages;
pub mod reports;
pub mod users;
pub mod verification;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::info;

use crate::error::{Error, Result};

/// Open (creating if missing) the relay database
pub async fn connect(db_path: &str) -> Result<Pool<Sqlite>> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path))
        .map_err(|e| Error::Config(format!("invalid database path {}: {}", db_path, e)))?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    info!("Connected to database at {}", db_path);
    Ok(pool)
}

/// Create all required tables and indexes if they do not exist
pub async fn initialize_schema(pool: &Pool<Sqlite>) -> Result<()> {
    info!("Initializing database schema");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reports (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            user_name TEXT NOT NULL,
            user_phone TEXT,
            description TEXT NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            address TEXT,
            campus TEXT,
            category TEXT NOT NULL,
            evidence_images TEXT NOT NULL DEFAULT '[]',
            confidence INTEGER NOT NULL,
            status TEXT NOT NULL,
            priority TEXT NOT NULL,
            verification_tag TEXT NOT NULL,
            explanation TEXT NOT NULL DEFAULT '',
            resolution TEXT,
            resolved_by TEXT,
            resolved_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reports_created_at ON reports (created_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reports_status ON reports (status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reports_confidence ON reports (confidence)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            phone TEXT,
            is_active INTEGER NOT NULL DEFAULT 0,
            joined_at TEXT NOT NULL,
            last_seen TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS friends (
            user_id TEXT NOT NULL,
            friend_id TEXT NOT NULL,
            friend_name TEXT NOT NULL,
            friend_email TEXT NOT NULL,
            friend_username TEXT NOT NULL,
            profile_color TEXT NOT NULL DEFAULT 'blue',
            status TEXT NOT NULL DEFAULT 'accepted',
            added_at TEXT NOT NULL,
            PRIMARY KEY (user_id, friend_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            sender_id TEXT NOT NULL,
            sender_name TEXT NOT NULL,
            recipient_id TEXT NOT NULL,
            body TEXT NOT NULL,
            message_type TEXT NOT NULL DEFAULT 'text',
            is_read INTEGER NOT NULL DEFAULT 0,
            read_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_pair ON messages (sender_id, recipient_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feedback (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            report_id TEXT NOT NULL,
            report_text TEXT NOT NULL,
            vote TEXT NOT NULL,
            voter_id TEXT,
            location TEXT,
            confirmed_real INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_feedback_report ON feedback (report_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS verification_codes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL,
            code TEXT NOT NULL,
            purpose TEXT NOT NULL DEFAULT 'email_verification',
            expires_at TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 3,
            is_used INTEGER NOT NULL DEFAULT 0,
            used_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_verification_email ON verification_codes (email, created_at DESC)")
        .execute(pool)
        .await?;

    info!("Database schema ready");
    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> Pool<Sqlite> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    initialize_schema(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_initialization_is_idempotent() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        initialize_schema(&pool).await.unwrap();
        initialize_schema(&pool).await.unwrap();

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='reports')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(exists);
    }
}
