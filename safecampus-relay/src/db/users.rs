//! User directory queries
//!
//! Minimal profile directory backing friends-by-email lookup and presence
//! side effects. Identity issuance itself lives outside the relay.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Pool, Row, Sqlite};

use crate::error::Result;

/// One directory row
#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub user_id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub is_active: bool,
    pub last_seen: DateTime<Utc>,
}

/// Create or refresh a user profile
pub async fn upsert(
    db: &Pool<Sqlite>,
    user_id: &str,
    email: &str,
    name: &str,
    phone: Option<&str>,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO users (user_id, email, name, phone, is_active, joined_at, last_seen)
        VALUES (?, ?, ?, ?, 1, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            email = excluded.email,
            name = excluded.name,
            phone = excluded.phone,
            is_active = 1,
            last_seen = excluded.last_seen
        "#,
    )
    .bind(user_id)
    .bind(email)
    .bind(name)
    .bind(phone)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;
    Ok(())
}

/// Look a user up by email (friends-add path)
pub async fn find_by_email(db: &Pool<Sqlite>, email: &str) -> Result<Option<UserRecord>> {
    let row = sqlx::query(
        "SELECT user_id, email, name, phone, is_active, last_seen FROM users WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(db)
    .await?;

    row.map(|row| {
        Ok(UserRecord {
            user_id: row.try_get("user_id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            phone: row.try_get("phone")?,
            is_active: row.try_get::<i64, _>("is_active")? != 0,
            last_seen: row.try_get("last_seen")?,
        })
    })
    .transpose()
}

/// Fetch one user by id
pub async fn find_by_id(db: &Pool<Sqlite>, user_id: &str) -> Result<Option<UserRecord>> {
    let row = sqlx::query(
        "SELECT user_id, email, name, phone, is_active, last_seen FROM users WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?;

    row.map(|row| {
        Ok(UserRecord {
            user_id: row.try_get("user_id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            phone: row.try_get("phone")?,
            is_active: row.try_get::<i64, _>("is_active")? != 0,
            last_seen: row.try_get("last_seen")?,
        })
    })
    .transpose()
}

/// Presence side effect when a user's last connection drops (or activity
/// is observed): flips the active flag and stamps last-seen.
pub async fn set_active(db: &Pool<Sqlite>, user_id: &str, active: bool) -> Result<()> {
    sqlx::query("UPDATE users SET is_active = ?, last_seen = ? WHERE user_id = ?")
        .bind(active as i64)
        .bind(Utc::now())
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}
