//! Friendship edge queries

use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};
use sqlx::sqlite::SqliteRow;

use safecampus_common::model::Friend;

use crate::error::{Error, Result};

/// Insert a friendship edge; duplicate edges are a validation error
pub async fn add(db: &Pool<Sqlite>, friend: &Friend) -> Result<()> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM friends WHERE user_id = ? AND friend_id = ?)",
    )
    .bind(&friend.user_id)
    .bind(&friend.friend_id)
    .fetch_one(db)
    .await?;

    if exists {
        return Err(Error::Validation(format!(
            "{} is already a friend of {}",
            friend.friend_id, friend.user_id
        )));
    }

    sqlx::query(
        r#"
        INSERT INTO friends (
            user_id, friend_id, friend_name, friend_email, friend_username,
            profile_color, status, added_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&friend.user_id)
    .bind(&friend.friend_id)
    .bind(&friend.friend_name)
    .bind(&friend.friend_email)
    .bind(&friend.friend_username)
    .bind(&friend.profile_color)
    .bind(friend.status.as_str())
    .bind(friend.added_at)
    .execute(db)
    .await?;
    Ok(())
}

/// All friendship edges owned by a user, newest first
pub async fn list(db: &Pool<Sqlite>, user_id: &str) -> Result<Vec<Friend>> {
    let rows = sqlx::query("SELECT * FROM friends WHERE user_id = ? ORDER BY added_at DESC")
        .bind(user_id)
        .fetch_all(db)
        .await?;

    rows.iter().map(friend_from_row).collect()
}

fn friend_from_row(row: &SqliteRow) -> Result<Friend> {
    let status_raw: String = row.try_get("status")?;
    Ok(Friend {
        user_id: row.try_get("user_id")?,
        friend_id: row.try_get("friend_id")?,
        friend_name: row.try_get("friend_name")?,
        friend_email: row.try_get("friend_email")?,
        friend_username: row.try_get("friend_username")?,
        profile_color: row.try_get("profile_color")?,
        status: status_raw.parse()?,
        added_at: row.try_get("added_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use safecampus_common::model::FriendStatus;

    fn edge(user: &str, friend: &str) -> Friend {
        Friend {
            user_id: user.into(),
            friend_id: friend.into(),
            friend_name: "Mei".into(),
            friend_email: "mei@um.edu.my".into(),
            friend_username: "mei".into(),
            profile_color: "blue".into(),
            status: FriendStatus::Accepted,
            added_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn add_and_list() {
        let pool = test_pool().await;
        add(&pool, &edge("u-1", "u-2")).await.unwrap();

        let friends = list(&pool, "u-1").await.unwrap();
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].friend_id, "u-2");
        assert_eq!(friends[0].status, FriendStatus::Accepted);

        // The edge is directional; u-2 has no friends listed
        assert!(list(&pool, "u-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_edge_is_rejected() {
        let pool = test_pool().await;
        add(&pool, &edge("u-1", "u-2")).await.unwrap();

        let err = add(&pool, &edge("u-1", "u-2")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
