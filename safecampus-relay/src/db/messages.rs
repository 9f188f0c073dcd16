//! Direct-message queries

use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use safecampus_common::model::Message;

use crate::error::{Error, Result};

/// Persist a new message
pub async fn insert(db: &Pool<Sqlite>, message: &Message) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO messages (
            id, sender_id, sender_name, recipient_id, body,
            message_type, is_read, read_at, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(message.id.to_string())
    .bind(&message.sender_id)
    .bind(&message.sender_name)
    .bind(&message.recipient_id)
    .bind(&message.body)
    .bind(message.message_type.as_str())
    .bind(message.is_read as i64)
    .bind(message.read_at)
    .bind(message.created_at)
    .execute(db)
    .await?;
    Ok(())
}

/// Conversation between two users in both directions, newest first
pub async fn conversation(
    db: &Pool<Sqlite>,
    user_id: &str,
    peer_id: &str,
    limit: i64,
) -> Result<Vec<Message>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM messages
        WHERE (sender_id = ? AND recipient_id = ?)
           OR (sender_id = ? AND recipient_id = ?)
        ORDER BY created_at DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(peer_id)
    .bind(peer_id)
    .bind(user_id)
    .bind(limit)
    .fetch_all(db)
    .await?;

    rows.iter().map(message_from_row).collect()
}

/// Mark everything a peer sent to this recipient as read; returns the
/// number of messages flipped
pub async fn mark_read(db: &Pool<Sqlite>, recipient_id: &str, sender_id: &str) -> Result<u64> {
    let affected = sqlx::query(
        r#"
        UPDATE messages
        SET is_read = 1, read_at = ?
        WHERE recipient_id = ? AND sender_id = ? AND is_read = 0
        "#,
    )
    .bind(Utc::now())
    .bind(recipient_id)
    .bind(sender_id)
    .execute(db)
    .await?
    .rows_affected();
    Ok(affected)
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    let id: String = row.try_get("id")?;
    let message_type_raw: String = row.try_get("message_type")?;
    Ok(Message {
        id: Uuid::parse_str(&id).map_err(|e| Error::Internal(format!("bad message id: {}", e)))?,
        sender_id: row.try_get("sender_id")?,
        sender_name: row.try_get("sender_name")?,
        recipient_id: row.try_get("recipient_id")?,
        body: row.try_get("body")?,
        message_type: message_type_raw.parse()?,
        is_read: row.try_get::<i64, _>("is_read")? != 0,
        read_at: row.try_get("read_at")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use safecampus_common::model::MessageType;

    fn msg(sender: &str, recipient: &str, body: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: sender.into(),
            sender_name: sender.to_uppercase(),
            recipient_id: recipient.into(),
            body: body.into(),
            message_type: MessageType::Text,
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn conversation_covers_both_directions() {
        let pool = test_pool().await;
        insert(&pool, &msg("u-1", "u-2", "leaving the library now")).await.unwrap();
        insert(&pool, &msg("u-2", "u-1", "ok, share your location")).await.unwrap();
        insert(&pool, &msg("u-1", "u-3", "unrelated")).await.unwrap();

        let thread = conversation(&pool, "u-1", "u-2", 50).await.unwrap();
        assert_eq!(thread.len(), 2);
        assert!(thread.iter().all(|m| {
            (m.sender_id == "u-1" && m.recipient_id == "u-2")
                || (m.sender_id == "u-2" && m.recipient_id == "u-1")
        }));
    }

    #[tokio::test]
    async fn mark_read_flips_only_the_peer_direction() {
        let pool = test_pool().await;
        insert(&pool, &msg("u-2", "u-1", "first")).await.unwrap();
        insert(&pool, &msg("u-2", "u-1", "second")).await.unwrap();
        insert(&pool, &msg("u-1", "u-2", "reply")).await.unwrap();

        let flipped = mark_read(&pool, "u-1", "u-2").await.unwrap();
        assert_eq!(flipped, 2);

        // Already-read messages are not counted again
        let flipped = mark_read(&pool, "u-1", "u-2").await.unwrap();
        assert_eq!(flipped, 0);

        let thread = conversation(&pool, "u-1", "u-2", 50).await.unwrap();
        let from_peer: Vec<_> = thread.iter().filter(|m| m.sender_id == "u-2").collect();
        assert!(from_peer.iter().all(|m| m.is_read && m.read_at.is_some()));
    }
}
