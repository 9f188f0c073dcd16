//! Feedback vote queries
//!
//! Community confirmation loop: peers vote a published report real or
//! fake; two distinct `real` voters upgrade the report to confirmed-real.

use chrono::Utc;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use safecampus_common::model::FeedbackVote;

use crate::error::Result;

/// Distinct `real` voters required to confirm a report
pub const CONFIRM_THRESHOLD: i64 = 2;

/// Record one vote
pub async fn insert_vote(
    db: &Pool<Sqlite>,
    report_id: Uuid,
    report_text: &str,
    vote: FeedbackVote,
    voter_id: Option<&str>,
    location: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO feedback (report_id, report_text, vote, voter_id, location, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(report_id.to_string())
    .bind(report_text)
    .bind(vote.as_str())
    .bind(voter_id)
    .bind(location)
    .bind(Utc::now())
    .execute(db)
    .await?;
    Ok(())
}

/// Count distinct users who voted `real` on a report
///
/// Anonymous votes collapse into a single voter, matching the original
/// confirmation rule.
pub async fn distinct_real_voters(db: &Pool<Sqlite>, report_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(DISTINCT COALESCE(voter_id, 'anon'))
        FROM feedback
        WHERE report_id = ? AND vote = 'real'
        "#,
    )
    .bind(report_id.to_string())
    .fetch_one(db)
    .await?;
    Ok(count)
}

/// Flag every vote row for a report as part of a confirmed-real consensus
pub async fn mark_confirmed(db: &Pool<Sqlite>, report_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE feedback SET confirmed_real = 1 WHERE report_id = ?")
        .bind(report_id.to_string())
        .execute(db)
        .await?;
    Ok(())
}
