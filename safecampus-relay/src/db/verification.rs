//! Verification code queries
//!
//! 6-digit numeric codes with an absolute expiry checked lazily at
//! verification time (no running timer) and a fixed attempt budget before
//! lockout.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sqlx::{Pool, Row, Sqlite};

use crate::error::{Error, Result};

/// A freshly issued code
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a verification attempt that was neither expired nor locked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    /// Wrong code; the caller can tell the user how many tries remain
    Incorrect { attempts_remaining: i64 },
}

/// Issue a new code for an email address
///
/// Earlier unused codes for the same address are invalidated so only the
/// newest one can verify.
pub async fn issue(
    db: &Pool<Sqlite>,
    email: &str,
    purpose: &str,
    ttl_secs: i64,
    max_attempts: i64,
) -> Result<IssuedCode> {
    let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
    let now = Utc::now();
    let expires_at = now + Duration::seconds(ttl_secs);

    sqlx::query("UPDATE verification_codes SET is_used = 1 WHERE email = ? AND is_used = 0")
        .bind(email)
        .execute(db)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO verification_codes (email, code, purpose, expires_at, attempts, max_attempts, is_used, created_at)
        VALUES (?, ?, ?, ?, 0, ?, 0, ?)
        "#,
    )
    .bind(email)
    .bind(&code)
    .bind(purpose)
    .bind(expires_at)
    .bind(max_attempts)
    .bind(now)
    .execute(db)
    .await?;

    Ok(IssuedCode { code, expires_at })
}

/// Attempt to verify a code for an email address
///
/// Errors: `NotFound` when no active code exists or the newest one has
/// expired (lazy expiry), `Lockout` when the attempt budget is exhausted.
pub async fn verify(db: &Pool<Sqlite>, email: &str, code: &str) -> Result<VerifyOutcome> {
    let row = sqlx::query(
        r#"
        SELECT id, code, expires_at, attempts, max_attempts
        FROM verification_codes
        WHERE email = ? AND is_used = 0
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(email)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| Error::NotFound(format!("no active verification code for {}", email)))?;

    let id: i64 = row.try_get("id")?;
    let stored_code: String = row.try_get("code")?;
    let expires_at: DateTime<Utc> = row.try_get("expires_at")?;
    let attempts: i64 = row.try_get("attempts")?;
    let max_attempts: i64 = row.try_get("max_attempts")?;

    if expires_at < Utc::now() {
        return Err(Error::NotFound(format!("verification code for {} expired", email)));
    }
    if attempts >= max_attempts {
        return Err(Error::Lockout(format!("verification attempts exhausted for {}", email)));
    }

    if stored_code != code {
        let attempts = attempts + 1;
        sqlx::query("UPDATE verification_codes SET attempts = ? WHERE id = ?")
            .bind(attempts)
            .bind(id)
            .execute(db)
            .await?;

        if attempts >= max_attempts {
            return Err(Error::Lockout(format!("verification attempts exhausted for {}", email)));
        }
        return Ok(VerifyOutcome::Incorrect {
            attempts_remaining: max_attempts - attempts,
        });
    }

    sqlx::query("UPDATE verification_codes SET is_used = 1, used_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(db)
        .await?;

    Ok(VerifyOutcome::Verified)
}
