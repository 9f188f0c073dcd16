//! Report store
//!
//! Persistence and query façade over report records. All timestamps are
//! assigned server-side at write time; nothing here trusts client clocks.

use chrono::{DateTime, Utc};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use safecampus_common::model::{
    Category, Location, Priority, Report, ReportStatus, VerificationTag,
};

use crate::error::{Error, Result};

/// Listing filter for the dashboard view
///
/// The default excludes terminal records: the dashboard is defined as
/// "everything currently actionable", not "everything ever submitted".
#[derive(Debug, Clone)]
pub struct ReportFilter {
    pub exclude_statuses: Vec<ReportStatus>,
    pub min_confidence: Option<u8>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ReportFilter {
    fn default() -> Self {
        Self {
            exclude_statuses: vec![ReportStatus::Resolved, ReportStatus::FalseAlarm],
            min_confidence: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// Insert a freshly scored report
pub async fn create(db: &Pool<Sqlite>, report: &Report) -> Result<()> {
    let evidence = serde_json::to_string(&report.evidence_images)
        .map_err(|e| Error::Internal(format!("evidence serialization: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO reports (
            id, user_id, user_name, user_phone, description,
            latitude, longitude, address, campus, category,
            evidence_images, confidence, status, priority, verification_tag,
            explanation, resolution, resolved_by, resolved_at, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(report.id.to_string())
    .bind(&report.user_id)
    .bind(&report.user_name)
    .bind(&report.user_phone)
    .bind(&report.description)
    .bind(report.location.latitude)
    .bind(report.location.longitude)
    .bind(&report.location.address)
    .bind(&report.location.campus)
    .bind(report.category.as_str())
    .bind(evidence)
    .bind(report.confidence as i64)
    .bind(report.status.as_str())
    .bind(report.priority.as_str())
    .bind(report.verification_tag.as_str())
    .bind(&report.explanation)
    .bind(&report.resolution)
    .bind(&report.resolved_by)
    .bind(report.resolved_at)
    .bind(report.created_at)
    .bind(report.updated_at)
    .execute(db)
    .await?;

    Ok(())
}

/// Fetch one report by id
pub async fn find_by_id(db: &Pool<Sqlite>, id: Uuid) -> Result<Report> {
    let row = sqlx::query("SELECT * FROM reports WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::NotFound(format!("report {}", id)))?;

    report_from_row(&row)
}

/// List reports newest-first under the given filter
pub async fn list(db: &Pool<Sqlite>, filter: &ReportFilter) -> Result<Vec<Report>> {
    let mut query = QueryBuilder::new("SELECT * FROM reports WHERE 1=1");

    if !filter.exclude_statuses.is_empty() {
        query.push(" AND status NOT IN (");
        let mut statuses = query.separated(", ");
        for status in &filter.exclude_statuses {
            statuses.push_bind(status.as_str());
        }
        query.push(")");
    }

    if let Some(min) = filter.min_confidence {
        query.push(" AND confidence >= ");
        query.push_bind(min as i64);
    }

    query.push(" ORDER BY created_at DESC LIMIT ");
    query.push_bind(filter.limit);
    query.push(" OFFSET ");
    query.push_bind(filter.offset);

    let rows = query.build().fetch_all(db).await?;
    rows.iter().map(report_from_row).collect()
}

/// Update a report's status, returning the updated record
///
/// Never creates a record: an unknown id yields a not-found error. When the
/// new status is terminal, resolution metadata and the resolved-at stamp
/// are recorded alongside it.
pub async fn update_status(
    db: &Pool<Sqlite>,
    id: Uuid,
    status: ReportStatus,
    resolution: Option<&str>,
    resolved_by: Option<&str>,
) -> Result<Report> {
    let now = Utc::now();
    let resolved_at: Option<DateTime<Utc>> = status.is_terminal().then_some(now);

    let affected = sqlx::query(
        r#"
        UPDATE reports
        SET status = ?, resolution = COALESCE(?, resolution),
            resolved_by = COALESCE(?, resolved_by),
            resolved_at = COALESCE(?, resolved_at),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(status.as_str())
    .bind(resolution)
    .bind(resolved_by)
    .bind(resolved_at)
    .bind(now)
    .bind(id.to_string())
    .execute(db)
    .await?
    .rows_affected();

    if affected == 0 {
        return Err(Error::NotFound(format!("report {}", id)));
    }
    find_by_id(db, id).await
}

/// Re-score a non-terminal report in place (deferred classification path)
pub async fn update_classification(
    db: &Pool<Sqlite>,
    id: Uuid,
    confidence: u8,
    status: ReportStatus,
    priority: Priority,
    verification_tag: VerificationTag,
    explanation: &str,
) -> Result<Report> {
    let affected = sqlx::query(
        r#"
        UPDATE reports
        SET confidence = ?, status = ?, priority = ?, verification_tag = ?,
            explanation = ?, updated_at = ?
        WHERE id = ? AND status NOT IN ('resolved', 'false_alarm')
        "#,
    )
    .bind(confidence as i64)
    .bind(status.as_str())
    .bind(priority.as_str())
    .bind(verification_tag.as_str())
    .bind(explanation)
    .bind(Utc::now())
    .bind(id.to_string())
    .execute(db)
    .await?
    .rows_affected();

    if affected == 0 {
        return Err(Error::NotFound(format!("report {} (or terminal)", id)));
    }
    find_by_id(db, id).await
}

fn report_from_row(row: &SqliteRow) -> Result<Report> {
    let id: String = row.try_get("id")?;
    let evidence_raw: String = row.try_get("evidence_images")?;
    let status_raw: String = row.try_get("status")?;
    let priority_raw: String = row.try_get("priority")?;
    let tag_raw: String = row.try_get("verification_tag")?;
    let category_raw: String = row.try_get("category")?;

    Ok(Report {
        id: Uuid::parse_str(&id).map_err(|e| Error::Internal(format!("bad report id: {}", e)))?,
        user_id: row.try_get("user_id")?,
        user_name: row.try_get("user_name")?,
        user_phone: row.try_get("user_phone")?,
        description: row.try_get("description")?,
        location: Location {
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
            address: row.try_get("address")?,
            campus: row.try_get("campus")?,
        },
        category: Category::parse_lenient(&category_raw),
        evidence_images: serde_json::from_str(&evidence_raw)
            .map_err(|e| Error::Internal(format!("bad evidence json: {}", e)))?,
        confidence: row.try_get::<i64, _>("confidence")?.clamp(0, 100) as u8,
        status: status_raw.parse()?,
        priority: priority_raw.parse()?,
        verification_tag: tag_raw.parse()?,
        explanation: row.try_get("explanation")?,
        resolution: row.try_get("resolution")?,
        resolved_by: row.try_get("resolved_by")?,
        resolved_at: row.try_get("resolved_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
