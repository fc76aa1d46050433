//! Persistence gateway.
//!
//! Transcripts are keyed by `source_url`. Re-scanning the same folder is
//! idempotent: the row id is kept, and a record whose content hash and
//! video association have not changed is not rewritten at all.

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{ResolvedTranscript, ScanReport, StoredTranscript, Summary};
use crate::summarize::GeneratedSummary;

/// What [`upsert_transcript`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Counts from [`persist_report`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// One row of `activity_log`.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityRecord {
    pub id: i64,
    pub level: String,
    pub action: String,
    pub message: String,
    pub details: serde_json::Value,
    pub created_at: String, // ISO8601
}

pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Insert or refresh one transcript. Returns the row id and the outcome.
pub async fn upsert_transcript(
    pool: &SqlitePool,
    record: &ResolvedTranscript,
) -> Result<(String, UpsertOutcome)> {
    let hash = content_hash(&record.content);

    let existing = sqlx::query(
        "SELECT id, title, file_name, content_hash, captured_at, video_url, video_file_name FROM transcripts WHERE source_url = ?",
    )
    .bind(&record.source_url)
    .fetch_optional(pool)
    .await?;

    let (id, mut outcome) = match existing {
        None => (Uuid::new_v4().to_string(), UpsertOutcome::Inserted),
        Some(row) => {
            let id: String = row.get("id");
            let unchanged = row.get::<String, _>("content_hash") == hash
                && row.get::<String, _>("title") == record.display_title
                && row.get::<String, _>("file_name") == record.file_name
                && row.get::<i64, _>("captured_at") == record.captured_at.timestamp()
                && row.get::<Option<String>, _>("video_url") == record.associated_video_url
                && row.get::<Option<String>, _>("video_file_name")
                    == record.associated_video_file_name;
            if unchanged {
                return Ok((id, UpsertOutcome::Unchanged));
            }
            (id, UpsertOutcome::Updated)
        }
    };

    let now = chrono::Utc::now().timestamp();
    let stored_id: String = sqlx::query_scalar(
        r#"
        INSERT INTO transcripts (id, source_url, title, file_name, content, content_hash, captured_at, video_url, video_file_name, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source_url) DO UPDATE SET
            title = excluded.title,
            file_name = excluded.file_name,
            content = excluded.content,
            content_hash = excluded.content_hash,
            captured_at = excluded.captured_at,
            video_url = excluded.video_url,
            video_file_name = excluded.video_file_name,
            updated_at = excluded.updated_at
        RETURNING id
        "#,
    )
    .bind(&id)
    .bind(&record.source_url)
    .bind(&record.display_title)
    .bind(&record.file_name)
    .bind(&record.content)
    .bind(&hash)
    .bind(record.captured_at.timestamp())
    .bind(&record.associated_video_url)
    .bind(&record.associated_video_file_name)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .with_context(|| format!("Failed to store {}", record.file_name))?;

    // Another writer inserted the row between the read and the insert.
    if stored_id != id {
        outcome = UpsertOutcome::Updated;
    }
    Ok((stored_id, outcome))
}

/// Upsert every record of a scan.
pub async fn persist_report(pool: &SqlitePool, report: &ScanReport) -> Result<PersistStats> {
    let mut stats = PersistStats::default();
    for record in &report.records {
        match upsert_transcript(pool, record).await?.1 {
            UpsertOutcome::Inserted => stats.inserted += 1,
            UpsertOutcome::Updated => stats.updated += 1,
            UpsertOutcome::Unchanged => stats.unchanged += 1,
        }
    }
    Ok(stats)
}

const TRANSCRIPT_COLUMNS: &str = "id, title, source_url, file_name, captured_at, video_url, video_file_name, content_hash, created_at, updated_at";

fn transcript_from_row(row: &SqliteRow) -> StoredTranscript {
    StoredTranscript {
        id: row.get("id"),
        title: row.get("title"),
        source_url: row.get("source_url"),
        file_name: row.get("file_name"),
        captured_at: format_ts_iso(row.get("captured_at")),
        video_url: row.get("video_url"),
        video_file_name: row.get("video_file_name"),
        content_hash: row.get("content_hash"),
        created_at: format_ts_iso(row.get("created_at")),
        updated_at: format_ts_iso(row.get("updated_at")),
        content: None,
        summary: None,
    }
}

/// Most recently captured first. Content is not loaded.
pub async fn list_transcripts(pool: &SqlitePool, limit: i64) -> Result<Vec<StoredTranscript>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM transcripts ORDER BY captured_at DESC, file_name ASC LIMIT ?",
        TRANSCRIPT_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(transcript_from_row).collect())
}

/// Full transcript with content and its summary, if any.
pub async fn get_transcript(pool: &SqlitePool, id: &str) -> Result<Option<StoredTranscript>> {
    let row = sqlx::query(&format!(
        "SELECT {}, content FROM transcripts WHERE id = ?",
        TRANSCRIPT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut transcript = transcript_from_row(&row);
    transcript.content = Some(row.get("content"));
    transcript.summary = get_summary(pool, id).await?;
    Ok(Some(transcript))
}

/// Store a summary, replacing any previous one for the transcript.
pub async fn save_summary(
    pool: &SqlitePool,
    transcript_id: &str,
    generated: &GeneratedSummary,
    model: &str,
) -> Result<Summary> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO summaries (transcript_id, summary, key_points_json, action_items_json, model, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(transcript_id) DO UPDATE SET
            summary = excluded.summary,
            key_points_json = excluded.key_points_json,
            action_items_json = excluded.action_items_json,
            model = excluded.model,
            created_at = excluded.created_at
        "#,
    )
    .bind(transcript_id)
    .bind(&generated.summary)
    .bind(serde_json::to_string(&generated.key_points)?)
    .bind(serde_json::to_string(&generated.action_items)?)
    .bind(model)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(Summary {
        transcript_id: transcript_id.to_string(),
        summary: generated.summary.clone(),
        key_points: generated.key_points.clone(),
        action_items: generated.action_items.clone(),
        model: model.to_string(),
        created_at: format_ts_iso(now),
    })
}

pub async fn get_summary(pool: &SqlitePool, transcript_id: &str) -> Result<Option<Summary>> {
    let row = sqlx::query(
        "SELECT transcript_id, summary, key_points_json, action_items_json, model, created_at FROM summaries WHERE transcript_id = ?",
    )
    .bind(transcript_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let key_points: String = row.get("key_points_json");
    let action_items: String = row.get("action_items_json");
    Ok(Some(Summary {
        transcript_id: row.get("transcript_id"),
        summary: row.get("summary"),
        key_points: serde_json::from_str(&key_points).unwrap_or_default(),
        action_items: serde_json::from_str(&action_items).unwrap_or_default(),
        model: row.get("model"),
        created_at: format_ts_iso(row.get("created_at")),
    }))
}

/// Newest first.
pub async fn list_activity(pool: &SqlitePool, limit: i64) -> Result<Vec<ActivityRecord>> {
    let rows = sqlx::query(
        "SELECT id, level, action, message, details_json, created_at FROM activity_log ORDER BY id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let details: String = row.get("details_json");
            ActivityRecord {
                id: row.get("id"),
                level: row.get("level"),
                action: row.get("action"),
                message: row.get("message"),
                details: serde_json::from_str(&details).unwrap_or(serde_json::json!({})),
                created_at: format_ts_iso(row.get("created_at")),
            }
        })
        .collect())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
