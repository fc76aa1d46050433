//! Structured activity log.
//!
//! Scans report what they did through an injected [`ActivitySink`] rather
//! than a global logger, so tests can substitute a recording sink and the
//! CLI can persist entries to the `activity_log` table. Recording an entry
//! never fails from the caller's point of view.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

/// One diagnostic entry.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub level: Level,
    pub action: String,
    pub message: String,
    pub details: Value,
}

/// Fire-and-forget sink for scan diagnostics.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn record(&self, entry: ActivityEntry);

    async fn log(&self, level: Level, action: &str, message: &str, details: Value) {
        self.record(ActivityEntry {
            level,
            action: action.to_string(),
            message: message.to_string(),
            details,
        })
        .await;
    }

    async fn info(&self, action: &str, message: &str, details: Value) {
        self.log(Level::Info, action, message, details).await;
    }

    async fn warn(&self, action: &str, message: &str, details: Value) {
        self.log(Level::Warn, action, message, details).await;
    }

    async fn debug(&self, action: &str, message: &str, details: Value) {
        self.log(Level::Debug, action, message, details).await;
    }
}

fn emit(entry: &ActivityEntry) {
    let action = entry.action.as_str();
    let details = entry.details.to_string();
    match entry.level {
        Level::Debug => tracing::debug!(action, details = %details, "{}", entry.message),
        Level::Info => tracing::info!(action, details = %details, "{}", entry.message),
        Level::Warn => tracing::warn!(action, details = %details, "{}", entry.message),
        Level::Error => tracing::error!(action, details = %details, "{}", entry.message),
    }
}

/// Emits entries as `tracing` events only.
pub struct TracingSink;

#[async_trait]
impl ActivitySink for TracingSink {
    async fn record(&self, entry: ActivityEntry) {
        emit(&entry);
    }
}

/// Discards everything.
pub struct NullSink;

#[async_trait]
impl ActivitySink for NullSink {
    async fn record(&self, _entry: ActivityEntry) {}
}

/// Keeps entries in memory, for inspecting what a scan reported.
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<ActivityEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.action).collect()
    }
}

#[async_trait]
impl ActivitySink for MemorySink {
    async fn record(&self, entry: ActivityEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}

/// Persists entries to `activity_log` and mirrors them to `tracing`.
///
/// Debug entries are only traced, not stored.
pub struct StoreSink {
    pool: SqlitePool,
}

impl StoreSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivitySink for StoreSink {
    async fn record(&self, entry: ActivityEntry) {
        emit(&entry);
        if entry.level == Level::Debug {
            return;
        }
        let result = sqlx::query(
            "INSERT INTO activity_log (level, action, message, details_json, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.level.as_str())
        .bind(&entry.action)
        .bind(&entry.message)
        .bind(entry.details.to_string())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to write activity log entry");
        }
    }
}

/// Sink for one scan: a dry run only traces, a real run is persisted.
pub fn scan_sink(pool: &SqlitePool, dry_run: bool) -> Box<dyn ActivitySink> {
    if dry_run {
        Box::new(TracingSink)
    } else {
        Box::new(StoreSink::new(pool.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.info("scan.start", "starting", json!({})).await;
        sink.warn("scan.fetch_failed", "boom", json!({ "file": "a.vtt" })).await;
        assert_eq!(sink.actions(), vec!["scan.start", "scan.fetch_failed"]);
        assert_eq!(sink.entries()[1].level, Level::Warn);
    }

    #[tokio::test]
    async fn store_sink_swallows_write_failures() {
        // No activity_log table: the insert fails but recording must not panic.
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let sink = StoreSink::new(pool);
        sink.info("scan.start", "starting", json!({})).await;
    }

    #[tokio::test]
    async fn dry_run_scans_leave_no_activity_rows() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::create_schema(&pool).await.unwrap();

        scan_sink(&pool, true).info("scan.start", "dry", json!({})).await;
        assert_eq!(activity_rows(&pool).await, 0);

        scan_sink(&pool, false).info("scan.start", "real", json!({})).await;
        assert_eq!(activity_rows(&pool).await, 1);
    }

    async fn activity_rows(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM activity_log")
            .fetch_one(pool)
            .await
            .unwrap()
    }
}
