//! Core data models used throughout Transcript Harness.
//!
//! These types represent the drive items seen in a Graph listing, the
//! recordings and transcripts derived from them, and the records that flow
//! into the SQLite store.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Marker token that identifies a meeting recording by file name.
pub const RECORDING_MARKER: &str = "meeting recording";

/// Whether a drive item is a file or a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Folder,
}

/// One entry of a Graph listing (folder children, item children, or search).
#[derive(Debug, Clone)]
pub struct DriveItem {
    pub id: String,
    pub name: String,
    pub kind: ItemKind,
    pub web_url: String,
    /// Pre-authenticated, time-limited URL. Only present for files.
    pub download_url: Option<String>,
    pub last_modified: DateTime<Utc>,
    pub size: i64,
    pub parent_id: Option<String>,
}

impl DriveItem {
    pub fn is_file(&self) -> bool {
        self.kind == ItemKind::File
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }

    /// Lowercased extension without the dot, if the name has one.
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }

    pub fn has_extension(&self, ext: &str) -> bool {
        self.is_file() && self.extension().as_deref() == Some(ext)
    }

    pub fn is_vtt(&self) -> bool {
        self.has_extension("vtt")
    }

    /// `.mp4` whose name carries the "Meeting Recording" marker.
    pub fn is_recording(&self) -> bool {
        self.has_extension("mp4") && self.name.to_lowercase().contains(RECORDING_MARKER)
    }

    /// `.txt` or `.docx`: accepted standalone, never matched to a recording.
    pub fn is_other_text(&self) -> bool {
        self.has_extension("txt") || self.has_extension("docx")
    }

    pub fn as_recording(&self) -> Option<RecordingFile> {
        self.is_recording().then(|| RecordingFile {
            id: self.id.clone(),
            name: self.name.clone(),
            web_url: self.web_url.clone(),
            last_modified: self.last_modified,
        })
    }

    pub fn as_candidate(&self) -> Option<TranscriptCandidate> {
        if !(self.is_vtt() || self.is_other_text()) {
            return None;
        }
        Some(TranscriptCandidate {
            name: self.name.clone(),
            download_url: self.download_url.clone(),
            web_url: self.web_url.clone(),
            last_modified: self.last_modified,
        })
    }
}

/// A video recording discovered in a folder listing.
#[derive(Debug, Clone)]
pub struct RecordingFile {
    pub id: String,
    pub name: String,
    pub web_url: String,
    pub last_modified: DateTime<Utc>,
}

/// A file that may serve as a transcript.
#[derive(Debug, Clone)]
pub struct TranscriptCandidate {
    pub name: String,
    pub download_url: Option<String>,
    pub web_url: String,
    pub last_modified: DateTime<Utc>,
}

impl TranscriptCandidate {
    /// Build the output record once the body has been fetched.
    pub fn resolve(&self, content: String, video: Option<&RecordingFile>) -> ResolvedTranscript {
        ResolvedTranscript {
            display_title: strip_extension(&self.name).to_string(),
            source_url: self.web_url.clone(),
            content,
            file_name: self.name.clone(),
            captured_at: self.last_modified,
            associated_video_url: video.map(|v| v.web_url.clone()),
            associated_video_file_name: video.map(|v| v.name.clone()),
        }
    }
}

/// The output unit of a scan; one per stored record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTranscript {
    pub display_title: String,
    /// Stable across runs; the dedup and conflict key in storage.
    pub source_url: String,
    pub content: String,
    pub file_name: String,
    pub captured_at: DateTime<Utc>,
    pub associated_video_url: Option<String>,
    pub associated_video_file_name: Option<String>,
}

impl ResolvedTranscript {
    pub fn attach_video(&mut self, video: &RecordingFile) {
        self.associated_video_url = Some(video.web_url.clone());
        self.associated_video_file_name = Some(video.name.clone());
    }

    pub fn has_video(&self) -> bool {
        self.associated_video_url.is_some()
    }
}

/// A file that could not be fetched during a scan.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanError {
    pub file_name: String,
    pub message: String,
}

/// Result of one folder scan.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// Recordings that ended up with an associated transcript.
    pub matched_count: usize,
    /// Recordings seen in the listing.
    pub total_count: usize,
    pub records: Vec<ResolvedTranscript>,
    pub errors: Vec<ScanError>,
}

/// A transcript as persisted in SQLite.
#[derive(Debug, Clone, Serialize)]
pub struct StoredTranscript {
    pub id: String,
    pub title: String,
    pub source_url: String,
    pub file_name: String,
    pub captured_at: String, // ISO8601
    pub video_url: Option<String>,
    pub video_file_name: Option<String>,
    pub content_hash: String,
    pub created_at: String, // ISO8601
    pub updated_at: String, // ISO8601
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
}

/// AI-generated summary of one transcript.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub transcript_id: String,
    pub summary: String,
    pub key_points: Vec<String>,
    pub action_items: Vec<String>,
    pub model: String,
    pub created_at: String, // ISO8601
}

/// `"Weekly Sync.vtt"` → `"Weekly Sync"`.
pub fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}
