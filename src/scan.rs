//! Folder scan orchestration.
//!
//! One pass over a SharePoint folder:
//!
//! 1. List the folder and split it into VTT transcripts, meeting
//!    recordings (`.mp4` carrying "Meeting Recording") and other text
//!    files (`.txt`, `.docx`).
//! 2. Download every VTT and emit it as a record with no video.
//! 3. Pair recordings with transcripts in three passes: every exactly
//!    named VTT in the folder first, then the best same-folder name match
//!    for the rest, then the [`resolver`](crate::resolver) cascade.
//! 4. Emit every TXT/DOCX as an independent record.
//!
//! Work is strictly sequential; the consumed set depends on completion
//! order. A file that cannot be fetched lands in [`ScanReport::errors`]
//! and the scan continues. Only failing to list the folder itself aborts.

use anyhow::{anyhow, Context, Result};
use serde_json::json;
use std::collections::{HashMap, HashSet};

use crate::activity::ActivitySink;
use crate::config::Config;
use crate::extract::extract_text;
use crate::graph::{DriveLookup, GraphClient};
use crate::models::{DriveItem, RecordingFile, ResolvedTranscript, ScanError, ScanReport};
use crate::naming;
use crate::resolver::resolve_transcript;

/// Transcript names already emitted (or attempted) in this scan.
///
/// Compared case-insensitively. Threaded explicitly through the scan so
/// that a VTT is never emitted twice.
#[derive(Debug, Default, Clone)]
pub struct ConsumedSet {
    names: HashSet<String>,
}

impl ConsumedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name.to_lowercase())
    }

    /// Returns `false` if the name was already consumed.
    pub fn insert(&mut self, name: &str) -> bool {
        self.names.insert(name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A folder listing split by role.
#[derive(Debug, Default)]
pub struct Partition {
    pub vtt_files: Vec<DriveItem>,
    pub recordings: Vec<RecordingFile>,
    pub other_text_files: Vec<DriveItem>,
}

pub fn partition(listing: &[DriveItem]) -> Partition {
    let mut parts = Partition::default();
    for item in listing {
        if item.is_vtt() {
            parts.vtt_files.push(item.clone());
        } else if let Some(recording) = item.as_recording() {
            parts.recordings.push(recording);
        } else if item.is_other_text() {
            parts.other_text_files.push(item.clone());
        }
    }
    parts
}

/// Download a transcript file and build its record.
///
/// Falls back to fetching the item by id when the listing carried no
/// download URL (search results often omit it).
pub async fn fetch_transcript(
    lookup: &dyn DriveLookup,
    item: &DriveItem,
    video: Option<&RecordingFile>,
) -> Result<ResolvedTranscript> {
    let candidate = item
        .as_candidate()
        .ok_or_else(|| anyhow!("{} is not a transcript file", item.name))?;
    let url = match &candidate.download_url {
        Some(url) => url.clone(),
        None => lookup
            .get_item(&item.id)
            .await?
            .download_url
            .ok_or_else(|| anyhow!("{} has no download URL", item.name))?,
    };
    let bytes = lookup.download(&url).await?;
    let content = extract_text(&bytes, &item.name)?;
    Ok(candidate.resolve(content, video))
}

/// Accumulators local to one scan.
struct ScanState {
    report: ScanReport,
    consumed: ConsumedSet,
    /// Lowercased file name → index into `report.records`.
    emitted: HashMap<String, usize>,
}

impl ScanState {
    fn emit(&mut self, record: ResolvedTranscript) {
        self.emitted
            .insert(record.file_name.to_lowercase(), self.report.records.len());
        self.report.records.push(record);
    }

    fn emitted_index(&self, name: &str) -> Option<usize> {
        self.emitted.get(&name.to_lowercase()).copied()
    }

    async fn fail(&mut self, sink: &dyn ActivitySink, file_name: &str, err: anyhow::Error) {
        let message = format!("{:#}", err);
        sink.warn(
            "scan.fetch_failed",
            &format!("Failed to fetch {}", file_name),
            json!({ "file": file_name, "error": message }),
        )
        .await;
        self.report.errors.push(ScanError {
            file_name: file_name.to_string(),
            message,
        });
    }
}

/// Scan one folder and return every transcript found in or for it.
///
/// # Errors
///
/// Only when the folder itself cannot be listed. Per-file failures are
/// reported in [`ScanReport::errors`].
pub async fn scan_folder(
    lookup: &dyn DriveLookup,
    sink: &dyn ActivitySink,
    folder_path: &str,
) -> Result<ScanReport> {
    sink.info(
        "scan.start",
        &format!("Scanning folder '{}'", folder_path),
        json!({ "folder": folder_path }),
    )
    .await;

    let listing = lookup
        .list_folder(folder_path)
        .await
        .with_context(|| format!("Failed to list folder '{}'", folder_path))?;
    let parts = partition(&listing);

    sink.info(
        "scan.listed",
        &format!(
            "{} items: {} vtt, {} recordings, {} other",
            listing.len(),
            parts.vtt_files.len(),
            parts.recordings.len(),
            parts.other_text_files.len()
        ),
        json!({
            "items": listing.len(),
            "vtt": parts.vtt_files.len(),
            "recordings": parts.recordings.len(),
            "other": parts.other_text_files.len(),
        }),
    )
    .await;

    let mut state = ScanState {
        report: ScanReport {
            total_count: parts.recordings.len(),
            ..Default::default()
        },
        consumed: ConsumedSet::new(),
        emitted: HashMap::new(),
    };

    for item in &parts.vtt_files {
        if !state.consumed.insert(&item.name) {
            continue;
        }
        match fetch_transcript(lookup, item, None).await {
            Ok(record) => state.emit(record),
            Err(e) => state.fail(sink, &item.name, e).await,
        }
    }

    pair_recordings(lookup, sink, &parts, &mut state).await;

    for item in &parts.other_text_files {
        match fetch_transcript(lookup, item, None).await {
            Ok(record) => state.emit(record),
            Err(e) => state.fail(sink, &item.name, e).await,
        }
    }

    let report = state.report;
    sink.info(
        "scan.complete",
        &format!(
            "Matched {}/{} recordings, {} transcripts, {} errors",
            report.matched_count,
            report.total_count,
            report.records.len(),
            report.errors.len()
        ),
        json!({
            "matched": report.matched_count,
            "total": report.total_count,
            "records": report.records.len(),
            "errors": report.errors.len(),
        }),
    )
    .await;

    Ok(report)
}

/// Outcome of pairing a recording with its exactly named VTT.
enum ExactPairing {
    Matched,
    /// The exact VTT exists but could not be fetched. Already reported.
    Failed,
    /// No exactly named VTT in the folder.
    Absent,
}

/// Pair `recording` with `<base>.vtt` from the scanned folder.
///
/// A recording whose exact VTT already carries another recording (same
/// base name, different timestamp) counts as matched by it.
async fn pair_exact(
    sink: &dyn ActivitySink,
    parts: &Partition,
    recording: &RecordingFile,
    state: &mut ScanState,
) -> ExactPairing {
    let exact = naming::exact_transcript_name(&naming::base_name(&recording.name));
    let Some(vtt) = parts
        .vtt_files
        .iter()
        .find(|v| v.name.eq_ignore_ascii_case(&exact))
    else {
        return ExactPairing::Absent;
    };

    let Some(idx) = state.emitted_index(&vtt.name) else {
        return ExactPairing::Failed;
    };
    if state.report.records[idx].has_video() {
        log_association(sink, recording, &vtt.name, "exact_shared").await;
    } else {
        state.report.records[idx].attach_video(recording);
        log_association(sink, recording, &vtt.name, "exact").await;
    }
    ExactPairing::Matched
}

/// Attach the best loosely matching VTT that still has no video.
async fn pair_same_folder(
    sink: &dyn ActivitySink,
    parts: &Partition,
    recording: &RecordingFile,
    state: &mut ScanState,
) -> bool {
    let base = naming::base_name(&recording.name);
    let best = parts
        .vtt_files
        .iter()
        .filter_map(|v| {
            let idx = state.emitted_index(&v.name)?;
            if state.report.records[idx].has_video() {
                return None;
            }
            naming::match_rule(&base, &v.name).map(|rule| (rule, idx))
        })
        .min_by_key(|(rule, _)| *rule);

    let Some((_, idx)) = best else {
        return false;
    };
    state.report.records[idx].attach_video(recording);
    let name = state.report.records[idx].file_name.clone();
    log_association(sink, recording, &name, "same_folder").await;
    true
}

/// Pair every recording with a transcript, strictest evidence first.
///
/// All exact pairings happen before any loose one, so a recording never
/// takes a VTT that is named after a different recording. The resolver
/// only runs for recordings still unpaired after both folder passes.
async fn pair_recordings(
    lookup: &dyn DriveLookup,
    sink: &dyn ActivitySink,
    parts: &Partition,
    state: &mut ScanState,
) {
    let mut loose = Vec::new();
    for recording in &parts.recordings {
        match pair_exact(sink, parts, recording, state).await {
            ExactPairing::Matched => state.report.matched_count += 1,
            ExactPairing::Failed => {}
            ExactPairing::Absent => loose.push(recording),
        }
    }

    let mut unresolved = Vec::new();
    for recording in loose {
        if pair_same_folder(sink, parts, recording, state).await {
            state.report.matched_count += 1;
        } else {
            unresolved.push(recording);
        }
    }

    for recording in unresolved {
        if let Some(resolution) = resolve_transcript(lookup, sink, recording, &state.consumed).await {
            state.consumed.insert(&resolution.transcript.file_name);
            state.emit(resolution.transcript);
            state.report.matched_count += 1;
        }
    }
}

async fn log_association(
    sink: &dyn ActivitySink,
    recording: &RecordingFile,
    transcript: &str,
    how: &str,
) {
    sink.info(
        "scan.associated",
        &format!("{} -> {}", recording.name, transcript),
        json!({ "recording": recording.name, "transcript": transcript, "match": how }),
    )
    .await;
}

/// Scan the configured folder through Microsoft Graph.
///
/// Fails before any file is touched if the Graph client cannot be built
/// (missing secret) or the folder cannot be listed.
pub async fn run_folder_scan(config: &Config, sink: &dyn ActivitySink) -> Result<ScanReport> {
    let client = GraphClient::new(&config.graph)?;
    scan_folder(&client, sink, config.graph.normalized_folder()).await
}
