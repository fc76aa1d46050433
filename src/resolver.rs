//! Transcript resolution for a single recording.
//!
//! When a recording has no transcript beside it in the scanned folder, the
//! resolver walks an ordered cascade of lookup strategies and stops at the
//! first one that both locates a `.vtt` and downloads it:
//!
//! | # | Strategy | Where it looks |
//! |---|----------|----------------|
//! | 2 | [`Strategy::StreamChildren`] | children of the recording item itself |
//! | 3 | [`Strategy::ParentRescan`] | fresh listing of the recording's parent folder |
//! | 4 | [`Strategy::MatchingSubfolder`] | subfolder named after the recording |
//! | 5 | [`Strategy::TranscriptsSubfolder`] | `Transcript` / `Transcripts` subfolder |
//! | 6 | [`Strategy::DriveSearch`] | drive-wide search |
//!
//! Strategy 1 (same-folder match) is done by the orchestrator in
//! [`crate::scan`] before delegating here.
//!
//! A failing Graph call only ends its own strategy; the cascade moves on.
//! Transcripts already in the consumed set are never returned.

use anyhow::{anyhow, Result};
use serde_json::json;

use crate::activity::ActivitySink;
use crate::graph::DriveLookup;
use crate::models::{DriveItem, RecordingFile, ResolvedTranscript};
use crate::naming::{self, BaseName};
use crate::scan::{fetch_transcript, ConsumedSet};

/// One step of the resolution cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    StreamChildren,
    ParentRescan,
    MatchingSubfolder,
    TranscriptsSubfolder,
    DriveSearch,
}

impl Strategy {
    /// Cascade order.
    pub const CASCADE: [Strategy; 5] = [
        Strategy::StreamChildren,
        Strategy::ParentRescan,
        Strategy::MatchingSubfolder,
        Strategy::TranscriptsSubfolder,
        Strategy::DriveSearch,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::StreamChildren => "stream_children",
            Strategy::ParentRescan => "parent_rescan",
            Strategy::MatchingSubfolder => "matching_subfolder",
            Strategy::TranscriptsSubfolder => "transcripts_subfolder",
            Strategy::DriveSearch => "drive_search",
        }
    }
}

/// A transcript located for a recording, with the strategy that found it.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub transcript: ResolvedTranscript,
    pub strategy: Strategy,
}

/// The parent listing is fetched at most once and shared by strategies 3–5.
enum ParentListing {
    Unfetched,
    Fetched(Vec<DriveItem>),
    Failed,
}

struct Resolver<'a> {
    lookup: &'a dyn DriveLookup,
    recording: &'a RecordingFile,
    consumed: &'a ConsumedSet,
    base: BaseName,
    parent: ParentListing,
}

/// Run strategies 2–6 for `recording`.
///
/// Returns `None` when every strategy comes up empty. That is not an error;
/// it is reported to `sink` and the scan carries on.
pub async fn resolve_transcript(
    lookup: &dyn DriveLookup,
    sink: &dyn ActivitySink,
    recording: &RecordingFile,
    consumed: &ConsumedSet,
) -> Option<Resolution> {
    let mut resolver = Resolver {
        lookup,
        recording,
        consumed,
        base: naming::base_name(&recording.name),
        parent: ParentListing::Unfetched,
    };

    for strategy in Strategy::CASCADE {
        let outcome = match resolver.locate(strategy).await {
            Ok(Some(item)) => resolver.fetch(&item).await.map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(Some(transcript)) => {
                sink.info(
                    "resolver.matched",
                    &format!("Found transcript for {}", recording.name),
                    json!({
                        "recording": recording.name,
                        "transcript": transcript.file_name,
                        "strategy": strategy.name(),
                    }),
                )
                .await;
                return Some(Resolution {
                    transcript,
                    strategy,
                });
            }
            Ok(None) => {
                sink.debug(
                    "resolver.miss",
                    &format!("{} found nothing", strategy.name()),
                    json!({ "recording": recording.name, "baseName": resolver.base.as_str() }),
                )
                .await;
            }
            Err(e) => {
                sink.debug(
                    "resolver.lookup_failed",
                    &format!("{} failed: {:#}", strategy.name(), e),
                    json!({ "recording": recording.name, "strategy": strategy.name() }),
                )
                .await;
            }
        }
    }

    sink.info(
        "resolver.exhausted",
        &format!("No transcript found for {}", recording.name),
        json!({ "recording": recording.name, "baseName": resolver.base.as_str() }),
    )
    .await;
    None
}

impl Resolver<'_> {
    async fn locate(&mut self, strategy: Strategy) -> Result<Option<DriveItem>> {
        match strategy {
            Strategy::StreamChildren => self.stream_children().await,
            Strategy::ParentRescan => self.parent_rescan().await,
            Strategy::MatchingSubfolder => self.matching_subfolder().await,
            Strategy::TranscriptsSubfolder => self.transcripts_subfolder().await,
            Strategy::DriveSearch => self.drive_search().await,
        }
    }

    fn available(&self, item: &DriveItem) -> bool {
        item.is_vtt() && !self.consumed.contains(&item.name)
    }

    /// Some platforms attach derived transcripts as children of the video.
    async fn stream_children(&self) -> Result<Option<DriveItem>> {
        let children = self.lookup.list_children(&self.recording.id).await?;
        Ok(children.into_iter().find(|c| self.available(c)))
    }

    async fn parent_rescan(&mut self) -> Result<Option<DriveItem>> {
        let listing = self.parent_listing().await?.to_vec();
        let best = listing
            .iter()
            .filter(|item| self.available(item))
            .filter_map(|item| naming::match_rule(&self.base, &item.name).map(|rule| (rule, item)))
            .min_by_key(|(rule, _)| *rule)
            .map(|(_, item)| item.clone());
        Ok(best)
    }

    /// Takes the first `.vtt` in the subfolder without checking its name.
    async fn matching_subfolder(&mut self) -> Result<Option<DriveItem>> {
        if self.base.is_empty() {
            return Ok(None);
        }
        let key = self.base.as_str().to_lowercase();
        let folder = self.parent_listing().await?.iter().find(|item| {
            let name = item.name.to_lowercase();
            item.is_folder() && (name == key || name.contains(&key))
        });
        let Some(folder) = folder.cloned() else {
            return Ok(None);
        };
        let children = self.lookup.list_children(&folder.id).await?;
        Ok(children.into_iter().find(|c| self.available(c)))
    }

    async fn transcripts_subfolder(&mut self) -> Result<Option<DriveItem>> {
        let folder = self.parent_listing().await?.iter().find(|item| {
            item.is_folder()
                && (item.name.eq_ignore_ascii_case("transcript")
                    || item.name.eq_ignore_ascii_case("transcripts"))
        });
        let Some(folder) = folder.cloned() else {
            return Ok(None);
        };
        let children = self.lookup.list_children(&folder.id).await?;
        Ok(children
            .into_iter()
            .find(|c| self.available(c) && naming::contains_first_token(&self.base, &c.name)))
    }

    /// Every query is tried even if an earlier one errors.
    async fn drive_search(&self) -> Result<Option<DriveItem>> {
        let mut last_err = None;
        for query in naming::search_queries(&self.base) {
            match self.lookup.search(&query).await {
                Ok(results) => {
                    if let Some(hit) = results.into_iter().find(|r| self.available(r)) {
                        return Ok(Some(hit));
                    }
                }
                Err(e) => last_err = Some(e.context(format!("search '{}'", query))),
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    async fn parent_listing(&mut self) -> Result<&[DriveItem]> {
        if let ParentListing::Unfetched = self.parent {
            match self.fetch_parent_listing().await {
                Ok(items) => self.parent = ParentListing::Fetched(items),
                Err(e) => {
                    self.parent = ParentListing::Failed;
                    return Err(e);
                }
            }
        }
        match &self.parent {
            ParentListing::Fetched(items) => Ok(items),
            _ => Ok(&[]),
        }
    }

    async fn fetch_parent_listing(&self) -> Result<Vec<DriveItem>> {
        let item = self.lookup.get_item(&self.recording.id).await?;
        let parent_id = item
            .parent_id
            .ok_or_else(|| anyhow!("{} has no parent reference", self.recording.name))?;
        self.lookup.list_children(&parent_id).await
    }

    async fn fetch(&self, item: &DriveItem) -> Result<ResolvedTranscript> {
        fetch_transcript(self.lookup, item, Some(self.recording)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::MemorySink;
    use crate::testing::{file, folder, recording_item, vtt, FakeDrive};

    fn recording(drive: &FakeDrive, name: &str) -> RecordingFile {
        drive.item(name).as_recording().unwrap()
    }

    #[tokio::test]
    async fn stream_children_wins_first() {
        let drive = FakeDrive::new()
            .with_root(vec![recording_item("rec1", "Sync_240115UTC-Meeting Recording.mp4")])
            .with_children("rec1", vec![vtt("t1", "anything.vtt", "WEBVTT\n\nattached")]);
        let sink = MemorySink::new();
        let rec = recording(&drive, "Sync_240115UTC-Meeting Recording.mp4");

        let res = resolve_transcript(&drive, &sink, &rec, &ConsumedSet::new())
            .await
            .unwrap();
        assert_eq!(res.strategy, Strategy::StreamChildren);
        assert_eq!(res.transcript.file_name, "anything.vtt");
        assert_eq!(res.transcript.content, "WEBVTT\n\nattached");
        assert_eq!(
            res.transcript.associated_video_file_name.as_deref(),
            Some("Sync_240115UTC-Meeting Recording.mp4")
        );
        assert!(drive.search_log().is_empty());
    }

    #[tokio::test]
    async fn parent_rescan_prefers_strictest_rule() {
        let drive = FakeDrive::new()
            .with_children(
                "parent",
                vec![
                    recording_item("rec1", "Sync-Meeting Recording.mp4"),
                    vtt("loose", "Sync notes (old).vtt", "old"),
                    vtt("exact", "Sync.vtt", "exact"),
                ],
            );
        let sink = MemorySink::new();
        let rec = recording(&drive, "Sync-Meeting Recording.mp4");

        let res = resolve_transcript(&drive, &sink, &rec, &ConsumedSet::new())
            .await
            .unwrap();
        assert_eq!(res.strategy, Strategy::ParentRescan);
        assert_eq!(res.transcript.file_name, "Sync.vtt");
    }

    #[tokio::test]
    async fn matching_subfolder_takes_first_vtt_unconditionally() {
        let drive = FakeDrive::new()
            .with_children(
                "parent",
                vec![
                    recording_item("rec1", "Budget Review_240301UTC-Meeting Recording.mp4"),
                    folder("sub", "Budget Review files"),
                ],
            )
            .with_children("sub", vec![vtt("t", "zzz.vtt", "from subfolder")]);
        let sink = MemorySink::new();
        let rec = recording(&drive, "Budget Review_240301UTC-Meeting Recording.mp4");

        let res = resolve_transcript(&drive, &sink, &rec, &ConsumedSet::new())
            .await
            .unwrap();
        assert_eq!(res.strategy, Strategy::MatchingSubfolder);
        assert_eq!(res.transcript.file_name, "zzz.vtt");
    }

    #[tokio::test]
    async fn transcripts_subfolder_requires_first_token() {
        let drive = FakeDrive::new()
            .with_children(
                "parent",
                vec![
                    recording_item("rec1", "Standup-Team A-Meeting Recording.mp4"),
                    folder("tx", "Transcripts"),
                ],
            )
            .with_children(
                "tx",
                vec![
                    vtt("other", "Retro.vtt", "retro"),
                    vtt("mine", "Standup 2024-03-01.vtt", "standup"),
                ],
            );
        let sink = MemorySink::new();
        let rec = recording(&drive, "Standup-Team A-Meeting Recording.mp4");

        let res = resolve_transcript(&drive, &sink, &rec, &ConsumedSet::new())
            .await
            .unwrap();
        assert_eq!(res.strategy, Strategy::TranscriptsSubfolder);
        assert_eq!(res.transcript.file_name, "Standup 2024-03-01.vtt");
    }

    #[tokio::test]
    async fn search_runs_queries_in_order_and_skips_non_vtt() {
        let drive = FakeDrive::new()
            .with_root(vec![recording_item("rec1", "Kickoff-Q3-Meeting Recording.mp4")])
            .with_search("Kickoff-Q3.vtt", vec![])
            .with_search(
                "Kickoff-Q3-transcript.vtt",
                vec![file("doc", "Kickoff-Q3-transcript.vtt.docx", "x")],
            )
            .with_search("Kickoff.vtt", vec![vtt("hit", "Kickoff.vtt", "found")]);
        let sink = MemorySink::new();
        let rec = recording(&drive, "Kickoff-Q3-Meeting Recording.mp4");

        let res = resolve_transcript(&drive, &sink, &rec, &ConsumedSet::new())
            .await
            .unwrap();
        assert_eq!(res.strategy, Strategy::DriveSearch);
        assert_eq!(res.transcript.content, "found");
        assert_eq!(
            drive.search_log(),
            vec!["Kickoff-Q3.vtt", "Kickoff-Q3-transcript.vtt", "Kickoff.vtt"]
        );
    }

    #[tokio::test]
    async fn search_hit_without_download_url_is_fetched_by_id() {
        let mut hit = vtt("hit", "Kickoff.vtt", "by id");
        hit.item.download_url = None;
        let drive = FakeDrive::new()
            .with_root(vec![recording_item("rec1", "Kickoff-Meeting Recording.mp4")])
            .with_item(vtt("hit", "Kickoff.vtt", "by id"))
            .with_search("Kickoff.vtt", vec![hit]);
        let rec = recording(&drive, "Kickoff-Meeting Recording.mp4");

        let res = resolve_transcript(&drive, &MemorySink::new(), &rec, &ConsumedSet::new())
            .await
            .unwrap();
        assert_eq!(res.transcript.content, "by id");
    }

    #[tokio::test]
    async fn failures_fall_through_to_next_strategy() {
        let drive = FakeDrive::new()
            .with_root(vec![recording_item("rec1", "Demo-Meeting Recording.mp4")])
            .failing_children("rec1")
            .with_search("Demo.vtt", vec![vtt("broken", "Demo.vtt", "x")])
            .failing_download("broken")
            .with_search("Demo-transcript.vtt", vec![]);
        let sink = MemorySink::new();
        let rec = recording(&drive, "Demo-Meeting Recording.mp4");

        // Children listing fails, the parent holds nothing useful, the search hit fails to download.
        let res = resolve_transcript(&drive, &sink, &rec, &ConsumedSet::new()).await;
        assert!(res.is_none());
        let actions = sink.actions();
        assert!(actions.contains(&"resolver.lookup_failed".to_string()));
        assert_eq!(actions.last().map(String::as_str), Some("resolver.exhausted"));
    }

    #[tokio::test]
    async fn consumed_transcripts_are_skipped() {
        let drive = FakeDrive::new()
            .with_root(vec![recording_item("rec1", "Sync-Meeting Recording.mp4")])
            .with_children("rec1", vec![vtt("t1", "Sync.vtt", "taken")]);
        let mut consumed = ConsumedSet::new();
        consumed.insert("Sync.vtt");
        let rec = recording(&drive, "Sync-Meeting Recording.mp4");

        let res = resolve_transcript(&drive, &MemorySink::new(), &rec, &consumed).await;
        assert!(res.is_none());
    }
}
