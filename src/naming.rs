//! Recording name normalization and transcript name matching.
//!
//! Teams stores recordings as `<title>_<yyMMdd>UTC-Meeting Recording.mp4`
//! (older tenants drop the timestamp). The transcript for that meeting is
//! usually named after `<title>`, so matching works on a [`BaseName`]
//! derived from the recording's file name.
//!
//! All comparisons are ASCII case-insensitive.

use std::fmt;

const TIMESTAMPED_SUFFIX: &str = "utc-meeting recording.mp4";
const TIMESTAMP_DIGITS: usize = 6;
const PLAIN_SUFFIX: &str = "-meeting recording.mp4";
const MP4_SUFFIX: &str = ".mp4";

/// A recording's file name with its platform suffix removed.
///
/// Only ever used as a lookup key; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaseName(String);

impl BaseName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `-`-separated segment, trimmed. `"Standup-Team A"` → `"Standup"`.
    pub fn first_token(&self) -> &str {
        self.0.split('-').next().unwrap_or_default().trim()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for BaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BaseName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the matching key for a recording file name.
///
/// Rules are tried in order and the first that strips something wins:
///
/// 1. `_` + 6 digits + `UTC-Meeting Recording.mp4`
/// 2. `-Meeting Recording.mp4`
/// 3. `.mp4`
///
/// A name matching none of them is returned unchanged.
pub fn base_name(recording_name: &str) -> BaseName {
    // ASCII lowering keeps byte offsets aligned with the original.
    let lower = recording_name.to_ascii_lowercase();

    if let Some(stem) = strip_timestamped_suffix(recording_name, &lower) {
        return BaseName(stem.to_string());
    }
    for suffix in [PLAIN_SUFFIX, MP4_SUFFIX] {
        if lower.ends_with(suffix) {
            return BaseName(recording_name[..recording_name.len() - suffix.len()].to_string());
        }
    }
    BaseName(recording_name.to_string())
}

fn strip_timestamped_suffix<'a>(name: &'a str, lower: &str) -> Option<&'a str> {
    let head = lower.strip_suffix(TIMESTAMPED_SUFFIX)?;
    let bytes = head.as_bytes();
    if bytes.len() < TIMESTAMP_DIGITS + 1 {
        return None;
    }
    let digits = &bytes[bytes.len() - TIMESTAMP_DIGITS..];
    let sep = bytes[bytes.len() - TIMESTAMP_DIGITS - 1];
    if sep != b'_' || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some(&name[..bytes.len() - TIMESTAMP_DIGITS - 1])
}

/// Which rule accepted a candidate, strictest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchRule {
    Exact,
    ExactTranscriptSuffix,
    Prefix,
    FirstToken,
}

/// Return the strictest rule under which `file_name` is a transcript for `base`.
///
/// Only `.vtt` names are considered. The first-token rule is deliberately
/// loose to catch renamed files; callers confirm by downloading the content.
/// Empty keys never match through the prefix or token rules.
pub fn match_rule(base: &BaseName, file_name: &str) -> Option<MatchRule> {
    let name = file_name.to_ascii_lowercase();
    if !name.ends_with(".vtt") {
        return None;
    }
    let key = base.as_str().to_ascii_lowercase();

    if name == format!("{}.vtt", key) {
        return Some(MatchRule::Exact);
    }
    if name == format!("{}-transcript.vtt", key) {
        return Some(MatchRule::ExactTranscriptSuffix);
    }
    if !key.is_empty() && name.starts_with(&key) {
        return Some(MatchRule::Prefix);
    }
    let token = base.first_token().to_ascii_lowercase();
    if !token.is_empty() && name.contains(&token) {
        return Some(MatchRule::FirstToken);
    }
    None
}

/// Whether `file_name` is an acceptable transcript for `base`.
pub fn matches(base: &BaseName, file_name: &str) -> bool {
    match_rule(base, file_name).is_some()
}

/// Whether `file_name` is a `.vtt` that contains the first token of `base`.
pub fn contains_first_token(base: &BaseName, file_name: &str) -> bool {
    let name = file_name.to_ascii_lowercase();
    let token = base.first_token().to_ascii_lowercase();
    name.ends_with(".vtt") && !token.is_empty() && name.contains(&token)
}

/// Name of the exactly matching transcript, `"<base>.vtt"`.
pub fn exact_transcript_name(base: &BaseName) -> String {
    format!("{}.vtt", base.as_str())
}

/// Drive search queries for a recording, in the order they are issued.
pub fn search_queries(base: &BaseName) -> Vec<String> {
    let token = base.first_token();
    let mut queries = vec![
        format!("{}.vtt", base.as_str()),
        format!("{}-transcript.vtt", base.as_str()),
    ];
    if !token.is_empty() {
        queries.push(format!("{}.vtt", token));
        queries.push(token.to_string());
    }
    let mut seen = std::collections::HashSet::new();
    queries.retain(|q| seen.insert(q.to_ascii_lowercase()));
    queries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_timestamped_recording_suffix() {
        let base = base_name("Weekly Sync_240115UTC-Meeting Recording.mp4");
        assert_eq!(base.as_str(), "Weekly Sync");
    }

    #[test]
    fn timestamped_suffix_is_case_insensitive() {
        let base = base_name("Design Review_991231utc-meeting recording.MP4");
        assert_eq!(base.as_str(), "Design Review");
    }

    #[test]
    fn strips_plain_recording_suffix() {
        assert_eq!(base_name("Planning-Meeting Recording.mp4").as_str(), "Planning");
    }

    #[test]
    fn short_timestamp_falls_back_to_plain_suffix() {
        // Five digits is not a timestamp; rule 2 strips "-Meeting Recording.mp4".
        let base = base_name("Retro_24011UTC-Meeting Recording.mp4");
        assert_eq!(base.as_str(), "Retro_24011UTC");
    }

    #[test]
    fn bare_mp4_strips_extension() {
        assert_eq!(base_name("Onboarding.mp4").as_str(), "Onboarding");
    }

    #[test]
    fn unrelated_name_is_unchanged() {
        assert_eq!(base_name("notes.txt").as_str(), "notes.txt");
        assert_eq!(base_name("").as_str(), "");
    }

    #[test]
    fn preserves_non_ascii_titles() {
        let base = base_name("Réunion d'équipe_240301UTC-Meeting Recording.mp4");
        assert_eq!(base.as_str(), "Réunion d'équipe");
    }

    #[test]
    fn first_token_splits_on_hyphen() {
        assert_eq!(base_name("Standup-Team A.mp4").first_token(), "Standup");
        assert_eq!(base_name("Weekly Sync.mp4").first_token(), "Weekly Sync");
    }

    #[test]
    fn exact_name_always_matches() {
        for name in ["Weekly Sync", "a-b-c", "x", "Réunion"] {
            let base = BaseName(name.to_string());
            assert_eq!(match_rule(&base, &format!("{}.vtt", name)), Some(MatchRule::Exact));
        }
    }

    #[test]
    fn rules_are_ordered_strictest_first() {
        let base = base_name("Standup-Team A_240115UTC-Meeting Recording.mp4");
        assert_eq!(
            match_rule(&base, "Standup-Team A-transcript.vtt"),
            Some(MatchRule::ExactTranscriptSuffix)
        );
        assert_eq!(match_rule(&base, "Standup-Team A (1).vtt"), Some(MatchRule::Prefix));
        assert_eq!(match_rule(&base, "copy of Standup.vtt"), Some(MatchRule::FirstToken));
    }

    #[test]
    fn unrelated_vtt_does_not_match() {
        let base = base_name("Weekly Sync_240115UTC-Meeting Recording.mp4");
        assert!(!matches(&base, "unrelated.vtt"));
    }

    #[test]
    fn non_vtt_never_matches() {
        let base = base_name("Weekly Sync.mp4");
        assert!(!matches(&base, "Weekly Sync.txt"));
        assert!(!matches(&base, "Weekly Sync.docx"));
    }

    #[test]
    fn empty_base_only_matches_exactly() {
        let base = base_name(".mp4");
        assert!(base.is_empty());
        assert!(matches(&base, ".vtt"));
        assert!(!matches(&base, "anything.vtt"));
    }

    #[test]
    fn search_queries_skip_repeats() {
        let base = base_name("Weekly Sync.mp4");
        assert_eq!(
            search_queries(&base),
            vec!["Weekly Sync.vtt", "Weekly Sync-transcript.vtt", "Weekly Sync"]
        );
    }

    #[test]
    fn search_queries_follow_cascade_order() {
        let base = base_name("Standup-Team A.mp4");
        assert_eq!(
            search_queries(&base),
            vec![
                "Standup-Team A.vtt",
                "Standup-Team A-transcript.vtt",
                "Standup.vtt",
                "Standup",
            ]
        );
    }
}
