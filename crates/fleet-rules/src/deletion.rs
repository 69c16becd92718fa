//! Deletion logic and cross-seed detection.

use fleet_data::model::{DeleteMode, TrackerRule};
use fleet_qbit::{BulkActionKind, Torrent};

/// Which threshold(s) triggered a deletion decision, used both to label the
/// recorded activity action and to render the tie-break reason text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteReason {
    /// Only the ratio threshold was crossed.
    Ratio,
    /// Only the seeding-time threshold was crossed.
    SeedingTime,
    /// Both thresholds were crossed.
    Both,
    /// The tracker reported this hash as unregistered.
    Unregistered,
}

impl DeleteReason {
    /// Human-readable justification recorded in the activity log.
    #[must_use]
    pub const fn reason_text(self) -> &'static str {
        match self {
            Self::Ratio => "ratio limit reached",
            Self::SeedingTime => "seeding time limit reached",
            Self::Both => "ratio and seeding time limits reached",
            Self::Unregistered => "tracker reports unregistered",
        }
    }

    /// The `ActivityEntry.action` label for this reason.
    #[must_use]
    pub const fn action_label(self) -> &'static str {
        match self {
            Self::Ratio | Self::Both => "deleted_ratio",
            Self::SeedingTime => "deleted_seeding",
            Self::Unregistered => "deleted_unregistered",
        }
    }
}

/// Decide whether a torrent crossed a rule's ratio or seeding-time
/// threshold and is complete, so it becomes a deletion candidate.
#[must_use]
pub fn should_delete_torrent(torrent: &Torrent, rule: &TrackerRule) -> Option<DeleteReason> {
    if torrent.progress < 1.0 {
        return None;
    }
    match rule.delete_mode {
        None | Some(DeleteMode::None) => return None,
        Some(_) => {}
    }
    let ratio_hit = rule.ratio_limit.is_some_and(|limit| limit > 0.0 && torrent.ratio >= limit);
    let seeding_hit = rule
        .seeding_time_limit_minutes
        .is_some_and(|minutes| minutes > 0 && torrent.seeding_time_sec >= minutes * 60);
    match (ratio_hit, seeding_hit) {
        (true, true) => Some(DeleteReason::Both),
        (true, false) => Some(DeleteReason::Ratio),
        (false, true) => Some(DeleteReason::SeedingTime),
        (false, false) => None,
    }
}

/// Normalize a content path for cross-seed comparison: backslashes become
/// forward slashes, a trailing slash is stripped, and case is folded.
#[must_use]
pub fn normalize_content_path(path: &str) -> String {
    path.replace('\\', "/").trim_end_matches('/').to_ascii_lowercase()
}

/// Whether another torrent in `all` shares `torrent`'s normalized content
/// path, marking it a cross-seed.
#[must_use]
pub fn is_cross_seed(torrent: &Torrent, all: &[Torrent]) -> bool {
    let normalized = normalize_content_path(&torrent.content_path);
    if normalized.is_empty() {
        return false;
    }
    all.iter()
        .any(|other| other.hash != torrent.hash && normalize_content_path(&other.content_path) == normalized)
}

/// Translate a rule's configured delete mode into the concrete bulk action
/// to issue, resolving `deleteWithFilesPreserveCrossSeeds` against whether a
/// cross-seed was detected for this torrent.
#[must_use]
pub fn resolve_delete_mode(mode: DeleteMode, cross_seed: bool) -> BulkActionKind {
    match mode {
        DeleteMode::DeleteWithFilesPreserveCrossSeeds => {
            if cross_seed {
                BulkActionKind::Delete
            } else {
                BulkActionKind::DeleteWithFiles
            }
        }
        DeleteMode::DeleteWithFiles => BulkActionKind::DeleteWithFiles,
        DeleteMode::Delete | DeleteMode::None => BulkActionKind::Delete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_data::model::TagMatchMode;

    fn torrent(hash: &str, progress: f64, ratio: f64, seeding_time_sec: i64, content_path: &str) -> Torrent {
        Torrent {
            hash: hash.to_string(),
            infohash_v1: None,
            infohash_v2: None,
            name: "n".to_string(),
            category: String::new(),
            tags: String::new(),
            tracker_url: String::new(),
            trackers: vec![],
            size: 0,
            ratio,
            ratio_limit: 0.0,
            upload_limit_bps: 0,
            download_limit_bps: 0,
            seeding_time_sec,
            seeding_time_limit: 0,
            progress,
            content_path: content_path.to_string(),
            added_on: 0,
        }
    }

    fn rule(delete_mode: Option<DeleteMode>, ratio_limit: Option<f64>, seeding_time_limit_minutes: Option<i64>) -> TrackerRule {
        TrackerRule {
            id: 1,
            instance_id: 1,
            enabled: true,
            tracker_pattern: "*".to_string(),
            categories: vec![],
            tags: vec![],
            tag_match_mode: TagMatchMode::Any,
            upload_limit_kib: None,
            download_limit_kib: None,
            ratio_limit,
            seeding_time_limit_minutes,
            delete_mode,
            delete_unregistered: false,
            priority: 1,
        }
    }

    #[test]
    fn incomplete_torrent_is_never_deleted() {
        let t = torrent("a", 0.9, 10.0, 100_000, "");
        let r = rule(Some(DeleteMode::Delete), Some(2.0), None);
        assert!(should_delete_torrent(&t, &r).is_none());
    }

    #[test]
    fn none_delete_mode_is_never_deleted() {
        let t = torrent("a", 1.0, 10.0, 0, "");
        let r = rule(Some(DeleteMode::None), Some(2.0), None);
        assert!(should_delete_torrent(&t, &r).is_none());
    }

    #[test]
    fn ratio_only_is_reported_as_ratio() {
        let t = torrent("a", 1.0, 3.0, 0, "");
        let r = rule(Some(DeleteMode::Delete), Some(2.0), None);
        assert_eq!(should_delete_torrent(&t, &r), Some(DeleteReason::Ratio));
    }

    #[test]
    fn both_thresholds_report_combined_reason() {
        let t = torrent("a", 1.0, 3.0, 7200, "");
        let r = rule(Some(DeleteMode::Delete), Some(2.0), Some(60));
        assert_eq!(should_delete_torrent(&t, &r), Some(DeleteReason::Both));
        assert_eq!(DeleteReason::Both.reason_text(), "ratio and seeding time limits reached");
    }

    #[test]
    fn zero_limit_never_triggers() {
        let t = torrent("a", 1.0, 0.0, 0, "");
        let r = rule(Some(DeleteMode::Delete), Some(0.0), None);
        assert!(should_delete_torrent(&t, &r).is_none());
    }

    #[test]
    fn cross_seed_detected_by_normalized_shared_path() {
        let a = torrent("a", 1.0, 1.0, 0, "/data/Movies/X/");
        let b = torrent("b", 1.0, 1.0, 0, "/data/movies/x");
        assert!(is_cross_seed(&a, &[a.clone(), b]));
    }

    #[test]
    fn empty_content_path_is_never_a_cross_seed() {
        let a = torrent("a", 1.0, 1.0, 0, "");
        let b = torrent("b", 1.0, 1.0, 0, "");
        assert!(!is_cross_seed(&a, &[a.clone(), b]));
    }

    #[test]
    fn preserve_cross_seeds_falls_back_to_delete_when_shared() {
        assert_eq!(
            resolve_delete_mode(DeleteMode::DeleteWithFilesPreserveCrossSeeds, true),
            BulkActionKind::Delete
        );
        assert_eq!(
            resolve_delete_mode(DeleteMode::DeleteWithFilesPreserveCrossSeeds, false),
            BulkActionKind::DeleteWithFiles
        );
    }

    #[test]
    fn normalize_content_path_folds_case_and_separators() {
        assert_eq!(normalize_content_path("C:\\Data\\Movies\\"), "c:/data/movies");
    }
}
