//! Row projections for tracker rules, activity, and backups.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

fn decode_enum<T>(column: &'static str, raw: &str, parse: impl Fn(&str) -> Option<T>) -> Result<T, sqlx::Error> {
    parse(raw).ok_or_else(|| {
        sqlx::Error::Decode(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{column} holds unrecognised value {raw:?}"),
        )))
    })
}

/// How a rule's `categories`/`tags` filter combines with the torrent's own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMatchMode {
    /// Torrent matches if it carries any of the rule's tags.
    Any,
    /// Torrent matches only if it carries all of the rule's tags.
    All,
}

impl TagMatchMode {
    /// Canonical column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::All => "all",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "any" => Some(Self::Any),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

/// What a rule does to a torrent it decides to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// No deletion; the rule only adjusts limits.
    None,
    /// Remove the torrent from qBittorrent, keeping downloaded files.
    Delete,
    /// Remove the torrent and its downloaded files.
    DeleteWithFiles,
    /// Remove the torrent and its files, unless another torrent shares the
    /// same content path (a cross-seed), in which case files are kept.
    DeleteWithFilesPreserveCrossSeeds,
}

impl DeleteMode {
    /// Canonical column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Delete => "delete",
            Self::DeleteWithFiles => "delete_with_files",
            Self::DeleteWithFilesPreserveCrossSeeds => "delete_with_files_preserve_cross_seeds",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "none" => Some(Self::None),
            "delete" => Some(Self::Delete),
            "delete_with_files" => Some(Self::DeleteWithFiles),
            "delete_with_files_preserve_cross_seeds" => Some(Self::DeleteWithFilesPreserveCrossSeeds),
            _ => None,
        }
    }
}

/// A tracker rule evaluated against every torrent on its instance
///.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerRule {
    /// Primary key.
    pub id: i64,
    /// Instance this rule applies to.
    pub instance_id: i64,
    /// Whether this rule is evaluated at all.
    pub enabled: bool,
    /// Glob-style pattern matched against the torrent's tracker announce URL.
    pub tracker_pattern: String,
    /// Category filter; empty means "any category".
    pub categories: Vec<String>,
    /// Tag filter; empty means "any tags".
    pub tags: Vec<String>,
    /// How `tags` combines with the torrent's own tag set.
    pub tag_match_mode: TagMatchMode,
    /// Upload limit to apply, in KiB/s.
    pub upload_limit_kib: Option<i64>,
    /// Download limit to apply, in KiB/s.
    pub download_limit_kib: Option<i64>,
    /// Ratio at or above which the torrent becomes a delete candidate.
    pub ratio_limit: Option<f64>,
    /// Seeding time at or above which the torrent becomes a delete candidate.
    pub seeding_time_limit_minutes: Option<i64>,
    /// What to do with a matching torrent that crossed a delete threshold.
    pub delete_mode: Option<DeleteMode>,
    /// Whether torrents the tracker reports as unregistered are deleted.
    pub delete_unregistered: bool,
    /// Evaluation order tiebreaker; lower runs first.
    pub priority: i32,
}

impl<'r> FromRow<'r, PgRow> for TrackerRule {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let tag_match_mode: String = row.try_get("tag_match_mode")?;
        let delete_mode: Option<String> = row.try_get("delete_mode")?;
        Ok(Self {
            id: row.try_get("id")?,
            instance_id: row.try_get("instance_id")?,
            enabled: row.try_get("enabled")?,
            tracker_pattern: row.try_get("tracker_pattern")?,
            categories: row.try_get("categories")?,
            tags: row.try_get("tags")?,
            tag_match_mode: decode_enum("tag_match_mode", &tag_match_mode, TagMatchMode::parse)?,
            upload_limit_kib: row.try_get("upload_limit_kib")?,
            download_limit_kib: row.try_get("download_limit_kib")?,
            ratio_limit: row.try_get("ratio_limit")?,
            seeding_time_limit_minutes: row.try_get("seeding_time_limit_minutes")?,
            delete_mode: delete_mode
                .map(|raw| decode_enum("delete_mode", &raw, DeleteMode::parse))
                .transpose()?,
            delete_unregistered: row.try_get("delete_unregistered")?,
            priority: row.try_get("priority")?,
        })
    }
}

/// Fields accepted when creating or replacing a [`TrackerRule`].
#[derive(Debug, Clone)]
pub struct NewTrackerRule {
    /// Instance this rule applies to.
    pub instance_id: i64,
    /// Whether the rule is evaluated.
    pub enabled: bool,
    /// Tracker pattern.
    pub tracker_pattern: String,
    /// Category filter.
    pub categories: Vec<String>,
    /// Tag filter.
    pub tags: Vec<String>,
    /// Tag filter combination mode.
    pub tag_match_mode: TagMatchMode,
    /// Upload limit, KiB/s.
    pub upload_limit_kib: Option<i64>,
    /// Download limit, KiB/s.
    pub download_limit_kib: Option<i64>,
    /// Ratio threshold.
    pub ratio_limit: Option<f64>,
    /// Seeding time threshold, minutes.
    pub seeding_time_limit_minutes: Option<i64>,
    /// Delete behaviour.
    pub delete_mode: Option<DeleteMode>,
    /// Whether unregistered torrents are deleted.
    pub delete_unregistered: bool,
    /// Evaluation order tiebreaker.
    pub priority: i32,
}

/// One recorded rule-engine decision.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ActivityEntry {
    /// Primary key.
    pub id: i64,
    /// Instance the activity occurred on.
    pub instance_id: i64,
    /// Torrent hash the activity concerns.
    pub hash: String,
    /// Torrent name at the time of the activity, if known.
    pub torrent_name: Option<String>,
    /// Tracker domain at the time of the activity, if known.
    pub tracker_domain: Option<String>,
    /// What kind of action was taken (e.g. `deleted_ratio`, `limits_applied`).
    pub action: String,
    /// The rule responsible, if any.
    pub rule_id: Option<i64>,
    /// The rule's name at the time, if any.
    pub rule_name: Option<String>,
    /// `success` or `failure`.
    pub outcome: String,
    /// Human-readable justification.
    pub reason: String,
    /// Arbitrary structured detail (e.g. the mutation payload attempted).
    pub details: Option<Value>,
    /// When the activity was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Fields accepted when recording a new [`ActivityEntry`].
#[derive(Debug, Clone)]
pub struct NewActivityEntry {
    /// Instance the activity occurred on.
    pub instance_id: i64,
    /// Torrent hash.
    pub hash: String,
    /// Torrent name, if known.
    pub torrent_name: Option<String>,
    /// Tracker domain, if known.
    pub tracker_domain: Option<String>,
    /// Action label.
    pub action: String,
    /// Responsible rule, if any.
    pub rule_id: Option<i64>,
    /// Rule name, if any.
    pub rule_name: Option<String>,
    /// Outcome label.
    pub outcome: String,
    /// Justification.
    pub reason: String,
    /// Structured detail.
    pub details: Option<Value>,
}

/// The cadence a backup run was requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    /// Hourly scheduled backup.
    Hourly,
    /// Daily scheduled backup.
    Daily,
    /// Weekly scheduled backup.
    Weekly,
    /// Monthly scheduled backup.
    Monthly,
    /// User-requested, out-of-band backup.
    Manual,
}

impl BackupKind {
    /// Canonical column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Manual => "manual",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }

    /// The four recurring kinds, in ascending cadence order. `Manual` is
    /// excluded: it has no schedule to miss.
    #[must_use]
    pub const fn recurring() -> [Self; 4] {
        [Self::Hourly, Self::Daily, Self::Weekly, Self::Monthly]
    }
}

/// A backup run's progress through its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Queued, not yet picked up by a worker.
    Pending,
    /// Actively executing.
    Running,
    /// Completed without error.
    Success,
    /// Completed with an error, or recovered as interrupted.
    Failed,
}

impl RunStatus {
    /// Canonical column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One backup run.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupRun {
    /// Primary key.
    pub id: i64,
    /// Instance backed up.
    pub instance_id: i64,
    /// Requested cadence.
    pub kind: BackupKind,
    /// Current state-machine status.
    pub status: RunStatus,
    /// Who or what requested the run (`"scheduler"`, `"startup-recovery"`,
    /// or a user identity).
    pub requested_by: String,
    /// When the run was requested.
    pub requested_at: DateTime<Utc>,
    /// When execution began.
    pub started_at: Option<DateTime<Utc>>,
    /// When execution ended, successfully or not.
    pub completed_at: Option<DateTime<Utc>>,
    /// Path to the written manifest file, once known.
    pub manifest_path: Option<String>,
    /// Total bytes across all exported torrents.
    pub total_bytes: i64,
    /// Number of torrents exported.
    pub torrent_count: i64,
    /// Per-category torrent counts.
    pub category_counts: Value,
    /// Distinct categories observed in this run.
    pub categories: Vec<String>,
    /// Distinct tags observed in this run.
    pub tags: Vec<String>,
    /// Failure detail, if `status == Failed`.
    pub error_message: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for BackupRun {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("kind")?;
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            instance_id: row.try_get("instance_id")?,
            kind: decode_enum("kind", &kind, BackupKind::parse)?,
            status: decode_enum("status", &status, RunStatus::parse)?,
            requested_by: row.try_get("requested_by")?,
            requested_at: row.try_get("requested_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            manifest_path: row.try_get("manifest_path")?,
            total_bytes: row.try_get("total_bytes")?,
            torrent_count: row.try_get("torrent_count")?,
            category_counts: row.try_get("category_counts")?,
            categories: row.try_get("categories")?,
            tags: row.try_get("tags")?,
            error_message: row.try_get("error_message")?,
        })
    }
}

/// Fields accepted when queueing a new [`BackupRun`].
#[derive(Debug, Clone)]
pub struct NewBackupRun {
    /// Instance to back up.
    pub instance_id: i64,
    /// Cadence this run represents.
    pub kind: BackupKind,
    /// Requester identity.
    pub requested_by: String,
    /// Request timestamp.
    pub requested_at: DateTime<Utc>,
}

/// One exported torrent within a [`BackupRun`].
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct BackupItem {
    /// Owning run.
    pub run_id: i64,
    /// Torrent hash.
    pub torrent_hash: String,
    /// Torrent name at export time.
    pub name: String,
    /// Size in bytes.
    pub size_bytes: i64,
    /// Category at export time, if any.
    pub category: Option<String>,
    /// Path to the archived `.torrent`/content relative to the manifest.
    pub archive_rel_path: Option<String>,
    /// BitTorrent v1 infohash, if known.
    pub infohash_v1: Option<String>,
    /// BitTorrent v2 infohash, if known.
    pub infohash_v2: Option<String>,
    /// Raw, comma-joined tag string as reported by the daemon.
    pub tags_raw: Option<String>,
    /// Content-addressed path to the stored `.torrent` blob, if any.
    pub torrent_blob_path: Option<String>,
}

/// Per-instance backup policy.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct BackupSettings {
    /// Instance these settings apply to.
    pub instance_id: i64,
    /// Master on/off switch; overrides all cadence flags when `false`.
    pub enabled: bool,
    /// Whether hourly backups run.
    pub hourly_enabled: bool,
    /// Whether daily backups run.
    pub daily_enabled: bool,
    /// Whether weekly backups run.
    pub weekly_enabled: bool,
    /// Whether monthly backups run.
    pub monthly_enabled: bool,
    /// Hourly runs retained.
    pub keep_hourly: i32,
    /// Daily runs retained.
    pub keep_daily: i32,
    /// Weekly runs retained.
    pub keep_weekly: i32,
    /// Monthly runs retained.
    pub keep_monthly: i32,
    /// Categories to include; empty means "all categories".
    pub include_categories: Vec<String>,
    /// Tags to include; empty means "all tags".
    pub include_tags: Vec<String>,
}

impl BackupSettings {
    /// Whether `kind`'s cadence flag is enabled (and the master switch is on).
    #[must_use]
    pub const fn kind_enabled(&self, kind: BackupKind) -> bool {
        self.enabled
            && match kind {
                BackupKind::Hourly => self.hourly_enabled,
                BackupKind::Daily => self.daily_enabled,
                BackupKind::Weekly => self.weekly_enabled,
                BackupKind::Monthly => self.monthly_enabled,
                BackupKind::Manual => true,
            }
    }

    /// `keep` count for `kind`, normalized so an enabled cadence always
    /// retains at least one run (an enabled kind always implies
    /// `keep[kind] >= 1`).
    #[must_use]
    pub const fn keep_for(&self, kind: BackupKind) -> i32 {
        let raw = match kind {
            BackupKind::Hourly => self.keep_hourly,
            BackupKind::Daily => self.keep_daily,
            BackupKind::Weekly => self.keep_weekly,
            BackupKind::Monthly => self.keep_monthly,
            BackupKind::Manual => i32::MAX,
        };
        if self.kind_enabled(kind) && raw < 1 { 1 } else { raw }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_match_mode_round_trips() {
        for mode in [TagMatchMode::Any, TagMatchMode::All] {
            assert_eq!(TagMatchMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(TagMatchMode::parse("bogus"), None);
    }

    #[test]
    fn delete_mode_round_trips() {
        let modes = [
            DeleteMode::None,
            DeleteMode::Delete,
            DeleteMode::DeleteWithFiles,
            DeleteMode::DeleteWithFilesPreserveCrossSeeds,
        ];
        for mode in modes {
            assert_eq!(DeleteMode::parse(mode.as_str()), Some(mode));
        }
    }

    #[test]
    fn backup_kind_round_trips() {
        for kind in BackupKind::recurring() {
            assert_eq!(BackupKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(BackupKind::parse(BackupKind::Manual.as_str()), Some(BackupKind::Manual));
    }

    #[test]
    fn run_status_round_trips() {
        for status in [RunStatus::Pending, RunStatus::Running, RunStatus::Success, RunStatus::Failed] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
    }

    fn settings(keep_daily: i32, daily_enabled: bool) -> BackupSettings {
        BackupSettings {
            instance_id: 1,
            enabled: true,
            hourly_enabled: false,
            daily_enabled,
            weekly_enabled: false,
            monthly_enabled: false,
            keep_hourly: 0,
            keep_daily,
            keep_weekly: 0,
            keep_monthly: 0,
            include_categories: vec![],
            include_tags: vec![],
        }
    }

    #[test]
    fn enabled_cadence_with_zero_keep_is_normalized_to_one() {
        let s = settings(0, true);
        assert_eq!(s.keep_for(BackupKind::Daily), 1);
    }

    #[test]
    fn disabled_cadence_keeps_raw_value() {
        let s = settings(0, false);
        assert_eq!(s.keep_for(BackupKind::Daily), 0);
        assert!(!s.kind_enabled(BackupKind::Daily));
    }

    #[test]
    fn master_switch_off_disables_every_cadence() {
        let mut s = settings(5, true);
        s.enabled = false;
        assert!(!s.kind_enabled(BackupKind::Daily));
    }
}
