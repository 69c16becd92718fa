//! Mutation batching: bucket torrents by desired setting,
//! then split each bucket into sub-batches bounded by `MaxBatchHashes`.

use std::collections::HashMap;

use fleet_data::model::TrackerRule;
use fleet_qbit::Torrent;

/// Bucket key for a share-limit mutation: the exact `{ratio, seedingMinutes}`
/// pair a group of torrents should converge on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShareLimitKey {
    ratio_bits: u64,
    seeding_minutes: i64,
}

impl ShareLimitKey {
    fn new(ratio_limit: f64, seeding_minutes: i64) -> Self {
        Self {
            ratio_bits: ratio_limit.to_bits(),
            seeding_minutes,
        }
    }

    /// The ratio limit this key was built from.
    #[must_use]
    pub fn ratio_limit(&self) -> f64 {
        f64::from_bits(self.ratio_bits)
    }

    /// The seeding-time limit, in minutes, this key was built from.
    #[must_use]
    pub const fn seeding_minutes(&self) -> i64 {
        self.seeding_minutes
    }
}

/// The three mutation buckets one scan tick can produce.
#[derive(Debug, Default)]
pub struct MutationPlan {
    /// Desired upload limit (KiB/s) to matching hashes.
    pub upload: HashMap<i64, Vec<String>>,
    /// Desired download limit (KiB/s) to matching hashes.
    pub download: HashMap<i64, Vec<String>>,
    /// Desired share limit to matching hashes.
    pub share: HashMap<ShareLimitKey, Vec<String>>,
}

/// Build the mutation plan for a rule-matched torrent set, grouping by the
/// setting value and only including a hash in a bucket when its current
/// value differs from what the matched rule demands.
#[must_use]
pub fn plan_mutations(candidates: &[(Torrent, TrackerRule)]) -> MutationPlan {
    let mut plan = MutationPlan::default();
    for (torrent, rule) in candidates {
        if let Some(kib) = rule.upload_limit_kib {
            if torrent.upload_limit_bps != kib * 1024 {
                plan.upload.entry(kib).or_default().push(torrent.hash.clone());
            }
        }
        if let Some(kib) = rule.download_limit_kib {
            if torrent.download_limit_bps != kib * 1024 {
                plan.download.entry(kib).or_default().push(torrent.hash.clone());
            }
        }
        if rule.ratio_limit.is_some() || rule.seeding_time_limit_minutes.is_some() {
            let ratio = rule.ratio_limit.unwrap_or(0.0);
            let minutes = rule.seeding_time_limit_minutes.unwrap_or(0);
            if (torrent.ratio_limit - ratio).abs() > f64::EPSILON || torrent.seeding_time_limit != minutes {
                let key = ShareLimitKey::new(ratio, minutes);
                plan.share.entry(key).or_default().push(torrent.hash.clone());
            }
        }
    }
    plan
}

/// Split `hashes` into sub-batches of at most `max_batch_hashes`, preserving
/// order, so each sub-batch becomes exactly one mutation API call.
#[must_use]
pub fn sub_batches(hashes: &[String], max_batch_hashes: usize) -> Vec<Vec<String>> {
    hashes
        .chunks(max_batch_hashes.max(1))
        .map(<[String]>::to_vec)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_data::model::{DeleteMode, TagMatchMode};

    fn torrent(hash: &str, upload_bps: i64, ratio_limit: f64, seeding_time_limit: i64) -> Torrent {
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
            ratio: 0.0,
            ratio_limit,
            upload_limit_bps: upload_bps,
            download_limit_bps: 0,
            seeding_time_sec: 0,
            seeding_time_limit,
            progress: 0.0,
            content_path: String::new(),
            added_on: 0,
        }
    }

    fn rule(upload_limit_kib: Option<i64>, ratio_limit: Option<f64>, seeding_time_limit_minutes: Option<i64>) -> TrackerRule {
        TrackerRule {
            id: 1,
            instance_id: 1,
            enabled: true,
            tracker_pattern: "*".to_string(),
            categories: vec![],
            tags: vec![],
            tag_match_mode: TagMatchMode::Any,
            upload_limit_kib,
            download_limit_kib: None,
            ratio_limit,
            seeding_time_limit_minutes,
            delete_mode: Some(DeleteMode::Delete),
            delete_unregistered: false,
            priority: 1,
        }
    }

    #[test]
    fn unchanged_value_is_not_batched() {
        let t = torrent("a", 100 * 1024, 0.0, 0);
        let r = rule(Some(100), None, None);
        let plan = plan_mutations(&[(t, r)]);
        assert!(plan.upload.is_empty());
    }

    #[test]
    fn differing_value_is_batched_by_desired_setting() {
        let a = torrent("a", 50 * 1024, 0.0, 0);
        let b = torrent("b", 0, 0.0, 0);
        let r = rule(Some(100), None, None);
        let plan = plan_mutations(&[(a, r.clone()), (b, r)]);
        assert_eq!(plan.upload.get(&100).map(Vec::len), Some(2));
    }

    #[test]
    fn share_limit_bucketed_by_exact_pair() {
        let t = torrent("a", 0, 1.0, 0);
        let r = rule(None, Some(2.0), Some(60));
        let plan = plan_mutations(&[(t, r)]);
        assert_eq!(plan.share.len(), 1);
        let key = plan.share.keys().next().unwrap();
        assert!((key.ratio_limit() - 2.0).abs() < f64::EPSILON);
        assert_eq!(key.seeding_minutes(), 60);
    }

    #[test]
    fn sub_batches_respect_max_size() {
        let hashes: Vec<String> = (0..120).map(|i| i.to_string()).collect();
        let batches = sub_batches(&hashes, 50);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 50);
        assert_eq!(batches[2].len(), 20);
    }

    #[test]
    fn zero_max_batch_does_not_panic() {
        let hashes = vec!["a".to_string()];
        let batches = sub_batches(&hashes, 0);
        assert_eq!(batches.len(), 1);
    }
}
