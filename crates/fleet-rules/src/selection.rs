//! Rule selection: first surviving rule wins.

use fleet_data::model::{TagMatchMode, TrackerRule};
use fleet_qbit::Torrent;

use crate::pattern::{matches_tracker, tracker_domains};

/// Select the first enabled rule in `rules` (assumed already ordered by
/// priority ascending, then id ascending) that matches `torrent` on
/// tracker, category, and tag criteria.
#[must_use]
pub fn select_rule<'a>(torrent: &Torrent, rules: &'a [TrackerRule]) -> Option<&'a TrackerRule> {
    let domains = tracker_domains(torrent);
    rules.iter().find(|rule| {
        rule.enabled
            && matches_tracker(&rule.tracker_pattern, &domains)
            && category_matches(rule, torrent)
            && tags_match(rule, torrent)
    })
}

fn category_matches(rule: &TrackerRule, torrent: &Torrent) -> bool {
    rule.categories.is_empty()
        || rule
            .categories
            .iter()
            .any(|category| category.eq_ignore_ascii_case(&torrent.category))
}

fn tags_match(rule: &TrackerRule, torrent: &Torrent) -> bool {
    if rule.tags.is_empty() {
        return true;
    }
    let torrent_tags: Vec<String> = torrent
        .tags
        .split(',')
        .map(|tag| tag.trim().to_ascii_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect();
    let rule_tags: Vec<String> = rule.tags.iter().map(|tag| tag.to_ascii_lowercase()).collect();
    match rule.tag_match_mode {
        TagMatchMode::Any => rule_tags.iter().any(|tag| torrent_tags.contains(tag)),
        TagMatchMode::All => rule_tags.iter().all(|tag| torrent_tags.contains(tag)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_data::model::DeleteMode;

    fn torrent(category: &str, tags: &str, tracker_url: &str) -> Torrent {
        Torrent {
            hash: "a".to_string(),
            infohash_v1: None,
            infohash_v2: None,
            name: "n".to_string(),
            category: category.to_string(),
            tags: tags.to_string(),
            tracker_url: tracker_url.to_string(),
            trackers: vec![],
            size: 0,
            ratio: 0.0,
            ratio_limit: 0.0,
            upload_limit_bps: 0,
            download_limit_bps: 0,
            seeding_time_sec: 0,
            seeding_time_limit: 0,
            progress: 0.0,
            content_path: String::new(),
            added_on: 0,
        }
    }

    fn rule(id: i64, priority: i32, pattern: &str, categories: Vec<&str>, tags: Vec<&str>, mode: TagMatchMode) -> TrackerRule {
        TrackerRule {
            id,
            instance_id: 1,
            enabled: true,
            tracker_pattern: pattern.to_string(),
            categories: categories.into_iter().map(str::to_string).collect(),
            tags: tags.into_iter().map(str::to_string).collect(),
            tag_match_mode: mode,
            upload_limit_kib: None,
            download_limit_kib: None,
            ratio_limit: None,
            seeding_time_limit_minutes: None,
            delete_mode: Some(DeleteMode::Delete),
            delete_unregistered: false,
            priority,
        }
    }

    #[test]
    fn first_matching_rule_in_order_wins() {
        let t = torrent("movies", "", "http://tracker.example.com/announce");
        let rules = vec![
            rule(1, 1, "tracker.example.com", vec![], vec![], TagMatchMode::Any),
            rule(2, 2, "*", vec![], vec![], TagMatchMode::Any),
        ];
        let selected = select_rule(&t, &rules).unwrap();
        assert_eq!(selected.id, 1);
    }

    #[test]
    fn disabled_rule_is_skipped() {
        let t = torrent("movies", "", "http://tracker.example.com/announce");
        let mut disabled = rule(1, 1, "*", vec![], vec![], TagMatchMode::Any);
        disabled.enabled = false;
        let rules = vec![disabled, rule(2, 2, "*", vec![], vec![], TagMatchMode::Any)];
        assert_eq!(select_rule(&t, &rules).unwrap().id, 2);
    }

    #[test]
    fn category_filter_excludes_non_matching_torrent() {
        let t = torrent("tv", "", "http://tracker.example.com/announce");
        let rules = vec![rule(1, 1, "*", vec!["movies"], vec![], TagMatchMode::Any)];
        assert!(select_rule(&t, &rules).is_none());
    }

    #[test]
    fn tag_any_mode_requires_one_overlap() {
        let t = torrent("movies", "keep, archive", "http://tracker.example.com/announce");
        let rules = vec![rule(1, 1, "*", vec![], vec!["archive", "rare"], TagMatchMode::Any)];
        assert!(select_rule(&t, &rules).is_some());
    }

    #[test]
    fn tag_all_mode_requires_every_tag() {
        let t = torrent("movies", "keep", "http://tracker.example.com/announce");
        let rules = vec![rule(1, 1, "*", vec![], vec!["archive", "rare"], TagMatchMode::All)];
        assert!(select_rule(&t, &rules).is_none());
    }

    #[test]
    fn no_matching_tracker_yields_no_rule() {
        let t = torrent("movies", "", "http://other.example.com/announce");
        let rules = vec![rule(1, 1, "tracker.example.com", vec![], vec![], TagMatchMode::Any)];
        assert!(select_rule(&t, &rules).is_none());
    }
}
