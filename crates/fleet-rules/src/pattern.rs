//! Tracker pattern grammar and hostname extraction.

use std::collections::HashSet;

use fleet_qbit::Torrent;
use globset::GlobBuilder;

/// Extract the case-insensitive hostname set a torrent announces to, from
/// its primary `tracker_url` plus every entry in `trackers`.
#[must_use]
pub fn tracker_domains(torrent: &Torrent) -> HashSet<String> {
    let mut domains = HashSet::new();
    if let Some(host) = extract_host(&torrent.tracker_url) {
        domains.insert(host);
    }
    for tracker in &torrent.trackers {
        if let Some(host) = extract_host(tracker) {
            domains.insert(host);
        }
    }
    domains
}

fn extract_host(url: &str) -> Option<String> {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = without_scheme.split(['/', '?', '#']).next().unwrap_or("");
    let without_userinfo = authority.rsplit_once('@').map_or(authority, |(_, rest)| rest);
    let host = without_userinfo.split(':').next().unwrap_or("");
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

/// Evaluate a rule's `trackerPattern` grammar against a torrent's tracker
/// hostnames: `*` matches all, empty matches nothing, tokens split on
/// `,;|`, each token glob-matched (`*?`) case-insensitively, tokens
/// starting with `.` match as a domain suffix, otherwise exact equality.
#[must_use]
pub fn matches_tracker(pattern: &str, domains: &HashSet<String>) -> bool {
    let pattern = pattern.trim();
    if pattern == "*" {
        return true;
    }
    if pattern.is_empty() {
        return false;
    }
    pattern
        .split(|c| c == ',' || c == ';' || c == '|')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .any(|token| domains.iter().any(|domain| token_matches(token, domain)))
}

fn token_matches(token: &str, domain: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    if lower.starts_with('.') {
        let suffix = &lower[1..];
        return domain == suffix || domain.ends_with(&lower);
    }
    if lower.contains('*') || lower.contains('?') {
        return GlobBuilder::new(&lower)
            .case_insensitive(true)
            .build()
            .map(|glob| glob.compile_matcher().is_match(domain))
            .unwrap_or(false);
    }
    domain.eq_ignore_ascii_case(&lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn star_matches_everything() {
        assert!(matches_tracker("*", &domains(&["tracker.example.com"])));
        assert!(matches_tracker("*", &domains(&[])));
    }

    #[test]
    fn empty_pattern_matches_nothing() {
        assert!(!matches_tracker("", &domains(&["tracker.example.com"])));
    }

    #[test]
    fn exact_token_is_case_insensitive() {
        assert!(matches_tracker("Tracker.Example.com", &domains(&["tracker.example.com"])));
        assert!(!matches_tracker("other.example.com", &domains(&["tracker.example.com"])));
    }

    #[test]
    fn suffix_token_matches_subdomains_and_bare_domain() {
        let pattern = ".example.com";
        assert!(matches_tracker(pattern, &domains(&["tracker.example.com"])));
        assert!(matches_tracker(pattern, &domains(&["example.com"])));
        assert!(!matches_tracker(pattern, &domains(&["notexample.com"])));
    }

    #[test]
    fn glob_token_matches_wildcards() {
        assert!(matches_tracker("tracker?.example.*", &domains(&["tracker1.example.org"])));
    }

    #[test]
    fn multiple_tokens_split_on_separators() {
        let pattern = "a.example.com,b.example.com;c.example.com|d.example.com";
        assert!(matches_tracker(pattern, &domains(&["c.example.com"])));
        assert!(!matches_tracker(pattern, &domains(&["e.example.com"])));
    }

    #[test]
    fn extracts_host_ignoring_scheme_port_and_path() {
        let torrent = Torrent {
            hash: "a".to_string(),
            infohash_v1: None,
            infohash_v2: None,
            name: "n".to_string(),
            category: String::new(),
            tags: String::new(),
            tracker_url: "http://tracker.example.com:6969/announce".to_string(),
            trackers: vec!["udp://backup.example.com:80".to_string()],
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
        };
        let found = tracker_domains(&torrent);
        assert!(found.contains("tracker.example.com"));
        assert!(found.contains("backup.example.com"));
    }
}
