//! Path/filename sanitization and content-addressed blob naming
//!.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

const MAX_SEGMENT_BYTES: usize = 100;

/// Replace filesystem-hostile characters with `_`, strip control characters,
/// trim surrounding whitespace/dots, and truncate to 100 bytes without
/// splitting a UTF-8 character.
#[must_use]
pub fn safe_segment(input: &str) -> String {
    let replaced: String = input
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim_matches(|c: char| c.is_whitespace() || c == '.');
    truncate_utf8(trimmed, MAX_SEGMENT_BYTES).to_string()
}

fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Derive the archive-relative filename for an exported `.torrent`: the
/// daemon's suggested name, sanitized, falling back to
/// `{hash}_{trackerDomain}.torrent` when the suggestion is empty once
/// sanitized.
#[must_use]
pub fn sanitize_filename(suggested_name: &str, hash: &str, tracker_domain: &str) -> String {
    let base = safe_segment(suggested_name.trim_end_matches(".torrent"));
    let base = if base.is_empty() {
        safe_segment(&format!("{hash}_{tracker_domain}"))
    } else {
        base
    };
    format!("{base}.torrent")
}

/// Disambiguate `path` against `taken` by appending `_1`, `_2`, … before the
/// extension until the result is unused, then records the result as taken.
pub fn disambiguate(path: String, taken: &mut std::collections::HashSet<String>) -> String {
    if taken.insert(path.clone()) {
        return path;
    }
    let (stem, ext) = match path.rfind('.') {
        Some(idx) => (&path[..idx], &path[idx..]),
        None => (path.as_str(), ""),
    };
    let mut attempt = 1_u32;
    loop {
        let candidate = format!("{stem}_{attempt}{ext}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        attempt += 1;
    }
}

/// Hex-encoded SHA-256 digest of `bytes`, used as the blob's content address.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// The `backups/torrents/...` relative path for a blob, sharded three levels
/// deep by its hex digest.
#[must_use]
pub fn blob_relative_path(sha256_hex: &str) -> String {
    let h = sha256_hex;
    let (a, rest) = h.split_at(2.min(h.len()));
    let (b, rest) = rest.split_at(2.min(rest.len()));
    let (c, _) = rest.split_at(2.min(rest.len()));
    format!("backups/torrents/{a}/{b}/{c}/{h}.torrent")
}

/// Render `now` as `YYYYMMDDTHHMMSSZ`.
#[must_use]
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Build the manifest filename: `qui-backup_{slug}_{kind}_{timestamp}_manifest.json`.
#[must_use]
pub fn manifest_filename(instance_slug: &str, kind: &str, now: DateTime<Utc>) -> String {
    format!("qui-backup_{instance_slug}_{kind}_{}_manifest.json", format_timestamp(now))
}

/// Slug an instance name for use as a directory segment, falling back to
/// `instance-<id>` when the sanitized name is empty.
#[must_use]
pub fn instance_slug(name: &str, instance_id: i64) -> String {
    let slug = safe_segment(name);
    if slug.is_empty() {
        format!("instance-{instance_id}")
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_segment_replaces_hostile_characters() {
        assert_eq!(safe_segment("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn safe_segment_trims_whitespace_and_dots() {
        assert_eq!(safe_segment("  ...My Movie...  "), "My Movie");
    }

    #[test]
    fn safe_segment_truncates_without_splitting_utf8() {
        let input = "é".repeat(80);
        let out = safe_segment(&input);
        assert!(out.len() <= MAX_SEGMENT_BYTES);
        assert!(out.is_char_boundary(out.len()));
    }

    #[test]
    fn sanitize_filename_uses_suggested_name() {
        assert_eq!(sanitize_filename("My Movie.torrent", "abc", "example.com"), "My Movie.torrent");
    }

    #[test]
    fn sanitize_filename_falls_back_when_suggestion_is_empty() {
        assert_eq!(sanitize_filename("***", "abc123", "example.com"), "abc123_example.com.torrent");
    }

    #[test]
    fn disambiguate_appends_counter_on_collision() {
        let mut taken = std::collections::HashSet::new();
        assert_eq!(disambiguate("a.torrent".to_string(), &mut taken), "a.torrent");
        assert_eq!(disambiguate("a.torrent".to_string(), &mut taken), "a_1.torrent");
        assert_eq!(disambiguate("a.torrent".to_string(), &mut taken), "a_2.torrent");
    }

    #[test]
    fn blob_relative_path_shards_three_levels_deep() {
        let path = blob_relative_path("abcdef0123456789");
        assert_eq!(path, "backups/torrents/ab/cd/ef/abcdef0123456789.torrent");
    }

    #[test]
    fn sha256_hex_is_deterministic() {
        let a = sha256_hex(b"hello");
        let b = sha256_hex(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn instance_slug_falls_back_to_id_when_name_is_unsafe() {
        assert_eq!(instance_slug("***", 7), "instance-7");
        assert_eq!(instance_slug("Home Box", 7), "Home Box");
    }
}
