//! Cache key derivation and expiry policy.

use chrono::{DateTime, Duration, TimeZone, Utc};
use common::TimeWindow;
use sha2::{Digest, Sha256};
use std::time::Duration as StdDuration;

/// Format version baked into every derived key. Bump to invalidate the
/// whole cache after a layout change.
pub const KEY_VERSION: &str = "cache-1.0";

/// TTL for windows anchored within the last week — recent data keeps
/// getting revised upstream, so refresh often.
pub const RECENT_TTL: StdDuration = StdDuration::from_secs(15 * 60);

/// TTL for older windows; archival data no longer changes.
pub const ARCHIVE_TTL: StdDuration = StdDuration::from_secs(14 * 24 * 3600);

/// TTL for static payloads (file-backed archives that never change).
pub const STATIC_TTL: StdDuration = StdDuration::from_secs(100 * 365 * 24 * 3600);

const RECENT_WINDOW_DAYS: i64 = 7;

/// Rounds a timestamp to the nearest clock hour, so near-identical
/// requests within the same hour share one cache slot.
pub fn round_to_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    let rounded = ((t.timestamp() as f64 / 3600.0).round() as i64) * 3600;
    Utc.timestamp_opt(rounded, 0).single().unwrap_or(t)
}

/// Derives the cache key for an identifier and query window.
///
/// The anchor is rounded to the hour before formatting; the window length
/// enters the key as signed whole seconds so windows of different length
/// never collide. Callers passing a multi-source identifier must sort it
/// first so permutations derive the same key.
pub fn derive_key(identifier: &str, window: &TimeWindow) -> String {
    let rounded = round_to_hour(window.anchor);
    let material = format!(
        "{identifier}{}{:+}s",
        rounded.format("%Y-%m-%d %H"),
        window.length.num_seconds()
    );
    let digest = Sha256::digest(material.as_bytes());
    format!("{KEY_VERSION}_{}", hex::encode(digest))
}

/// Expiry policy: anchors within the last week get [`RECENT_TTL`], older
/// anchors get [`ARCHIVE_TTL`].
pub fn default_expiry(anchor: DateTime<Utc>) -> StdDuration {
    let one_week_ago = Utc::now() - Duration::days(RECENT_WINDOW_DAYS);
    if anchor > one_week_ago {
        RECENT_TTL
    } else {
        ARCHIVE_TTL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn ts(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .expect("valid test timestamp")
            .and_utc()
    }

    fn window(anchor: &str, length: Duration) -> TimeWindow {
        TimeWindow::new(ts(anchor), length)
    }

    #[test]
    fn rounds_down_before_the_half_hour() {
        assert_eq!(
            round_to_hour(ts("2021-12-09 23:29:59")),
            ts("2021-12-09 23:00:00")
        );
    }

    #[test]
    fn rounds_up_from_the_half_hour() {
        assert_eq!(
            round_to_hour(ts("2021-12-09 23:30:00")),
            ts("2021-12-10 00:00:00")
        );
    }

    #[test]
    fn same_rounded_hour_derives_same_key() {
        let a = derive_key("AllSources", &window("2023-04-01 12:10:00", Duration::days(-1)));
        let b = derive_key("AllSources", &window("2023-04-01 12:25:30", Duration::days(-1)));
        assert_eq!(a, b);
    }

    #[test]
    fn hour_boundary_derives_different_keys() {
        let a = derive_key("AllSources", &window("2021-12-09 23:29:59", Duration::days(1)));
        let b = derive_key("AllSources", &window("2021-12-09 23:30:00", Duration::days(1)));
        assert_ne!(a, b);
    }

    #[test]
    fn different_lengths_derive_different_keys() {
        let a = derive_key("AllSources", &window("2023-04-01 12:00:00", Duration::days(1)));
        let b = derive_key("AllSources", &window("2023-04-01 12:00:00", Duration::days(2)));
        let c = derive_key("AllSources", &window("2023-04-01 12:00:00", Duration::days(-1)));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn different_identifiers_derive_different_keys() {
        let w = window("2023-04-01 12:00:00", Duration::days(-1));
        assert_ne!(derive_key("AllSources", &w), derive_key("CCMC", &w));
    }

    #[test]
    fn keys_carry_the_version_prefix() {
        let key = derive_key("AllSources", &window("2023-04-01 12:00:00", Duration::days(-1)));
        assert!(key.starts_with(KEY_VERSION));
    }

    #[test]
    fn recent_anchor_gets_short_ttl() {
        assert_eq!(default_expiry(Utc::now() - Duration::days(1)), RECENT_TTL);
    }

    #[test]
    fn old_anchor_gets_long_ttl() {
        assert_eq!(default_expiry(Utc::now() - Duration::days(30)), ARCHIVE_TTL);
    }
}
