//! Backend version gating.

use crate::error::{QueueError, QueueResult};
use semver::Version;

/// Oldest Redis server the queue scripts run on.
pub const MIN_REDIS_VERSION: &str = "5.0.0";

/// Returns `true` when `current` has lower semver precedence than `minimum`.
///
/// Equal versions are not lower. Build metadata does not affect precedence,
/// prerelease tags do (`7.0.0-rc1` is lower than `7.0.0`).
///
/// # Examples
///
/// ```
/// use bullq_queue::is_version_lower_than;
///
/// assert!(is_version_lower_than("4.0.0", "4.0.1").unwrap());
/// assert!(!is_version_lower_than("4.1.0", "4.0.9").unwrap());
/// assert!(is_version_lower_than("4.x", "4.0.0").is_err());
/// ```
pub fn is_version_lower_than(current: &str, minimum: &str) -> QueueResult<bool> {
    let current = parse_version(current)?;
    let minimum = parse_version(minimum)?;
    Ok(current.cmp_precedence(&minimum).is_lt())
}

fn parse_version(version: &str) -> QueueResult<Version> {
    Version::parse(version).map_err(|source| QueueError::VersionParse {
        version: version.to_string(),
        source,
    })
}

/// Extract `redis_version` from the output of `INFO server`.
pub fn parse_redis_version(info: &str) -> Option<String> {
    info.lines()
        .find_map(|line| line.trim().strip_prefix("redis_version:"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_lower() {
        assert!(is_version_lower_than("4.0.0", "4.0.1").unwrap());
    }

    #[test]
    fn test_minor_higher_wins_over_patch() {
        assert!(!is_version_lower_than("4.1.0", "4.0.9").unwrap());
    }

    #[test]
    fn test_equal_is_not_lower() {
        assert!(!is_version_lower_than("7.2.4", "7.2.4").unwrap());
    }

    #[test]
    fn test_antisymmetric() {
        let pairs = [
            ("5.0.0", "6.2.0"),
            ("6.2.0", "6.10.0"),
            ("7.0.0-rc1", "7.0.0"),
            ("7.0.0-alpha", "7.0.0-beta"),
        ];
        for (a, b) in pairs {
            assert!(is_version_lower_than(a, b).unwrap(), "{a} < {b}");
            assert!(!is_version_lower_than(b, a).unwrap(), "{b} !< {a}");
        }
    }

    #[test]
    fn test_build_metadata_ignored() {
        assert!(!is_version_lower_than("7.0.0+build.1", "7.0.0+build.2").unwrap());
        assert!(!is_version_lower_than("7.0.0+build.2", "7.0.0+build.1").unwrap());
    }

    #[test]
    fn test_malformed_current() {
        let err = is_version_lower_than("7.0", "5.0.0").unwrap_err();
        match err {
            QueueError::VersionParse { version, .. } => assert_eq!(version, "7.0"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_minimum() {
        let err = is_version_lower_than("7.0.0", "").unwrap_err();
        assert!(matches!(err, QueueError::VersionParse { .. }));
    }

    #[test]
    fn test_parse_redis_version() {
        let info = "# Server\r\nredis_version:7.2.4\r\nredis_git_sha1:00000000\r\n";
        assert_eq!(parse_redis_version(info).as_deref(), Some("7.2.4"));
    }

    #[test]
    fn test_parse_redis_version_missing() {
        assert_eq!(parse_redis_version("# Server\r\nos:Linux\r\n"), None);
        assert_eq!(parse_redis_version("redis_version:\r\n"), None);
    }
}
