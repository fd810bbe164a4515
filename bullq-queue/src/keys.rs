//! Parent key composition.

use std::collections::HashMap;

/// Written in place of a missing `queue` or `id` field.
pub const MISSING_FIELD: &str = "None";

/// Format a parent key from its parts: `"{queue}:{id}"`.
pub fn compose_parent_key(queue: &str, id: &str) -> String {
    format!("{}:{}", queue, id)
}

/// Derive the parent key from a parent options record.
///
/// An absent or empty record has no parent key. Missing fields do not fail,
/// they are written as [`MISSING_FIELD`] so the broken reference shows up as
/// a lookup miss later on.
///
/// ```
/// use std::collections::HashMap;
/// use bullq_queue::parent_key;
///
/// let opts = HashMap::from([
///     ("queue".to_string(), "default".to_string()),
///     ("id".to_string(), "123".to_string()),
/// ]);
/// assert_eq!(parent_key(Some(&opts)).as_deref(), Some("default:123"));
/// assert_eq!(parent_key(None), None);
/// ```
pub fn parent_key(opts: Option<&HashMap<String, String>>) -> Option<String> {
    let opts = opts.filter(|o| !o.is_empty())?;
    let field = |name: &str| opts.get(name).map(String::as_str).unwrap_or(MISSING_FIELD);
    Some(compose_parent_key(field("queue"), field("id")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_compose() {
        assert_eq!(compose_parent_key("emails", "42"), "emails:42");
    }

    #[test]
    fn test_none_has_no_key() {
        assert_eq!(parent_key(None), None);
    }

    #[test]
    fn test_empty_has_no_key() {
        assert_eq!(parent_key(Some(&HashMap::new())), None);
    }

    #[test]
    fn test_queue_then_id() {
        let opts = record(&[("id", "123"), ("queue", "default")]);
        assert_eq!(parent_key(Some(&opts)).as_deref(), Some("default:123"));
    }

    #[test]
    fn test_missing_id_uses_placeholder() {
        let opts = record(&[("queue", "default")]);
        assert_eq!(parent_key(Some(&opts)).as_deref(), Some("default:None"));
    }

    #[test]
    fn test_missing_queue_uses_placeholder() {
        let opts = record(&[("id", "7"), ("extra", "ignored")]);
        assert_eq!(parent_key(Some(&opts)).as_deref(), Some("None:7"));
    }
}
