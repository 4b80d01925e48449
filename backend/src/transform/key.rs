//! Join-key normalization.
//!
//! Product codes and reference codes come from different systems and drift
//! in their leading zeros (`"007"` vs `"7"`). Both sides are reduced to the
//! same [`JoinKey`] before joining.

use crate::models::{JoinKey, KeyOrigin};

/// Normalize an identifier into a join key.
///
/// Surrounding whitespace is trimmed and leading `'0'` characters are
/// stripped. An identifier that is empty afterwards becomes
/// [`JoinKey::Unjoinable`] tagged with `origin`, so it never joins with
/// anything but itself.
pub fn normalize_key(raw: &str, origin: KeyOrigin) -> JoinKey {
    let stripped = raw.trim().trim_start_matches('0');
    if stripped.is_empty() {
        JoinKey::Unjoinable(origin)
    } else {
        JoinKey::Value(stripped.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TableKind;

    fn origin(row: usize) -> KeyOrigin {
        KeyOrigin::new(TableKind::Products, row)
    }

    #[test]
    fn test_leading_zeros_collapse() {
        assert_eq!(normalize_key("007", origin(0)), normalize_key("7", origin(1)));
        assert_eq!(normalize_key("007", origin(0)).as_str(), Some("7"));
    }

    #[test]
    fn test_inner_and_trailing_zeros_kept() {
        assert_eq!(normalize_key("0100", origin(0)).as_str(), Some("100"));
        assert_eq!(normalize_key("A007", origin(0)).as_str(), Some("A007"));
    }

    #[test]
    fn test_idempotent() {
        for raw in ["007", "7", "0A0", " 0012 ", "100"] {
            let once = normalize_key(raw, origin(0));
            let twice = normalize_key(once.display_value(), origin(0));
            assert_eq!(once, twice, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_empty_and_all_zero_are_distinct_sentinels() {
        let empty = normalize_key("", origin(0));
        let zeros = normalize_key("000", origin(1));

        assert!(!empty.is_joinable());
        assert!(!zeros.is_joinable());
        assert_ne!(empty, zeros);
        assert_ne!(zeros, normalize_key("0", origin(2)));
        assert_ne!(zeros, JoinKey::Value(String::new()));
    }

    #[test]
    fn test_whitespace_only_is_unjoinable() {
        assert!(!normalize_key("   ", origin(0)).is_joinable());
    }
}
