//! Composite identifiers
//!
//! Ids handed out by the aggregate have the form `<kind>:<local-id>`. The
//! local id may itself contain `:`; only the first separator splits.

/// Separator between kind token and local id
pub const ID_SEPARATOR: char = ':';

/// Split a composite id into `(kind, local_id)`.
///
/// An id without a separator yields `("", "")` so it falls through to a
/// kind-not-found error instead of a parse error. No case folding happens
/// here.
pub fn split_type_and_id(id: &str) -> (&str, &str) {
    match id.split_once(ID_SEPARATOR) {
        Some((kind, local_id)) => (kind, local_id),
        None => ("", ""),
    }
}

/// Build a composite id
pub fn join_type_and_id(kind: &str, local_id: &str) -> String {
    format!("{}{}{}", kind, ID_SEPARATOR, local_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_simple() {
        assert_eq!(split_type_and_id("job:abc"), ("job", "abc"));
    }

    #[test]
    fn test_split_keeps_later_separators() {
        assert_eq!(
            split_type_and_id("deployment:default:web"),
            ("deployment", "default:web")
        );
    }

    #[test]
    fn test_split_without_separator_is_empty() {
        assert_eq!(split_type_and_id("nocolon"), ("", ""));
        assert_eq!(split_type_and_id(""), ("", ""));
    }

    #[test]
    fn test_split_preserves_case() {
        assert_eq!(split_type_and_id("CronJob:x"), ("CronJob", "x"));
    }

    #[test]
    fn test_join() {
        assert_eq!(join_type_and_id("statefulset", "ns:db"), "statefulset:ns:db");
    }
}
