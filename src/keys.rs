// src/keys.rs
//
// Virtual directory hierarchy over flat object keys.
//
// Keys are split on '/', empty segments are ignored, so "a/b/" and "a/b" describe
// the same path. A listing is reduced to the first segment below the prefix.

/// Non-empty `/`-delimited segments of a key.
pub fn segments(key: &str) -> impl Iterator<Item = &str> {
    key.split('/').filter(|s| !s.is_empty())
}

/// Name of the immediate child of `prefix` that `key` lives under.
///
/// Returns `None` when `key` is the prefix itself, or when it only shares the
/// prefix textually (`dir010/x` is not below `dir01`).
pub fn child_name<'k>(key: &'k str, prefix: Option<&str>) -> Option<&'k str> {
    let mut rest = segments(key);
    if let Some(prefix) = prefix {
        for expected in segments(prefix) {
            if rest.next() != Some(expected) {
                return None;
            }
        }
    }
    rest.next()
}

/// Reduce a remote listing to the immediate children of `prefix`.
///
/// Order follows `keys`; each name is reported once, at its first occurrence.
pub fn child_names<I, S>(keys: I, prefix: Option<&str>) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut names: Vec<String> = Vec::new();
    for key in keys {
        if let Some(name) = child_name(key.as_ref(), prefix) {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_owned());
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_skip_empty_parts() {
        assert_eq!(segments("a//b/").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(segments("").count(), 0);
    }

    #[test]
    fn child_of_prefix() {
        assert_eq!(child_name("dir01/dir02/dir03", Some("dir01")), Some("dir02"));
        assert_eq!(child_name("dir01/dir02/dir03", Some("dir01/")), Some("dir02"));
        assert_eq!(child_name("dir01/dir02/dir03", Some("dir01/dir02")), Some("dir03"));
        assert_eq!(child_name("dir01/dir02/dir03", None), Some("dir01"));
    }

    #[test]
    fn key_equal_to_prefix_has_no_child() {
        assert_eq!(child_name("dir04/test-01.txt", Some("dir04/test-01.txt")), None);
        assert_eq!(child_name("marker/", Some("marker")), None);
    }

    #[test]
    fn prefix_must_match_whole_segments() {
        assert_eq!(child_name("dir010/x", Some("dir01")), None);
    }

    #[test]
    fn listing_without_prefix_is_deduplicated() {
        let keys = ["a/1", "b/2", "a/3", "c"];
        let mut names = child_names(keys, None);
        names.sort();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn listing_with_prefix_keeps_remote_order() {
        let keys = ["dir02/dir03", "dir02/test-01.txt", "dir02/a-file"];
        assert_eq!(
            child_names(keys, Some("dir02")),
            vec!["dir03", "test-01.txt", "a-file"]
        );

        let nested = ["dir01/dir02/dir03", "dir01/dir02/file.txt"];
        assert_eq!(child_names(nested, Some("dir01")), vec!["dir02"]);
    }
}
