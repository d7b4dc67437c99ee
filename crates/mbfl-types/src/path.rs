//! Subject-relative path canonicalization.

/// Strip a subject-specific path prefix: everything up to and
/// including the last `<subject>/` component, matched
/// case-insensitively. Paths that never mention the subject are kept
/// whole. Coverage reports and debugger frames both report absolute
/// paths from whichever slot directory ran them; stripping the prefix
/// makes line keys comparable across slots.
pub fn canonical_source_path(path: &str, subject: &str) -> String {
    let lower_path = path.to_lowercase();
    let lower_subject = subject.to_lowercase();
    match lower_path.rfind(&lower_subject) {
        Some(idx) => {
            let start = idx + subject.len() + 1; // skip the slash
            path[start.min(path.len())..].to_string()
        }
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_last_subject_component() {
        assert_eq!(
            canonical_source_path("/env/core3/zlib/src/deflate.c", "zlib"),
            "src/deflate.c"
        );
        // rfind: nested mentions strip from the last one
        assert_eq!(
            canonical_source_path("/data/zlib/build/zlib/a.c", "zlib"),
            "a.c"
        );
    }

    #[test]
    fn case_insensitive_and_fallback() {
        assert_eq!(canonical_source_path("/w/LibXml2/x.c", "libxml2"), "x.c");
        assert_eq!(canonical_source_path("src/x.c", "zlib"), "src/x.c");
    }
}
