use crate::model::error::{AdapterError, Result};

pub const SEPARATOR: char = '/';

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Key prefix shared by every object the adapter touches.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathPrefix {
    prefix: Option<String>,
}

impl PathPrefix {
    /// An empty or separator-only prefix means no prefix at all.
    pub fn new(prefix: Option<&str>) -> Self {
        let prefix = prefix
            .map(|p| p.trim_matches(is_separator))
            .filter(|p| !p.is_empty())
            .map(|p| format!("{}{}", p, SEPARATOR));

        Self { prefix }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn apply(&self, path: &str) -> String {
        let path = path.trim_start_matches(is_separator);

        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, path),
            None => path.to_string(),
        }
    }

    pub fn remove<'a>(&self, key: &'a str) -> Result<&'a str> {
        match &self.prefix {
            Some(prefix) => key
                .strip_prefix(prefix.as_str())
                .ok_or_else(|| AdapterError::PrefixMismatch {
                    prefix: prefix.clone(),
                    key: key.to_string(),
                }),
            None => Ok(key),
        }
    }
}

pub fn apply_prefix(prefix: Option<&str>, path: &str) -> String {
    PathPrefix::new(prefix).apply(path)
}

pub fn remove_prefix(prefix: Option<&str>, key: &str) -> Result<String> {
    PathPrefix::new(prefix).remove(key).map(|p| p.to_string())
}

/// Normalizes a logical path: backslashes become `/`, `.` segments and empty
/// segments are dropped and `..` pops its parent.
pub fn normalize_path(path: &str) -> Result<String> {
    let path: String = path
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if c == '\\' { SEPARATOR } else { c })
        .collect();

    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(SEPARATOR) {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(AdapterError::PathOutsideRoot(path.clone()));
                }
            }
            part => parts.push(part),
        }
    }

    Ok(parts.join("/"))
}

/// Parent directory of a normalized path; the root is the empty string.
pub fn dirname(path: &str) -> String {
    let path = path.trim_end_matches(SEPARATOR);

    match path.rfind(SEPARATOR) {
        Some(pos) => path[..pos].trim_end_matches(SEPARATOR).to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_prefix() {
        let cases = vec![
            (None, "a.txt", "a.txt"),
            (Some(""), "a.txt", "a.txt"),
            (Some("app"), "a.txt", "app/a.txt"),
            (Some("app/"), "a.txt", "app/a.txt"),
            (Some("/app//"), "/dir/a.txt", "app/dir/a.txt"),
            (Some("app"), "", "app/"),
        ];

        for (prefix, path, expected) in cases {
            assert_eq!(apply_prefix(prefix, path), expected, "failed for case: {:?} {}", prefix, path);
        }
    }

    #[test]
    fn test_prefix_round_trip() {
        let prefixes = vec![None, Some("app"), Some("app/"), Some("deep/nested/root/")];
        let paths = vec!["", "a.txt", "dir/a.txt", "dir/sub/", "x/y/z"];

        for prefix in &prefixes {
            for path in &paths {
                let stored = apply_prefix(*prefix, path);
                assert_eq!(
                    remove_prefix(*prefix, &stored).unwrap(),
                    *path,
                    "failed round trip for case: {:?} {}",
                    prefix,
                    path
                );
            }
        }
    }

    #[test]
    fn test_remove_prefix_mismatch() {
        let result = remove_prefix(Some("app"), "other/a.txt");
        assert!(matches!(result, Err(AdapterError::PrefixMismatch { .. })));
    }

    #[test]
    fn test_normalize_path() {
        let cases = vec![
            ("a.txt", "a.txt"),
            ("/a/b/", "a/b"),
            ("a\\b\\c.txt", "a/b/c.txt"),
            ("./a//./b", "a/b"),
            ("a/b/../c", "a/c"),
            ("", ""),
        ];

        for (path, expected) in cases {
            assert_eq!(normalize_path(path).unwrap(), expected, "failed for case: {}", path);
        }

        assert!(matches!(
            normalize_path("a/../../etc"),
            Err(AdapterError::PathOutsideRoot(_))
        ));
    }

    #[test]
    fn test_dirname() {
        let cases = vec![
            ("a/b/c.txt", "a/b"),
            ("c.txt", ""),
            ("a/", ""),
            ("a/b/", "a"),
        ];

        for (path, expected) in cases {
            assert_eq!(dirname(path), expected, "failed for case: {}", path);
        }
    }
}
