use std::path::{Component, Path};

use crate::error::{StorageError, StorageResult};

/// Path to `&str` conversion without allocating in the happy path
///
/// Fails for paths that are not valid UTF-8; glob expansion and relative
/// keys both need a textual form.
#[inline]
pub fn safe_path_to_str(path: &Path) -> StorageResult<&str> {
    path.to_str().ok_or_else(|| {
        StorageError::PathInvalid(format!(
            "Path contains invalid UTF-8 characters: {}",
            path.to_string_lossy()
        ))
    })
}

/// Build the `/`-separated key of `path` relative to `root`
///
/// Returns `None` when `path` is not under `root`.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut key = String::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            if !key.is_empty() {
                key.push('/');
            }
            key.push_str(&part.to_string_lossy());
        }
    }
    if key.is_empty() { None } else { Some(key) }
}

/// Normalize a caller-supplied relative path
///
/// Converts `\` to `/`, drops `.` segments and empty segments, and rejects
/// absolute paths or any `..` segment so a key can never escape its tier root.
pub fn normalize_relative(relative_path: &str) -> StorageResult<String> {
    let unified = relative_path.replace('\\', "/");
    if unified.starts_with('/') || has_drive_prefix(&unified) {
        return Err(StorageError::PathInvalid(format!(
            "expected a relative path, got '{relative_path}'"
        )));
    }

    let mut parts = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                return Err(StorageError::PathInvalid(format!(
                    "path '{relative_path}' escapes the volume root"
                )));
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return Err(StorageError::PathInvalid(format!(
            "path '{relative_path}' does not name a file"
        )));
    }
    Ok(parts.join("/"))
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn normalizes_separators() {
        assert_eq!(normalize_relative("a\\b\\c.txt").ok(), Some("a/b/c.txt".into()));
        assert_eq!(normalize_relative("./a//b.txt").ok(), Some("a/b.txt".into()));
        assert_eq!(normalize_relative("cfg.json").ok(), Some("cfg.json".into()));
    }

    #[test]
    fn rejects_escapes() {
        assert!(normalize_relative("../etc/passwd").is_err());
        assert!(normalize_relative("a/../../b").is_err());
        assert!(normalize_relative("/abs/path").is_err());
        assert!(normalize_relative("C:\\data").is_err());
        assert!(normalize_relative("").is_err());
        assert!(normalize_relative("./").is_err());
    }

    #[test]
    fn relative_keys() {
        let root = PathBuf::from("/data/cache");
        assert_eq!(
            relative_key(&root, &root.join("sub").join("x.bin")),
            Some("sub/x.bin".to_string())
        );
        assert_eq!(relative_key(&root, Path::new("/other/x.bin")), None);
        assert_eq!(relative_key(&root, &root), None);
    }
}
