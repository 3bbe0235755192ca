//! Path helpers shared by collection and configuration.

use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

/// Separator used in every node identifier, regardless of platform.
pub const SEP: &str = "/";

/// Replace `native` separators in `path` with [`SEP`].
pub fn normalize_separators(path: &str, native: char) -> String {
    if native == '/' {
        path.to_string()
    } else {
        path.replace(native, SEP)
    }
}

/// Relative path from `base` to `path`, both taken lexically.
///
/// Climbs out of `base` with `..` when `path` is not below it, and returns
/// `.` when the two are equal.
pub fn relpath(path: &Path, base: &Path) -> PathBuf {
    let path = lexical_normalize(path);
    let base = lexical_normalize(base);

    let path_parts: Vec<Component<'_>> = path.components().collect();
    let base_parts: Vec<Component<'_>> = base.components().collect();

    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..base_parts.len() {
        rel.push("..");
    }
    for part in &path_parts[common..] {
        rel.push(part.as_os_str());
    }

    if rel.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        rel
    }
}

/// [`relpath`] rendered with `/` separators.
pub fn relative_id(path: &Path, base: &Path) -> String {
    normalize_separators(&relpath(path, base).to_string_lossy(), MAIN_SEPARATOR)
}

/// Final path component as a `/`-safe string.
pub fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| normalize_separators(&path.to_string_lossy(), MAIN_SEPARATOR))
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Match a file or directory name against a shell-style pattern.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    match glob::Pattern::new(pattern) {
        Ok(p) => p.matches(name),
        Err(e) => {
            log::warn!("ignoring invalid pattern {pattern:?}: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relpath_below_base() {
        let rel = relpath(Path::new("/root/a/b/test_x.rs"), Path::new("/root/a"));
        assert_eq!(rel, PathBuf::from("b").join("test_x.rs"));
    }

    #[test]
    fn test_relpath_outside_base() {
        let rel = relpath(Path::new("/root/other/t.rs"), Path::new("/root/a/b"));
        assert_eq!(rel, PathBuf::from("..").join("..").join("other").join("t.rs"));
    }

    #[test]
    fn test_relpath_same_dir() {
        assert_eq!(relpath(Path::new("/root/a"), Path::new("/root/a/")), PathBuf::from("."));
    }

    #[test]
    fn test_normalize_backslash_separators() {
        assert_eq!(normalize_separators(r"tests\unit\test_a.rs", '\\'), "tests/unit/test_a.rs");
        assert_eq!(normalize_separators("tests/unit", '/'), "tests/unit");
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("test_*.rs", "test_math.rs"));
        assert!(glob_match(".*", ".git"));
        assert!(!glob_match("test_*.rs", "math.rs"));
        assert!(!glob_match("[", "anything"));
    }
}
