//! Path helpers for matching watcher events against a target file.

use std::path::{Component, Path, PathBuf};

/// Lexically normalizes a path without touching the filesystem.
///
/// - `.` components are dropped.
/// - `..` pops the previous normal component; at the root it is discarded,
///   and on a relative path with nothing left to pop it is kept.
/// - An empty result becomes `.`.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }

    out.iter().collect()
}

/// Directory that must be watched to observe `path`.
///
/// A bare file name lives in the current directory.
pub fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Resolves symlinks, returning `None` when the path does not currently exist.
pub fn real_path(path: &Path) -> Option<PathBuf> {
    std::fs::canonicalize(path).ok()
}

/// Whether a watcher event path refers to the target file.
///
/// The fast path is an exact comparison of cleaned paths. Some backends report
/// canonical directory prefixes (e.g. `/private/var` on macOS), so as a fallback
/// the file names must match and the parents must canonicalize to the same
/// directory.
pub fn is_same_file(event_path: &Path, target: &Path) -> bool {
    let event_path = clean_path(event_path);
    let target = clean_path(target);

    if event_path == target {
        return true;
    }

    if event_path.file_name().is_none() || event_path.file_name() != target.file_name() {
        return false;
    }

    match (
        real_path(&watch_dir(&event_path)),
        real_path(&watch_dir(&target)),
    ) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_drops_cur_dir_and_resolves_parent() {
        assert_eq!(clean_path(Path::new("./config.json")), PathBuf::from("config.json"));
        assert_eq!(clean_path(Path::new("a/./b/../c.json")), PathBuf::from("a/c.json"));
        assert_eq!(clean_path(Path::new("/etc//app/config.yaml")), PathBuf::from("/etc/app/config.yaml"));
        assert_eq!(clean_path(Path::new("/../x")), PathBuf::from("/x"));
        assert_eq!(clean_path(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(clean_path(Path::new(".")), PathBuf::from("."));
        assert_eq!(clean_path(Path::new("a/..")), PathBuf::from("."));
    }

    #[test]
    fn watch_dir_of_bare_name_is_cwd() {
        assert_eq!(watch_dir(Path::new("config.json")), PathBuf::from("."));
        assert_eq!(watch_dir(Path::new("conf/app.json")), PathBuf::from("conf"));
    }

    #[test]
    fn sibling_files_do_not_match() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("app.json");
        let other = dir.path().join("other.json");

        assert!(is_same_file(&target, &target));
        assert!(is_same_file(&dir.path().join("./app.json"), &target));
        assert!(!is_same_file(&other, &target));
        assert!(!is_same_file(dir.path(), &target));
    }
}
