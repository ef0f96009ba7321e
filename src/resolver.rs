//! Maps a client-supplied path string to a real filesystem path confined
//! to the jail directory.

use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("path escapes the jail")]
    NotAllowed,
}

/// Lexically joins `input` against `work_dir` (if relative) or `jail_dir`
/// (if the client sent an absolute path — absolute is relative to the
/// jail, not the real filesystem root), collapsing `.` and `..` without
/// ever climbing past `jail_dir`, then evaluates symlinks and checks the
/// component-aligned jail prefix.
///
/// `work_dir` and `jail_dir` are assumed already canonical.
pub fn resolve(jail_dir: &Path, work_dir: &Path, input: &str) -> Result<PathBuf, ResolveError> {
    let candidate = Path::new(input);
    let joined = if candidate.is_absolute() {
        jail_dir.join(candidate.strip_prefix("/").unwrap_or(candidate))
    } else {
        work_dir.join(candidate)
    };

    let cleaned = lexically_clean(jail_dir, &joined);

    let confined = match cleaned.canonicalize() {
        Ok(real) => real,
        Err(_) => cleaned,
    };

    if confined.starts_with(jail_dir) {
        Ok(confined)
    } else {
        Err(ResolveError::NotAllowed)
    }
}

/// Collapses `.` and `..` components in `path` without ever popping below
/// `root`'s own component count. Does not touch the filesystem.
fn lexically_clean(root: &Path, path: &Path) -> PathBuf {
    let root_depth = root.components().count();
    let mut stack: Vec<Component> = root.components().collect();

    for component in path.components().skip(root_depth) {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if stack.len() > root_depth {
                    stack.pop();
                }
            }
            other => stack.push(other),
        }
    }

    stack.iter().collect()
}

/// Renders a real, jail-confined path as the virtual path a client should
/// see (rooted at `/`, with `jail_dir` stripped). See the PWD-exposure
/// open question in DESIGN.md.
pub fn virtualize(jail_dir: &Path, real: &Path) -> String {
    match real.strip_prefix(jail_dir) {
        Ok(rest) if rest.as_os_str().is_empty() => "/".to_string(),
        Ok(rest) => format!("/{}", rest.display()).replace('\\', "/"),
        Err(_) => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn jail() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        (dir, root)
    }

    #[test]
    fn relative_path_joins_work_dir() {
        let (_guard, root) = jail();
        fs::create_dir(root.join("sub")).unwrap();
        let resolved = resolve(&root, &root, "sub").unwrap();
        assert_eq!(resolved, root.join("sub"));
    }

    #[test]
    fn dot_dot_cannot_escape_jail() {
        let (_guard, root) = jail();
        let resolved = resolve(&root, &root, "../../../../etc").unwrap();
        assert!(resolved.starts_with(&root));
    }

    #[test]
    fn absolute_path_is_relative_to_jail_not_real_root() {
        let (_guard, root) = jail();
        fs::create_dir(root.join("sub")).unwrap();
        let resolved = resolve(&root, &root, "/sub").unwrap();
        assert_eq!(resolved, root.join("sub"));
    }

    #[test]
    fn missing_final_component_falls_back_to_lexical_path() {
        let (_guard, root) = jail();
        let resolved = resolve(&root, &root, "new_file.txt").unwrap();
        assert_eq!(resolved, root.join("new_file.txt"));
    }

    #[test]
    fn symlink_escaping_jail_is_rejected() {
        let (_guard, root) = jail();
        let outside = tempfile::tempdir().unwrap();
        let link = root.join("escape");
        #[cfg(unix)]
        std::os::unix::fs::symlink(outside.path(), &link).unwrap();
        #[cfg(unix)]
        {
            let err = resolve(&root, &root, "escape").unwrap_err();
            assert!(matches!(err, ResolveError::NotAllowed));
        }
    }

    #[test]
    fn virtualize_strips_jail_prefix() {
        let (_guard, root) = jail();
        fs::create_dir(root.join("a")).unwrap();
        assert_eq!(virtualize(&root, &root), "/");
        assert_eq!(virtualize(&root, &root.join("a")), "/a");
    }
}
