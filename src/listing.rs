//! Renders directory entries as the LIST/NLST wire formats.

use chrono::{DateTime, Local};
use std::fs::Metadata;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::{MetadataExt, PermissionsExt};

/// Owner/group name resolution is an injectable function so the core
/// never hard-codes a particular OS lookup strategy (out of scope, per
/// a particular OS lookup strategy. `default_owner_lookup` below is the concrete,
/// Unix-specific implementation the binary wires in.
pub type OwnerLookup = fn(&Metadata) -> (String, String);

pub fn unknown_owner(_metadata: &Metadata) -> (String, String) {
    ("unknown".to_string(), "unknown".to_string())
}

#[cfg(unix)]
pub fn default_owner_lookup(metadata: &Metadata) -> (String, String) {
    let user = uzers::get_user_by_uid(metadata.uid())
        .map(|u| u.name().to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string());
    let group = uzers::get_group_by_gid(metadata.gid())
        .map(|g| g.name().to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string());
    (user, group)
}

#[cfg(not(unix))]
pub fn default_owner_lookup(metadata: &Metadata) -> (String, String) {
    unknown_owner(metadata)
}

fn mode_string(metadata: &Metadata) -> String {
    let type_char = if metadata.is_dir() { 'd' } else { '-' };

    #[cfg(unix)]
    let bits = metadata.permissions().mode();
    #[cfg(not(unix))]
    let bits: u32 = if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    };

    let flag = |bit: u32, c: char| if bits & bit != 0 { c } else { '-' };
    format!(
        "{type_char}{}{}{}{}{}{}{}{}{}",
        flag(0o400, 'r'),
        flag(0o200, 'w'),
        flag(0o100, 'x'),
        flag(0o040, 'r'),
        flag(0o020, 'w'),
        flag(0o010, 'x'),
        flag(0o004, 'r'),
        flag(0o002, 'w'),
        flag(0o001, 'x'),
    )
}

fn modtime_string(metadata: &Metadata) -> String {
    metadata
        .modified()
        .ok()
        .map(|t| {
            DateTime::<Local>::from(t)
                .format("%b %d %Y")
                .to_string()
        })
        .unwrap_or_else(|| "Jan 01 1970".to_string())
}

/// One `LIST` line for a single entry: `<mode> 1 <user> <group> <size> <modtime> <name>\r\n`.
pub fn list_line(name: &str, metadata: &Metadata, owner_lookup: OwnerLookup) -> String {
    let (user, group) = owner_lookup(metadata);
    format!(
        "{} 1 {} {} {} {} {}\r\n",
        mode_string(metadata),
        user,
        group,
        metadata.len(),
        modtime_string(metadata),
        name
    )
}

/// Builds the full LIST body for `path`, which may be a file or a
/// directory. Directory entries are listed unsorted in readdir order,
/// matching the teacher's behaviour.
pub fn list_body(path: &Path, owner_lookup: OwnerLookup) -> std::io::Result<String> {
    let metadata = std::fs::symlink_metadata(path)?;
    let mut body = String::new();
    if metadata.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let entry_meta = entry.metadata()?;
            let name = entry.file_name().to_string_lossy().into_owned();
            body.push_str(&list_line(&name, &entry_meta, owner_lookup));
        }
    } else {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        body.push_str(&list_line(&name, &metadata, owner_lookup));
    }
    Ok(body)
}

/// Builds the full NLST body: one name per entry, CRLF terminated.
pub fn nlst_body(path: &Path) -> std::io::Result<String> {
    let metadata = std::fs::symlink_metadata(path)?;
    let mut body = String::new();
    if metadata.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            body.push_str(&entry.file_name().to_string_lossy());
            body.push_str("\r\n");
        }
    } else if let Some(name) = path.file_name() {
        body.push_str(&name.to_string_lossy());
        body.push_str("\r\n");
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_string_marks_directory() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = std::fs::metadata(dir.path()).unwrap();
        assert!(mode_string(&metadata).starts_with('d'));
    }

    #[test]
    fn nlst_lists_file_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let body = nlst_body(dir.path()).unwrap();
        assert_eq!(body, "a.txt\r\n");
    }

    #[test]
    fn list_includes_size_and_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let body = list_body(dir.path(), unknown_owner).unwrap();
        assert!(body.contains("unknown unknown"));
        assert!(body.contains(" 5 "));
        assert!(body.ends_with("a.txt\r\n"));
    }
}
