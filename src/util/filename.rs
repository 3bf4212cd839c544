//! Segment file naming conventions.

use std::path::{Path, PathBuf};

/// Extension for segment files.
pub const SEGMENT_EXT: &str = "seg";

/// Generate a segment file path.
///
/// Ids are plain decimal with no padding, so `0.seg`, `1.seg`, `10.seg`.
/// Ordering is numeric on the parsed id, never lexicographic on the name.
pub fn segment_file_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{}.{}", id, SEGMENT_EXT))
}

/// Generate the lock file path.
pub fn lock_file_path(dir: &Path) -> PathBuf {
    dir.join("LOCK")
}

/// Parse a segment file name and return its id.
///
/// Returns `None` for anything that is not `<decimal id>.seg` with a
/// canonical id (no leading zeros, no sign).
pub fn parse_segment_file_name(name: &str) -> Option<u64> {
    let id_str = name.strip_suffix(&format!(".{}", SEGMENT_EXT))?;

    if id_str.is_empty() || !id_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if id_str.len() > 1 && id_str.starts_with('0') {
        return None;
    }

    id_str.parse::<u64>().ok()
}

/// List all segment ids in the directory, ascending.
///
/// Files that do not match the segment pattern are ignored.
pub fn list_segments(dir: &Path) -> std::io::Result<Vec<u64>> {
    let mut ids = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(id) = parse_segment_file_name(&name.to_string_lossy()) {
            ids.push(id);
        }
    }

    ids.sort_unstable();
    Ok(ids)
}

/// Delete a file, ignoring "not found" errors.
pub fn delete_file(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Create directory if it doesn't exist.
pub fn create_dir_if_missing(path: &Path) -> std::io::Result<()> {
    match std::fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_segment_file_path() {
        let dir = Path::new("/data/buffer");
        assert_eq!(segment_file_path(dir, 0), Path::new("/data/buffer/0.seg"));
        assert_eq!(
            segment_file_path(dir, 123),
            Path::new("/data/buffer/123.seg")
        );
    }

    #[test]
    fn test_parse_segment_file_name() {
        assert_eq!(parse_segment_file_name("0.seg"), Some(0));
        assert_eq!(parse_segment_file_name("42.seg"), Some(42));
        assert_eq!(
            parse_segment_file_name("18446744073709551615.seg"),
            Some(u64::MAX)
        );

        assert_eq!(parse_segment_file_name("007.seg"), None);
        assert_eq!(parse_segment_file_name("-1.seg"), None);
        assert_eq!(parse_segment_file_name(".seg"), None);
        assert_eq!(parse_segment_file_name("abc.seg"), None);
        assert_eq!(parse_segment_file_name("1.tmp"), None);
        assert_eq!(parse_segment_file_name("LOCK"), None);
    }

    #[test]
    fn test_list_segments_numeric_order() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();

        for id in [10u64, 2, 9, 100] {
            std::fs::write(segment_file_path(dir, id), "").unwrap();
        }
        // Noise the listing must skip.
        std::fs::write(dir.join("LOCK"), "").unwrap();
        std::fs::write(dir.join("notes.txt"), "").unwrap();

        assert_eq!(list_segments(dir).unwrap(), vec![2, 9, 10, 100]);
    }

    #[test]
    fn test_list_segments_empty() {
        let tmp = tempdir().unwrap();
        assert!(list_segments(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_delete_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("x.seg");

        assert!(delete_file(&path).is_ok());

        std::fs::write(&path, "x").unwrap();
        delete_file(&path).unwrap();
        assert!(!path.exists());
    }
}
