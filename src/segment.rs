//! Segment file: one bounded, append-only file of frames.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::options::SyncMode;
use crate::util::filename::{delete_file, segment_file_path};

/// How to open a segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create the file; fail if it already exists.
    CreateNew,
    /// Open an existing file; fail if it is missing.
    OpenExisting,
}

/// A single on-disk segment.
///
/// Owns exactly one file handle opened for both reading and appending.
/// Appends are unbuffered, so a second handle on the same file reads
/// them back immediately.
#[derive(Debug)]
pub struct Segment {
    id: u64,
    path: PathBuf,
    file: File,
    len: u64,
}

impl Segment {
    /// Open the segment with the given id under `dir`.
    ///
    /// Returns the segment with its current on-disk size.
    pub fn open(dir: &Path, id: u64, mode: OpenMode) -> std::io::Result<Self> {
        let path = segment_file_path(dir, id);

        let mut opts = OpenOptions::new();
        opts.read(true).write(true);
        match mode {
            OpenMode::CreateNew => {
                opts.create_new(true);
            }
            OpenMode::OpenExisting => {}
        }
        let file = opts.open(&path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            id,
            path,
            file,
            len,
        })
    }

    /// Segment id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Size recorded at open plus everything appended through this handle.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Current on-disk size.
    ///
    /// A read handle's [`len`](Self::len) goes stale while a write handle
    /// on the same file is still appending; this asks the filesystem.
    pub fn disk_len(&self) -> std::io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Append a whole frame at the tail.
    pub fn append(&mut self, buf: &[u8], sync: SyncMode) -> std::io::Result<()> {
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(buf)?;
        self.len += buf.len() as u64;

        if sync == SyncMode::Always {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Read exactly `buf.len()` bytes starting at `offset`.
    pub fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)
    }

    /// Discard everything past `len`. Used to repair a torn tail on open.
    pub fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.file.set_len(len)?;
        self.len = len;
        Ok(())
    }

    /// Sync and release the handle.
    pub fn close(self) -> std::io::Result<()> {
        self.file.sync_data()
    }

    /// Release the handle and remove the file from the directory.
    pub fn delete(self) -> std::io::Result<()> {
        let path = self.path.clone();
        drop(self);
        delete_file(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_append_read() {
        let dir = tempdir().unwrap();

        let mut seg = Segment::open(dir.path(), 0, OpenMode::CreateNew).unwrap();
        assert_eq!(seg.len(), 0);

        seg.append(b"hello", SyncMode::OnClose).unwrap();
        seg.append(b"world", SyncMode::OnClose).unwrap();
        assert_eq!(seg.len(), 10);

        let mut buf = [0u8; 5];
        seg.read_exact_at(5, &mut buf).unwrap();
        assert_eq!(&buf, b"world");

        seg.read_exact_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_create_new_refuses_existing() {
        let dir = tempdir().unwrap();

        let seg = Segment::open(dir.path(), 3, OpenMode::CreateNew).unwrap();
        seg.close().unwrap();

        assert!(Segment::open(dir.path(), 3, OpenMode::CreateNew).is_err());
        assert!(Segment::open(dir.path(), 3, OpenMode::OpenExisting).is_ok());
    }

    #[test]
    fn test_open_existing_reports_size() {
        let dir = tempdir().unwrap();

        let mut seg = Segment::open(dir.path(), 1, OpenMode::CreateNew).unwrap();
        seg.append(b"0123456789", SyncMode::Always).unwrap();
        seg.close().unwrap();

        let seg = Segment::open(dir.path(), 1, OpenMode::OpenExisting).unwrap();
        assert_eq!(seg.len(), 10);
    }

    #[test]
    fn test_open_missing_fails() {
        let dir = tempdir().unwrap();
        assert!(Segment::open(dir.path(), 7, OpenMode::OpenExisting).is_err());
    }

    #[test]
    fn test_truncate() {
        let dir = tempdir().unwrap();

        let mut seg = Segment::open(dir.path(), 0, OpenMode::CreateNew).unwrap();
        seg.append(b"0123456789", SyncMode::OnClose).unwrap();
        seg.truncate(4).unwrap();
        assert_eq!(seg.len(), 4);
        assert_eq!(seg.disk_len().unwrap(), 4);

        seg.append(b"xy", SyncMode::OnClose).unwrap();
        let mut buf = [0u8; 6];
        seg.read_exact_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"0123xy");
    }

    #[test]
    fn test_second_handle_sees_appends() {
        let dir = tempdir().unwrap();

        let mut writer = Segment::open(dir.path(), 0, OpenMode::CreateNew).unwrap();
        let mut reader = Segment::open(dir.path(), 0, OpenMode::OpenExisting).unwrap();

        writer.append(b"visible", SyncMode::OnClose).unwrap();

        assert_eq!(reader.len(), 0);
        assert_eq!(reader.disk_len().unwrap(), 7);

        let mut buf = [0u8; 7];
        reader.read_exact_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"visible");
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let path = segment_file_path(dir.path(), 0);

        let seg = Segment::open(dir.path(), 0, OpenMode::CreateNew).unwrap();
        assert!(path.exists());

        seg.delete().unwrap();
        assert!(!path.exists());
    }
}
