//! Read and write cursors over the segment chain.
//!
//! Each cursor is a `(segment id, byte offset)` pair that owns its own
//! handle on the segment it currently points at. When the read and write
//! cursors sit on the same segment there are two handles on one file;
//! both are only touched under the block lock.

use std::mem;
use std::path::Path;

use tracing::warn;

use crate::frame::{self, LEN_PREFIX_SIZE};
use crate::options::SyncMode;
use crate::segment::{OpenMode, Segment};
use crate::{Error, Message, Result};

/// The append frontier: next byte to write.
#[derive(Debug)]
pub struct WriteCursor {
    segment: Segment,
    offset: u64,
}

impl WriteCursor {
    /// Wrap the active write segment at the given offset.
    pub fn new(segment: Segment, offset: u64) -> Self {
        Self { segment, offset }
    }

    /// Id of the segment being appended to.
    pub fn segment_id(&self) -> u64 {
        self.segment.id()
    }

    /// Next byte to write within the segment.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Append one encoded frame at the frontier.
    pub fn append(&mut self, buf: &[u8], sync: SyncMode) -> std::io::Result<()> {
        self.segment.append(buf, sync)?;
        self.offset += buf.len() as u64;
        Ok(())
    }

    /// Roll over: create the next segment and seal the current one.
    ///
    /// The new segment is created first so a failure leaves the cursor on
    /// the old segment, untouched. Returns the new segment id.
    pub fn roll(&mut self, dir: &Path) -> std::io::Result<u64> {
        let next_id = self.segment.id() + 1;
        let next = Segment::open(dir, next_id, OpenMode::CreateNew)?;

        let sealed = mem::replace(&mut self.segment, next);
        self.offset = 0;
        sealed.close()?;

        Ok(next_id)
    }

    /// Release the cursor, syncing the write segment.
    pub fn close(self) -> std::io::Result<()> {
        self.segment.close()
    }
}

/// The consume frontier: next byte to read.
#[derive(Debug)]
pub struct ReadCursor {
    segment: Segment,
    offset: u64,
}

impl ReadCursor {
    /// Wrap the oldest live segment at the given offset.
    pub fn new(segment: Segment, offset: u64) -> Self {
        Self { segment, offset }
    }

    /// Id of the segment being read.
    pub fn segment_id(&self) -> u64 {
        self.segment.id()
    }

    /// Next byte to read within the segment.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Current on-disk size of the read segment.
    pub fn disk_len(&self) -> std::io::Result<u64> {
        self.segment.disk_len()
    }

    /// Decode the frame at the cursor without advancing.
    ///
    /// `visible_end` bounds the readable byte range: the write offset when
    /// the cursors share a segment, the file size otherwise. A frame
    /// reaching past it means the backlog accounting and the file
    /// disagree, which is corruption. Transient read failures are retried
    /// once before giving up.
    pub fn read_frame(&mut self, visible_end: u64) -> Result<(Message, usize)> {
        if self.offset + LEN_PREFIX_SIZE as u64 > visible_end {
            return Err(Error::corruption("frame prefix reaches past segment end"));
        }

        let mut prefix = [0u8; LEN_PREFIX_SIZE];
        self.read_retry(self.offset, &mut prefix)?;
        let body_len = u32::from_le_bytes(prefix) as u64;

        if self.offset + LEN_PREFIX_SIZE as u64 + body_len > visible_end {
            return Err(Error::corruption("frame body reaches past segment end"));
        }

        let mut body = vec![0u8; body_len as usize];
        self.read_retry(self.offset + LEN_PREFIX_SIZE as u64, &mut body)?;

        let message = frame::decode_body(&body)?;
        Ok((message, LEN_PREFIX_SIZE + body_len as usize))
    }

    /// Advance the cursor past an acknowledged frame.
    pub fn advance(&mut self, frame_len: usize) {
        self.offset += frame_len as u64;
    }

    /// Move to the next segment and reap the drained one.
    ///
    /// The next segment is opened first; reap failures only delay disk
    /// reclamation and are logged, not surfaced.
    pub fn roll(&mut self, dir: &Path, next_id: u64) -> std::io::Result<()> {
        let next = Segment::open(dir, next_id, OpenMode::OpenExisting)?;

        let drained = mem::replace(&mut self.segment, next);
        self.offset = 0;

        let drained_id = drained.id();
        if let Err(e) = drained.delete() {
            warn!(segment = drained_id, error = %e, "failed to reap drained segment");
        }

        Ok(())
    }

    fn read_retry(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if let Err(first) = self.segment.read_exact_at(offset, buf) {
            warn!(
                segment = self.segment.id(),
                offset,
                error = %first,
                "segment read failed, retrying",
            );
            self.segment
                .read_exact_at(offset, buf)
                .map_err(Error::read_failed)?;
        }
        Ok(())
    }
}
