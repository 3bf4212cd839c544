//! FileBlock - durable FIFO buffer over one directory of segments.
//!
//! The block persists every pushed message into a chain of bounded,
//! append-only segment files and hands them back in push order. A write
//! cursor tracks the append frontier, a read cursor the consume frontier;
//! segments behind the read cursor are deleted, and a restart rebuilds
//! both frontiers by scanning the directory.
//!
//! # Thread safety
//!
//! One producer thread may call [`push`](FileBlock::push) while one
//! consumer thread calls [`next`](FileBlock::next) /
//! [`shift`](FileBlock::shift). A single mutex guards all state; `next`
//! parks on a condition variable while the buffer is empty.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::mem;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};

use crate::cursor::{ReadCursor, WriteCursor};
use crate::frame::{self, Decoded, LEN_PREFIX_SIZE};
use crate::metrics::BufferMetrics;
use crate::options::{Options, MIN_RECOMMENDED_FILE_SIZE};
use crate::segment::{OpenMode, Segment};
use crate::types::{Message, MessageStack};
use crate::util::filename::{create_dir_if_missing, list_segments, lock_file_path};
use crate::{Error, Result};

/// The frame last returned by `next`, held until `shift` acknowledges it.
#[derive(Debug)]
struct Pending {
    message: Message,
    frame_len: usize,
}

/// Everything that exists only while the block is open.
#[derive(Debug)]
struct OpenState {
    write: WriteCursor,
    read: ReadCursor,
    /// Live segment ids, ascending. Front is the read segment, back the
    /// write segment. Ids are not necessarily contiguous: a directory
    /// with holes is read as-is and missing ids are never fabricated.
    chain: VecDeque<u64>,
    /// Encoded bytes pushed but not yet shifted.
    backlog: usize,
    /// Frames pushed but not yet shifted.
    backlog_frames: u64,
    pending: Option<Pending>,
    /// Held for the lifetime of the open block; releasing it on close
    /// lets another process take over the directory.
    _lock: File,
}

#[derive(Debug)]
enum State {
    Open(Box<OpenState>),
    Closing,
    Closed,
}

/// Durable file-backed FIFO message buffer.
#[derive(Debug)]
pub struct FileBlock {
    options: Options,
    metrics: Arc<BufferMetrics>,
    state: Mutex<State>,
    readable: Condvar,
}

impl FileBlock {
    /// Open the buffer at `options.path`, creating the directory and the
    /// first segment if the directory is empty, otherwise recovering the
    /// cursors and backlog from the segments found there.
    pub fn open(options: Options) -> Result<Self> {
        Self::open_with_metrics(options, Arc::new(BufferMetrics::new()))
    }

    /// Open the buffer, reporting into the given metrics record.
    pub fn open_with_metrics(options: Options, metrics: Arc<BufferMetrics>) -> Result<Self> {
        match Self::open_inner(options, Arc::clone(&metrics)) {
            Ok(block) => Ok(block),
            Err(e) => {
                metrics.open_errors.inc();
                Err(e)
            }
        }
    }

    fn open_inner(options: Options, metrics: Arc<BufferMetrics>) -> Result<Self> {
        options.validate()?;
        if options.file_size < MIN_RECOMMENDED_FILE_SIZE {
            warn!(
                file_size = options.file_size,
                "segment size below {} bytes will churn through files",
                MIN_RECOMMENDED_FILE_SIZE,
            );
        }

        create_dir_if_missing(&options.path).map_err(|e| {
            Error::InvalidConfiguration(format!(
                "path {} not usable: {}",
                options.path.display(),
                e
            ))
        })?;
        let lock = Self::acquire_lock(&options.path)?;

        let ids = list_segments(&options.path)?;

        let (write, read, chain, backlog, backlog_frames) = if ids.is_empty() {
            let wseg = Segment::open(&options.path, 0, OpenMode::CreateNew)
                .map_err(Error::write_failed)?;
            let rseg = Segment::open(&options.path, 0, OpenMode::OpenExisting)
                .map_err(Error::read_failed)?;
            (
                WriteCursor::new(wseg, 0),
                ReadCursor::new(rseg, 0),
                VecDeque::from([0]),
                0usize,
                0u64,
            )
        } else {
            let write_id = ids[ids.len() - 1];
            let read_id = ids[0];

            let mut backlog = 0usize;
            let mut frames = 0u64;

            // Sealed segments end exactly on a frame boundary; walking
            // the length prefixes recovers the frame count without
            // reading any payloads.
            for &id in &ids[..ids.len() - 1] {
                let (seg_frames, seg_len) = Self::scan_sealed_segment(&options.path, id)?;
                frames += seg_frames;
                backlog += seg_len as usize;
            }

            // Only the newest segment may hold a torn tail.
            let mut wseg = Segment::open(&options.path, write_id, OpenMode::OpenExisting)
                .map_err(Error::read_failed)?;
            let (wframes, valid_len) = Self::scan_write_segment(&mut wseg)?;
            frames += wframes;
            backlog += valid_len as usize;

            let rseg = Segment::open(&options.path, read_id, OpenMode::OpenExisting)
                .map_err(Error::read_failed)?;

            (
                WriteCursor::new(wseg, valid_len),
                ReadCursor::new(rseg, 0),
                ids.iter().copied().collect(),
                backlog,
                frames,
            )
        };

        metrics.backlog_bytes.set(backlog as i64);
        metrics.backlog_frames.set(backlog_frames as i64);
        metrics.segment_count.set(chain.len() as i64);

        info!(
            path = %options.path.display(),
            segments = chain.len(),
            backlog,
            "file buffer opened",
        );

        Ok(Self {
            options,
            metrics,
            state: Mutex::new(State::Open(Box::new(OpenState {
                write,
                read,
                chain,
                backlog,
                backlog_frames,
                pending: None,
                _lock: lock,
            }))),
            readable: Condvar::new(),
        })
    }

    /// Take the directory lock so two processes cannot append to the
    /// same segment chain.
    fn acquire_lock(dir: &Path) -> Result<File> {
        let lock_path = lock_file_path(dir);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if ret != 0 {
                return Err(Error::Locked(format!(
                    "{} is held by another process",
                    lock_path.display()
                )));
            }
        }

        Ok(file)
    }

    /// Walk a sealed segment's length prefixes.
    ///
    /// Returns (frame count, byte length). A frame reaching past the end
    /// of a sealed segment is corruption, not a torn tail.
    fn scan_sealed_segment(dir: &Path, id: u64) -> Result<(u64, u64)> {
        let mut seg =
            Segment::open(dir, id, OpenMode::OpenExisting).map_err(Error::read_failed)?;
        let len = seg.len();

        let mut off = 0u64;
        let mut frames = 0u64;
        let mut prefix = [0u8; LEN_PREFIX_SIZE];

        while off < len {
            if off + LEN_PREFIX_SIZE as u64 > len {
                return Err(Error::corruption(format!(
                    "torn frame in sealed segment {}",
                    id
                )));
            }
            seg.read_exact_at(off, &mut prefix)
                .map_err(Error::read_failed)?;
            let body_len = u32::from_le_bytes(prefix) as u64;

            if off + LEN_PREFIX_SIZE as u64 + body_len > len {
                return Err(Error::corruption(format!(
                    "torn frame in sealed segment {}",
                    id
                )));
            }
            off += LEN_PREFIX_SIZE as u64 + body_len;
            frames += 1;
        }

        Ok((frames, len))
    }

    /// Decode the write segment from offset 0 and repair its tail.
    ///
    /// Returns (frame count, end of the last complete frame). Bytes past
    /// that end are a torn append from an unclean shutdown and are
    /// truncated away; an undecodable complete frame is corruption.
    fn scan_write_segment(seg: &mut Segment) -> Result<(u64, u64)> {
        let file_len = seg.len();
        let mut buf = vec![0u8; file_len as usize];
        seg.read_exact_at(0, &mut buf).map_err(Error::read_failed)?;

        let mut off = 0usize;
        let mut frames = 0u64;
        loop {
            match frame::decode(&buf[off..])? {
                Decoded::Frame { frame_len, .. } => {
                    off += frame_len;
                    frames += 1;
                }
                Decoded::Incomplete => break,
            }
        }

        if (off as u64) < file_len {
            warn!(
                segment = seg.id(),
                valid = off,
                file_len,
                "truncating torn frame at write segment tail",
            );
            seg.truncate(off as u64)?;
        }

        Ok((frames, off as u64))
    }

    /// Append a message at the write cursor.
    ///
    /// Rolls the write segment first when the frame would cross the
    /// configured size, unless the segment is empty: a frame larger than
    /// `file_size` gets a segment of its own rather than being split.
    pub fn push(&self, msg: Message) -> Result<()> {
        let frame_len = frame::encoded_len(&msg);
        let encoded = frame::encode(&msg);

        let mut st = self.state.lock();
        let open = match &mut *st {
            State::Open(open) => open,
            _ => return Err(Error::Closed),
        };

        if open.write.offset() + frame_len as u64 > self.options.file_size as u64
            && open.write.offset() > 0
        {
            match open.write.roll(&self.options.path) {
                Ok(next_id) => {
                    open.chain.push_back(next_id);
                    self.metrics.segment_count.set(open.chain.len() as i64);
                }
                Err(e) => {
                    self.metrics.write_errors.inc();
                    return self.fatal(&mut st, Error::write_failed(e));
                }
            }
        }

        if let Err(e) = open.write.append(&encoded, self.options.sync_mode) {
            self.metrics.write_errors.inc();
            return self.fatal(&mut st, Error::write_failed(e));
        }

        open.backlog += frame_len;
        open.backlog_frames += 1;
        self.metrics.bytes_written.add(frame_len as u64);
        self.metrics.frames_written.inc();
        self.metrics.backlog_bytes.set(open.backlog as i64);
        self.metrics.backlog_frames.set(open.backlog_frames as i64);

        self.readable.notify_one();
        Ok(())
    }

    /// Return the message at the read cursor without advancing.
    ///
    /// Blocks while the backlog is empty and the block is open. Repeated
    /// calls with no intervening [`shift`](Self::shift) return the same
    /// message.
    pub fn next(&self) -> Result<Message> {
        let mut st = self.state.lock();

        loop {
            let open = match &mut *st {
                State::Open(open) => open,
                _ => return Err(Error::Closed),
            };

            if let Some(pending) = &open.pending {
                return Ok(pending.message.clone());
            }
            if open.backlog > 0 {
                break;
            }
            self.readable.wait(&mut st);
        }

        let open = match &mut *st {
            State::Open(open) => open,
            _ => return Err(Error::Closed),
        };

        // The read cursor may rest at the end of a drained segment after
        // a rollover; move it onto the segment holding the next frame.
        if let Err(e) = Self::advance_read_segment(&self.options, &self.metrics, open) {
            return self.fatal(&mut st, e);
        }

        let visible_end = if open.read.segment_id() == open.write.segment_id() {
            open.write.offset()
        } else {
            match open.read.disk_len() {
                Ok(len) => len,
                Err(e) => {
                    self.metrics.read_errors.inc();
                    return self.fatal(&mut st, Error::read_failed(e));
                }
            }
        };

        match open.read.read_frame(visible_end) {
            Ok((message, frame_len)) => {
                self.metrics.bytes_read.add(frame_len as u64);
                self.metrics.frames_read.inc();
                open.pending = Some(Pending {
                    message: message.clone(),
                    frame_len,
                });
                Ok(message)
            }
            Err(e) => {
                if matches!(e, Error::ReadFailed(_)) {
                    self.metrics.read_errors.inc();
                }
                self.fatal(&mut st, e)
            }
        }
    }

    /// Acknowledge the message last returned by [`next`](Self::next).
    ///
    /// A no-op if `next` has not been called since the previous shift.
    /// Draining the read segment reaps it once the write cursor has
    /// moved on.
    pub fn shift(&self) -> Result<()> {
        let mut st = self.state.lock();
        let open = match &mut *st {
            State::Open(open) => open,
            _ => return Err(Error::Closed),
        };

        let pending = match open.pending.take() {
            Some(p) => p,
            None => return Ok(()),
        };

        open.read.advance(pending.frame_len);
        open.backlog -= pending.frame_len;
        open.backlog_frames -= 1;
        self.metrics.backlog_bytes.set(open.backlog as i64);
        self.metrics.backlog_frames.set(open.backlog_frames as i64);

        if let Err(e) = Self::advance_read_segment(&self.options, &self.metrics, open) {
            return self.fatal(&mut st, e);
        }
        Ok(())
    }

    /// Current backlog in encoded bytes. Zero once closed.
    pub fn backlog(&self) -> usize {
        match &*self.state.lock() {
            State::Open(open) => open.backlog,
            _ => 0,
        }
    }

    /// Close the buffer: wake all waiters, sync and release every
    /// segment handle. Idempotent. Reports the first close error but
    /// always finishes releasing handles.
    pub fn close(&self) -> Result<()> {
        let mut st = self.state.lock();
        let open = match mem::replace(&mut *st, State::Closing) {
            State::Open(open) => open,
            prev => {
                *st = prev;
                return Ok(());
            }
        };
        self.readable.notify_all();
        drop(st);

        // Handle release happens outside the lock; concurrent callers
        // observe Closing and bail with Closed.
        let OpenState { write, read, .. } = *open;
        let result = write.close();
        drop(read);

        *self.state.lock() = State::Closed;

        result.map_err(|e| Error::Io(e.to_string()))
    }

    /// Transition to Closed after an unrecoverable error, waking all
    /// waiters and dropping every handle.
    fn fatal<T>(&self, st: &mut State, err: Error) -> Result<T> {
        *st = State::Closed;
        self.readable.notify_all();
        Err(err)
    }

    fn advance_read_segment(
        options: &Options,
        metrics: &BufferMetrics,
        open: &mut OpenState,
    ) -> Result<()> {
        while open.read.segment_id() != open.write.segment_id() {
            // The read segment is sealed once the write cursor has moved
            // past it, so its disk length is its final length.
            let end = open.read.disk_len().map_err(|e| {
                metrics.read_errors.inc();
                Error::read_failed(e)
            })?;
            if open.read.offset() < end {
                break;
            }

            open.chain.pop_front();
            let next_id = match open.chain.front() {
                Some(&id) => id,
                None => {
                    return Err(Error::corruption("segment chain drained past the write head"))
                }
            };
            open.read.roll(&options.path, next_id).map_err(|e| {
                metrics.read_errors.inc();
                Error::read_failed(e)
            })?;
            metrics.segment_count.set(open.chain.len() as i64);
        }
        Ok(())
    }
}

impl Drop for FileBlock {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl MessageStack for FileBlock {
    fn push(&self, msg: Message) -> Result<()> {
        FileBlock::push(self, msg)
    }

    fn next(&self) -> Result<Message> {
        FileBlock::next(self)
    }

    fn shift(&self) -> Result<()> {
        FileBlock::shift(self)
    }

    fn backlog(&self) -> usize {
        FileBlock::backlog(self)
    }

    fn close(&self) -> Result<()> {
        FileBlock::close(self)
    }
}
