//! MemoryBlock - volatile in-memory FIFO buffer.
//!
//! The non-durable sibling of [`crate::FileBlock`]: same contract, same
//! backlog unit, nothing on disk. Bounded by total encoded bytes;
//! `push` applies backpressure by parking until the consumer drains.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::frame;
use crate::metrics::BufferMetrics;
use crate::types::{Message, MessageStack};
use crate::{Error, Result};

struct MemState {
    queue: VecDeque<Message>,
    backlog: usize,
    /// Whether `next` has returned the front message since the last shift.
    pending: bool,
    closed: bool,
}

/// Bounded in-memory FIFO message buffer.
pub struct MemoryBlock {
    limit: usize,
    metrics: Arc<BufferMetrics>,
    state: Mutex<MemState>,
    readable: Condvar,
    writable: Condvar,
}

impl MemoryBlock {
    /// Create a buffer holding at most `limit` encoded bytes.
    pub fn new(limit: usize) -> Self {
        Self::with_metrics(limit, Arc::new(BufferMetrics::new()))
    }

    /// Create a buffer reporting into the given metrics record.
    pub fn with_metrics(limit: usize, metrics: Arc<BufferMetrics>) -> Self {
        Self {
            limit,
            metrics,
            state: Mutex::new(MemState {
                queue: VecDeque::new(),
                backlog: 0,
                pending: false,
                closed: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    /// Append a message, parking while the buffer is over its limit.
    ///
    /// A single message larger than the whole limit is still accepted
    /// once the buffer is empty, matching the file block's treatment of
    /// oversize frames.
    pub fn push(&self, msg: Message) -> Result<()> {
        let size = frame::encoded_len(&msg);

        let mut st = self.state.lock();
        loop {
            if st.closed {
                return Err(Error::Closed);
            }
            if st.backlog + size <= self.limit || st.queue.is_empty() {
                break;
            }
            self.writable.wait(&mut st);
        }

        st.queue.push_back(msg);
        st.backlog += size;
        self.metrics.bytes_written.add(size as u64);
        self.metrics.frames_written.inc();
        self.metrics.backlog_bytes.set(st.backlog as i64);
        self.metrics.backlog_frames.set(st.queue.len() as i64);
        self.readable.notify_one();
        Ok(())
    }

    /// Return the message at the head without removing it, parking while
    /// the buffer is empty.
    pub fn next(&self) -> Result<Message> {
        let mut st = self.state.lock();
        loop {
            if st.closed {
                return Err(Error::Closed);
            }
            if let Some(front) = st.queue.front() {
                let msg = front.clone();
                if !st.pending {
                    self.metrics.bytes_read.add(frame::encoded_len(&msg) as u64);
                    self.metrics.frames_read.inc();
                }
                st.pending = true;
                return Ok(msg);
            }
            self.readable.wait(&mut st);
        }
    }

    /// Acknowledge the message last returned by `next`.
    pub fn shift(&self) -> Result<()> {
        let mut st = self.state.lock();
        if st.closed {
            return Err(Error::Closed);
        }
        if !st.pending {
            return Ok(());
        }

        if let Some(msg) = st.queue.pop_front() {
            st.backlog -= frame::encoded_len(&msg);
        }
        st.pending = false;
        self.metrics.backlog_bytes.set(st.backlog as i64);
        self.metrics.backlog_frames.set(st.queue.len() as i64);
        self.writable.notify_one();
        Ok(())
    }

    /// Current backlog in encoded bytes. Zero once closed.
    pub fn backlog(&self) -> usize {
        let st = self.state.lock();
        if st.closed {
            0
        } else {
            st.backlog
        }
    }

    /// Close the buffer, discarding queued messages and waking all
    /// parked producers and consumers. Idempotent.
    pub fn close(&self) -> Result<()> {
        let mut st = self.state.lock();
        if !st.closed {
            st.closed = true;
            st.queue.clear();
            st.backlog = 0;
            st.pending = false;
            self.metrics.backlog_bytes.set(0);
            self.metrics.backlog_frames.set(0);
            self.readable.notify_all();
            self.writable.notify_all();
        }
        Ok(())
    }
}

impl MessageStack for MemoryBlock {
    fn push(&self, msg: Message) -> Result<()> {
        MemoryBlock::push(self, msg)
    }

    fn next(&self) -> Result<Message> {
        MemoryBlock::next(self)
    }

    fn shift(&self) -> Result<()> {
        MemoryBlock::shift(self)
    }

    fn backlog(&self) -> usize {
        MemoryBlock::backlog(self)
    }

    fn close(&self) -> Result<()> {
        MemoryBlock::close(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn msg(parts: &[&str]) -> Message {
        parts.iter().map(|p| Bytes::from(p.to_string())).collect()
    }

    #[test]
    fn test_push_next_shift_order() {
        let block = MemoryBlock::new(1024);

        for i in 0..10 {
            block.push(msg(&[&format!("test{}", i)])).unwrap();
        }
        for i in 0..10 {
            let m = block.next().unwrap();
            assert_eq!(m.part(0).unwrap(), &format!("test{}", i));
            block.shift().unwrap();
        }
        assert_eq!(block.backlog(), 0);
    }

    #[test]
    fn test_backlog_counts_encoded_bytes() {
        let block = MemoryBlock::new(1024);

        block.push(msg(&["1234"])).unwrap();
        assert_eq!(block.backlog(), 16);

        block.push(msg(&["1234", "1234"])).unwrap();
        assert_eq!(block.backlog(), 40);

        block.next().unwrap();
        block.shift().unwrap();
        assert_eq!(block.backlog(), 24);
    }

    #[test]
    fn test_shift_without_next_is_noop() {
        let block = MemoryBlock::new(1024);
        block.push(msg(&["a"])).unwrap();

        block.shift().unwrap();
        assert_eq!(block.backlog(), 13);
    }

    #[test]
    fn test_oversize_message_accepted_when_empty() {
        let block = MemoryBlock::new(16);

        let big = "x".repeat(100);
        block.push(msg(&[&big])).unwrap();
        assert_eq!(block.next().unwrap(), msg(&[&big]));
        block.shift().unwrap();
    }

    #[test]
    fn test_push_blocks_until_shift() {
        // Limit fits exactly one 16-byte frame.
        let block = Arc::new(MemoryBlock::new(16));
        block.push(msg(&["1234"])).unwrap();

        let producer = {
            let block = Arc::clone(&block);
            thread::spawn(move || block.push(msg(&["5678"])))
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(block.backlog(), 16);

        block.next().unwrap();
        block.shift().unwrap();

        producer.join().unwrap().unwrap();
        assert_eq!(block.next().unwrap(), msg(&["5678"]));
    }

    #[test]
    fn test_close_wakes_blocked_next() {
        let block = Arc::new(MemoryBlock::new(1024));

        let consumer = {
            let block = Arc::clone(&block);
            thread::spawn(move || block.next())
        };

        thread::sleep(Duration::from_millis(50));
        block.close().unwrap();

        assert!(matches!(consumer.join().unwrap(), Err(Error::Closed)));
    }

    #[test]
    fn test_operations_after_close() {
        let block = MemoryBlock::new(1024);
        block.push(msg(&["x"])).unwrap();
        block.close().unwrap();
        block.close().unwrap();

        assert!(matches!(block.push(msg(&["y"])), Err(Error::Closed)));
        assert!(matches!(block.next(), Err(Error::Closed)));
        assert!(matches!(block.shift(), Err(Error::Closed)));
        assert_eq!(block.backlog(), 0);
    }
}
