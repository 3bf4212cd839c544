//! Core message types shared by all buffer implementations.

use bytes::Bytes;

use crate::Result;

/// A multi-part message.
///
/// Parts are opaque byte strings and preserve insertion order. Empty
/// parts are legal, as is a message with no parts at all; both survive a
/// trip through the buffer byte-for-byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Ordered message parts.
    pub parts: Vec<Bytes>,
}

impl Message {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a message from existing parts.
    pub fn from_parts(parts: Vec<Bytes>) -> Self {
        Self { parts }
    }

    /// Append a part.
    pub fn push_part(&mut self, part: impl Into<Bytes>) -> &mut Self {
        self.parts.push(part.into());
        self
    }

    /// Get a part by index.
    pub fn part(&self, idx: usize) -> Option<&Bytes> {
        self.parts.get(idx)
    }

    /// Number of parts.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the message has no parts.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl<P: Into<Bytes>> FromIterator<P> for Message {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self {
            parts: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// An ordered message buffer between a producer and a consumer.
///
/// Implementations deliver messages in push order, at least once:
/// `next` returns the oldest unacknowledged message without advancing,
/// and `shift` acknowledges it. All methods are safe to call from
/// separate producer and consumer threads.
pub trait MessageStack: Send + Sync {
    /// Append a message to the tail of the buffer.
    fn push(&self, msg: Message) -> Result<()>;

    /// Return the message at the head of the buffer without removing it.
    ///
    /// Blocks while the buffer is empty; returns [`crate::Error::Closed`]
    /// once the buffer is closed.
    fn next(&self) -> Result<Message>;

    /// Acknowledge the message last returned by `next`.
    ///
    /// A no-op if `next` has not been called since the previous shift.
    fn shift(&self) -> Result<()>;

    /// Total encoded size in bytes of all unacknowledged messages.
    fn backlog(&self) -> usize;

    /// Close the buffer, waking any blocked `next` callers.
    fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_parts() {
        let mut msg = Message::new();
        assert!(msg.is_empty());

        msg.push_part("hello").push_part(Bytes::new());
        assert_eq!(msg.len(), 2);
        assert_eq!(msg.part(0), Some(&Bytes::from("hello")));
        assert_eq!(msg.part(1), Some(&Bytes::new()));
        assert_eq!(msg.part(2), None);
    }

    #[test]
    fn test_message_from_iter() {
        let msg: Message = ["a", "b", "c"].into_iter().collect();
        assert_eq!(msg.len(), 3);
        assert_eq!(msg.part(2), Some(&Bytes::from("c")));
    }
}
