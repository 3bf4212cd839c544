//! # pipebuf
//!
//! A durable, file-backed FIFO message buffer for streaming pipelines.
//!
//! The buffer sits between an ingest stage and a delivery stage: it
//! absorbs bursts, survives process restarts, and hands multi-part
//! messages downstream in strict arrival order with bounded memory use.
//! Messages are persisted into a chain of bounded, append-only segment
//! files; segments are deleted as the consumer drains them, and an
//! unclean shutdown is repaired on the next open by scanning the
//! directory.
//!
//! Delivery is at-least-once: `next` peeks at the oldest message and
//! `shift` acknowledges it, so a consumer that crashes mid-message sees
//! it again after a restart.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pipebuf::{FileBlock, Message, Options};
//!
//! let block = FileBlock::open(Options::new("./data/buffer"))?;
//!
//! // Producer side
//! let mut msg = Message::new();
//! msg.push_part("header").push_part("payload");
//! block.push(msg)?;
//!
//! // Consumer side
//! let msg = block.next()?; // blocks until a message is available
//! deliver(&msg)?;
//! block.shift()?; // acknowledge only after delivery
//! ```

// Public modules
pub mod error;
pub mod frame;
pub mod metrics;
pub mod options;
pub mod types;

// Buffer implementations
mod block;
mod memory;

// Internal modules
mod cursor;
mod segment;
mod util;

use std::sync::Arc;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use options::{BufferConfig, Options, OptionsBuilder, SyncMode};
pub use types::{Message, MessageStack};

// Buffers
pub use block::FileBlock;
pub use memory::MemoryBlock;

// Metrics
pub use metrics::{BufferMetrics, Counter, Gauge};

/// Construct the buffer selected by a configuration record.
///
/// Both variants report into the given metrics record, so the process can
/// expose one registry regardless of which buffer it runs.
pub fn construct(
    conf: &BufferConfig,
    metrics: Arc<BufferMetrics>,
) -> Result<Box<dyn MessageStack>> {
    match conf {
        BufferConfig::File(options) => Ok(Box::new(FileBlock::open_with_metrics(
            options.clone(),
            metrics,
        )?)),
        BufferConfig::Memory { limit } => Ok(Box::new(MemoryBlock::with_metrics(*limit, metrics))),
    }
}
