//! Buffer metrics: atomic counters and gauges.
//!
//! The buffer never aggregates or exports anything itself; it only
//! increments counters and sets gauges on a [`BufferMetrics`] record
//! handed to it at construction. A default record doubles as the no-op
//! sink for tests, and [`BufferMetrics::to_prometheus`] renders the
//! Prometheus text format for whatever HTTP surface the process wires up.

use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter initialized to 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter by 1.
    pub fn inc(&self) {
        self.add(1);
    }

    /// Add a value to the counter.
    pub fn add(&self, v: u64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    /// Get the current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A gauge that can go up or down.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    /// Create a new gauge initialized to 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gauge to a specific value.
    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    /// Add a value to the gauge.
    pub fn add(&self, v: i64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    /// Subtract a value from the gauge.
    pub fn sub(&self, v: i64) {
        self.value.fetch_sub(v, Ordering::Relaxed);
    }

    /// Get the current value.
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Everything a buffer reports about itself.
///
/// Shared between the buffer and the process by `Arc`; all updates are
/// atomic and lock-free.
#[derive(Debug, Default)]
pub struct BufferMetrics {
    /// Frame bytes appended to segments.
    pub bytes_written: Counter,
    /// Frame bytes decoded for delivery.
    pub bytes_read: Counter,
    /// Frames appended to segments.
    pub frames_written: Counter,
    /// Frames decoded for delivery.
    pub frames_read: Counter,
    /// Failed buffer opens.
    pub open_errors: Counter,
    /// Failed segment creates or appends.
    pub write_errors: Counter,
    /// Failed segment reads.
    pub read_errors: Counter,
    /// Encoded bytes pushed but not yet shifted.
    pub backlog_bytes: Gauge,
    /// Frames pushed but not yet shifted.
    pub backlog_frames: Gauge,
    /// Live segment files.
    pub segment_count: Gauge,
}

impl BufferMetrics {
    /// Create a fresh metrics record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Render all series in the Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        let counters: [(&str, &Counter); 7] = [
            ("pipebuf_bytes_written_total", &self.bytes_written),
            ("pipebuf_bytes_read_total", &self.bytes_read),
            ("pipebuf_frames_written_total", &self.frames_written),
            ("pipebuf_frames_read_total", &self.frames_read),
            ("pipebuf_open_errors_total", &self.open_errors),
            ("pipebuf_write_errors_total", &self.write_errors),
            ("pipebuf_read_errors_total", &self.read_errors),
        ];
        for (name, counter) in counters {
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, counter.get());
        }

        let gauges: [(&str, &Gauge); 3] = [
            ("pipebuf_backlog_bytes", &self.backlog_bytes),
            ("pipebuf_backlog_frames", &self.backlog_frames),
            ("pipebuf_segment_count", &self.segment_count),
        ];
        for (name, gauge) in gauges {
            let _ = writeln!(out, "# TYPE {} gauge", name);
            let _ = writeln!(out, "{} {}", name, gauge.get());
        }

        out
    }
}
