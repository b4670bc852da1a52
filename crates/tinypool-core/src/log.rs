//! Structured allocator lifecycle records.
//!
//! With logging turned on, every public operation and every pool-manager
//! decision appends one [`LifecycleRecord`]. Records live in a bounded
//! in-memory buffer owned by the allocator; embedders drain them and ship
//! them wherever they like (the harness writes them as JSONL). A capacity of
//! 0, the default, disables recording entirely.

use std::collections::VecDeque;

/// Lifecycle record severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// One structured allocator event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleRecord {
    /// Monotonic event id, starting at 1.
    pub decision_id: u64,
    /// Correlation id (`tinypool::<symbol>::<decision id hex>`).
    pub trace_id: String,
    pub level: LogLevel,
    /// API symbol (`allocate`, `deallocate`, `reallocate`).
    pub symbol: &'static str,
    /// Event kind (`alloc`, `refill`, `pool_grow`, ...).
    pub event: &'static str,
    /// Address involved in the event.
    pub addr: Option<usize>,
    /// Byte count involved in the event.
    pub size: Option<usize>,
    /// Size-class index, `None` for delegated requests.
    pub class: Option<usize>,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
    /// Free-form `key=value` details.
    pub details: String,
    /// Snapshot: cumulative pool growth in bytes.
    pub heap_size: usize,
    /// Snapshot: unused pool bytes.
    pub pool_remainder: usize,
    /// Snapshot: blocks on all free lists.
    pub free_blocks: usize,
}

/// Allocator state captured alongside each record.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Snapshot {
    pub heap_size: usize,
    pub pool_remainder: usize,
    pub free_blocks: usize,
}

/// Event payload handed to [`LifecycleLog::record`].
pub(crate) struct Event<'a> {
    pub level: LogLevel,
    pub symbol: &'static str,
    pub event: &'static str,
    pub addr: Option<usize>,
    pub size: Option<usize>,
    pub class: Option<usize>,
    pub outcome: &'static str,
    pub details: &'a str,
}

impl<'a> Event<'a> {
    pub fn new(
        level: LogLevel,
        symbol: &'static str,
        event: &'static str,
        outcome: &'static str,
    ) -> Self {
        Self {
            level,
            symbol,
            event,
            addr: None,
            size: None,
            class: None,
            outcome,
            details: "",
        }
    }

    pub fn addr(mut self, addr: usize) -> Self {
        self.addr = Some(addr);
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn class(mut self, class: usize) -> Self {
        self.class = Some(class);
        self
    }

    pub fn details(mut self, details: &'a str) -> Self {
        self.details = details;
        self
    }
}

/// Bounded FIFO of lifecycle records.
#[derive(Debug)]
pub struct LifecycleLog {
    records: VecDeque<LifecycleRecord>,
    capacity: usize,
    next_decision_id: u64,
    dropped: u64,
}

impl LifecycleLog {
    /// Creates a log that retains at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(256)),
            capacity,
            next_decision_id: 1,
            dropped: 0,
        }
    }

    /// Returns true if records are being kept.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.capacity > 0
    }

    pub(crate) fn record(&mut self, event: Event<'_>, snapshot: Snapshot) {
        if !self.enabled() {
            return;
        }
        let decision_id = self.next_decision_id;
        self.next_decision_id = self.next_decision_id.wrapping_add(1);
        if self.records.len() == self.capacity {
            self.records.pop_front();
            self.dropped += 1;
        }
        self.records.push_back(LifecycleRecord {
            decision_id,
            trace_id: format!("tinypool::{}::{:016x}", event.symbol, decision_id),
            level: event.level,
            symbol: event.symbol,
            event: event.event,
            addr: event.addr,
            size: event.size,
            class: event.class,
            outcome: event.outcome,
            details: event.details.to_owned(),
            heap_size: snapshot.heap_size,
            pool_remainder: snapshot.pool_remainder,
            free_blocks: snapshot.free_blocks,
        });
    }

    /// Retained records, oldest first.
    pub fn records(&self) -> impl ExactSizeIterator<Item = &LifecycleRecord> {
        self.records.iter()
    }

    /// Removes and returns every retained record.
    pub fn drain(&mut self) -> Vec<LifecycleRecord> {
        self.records.drain(..).collect()
    }

    /// Records evicted because the buffer was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
