//! Allocator configuration.
//!
//! The size-class geometry is fixed; what can be tuned is how strictly
//! deallocations are checked, what happens on unrecoverable exhaustion, the
//! refill batch size and how many lifecycle records are retained.

/// Depth of deallocation checking.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationMode {
    /// Rejects null pointers and blocks already on a free list.
    #[default]
    Strict,
    /// Strict checks plus a registry of live blocks, which also catches
    /// size-class mismatches and pointers this allocator never produced.
    Hardened,
}

impl ValidationMode {
    /// Parse from string (case-insensitive). Unknown values fall back to
    /// [`ValidationMode::Strict`].
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "hardened" | "full" | "tracked" => Self::Hardened,
            _ => Self::Strict,
        }
    }

    /// Returns true if live blocks are tracked.
    #[must_use]
    pub const fn tracks_live_blocks(self) -> bool {
        matches!(self, Self::Hardened)
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Hardened => "hardened",
        }
    }
}

/// Reaction to an allocation that cannot be satisfied at all.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OomPolicy {
    /// Return [`AllocError::OutOfMemory`](crate::AllocError::OutOfMemory).
    #[default]
    ReturnError,
    /// Terminate the process after recording the failure.
    Abort,
}

impl OomPolicy {
    /// Parse from string (case-insensitive). Unknown values fall back to
    /// [`OomPolicy::ReturnError`].
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "abort" | "exit" | "fatal" => Self::Abort,
            _ => Self::ReturnError,
        }
    }
}

/// Blocks requested per refill.
pub const DEFAULT_REFILL_BATCH: usize = 20;

/// Pool-manager iterations before giving up on one request.
pub const DEFAULT_MAX_CHUNK_RETRIES: usize = 4;

/// Lifecycle records retained by [`AllocatorConfig::with_logging`].
///
/// Recording is off by default: each record allocates on the system heap,
/// which the small-object path must not do.
pub const DEFAULT_LOG_CAPACITY: usize = 4096;

/// Tunables for a [`PoolAllocator`](crate::PoolAllocator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorConfig {
    pub validation: ValidationMode,
    pub oom_policy: OomPolicy,
    /// Blocks requested from the pool on each refill (at least 1).
    pub refill_batch: usize,
    /// Bound on the grow/scavenge retry loop (at least 2: one attempt to
    /// replenish the pool and one to carve from it).
    pub max_chunk_retries: usize,
    /// Maximum retained lifecycle records; 0 disables recording.
    pub log_capacity: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            validation: ValidationMode::default(),
            oom_policy: OomPolicy::default(),
            refill_batch: DEFAULT_REFILL_BATCH,
            max_chunk_retries: DEFAULT_MAX_CHUNK_RETRIES,
            log_capacity: 0,
        }
    }
}

impl AllocatorConfig {
    #[must_use]
    pub fn with_validation(mut self, validation: ValidationMode) -> Self {
        self.validation = validation;
        self
    }

    #[must_use]
    pub fn with_oom_policy(mut self, oom_policy: OomPolicy) -> Self {
        self.oom_policy = oom_policy;
        self
    }

    /// Sets the refill batch; values below 1 are raised to 1.
    #[must_use]
    pub fn with_refill_batch(mut self, batch: usize) -> Self {
        self.refill_batch = batch.max(1);
        self
    }

    /// Sets the retry bound; values below 2 are raised to 2.
    #[must_use]
    pub fn with_max_chunk_retries(mut self, retries: usize) -> Self {
        self.max_chunk_retries = retries.max(2);
        self
    }

    #[must_use]
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    /// Turns on lifecycle recording with [`DEFAULT_LOG_CAPACITY`].
    #[must_use]
    pub fn with_logging(self) -> Self {
        self.with_log_capacity(DEFAULT_LOG_CAPACITY)
    }

    /// Clamps fields to their legal ranges.
    #[must_use]
    pub(crate) fn normalized(self) -> Self {
        Self {
            refill_batch: self.refill_batch.max(1),
            max_chunk_retries: self.max_chunk_retries.max(2),
            ..self
        }
    }
}
