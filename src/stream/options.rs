//! Stream configuration.
//!
//! # Example
//!
//! ```ignore
//! use mqtt_stream::StreamOptions;
//!
//! let options = StreamOptions::new()
//!     .with_incoming_capacity(16)
//!     .with_outgoing_capacity(16);
//! ```

// ============================================================================
// Constants
// ============================================================================

/// Default receive channel depth.
///
/// One slot: the receive loop does not read the next frame until the
/// previous packet has been taken.
pub const DEFAULT_INCOMING_CAPACITY: usize = 1;

/// Default depth of the [`outgoing`](super::Stream::outgoing) queue.
pub const DEFAULT_OUTGOING_CAPACITY: usize = 1;

// ============================================================================
// StreamOptions
// ============================================================================

/// Channel sizing for a [`Stream`](super::Stream).
///
/// Capacities below one are raised to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Packets decoded ahead of the consumer.
    pub incoming_capacity: usize,

    /// Packets queued on the async send path.
    pub outgoing_capacity: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl StreamOptions {
    /// Creates options with default capacities.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            incoming_capacity: DEFAULT_INCOMING_CAPACITY,
            outgoing_capacity: DEFAULT_OUTGOING_CAPACITY,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl StreamOptions {
    /// Sets the receive channel depth.
    #[inline]
    #[must_use]
    pub const fn with_incoming_capacity(mut self, capacity: usize) -> Self {
        self.incoming_capacity = capacity;
        self
    }

    /// Sets the async send queue depth.
    #[inline]
    #[must_use]
    pub const fn with_outgoing_capacity(mut self, capacity: usize) -> Self {
        self.outgoing_capacity = capacity;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
