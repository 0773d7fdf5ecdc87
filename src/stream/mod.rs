//! Duplex packet stream.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `engine` | [`Stream`] handle, receive loop and writer task |
//! | `options` | [`StreamOptions`] channel sizing |
//!
//! Adapter constructors such as `Stream::socket` live next to their
//! transports in [`crate::transport`].

// ============================================================================
// Submodules
// ============================================================================

mod engine;

/// Stream configuration.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use engine::Stream;
pub use options::StreamOptions;
