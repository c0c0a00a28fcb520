//! Configuration management: the typed manager and its options.
//!
//! # Data Flow
//! ```text
//! Source (poll tick or push callback)
//!     → raw bytes
//!     → decode function (bytes → T)
//!     → compare with held T (PartialEq)
//!     → replace held T under the write lock
//!     → one blocking task per listener
//! ```

pub mod manager;
pub mod options;

pub use manager::{ConfigManager, DecodeFn};
pub use options::{Options, DEFAULT_POLL_INTERVAL};
