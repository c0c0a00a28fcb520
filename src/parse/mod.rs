//! Reference decode functions turning raw bytes into typed configuration.
//!
//! Both decoders treat an empty payload as "no configuration" and return
//! `T::default()`, which is what a push source delivers when the watched file
//! is removed.

pub mod json;
pub mod yaml;

pub use json::json;
pub use yaml::yaml;
