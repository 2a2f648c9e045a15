//! murmur-core — Pure types, request validation and audio encoding.
//!
//! No async runtime, no I/O, no platform dependencies.

pub mod request;
pub mod text_prep;
pub mod types;
pub mod wav;
