//! murmur-lib — TTS server engine.
//!
//! Engine adapter over a Kokoro backend, model download and sidecar
//! lifecycle, per-request scratch files, and the HTTP API.
//! Depends on murmur-core for pure types and audio encoding.

pub mod adapter;
pub mod download;
pub mod engine;
pub mod kokoro;
pub mod scratch;
pub mod server;
pub mod sidecar;

// Re-export murmur-core for convenience
pub use murmur_core;
