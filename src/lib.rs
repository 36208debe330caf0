//! iotree – a hierarchical device registry with deadline-bounded reads
//!
//! This crate implements:
//! - An isolated-state entity runtime on tokio: one task and mailbox per entity
//! - Liveness watches, one-shot timers, and a path directory for named entities
//! - A supervisor → manager → group → device tree with lazy child creation
//! - Scatter-gather reads that classify every child exactly once, even when
//!   children die or stay silent

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Entity runtime the device tree is built on
pub mod runtime;

/// Device tree entities and their protocol
pub mod iot;

// Re-export key types for convenience
pub use iot::IotSystem;
pub use runtime::{Runtime, RuntimeConfig};

/// Current version of the iotree crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
