//! noc-engine library
//!
//! Asynchronous transaction engine for a 2D-torus network-on-chip:
//! transaction-ID completion tracking, virtual-channel classification,
//! unicast and multicast address generation, and backpressure.

pub mod config;
pub mod error;
pub mod device;
pub mod engine;
pub mod multicast;
pub mod testing;

pub use config::{Config, EngineConfig};
pub use error::{NocError, Result};
pub use engine::NocEngine;
