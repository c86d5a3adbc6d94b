//! Throughput scenarios over the software fabric.
//!
//! This module provides:
//! - A double-buffered DRAM read pipeline driven by rotating transaction IDs
//! - Multicast runs that follow a [`MulticastPlan`](crate::multicast::MulticastPlan)
//! - Posted and acknowledged write streams
//! - A suite that compares them and prints a report
//!
//! # Usage
//!
//! ```bash
//! cargo run -- check --platform wormhole
//! cargo run -- read --blocks 50 --block-bytes 512 --trids 2
//! ```

pub mod scenarios;
pub mod suite;

pub use scenarios::{
    run_multicast, run_read_pipeline, run_write_stream, MulticastReport, ReadPipeline, ThroughputReport,
};
pub use suite::{CheckOutcome, ScenarioSuite, SuiteResult};
