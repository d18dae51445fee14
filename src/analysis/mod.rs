//! Traffic analysis.
//!
//! The classifier and accumulators are the building blocks; the
//! aggregator drives a single pass over the events and produces the
//! snapshot.

pub mod accumulators;
pub mod aggregator;
pub mod classifier;

pub use aggregator::*;
