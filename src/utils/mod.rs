//! Utility modules: error taxonomy, logging setup, scalar metrics sink.

pub mod error;
pub mod logging;
pub mod metrics;
