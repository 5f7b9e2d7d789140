//! Runtime statistics: poll-cycle rate and command/operation rollups.

pub mod cps;
pub mod service;

pub use cps::CpsCalculator;
pub use service::{OperationSummary, ServiceStats, StatsSummary};
