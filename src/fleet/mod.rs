//! Fleet coordination
//!
//! A registry of independently owned agent wallets with bulk funding,
//! refresh, pause/resume and aggregate reporting.

pub mod registry;
pub mod summary;

pub use registry::{FleetRegistry, FleetSettings};
pub use summary::{success_rate, FleetSummary, FundingReport};
