//! Agent Wallet Fleet Library
//!
//! Policy-gated custody wallets for autonomous agents, with an append-only
//! audit trail and a registry coordinating many independent wallets.

pub mod agent;
pub mod config;
pub mod error;
pub mod fleet;
pub mod telemetry;
pub mod wallet;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use agent::{Agent, AgentDecision, DecisionSource, Observation, ScriptedSource};
pub use config::FleetConfig;
pub use error::{Error, Result};
pub use fleet::{FleetRegistry, FleetSettings, FleetSummary, FundingReport};
pub use wallet::{
    AdminOverride, AgentProfile, AgentRole, AgentWallet, Decision, PolicyEngine, SpendingPolicy,
    TransferIntent, TransferOutcome,
};
