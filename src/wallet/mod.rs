//! Wallet module
//!
//! Policy-gated custody wallet for a single agent:
//! - Spending policy enforcement (limits, whitelist, approval escalation)
//! - Transfer lifecycle (validate, sign, broadcast, record)
//! - Append-only audit trail
//! - Encrypted export
//!
//! # Architecture
//!
//! ```text
//! TransferIntent → AgentWallet ─→ PolicyEngine
//!                      │
//!                      ├─→ SigningProvider
//!                      └─→ LedgerClient
//! ```
//!
//! # Security
//!
//! Decision sources are validated, never trusted:
//! - Cannot exceed per-transfer or daily limits
//! - Cannot send to addresses outside a configured whitelist
//! - Cannot execute escalated transfers without approval
//! - Cannot reach the admin bypass

pub mod export;
pub mod ledger;
pub mod lifecycle;
pub mod policy;
pub mod signer;
pub mod state;
pub mod types;

pub use export::ExportEnvelope;
pub use ledger::{ChainReference, LedgerClient, RpcLedgerClient};
pub use lifecycle::{
    load_audit_log, AdminOverride, AgentWallet, LifecycleSettings, PendingApproval,
    TransferOutcome, TransferState,
};
pub use policy::{Decision, PolicyEngine, PolicyViolation};
pub use signer::{KeypairSigner, SecretMaterial, SigningProvider};
pub use state::WalletState;
pub use types::{
    lamports_to_sol, sol_to_lamports, AgentProfile, AgentRole, InitiatedBy, PolicyUpdate,
    SpendingPolicy, TransactionRecord, TransactionStatus, TransferIntent, WalletMetadata,
    LAMPORTS_PER_SOL,
};
