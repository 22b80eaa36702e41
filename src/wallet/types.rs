//! Core types for agent wallets
//!
//! Defines spending policies, wallet metadata, transfer intents and the
//! audit records produced for every transfer attempt.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

/// Lamports per SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Convert SOL to lamports, rounding to the nearest lamport
pub fn sol_to_lamports(sol: f64) -> u64 {
    if sol <= 0.0 {
        return 0;
    }
    (sol * LAMPORTS_PER_SOL as f64).round() as u64
}

/// Convert lamports to SOL
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// Role tag of the agent that owns a wallet
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Executes trades against counterparties
    Trader,

    /// Provides liquidity to peers
    LiquidityProvider,

    /// Holds and redistributes fleet reserves
    Treasury,

    /// Anything else, named by the caller
    Custom(String),
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRole::Trader => write!(f, "trader"),
            AgentRole::LiquidityProvider => write!(f, "liquidity_provider"),
            AgentRole::Treasury => write!(f, "treasury"),
            AgentRole::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Declarative limits gating a wallet's transfers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingPolicy {
    /// Largest single transfer allowed
    pub max_transaction_lamports: u64,

    /// Cap on the sum of successful transfers within one UTC day
    pub daily_limit_lamports: u64,

    /// Allowed destinations; `None` means any destination
    #[serde(default)]
    pub whitelist: Option<HashSet<Pubkey>>,

    /// Escalate transfers at or above the threshold for approval
    pub requires_approval: bool,

    /// Transfers at or above this amount need approval (when enabled)
    pub approval_threshold_lamports: u64,
}

impl Default for SpendingPolicy {
    fn default() -> Self {
        Self {
            max_transaction_lamports: LAMPORTS_PER_SOL,
            daily_limit_lamports: 5 * LAMPORTS_PER_SOL,
            whitelist: None,
            requires_approval: true,
            approval_threshold_lamports: LAMPORTS_PER_SOL / 2,
        }
    }
}

impl SpendingPolicy {
    /// Merge the fields present in `update` over this policy
    pub fn apply(&mut self, update: PolicyUpdate) {
        if let Some(max) = update.max_transaction_lamports {
            self.max_transaction_lamports = max;
        }
        if let Some(daily) = update.daily_limit_lamports {
            self.daily_limit_lamports = daily;
        }
        if let Some(whitelist) = update.whitelist {
            self.whitelist = whitelist;
        }
        if let Some(requires) = update.requires_approval {
            self.requires_approval = requires;
        }
        if let Some(threshold) = update.approval_threshold_lamports {
            self.approval_threshold_lamports = threshold;
        }
    }

    /// Check whether a destination passes the whitelist (if any)
    pub fn permits_target(&self, target: &Pubkey) -> bool {
        self.whitelist
            .as_ref()
            .map(|list| list.contains(target))
            .unwrap_or(true)
    }
}

/// Partial policy update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyUpdate {
    pub max_transaction_lamports: Option<u64>,
    pub daily_limit_lamports: Option<u64>,
    /// `Some(None)` clears the whitelist
    pub whitelist: Option<Option<HashSet<Pubkey>>>,
    pub requires_approval: Option<bool>,
    pub approval_threshold_lamports: Option<u64>,
}

/// Caller-supplied identity of a new agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProfile {
    /// Human-readable name: "Market Maker 1"
    pub name: String,

    /// Role tag
    pub role: AgentRole,
}

impl AgentProfile {
    pub fn new(name: impl Into<String>, role: AgentRole) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }
}

/// Wallet metadata snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletMetadata {
    /// Unique within a registry: "trader-1"
    pub agent_id: String,

    /// Human-readable name
    pub name: String,

    /// Role tag
    pub role: AgentRole,

    /// When the wallet was created
    pub created_at: DateTime<Utc>,

    /// Policy currently in force
    pub policy: SpendingPolicy,
}

/// A requested transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferIntent {
    /// Amount in lamports
    pub amount_lamports: u64,

    /// Destination address
    pub target: Pubkey,

    /// Free-text reasoning from the decision source
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl TransferIntent {
    pub fn new(amount_lamports: u64, target: Pubkey) -> Self {
        Self {
            amount_lamports,
            target,
            reasoning: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// Outcome status of one transfer attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Success,
    Failed,
    Blocked,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Success => write!(f, "success"),
            TransactionStatus::Failed => write!(f, "failed"),
            TransactionStatus::Blocked => write!(f, "blocked"),
        }
    }
}

/// Who initiated a transfer attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InitiatedBy {
    /// The owning agent's decision source
    Agent,

    /// Release of a previously queued approval request
    Approval {
        /// Approval request ID
        approval_id: String,
    },

    /// Internal maintenance flow bypassing policy
    Admin {
        /// Why the bypass was used
        reason: String,
    },
}

impl std::fmt::Display for InitiatedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitiatedBy::Agent => write!(f, "agent"),
            InitiatedBy::Approval { approval_id } => write!(f, "approval: {}", approval_id),
            InitiatedBy::Admin { reason } => write!(f, "admin: {}", reason),
        }
    }
}

/// Audit record for one transfer attempt
///
/// Fields are read-only once constructed; the wallet only ever appends these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    id: String,
    signature: Option<String>,
    from: String,
    to: String,
    amount_lamports: u64,
    timestamp: DateTime<Utc>,
    status: TransactionStatus,
    reason: Option<String>,
    reasoning: Option<String>,
    initiated_by: InitiatedBy,
}

impl TransactionRecord {
    pub(crate) fn new(
        signature: Option<String>,
        from: &Pubkey,
        intent: &TransferIntent,
        timestamp: DateTime<Utc>,
        status: TransactionStatus,
        reason: Option<String>,
        initiated_by: InitiatedBy,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            signature,
            from: from.to_string(),
            to: intent.target.to_string(),
            amount_lamports: intent.amount_lamports,
            timestamp,
            status,
            reason,
            reasoning: intent.reasoning.clone(),
            initiated_by,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Ledger signature; `None` when nothing was broadcast
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn amount_lamports(&self) -> u64 {
        self.amount_lamports
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn reasoning(&self) -> Option<&str> {
        self.reasoning.as_deref()
    }

    pub fn initiated_by(&self) -> &InitiatedBy {
        &self.initiated_by
    }

    pub fn is_success(&self) -> bool {
        self.status == TransactionStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sol_lamports_conversion() {
        assert_eq!(sol_to_lamports(1.0), 1_000_000_000);
        assert_eq!(sol_to_lamports(0.5), 500_000_000);
        assert_eq!(sol_to_lamports(0.18), 180_000_000);
        assert_eq!(sol_to_lamports(-1.0), 0);

        assert_eq!(lamports_to_sol(1_000_000_000), 1.0);
        assert_eq!(lamports_to_sol(500_000_000), 0.5);
    }

    #[test]
    fn test_policy_partial_update() {
        let mut policy = SpendingPolicy::default();
        let original = policy.clone();

        policy.apply(PolicyUpdate {
            max_transaction_lamports: Some(2 * LAMPORTS_PER_SOL),
            ..Default::default()
        });

        assert_eq!(policy.max_transaction_lamports, 2 * LAMPORTS_PER_SOL);
        assert_eq!(policy.daily_limit_lamports, original.daily_limit_lamports);
        assert_eq!(policy.requires_approval, original.requires_approval);
        assert_eq!(
            policy.approval_threshold_lamports,
            original.approval_threshold_lamports
        );
        assert!(policy.whitelist.is_none());
    }

    #[test]
    fn test_policy_whitelist_set_and_clear() {
        let allowed = Pubkey::new_unique();
        let mut policy = SpendingPolicy::default();

        policy.apply(PolicyUpdate {
            whitelist: Some(Some(HashSet::from([allowed]))),
            ..Default::default()
        });
        assert!(policy.permits_target(&allowed));
        assert!(!policy.permits_target(&Pubkey::new_unique()));

        // Leaving the field out keeps the whitelist
        policy.apply(PolicyUpdate::default());
        assert!(policy.whitelist.is_some());

        policy.apply(PolicyUpdate {
            whitelist: Some(None),
            ..Default::default()
        });
        assert!(policy.permits_target(&Pubkey::new_unique()));
    }

    #[test]
    fn test_record_serialization() {
        let intent = TransferIntent::new(42, Pubkey::new_unique()).with_reasoning("rebalance");
        let record = TransactionRecord::new(
            None,
            &Pubkey::new_unique(),
            &intent,
            Utc::now(),
            TransactionStatus::Blocked,
            Some("wallet is deactivated".to_string()),
            InitiatedBy::Agent,
        );

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"status\":\"blocked\""));
        assert!(json.contains("\"initiated_by\":\"agent\""));

        let back: TransactionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(AgentRole::LiquidityProvider.to_string(), "liquidity_provider");
        assert_eq!(AgentRole::Custom("oracle".into()).to_string(), "oracle");
    }
}
