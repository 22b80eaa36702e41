//! Agent wallet and transfer lifecycle
//!
//! Intent → Validating → {Blocked, ApprovalRequired, Executing} → {Success, Failed}
//!
//! Every call to `transfer`, `admin_transfer` or `approve_pending` appends
//! exactly one `TransactionRecord`, whatever the outcome.
//!
//! # Concurrency
//!
//! The wallet state sits behind an async mutex that is held for the whole
//! attempt, including the ledger round-trips. Two transfers on the same
//! wallet are therefore serialized and cannot both pass the balance check on
//! the same stale read. Balance refreshes take the same lock before reading
//! the ledger. Different wallets never share a lock.
//!
//! The active flag lives outside that mutex so a pause never waits behind an
//! in-flight broadcast. It is copied into the state at every validation.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

use super::ledger::LedgerClient;
use super::policy::{Decision, PolicyEngine};
use super::signer::{SecretMaterial, SigningProvider};
use super::state::WalletState;
use super::types::{
    AgentProfile, AgentRole, InitiatedBy, PolicyUpdate, SpendingPolicy, TransactionRecord,
    TransactionStatus, TransferIntent, WalletMetadata,
};

/// Lifecycle tuning
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// How long a queued approval request stays actionable
    pub approval_ttl: Duration,

    /// Live approval requests allowed per wallet; escalations beyond this
    /// are blocked
    pub max_pending_approvals: usize,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            approval_ttl: Duration::from_secs(3600),
            max_pending_approvals: 64,
        }
    }
}

/// Explicit opt-in to skip policy checks
///
/// Only internal maintenance flows construct one of these; the agent runner
/// never does.
#[derive(Debug, Clone)]
pub struct AdminOverride {
    reason: String,
}

impl AdminOverride {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Transfer waiting for a human (or supervisor) decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    /// Approval request ID
    pub id: String,

    /// The escalated intent
    pub intent: TransferIntent,

    /// When the request was queued
    pub created_at: DateTime<Utc>,

    /// After this the request can no longer be approved
    pub expires_at: DateTime<Utc>,
}

impl PendingApproval {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Terminal state of one lifecycle invocation
#[derive(Debug, Clone, PartialEq)]
pub enum TransferState {
    /// Confirmed on the ledger
    Success { signature: Signature },

    /// Signing, broadcast or confirmation failed
    Failed { reason: String },

    /// Policy rejected the intent
    Blocked { reason: String },

    /// Queued for approval; nothing was broadcast
    ApprovalRequired { approval_id: String },
}

/// Result of a transfer attempt, with the audit record it produced
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub state: TransferState,
    pub record: TransactionRecord,
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.state, TransferState::Success { .. })
    }

    pub fn signature(&self) -> Option<&Signature> {
        match &self.state {
            TransferState::Success { signature } => Some(signature),
            _ => None,
        }
    }
}

/// Reason text recorded for an escalated transfer
fn approval_reason(approval_id: &str, threshold_lamports: u64) -> String {
    format!(
        "Approval required: amount at or above {} lamports threshold (pending approval {})",
        threshold_lamports, approval_id
    )
}

/// Policy-gated custody wallet owned by one agent
pub struct AgentWallet {
    agent_id: String,
    name: String,
    role: AgentRole,
    created_at: DateTime<Utc>,
    public_id: Pubkey,
    secret: SecretMaterial,
    active: AtomicBool,
    state: Mutex<WalletState>,
    pending: Mutex<Vec<PendingApproval>>,
    signer: Arc<dyn SigningProvider>,
    ledger: Arc<dyn LedgerClient>,
    settings: LifecycleSettings,
}

impl std::fmt::Debug for AgentWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentWallet")
            .field("agent_id", &self.agent_id)
            .field("role", &self.role)
            .field("public_id", &self.public_id)
            .finish_non_exhaustive()
    }
}

impl AgentWallet {
    /// Create a wallet with a freshly generated identity
    pub fn create(
        agent_id: impl Into<String>,
        profile: AgentProfile,
        policy: SpendingPolicy,
        signer: Arc<dyn SigningProvider>,
        ledger: Arc<dyn LedgerClient>,
        settings: LifecycleSettings,
    ) -> Result<Self> {
        let (public_id, secret) = signer.generate_identity()?;
        Ok(Self::from_identity(
            agent_id, profile, policy, public_id, secret, signer, ledger, settings,
        ))
    }

    /// Create a wallet around an existing identity (used by import)
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_identity(
        agent_id: impl Into<String>,
        profile: AgentProfile,
        policy: SpendingPolicy,
        public_id: Pubkey,
        secret: SecretMaterial,
        signer: Arc<dyn SigningProvider>,
        ledger: Arc<dyn LedgerClient>,
        settings: LifecycleSettings,
    ) -> Self {
        let now = Utc::now();
        let agent_id = agent_id.into();

        info!(
            agent = %agent_id,
            role = %profile.role,
            address = %public_id,
            "Wallet created"
        );

        Self {
            agent_id,
            name: profile.name,
            role: profile.role,
            created_at: now,
            public_id,
            secret,
            active: AtomicBool::new(true),
            state: Mutex::new(WalletState::new(public_id, policy, now)),
            pending: Mutex::new(Vec::new()),
            signer,
            ledger,
            settings,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn role(&self) -> &AgentRole {
        &self.role
    }

    pub fn public_id(&self) -> Pubkey {
        self.public_id
    }

    /// Metadata snapshot including the policy in force
    pub async fn metadata(&self) -> WalletMetadata {
        let state = self.state.lock().await;
        WalletMetadata {
            agent_id: self.agent_id.clone(),
            name: self.name.clone(),
            role: self.role.clone(),
            created_at: self.created_at,
            policy: state.policy.clone(),
        }
    }

    /// State snapshot
    pub async fn state(&self) -> WalletState {
        let mut snapshot = self.state.lock().await.clone();
        snapshot.is_active = self.active.load(Ordering::SeqCst);
        snapshot
    }

    /// Last known balance in lamports
    pub async fn balance(&self) -> u64 {
        self.state.lock().await.balance_lamports
    }

    pub async fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Copy of the audit history, oldest first
    ///
    /// Mutating the returned vector has no effect on the wallet.
    pub async fn audit_log(&self) -> Vec<TransactionRecord> {
        self.state.lock().await.history().to_vec()
    }

    /// Most recent records, newest first
    pub async fn recent_transactions(&self, limit: usize) -> Vec<TransactionRecord> {
        let state = self.state.lock().await;
        state.history().iter().rev().take(limit).cloned().collect()
    }

    /// Evaluate an intent without executing it
    ///
    /// Rolls the daily window first, so a stale quota is reset here.
    pub async fn validate(&self, amount_lamports: u64, target: &Pubkey) -> Decision {
        self.validate_at(amount_lamports, target, Utc::now()).await
    }

    pub(crate) async fn validate_at(
        &self,
        amount_lamports: u64,
        target: &Pubkey,
        now: DateTime<Utc>,
    ) -> Decision {
        let mut state = self.state.lock().await;
        self.prepare(&mut state, now);
        PolicyEngine::validate(amount_lamports, target, &state, &state.policy)
    }

    /// Merge a partial policy update
    pub async fn update_policy(&self, update: PolicyUpdate) -> SpendingPolicy {
        let mut state = self.state.lock().await;
        state.policy.apply(update);
        info!(agent = %self.agent_id, policy = ?state.policy, "Policy updated");
        state.policy.clone()
    }

    /// Pause the wallet; later policy-checked transfers are blocked
    ///
    /// Returns without waiting for a transfer already past validation.
    pub async fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
        warn!(agent = %self.agent_id, "Wallet deactivated");
    }

    /// Resume a paused wallet
    pub async fn reactivate(&self) {
        self.active.store(true, Ordering::SeqCst);
        info!(agent = %self.agent_id, "Wallet reactivated");
    }

    /// Pull the authoritative balance from the ledger
    ///
    /// Holds the state lock across the read so a transfer cannot land
    /// between the read and the write.
    pub async fn refresh_balance(&self) -> Result<u64> {
        let mut state = self.state.lock().await;
        let balance = self.ledger.get_balance(&self.public_id).await?;
        state.balance_lamports = balance;
        debug!(agent = %self.agent_id, balance, "Balance refreshed");
        Ok(balance)
    }

    /// Encode the secret key for export
    pub(crate) fn export_secret(&self) -> Zeroizing<String> {
        self.signer.export_secret(&self.secret)
    }

    /// Run a policy-checked transfer
    pub async fn transfer(&self, intent: TransferIntent) -> TransferOutcome {
        self.transfer_at(intent, Utc::now()).await
    }

    pub(crate) async fn transfer_at(
        &self,
        intent: TransferIntent,
        now: DateTime<Utc>,
    ) -> TransferOutcome {
        let mut state = self.state.lock().await;
        self.prepare(&mut state, now);

        info!(
            agent = %self.agent_id,
            amount = intent.amount_lamports,
            target = %intent.target,
            "Validating transfer"
        );

        match PolicyEngine::validate(intent.amount_lamports, &intent.target, &state, &state.policy)
        {
            Decision::Allowed => self.execute(&mut state, &intent, InitiatedBy::Agent).await,
            Decision::Blocked(violation) => {
                warn!(agent = %self.agent_id, %violation, "Transfer blocked");
                let reason = violation.to_string();
                let record = self.append_record(
                    &mut state,
                    &intent,
                    TransactionStatus::Blocked,
                    None,
                    Some(reason.clone()),
                    InitiatedBy::Agent,
                );
                TransferOutcome {
                    state: TransferState::Blocked { reason },
                    record,
                }
            }
            Decision::ApprovalRequired { threshold_lamports } => {
                let Some(approval_id) = self.queue_approval(&intent, now).await else {
                    let reason = format!(
                        "Approval queue full: {} requests pending",
                        self.settings.max_pending_approvals
                    );
                    warn!(agent = %self.agent_id, %reason, "Transfer blocked");
                    let record = self.append_record(
                        &mut state,
                        &intent,
                        TransactionStatus::Blocked,
                        None,
                        Some(reason.clone()),
                        InitiatedBy::Agent,
                    );
                    return TransferOutcome {
                        state: TransferState::Blocked { reason },
                        record,
                    };
                };
                warn!(
                    agent = %self.agent_id,
                    amount = intent.amount_lamports,
                    %approval_id,
                    "Transfer requires approval"
                );
                let record = self.append_record(
                    &mut state,
                    &intent,
                    TransactionStatus::Blocked,
                    None,
                    Some(approval_reason(&approval_id, threshold_lamports)),
                    InitiatedBy::Agent,
                );
                TransferOutcome {
                    state: TransferState::ApprovalRequired { approval_id },
                    record,
                }
            }
        }
    }

    /// Run a transfer without policy checks
    ///
    /// For internally controlled maintenance flows only. The transfer still
    /// counts against the daily quota and is recorded like any other.
    pub async fn admin_transfer(
        &self,
        intent: TransferIntent,
        authorization: AdminOverride,
    ) -> TransferOutcome {
        let mut state = self.state.lock().await;
        self.prepare(&mut state, Utc::now());

        warn!(
            agent = %self.agent_id,
            amount = intent.amount_lamports,
            target = %intent.target,
            reason = %authorization.reason,
            "Admin transfer bypassing policy"
        );

        self.execute(
            &mut state,
            &intent,
            InitiatedBy::Admin {
                reason: authorization.reason,
            },
        )
        .await
    }

    /// Approval requests still waiting (expired ones are dropped)
    pub async fn pending_approvals(&self) -> Vec<PendingApproval> {
        let mut pending = self.pending.lock().await;
        self.prune_expired(&mut pending, Utc::now());
        pending.clone()
    }

    /// Release a queued request and run it as a new attempt
    ///
    /// Every policy check except the approval escalation is applied again
    /// against the current state, since balance and quota may have moved.
    pub async fn approve_pending(&self, approval_id: &str) -> Result<TransferOutcome> {
        let request = self.take_pending(approval_id).await?;

        let mut state = self.state.lock().await;
        self.prepare(&mut state, Utc::now());
        let initiated_by = InitiatedBy::Approval {
            approval_id: request.id.clone(),
        };

        info!(agent = %self.agent_id, %approval_id, "Approval granted");

        let intent = request.intent;
        match PolicyEngine::validate(intent.amount_lamports, &intent.target, &state, &state.policy)
        {
            Decision::Allowed | Decision::ApprovalRequired { .. } => {
                Ok(self.execute(&mut state, &intent, initiated_by).await)
            }
            Decision::Blocked(violation) => {
                warn!(agent = %self.agent_id, %violation, "Approved transfer blocked");
                let reason = violation.to_string();
                let record = self.append_record(
                    &mut state,
                    &intent,
                    TransactionStatus::Blocked,
                    None,
                    Some(reason.clone()),
                    initiated_by,
                );
                Ok(TransferOutcome {
                    state: TransferState::Blocked { reason },
                    record,
                })
            }
        }
    }

    /// Drop a queued request without executing it
    pub async fn reject_pending(&self, approval_id: &str) -> Result<()> {
        self.take_pending(approval_id).await?;
        info!(agent = %self.agent_id, %approval_id, "Approval rejected");
        Ok(())
    }

    /// Write the audit history to a JSON file
    pub async fn save_audit_log(&self, path: impl AsRef<Path>) -> Result<()> {
        let history = self.audit_log().await;
        let json = serde_json::to_string_pretty(&history)?;
        tokio::fs::write(path.as_ref(), json).await?;
        debug!(agent = %self.agent_id, records = history.len(), "Saved audit log");
        Ok(())
    }

    /// Roll the daily window and pick up the current active flag
    fn prepare(&self, state: &mut WalletState, now: DateTime<Utc>) {
        state.roll_daily_window(now);
        state.is_active = self.active.load(Ordering::SeqCst);
    }

    fn prune_expired(&self, pending: &mut Vec<PendingApproval>, now: DateTime<Utc>) {
        let before = pending.len();
        pending.retain(|p| !p.is_expired(now));
        let lapsed = before - pending.len();
        if lapsed > 0 {
            info!(agent = %self.agent_id, lapsed, "Approval requests expired");
        }
    }

    /// Queue an escalated intent; `None` when the queue is full
    async fn queue_approval(&self, intent: &TransferIntent, now: DateTime<Utc>) -> Option<String> {
        let mut pending = self.pending.lock().await;
        self.prune_expired(&mut pending, now);
        if pending.len() >= self.settings.max_pending_approvals {
            return None;
        }

        let ttl = chrono::Duration::from_std(self.settings.approval_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let request = PendingApproval {
            id: Uuid::new_v4().to_string(),
            intent: intent.clone(),
            created_at: now,
            expires_at: now + ttl,
        };
        let id = request.id.clone();
        pending.push(request);
        Some(id)
    }

    async fn take_pending(&self, approval_id: &str) -> Result<PendingApproval> {
        let mut pending = self.pending.lock().await;
        let index = pending
            .iter()
            .position(|p| p.id == approval_id)
            .ok_or_else(|| Error::UnknownApproval(approval_id.to_string()))?;
        let request = pending.remove(index);

        if request.is_expired(Utc::now()) {
            info!(
                agent = %self.agent_id,
                %approval_id,
                expired_at = %request.expires_at,
                "Approval request lapsed before decision"
            );
            return Err(Error::ApprovalExpired(approval_id.to_string()));
        }
        Ok(request)
    }

    /// Executing → {Success, Failed}; appends the single record
    async fn execute(
        &self,
        state: &mut WalletState,
        intent: &TransferIntent,
        initiated_by: InitiatedBy,
    ) -> TransferOutcome {
        match self.sign_and_broadcast(intent).await {
            Ok(signature) => {
                state.record_spend(intent.amount_lamports);

                match self.ledger.get_balance(&self.public_id).await {
                    Ok(balance) => state.balance_lamports = balance,
                    Err(e) => {
                        warn!(
                            agent = %self.agent_id,
                            error = %e,
                            "Balance refresh after transfer failed, using local estimate"
                        );
                        state.balance_lamports =
                            state.balance_lamports.saturating_sub(intent.amount_lamports);
                    }
                }

                info!(
                    agent = %self.agent_id,
                    amount = intent.amount_lamports,
                    %signature,
                    "Transfer complete"
                );

                let record = self.append_record(
                    state,
                    intent,
                    TransactionStatus::Success,
                    Some(signature.to_string()),
                    None,
                    initiated_by,
                );
                TransferOutcome {
                    state: TransferState::Success { signature },
                    record,
                }
            }
            Err(e) => {
                warn!(agent = %self.agent_id, error = %e, "Transfer failed");
                let reason = e.to_string();
                let record = self.append_record(
                    state,
                    intent,
                    TransactionStatus::Failed,
                    None,
                    Some(reason.clone()),
                    initiated_by,
                );
                TransferOutcome {
                    state: TransferState::Failed { reason },
                    record,
                }
            }
        }
    }

    /// Reference fetch, signing, broadcast; no retries
    async fn sign_and_broadcast(&self, intent: &TransferIntent) -> Result<Signature> {
        let reference = self.ledger.get_recent_reference().await?;
        debug!(
            agent = %self.agent_id,
            blockhash = %reference.blockhash,
            expires_at_height = reference.last_valid_block_height,
            "Building transfer"
        );

        let instruction =
            system_instruction::transfer(&self.public_id, &intent.target, intent.amount_lamports);
        let message = Message::new_with_blockhash(
            &[instruction],
            Some(&self.public_id),
            &reference.blockhash,
        );

        let signature = self
            .signer
            .sign(&self.secret, &message.serialize())
            .map_err(|e| Error::TransactionBuild(format!("Failed to sign transfer: {}", e)))?;

        let transaction = Transaction {
            signatures: vec![signature],
            message,
        };

        self.ledger.broadcast_and_confirm(&transaction).await
    }

    fn append_record(
        &self,
        state: &mut WalletState,
        intent: &TransferIntent,
        status: TransactionStatus,
        signature: Option<String>,
        reason: Option<String>,
        initiated_by: InitiatedBy,
    ) -> TransactionRecord {
        let record = TransactionRecord::new(
            signature,
            &self.public_id,
            intent,
            Utc::now(),
            status,
            reason,
            initiated_by,
        );
        state.append(record.clone());
        record
    }
}

/// Read a saved audit log for inspection
pub async fn load_audit_log(path: impl AsRef<Path>) -> Result<Vec<TransactionRecord>> {
    let content = tokio::fs::read_to_string(path.as_ref()).await?;
    Ok(serde_json::from_str(&content)?)
}
