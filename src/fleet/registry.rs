//! Fleet registry
//!
//! Owns every agent wallet in the fleet, keyed by agent ID. Wallets are
//! independent: no lock spans more than one wallet, and bulk operations take
//! a snapshot of the wallet handles before doing any I/O.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::wallet::export::{self, ExportEnvelope};
use crate::wallet::ledger::LedgerClient;
use crate::wallet::lifecycle::{AgentWallet, LifecycleSettings};
use crate::wallet::signer::SigningProvider;
use crate::wallet::types::{AgentProfile, SpendingPolicy};

use super::summary::{FleetSummary, FundingReport};

/// Fleet registry settings
#[derive(Debug, Clone)]
pub struct FleetSettings {
    /// Pause between consecutive funding requests (faucet rate limit)
    pub funding_delay: Duration,

    /// Settings handed to every wallet
    pub lifecycle: LifecycleSettings,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            funding_delay: Duration::from_millis(1500),
            lifecycle: LifecycleSettings::default(),
        }
    }
}

/// Registry of agent wallets
pub struct FleetRegistry {
    wallets: DashMap<String, Arc<AgentWallet>>,
    signer: Arc<dyn SigningProvider>,
    ledger: Arc<dyn LedgerClient>,
    settings: FleetSettings,
}

impl FleetRegistry {
    /// Create an empty registry
    pub fn new(
        signer: Arc<dyn SigningProvider>,
        ledger: Arc<dyn LedgerClient>,
        settings: FleetSettings,
    ) -> Self {
        Self {
            wallets: DashMap::new(),
            signer,
            ledger,
            settings,
        }
    }

    /// Create a wallet for a new agent
    ///
    /// Fails with `DuplicateAgent` if the ID is taken; an existing wallet is
    /// never replaced.
    pub fn create(
        &self,
        agent_id: &str,
        profile: AgentProfile,
        policy: SpendingPolicy,
    ) -> Result<Arc<AgentWallet>> {
        match self.wallets.entry(agent_id.to_string()) {
            Entry::Occupied(_) => Err(Error::DuplicateAgent(agent_id.to_string())),
            Entry::Vacant(slot) => {
                let wallet = Arc::new(AgentWallet::create(
                    agent_id,
                    profile,
                    policy,
                    self.signer.clone(),
                    self.ledger.clone(),
                    self.settings.lifecycle.clone(),
                )?);
                slot.insert(wallet.clone());
                Ok(wallet)
            }
        }
    }

    /// Look up an agent's wallet
    pub fn get(&self, agent_id: &str) -> Result<Arc<AgentWallet>> {
        self.wallets
            .get(agent_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::UnknownAgent(agent_id.to_string()))
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.wallets.contains_key(agent_id)
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Registered agent IDs, sorted
    pub fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.wallets.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Snapshot of all wallet handles, sorted by agent ID
    pub fn wallets(&self) -> Vec<Arc<AgentWallet>> {
        let mut wallets: Vec<Arc<AgentWallet>> =
            self.wallets.iter().map(|e| e.value().clone()).collect();
        wallets.sort_by(|a, b| a.agent_id().cmp(b.agent_id()));
        wallets
    }

    /// Fund every wallet, one at a time
    ///
    /// Waits `funding_delay` between requests. A failure is logged and the
    /// pass continues with the next agent.
    pub async fn fund_all(&self, lamports: u64) -> FundingReport {
        let mut report = FundingReport::default();

        for (i, wallet) in self.wallets().into_iter().enumerate() {
            if i > 0 && !self.settings.funding_delay.is_zero() {
                tokio::time::sleep(self.settings.funding_delay).await;
            }

            let agent_id = wallet.agent_id().to_string();
            match self
                .ledger
                .request_airdrop(&wallet.public_id(), lamports)
                .await
            {
                Ok(signature) => {
                    info!(agent = %agent_id, lamports, %signature, "Wallet funded");
                    if let Err(e) = wallet.refresh_balance().await {
                        warn!(agent = %agent_id, error = %e, "Balance refresh after funding failed");
                    }
                    report.funded.push(agent_id);
                }
                Err(e) => {
                    warn!(agent = %agent_id, error = %e, "Funding failed, continuing");
                    report.failed.push((agent_id, e.to_string()));
                }
            }
        }

        info!(
            funded = report.funded.len(),
            failed = report.failed.len(),
            "Funding pass complete"
        );
        report
    }

    /// Refresh every balance concurrently
    pub async fn refresh_all(&self) -> Vec<(String, Result<u64>)> {
        let wallets = self.wallets();
        let refreshes = wallets.iter().map(|wallet| async move {
            (wallet.agent_id().to_string(), wallet.refresh_balance().await)
        });

        let results = join_all(refreshes).await;
        for (agent_id, result) in &results {
            if let Err(e) = result {
                warn!(agent = %agent_id, error = %e, "Balance refresh failed");
            }
        }
        results
    }

    /// Deactivate every wallet
    ///
    /// Does not wait for in-flight transfers, so a wallet stuck in a
    /// broadcast never delays pausing the others. Not atomic across wallets:
    /// if interrupted part-way the fleet is left partially paused, which errs
    /// toward restriction.
    pub async fn pause_all(&self) -> usize {
        let wallets = self.wallets();
        for wallet in &wallets {
            wallet.deactivate().await;
        }
        warn!(count = wallets.len(), "Fleet paused");
        wallets.len()
    }

    /// Reactivate every wallet
    ///
    /// Not atomic across wallets. Unlike `pause_all`, an interrupted resume
    /// leaves some wallets spending while the operator may believe the fleet
    /// is still paused; check `summary().active_count` afterwards.
    pub async fn resume_all(&self) -> usize {
        let wallets = self.wallets();
        for wallet in &wallets {
            wallet.reactivate().await;
        }
        info!(count = wallets.len(), "Fleet resumed");
        wallets.len()
    }

    /// Aggregate view of the fleet
    pub async fn summary(&self) -> FleetSummary {
        let wallets = self.wallets();
        let mut active_count = 0;
        let mut total_balance: u64 = 0;
        let mut total_transactions = 0;
        let mut successful = 0;

        for wallet in &wallets {
            let state = wallet.state().await;
            if state.is_active {
                active_count += 1;
            }
            total_balance = total_balance.saturating_add(state.balance_lamports);
            total_transactions += state.history().len();
            successful += state.history().iter().filter(|r| r.is_success()).count();
        }

        FleetSummary::from_counts(
            wallets.len(),
            active_count,
            total_balance,
            total_transactions,
            successful,
        )
    }

    /// Export an agent's signing identity under a passphrase
    pub fn export_wallet(&self, agent_id: &str, passphrase: &str) -> Result<ExportEnvelope> {
        let wallet = self.get(agent_id)?;
        let envelope = export::seal(
            agent_id,
            &wallet.public_id(),
            &wallet.export_secret(),
            passphrase,
        )?;
        info!(agent = %agent_id, "Wallet exported");
        Ok(envelope)
    }

    /// Recreate a wallet from an export envelope
    ///
    /// The wallet is registered under the envelope's agent ID, with fresh
    /// state (audit history is not part of the export).
    pub async fn import_wallet(
        &self,
        envelope: &ExportEnvelope,
        passphrase: &str,
        profile: AgentProfile,
        policy: SpendingPolicy,
    ) -> Result<Arc<AgentWallet>> {
        let encoded = export::open(envelope, passphrase)?;
        let (public_id, secret) = self
            .signer
            .restore_identity(&encoded)
            .map_err(|e| Error::Decryption(format!("Invalid secret in envelope: {}", e)))?;

        if public_id.to_string() != envelope.public_id {
            return Err(Error::Decryption(
                "Decrypted identity does not match envelope public id".to_string(),
            ));
        }

        let wallet = match self.wallets.entry(envelope.agent_id.clone()) {
            Entry::Occupied(_) => return Err(Error::DuplicateAgent(envelope.agent_id.clone())),
            Entry::Vacant(slot) => {
                let wallet = Arc::new(AgentWallet::from_identity(
                    envelope.agent_id.clone(),
                    profile,
                    policy,
                    public_id,
                    secret,
                    self.signer.clone(),
                    self.ledger.clone(),
                    self.settings.lifecycle.clone(),
                ));
                slot.insert(wallet.clone());
                wallet
            }
        };

        if let Err(e) = wallet.refresh_balance().await {
            warn!(agent = %envelope.agent_id, error = %e, "Balance refresh after import failed");
        }
        debug!(agent = %envelope.agent_id, address = %public_id, "Wallet imported");
        Ok(wallet)
    }
}
