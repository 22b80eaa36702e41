//! Agent runner
//!
//! An agent pairs a wallet with a decision source. Each tick the agent
//! observes its wallet, asks the source what to do, and hands any transfer
//! to the wallet's normal lifecycle. Decisions are validated, never trusted:
//! the runner has no path to the admin bypass.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::wallet::lifecycle::AgentWallet;
use crate::wallet::types::{AgentRole, TransactionRecord, TransferIntent};

/// What a decision source sees about its own wallet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub agent_id: String,
    pub role: AgentRole,
    pub public_id: Pubkey,
    pub balance_lamports: u64,
    pub daily_remaining_lamports: u64,
    pub is_active: bool,
    pub tick: u64,
    pub observed_at: DateTime<Utc>,
}

/// Decision produced by a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentDecision {
    /// Transfer to an explicit address
    Transfer(TransferIntent),

    /// Pay one of the peers passed to `act`
    PayPeer {
        peer_index: usize,
        amount_lamports: u64,
        reasoning: Option<String>,
    },

    /// Do nothing this tick
    Hold { reasoning: Option<String> },
}

impl AgentDecision {
    pub fn hold(reasoning: impl Into<String>) -> Self {
        Self::Hold {
            reasoning: Some(reasoning.into()),
        }
    }
}

/// Producer of decisions (rule-based, scripted, or model-driven)
#[async_trait]
pub trait DecisionSource: Send + Sync {
    /// Name for logging
    fn name(&self) -> &str;

    async fn observe(&self, observation: &Observation) -> AgentDecision;
}

/// Replays a fixed list of decisions, then holds
pub struct ScriptedSource {
    name: String,
    script: Mutex<VecDeque<AgentDecision>>,
}

impl ScriptedSource {
    pub fn new(name: impl Into<String>, script: impl IntoIterator<Item = AgentDecision>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(script.into_iter().collect()),
        }
    }

    pub async fn remaining(&self) -> usize {
        self.script.lock().await.len()
    }
}

#[async_trait]
impl DecisionSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn observe(&self, _observation: &Observation) -> AgentDecision {
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or(AgentDecision::Hold {
                reasoning: Some("script exhausted".to_string()),
            })
    }
}

/// A wallet driven by a decision source
pub struct Agent {
    wallet: Arc<AgentWallet>,
    source: Box<dyn DecisionSource>,
    ticks: u64,
}

impl Agent {
    pub fn new(wallet: Arc<AgentWallet>, source: Box<dyn DecisionSource>) -> Self {
        Self {
            wallet,
            source,
            ticks: 0,
        }
    }

    pub fn wallet(&self) -> &Arc<AgentWallet> {
        &self.wallet
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Snapshot the wallet for the decision source
    pub async fn observe(&self) -> Observation {
        let state = self.wallet.state().await;
        Observation {
            agent_id: self.wallet.agent_id().to_string(),
            role: self.wallet.role().clone(),
            public_id: self.wallet.public_id(),
            balance_lamports: state.balance_lamports,
            daily_remaining_lamports: state.remaining_daily_allowance(),
            is_active: state.is_active,
            tick: self.ticks,
            observed_at: Utc::now(),
        }
    }

    /// Carry out a decision through the wallet's policy-gated lifecycle
    ///
    /// Returns the audit record of the attempt, or `None` when nothing was
    /// attempted.
    pub async fn act(
        &self,
        decision: AgentDecision,
        peers: &[Pubkey],
    ) -> Option<TransactionRecord> {
        let intent = match decision {
            AgentDecision::Transfer(intent) => intent,
            AgentDecision::PayPeer {
                peer_index,
                amount_lamports,
                reasoning,
            } => {
                let Some(target) = peers.get(peer_index) else {
                    warn!(
                        agent = %self.wallet.agent_id(),
                        peer_index,
                        peers = peers.len(),
                        "Decision names unknown peer, ignoring"
                    );
                    return None;
                };
                TransferIntent {
                    amount_lamports,
                    target: *target,
                    reasoning,
                }
            }
            AgentDecision::Hold { reasoning } => {
                debug!(
                    agent = %self.wallet.agent_id(),
                    reasoning = reasoning.as_deref().unwrap_or(""),
                    "Holding"
                );
                return None;
            }
        };

        let outcome = self.wallet.transfer(intent).await;
        Some(outcome.record)
    }

    /// One observe, decide, act cycle
    pub async fn tick(&mut self, peers: &[Pubkey]) -> Option<TransactionRecord> {
        let observation = self.observe().await;
        let decision = self.source.observe(&observation).await;
        self.ticks += 1;

        info!(
            agent = %observation.agent_id,
            source = self.source.name(),
            tick = observation.tick,
            "Decision received"
        );
        self.act(decision, peers).await
    }
}
