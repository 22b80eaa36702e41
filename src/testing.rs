//! In-memory ledger for tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

use crate::error::{Error, Result};
use crate::wallet::ledger::{ChainReference, LedgerClient};
use crate::wallet::lifecycle::{AgentWallet, LifecycleSettings};
use crate::wallet::signer::KeypairSigner;
use crate::wallet::types::{AgentProfile, AgentRole, SpendingPolicy};

/// System program transfer discriminant
const SYSTEM_TRANSFER: u32 = 2;

/// One-shot rendezvous for parking a ledger call
#[derive(Default)]
pub struct Gate {
    reached: Notify,
    release: Notify,
}

impl Gate {
    /// Wait until the parked call has arrived
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    /// Let the parked call continue
    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn park(&self) {
        self.reached.notify_one();
        self.release.notified().await;
    }
}

/// Ledger double: verifies signatures, moves lamports, injects failures
#[derive(Default)]
pub struct MockLedger {
    balances: Mutex<HashMap<Pubkey, u64>>,
    failing_airdrops: Mutex<HashSet<Pubkey>>,
    fail_broadcasts: AtomicBool,
    fail_references: AtomicBool,
    fail_balance_reads: AtomicBool,
    broadcasts: AtomicUsize,
    airdrops: AtomicUsize,
    balance_gate: Mutex<Option<Arc<Gate>>>,
    broadcast_gate: Mutex<Option<Arc<Gate>>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, address: &Pubkey, lamports: u64) {
        self.balances.lock().unwrap().insert(*address, lamports);
    }

    pub fn balance_of(&self, address: &Pubkey) -> u64 {
        self.balances
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub fn fail_broadcasts(&self, fail: bool) {
        self.fail_broadcasts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_references(&self, fail: bool) {
        self.fail_references.store(fail, Ordering::SeqCst);
    }

    pub fn fail_balance_reads(&self, fail: bool) {
        self.fail_balance_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_airdrops_for(&self, address: &Pubkey) {
        self.failing_airdrops.lock().unwrap().insert(*address);
    }

    /// Park the next balance read after it has read the balance
    pub fn park_next_balance_read(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.balance_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Park the next broadcast before it reaches the ledger
    pub fn park_next_broadcast(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.broadcast_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }

    pub fn airdrop_count(&self) -> usize {
        self.airdrops.load(Ordering::SeqCst)
    }

    fn apply_transfer(&self, transaction: &Transaction) -> Result<()> {
        let message = &transaction.message;
        let instruction = message
            .instructions
            .first()
            .ok_or_else(|| Error::TransactionSend("empty transaction".to_string()))?;

        let data = &instruction.data;
        if data.len() != 12 || u32::from_le_bytes([data[0], data[1], data[2], data[3]]) != SYSTEM_TRANSFER
        {
            return Err(Error::TransactionSend("not a system transfer".to_string()));
        }
        let mut amount = [0u8; 8];
        amount.copy_from_slice(&data[4..12]);
        let lamports = u64::from_le_bytes(amount);

        let from = message.account_keys[instruction.accounts[0] as usize];
        let to = message.account_keys[instruction.accounts[1] as usize];

        let mut balances = self.balances.lock().unwrap();
        let available = balances.get(&from).copied().unwrap_or(0);
        if available < lamports {
            return Err(Error::TransactionSend(
                "insufficient lamports on ledger".to_string(),
            ));
        }
        balances.insert(from, available - lamports);
        *balances.entry(to).or_insert(0) += lamports;
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64> {
        if self.fail_balance_reads.load(Ordering::SeqCst) {
            return Err(Error::Rpc("simulated balance read failure".to_string()));
        }
        let balance = self.balance_of(address);
        let gate = self.balance_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.park().await;
        }
        Ok(balance)
    }

    async fn get_recent_reference(&self) -> Result<ChainReference> {
        if self.fail_references.load(Ordering::SeqCst) {
            return Err(Error::Rpc("simulated blockhash failure".to_string()));
        }
        Ok(ChainReference {
            blockhash: Hash::new_unique(),
            last_valid_block_height: 1_000,
        })
    }

    async fn broadcast_and_confirm(&self, transaction: &Transaction) -> Result<Signature> {
        let gate = self.broadcast_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.park().await;
        }
        // Give concurrent callers a chance to interleave
        tokio::task::yield_now().await;

        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        if self.fail_broadcasts.load(Ordering::SeqCst) {
            return Err(Error::TransactionSend(
                "simulated broadcast failure".to_string(),
            ));
        }

        transaction
            .verify()
            .map_err(|e| Error::TransactionSend(format!("bad signature: {}", e)))?;
        self.apply_transfer(transaction)?;

        Ok(transaction.signatures[0])
    }

    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> Result<Signature> {
        self.airdrops.fetch_add(1, Ordering::SeqCst);
        if self.failing_airdrops.lock().unwrap().contains(address) {
            return Err(Error::Funding("simulated faucet rejection".to_string()));
        }
        *self.balances.lock().unwrap().entry(*address).or_insert(0) += lamports;
        Ok(Signature::new_unique())
    }
}

/// Wallet on the mock ledger with a starting balance already refreshed
pub async fn funded_wallet(
    ledger: &Arc<MockLedger>,
    agent_id: &str,
    policy: SpendingPolicy,
    lamports: u64,
) -> AgentWallet {
    let wallet = AgentWallet::create(
        agent_id,
        AgentProfile::new(agent_id, AgentRole::Trader),
        policy,
        Arc::new(KeypairSigner::new()),
        ledger.clone(),
        LifecycleSettings::default(),
    )
    .unwrap();

    ledger.set_balance(&wallet.public_id(), lamports);
    wallet.refresh_balance().await.unwrap();
    wallet
}
