//! Mutable per-wallet state
//!
//! Balance, daily spend quota, audit history and the active flag.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use super::types::{SpendingPolicy, TransactionRecord};

/// Start of the UTC calendar day following `now`
///
/// The daily quota is a fixed calendar-day window: it resets at 00:00 UTC,
/// not 24 hours after the last spend.
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .succ_opt()
        .unwrap_or(NaiveDate::MAX)
        .and_time(NaiveTime::MIN)
        .and_utc()
}

/// Wallet state record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletState {
    /// Public address of the wallet
    pub public_id: Pubkey,

    /// Last balance observed on the ledger
    pub balance_lamports: u64,

    /// Successful spend within the current UTC day
    pub daily_spent_lamports: u64,

    /// When `daily_spent_lamports` next returns to zero
    pub daily_spent_reset_at: DateTime<Utc>,

    /// Audit history, oldest first
    transaction_history: Vec<TransactionRecord>,

    /// Paused wallets block every policy-checked transfer
    pub is_active: bool,

    /// Policy currently in force
    pub policy: SpendingPolicy,
}

impl WalletState {
    /// Fresh state: zero balance, active, quota window ending at next UTC midnight
    pub fn new(public_id: Pubkey, policy: SpendingPolicy, now: DateTime<Utc>) -> Self {
        Self {
            public_id,
            balance_lamports: 0,
            daily_spent_lamports: 0,
            daily_spent_reset_at: next_utc_midnight(now),
            transaction_history: Vec::new(),
            is_active: true,
            policy,
        }
    }

    /// Zero the daily counter if `now` has crossed the reset boundary
    ///
    /// Returns true when a reset happened.
    pub fn roll_daily_window(&mut self, now: DateTime<Utc>) -> bool {
        if now < self.daily_spent_reset_at {
            return false;
        }

        debug!(
            wallet = %self.public_id,
            spent = self.daily_spent_lamports,
            "Daily spend window rolled over"
        );
        self.daily_spent_lamports = 0;
        self.daily_spent_reset_at = next_utc_midnight(now);
        true
    }

    /// Count a confirmed transfer against the daily quota
    pub(crate) fn record_spend(&mut self, amount_lamports: u64) {
        self.daily_spent_lamports = self.daily_spent_lamports.saturating_add(amount_lamports);
    }

    /// Append an audit record
    pub(crate) fn append(&mut self, record: TransactionRecord) {
        self.transaction_history.push(record);
    }

    /// Audit history, oldest first
    pub fn history(&self) -> &[TransactionRecord] {
        &self.transaction_history
    }

    /// Remaining quota for today (ignores a pending rollover)
    pub fn remaining_daily_allowance(&self) -> u64 {
        self.policy
            .daily_limit_lamports
            .saturating_sub(self.daily_spent_lamports)
    }
}
