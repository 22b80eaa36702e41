//! Spending policy engine
//!
//! Deterministic, fail-fast validation of transfer intents. These checks
//! cannot be overridden by the decision source; only the explicit admin
//! bypass in the lifecycle skips them.

use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use super::state::WalletState;
use super::types::SpendingPolicy;

/// Policy violation types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    /// Wallet has been paused
    Deactivated,

    /// Zero-value transfer
    InvalidAmount,

    /// Transfer exceeds the last known balance
    InsufficientBalance { requested: u64, available: u64 },

    /// Single transfer exceeds the per-transaction cap
    PerTransactionLimit { amount: u64, max: u64 },

    /// Transfer would push today's spend past the daily cap
    DailyLimit { spent: u64, requested: u64, limit: u64 },

    /// Destination is not on the configured whitelist
    NotWhitelisted { target: Pubkey },
}

impl std::fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyViolation::Deactivated => write!(f, "Wallet is deactivated"),
            PolicyViolation::InvalidAmount => {
                write!(f, "Invalid amount: transfer amount must be positive")
            }
            PolicyViolation::InsufficientBalance {
                requested,
                available,
            } => {
                write!(
                    f,
                    "Insufficient balance: requested {} lamports, available {} lamports",
                    requested, available
                )
            }
            PolicyViolation::PerTransactionLimit { amount, max } => {
                write!(
                    f,
                    "Transfer {} lamports exceeds per-transaction limit {} lamports",
                    amount, max
                )
            }
            PolicyViolation::DailyLimit {
                spent,
                requested,
                limit,
            } => {
                write!(
                    f,
                    "Exceeds daily limit: {} lamports already spent + {} lamports requested > {} lamports limit",
                    spent, requested, limit
                )
            }
            PolicyViolation::NotWhitelisted { target } => {
                write!(f, "Target {} is not in whitelist", target)
            }
        }
    }
}

impl std::error::Error for PolicyViolation {}

/// Result of validating a transfer intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Transfer may execute
    Allowed,

    /// Transfer is compliant but at or above the approval threshold
    ApprovalRequired { threshold_lamports: u64 },

    /// Transfer violates the policy
    Blocked(PolicyViolation),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Decision::Blocked(_))
    }

    pub fn violation(&self) -> Option<&PolicyViolation> {
        match self {
            Decision::Blocked(violation) => Some(violation),
            _ => None,
        }
    }
}

/// Stateless policy validator
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    /// Validate a transfer against the wallet state and policy
    ///
    /// Checks run in a fixed order and the first violation wins: activity,
    /// amount, balance, per-transaction cap, daily cap, whitelist. Approval
    /// escalation is only considered for an otherwise compliant transfer.
    ///
    /// The caller must roll the daily window (`WalletState::roll_daily_window`)
    /// before calling this.
    pub fn validate(
        amount_lamports: u64,
        target: &Pubkey,
        state: &WalletState,
        policy: &SpendingPolicy,
    ) -> Decision {
        if !state.is_active {
            return Decision::Blocked(PolicyViolation::Deactivated);
        }

        if amount_lamports == 0 {
            return Decision::Blocked(PolicyViolation::InvalidAmount);
        }

        if amount_lamports > state.balance_lamports {
            return Decision::Blocked(PolicyViolation::InsufficientBalance {
                requested: amount_lamports,
                available: state.balance_lamports,
            });
        }

        if amount_lamports > policy.max_transaction_lamports {
            return Decision::Blocked(PolicyViolation::PerTransactionLimit {
                amount: amount_lamports,
                max: policy.max_transaction_lamports,
            });
        }

        let projected = state.daily_spent_lamports.saturating_add(amount_lamports);
        if projected > policy.daily_limit_lamports {
            return Decision::Blocked(PolicyViolation::DailyLimit {
                spent: state.daily_spent_lamports,
                requested: amount_lamports,
                limit: policy.daily_limit_lamports,
            });
        }

        if !policy.permits_target(target) {
            return Decision::Blocked(PolicyViolation::NotWhitelisted { target: *target });
        }

        if policy.requires_approval && amount_lamports >= policy.approval_threshold_lamports {
            return Decision::ApprovalRequired {
                threshold_lamports: policy.approval_threshold_lamports,
            };
        }

        debug!(
            wallet = %state.public_id,
            amount = amount_lamports,
            target = %target,
            "Transfer validated"
        );

        Decision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::types::{sol_to_lamports, LAMPORTS_PER_SOL};
    use chrono::Utc;
    use std::collections::HashSet;

    fn test_policy() -> SpendingPolicy {
        SpendingPolicy {
            max_transaction_lamports: sol_to_lamports(0.05),
            daily_limit_lamports: sol_to_lamports(0.2),
            whitelist: None,
            requires_approval: true,
            approval_threshold_lamports: sol_to_lamports(0.5),
        }
    }

    fn funded_state(balance_sol: f64) -> WalletState {
        let mut state = WalletState::new(Pubkey::new_unique(), test_policy(), Utc::now());
        state.balance_lamports = sol_to_lamports(balance_sol);
        state
    }

    fn check(amount: u64, state: &WalletState) -> Decision {
        PolicyEngine::validate(amount, &Pubkey::new_unique(), state, &state.policy)
    }

    #[test]
    fn test_valid_transfer() {
        let state = funded_state(1.0);
        assert_eq!(check(sol_to_lamports(0.02), &state), Decision::Allowed);
    }

    #[test]
    fn test_deactivated_wins_over_everything() {
        let mut state = funded_state(0.0);
        state.is_active = false;

        // Zero amount, no balance: still reported as deactivated first
        assert_eq!(
            check(0, &state),
            Decision::Blocked(PolicyViolation::Deactivated)
        );
    }

    #[test]
    fn test_zero_amount_is_invalid() {
        let state = funded_state(1.0);
        let decision = check(0, &state);
        assert_eq!(decision, Decision::Blocked(PolicyViolation::InvalidAmount));
        assert!(decision
            .violation()
            .unwrap()
            .to_string()
            .to_lowercase()
            .contains("invalid amount"));
    }

    #[test]
    fn test_insufficient_balance_reports_both_values() {
        let state = funded_state(0.01);
        let decision = check(sol_to_lamports(0.02), &state);

        let message = decision.violation().unwrap().to_string();
        assert!(message.to_lowercase().contains("insufficient balance"));
        assert!(message.contains("20000000"));
        assert!(message.contains("10000000"));
    }

    #[test]
    fn test_per_transaction_limit_regardless_of_daily_state() {
        for spent_sol in [0.0, 0.1, 0.2] {
            let mut state = funded_state(10.0);
            state.record_spend(sol_to_lamports(spent_sol));

            for amount_sol in [0.051, 0.1, 3.0] {
                let decision = check(sol_to_lamports(amount_sol), &state);
                assert!(
                    matches!(
                        decision,
                        Decision::Blocked(PolicyViolation::PerTransactionLimit { .. })
                    ),
                    "amount {} spent {} gave {:?}",
                    amount_sol,
                    spent_sol,
                    decision
                );
                assert!(decision
                    .violation()
                    .unwrap()
                    .to_string()
                    .contains("per-transaction limit"));
            }
        }
    }

    #[test]
    fn test_daily_limit_boundary() {
        let mut state = funded_state(1.0);
        let limit = state.policy.daily_limit_lamports;
        let spent = sol_to_lamports(0.18);
        state.record_spend(spent);

        assert_eq!(check(limit - spent, &state), Decision::Allowed);

        let decision = check(limit - spent + 1, &state);
        assert!(matches!(
            decision,
            Decision::Blocked(PolicyViolation::DailyLimit { .. })
        ));
        let message = decision.violation().unwrap().to_string();
        assert!(message.contains("daily limit"));
        assert!(message.contains(&spent.to_string()));
    }

    #[test]
    fn test_whitelist_blocks_unknown_targets_at_any_amount() {
        let allowed = Pubkey::new_unique();
        let mut state = funded_state(1.0);
        state.policy.whitelist = Some(HashSet::from([allowed]));

        for amount in [1, sol_to_lamports(0.01), sol_to_lamports(0.05)] {
            let decision =
                PolicyEngine::validate(amount, &Pubkey::new_unique(), &state, &state.policy);
            assert!(matches!(
                decision,
                Decision::Blocked(PolicyViolation::NotWhitelisted { .. })
            ));
            assert!(decision.violation().unwrap().to_string().contains("whitelist"));
        }

        let decision = PolicyEngine::validate(1, &allowed, &state, &state.policy);
        assert_eq!(decision, Decision::Allowed);
    }

    #[test]
    fn test_check_order_balance_before_limits() {
        // Over balance AND over the per-transaction cap: balance is reported
        let state = funded_state(0.01);
        assert!(matches!(
            check(sol_to_lamports(1.0), &state),
            Decision::Blocked(PolicyViolation::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_approval_required_at_threshold() {
        let mut state = funded_state(3.0);
        state.policy.max_transaction_lamports = 2 * LAMPORTS_PER_SOL;
        state.policy.daily_limit_lamports = 10 * LAMPORTS_PER_SOL;

        let threshold = state.policy.approval_threshold_lamports;
        assert!(matches!(
            check(threshold, &state),
            Decision::ApprovalRequired { .. }
        ));
        assert_eq!(check(threshold - 1, &state), Decision::Allowed);

        state.policy.requires_approval = false;
        assert_eq!(check(threshold, &state), Decision::Allowed);
    }

    #[test]
    fn test_approval_not_considered_when_blocked() {
        let mut state = funded_state(3.0);
        state.policy.max_transaction_lamports = 2 * LAMPORTS_PER_SOL;
        // Daily cap of 0.2 still applies
        assert!(matches!(
            check(sol_to_lamports(0.6), &state),
            Decision::Blocked(PolicyViolation::DailyLimit { .. })
        ));
    }

    #[test]
    fn test_reference_scenario() {
        let mut state = funded_state(1.0);

        assert_eq!(check(sol_to_lamports(0.02), &state), Decision::Allowed);
        assert!(matches!(
            check(sol_to_lamports(0.1), &state),
            Decision::Blocked(PolicyViolation::PerTransactionLimit { .. })
        ));

        state.record_spend(sol_to_lamports(0.05));
        state.record_spend(sol_to_lamports(0.05));
        state.record_spend(sol_to_lamports(0.05));
        state.record_spend(sol_to_lamports(0.03));
        assert!(matches!(
            check(sol_to_lamports(0.04), &state),
            Decision::Blocked(PolicyViolation::DailyLimit { .. })
        ));

        let mut fresh = funded_state(3.0);
        fresh.policy.max_transaction_lamports = sol_to_lamports(2.0);
        fresh.policy.daily_limit_lamports = sol_to_lamports(5.0);
        assert!(matches!(
            check(sol_to_lamports(0.6), &fresh),
            Decision::ApprovalRequired { .. }
        ));
    }
}
