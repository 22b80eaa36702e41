//! Fleet-level aggregates

use serde::Serialize;

/// Derived fleet aggregate, computed on demand
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetSummary {
    pub agent_count: usize,
    pub active_count: usize,
    pub total_balance_lamports: u64,
    pub total_transactions: usize,
    pub successful_transactions: usize,
    /// successes / total, exactly 0.0 when there are no transactions
    pub success_rate: f64,
}

impl FleetSummary {
    pub(crate) fn from_counts(
        agent_count: usize,
        active_count: usize,
        total_balance_lamports: u64,
        total_transactions: usize,
        successful_transactions: usize,
    ) -> Self {
        Self {
            agent_count,
            active_count,
            total_balance_lamports,
            total_transactions,
            successful_transactions,
            success_rate: success_rate(successful_transactions, total_transactions),
        }
    }
}

/// successes / total, 0.0 for an empty history
pub fn success_rate(successes: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    successes as f64 / total as f64
}

/// Result of a bulk funding pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FundingReport {
    /// Agents funded successfully
    pub funded: Vec<String>,

    /// Agents whose funding failed, with the error text
    pub failed: Vec<(String, String)>,
}

impl FundingReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_empty_is_zero() {
        let rate = success_rate(0, 0);
        assert_eq!(rate, 0.0);
        assert!(!rate.is_nan());
    }

    #[test]
    fn test_success_rate() {
        assert_eq!(success_rate(3, 4), 0.75);
        assert_eq!(success_rate(0, 5), 0.0);
    }

    #[test]
    fn test_funding_report_completeness() {
        let mut report = FundingReport::default();
        report.funded.push("a".into());
        assert!(report.is_complete());
        report.failed.push(("b".into(), "faucet down".into()));
        assert!(!report.is_complete());
    }
}
