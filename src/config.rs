//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::fleet::FleetSettings;
use crate::wallet::lifecycle::LifecycleSettings;
use crate::wallet::types::{sol_to_lamports, SpendingPolicy};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub fleet: FleetSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Upper bound on broadcast + confirmation
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            timeout_ms: default_timeout_ms(),
            confirm_timeout_ms: default_confirm_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

/// Default spending policy for new wallets, in SOL
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_max_transaction_sol")]
    pub max_transaction_sol: f64,

    #[serde(default = "default_daily_limit_sol")]
    pub daily_limit_sol: f64,

    #[serde(default = "default_true")]
    pub requires_approval: bool,

    #[serde(default = "default_approval_threshold_sol")]
    pub approval_threshold_sol: f64,

    /// Allowed destinations; empty means any
    #[serde(default)]
    pub whitelist: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_transaction_sol: default_max_transaction_sol(),
            daily_limit_sol: default_daily_limit_sol(),
            requires_approval: true,
            approval_threshold_sol: default_approval_threshold_sol(),
            whitelist: vec![],
        }
    }
}

impl PolicyConfig {
    /// Convert to a lamport-denominated policy
    pub fn to_policy(&self) -> Result<SpendingPolicy> {
        let whitelist = if self.whitelist.is_empty() {
            None
        } else {
            let addresses = self
                .whitelist
                .iter()
                .map(|addr| {
                    Pubkey::from_str(addr)
                        .with_context(|| format!("Invalid whitelist address: {}", addr))
                })
                .collect::<Result<HashSet<_>>>()?;
            Some(addresses)
        };

        Ok(SpendingPolicy {
            max_transaction_lamports: sol_to_lamports(self.max_transaction_sol),
            daily_limit_lamports: sol_to_lamports(self.daily_limit_sol),
            whitelist,
            requires_approval: self.requires_approval,
            approval_threshold_lamports: sol_to_lamports(self.approval_threshold_sol),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FleetSection {
    /// Faucet amount per agent for `fund_all`
    #[serde(default = "default_funding_amount_sol")]
    pub funding_amount_sol: f64,

    /// Pause between faucet requests
    #[serde(default = "default_funding_delay_ms")]
    pub funding_delay_ms: u64,

    /// Lifetime of a pending approval
    #[serde(default = "default_approval_ttl_secs")]
    pub approval_ttl_secs: u64,

    /// Live approval requests allowed per wallet
    #[serde(default = "default_max_pending_approvals")]
    pub max_pending_approvals: usize,
}

impl Default for FleetSection {
    fn default() -> Self {
        Self {
            funding_amount_sol: default_funding_amount_sol(),
            funding_delay_ms: default_funding_delay_ms(),
            approval_ttl_secs: default_approval_ttl_secs(),
            max_pending_approvals: default_max_pending_approvals(),
        }
    }
}

impl FleetSection {
    pub fn settings(&self) -> FleetSettings {
        FleetSettings {
            funding_delay: Duration::from_millis(self.funding_delay_ms),
            lifecycle: LifecycleSettings {
                approval_ttl: Duration::from_secs(self.approval_ttl_secs),
                max_pending_approvals: self.max_pending_approvals,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_rpc_endpoint() -> String {
    "https://api.devnet.solana.com".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_confirm_timeout_ms() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    200
}

fn default_max_transaction_sol() -> f64 {
    1.0
}

fn default_daily_limit_sol() -> f64 {
    5.0
}

fn default_approval_threshold_sol() -> f64 {
    0.5
}

fn default_funding_amount_sol() -> f64 {
    1.0
}

fn default_funding_delay_ms() -> u64 {
    1500
}

fn default_approval_ttl_secs() -> u64 {
    3600
}

fn default_max_pending_approvals() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl FleetConfig {
    /// Load configuration from `.env`, file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();
        Self::load_without_dotenv(path.as_ref())
    }

    fn load_without_dotenv(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            // Start with defaults
            .set_default("rpc.endpoint", default_rpc_endpoint())?
            .set_default("rpc.timeout_ms", default_timeout_ms() as i64)?
            .set_default("rpc.max_retries", default_max_retries() as i64)?
            .set_default("logging.level", default_log_level())?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix FLEET__)
            .add_source(
                config::Environment::with_prefix("FLEET")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: FleetConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.rpc.endpoint.is_empty() {
            anyhow::bail!("rpc.endpoint must be set");
        }

        if self.rpc.confirm_timeout_ms == 0 {
            anyhow::bail!("rpc.confirm_timeout_ms must be positive");
        }

        let policy = &self.policy;
        for (name, value) in [
            ("max_transaction_sol", policy.max_transaction_sol),
            ("daily_limit_sol", policy.daily_limit_sol),
            ("approval_threshold_sol", policy.approval_threshold_sol),
        ] {
            if !value.is_finite() || value <= 0.0 {
                anyhow::bail!("policy.{} must be positive, got {}", name, value);
            }
        }

        if policy.max_transaction_sol > policy.daily_limit_sol {
            tracing::warn!(
                "policy.max_transaction_sol exceeds daily_limit_sol - the daily limit will bind first"
            );
        }

        // Validates whitelist addresses
        self.policy.to_policy()?;

        if !self.fleet.funding_amount_sol.is_finite() || self.fleet.funding_amount_sol <= 0.0 {
            anyhow::bail!("fleet.funding_amount_sol must be positive");
        }

        if self.fleet.approval_ttl_secs == 0 {
            anyhow::bail!("fleet.approval_ttl_secs must be positive");
        }

        if self.policy.requires_approval && self.fleet.max_pending_approvals == 0 {
            anyhow::bail!("fleet.max_pending_approvals must be positive when approvals are required");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    timeout: {}ms
    confirm_timeout: {}ms
    max_retries: {}
  Policy:
    max_transaction: {} SOL
    daily_limit: {} SOL
    requires_approval: {}
    approval_threshold: {} SOL
    whitelist: {}
  Fleet:
    funding_amount: {} SOL
    funding_delay: {}ms
    approval_ttl: {}s
    max_pending_approvals: {}
  Logging:
    level: {}
    json: {}
"#,
            mask_url(&self.rpc.endpoint),
            self.rpc.timeout_ms,
            self.rpc.confirm_timeout_ms,
            self.rpc.max_retries,
            self.policy.max_transaction_sol,
            self.policy.daily_limit_sol,
            self.policy.requires_approval,
            self.policy.approval_threshold_sol,
            if self.policy.whitelist.is_empty() {
                "(any)".to_string()
            } else {
                format!("{} addresses", self.policy.whitelist.len())
            },
            self.fleet.funding_amount_sol,
            self.fleet.funding_delay_ms,
            self.fleet.approval_ttl_secs,
            self.fleet.max_pending_approvals,
            self.logging.level,
            self.logging.json,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::types::LAMPORTS_PER_SOL;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = FleetConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.policy.daily_limit_sol, 5.0);
        assert_eq!(config.fleet.funding_delay_ms, 1500);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_default_policy_matches_spending_policy_default() {
        let policy = PolicyConfig::default().to_policy().unwrap();
        assert_eq!(policy, SpendingPolicy::default());
    }

    #[test]
    fn test_to_policy_converts_and_parses_whitelist() {
        let target = Pubkey::new_unique();
        let config = PolicyConfig {
            max_transaction_sol: 0.05,
            daily_limit_sol: 0.2,
            requires_approval: false,
            approval_threshold_sol: 0.5,
            whitelist: vec![target.to_string()],
        };

        let policy = config.to_policy().unwrap();
        assert_eq!(policy.max_transaction_lamports, LAMPORTS_PER_SOL / 20);
        assert_eq!(policy.daily_limit_lamports, LAMPORTS_PER_SOL / 5);
        assert!(!policy.requires_approval);
        assert!(policy.permits_target(&target));
        assert!(!policy.permits_target(&Pubkey::new_unique()));
    }

    #[test]
    fn test_zero_approval_queue_rejected() {
        let mut config = FleetConfig::default();
        config.fleet.max_pending_approvals = 0;
        assert!(config.validate().is_err());

        config.policy.requires_approval = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_whitelist_rejected() {
        let mut config = FleetConfig::default();
        config.policy.whitelist = vec!["not-an-address".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_limits_rejected() {
        let mut config = FleetConfig::default();
        config.policy.daily_limit_sol = 0.0;
        assert!(config.validate().is_err());

        let mut config = FleetConfig::default();
        config.policy.max_transaction_sol = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[rpc]
endpoint = "http://localhost:8899"

[policy]
max_transaction_sol = 0.25
daily_limit_sol = 2.0

[fleet]
funding_delay_ms = 0
"#
        )
        .unwrap();

        let config = FleetConfig::load_without_dotenv(file.path()).unwrap();
        assert_eq!(config.rpc.endpoint, "http://localhost:8899");
        assert_eq!(config.rpc.confirm_timeout_ms, 60_000);
        assert_eq!(config.policy.max_transaction_sol, 0.25);
        assert!(config.policy.requires_approval);
        assert_eq!(config.fleet.settings().funding_delay, Duration::ZERO);
        assert_eq!(config.fleet.settings().lifecycle.max_pending_approvals, 64);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FleetConfig::load_without_dotenv(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.rpc.endpoint, default_rpc_endpoint());
    }

    #[test]
    fn test_masked_display_hides_api_key() {
        let mut config = FleetConfig::default();
        config.rpc.endpoint = "https://rpc.example.com/?api-key=secret".to_string();
        let shown = config.masked_display();
        assert!(!shown.contains("secret"));
        assert!(shown.contains("https://rpc.example.com/?***"));
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://api.example.com?key=secret"),
            "https://api.example.com?***"
        );
        assert_eq!(mask_url("https://api.example.com"), "https://api.example.com");
    }
}
