//! Error types for the wallet fleet

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the wallet fleet
///
/// Policy outcomes are not errors: blocked and approval-gated transfers are
/// returned as values (see `wallet::policy::Decision`). Only caller misuse,
/// malformed input and collaborator failures show up here.
#[derive(Error, Debug)]
pub enum Error {
    // Registry misuse
    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    // Approval queue misuse
    #[error("Unknown approval request: {0}")]
    UnknownApproval(String),

    #[error("Approval request expired: {0}")]
    ApprovalExpired(String),

    // Signing errors
    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    // Export / import errors
    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    // Ledger errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    #[error("Transaction build failed: {0}")]
    TransactionBuild(String),

    #[error("Transaction send failed: {0}")]
    TransactionSend(String),

    #[error("Funding request failed: {0}")]
    Funding(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Configuration and other context-carrying errors
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    ///
    /// Only read-only ledger calls are ever retried; a failed broadcast is
    /// surfaced as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Rpc(_) | Error::RpcTimeout(_))
    }

    /// Check if this error signals a caller bug rather than a runtime condition
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Error::DuplicateAgent(_)
                | Error::UnknownAgent(_)
                | Error::UnknownApproval(_)
                | Error::ApprovalExpired(_)
        )
    }
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
