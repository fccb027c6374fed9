use crate::domain::identity::{Height, Principal, TransactionId};
use crate::domain::ports::LedgerError;
use crate::domain::transaction::Phase;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EscrowError>;

/// Every way an engine operation can fail.
///
/// Domain variants are reported to the caller and never leave a partial
/// change behind. The adapter variants (`Storage`, `Io`, `Csv`, `Config`)
/// come from the collaborators and the CLI surface.
#[derive(Error, Debug)]
pub enum EscrowError {
    #[error("{caller} is not permitted to {operation}")]
    NotPermitted {
        caller: Principal,
        operation: &'static str,
    },
    #[error("Transaction {0} not found")]
    NotFound(TransactionId),
    #[error("Transaction id {0} was never allocated")]
    BadId(TransactionId),
    #[error("Cannot {operation} a transaction in phase {phase}")]
    InvalidState {
        phase: Phase,
        operation: &'static str,
    },
    #[error("Transaction window closed at height {expires_at} (now {now})")]
    TimeExpired { now: Height, expires_at: Height },
    #[error("Transaction does not expire until after height {expires_at} (now {now})")]
    ExpiryNotReached { now: Height, expires_at: Height },
    #[error("Withdrawal is locked until height {available_at} (now {now})")]
    HoldingPeriodActive { now: Height, available_at: Height },
    #[error("Bad parameter: {0}")]
    BadParameter(String),
    #[error("Invalid counterparty: {0}")]
    InvalidCounterparty(Principal),
    #[error("Ledger transfer failed: {0}")]
    TransferFailed(#[from] LedgerError),
    #[error("Storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EscrowError {
    pub(crate) fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage(Box::new(err))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for EscrowError {
    fn from(err: rocksdb::Error) -> Self {
        Self::storage(err)
    }
}

impl From<serde_json::Error> for EscrowError {
    fn from(err: serde_json::Error) -> Self {
        Self::storage(err)
    }
}
