use super::event::AuditEvent;
use super::identity::{Amount, Height, Principal, TransactionId};
use super::transaction::TransactionRecord;
use crate::error::Result;
use async_trait::async_trait;
use thiserror::Error;

/// The escrow registry: id → record, append-only.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Inserts or overwrites the record under its id.
    async fn store(&self, record: TransactionRecord) -> Result<()>;
    async fn get(&self, id: TransactionId) -> Result<Option<TransactionRecord>>;
    /// Highest id ever stored, `TransactionId(0)` when empty.
    async fn last_id(&self) -> Result<TransactionId>;
    /// All records in id order.
    async fn all(&self) -> Result<Vec<TransactionRecord>>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("{account} has insufficient funds for {amount}")]
    InsufficientFunds { account: Principal, amount: Amount },
    #[error("transfer to {0} was rejected")]
    Rejected(Principal),
}

/// Atomic value transfer between accounts. A failed transfer has no effect.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn transfer(
        &self,
        amount: Amount,
        from: &Principal,
        to: &Principal,
    ) -> std::result::Result<(), LedgerError>;
    async fn balance(&self, account: &Principal) -> Amount;
}

/// Read-only view of the logical clock.
pub trait Clock: Send + Sync {
    fn height(&self) -> Height;
}

/// Receives one event per successful operation.
///
/// Emitting must not block and must not fail the caller.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

pub type TransactionStoreBox = Box<dyn TransactionStore>;
pub type LedgerBox = Box<dyn Ledger>;
pub type ClockBox = Box<dyn Clock>;
pub type AuditSinkBox = Box<dyn AuditSink>;
