use crate::domain::identity::{Amount, Height, Principal, TransactionId};
use crate::domain::ports::{Clock, Ledger, LedgerError, TransactionStore};
use crate::domain::transaction::TransactionRecord;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Registry {
    records: BTreeMap<TransactionId, TransactionRecord>,
    last_id: TransactionId,
}

/// A thread-safe in-memory escrow registry.
///
/// `Clone` shares the underlying map, so a test can keep a handle after
/// boxing another one into the engine.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    registry: Arc<RwLock<Registry>>,
}

impl InMemoryTransactionStore {
    /// Creates a new, empty in-memory registry.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn store(&self, record: TransactionRecord) -> Result<()> {
        let mut registry = self.registry.write().await;
        registry.last_id = registry.last_id.max(record.id);
        registry.records.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: TransactionId) -> Result<Option<TransactionRecord>> {
        let registry = self.registry.read().await;
        Ok(registry.records.get(&id).cloned())
    }

    async fn last_id(&self) -> Result<TransactionId> {
        Ok(self.registry.read().await.last_id)
    }

    async fn all(&self) -> Result<Vec<TransactionRecord>> {
        let registry = self.registry.read().await;
        Ok(registry.records.values().cloned().collect())
    }
}

#[derive(Default)]
struct Balances {
    accounts: HashMap<Principal, Amount>,
    rejecting: HashSet<Principal>,
}

/// A ledger kept in memory.
///
/// Transfers are checked and applied under one write lock, so they are
/// all-or-nothing. Recipients can be marked as rejecting to simulate a ledger
/// that refuses a movement.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    balances: Arc<RwLock<Balances>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds funds to an account from outside the ledger.
    pub async fn credit(&self, account: &Principal, amount: Amount) {
        let mut balances = self.balances.write().await;
        let entry = balances.accounts.entry(account.clone()).or_default();
        *entry = entry.saturating_add(amount);
    }

    /// Makes every transfer to `account` fail with `Rejected`.
    pub async fn reject_transfers_to(&self, account: &Principal) {
        self.balances.write().await.rejecting.insert(account.clone());
    }

    pub async fn accept_transfers_to(&self, account: &Principal) {
        self.balances.write().await.rejecting.remove(account);
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn transfer(
        &self,
        amount: Amount,
        from: &Principal,
        to: &Principal,
    ) -> std::result::Result<(), LedgerError> {
        let mut balances = self.balances.write().await;
        if balances.rejecting.contains(to) {
            return Err(LedgerError::Rejected(to.clone()));
        }
        let available = balances.accounts.get(from).copied().unwrap_or_default();
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                account: from.clone(),
                amount,
            });
        }
        balances.accounts.insert(from.clone(), available - amount);
        let entry = balances.accounts.entry(to.clone()).or_default();
        *entry = entry.saturating_add(amount);
        Ok(())
    }

    async fn balance(&self, account: &Principal) -> Amount {
        let balances = self.balances.read().await;
        balances.accounts.get(account).copied().unwrap_or_default()
    }
}

/// A logical clock advanced by hand.
#[derive(Default, Clone)]
pub struct ManualClock {
    height: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(height: Height) -> Self {
        Self {
            height: Arc::new(AtomicU64::new(height)),
        }
    }

    /// Moves the clock forward to `height`. Returns `false` if that would move it back.
    pub fn set(&self, height: Height) -> bool {
        self.height.fetch_max(height, Ordering::SeqCst) <= height
    }

    pub fn advance(&self, blocks: Height) -> Height {
        self.height.fetch_add(blocks, Ordering::SeqCst) + blocks
    }
}

impl Clock for ManualClock {
    fn height(&self) -> Height {
        self.height.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::ItemId;

    fn principal(name: &str) -> Principal {
        Principal::new(name).unwrap()
    }

    fn record(id: u64) -> TransactionRecord {
        TransactionRecord::new(
            TransactionId(id),
            principal("buyer"),
            principal("seller"),
            ItemId(1),
            100,
            1,
            0,
            10,
        )
    }

    #[tokio::test]
    async fn test_in_memory_store_round_trip() {
        let store = InMemoryTransactionStore::new();
        assert_eq!(store.last_id().await.unwrap(), TransactionId(0));

        store.store(record(1)).await.unwrap();
        store.store(record(2)).await.unwrap();

        let retrieved = store.get(TransactionId(1)).await.unwrap().unwrap();
        assert_eq!(retrieved, record(1));
        assert!(store.get(TransactionId(3)).await.unwrap().is_none());
        assert_eq!(store.last_id().await.unwrap(), TransactionId(2));
    }

    #[tokio::test]
    async fn test_in_memory_store_all_is_ordered() {
        let store = InMemoryTransactionStore::new();
        store.store(record(3)).await.unwrap();
        store.store(record(1)).await.unwrap();

        let ids: Vec<_> = store.all().await.unwrap().iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_ledger_transfer_is_all_or_nothing() {
        let ledger = InMemoryLedger::new();
        let alice = principal("alice");
        let bob = principal("bob");
        ledger.credit(&alice, 50).await;

        let err = ledger.transfer(80, &alice, &bob).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(ledger.balance(&alice).await, 50);
        assert_eq!(ledger.balance(&bob).await, 0);

        ledger.transfer(30, &alice, &bob).await.unwrap();
        assert_eq!(ledger.balance(&alice).await, 20);
        assert_eq!(ledger.balance(&bob).await, 30);
    }

    #[tokio::test]
    async fn test_ledger_rejecting_recipient() {
        let ledger = InMemoryLedger::new();
        let alice = principal("alice");
        let bob = principal("bob");
        ledger.credit(&alice, 50).await;
        ledger.reject_transfers_to(&bob).await;

        assert_eq!(
            ledger.transfer(10, &alice, &bob).await,
            Err(LedgerError::Rejected(bob.clone()))
        );
        assert_eq!(ledger.balance(&alice).await, 50);

        ledger.accept_transfers_to(&bob).await;
        assert!(ledger.transfer(10, &alice, &bob).await.is_ok());
    }

    #[test]
    fn test_manual_clock_never_moves_back() {
        let clock = ManualClock::new(10);
        assert!(clock.set(15));
        assert!(!clock.set(12));
        assert_eq!(clock.height(), 15);
        assert_eq!(clock.advance(5), 20);
    }
}
