#![allow(dead_code)]

use escrow_engine::application::engine::EscrowEngine;
use escrow_engine::config::EngineConfig;
use escrow_engine::domain::identity::{Amount, ItemId, Principal, TransactionId};
use escrow_engine::domain::ports::{Ledger, TransactionStore};
use escrow_engine::domain::transaction::TransactionRecord;
use escrow_engine::error::{EscrowError, Result as EscrowResult};
use escrow_engine::infrastructure::audit::InMemoryAuditSink;
use escrow_engine::infrastructure::in_memory::{InMemoryLedger, InMemoryTransactionStore, ManualClock};
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub const ADMIN: &str = "admin";
pub const BUYER: &str = "alice";
pub const SELLER: &str = "bob";

pub fn principal(name: &str) -> Principal {
    Principal::new(name).unwrap()
}

/// In-memory registry whose writes can be made to fail.
#[derive(Default, Clone)]
pub struct FlakyStore {
    inner: InMemoryTransactionStore,
    failing: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl TransactionStore for FlakyStore {
    async fn store(&self, record: TransactionRecord) -> EscrowResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EscrowError::Storage(Box::new(Error::other("disk full"))));
        }
        self.inner.store(record).await
    }

    async fn get(&self, id: TransactionId) -> EscrowResult<Option<TransactionRecord>> {
        self.inner.get(id).await
    }

    async fn last_id(&self) -> EscrowResult<TransactionId> {
        self.inner.last_id().await
    }

    async fn all(&self) -> EscrowResult<Vec<TransactionRecord>> {
        self.inner.all().await
    }
}

/// An engine wired to in-memory collaborators, with handles kept for inspection.
pub struct Harness {
    pub engine: EscrowEngine,
    pub ledger: InMemoryLedger,
    pub clock: ManualClock,
    pub audit: InMemoryAuditSink,
    pub store: FlakyStore,
}

impl Harness {
    pub async fn new() -> Self {
        let ledger = InMemoryLedger::new();
        let clock = ManualClock::new(0);
        let audit = InMemoryAuditSink::new();
        let store = FlakyStore::default();
        let engine = EscrowEngine::new(
            EngineConfig::new(principal(ADMIN)),
            Box::new(store.clone()),
            Box::new(ledger.clone()),
            Box::new(clock.clone()),
            Box::new(audit.clone()),
        )
        .unwrap();
        ledger.credit(&principal(BUYER), 100_000).await;
        Self {
            engine,
            ledger,
            clock,
            audit,
            store,
        }
    }

    pub async fn create(&self, amount: Amount) -> TransactionId {
        self.engine
            .create_transaction(&principal(BUYER), &principal(SELLER), ItemId(7), amount, 1)
            .await
            .unwrap()
    }

    pub async fn balance(&self, name: &str) -> Amount {
        self.ledger.balance(&principal(name)).await
    }

    pub async fn custody(&self) -> Amount {
        self.engine.custody_balance().await
    }

    /// Custody must hold exactly what the registry says is escrowed.
    pub async fn assert_custody_matches(&self) {
        assert_eq!(
            self.engine.escrowed_total().await.unwrap(),
            self.custody().await,
            "custody balance diverged from the registry"
        );
    }
}

pub fn write_commands(path: &Path, rows: &[&str]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(file);

    wtr.write_record(["height", "op", "caller", "id", "party", "item", "amount", "value", "data"])?;
    for row in rows {
        let fields: Vec<&str> = row.split(',').map(str::trim).collect();
        wtr.write_record(&fields)?;
    }

    wtr.flush()?;
    Ok(())
}
