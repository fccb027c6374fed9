use crate::config::EngineConfig;
use crate::domain::event::{AuditEvent, EventDetail};
use crate::domain::identity::{Amount, CustodyAccount, Height, ItemId, Principal, TransactionId};
use crate::domain::lifecycle::{Roles, Trigger, next_phase};
use crate::domain::ports::{AuditSinkBox, ClockBox, LedgerBox, TransactionStoreBox};
use crate::domain::split::check_tranches;
use crate::domain::transaction::{Phase, TransactionRecord};
use crate::error::{EscrowError, Result};
use tokio::sync::Mutex;

/// The escrow transaction lifecycle engine.
///
/// `EscrowEngine` owns the registry, the custody account handle and the
/// collaborators it needs (ledger, clock, audit sink). Every public operation
/// takes the engine-wide `gate` first, so operations run one at a time and
/// each one either commits completely or leaves no trace.
pub struct EscrowEngine {
    pub(crate) config: EngineConfig,
    pub(crate) custody: CustodyAccount,
    pub(crate) store: TransactionStoreBox,
    pub(crate) ledger: LedgerBox,
    pub(crate) clock: ClockBox,
    pub(crate) audit: AuditSinkBox,
    pub(crate) gate: Mutex<()>,
}

impl EscrowEngine {
    /// Creates a new `EscrowEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `config` - Admin identity, custody account and time-window parameters.
    /// * `store` - The escrow registry.
    /// * `ledger` - Ledger holding the custody account.
    /// * `clock` - Source of the current logical height.
    /// * `audit` - Receives one event per successful operation.
    pub fn new(
        config: EngineConfig,
        store: TransactionStoreBox,
        ledger: LedgerBox,
        clock: ClockBox,
        audit: AuditSinkBox,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            custody: config.custody_account(),
            config,
            store,
            ledger,
            clock,
            audit,
            gate: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn custody(&self) -> &Principal {
        self.custody.principal()
    }

    pub fn now(&self) -> Height {
        self.clock.height()
    }

    /// Opens a new escrow: moves `amount` from the caller into custody and
    /// registers a `pending` record for it.
    ///
    /// The id counter only advances when the record is stored, so a failed
    /// deposit leaves both the registry and the counter untouched.
    pub async fn create_transaction(
        &self,
        caller: &Principal,
        seller: &Principal,
        item: ItemId,
        amount: Amount,
        tranche_count: u8,
    ) -> Result<TransactionId> {
        let _serial = self.gate.lock().await;
        let now = self.now();

        if amount == 0 {
            return Err(EscrowError::BadParameter(
                "Amount must be positive".to_string(),
            ));
        }
        check_tranches(amount, tranche_count, self.config.max_tranches)?;
        if caller == self.custody() {
            return Err(EscrowError::InvalidCounterparty(caller.clone()));
        }
        if seller == caller || seller == self.custody() {
            return Err(EscrowError::InvalidCounterparty(seller.clone()));
        }

        let last_id = self.store.last_id().await?;
        let id = last_id.next().ok_or_else(|| {
            EscrowError::storage(std::io::Error::other(format!(
                "id space exhausted after {last_id}"
            )))
        })?;

        self.ledger.transfer(amount, caller, self.custody()).await?;

        let record = TransactionRecord::new(
            id,
            caller.clone(),
            seller.clone(),
            item,
            amount,
            tranche_count,
            now,
            self.config.default_duration,
        );
        let expires_at = record.expires_at;
        if let Err(e) = self.store.store(record).await {
            self.compensate(amount, caller).await;
            return Err(e);
        }

        tracing::info!(id = id.0, buyer = %caller, seller = %seller, amount, "escrow created");
        self.emit(
            "create_transaction",
            id,
            caller,
            now,
            EventDetail::Created {
                seller: seller.clone(),
                item,
                amount,
                tranche_count,
                expires_at,
            },
        );
        Ok(id)
    }

    /// Releases the escrow to the seller.
    pub async fn complete(&self, caller: &Principal, id: TransactionId) -> Result<()> {
        let _serial = self.gate.lock().await;
        let now = self.now();
        let mut record = self.load(id).await?;
        let phase = self.authorize(caller, &record, Trigger::Complete)?;
        Self::ensure_live(&record, now)?;

        let seller = record.seller.clone();
        self.payout(&mut record, caller, now, Trigger::Complete, phase, seller)
            .await
    }

    /// Returns the escrow to the buyer. Admin only.
    pub async fn cancel_return(&self, caller: &Principal, id: TransactionId) -> Result<()> {
        let _serial = self.gate.lock().await;
        let now = self.now();
        let mut record = self.load(id).await?;
        let phase = self.authorize(caller, &record, Trigger::CancelReturn)?;

        let buyer = record.buyer.clone();
        self.payout(&mut record, caller, now, Trigger::CancelReturn, phase, buyer)
            .await
    }

    /// Lets the buyer walk away from a live escrow with a full refund.
    pub async fn abort(&self, caller: &Principal, id: TransactionId) -> Result<()> {
        let _serial = self.gate.lock().await;
        let now = self.now();
        let mut record = self.load(id).await?;
        let phase = self.authorize(caller, &record, Trigger::Abort)?;
        Self::ensure_live(&record, now)?;

        let buyer = record.buyer.clone();
        self.payout(&mut record, caller, now, Trigger::Abort, phase, buyer)
            .await
    }

    /// Puts a live escrow into `locked`. Nothing leaves `locked`.
    pub async fn lockdown(&self, caller: &Principal, id: TransactionId) -> Result<()> {
        let _serial = self.gate.lock().await;
        let now = self.now();
        let mut record = self.load(id).await?;
        let phase = self.authorize(caller, &record, Trigger::Lockdown)?;

        self.change_phase(&mut record, caller, now, Trigger::Lockdown, phase)
            .await
    }

    /// Opens a dispute. Either party may raise one while the window is open.
    pub async fn dispute(&self, caller: &Principal, id: TransactionId) -> Result<()> {
        let _serial = self.gate.lock().await;
        let now = self.now();
        let mut record = self.load(id).await?;
        let phase = self.authorize(caller, &record, Trigger::Dispute)?;
        Self::ensure_live(&record, now)?;

        self.change_phase(&mut record, caller, now, Trigger::Dispute, phase)
            .await
    }

    /// Replaces the buyer of an open escrow.
    pub async fn transfer_ownership(
        &self,
        caller: &Principal,
        id: TransactionId,
        new_buyer: &Principal,
    ) -> Result<()> {
        let _serial = self.gate.lock().await;
        let now = self.now();
        let mut record = self.load(id).await?;
        self.authorize(caller, &record, Trigger::TransferOwnership)?;

        if new_buyer == &record.buyer || new_buyer == &record.seller || new_buyer == self.custody()
        {
            return Err(EscrowError::InvalidCounterparty(new_buyer.clone()));
        }

        let previous = std::mem::replace(&mut record.buyer, new_buyer.clone());
        self.store.store(record).await?;

        tracing::info!(id = id.0, from = %previous, to = %new_buyer, "ownership transferred");
        self.emit(
            Trigger::TransferOwnership.name(),
            id,
            caller,
            now,
            EventDetail::OwnershipTransferred {
                from: previous,
                to: new_buyer.clone(),
            },
        );
        Ok(())
    }

    /// Looks up a record without changing anything.
    pub async fn transaction(&self, id: TransactionId) -> Result<TransactionRecord> {
        self.load(id).await
    }

    /// Every record in id order.
    pub async fn transactions(&self) -> Result<Vec<TransactionRecord>> {
        self.store.all().await
    }

    /// Sum of the amounts the registry says custody should hold.
    pub async fn escrowed_total(&self) -> Result<Amount> {
        let _serial = self.gate.lock().await;
        Ok(self
            .store
            .all()
            .await?
            .iter()
            .filter(|r| !r.phase.is_terminal())
            .map(|r| r.amount)
            .sum())
    }

    pub async fn custody_balance(&self) -> Amount {
        self.ledger.balance(self.custody()).await
    }

    /// Loads a record, telling never-allocated ids apart from missing records.
    pub(crate) async fn load(&self, id: TransactionId) -> Result<TransactionRecord> {
        if id.0 == 0 || id > self.store.last_id().await? {
            return Err(EscrowError::BadId(id));
        }
        let record = self.store.get(id).await?.ok_or(EscrowError::NotFound(id))?;
        tracing::debug!(id = id.0, phase = %record.phase, "loaded escrow");
        Ok(record)
    }

    /// Checks the caller's role, then the phase, and returns the phase `trigger` leads to.
    pub(crate) fn authorize(
        &self,
        caller: &Principal,
        record: &TransactionRecord,
        trigger: Trigger,
    ) -> Result<Phase> {
        let roles = Roles::of(caller, &self.config.admin, record);
        if !trigger.permits(roles) {
            return Err(EscrowError::NotPermitted {
                caller: caller.clone(),
                operation: trigger.name(),
            });
        }
        next_phase(record.phase, trigger).ok_or(EscrowError::InvalidState {
            phase: record.phase,
            operation: trigger.name(),
        })
    }

    pub(crate) fn ensure_live(record: &TransactionRecord, now: Height) -> Result<()> {
        if record.is_live_at(now) {
            Ok(())
        } else {
            Err(EscrowError::TimeExpired {
                now,
                expires_at: record.expires_at,
            })
        }
    }

    /// Moves `amount` out of custody. Zero amounts never reach the ledger.
    pub(crate) async fn release(&self, amount: Amount, to: &Principal) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.ledger
            .transfer(amount, self.custody(), to)
            .await
            .map_err(|e| {
                tracing::warn!(amount, to = %to, error = %e, "custody transfer rejected");
                EscrowError::from(e)
            })
    }

    /// Pays the whole escrow to `to` and closes the record in `phase`.
    pub(crate) async fn payout(
        &self,
        record: &mut TransactionRecord,
        caller: &Principal,
        now: Height,
        trigger: Trigger,
        phase: Phase,
        to: Principal,
    ) -> Result<()> {
        let amount = record.amount;
        self.release(amount, &to).await?;

        record.close(phase);
        self.persist_after_release(record.clone(), amount, &to)
            .await?;

        tracing::info!(id = record.id.0, %phase, amount, to = %to, "escrow paid out");
        self.emit(
            trigger.name(),
            record.id,
            caller,
            now,
            EventDetail::Payout { to, amount, phase },
        );
        Ok(())
    }

    /// Moves a record to `phase` without moving funds.
    pub(crate) async fn change_phase(
        &self,
        record: &mut TransactionRecord,
        caller: &Principal,
        now: Height,
        trigger: Trigger,
        phase: Phase,
    ) -> Result<()> {
        let from = record.phase;
        record.phase = phase;
        self.store.store(record.clone()).await?;

        tracing::info!(id = record.id.0, %from, to = %phase, "escrow phase changed");
        self.emit(
            trigger.name(),
            record.id,
            caller,
            now,
            EventDetail::PhaseChanged { from, to: phase },
        );
        Ok(())
    }

    /// Persists a record whose funds already left custody. If the write
    /// fails, the funds are pulled back before the error is returned.
    pub(crate) async fn persist_after_release(
        &self,
        record: TransactionRecord,
        amount: Amount,
        recipient: &Principal,
    ) -> Result<()> {
        let id = record.id;
        if let Err(e) = self.store.store(record).await {
            if amount > 0
                && let Err(reversal) = self.ledger.transfer(amount, recipient, self.custody()).await
            {
                tracing::error!(
                    id = id.0,
                    amount,
                    recipient = %recipient,
                    error = %reversal,
                    "custody divergence: funds released but record not updated"
                );
            }
            return Err(e);
        }
        Ok(())
    }

    /// Returns a deposit whose record could not be written.
    async fn compensate(&self, amount: Amount, depositor: &Principal) {
        if let Err(e) = self.ledger.transfer(amount, self.custody(), depositor).await {
            tracing::error!(
                amount,
                depositor = %depositor,
                error = %e,
                "custody divergence: deposit kept without a record"
            );
        }
    }

    pub(crate) fn emit(
        &self,
        operation: &'static str,
        id: TransactionId,
        caller: &Principal,
        height: Height,
        detail: EventDetail,
    ) {
        self.audit.emit(AuditEvent {
            operation,
            id,
            caller: caller.clone(),
            height,
            detail,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::Ledger;
    use crate::infrastructure::audit::InMemoryAuditSink;
    use crate::infrastructure::in_memory::{InMemoryLedger, InMemoryTransactionStore, ManualClock};

    fn principal(name: &str) -> Principal {
        Principal::new(name).unwrap()
    }

    async fn engine() -> (EscrowEngine, InMemoryLedger, InMemoryAuditSink) {
        let ledger = InMemoryLedger::new();
        ledger.credit(&principal("alice"), 10_000).await;
        let audit = InMemoryAuditSink::new();
        let engine = EscrowEngine::new(
            EngineConfig::new(principal("admin")),
            Box::new(InMemoryTransactionStore::new()),
            Box::new(ledger.clone()),
            Box::new(ManualClock::new(100)),
            Box::new(audit.clone()),
        )
        .unwrap();
        (engine, ledger, audit)
    }

    #[tokio::test]
    async fn test_create_moves_funds_into_custody() {
        let (engine, ledger, audit) = engine().await;
        let id = engine
            .create_transaction(&principal("alice"), &principal("bob"), ItemId(7), 500, 1)
            .await
            .unwrap();

        assert_eq!(id, TransactionId(1));
        assert_eq!(ledger.balance(engine.custody()).await, 500);
        let record = engine.transaction(id).await.unwrap();
        assert_eq!(record.phase, Phase::Pending);
        assert_eq!((record.created_at, record.expires_at), (100, 1540));
        assert_eq!(audit.events().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_deposit_allocates_nothing() {
        let (engine, ledger, audit) = engine().await;
        let err = engine
            .create_transaction(&principal("alice"), &principal("bob"), ItemId(1), 20_000, 1)
            .await
            .unwrap_err();

        assert!(matches!(err, EscrowError::TransferFailed(_)));
        assert_eq!(ledger.balance(engine.custody()).await, 0);
        assert!(matches!(
            engine.transaction(TransactionId(1)).await,
            Err(EscrowError::BadId(_))
        ));
        assert!(audit.events().is_empty());
    }

    #[tokio::test]
    async fn test_create_validates_parameters() {
        let (engine, _, _) = engine().await;
        let alice = principal("alice");

        let zero = engine
            .create_transaction(&alice, &principal("bob"), ItemId(1), 0, 1)
            .await;
        assert!(matches!(zero, Err(EscrowError::BadParameter(_))));

        let uneven = engine
            .create_transaction(&alice, &principal("bob"), ItemId(1), 1000, 3)
            .await;
        assert!(matches!(uneven, Err(EscrowError::BadParameter(_))));

        let self_deal = engine
            .create_transaction(&alice, &alice, ItemId(1), 100, 1)
            .await;
        assert!(matches!(self_deal, Err(EscrowError::InvalidCounterparty(_))));

        let custody = engine.custody().clone();
        let to_custody = engine
            .create_transaction(&alice, &custody, ItemId(1), 100, 1)
            .await;
        assert!(matches!(to_custody, Err(EscrowError::InvalidCounterparty(_))));
    }

    #[tokio::test]
    async fn test_id_zero_is_bad_id() {
        let (engine, _, _) = engine().await;
        assert!(matches!(
            engine.complete(&principal("alice"), TransactionId(0)).await,
            Err(EscrowError::BadId(_))
        ));
    }

    #[tokio::test]
    async fn test_authorization_is_checked_before_phase() {
        let (engine, _, _) = engine().await;
        let id = engine
            .create_transaction(&principal("alice"), &principal("bob"), ItemId(1), 100, 1)
            .await
            .unwrap();

        let err = engine.complete(&principal("bob"), id).await.unwrap_err();
        assert!(matches!(err, EscrowError::NotPermitted { .. }));
        assert_eq!(engine.transaction(id).await.unwrap().phase, Phase::Pending);
    }
}
