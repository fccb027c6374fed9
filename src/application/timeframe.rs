//! Operations driven by the transaction window: expiry, freezing and extensions.

use super::engine::EscrowEngine;
use crate::domain::event::EventDetail;
use crate::domain::identity::{Height, Principal, TransactionId};
use crate::domain::lifecycle::Trigger;
use crate::domain::transaction::TransactionRecord;
use crate::error::{EscrowError, Result};

impl EscrowEngine {
    /// Refunds the buyer once the window has strictly passed.
    pub async fn process_expired(&self, caller: &Principal, id: TransactionId) -> Result<()> {
        let _serial = self.gate.lock().await;
        let now = self.now();
        let mut record = self.load(id).await?;
        let phase = self.authorize(caller, &record, Trigger::ProcessExpired)?;

        if record.is_live_at(now) {
            tracing::debug!(id = id.0, now, expires_at = record.expires_at, "expiry not reached");
            return Err(EscrowError::ExpiryNotReached {
                now,
                expires_at: record.expires_at,
            });
        }

        let buyer = record.buyer.clone();
        self.payout(&mut record, caller, now, Trigger::ProcessExpired, phase, buyer)
            .await
    }

    /// Freezes an open escrow and pushes its expiry out by `duration` blocks.
    ///
    /// Any caller may freeze; `frozen` has no outgoing transition.
    pub async fn freeze(
        &self,
        caller: &Principal,
        id: TransactionId,
        duration: Height,
    ) -> Result<()> {
        let _serial = self.gate.lock().await;
        let now = self.now();
        let mut record = self.load(id).await?;
        let phase = self.authorize(caller, &record, Trigger::Freeze)?;

        let (min, max) = (self.config.freeze_min, self.config.freeze_max);
        if !(min..=max).contains(&duration) {
            return Err(EscrowError::BadParameter(format!(
                "Freeze duration must be within {min}..={max}, got {duration}"
            )));
        }
        record.expires_at = extended(&record, duration)?;

        self.change_phase(&mut record, caller, now, Trigger::Freeze, phase)
            .await
    }

    /// Extends the window of an open escrow by `extra_blocks`.
    pub async fn modify_timeframe(
        &self,
        caller: &Principal,
        id: TransactionId,
        extra_blocks: Height,
    ) -> Result<()> {
        let _serial = self.gate.lock().await;
        let now = self.now();
        let mut record = self.load(id).await?;
        self.authorize(caller, &record, Trigger::ModifyTimeframe)?;

        let max = self.config.max_extension;
        if extra_blocks == 0 || extra_blocks > max {
            return Err(EscrowError::BadParameter(format!(
                "Extension must be within 1..={max}, got {extra_blocks}"
            )));
        }
        record.expires_at = extended(&record, extra_blocks)?;
        let expires_at = record.expires_at;
        self.store.store(record).await?;

        tracing::info!(id = id.0, by = extra_blocks, expires_at, "escrow window extended");
        self.emit(
            Trigger::ModifyTimeframe.name(),
            id,
            caller,
            now,
            EventDetail::Extended {
                by: extra_blocks,
                expires_at,
            },
        );
        Ok(())
    }
}

fn extended(record: &TransactionRecord, blocks: Height) -> Result<Height> {
    record.expires_at.checked_add(blocks).ok_or_else(|| {
        EscrowError::BadParameter(format!(
            "Extending {} by {blocks} overflows the clock",
            record.expires_at
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::identity::ItemId;
    use crate::domain::transaction::Phase;
    use crate::infrastructure::audit::InMemoryAuditSink;
    use crate::infrastructure::in_memory::{InMemoryLedger, InMemoryTransactionStore, ManualClock};

    fn principal(name: &str) -> Principal {
        Principal::new(name).unwrap()
    }

    async fn opened() -> (EscrowEngine, ManualClock, TransactionId) {
        let ledger = InMemoryLedger::new();
        ledger.credit(&principal("alice"), 1_000).await;
        let clock = ManualClock::new(0);
        let engine = EscrowEngine::new(
            EngineConfig::new(principal("admin")),
            Box::new(InMemoryTransactionStore::new()),
            Box::new(ledger),
            Box::new(clock.clone()),
            Box::new(InMemoryAuditSink::new()),
        )
        .unwrap();
        let id = engine
            .create_transaction(&principal("alice"), &principal("bob"), ItemId(1), 100, 1)
            .await
            .unwrap();
        (engine, clock, id)
    }

    #[tokio::test]
    async fn test_expiry_boundary_is_strict() {
        let (engine, clock, id) = opened().await;
        clock.set(1440);
        let err = engine
            .process_expired(&principal("alice"), id)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::ExpiryNotReached { .. }));

        clock.advance(1);
        engine.process_expired(&principal("alice"), id).await.unwrap();
        assert_eq!(engine.transaction(id).await.unwrap().phase, Phase::Expired);
    }

    #[tokio::test]
    async fn test_freeze_bounds() {
        let (engine, _, id) = opened().await;
        for duration in [0, 5, 721] {
            let err = engine.freeze(&principal("mallory"), id, duration).await.unwrap_err();
            assert!(matches!(err, EscrowError::BadParameter(_)), "{duration}");
        }

        engine.freeze(&principal("mallory"), id, 6).await.unwrap();
        let record = engine.transaction(id).await.unwrap();
        assert_eq!(record.phase, Phase::Frozen);
        assert_eq!(record.expires_at, 1446);
    }

    #[tokio::test]
    async fn test_modify_timeframe_bounds() {
        let (engine, _, id) = opened().await;
        let bob = principal("bob");
        assert!(engine.modify_timeframe(&bob, id, 0).await.is_err());
        assert!(engine.modify_timeframe(&bob, id, 1441).await.is_err());

        engine.modify_timeframe(&bob, id, 1440).await.unwrap();
        let record = engine.transaction(id).await.unwrap();
        assert_eq!(record.expires_at, 2880);
        assert_eq!(record.phase, Phase::Pending);
    }
}
