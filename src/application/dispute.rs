//! Settlement of disputed escrows.
//!
//! A resolution pays two legs out of custody, buyer first. The two transfers
//! are not atomic together, so the buyer leg is recorded as a
//! [`PendingSettlement`] before the seller leg is attempted. If the seller
//! transfer fails, calling [`EscrowEngine::resolve_dispute`] again with the
//! same percentage pays only the missing leg.

use super::engine::EscrowEngine;
use crate::domain::event::EventDetail;
use crate::domain::identity::{Amount, Principal, TransactionId};
use crate::domain::lifecycle::Trigger;
use crate::domain::split::split_by_percentage;
use crate::domain::transaction::{PendingSettlement, Phase, TransactionRecord};
use crate::error::{EscrowError, Result};

impl EscrowEngine {
    /// Splits a disputed escrow: `buyer_percentage` of it to the buyer
    /// (rounded down), the rest to the seller.
    pub async fn resolve_dispute(
        &self,
        caller: &Principal,
        id: TransactionId,
        buyer_percentage: u8,
    ) -> Result<()> {
        let _serial = self.gate.lock().await;
        let now = self.now();
        let mut record = self.load(id).await?;
        let phase = self.authorize(caller, &record, Trigger::ResolveDispute)?;

        let started = record.settlement;
        let (settlement, resumed) = match started {
            Some(pending) => {
                if pending.buyer_percentage != buyer_percentage {
                    return Err(EscrowError::BadParameter(format!(
                        "Resolution already started at {}% for the buyer",
                        pending.buyer_percentage
                    )));
                }
                tracing::info!(id = id.0, "resuming partially paid resolution");
                (pending, true)
            }
            None => {
                Self::ensure_live(&record, now)?;
                let split = split_by_percentage(record.amount, buyer_percentage)?;
                let pending = PendingSettlement {
                    buyer_percentage,
                    buyer_share: split.buyer_share,
                    seller_share: split.seller_share,
                };
                self.pay_buyer_leg(&mut record, pending).await?;
                (pending, false)
            }
        };

        let seller = record.seller.clone();
        if let Err(e) = self.pay_seller_leg(&mut record, phase, settlement.seller_share).await {
            if !resumed {
                tracing::warn!(id = id.0, error = %e, "dispute resolution left half paid");
                self.emit(
                    Trigger::ResolveDispute.name(),
                    id,
                    caller,
                    now,
                    EventDetail::SettlementStarted {
                        buyer: record.buyer.clone(),
                        buyer_percentage: settlement.buyer_percentage,
                        buyer_share: settlement.buyer_share,
                        outstanding: settlement.seller_share,
                    },
                );
            }
            return Err(e);
        }

        tracing::info!(
            id = id.0,
            buyer_share = settlement.buyer_share,
            seller_share = settlement.seller_share,
            resumed,
            "dispute resolved"
        );
        self.emit(
            Trigger::ResolveDispute.name(),
            id,
            caller,
            now,
            EventDetail::DisputeSettled {
                buyer: record.buyer.clone(),
                buyer_share: settlement.buyer_share,
                seller,
                seller_share: settlement.seller_share,
                resumed,
            },
        );
        Ok(())
    }

    /// Releases part of a disputed escrow to the buyer without closing the dispute.
    ///
    /// `proof` is accepted as-is when non-empty; no verification algorithm is applied.
    pub async fn secure_withdrawal(
        &self,
        caller: &Principal,
        id: TransactionId,
        withdrawal: Amount,
        proof: &[u8],
    ) -> Result<()> {
        let _serial = self.gate.lock().await;
        let now = self.now();
        let mut record = self.load(id).await?;
        self.authorize(caller, &record, Trigger::SecureWithdrawal)?;
        if record.settlement.is_some() {
            return Err(EscrowError::InvalidState {
                phase: record.phase,
                operation: Trigger::SecureWithdrawal.name(),
            });
        }

        let available_at = record
            .created_at
            .saturating_add(self.config.min_withdrawal_delay);
        if now < available_at {
            return Err(EscrowError::HoldingPeriodActive { now, available_at });
        }
        if withdrawal == 0 || withdrawal > record.amount {
            return Err(EscrowError::BadParameter(format!(
                "Withdrawal must be within 1..={}, got {withdrawal}",
                record.amount
            )));
        }
        if proof.is_empty() {
            return Err(EscrowError::BadParameter(
                "Withdrawal proof must not be empty".to_string(),
            ));
        }

        let buyer = record.buyer.clone();
        self.release(withdrawal, &buyer).await?;
        record.amount -= withdrawal;
        let remaining = record.amount;
        self.persist_after_release(record, withdrawal, &buyer).await?;

        tracing::info!(id = id.0, withdrawal, remaining, "secure withdrawal released");
        self.emit(
            Trigger::SecureWithdrawal.name(),
            id,
            caller,
            now,
            EventDetail::Withdrawal {
                to: buyer,
                amount: withdrawal,
                remaining,
            },
        );
        Ok(())
    }

    /// Pays the seller's share and closes the record in `phase`.
    async fn pay_seller_leg(
        &self,
        record: &mut TransactionRecord,
        phase: Phase,
        seller_share: Amount,
    ) -> Result<()> {
        let seller = record.seller.clone();
        self.release(seller_share, &seller).await?;

        record.close(phase);
        self.persist_after_release(record.clone(), seller_share, &seller)
            .await
    }

    /// Pays the buyer's share and records that only the seller's share is left.
    async fn pay_buyer_leg(
        &self,
        record: &mut TransactionRecord,
        pending: PendingSettlement,
    ) -> Result<()> {
        let buyer = record.buyer.clone();
        self.release(pending.buyer_share, &buyer).await?;

        debug_assert_eq!(record.phase, Phase::Disputed);
        record.amount = pending.seller_share;
        record.settlement = Some(pending);
        self.persist_after_release(record.clone(), pending.buyer_share, &buyer)
            .await
    }
}
