use super::identity::{Amount, Height, ItemId, Principal, TransactionId};
use super::transaction::Phase;
use serde::Serialize;

/// Write-only audit record emitted once per successful operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub operation: &'static str,
    pub id: TransactionId,
    pub caller: Principal,
    pub height: Height,
    #[serde(flatten)]
    pub detail: EventDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDetail {
    Created {
        seller: Principal,
        item: ItemId,
        amount: Amount,
        tranche_count: u8,
        expires_at: Height,
    },
    /// Funds left custody and the record changed phase.
    Payout {
        to: Principal,
        amount: Amount,
        phase: Phase,
    },
    PhaseChanged {
        from: Phase,
        to: Phase,
    },
    Extended {
        by: Height,
        expires_at: Height,
    },
    OwnershipTransferred {
        from: Principal,
        to: Principal,
    },
    DisputeSettled {
        buyer: Principal,
        buyer_share: Amount,
        seller: Principal,
        seller_share: Amount,
        resumed: bool,
    },
    /// The buyer's share left custody but the seller's share did not.
    SettlementStarted {
        buyer: Principal,
        buyer_percentage: u8,
        buyer_share: Amount,
        outstanding: Amount,
    },
    Withdrawal {
        to: Principal,
        amount: Amount,
        remaining: Amount,
    },
    /// Parameters were validated; nothing was stored.
    Advisory {
        summary: String,
    },
}
