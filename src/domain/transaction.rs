use super::identity::{Amount, Height, ItemId, Principal, TransactionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of an escrow transaction.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Pending,
    Accepted,
    Disputed,
    Frozen,
    Locked,
    Fulfilled,
    Returned,
    Aborted,
    Expired,
    Resolved,
}

impl Phase {
    pub const ALL: [Phase; 10] = [
        Phase::Pending,
        Phase::Accepted,
        Phase::Disputed,
        Phase::Frozen,
        Phase::Locked,
        Phase::Fulfilled,
        Phase::Returned,
        Phase::Aborted,
        Phase::Expired,
        Phase::Resolved,
    ];

    /// Phases reached by paying out the whole escrow.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Fulfilled | Self::Returned | Self::Aborted | Self::Expired | Self::Resolved
        )
    }

    /// Phases that still hold funds but have no outgoing transition.
    pub fn is_trap(&self) -> bool {
        matches!(self, Self::Locked | Self::Frozen)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Disputed => "disputed",
            Self::Frozen => "frozen",
            Self::Locked => "locked",
            Self::Fulfilled => "fulfilled",
            Self::Returned => "returned",
            Self::Aborted => "aborted",
            Self::Expired => "expired",
            Self::Resolved => "resolved",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dispute split whose buyer leg has been paid but whose seller leg has not.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub struct PendingSettlement {
    pub buyer_percentage: u8,
    pub buyer_share: Amount,
    pub seller_share: Amount,
}

/// One entry of the escrow registry.
///
/// Records are created once and then mutated in place; they are never removed.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub buyer: Principal,
    pub seller: Principal,
    pub item: ItemId,
    /// Value currently held in custody for this record.
    pub amount: Amount,
    pub phase: Phase,
    /// Number of equal tranches requested at creation.
    pub tranche_count: u8,
    pub created_at: Height,
    pub expires_at: Height,
    #[serde(default)]
    pub settlement: Option<PendingSettlement>,
}

impl TransactionRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: TransactionId,
        buyer: Principal,
        seller: Principal,
        item: ItemId,
        amount: Amount,
        tranche_count: u8,
        created_at: Height,
        duration: Height,
    ) -> Self {
        Self {
            id,
            buyer,
            seller,
            item,
            amount,
            phase: Phase::Pending,
            tranche_count,
            created_at,
            expires_at: created_at.saturating_add(duration),
            settlement: None,
        }
    }

    /// Whether `now` is still inside the transaction window (inclusive).
    pub fn is_live_at(&self, now: Height) -> bool {
        now <= self.expires_at
    }

    /// Moves the record into a terminal phase; custody no longer holds anything for it.
    pub fn close(&mut self, phase: Phase) {
        debug_assert!(phase.is_terminal());
        self.phase = phase;
        self.amount = 0;
        self.settlement = None;
    }
}
