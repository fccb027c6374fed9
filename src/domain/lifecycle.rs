//! Transition table and authorization rules for escrow transactions.
//!
//! Both are plain functions over enums so that every (phase, trigger) pair is
//! covered by an exhaustive match.

use super::identity::Principal;
use super::transaction::{Phase, TransactionRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A public lifecycle operation that may change a record's phase.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Complete,
    CancelReturn,
    Abort,
    ProcessExpired,
    Freeze,
    Lockdown,
    Dispute,
    ResolveDispute,
    SecureWithdrawal,
    ModifyTimeframe,
    TransferOwnership,
}

impl Trigger {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::CancelReturn => "cancel_return",
            Self::Abort => "abort",
            Self::ProcessExpired => "process_expired",
            Self::Freeze => "freeze",
            Self::Lockdown => "lockdown",
            Self::Dispute => "dispute",
            Self::ResolveDispute => "resolve_dispute",
            Self::SecureWithdrawal => "secure_withdrawal",
            Self::ModifyTimeframe => "modify_timeframe",
            Self::TransferOwnership => "transfer_ownership",
        }
    }

    /// Whether a caller holding `roles` may invoke this trigger.
    pub fn permits(&self, roles: Roles) -> bool {
        match self {
            Self::Complete => roles.admin || roles.buyer,
            Self::CancelReturn => roles.admin,
            Self::Abort => roles.buyer,
            Self::ProcessExpired => roles.admin || roles.buyer,
            // No caller restriction; see DESIGN.md.
            Self::Freeze => true,
            Self::Lockdown => roles.admin || roles.buyer || roles.seller,
            Self::Dispute => roles.buyer || roles.seller,
            Self::ResolveDispute => roles.admin,
            Self::SecureWithdrawal => roles.admin,
            Self::ModifyTimeframe => roles.admin || roles.buyer || roles.seller,
            Self::TransferOwnership => roles.admin || roles.buyer,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The roles a caller holds with respect to one record.
///
/// Always derived from the record's current parties, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Roles {
    pub admin: bool,
    pub buyer: bool,
    pub seller: bool,
}

impl Roles {
    pub fn of(caller: &Principal, admin: &Principal, record: &TransactionRecord) -> Self {
        Self {
            admin: caller == admin,
            buyer: caller == &record.buyer,
            seller: caller == &record.seller,
        }
    }

    pub fn is_party(&self) -> bool {
        self.buyer || self.seller
    }
}

/// Phase reached by firing `trigger` in phase `from`, or `None` if illegal.
///
/// `ResolveDispute` and `SecureWithdrawal` are both legal only from `disputed`;
/// withdrawal leaves the phase unchanged.
pub fn next_phase(from: Phase, trigger: Trigger) -> Option<Phase> {
    use Phase::*;
    use Trigger::*;

    match (from, trigger) {
        (Pending, Complete) => Some(Fulfilled),
        (Pending, CancelReturn) => Some(Returned),
        (Pending, Abort) => Some(Aborted),
        (Pending | Accepted, ProcessExpired) => Some(Expired),
        (Pending | Accepted, Freeze) => Some(Frozen),
        (Pending | Accepted, Lockdown) => Some(Locked),
        (Pending | Accepted, Dispute) => Some(Disputed),
        (Pending | Accepted, ModifyTimeframe | TransferOwnership) => Some(from),
        (Disputed, ResolveDispute) => Some(Resolved),
        (Disputed, SecureWithdrawal) => Some(Disputed),
        (Accepted, Complete | CancelReturn | Abort) => None,
        (Pending | Accepted, ResolveDispute | SecureWithdrawal) => None,
        (
            Disputed,
            Complete | CancelReturn | Abort | ProcessExpired | Freeze | Lockdown | Dispute
            | ModifyTimeframe | TransferOwnership,
        ) => None,
        (Frozen | Locked, _) => None,
        (Fulfilled | Returned | Aborted | Expired | Resolved, _) => None,
    }
}
