//! Advisory operations.
//!
//! Each of these checks its inputs against an existing record and emits an
//! `Advisory` audit event. None of them writes the registry or moves funds.

use super::engine::EscrowEngine;
use crate::domain::event::EventDetail;
use crate::domain::identity::{Principal, TransactionId};
use crate::domain::lifecycle::Roles;
use crate::domain::transaction::TransactionRecord;
use crate::error::{EscrowError, Result};
use std::collections::HashSet;

const MAX_APPROVERS: usize = 5;
const MAX_CHALLENGE_LEN: usize = 64;

impl EscrowEngine {
    /// Validates a multi-signature approver set. Approvers are not stored.
    pub async fn setup_multi_signature(
        &self,
        caller: &Principal,
        id: TransactionId,
        approvers: &[Principal],
        threshold: u8,
    ) -> Result<()> {
        let operation = "setup_multi_signature";
        let (record, roles) = self.advisory_target(caller, id).await?;
        require(roles.admin || roles.is_party(), caller, operation)?;

        if approvers.is_empty() || approvers.len() > MAX_APPROVERS {
            return Err(EscrowError::BadParameter(format!(
                "Between 1 and {MAX_APPROVERS} approvers are required, got {}",
                approvers.len()
            )));
        }
        let distinct: HashSet<_> = approvers.iter().collect();
        if distinct.len() != approvers.len() {
            return Err(EscrowError::BadParameter(
                "Approvers must be distinct".to_string(),
            ));
        }
        if threshold == 0 || usize::from(threshold) > approvers.len() {
            return Err(EscrowError::BadParameter(format!(
                "Threshold must be within 1..={}, got {threshold}",
                approvers.len()
            )));
        }

        self.advise(
            operation,
            &record,
            caller,
            format!("{threshold}-of-{} approval requested", approvers.len()),
        );
        Ok(())
    }

    /// Validates rate-limit parameters. No counters are kept.
    pub async fn configure_rate_limit(
        &self,
        caller: &Principal,
        id: TransactionId,
        max_operations: u32,
        window_blocks: u64,
    ) -> Result<()> {
        let operation = "configure_rate_limit";
        let (record, roles) = self.advisory_target(caller, id).await?;
        require(roles.admin, caller, operation)?;

        if max_operations == 0 {
            return Err(EscrowError::BadParameter(
                "Rate limit must allow at least one operation".to_string(),
            ));
        }
        if window_blocks == 0 || window_blocks > self.config.max_extension {
            return Err(EscrowError::BadParameter(format!(
                "Rate-limit window must be within 1..={}, got {window_blocks}",
                self.config.max_extension
            )));
        }

        self.advise(
            operation,
            &record,
            caller,
            format!("{max_operations} operations per {window_blocks} blocks"),
        );
        Ok(())
    }

    /// Validates an oracle nomination by one of the parties.
    pub async fn register_oracle(
        &self,
        caller: &Principal,
        id: TransactionId,
        oracle: &Principal,
    ) -> Result<()> {
        let operation = "register_oracle";
        let (record, roles) = self.advisory_target(caller, id).await?;
        require(roles.is_party(), caller, operation)?;

        if oracle == &record.buyer || oracle == &record.seller || oracle == self.custody() {
            return Err(EscrowError::InvalidCounterparty(oracle.clone()));
        }

        self.advise(operation, &record, caller, format!("oracle {oracle} nominated"));
        Ok(())
    }

    pub async fn issue_verification_challenge(
        &self,
        caller: &Principal,
        id: TransactionId,
        challenge: &[u8],
    ) -> Result<()> {
        let operation = "issue_verification_challenge";
        let (record, roles) = self.advisory_target(caller, id).await?;
        require(roles.is_party(), caller, operation)?;

        if challenge.is_empty() || challenge.len() > MAX_CHALLENGE_LEN {
            return Err(EscrowError::BadParameter(format!(
                "Challenge must be 1..={MAX_CHALLENGE_LEN} bytes, got {}",
                challenge.len()
            )));
        }

        self.advise(
            operation,
            &record,
            caller,
            format!("{}-byte challenge issued", challenge.len()),
        );
        Ok(())
    }

    /// Validates a milestone plan against the tranche count chosen at creation.
    pub async fn setup_milestones(
        &self,
        caller: &Principal,
        id: TransactionId,
        count: u8,
    ) -> Result<()> {
        let operation = "setup_milestones";
        let (record, roles) = self.advisory_target(caller, id).await?;
        require(roles.buyer, caller, operation)?;

        if count == 0 || count > record.tranche_count {
            return Err(EscrowError::BadParameter(format!(
                "Milestone count must be within 1..={}, got {count}",
                record.tranche_count
            )));
        }

        self.advise(operation, &record, caller, format!("{count} milestones planned"));
        Ok(())
    }

    /// Placeholder proof check: any non-empty proof passes.
    pub async fn verify_proof(
        &self,
        caller: &Principal,
        id: TransactionId,
        proof: &[u8],
    ) -> Result<()> {
        let operation = "verify_proof";
        let (record, _) = self.advisory_target(caller, id).await?;

        if proof.is_empty() {
            return Err(EscrowError::BadParameter(
                "Proof must not be empty".to_string(),
            ));
        }

        self.advise(
            operation,
            &record,
            caller,
            format!("{}-byte proof accepted", proof.len()),
        );
        Ok(())
    }

    async fn advisory_target(
        &self,
        caller: &Principal,
        id: TransactionId,
    ) -> Result<(TransactionRecord, Roles)> {
        let record = self.load(id).await?;
        let roles = Roles::of(caller, &self.config.admin, &record);
        Ok((record, roles))
    }

    fn advise(
        &self,
        operation: &'static str,
        record: &TransactionRecord,
        caller: &Principal,
        summary: String,
    ) {
        tracing::debug!(id = record.id.0, operation, %summary, "advisory call");
        self.emit(
            operation,
            record.id,
            caller,
            self.now(),
            EventDetail::Advisory { summary },
        );
    }
}

fn require(allowed: bool, caller: &Principal, operation: &'static str) -> Result<()> {
    if allowed {
        Ok(())
    } else {
        Err(EscrowError::NotPermitted {
            caller: caller.clone(),
            operation,
        })
    }
}
