use crate::application::engine::EscrowEngine;
use crate::domain::identity::Amount;
use crate::error::{EscrowError, Result};
use crate::infrastructure::in_memory::{InMemoryLedger, ManualClock};
use crate::interfaces::csv::command_reader::{Command, ScheduledCommand};

/// Replays scheduled commands against an engine backed by a simulated
/// ledger and a hand-driven clock.
pub struct CommandRunner {
    engine: EscrowEngine,
    ledger: InMemoryLedger,
    clock: ManualClock,
}

impl CommandRunner {
    /// `ledger` and `clock` must be handles to the same instances the engine was built with.
    pub fn new(engine: EscrowEngine, ledger: InMemoryLedger, clock: ManualClock) -> Self {
        Self {
            engine,
            ledger,
            clock,
        }
    }

    pub fn engine(&self) -> &EscrowEngine {
        &self.engine
    }

    /// Credits custody with whatever the registry escrows beyond the current balance.
    ///
    /// The simulated ledger starts empty on every run while the registry may
    /// have been reloaded from disk. Returns the amount credited.
    pub async fn restore_custody(&self) -> Result<Amount> {
        let escrowed = self.engine.escrowed_total().await?;
        let missing = escrowed.saturating_sub(self.engine.custody_balance().await);
        if missing > 0 {
            self.ledger.credit(self.engine.custody(), missing).await;
            tracing::info!(amount = missing, escrowed, "custody restored from registry");
        }
        Ok(missing)
    }

    /// Moves the clock to the command's height and runs it.
    pub async fn run(&self, scheduled: ScheduledCommand) -> Result<()> {
        if !self.clock.set(scheduled.height) {
            return Err(EscrowError::BadParameter(format!(
                "Height {} is behind the clock",
                scheduled.height
            )));
        }

        let engine = &self.engine;
        let caller = &scheduled.caller;
        match scheduled.command {
            Command::Fund { amount } => {
                self.ledger.credit(caller, amount).await;
                Ok(())
            }
            Command::Create {
                seller,
                item,
                amount,
                tranches,
            } => engine
                .create_transaction(caller, &seller, item, amount, tranches)
                .await
                .map(|_| ()),
            Command::Complete { id } => engine.complete(caller, id).await,
            Command::Cancel { id } => engine.cancel_return(caller, id).await,
            Command::Abort { id } => engine.abort(caller, id).await,
            Command::Expire { id } => engine.process_expired(caller, id).await,
            Command::Freeze { id, duration } => engine.freeze(caller, id, duration).await,
            Command::Lockdown { id } => engine.lockdown(caller, id).await,
            Command::Dispute { id } => engine.dispute(caller, id).await,
            Command::Resolve {
                id,
                buyer_percentage,
            } => engine.resolve_dispute(caller, id, buyer_percentage).await,
            Command::Withdraw { id, amount, proof } => {
                engine.secure_withdrawal(caller, id, amount, &proof).await
            }
            Command::Extend { id, blocks } => engine.modify_timeframe(caller, id, blocks).await,
            Command::Transfer { id, new_buyer } => {
                engine.transfer_ownership(caller, id, &new_buyer).await
            }
            Command::MultiSignature {
                id,
                approvers,
                threshold,
            } => {
                engine
                    .setup_multi_signature(caller, id, &approvers, threshold)
                    .await
            }
            Command::RateLimit {
                id,
                max_operations,
                window,
            } => {
                engine
                    .configure_rate_limit(caller, id, max_operations, window)
                    .await
            }
            Command::Oracle { id, oracle } => engine.register_oracle(caller, id, &oracle).await,
            Command::Challenge { id, challenge } => {
                engine
                    .issue_verification_challenge(caller, id, &challenge)
                    .await
            }
            Command::Milestones { id, count } => engine.setup_milestones(caller, id, count).await,
            Command::Verify { id, proof } => engine.verify_proof(caller, id, &proof).await,
        }
    }
}
