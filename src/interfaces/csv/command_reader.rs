use crate::domain::identity::{Amount, Height, ItemId, Principal, TransactionId};
use crate::error::{EscrowError, Result};
use serde::Deserialize;
use std::io::Read;

/// Operation column of the command file.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Fund,
    Create,
    Complete,
    Cancel,
    Abort,
    Expire,
    Freeze,
    Lockdown,
    Dispute,
    Resolve,
    Withdraw,
    Extend,
    Transfer,
    Multisig,
    Ratelimit,
    Oracle,
    Challenge,
    Milestones,
    Verify,
}

/// One raw line of the command file.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct CommandRow {
    pub height: Height,
    pub op: CommandKind,
    pub caller: Principal,
    pub id: Option<u64>,
    pub party: Option<Principal>,
    pub item: Option<u64>,
    pub amount: Option<Amount>,
    pub value: Option<u64>,
    pub data: Option<String>,
}

/// A validated command, ready to run against the engine.
#[derive(Debug, PartialEq, Clone)]
pub enum Command {
    Fund { amount: Amount },
    Create { seller: Principal, item: ItemId, amount: Amount, tranches: u8 },
    Complete { id: TransactionId },
    Cancel { id: TransactionId },
    Abort { id: TransactionId },
    Expire { id: TransactionId },
    Freeze { id: TransactionId, duration: Height },
    Lockdown { id: TransactionId },
    Dispute { id: TransactionId },
    Resolve { id: TransactionId, buyer_percentage: u8 },
    Withdraw { id: TransactionId, amount: Amount, proof: Vec<u8> },
    Extend { id: TransactionId, blocks: Height },
    Transfer { id: TransactionId, new_buyer: Principal },
    MultiSignature { id: TransactionId, approvers: Vec<Principal>, threshold: u8 },
    RateLimit { id: TransactionId, max_operations: u32, window: Height },
    Oracle { id: TransactionId, oracle: Principal },
    Challenge { id: TransactionId, challenge: Vec<u8> },
    Milestones { id: TransactionId, count: u8 },
    Verify { id: TransactionId, proof: Vec<u8> },
}

/// A command together with who issued it and at which height.
#[derive(Debug, PartialEq, Clone)]
pub struct ScheduledCommand {
    pub height: Height,
    pub caller: Principal,
    pub command: Command,
}

impl TryFrom<CommandRow> for ScheduledCommand {
    type Error = EscrowError;

    fn try_from(row: CommandRow) -> Result<Self> {
        let op = row.op;
        let id = || row.id.map(TransactionId).ok_or_else(|| missing(op, "id"));
        let value = || row.value.ok_or_else(|| missing(op, "value"));
        let small = || value().and_then(|v| narrow(op, v));
        let party = || row.party.clone().ok_or_else(|| missing(op, "party"));
        let data = || {
            row.data
                .clone()
                .map(String::into_bytes)
                .ok_or_else(|| missing(op, "data"))
        };

        let command = match op {
            CommandKind::Fund => Command::Fund {
                amount: row.amount.ok_or_else(|| missing(op, "amount"))?,
            },
            CommandKind::Create => Command::Create {
                seller: party()?,
                item: ItemId(row.item.ok_or_else(|| missing(op, "item"))?),
                amount: row.amount.ok_or_else(|| missing(op, "amount"))?,
                tranches: row.value.map_or(Ok(1), |v| narrow(op, v))?,
            },
            CommandKind::Complete => Command::Complete { id: id()? },
            CommandKind::Cancel => Command::Cancel { id: id()? },
            CommandKind::Abort => Command::Abort { id: id()? },
            CommandKind::Expire => Command::Expire { id: id()? },
            CommandKind::Freeze => Command::Freeze {
                id: id()?,
                duration: value()?,
            },
            CommandKind::Lockdown => Command::Lockdown { id: id()? },
            CommandKind::Dispute => Command::Dispute { id: id()? },
            CommandKind::Resolve => Command::Resolve {
                id: id()?,
                buyer_percentage: small()?,
            },
            CommandKind::Withdraw => Command::Withdraw {
                id: id()?,
                amount: row.amount.ok_or_else(|| missing(op, "amount"))?,
                proof: data()?,
            },
            CommandKind::Extend => Command::Extend {
                id: id()?,
                blocks: value()?,
            },
            CommandKind::Transfer => Command::Transfer {
                id: id()?,
                new_buyer: party()?,
            },
            CommandKind::Multisig => Command::MultiSignature {
                id: id()?,
                approvers: parse_approvers(row.data.as_deref().unwrap_or_default())?,
                threshold: small()?,
            },
            CommandKind::Ratelimit => Command::RateLimit {
                id: id()?,
                max_operations: u32::try_from(row.amount.ok_or_else(|| missing(op, "amount"))?)
                    .map_err(|_| EscrowError::BadParameter("max operations too large".into()))?,
                window: value()?,
            },
            CommandKind::Oracle => Command::Oracle {
                id: id()?,
                oracle: party()?,
            },
            CommandKind::Challenge => Command::Challenge {
                id: id()?,
                challenge: data()?,
            },
            CommandKind::Milestones => Command::Milestones {
                id: id()?,
                count: small()?,
            },
            CommandKind::Verify => Command::Verify {
                id: id()?,
                proof: data()?,
            },
        };

        Ok(Self {
            height: row.height,
            caller: row.caller,
            command,
        })
    }
}

fn missing(op: CommandKind, field: &str) -> EscrowError {
    EscrowError::BadParameter(format!("{op:?} requires `{field}`"))
}

fn narrow(op: CommandKind, value: u64) -> Result<u8> {
    u8::try_from(value)
        .map_err(|_| EscrowError::BadParameter(format!("{op:?} value {value} is out of range")))
}

fn parse_approvers(raw: &str) -> Result<Vec<Principal>> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Principal::new)
        .collect()
}

/// Reads escrow commands from a CSV source.
///
/// Whitespace is trimmed and trailing empty columns may be omitted.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    /// Creates a new `CommandReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads, deserializes and validates each command.
    pub fn commands(self) -> impl Iterator<Item = Result<ScheduledCommand>> {
        self.reader.into_deserialize().map(|result| {
            result
                .map_err(EscrowError::from)
                .and_then(|row: CommandRow| ScheduledCommand::try_from(row))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "height, op, caller, id, party, item, amount, value, data\n";

    fn read(body: &str) -> Vec<Result<ScheduledCommand>> {
        let data = format!("{HEADER}{body}");
        CommandReader::new(data.as_bytes()).commands().collect()
    }

    #[test]
    fn test_reader_valid_stream() {
        let results = read("0, fund, alice, , , , 500, ,\n1, create, alice, , bob, 7, 500, 1,\n");
        assert_eq!(results.len(), 2);

        let create = results[1].as_ref().unwrap();
        assert_eq!(create.height, 1);
        assert_eq!(create.caller.as_str(), "alice");
        assert_eq!(
            create.command,
            Command::Create {
                seller: Principal::new("bob").unwrap(),
                item: ItemId(7),
                amount: 500,
                tranches: 1,
            }
        );
    }

    #[test]
    fn test_reader_short_rows() {
        let results = read("5, complete, alice, 1\n");
        assert_eq!(
            results[0].as_ref().unwrap().command,
            Command::Complete { id: TransactionId(1) }
        );
    }

    #[test]
    fn test_reader_missing_field() {
        let results = read("5, resolve, admin, 1, , , , ,\n");
        assert!(matches!(results[0], Err(EscrowError::BadParameter(_))));
    }

    #[test]
    fn test_reader_malformed_line() {
        let results = read("0, explode, alice, 1, , , , ,\nx, fund, alice, , , , 1, ,\n");
        assert!(matches!(results[0], Err(EscrowError::Csv(_))));
        assert!(results[1].is_err());
    }

    #[test]
    fn test_reader_approvers() {
        let results = read("0, multisig, alice, 1, , , , 2, x;y; z\n");
        match &results[0].as_ref().unwrap().command {
            Command::MultiSignature { approvers, threshold, .. } => {
                assert_eq!(approvers.len(), 3);
                assert_eq!(*threshold, 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
