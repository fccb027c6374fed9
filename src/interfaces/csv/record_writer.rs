use crate::domain::transaction::TransactionRecord;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct RecordRow<'a> {
    id: u64,
    buyer: &'a str,
    seller: &'a str,
    item: u64,
    amount: u64,
    phase: &'static str,
    created_at: u64,
    expires_at: u64,
}

impl<'a> From<&'a TransactionRecord> for RecordRow<'a> {
    fn from(record: &'a TransactionRecord) -> Self {
        Self {
            id: record.id.0,
            buyer: record.buyer.as_str(),
            seller: record.seller.as_str(),
            item: record.item.0,
            amount: record.amount,
            phase: record.phase.as_str(),
            created_at: record.created_at,
            expires_at: record.expires_at,
        }
    }
}

/// Writes registry records as CSV.
pub struct RecordWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes the header and one row per record, then flushes.
    pub fn write_records(&mut self, records: &[TransactionRecord]) -> Result<()> {
        if records.is_empty() {
            self.writer.write_record([
                "id",
                "buyer",
                "seller",
                "item",
                "amount",
                "phase",
                "created_at",
                "expires_at",
            ])?;
        }
        for record in records {
            self.writer.serialize(RecordRow::from(record))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
