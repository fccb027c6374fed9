use crate::domain::identity::TransactionId;
use crate::domain::ports::TransactionStore;
use crate::domain::transaction::TransactionRecord;
use crate::error::{EscrowError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;

/// Column Family for escrow records.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for registry metadata (the id counter).
pub const CF_META: &str = "meta";

const LAST_ID_KEY: &[u8] = b"last_id";

/// A persistent escrow registry backed by RocksDB.
///
/// Records are stored as JSON under big-endian ids so iteration follows id
/// order. The last allocated id is written in the same batch as the record.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("transactions" and "meta") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_transactions = ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default());
        let cf_meta = ColumnFamilyDescriptor::new(CF_META, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_transactions, cf_meta])?;
        tracing::debug!("opened escrow registry");

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            EscrowError::storage(std::io::Error::other(format!(
                "{name} column family not found"
            )))
        })
    }

    fn read_last_id(&self) -> Result<TransactionId> {
        let cf = self.cf(CF_META)?;
        match self.db.get_pinned_cf(cf, LAST_ID_KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
                    EscrowError::storage(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "corrupt last_id entry",
                    ))
                })?;
                Ok(TransactionId(u64::from_be_bytes(raw)))
            }
            None => Ok(TransactionId::default()),
        }
    }
}

#[async_trait]
impl TransactionStore for RocksDBStore {
    async fn store(&self, record: TransactionRecord) -> Result<()> {
        let records = self.cf(CF_TRANSACTIONS)?;
        let meta = self.cf(CF_META)?;

        let key = record.id.0.to_be_bytes();
        let value = serde_json::to_vec(&record)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(records, key, value);
        if record.id > self.read_last_id()? {
            batch.put_cf(meta, LAST_ID_KEY, key);
        }
        self.db.write(batch)?;

        Ok(())
    }

    async fn get(&self, id: TransactionId) -> Result<Option<TransactionRecord>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        match self.db.get_pinned_cf(cf, id.0.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn last_id(&self) -> Result<TransactionId> {
        self.read_last_id()
    }

    async fn all(&self) -> Result<Vec<TransactionRecord>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::{ItemId, Principal};
    use crate::domain::transaction::Phase;
    use tempfile::tempdir;

    fn record(id: u64) -> TransactionRecord {
        TransactionRecord::new(
            TransactionId(id),
            Principal::new("buyer").unwrap(),
            Principal::new("seller").unwrap(),
            ItemId(9),
            250,
            1,
            4,
            1440,
        )
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        assert!(store.db.cf_handle(CF_TRANSACTIONS).is_some());
        assert!(store.db.cf_handle(CF_META).is_some());
        assert_eq!(store.last_id().await.unwrap(), TransactionId(0));
    }

    #[tokio::test]
    async fn test_rocksdb_record_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        store.store(record(1)).await.unwrap();
        let mut updated = record(1);
        updated.phase = Phase::Disputed;
        store.store(updated.clone()).await.unwrap();

        assert_eq!(store.get(TransactionId(1)).await.unwrap(), Some(updated));
        assert!(store.get(TransactionId(2)).await.unwrap().is_none());
        assert_eq!(store.last_id().await.unwrap(), TransactionId(1));
    }

    #[tokio::test]
    async fn test_rocksdb_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            store.store(record(1)).await.unwrap();
            store.store(record(2)).await.unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        assert_eq!(store.last_id().await.unwrap(), TransactionId(2));
        let ids: Vec<_> = store.all().await.unwrap().iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
