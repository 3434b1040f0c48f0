//! Persistence layer for the Playbook Store

use crate::error::StoreError;
use crate::playbook::Playbook;
use crate::store::{LockOutcome, PlaybookStore};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::collections::HashMap;
use std::path::Path;

/// Sled-based implementation of PlaybookStore
pub struct SledPlaybookStore {
    db: sled::Db,
}

impl SledPlaybookStore {
    /// Open (or create) the playbook database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::Open(e.to_string()))?;
        Ok(Self { db })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }

    fn decode(value: &[u8]) -> Result<Playbook, StoreError> {
        bincode::deserialize(value).map_err(|e| StoreError::Codec(e.to_string()))
    }

    fn encode(playbook: &Playbook) -> Result<Vec<u8>, StoreError> {
        bincode::serialize(playbook).map_err(|e| StoreError::Codec(e.to_string()))
    }
}

impl PlaybookStore for SledPlaybookStore {
    fn get_all(&self) -> Result<HashMap<String, Playbook>, StoreError> {
        let mut playbooks = HashMap::new();
        for item in self.db.iter() {
            let (key, value) = item.map_err(|e| StoreError::Io(e.to_string()))?;
            let name = String::from_utf8_lossy(&key).to_string();
            playbooks.insert(name, Self::decode(&value)?);
        }
        Ok(playbooks)
    }

    fn get(&self, name: &str) -> Result<Option<Playbook>, StoreError> {
        match self
            .db
            .get(name.as_bytes())
            .map_err(|e| StoreError::Io(e.to_string()))?
        {
            Some(value) => Ok(Some(Self::decode(&value)?)),
            None => Ok(None),
        }
    }

    fn put(&self, playbook: &Playbook) -> Result<(), StoreError> {
        let value = Self::encode(playbook)?;
        self.db
            .insert(playbook.name.as_bytes(), value)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.db
            .remove(name.as_bytes())
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }

    fn try_lock(&self, name: &str, reason: &str) -> Result<LockOutcome, StoreError> {
        let result = self.db.transaction(|tx| {
            let key = name.as_bytes();
            let value = match tx.get(key)? {
                Some(value) => value,
                None => return Ok(LockOutcome::NotFound),
            };
            let mut playbook = Self::decode(&value).map_err(ConflictableTransactionError::Abort)?;
            if playbook.busy {
                return Ok(LockOutcome::Busy(playbook.busy_reason.clone()));
            }
            playbook.busy = true;
            playbook.busy_reason = reason.to_string();
            let encoded = Self::encode(&playbook).map_err(ConflictableTransactionError::Abort)?;
            tx.insert(key, encoded)?;
            Ok(LockOutcome::Acquired(playbook))
        });
        match result {
            Ok(outcome) => Ok(outcome),
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(StoreError::Io(err.to_string())),
        }
    }
}
