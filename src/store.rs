//! Persistence for signature documents with optimistic concurrency
//!
//! A save names the version it read. If the stored version moved on in the
//! meantime the save fails with [`SignatureError::Conflict`] and nothing is
//! written; the caller reloads and retries.
use super::document::SignatureDocument;
use super::error::SignatureError;
use sled::transaction::{ConflictableTransactionError, TransactionError, abort};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const ACTIVE_PREFIX: &str = "doc/";
const ARCHIVE_PREFIX: &str = "archive/";

pub trait DocumentStore {
    /// Returns the aggregate together with the version it was stored at.
    fn load(&self, document_id: &str) -> Result<(SignatureDocument, u64), SignatureError>;
    /// Stores a brand new aggregate. Fails with `Conflict` if the id is taken.
    fn insert(&self, doc: &SignatureDocument) -> Result<(), SignatureError>;
    /// Replaces the aggregate only if the stored version is still `expected_version`.
    fn save(&self, doc: &SignatureDocument, expected_version: u64) -> Result<(), SignatureError>;
    /// Removes the aggregate from the active set. The record, and with it the
    /// evidence log, is kept in the archive.
    fn delete(&self, document_id: &str, expected_version: u64) -> Result<(), SignatureError>;
    fn load_archived(&self, document_id: &str) -> Result<SignatureDocument, SignatureError>;
    /// Ids of all active documents.
    fn list(&self) -> Result<Vec<String>, SignatureError>;
}

fn active_key(document_id: &str) -> String {
    format!("{ACTIVE_PREFIX}{document_id}")
}

fn archive_key(document_id: &str) -> String {
    format!("{ARCHIVE_PREFIX}{document_id}")
}

fn conflict(document_id: &str, expected: Option<u64>, found: Option<u64>) -> SignatureError {
    SignatureError::Conflict {
        document_id: document_id.to_string(),
        expected,
        found,
    }
}

/// sled-backed store. Each write runs in a sled transaction that re-reads
/// the stored version first.
pub struct SledStore {
    instance: Arc<sled::Db>,
}

impl SledStore {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    fn transact<F>(&self, f: F) -> Result<(), SignatureError>
    where
        F: Fn(&sled::transaction::TransactionalTree) -> Result<(), ConflictableTransactionError<SignatureError>>,
    {
        let result = self.instance.transaction(f);
        match result {
            Ok(()) => {
                self.instance.flush()?;
                Ok(())
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }
}

fn decode_version(bytes: &[u8]) -> Result<u64, ConflictableTransactionError<SignatureError>> {
    minicbor::decode::<SignatureDocument>(bytes)
        .map(|doc| doc.version)
        .or_else(|e| abort(SignatureError::from(e)))
}

impl DocumentStore for SledStore {
    fn load(&self, document_id: &str) -> Result<(SignatureDocument, u64), SignatureError> {
        let bytes = self
            .instance
            .get(active_key(document_id))?
            .ok_or_else(|| SignatureError::not_found("document", document_id))?;
        let doc: SignatureDocument = minicbor::decode(&bytes)?;
        let version = doc.version;

        Ok((doc, version))
    }

    fn insert(&self, doc: &SignatureDocument) -> Result<(), SignatureError> {
        let key = active_key(&doc.id);
        let cbor = minicbor::to_vec(doc)?;

        self.transact(|tx| {
            if let Some(existing) = tx.get(&key)? {
                let found = decode_version(&existing)?;
                return abort(conflict(&doc.id, None, Some(found)));
            }
            tx.insert(key.as_bytes(), cbor.as_slice())?;
            Ok(())
        })?;
        tracing::debug!(document_id = %doc.id, "inserted document");

        Ok(())
    }

    fn save(&self, doc: &SignatureDocument, expected_version: u64) -> Result<(), SignatureError> {
        let key = active_key(&doc.id);
        let cbor = minicbor::to_vec(doc)?;

        self.transact(|tx| {
            let Some(existing) = tx.get(&key)? else {
                return abort(SignatureError::not_found("document", doc.id.as_str()));
            };
            let found = decode_version(&existing)?;
            if found != expected_version {
                return abort(conflict(&doc.id, Some(expected_version), Some(found)));
            }
            tx.insert(key.as_bytes(), cbor.as_slice())?;
            Ok(())
        })?;
        tracing::debug!(document_id = %doc.id, version = doc.version, "saved document");

        Ok(())
    }

    fn delete(&self, document_id: &str, expected_version: u64) -> Result<(), SignatureError> {
        let key = active_key(document_id);
        let archived = archive_key(document_id);

        self.transact(|tx| {
            let Some(existing) = tx.get(&key)? else {
                return abort(SignatureError::not_found("document", document_id));
            };
            let found = decode_version(&existing)?;
            if found != expected_version {
                return abort(conflict(document_id, Some(expected_version), Some(found)));
            }
            tx.remove(key.as_bytes())?;
            tx.insert(archived.as_bytes(), existing)?;
            Ok(())
        })?;
        tracing::debug!(document_id, "archived document");

        Ok(())
    }

    fn load_archived(&self, document_id: &str) -> Result<SignatureDocument, SignatureError> {
        let bytes = self
            .instance
            .get(archive_key(document_id))?
            .ok_or_else(|| SignatureError::not_found("archived document", document_id))?;

        Ok(minicbor::decode(&bytes)?)
    }

    fn list(&self) -> Result<Vec<String>, SignatureError> {
        self.instance
            .scan_prefix(ACTIVE_PREFIX)
            .keys()
            .map(|key| {
                let key = key?;
                Ok(String::from_utf8_lossy(&key[ACTIVE_PREFIX.len()..]).into_owned())
            })
            .collect()
    }
}

/// In-process store with the same contract as [`SledStore`].
#[derive(Default)]
pub struct MemoryStore {
    active: Mutex<HashMap<String, SignatureDocument>>,
    archive: Mutex<HashMap<String, SignatureDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// every write below is a single map operation, so a poisoned map is still whole
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DocumentStore for MemoryStore {
    fn load(&self, document_id: &str) -> Result<(SignatureDocument, u64), SignatureError> {
        let active = lock(&self.active);
        let doc = active
            .get(document_id)
            .cloned()
            .ok_or_else(|| SignatureError::not_found("document", document_id))?;
        let version = doc.version;

        Ok((doc, version))
    }

    fn insert(&self, doc: &SignatureDocument) -> Result<(), SignatureError> {
        let mut active = lock(&self.active);
        if let Some(existing) = active.get(&doc.id) {
            return Err(conflict(&doc.id, None, Some(existing.version)));
        }
        active.insert(doc.id.clone(), doc.clone());

        Ok(())
    }

    fn save(&self, doc: &SignatureDocument, expected_version: u64) -> Result<(), SignatureError> {
        let mut active = lock(&self.active);
        let stored = active
            .get_mut(&doc.id)
            .ok_or_else(|| SignatureError::not_found("document", doc.id.as_str()))?;
        if stored.version != expected_version {
            return Err(conflict(&doc.id, Some(expected_version), Some(stored.version)));
        }
        *stored = doc.clone();

        Ok(())
    }

    fn delete(&self, document_id: &str, expected_version: u64) -> Result<(), SignatureError> {
        let mut active = lock(&self.active);
        let found = active
            .get(document_id)
            .map(|d| d.version)
            .ok_or_else(|| SignatureError::not_found("document", document_id))?;
        if found != expected_version {
            return Err(conflict(document_id, Some(expected_version), Some(found)));
        }
        if let Some(doc) = active.remove(document_id) {
            lock(&self.archive).insert(document_id.to_string(), doc);
        }

        Ok(())
    }

    fn load_archived(&self, document_id: &str) -> Result<SignatureDocument, SignatureError> {
        lock(&self.archive)
            .get(document_id)
            .cloned()
            .ok_or_else(|| SignatureError::not_found("archived document", document_id))
    }

    fn list(&self) -> Result<Vec<String>, SignatureError> {
        let mut ids: Vec<String> = lock(&self.active).keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    fn load(&self, document_id: &str) -> Result<(SignatureDocument, u64), SignatureError> {
        (**self).load(document_id)
    }
    fn insert(&self, doc: &SignatureDocument) -> Result<(), SignatureError> {
        (**self).insert(doc)
    }
    fn save(&self, doc: &SignatureDocument, expected_version: u64) -> Result<(), SignatureError> {
        (**self).save(doc, expected_version)
    }
    fn delete(&self, document_id: &str, expected_version: u64) -> Result<(), SignatureError> {
        (**self).delete(document_id, expected_version)
    }
    fn load_archived(&self, document_id: &str) -> Result<SignatureDocument, SignatureError> {
        (**self).load_archived(document_id)
    }
    fn list(&self) -> Result<Vec<String>, SignatureError> {
        (**self).list()
    }
}
