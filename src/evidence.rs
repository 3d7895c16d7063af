//! Hash-chained evidence log
//!
//! Every accepted state change appends one [`EvidenceEntry`]. Each entry's
//! `hash_snapshot` commits to its predecessor, so dropping, reordering or
//! editing an entry breaks every hash after it:
//!
//! ```text
//! hash0 = sha256(cbor[document_id, content, created_at])
//! hashN = sha256(cbor[hashN-1, event, timestamp, signer_id, content_digest])
//! content_digest = sha256(cbor[content, signature_data | null])
//! ```
//!
//! `signature_data` only takes part for `signed` entries.
use super::document::SignatureDocument;
use super::error::SignatureError;
use super::timestamp::TimeStamp;
use super::utils::{self, EVIDENCE_PREFIX};
use chrono::Utc;
use minicbor::Encoder;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvidenceEvent {
    #[n(0)]
    Created,
    #[n(1)]
    Sent,
    #[n(2)]
    Viewed,
    #[n(3)]
    Signed,
    #[n(4)]
    Rejected,
}

impl EvidenceEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Sent => "sent",
            Self::Viewed => "viewed",
            Self::Signed => "signed",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for EvidenceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct EvidenceEntry {
    #[n(0)]
    pub(crate) id: String,
    #[n(1)]
    pub(crate) signer_id: String, // the system actor for document-level events
    #[n(2)]
    pub(crate) event: EvidenceEvent,
    #[n(3)]
    pub(crate) timestamp: TimeStamp<Utc>,
    #[n(4)]
    pub(crate) actor_address: String,
    #[n(5)]
    pub(crate) detail: String,
    #[n(6)]
    pub(crate) hash_snapshot: String, // hex sha256
}

impl EvidenceEntry {
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn signer_id(&self) -> &str {
        &self.signer_id
    }
    pub fn event(&self) -> EvidenceEvent {
        self.event
    }
    pub fn timestamp(&self) -> &TimeStamp<Utc> {
        &self.timestamp
    }
    pub fn actor_address(&self) -> &str {
        &self.actor_address
    }
    pub fn detail(&self) -> &str {
        &self.detail
    }
    pub fn hash_snapshot(&self) -> &str {
        &self.hash_snapshot
    }
}

/// The fields of an entry that the caller chooses; id and hash are derived.
#[derive(Debug, Clone)]
pub struct EvidenceRecord {
    pub signer_id: String,
    pub event: EvidenceEvent,
    pub timestamp: TimeStamp<Utc>,
    pub actor_address: String,
    pub detail: String,
}

/// Append-only sequence of evidence entries. There is no API that edits or
/// removes an entry once it is in the log.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct EvidenceLog {
    #[n(0)]
    entries: Vec<EvidenceEntry>,
}

impl EvidenceLog {
    /// Opens a log with its `created` genesis entry.
    pub(crate) fn start(record: EvidenceRecord, genesis_hash: String) -> Result<Self, SignatureError> {
        if record.event != EvidenceEvent::Created {
            return Err(SignatureError::broken_chain(
                0,
                format!("genesis entry must be created, got {}", record.event),
            ));
        }
        let entry = seal(record, genesis_hash)?;

        Ok(Self {
            entries: vec![entry],
        })
    }

    /// Links a new entry to the current head and returns it.
    pub(crate) fn append(
        &mut self,
        record: EvidenceRecord,
        content_digest: &str,
    ) -> Result<&EvidenceEntry, SignatureError> {
        let index = self.entries.len();
        let prev = self
            .entries
            .last()
            .map(|e| e.hash_snapshot.as_str())
            .ok_or_else(|| SignatureError::broken_chain(index, "append before genesis"))?;
        if record.event == EvidenceEvent::Created {
            return Err(SignatureError::broken_chain(index, "created may only open a log"));
        }
        let hash = link_hash(
            prev,
            record.event,
            &record.timestamp,
            &record.signer_id,
            content_digest,
        )?;
        self.entries.push(seal(record, hash)?);

        Ok(&self.entries[index])
    }

    pub fn entries(&self) -> &[EvidenceEntry] {
        &self.entries
    }
    pub fn iter(&self) -> std::slice::Iter<'_, EvidenceEntry> {
        self.entries.iter()
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn last(&self) -> Option<&EvidenceEntry> {
        self.entries.last()
    }
    /// Hash of the newest entry, empty for a log that was never started.
    pub fn head(&self) -> &str {
        self.entries
            .last()
            .map(|e| e.hash_snapshot.as_str())
            .unwrap_or_default()
    }
    pub fn events(&self) -> Vec<EvidenceEvent> {
        self.entries.iter().map(|e| e.event).collect()
    }
}

impl<'a> IntoIterator for &'a EvidenceLog {
    type Item = &'a EvidenceEntry;
    type IntoIter = std::slice::Iter<'a, EvidenceEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn seal(record: EvidenceRecord, hash_snapshot: String) -> Result<EvidenceEntry, SignatureError> {
    Ok(EvidenceEntry {
        id: utils::new_uuid_to_bech32(EVIDENCE_PREFIX)?,
        signer_id: record.signer_id,
        event: record.event,
        timestamp: record.timestamp,
        actor_address: record.actor_address,
        detail: record.detail,
        hash_snapshot,
    })
}

pub fn genesis_hash(
    document_id: &str,
    content: &[u8],
    created_at: &TimeStamp<Utc>,
) -> Result<String, SignatureError> {
    let mut e = Encoder::new(Vec::new());
    e.array(3)?.str(document_id)?.bytes(content)?.encode(created_at)?;

    Ok(sha256::digest(e.into_writer()))
}

pub fn link_hash(
    prev_hash: &str,
    event: EvidenceEvent,
    timestamp: &TimeStamp<Utc>,
    signer_id: &str,
    content_digest: &str,
) -> Result<String, SignatureError> {
    let mut e = Encoder::new(Vec::new());
    e.array(5)?
        .str(prev_hash)?
        .str(event.as_str())?
        .encode(timestamp)?
        .str(signer_id)?
        .str(content_digest)?;

    Ok(sha256::digest(e.into_writer()))
}

pub fn content_digest(content: &[u8], signature: Option<&[u8]>) -> Result<String, SignatureError> {
    let mut e = Encoder::new(Vec::new());
    e.array(2)?.bytes(content)?;
    match signature {
        Some(sig) => e.bytes(sig)?,
        None => e.null()?,
    };

    Ok(sha256::digest(e.into_writer()))
}

fn check_hash_format(index: usize, hash: &str) -> Result<(), SignatureError> {
    match hex::decode(hash) {
        Ok(bytes) if bytes.len() == 32 => Ok(()),
        Ok(bytes) => Err(SignatureError::broken_chain(
            index,
            format!("hash snapshot is {} bytes, expected 32", bytes.len()),
        )),
        Err(e) => Err(SignatureError::broken_chain(
            index,
            format!("hash snapshot is not hex: {e}"),
        )),
    }
}

/// Recomputes every hash from the stored fields and compares it with the stored
/// snapshot and finally with `current_hash`. Returns the first mismatch.
pub fn verify_chain(doc: &SignatureDocument) -> Result<(), SignatureError> {
    let entries = doc.evidence.entries();
    let Some(genesis) = entries.first() else {
        return Err(SignatureError::broken_chain(0, "evidence log is empty"));
    };
    if genesis.event != EvidenceEvent::Created {
        return Err(SignatureError::broken_chain(
            0,
            format!("log opens with {} instead of created", genesis.event),
        ));
    }
    check_hash_format(0, &genesis.hash_snapshot)?;
    if genesis.timestamp != doc.created_at {
        return Err(SignatureError::broken_chain(
            0,
            "genesis timestamp differs from the creation time",
        ));
    }

    let mut expected = genesis_hash(&doc.id, &doc.content, &doc.created_at)?;
    if expected != genesis.hash_snapshot {
        return Err(SignatureError::broken_chain(0, "genesis hash mismatch"));
    }

    for (index, entry) in entries.iter().enumerate().skip(1) {
        check_hash_format(index, &entry.hash_snapshot)?;

        let signature = match entry.event {
            EvidenceEvent::Created => {
                return Err(SignatureError::broken_chain(index, "created entry after genesis"));
            }
            EvidenceEvent::Signed => Some(
                doc.signer(&entry.signer_id)
                    .and_then(|s| s.signature_data())
                    .ok_or_else(|| {
                        SignatureError::broken_chain(
                            index,
                            format!("no signature data for signer {}", entry.signer_id),
                        )
                    })?,
            ),
            _ => None,
        };
        let digest = content_digest(&doc.content, signature)?;
        expected = link_hash(
            &expected,
            entry.event,
            &entry.timestamp,
            &entry.signer_id,
            &digest,
        )?;

        if expected != entry.hash_snapshot {
            return Err(SignatureError::broken_chain(
                index,
                format!("{} entry hash mismatch", entry.event),
            ));
        }
    }

    if expected != doc.current_hash {
        return Err(SignatureError::broken_chain(
            entries.len() - 1,
            "current hash does not match the chain head",
        ));
    }

    Ok(())
}
