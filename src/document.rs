//! The signature document aggregate and its construction-time validation
use super::config::EngineConfig;
use super::error::{SignatureError, ValidationError};
use super::evidence::{self, EvidenceEvent, EvidenceLog, EvidenceRecord};
use super::sequencing;
use super::timestamp::TimeStamp;
use super::utils::{self, DOCUMENT_PREFIX, SIGNER_PREFIX};
use chrono::Utc;
use minicbor::bytes::ByteVec;
use std::collections::HashSet;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Sent,
    #[n(2)]
    InProgress,
    #[n(3)]
    Signed,
    #[n(4)]
    Rejected,
}

impl DocumentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Signed | Self::Rejected)
    }
    /// `Sent` and `InProgress` both wait on a signer; they differ only for display.
    pub fn is_awaiting_action(self) -> bool {
        matches!(self, Self::Sent | Self::InProgress)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OriginKind {
    #[n(0)]
    #[default]
    Upload,
    #[n(1)]
    Template,
    #[n(2)]
    Editor,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Signed,
    #[n(2)]
    Rejected,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Signer {
    #[n(0)]
    pub(crate) id: String, // bech32m, `signer_` prefix
    #[n(1)]
    pub(crate) name: String,
    #[n(2)]
    pub(crate) email: String,
    #[n(3)]
    pub(crate) role: String,
    #[n(4)]
    pub(crate) sequence: u32, // 1-based signing order
    #[n(5)]
    pub(crate) status: SignerStatus,
    #[n(6)]
    pub(crate) signed_at: Option<TimeStamp<Utc>>,
    #[n(7)]
    pub(crate) signature_data: Option<ByteVec>,
}

impl Signer {
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn email(&self) -> &str {
        &self.email
    }
    pub fn role(&self) -> &str {
        &self.role
    }
    pub fn sequence(&self) -> u32 {
        self.sequence
    }
    pub fn status(&self) -> SignerStatus {
        self.status
    }
    pub fn signed_at(&self) -> Option<&TimeStamp<Utc>> {
        self.signed_at.as_ref()
    }
    pub fn signature_data(&self) -> Option<&[u8]> {
        self.signature_data.as_deref().map(Vec::as_slice)
    }
}

/// Aggregate root. Every field changes only through the workflow engine.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct SignatureDocument {
    #[n(0)]
    pub(crate) id: String,
    #[n(1)]
    pub(crate) title: String,
    #[n(2)]
    pub(crate) description: String,
    #[n(3)]
    pub(crate) content: ByteVec,
    #[n(4)]
    pub(crate) origin: OriginKind,
    #[n(5)]
    pub(crate) status: DocumentStatus,
    #[n(6)]
    pub(crate) created_by: String,
    #[n(7)]
    pub(crate) created_at: TimeStamp<Utc>,
    #[n(8)]
    pub(crate) updated_at: TimeStamp<Utc>,
    #[n(9)]
    pub(crate) version: u64,
    #[n(10)]
    pub(crate) current_hash: String,
    #[n(11)]
    pub(crate) signers: Vec<Signer>,
    #[n(12)]
    pub(crate) evidence: EvidenceLog,
}

impl SignatureDocument {
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn description(&self) -> &str {
        &self.description
    }
    pub fn content(&self) -> &[u8] {
        &self.content
    }
    pub fn origin(&self) -> OriginKind {
        self.origin
    }
    pub fn status(&self) -> DocumentStatus {
        self.status
    }
    pub fn created_by(&self) -> &str {
        &self.created_by
    }
    pub fn created_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
    pub fn updated_at(&self) -> &TimeStamp<Utc> {
        &self.updated_at
    }
    pub fn version(&self) -> u64 {
        self.version
    }
    pub fn current_hash(&self) -> &str {
        &self.current_hash
    }
    pub fn signers(&self) -> &[Signer] {
        &self.signers
    }
    pub fn evidence(&self) -> &EvidenceLog {
        &self.evidence
    }
    pub fn signer(&self, signer_id: &str) -> Option<&Signer> {
        self.signers.iter().find(|s| s.id == signer_id)
    }
    pub fn signer_by_email(&self, email: &str) -> Option<&Signer> {
        let wanted = normalise_email(email);
        self.signers
            .iter()
            .find(|s| normalise_email(&s.email) == wanted)
    }
    pub(crate) fn signer_mut(&mut self, signer_id: &str) -> Option<&mut Signer> {
        self.signers.iter_mut().find(|s| s.id == signer_id)
    }
    /// Signed signer count and total signer count.
    pub fn progress(&self) -> (usize, usize) {
        let signed = self
            .signers
            .iter()
            .filter(|s| s.status == SignerStatus::Signed)
            .count();
        (signed, self.signers.len())
    }
    /// A sealed document accepts no further mutation.
    pub fn is_sealed(&self) -> bool {
        self.status.is_terminal()
    }

    /// Human readable audit trail, one line per evidence entry.
    pub fn view_history(&self) -> String {
        self.evidence
            .iter()
            .map(|entry| {
                format!(
                    "[{}] {} by {} from '{}': {} ({})",
                    entry.timestamp(),
                    entry.event(),
                    entry.signer_id(),
                    entry.actor_address(),
                    entry.detail(),
                    entry.hash_snapshot().chars().take(12).collect::<String>(),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Re-checks the structural invariants of a loaded aggregate. The hash
    /// chain itself is checked by [`evidence::verify_chain`].
    pub fn check_invariants(&self) -> Result<(), SignatureError> {
        let last = self.evidence.len().saturating_sub(1);
        let broken = |reason: String| SignatureError::broken_chain(last, reason);

        if self.signers.is_empty() {
            return Err(broken("document has no signers".into()));
        }
        let mut sequences: Vec<u32> = self.signers.iter().map(|s| s.sequence).collect();
        sequences.sort_unstable();
        if sequences.iter().zip(1u32..).any(|(seq, want)| *seq != want) {
            return Err(broken(format!(
                "signer sequences are not contiguous from 1: {sequences:?}"
            )));
        }
        let mut emails = HashSet::new();
        if let Some(dup) = self
            .signers
            .iter()
            .find(|s| !emails.insert(normalise_email(&s.email)))
        {
            return Err(broken(format!("duplicate signer email {}", dup.email)));
        }

        match self.evidence.last() {
            Some(entry) if entry.hash_snapshot() == self.current_hash => {}
            _ => return Err(broken("current hash does not match the last evidence entry".into())),
        }
        // one version bump per appended entry
        if self.version as usize != last {
            return Err(broken(format!(
                "version {} does not match {} evidence entries",
                self.version,
                self.evidence.len()
            )));
        }

        for signer in &self.signers {
            self.check_signer_against_evidence(signer, last)?;
        }
        if !sequencing::signed_in_sequence(self) {
            return Err(broken("signatures are out of sequence order".into()));
        }

        let all_signed = self
            .signers
            .iter()
            .all(|s| s.status == SignerStatus::Signed);
        let any_rejected = self
            .signers
            .iter()
            .any(|s| s.status == SignerStatus::Rejected);
        if (self.status == DocumentStatus::Signed) != all_signed {
            return Err(broken(format!(
                "status {:?} disagrees with signer states",
                self.status
            )));
        }
        if (self.status == DocumentStatus::Rejected) != any_rejected {
            return Err(broken(format!(
                "status {:?} disagrees with signer rejections",
                self.status
            )));
        }
        if self.status == DocumentStatus::Pending
            && self.signers.iter().any(|s| s.status != SignerStatus::Pending)
        {
            return Err(broken("a signer acted before the document was sent".into()));
        }

        Ok(())
    }
}

impl SignatureDocument {
    /// A signer's stored state must be exactly what their evidence entries say.
    fn check_signer_against_evidence(&self, signer: &Signer, last: usize) -> Result<(), SignatureError> {
        let broken = |reason: String| SignatureError::broken_chain(last, reason);
        let mut signed = Vec::new();
        let mut rejections = 0usize;
        for entry in self.evidence.iter().filter(|e| e.signer_id == signer.id) {
            match entry.event {
                EvidenceEvent::Signed => signed.push(entry),
                EvidenceEvent::Rejected => rejections += 1,
                _ => {}
            }
        }

        match (signer.status, signed.as_slice(), rejections) {
            (SignerStatus::Signed, [entry], 0) => {
                if signer.signed_at.as_ref() != Some(&entry.timestamp) {
                    return Err(broken(format!(
                        "signer {} signed_at disagrees with the signed entry",
                        signer.id
                    )));
                }
                if signer.signature_data.is_none() {
                    return Err(broken(format!("signer {} has no signature data", signer.id)));
                }
            }
            (SignerStatus::Rejected, [], 1) | (SignerStatus::Pending, [], 0) => {
                if signer.signed_at.is_some() || signer.signature_data.is_some() {
                    return Err(broken(format!(
                        "signer {} carries a signature without a signed entry",
                        signer.id
                    )));
                }
            }
            (status, signed, rejections) => {
                return Err(broken(format!(
                    "signer {} is {status:?} but the log holds {} signed and {rejections} rejected entries",
                    signer.id,
                    signed.len()
                )));
            }
        }

        Ok(())
    }
}

pub(crate) fn normalise_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerDraft {
    pub name: String,
    pub email: String,
    pub role: String,
}

/// Used for constructing a document before it is finalised into an aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentDraft {
    title: String,
    description: String,
    content: Vec<u8>,
    origin: OriginKind,
    created_by: Option<String>,
    actor_address: Option<String>,
    signers: Vec<SignerDraft>, // signing order is insertion order
}

impl DocumentDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
    pub fn set_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = content.into();
        self
    }
    pub fn set_origin(mut self, origin: OriginKind) -> Self {
        self.origin = origin;
        self
    }
    pub fn set_created_by(mut self, user: &str) -> Self {
        self.created_by = Some(user.to_string());
        self
    }
    pub fn set_actor_address(mut self, address: &str) -> Self {
        self.actor_address = Some(address.to_string());
        self
    }
    pub fn add_signer(mut self, name: &str, email: &str, role: &str) -> Self {
        self.signers.push(SignerDraft {
            name: name.to_string(),
            email: email.to_string(),
            role: role.to_string(),
        });
        self
    }
    pub fn set_signers(mut self, signers: Vec<SignerDraft>) -> Self {
        self.signers = signers;
        self
    }

    pub fn validate(&self, config: &EngineConfig) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.content.is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        if self.signers.is_empty() {
            return Err(ValidationError::NoSigners);
        }
        if self.signers.len() > config.max_signers {
            return Err(ValidationError::TooManySigners {
                max: config.max_signers,
                got: self.signers.len(),
            });
        }

        let mut seen = HashSet::new();
        for (index, signer) in self.signers.iter().enumerate() {
            if signer.name.trim().is_empty() {
                return Err(ValidationError::MissingSignerName(index));
            }
            if signer.email.trim().is_empty() {
                return Err(ValidationError::MissingSignerEmail(index));
            }
            if !seen.insert(normalise_email(&signer.email)) {
                return Err(ValidationError::DuplicateEmail(signer.email.trim().to_string()));
            }
        }

        Ok(())
    }

    /// Validates the draft and produces a `Pending` aggregate at version 0 whose
    /// evidence log holds the `created` genesis entry.
    pub fn finalise(self, config: &EngineConfig) -> Result<SignatureDocument, SignatureError> {
        self.finalise_at(config, TimeStamp::new())
    }

    pub fn finalise_at(
        self,
        config: &EngineConfig,
        created_at: TimeStamp<Utc>,
    ) -> Result<SignatureDocument, SignatureError> {
        self.validate(config)?;

        let id = utils::new_uuid_to_bech32(DOCUMENT_PREFIX)?;
        let created_by = self
            .created_by
            .unwrap_or_else(|| config.system_actor.clone());

        let signers = self
            .signers
            .into_iter()
            .zip(1u32..)
            .map(|(draft, sequence)| -> Result<Signer, SignatureError> {
                Ok(Signer {
                    id: utils::new_uuid_to_bech32(SIGNER_PREFIX)?,
                    name: draft.name.trim().to_string(),
                    email: draft.email.trim().to_string(),
                    role: draft.role,
                    sequence,
                    status: SignerStatus::Pending,
                    signed_at: None,
                    signature_data: None,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let genesis = evidence::genesis_hash(&id, &self.content, &created_at)?;
        let log = EvidenceLog::start(
            EvidenceRecord {
                signer_id: config.system_actor.clone(),
                event: EvidenceEvent::Created,
                timestamp: created_at.clone(),
                actor_address: self.actor_address.unwrap_or_default(),
                detail: format!("document created by {created_by}"),
            },
            genesis,
        )?;
        let current_hash = log.head().to_string();

        Ok(SignatureDocument {
            id,
            title: self.title.trim().to_string(),
            description: self.description,
            content: ByteVec::from(self.content),
            origin: self.origin,
            status: DocumentStatus::Pending,
            created_by,
            created_at: created_at.clone(),
            updated_at: created_at,
            version: 0,
            current_hash,
            signers,
            evidence: log,
        })
    }
}
