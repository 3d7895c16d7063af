//! Document state machine
//!
//! ```text
//! Pending --send--> Sent --view/sign--> InProgress --last sign--> Signed
//!                     \                     \
//!                      `------reject--------`----> Rejected
//! ```
//!
//! [`apply`] is pure: it works on a copy of the aggregate and hands back the
//! next version together with the domain events to publish once it is
//! stored. A failed command leaves the input untouched.
use super::config::EngineConfig;
use super::document::{DocumentStatus, SignatureDocument, SignerStatus};
use super::error::{SignatureError, ValidationError};
use super::events::DomainEvent;
use super::evidence::{self, EvidenceEvent, EvidenceRecord};
use super::sequencing;
use super::timestamp::TimeStamp;
use chrono::Utc;

/// Closed set of mutating commands. Every command names the acting identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SendForSigning {
        actor_id: String,
    },
    RecordView {
        signer_id: String,
        actor_address: String,
    },
    ApplySignature {
        signer_id: String,
        signature: Vec<u8>,
        actor_address: String,
    },
    RejectSignature {
        signer_id: String,
        reason: String,
        actor_address: String,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendForSigning { .. } => "send for signing",
            Self::RecordView { .. } => "record view",
            Self::ApplySignature { .. } => "apply signature",
            Self::RejectSignature { .. } => "reject signature",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub document: SignatureDocument,
    pub events: Vec<DomainEvent>,
}

pub fn apply(
    doc: &SignatureDocument,
    command: &Command,
    config: &EngineConfig,
    at: TimeStamp<Utc>,
) -> Result<Transition, SignatureError> {
    match command {
        Command::SendForSigning { actor_id } => send_for_signing(doc, actor_id, config, at),
        Command::RecordView {
            signer_id,
            actor_address,
        } => record_view(doc, signer_id, actor_address, at),
        Command::ApplySignature {
            signer_id,
            signature,
            actor_address,
        } => apply_signature(doc, signer_id, signature, actor_address, at),
        Command::RejectSignature {
            signer_id,
            reason,
            actor_address,
        } => reject_signature(doc, signer_id, reason, actor_address, at),
    }
}

fn send_for_signing(
    doc: &SignatureDocument,
    actor_id: &str,
    config: &EngineConfig,
    at: TimeStamp<Utc>,
) -> Result<Transition, SignatureError> {
    if doc.status != DocumentStatus::Pending {
        return Err(SignatureError::InvalidStateTransition {
            command: "send for signing",
            status: doc.status,
        });
    }

    let mut next = doc.clone();
    next.status = DocumentStatus::Sent;
    let digest = evidence::content_digest(&next.content, None)?;
    commit(
        &mut next,
        EvidenceRecord {
            signer_id: config.system_actor.clone(),
            event: EvidenceEvent::Sent,
            timestamp: at,
            actor_address: String::new(),
            detail: format!("sent for signing by {actor_id}"),
        },
        &digest,
    )?;

    let mut events = vec![DomainEvent::DocumentSent {
        document_id: next.id.clone(),
    }];
    if let Some(first) = sequencing::eligible_signer(&next) {
        events.push(DomainEvent::SignatureRequested {
            document_id: next.id.clone(),
            signer_id: first.id().to_string(),
        });
    }

    Ok(Transition {
        document: next,
        events,
    })
}

fn record_view(
    doc: &SignatureDocument,
    signer_id: &str,
    actor_address: &str,
    at: TimeStamp<Utc>,
) -> Result<Transition, SignatureError> {
    require_awaiting_action(doc, "record view")?;
    let signer = sequencing::authorize(doc, signer_id)?;
    let detail = format!("viewed by {} <{}>", signer.name(), signer.email());

    let mut next = doc.clone();
    next.status = DocumentStatus::InProgress;
    let digest = evidence::content_digest(&next.content, None)?;
    commit(
        &mut next,
        EvidenceRecord {
            signer_id: signer_id.to_string(),
            event: EvidenceEvent::Viewed,
            timestamp: at,
            actor_address: actor_address.to_string(),
            detail,
        },
        &digest,
    )?;

    Ok(Transition {
        document: next,
        events: vec![],
    })
}

fn apply_signature(
    doc: &SignatureDocument,
    signer_id: &str,
    signature: &[u8],
    actor_address: &str,
    at: TimeStamp<Utc>,
) -> Result<Transition, SignatureError> {
    require_awaiting_action(doc, "apply signature")?;
    let signer = sequencing::authorize(doc, signer_id)?;
    if signature.is_empty() {
        return Err(ValidationError::EmptySignature.into());
    }
    let detail = format!("signed by {} <{}>", signer.name(), signer.email());

    let mut next = doc.clone();
    let signer = next
        .signer_mut(signer_id)
        .ok_or_else(|| SignatureError::not_found("signer", signer_id))?;
    signer.status = SignerStatus::Signed;
    signer.signed_at = Some(at.clone());
    signer.signature_data = Some(signature.to_vec().into());

    let remaining = sequencing::eligible_signer(&next).map(|s| s.id().to_string());
    next.status = match remaining {
        Some(_) => DocumentStatus::InProgress,
        None => DocumentStatus::Signed,
    };
    let digest = evidence::content_digest(&next.content, Some(signature))?;
    commit(
        &mut next,
        EvidenceRecord {
            signer_id: signer_id.to_string(),
            event: EvidenceEvent::Signed,
            timestamp: at,
            actor_address: actor_address.to_string(),
            detail,
        },
        &digest,
    )?;

    let event = match remaining {
        Some(signer_id) => DomainEvent::SignatureRequested {
            document_id: next.id.clone(),
            signer_id,
        },
        None => DomainEvent::DocumentSigned {
            document_id: next.id.clone(),
        },
    };

    Ok(Transition {
        document: next,
        events: vec![event],
    })
}

fn reject_signature(
    doc: &SignatureDocument,
    signer_id: &str,
    reason: &str,
    actor_address: &str,
    at: TimeStamp<Utc>,
) -> Result<Transition, SignatureError> {
    require_awaiting_action(doc, "reject signature")?;
    sequencing::authorize(doc, signer_id)?;

    let mut next = doc.clone();
    let signer = next
        .signer_mut(signer_id)
        .ok_or_else(|| SignatureError::not_found("signer", signer_id))?;
    signer.status = SignerStatus::Rejected;
    next.status = DocumentStatus::Rejected;
    let digest = evidence::content_digest(&next.content, None)?;
    commit(
        &mut next,
        EvidenceRecord {
            signer_id: signer_id.to_string(),
            event: EvidenceEvent::Rejected,
            timestamp: at,
            actor_address: actor_address.to_string(),
            detail: reason.to_string(),
        },
        &digest,
    )?;

    let event = DomainEvent::DocumentRejected {
        document_id: next.id.clone(),
        signer_id: signer_id.to_string(),
        reason: reason.to_string(),
    };

    Ok(Transition {
        document: next,
        events: vec![event],
    })
}

fn require_awaiting_action(doc: &SignatureDocument, command: &'static str) -> Result<(), SignatureError> {
    if doc.status.is_awaiting_action() {
        return Ok(());
    }
    Err(SignatureError::InvalidStateTransition {
        command,
        status: doc.status,
    })
}

// appends the evidence entry and moves head, version and updated_at together
fn commit(
    next: &mut SignatureDocument,
    record: EvidenceRecord,
    content_digest: &str,
) -> Result<(), SignatureError> {
    let at = record.timestamp.clone();
    let head = next.evidence.append(record, content_digest)?.hash_snapshot().to_string();

    next.current_hash = head;
    next.version += 1;
    next.updated_at = at;
    Ok(())
}
