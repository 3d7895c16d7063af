//! Smoke Screen Unit tests for the signing workflow components
//!
//! These tests exercise each public module through its own API, in isolation
//! from the service and persistence scenarios. They mostly cover the happy path.

use chrono::{Datelike, Utc};
use doc_signing::{
    config::EngineConfig,
    document::{DocumentDraft, DocumentStatus, OriginKind, SignatureDocument, SignerStatus},
    error::{SignatureError, ValidationError},
    events::{DomainEvent, NotificationSink},
    evidence::{self, EvidenceEvent},
    sequencing,
    store::{DocumentStore, MemoryStore},
    timestamp::TimeStamp,
    utils::{DOCUMENT_PREFIX, new_uuid_to_bech32},
    workflow::{self, Command},
};

fn draft() -> DocumentDraft {
    DocumentDraft::new()
        .set_title("Board resolution")
        .set_content("resolved: approve budget")
        .set_origin(OriginKind::Template)
        .add_signer("Chair", "chair@example.com", "chair")
        .add_signer("Secretary", "secretary@example.com", "secretary")
        .add_signer("Treasurer", "treasurer@example.com", "treasurer")
}

// UTILS MODULE TESTS
#[cfg(test)]
mod utils_tests {
    use super::*;

    /// Test that multiple calls generate unique identifiers
    #[test]
    fn generates_unique_ids() {
        let id1 = new_uuid_to_bech32(DOCUMENT_PREFIX).unwrap();
        let id2 = new_uuid_to_bech32(DOCUMENT_PREFIX).unwrap();

        assert_ne!(id1, id2);
        assert!(id1.starts_with(DOCUMENT_PREFIX));
    }
}

// TIMESTAMP MODULE TESTS
#[cfg(test)]
mod timestamp_tests {
    use super::*;

    /// Test that TimeStamp::new() creates a timestamp close to current time
    #[test]
    fn timestamp_new_creates_current_time() {
        let ts = TimeStamp::new();
        let diff = (Utc::now() - ts.to_datetime_utc()).num_seconds().abs();
        assert!(diff < 1);
    }

    /// Test that TimeStamp can be created with specific date values
    #[test]
    fn timestamp_new_with_creates_specific_time() {
        let ts = TimeStamp::new_with(2024, 6, 15, 10, 30, 0).unwrap();
        assert_eq!(ts.to_datetime_utc().year(), 2024);
        assert_eq!(ts.to_string(), "2024-06-15T10:30:00+00:00");
    }
}

// DOCUMENT MODULE TESTS
#[cfg(test)]
mod document_tests {
    use super::*;

    /// Test that a finalised draft keeps what the builder set
    #[test]
    fn finalise_keeps_builder_fields() {
        let created_at = TimeStamp::new_with(2024, 1, 2, 3, 4, 5).unwrap();
        let doc = draft()
            .set_description("annual budget")
            .finalise_at(&EngineConfig::default(), created_at.clone())
            .unwrap();

        assert!(doc.id().starts_with("doc_1"));
        assert_eq!(doc.title(), "Board resolution");
        assert_eq!(doc.description(), "annual budget");
        assert_eq!(doc.content(), b"resolved: approve budget");
        assert_eq!(doc.origin(), OriginKind::Template);
        assert_eq!(doc.created_at(), &created_at);
        assert_eq!(doc.updated_at(), &created_at);
        assert_eq!(doc.progress(), (0, 3));
        assert!(!doc.is_sealed());
        assert!(doc.signers().iter().all(|s| s.status() == SignerStatus::Pending));
        assert_eq!(doc.signers()[2].role(), "treasurer");
    }

    /// Test that finalise reports the first validation failure
    #[test]
    fn finalise_rejects_missing_title() {
        let err = draft()
            .set_title("")
            .finalise(&EngineConfig::default())
            .unwrap_err();

        assert!(matches!(
            err,
            SignatureError::Validation(ValidationError::EmptyTitle)
        ));
    }

    /// Test that the audit trail has one line per evidence entry
    #[test]
    fn view_history_lists_every_entry() {
        let doc = draft().finalise(&EngineConfig::default()).unwrap();
        let history = doc.view_history();

        assert_eq!(history.lines().count(), doc.evidence().len());
        assert!(history.contains("created by system"));
    }
}

// WORKFLOW + SEQUENCING TESTS
#[cfg(test)]
mod workflow_tests {
    use super::*;

    fn step(doc: &SignatureDocument, command: Command) -> SignatureDocument {
        workflow::apply(doc, &command, &EngineConfig::default(), TimeStamp::new())
            .unwrap()
            .document
    }

    /// Test that signing walks the signers in sequence and ends Signed
    #[test]
    fn three_signers_sign_in_order() {
        let mut doc = step(
            &draft().finalise(&EngineConfig::default()).unwrap(),
            Command::SendForSigning {
                actor_id: "clerk".into(),
            },
        );

        for expected_sequence in 1..=3 {
            let eligible = sequencing::eligible_signer(&doc).unwrap();
            assert_eq!(eligible.sequence(), expected_sequence);
            let signer_id = eligible.id().to_string();

            doc = step(
                &doc,
                Command::ApplySignature {
                    signer_id,
                    signature: format!("sig-{expected_sequence}").into_bytes(),
                    actor_address: "10.1.1.1".into(),
                },
            );
        }

        assert_eq!(doc.status(), DocumentStatus::Signed);
        assert_eq!(doc.progress(), (3, 3));
        assert!(sequencing::eligible_signer(&doc).is_none());
        assert!(sequencing::signed_in_sequence(&doc));
        assert!(evidence::verify_chain(&doc).is_ok());
    }
}

// STORE + EVENTS TESTS
#[cfg(test)]
mod store_tests {
    use super::*;
    use std::sync::mpsc;

    /// Test that the memory store hands back what was inserted
    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        let doc = draft().finalise(&EngineConfig::default()).unwrap();

        store.insert(&doc).unwrap();
        let (loaded, version) = store.load(doc.id()).unwrap();

        assert_eq!(loaded, doc);
        assert_eq!(version, 0);
    }

    /// Test that a channel sink forwards events in order
    #[test]
    fn channel_sink_forwards_events() {
        let (tx, rx) = mpsc::channel();
        tx.publish(DomainEvent::DocumentSigned {
            document_id: "doc_1".into(),
        });

        let event = rx.recv().unwrap();
        assert_eq!(event.document_id(), "doc_1");
    }

    /// Test that a sink whose receiver is gone does not panic
    #[test]
    fn channel_sink_tolerates_dropped_receiver() {
        let (tx, rx) = mpsc::channel::<DomainEvent>();
        drop(rx);
        tx.publish(DomainEvent::DocumentSent {
            document_id: "doc_1".into(),
        });
    }

    /// Test that evidence events render with their wire names
    #[test]
    fn evidence_event_names() {
        assert_eq!(EvidenceEvent::Viewed.to_string(), "viewed");
        assert_eq!(EvidenceEvent::Rejected.as_str(), "rejected");
    }
}
