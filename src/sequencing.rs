//! Strict sequential signing order
//!
//! Exactly one signer may act at a time: the lowest-sequence signer still
//! pending, unless someone before them already rejected.
use super::document::{SignatureDocument, Signer, SignerStatus};
use super::error::SignatureError;
use super::evidence::EvidenceEvent;

/// The single signer currently allowed to view, sign or reject.
pub fn eligible_signer(doc: &SignatureDocument) -> Option<&Signer> {
    let mut ordered: Vec<&Signer> = doc.signers().iter().collect();
    ordered.sort_by_key(|s| s.sequence());

    for signer in ordered {
        match signer.status() {
            SignerStatus::Signed => continue,
            SignerStatus::Pending => return Some(signer),
            SignerStatus::Rejected => return None,
        }
    }
    None
}

/// Resolves `signer_id` on the document and checks that it is the eligible signer.
pub fn authorize<'a>(doc: &'a SignatureDocument, signer_id: &str) -> Result<&'a Signer, SignatureError> {
    let signer = doc
        .signer(signer_id)
        .ok_or_else(|| SignatureError::not_found("signer", signer_id))?;
    let eligible = eligible_signer(doc);

    match eligible {
        Some(e) if e.id() == signer.id() => Ok(signer),
        _ => Err(SignatureError::SequenceViolation {
            signer_id: signer_id.to_string(),
            eligible: eligible.map(|e| e.id().to_string()),
        }),
    }
}

/// Checks that the `signed` entries of the evidence log name signers in
/// ascending sequence order starting from 1, and that nobody signed twice.
pub fn signed_in_sequence(doc: &SignatureDocument) -> bool {
    doc.evidence()
        .iter()
        .filter(|e| e.event() == EvidenceEvent::Signed)
        .map(|e| doc.signer(e.signer_id()).map(Signer::sequence))
        .zip(1u32..)
        .all(|(seq, want)| seq == Some(want))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::document::DocumentDraft;

    fn three_signers() -> SignatureDocument {
        DocumentDraft::new()
            .set_title("Lease")
            .set_content("lease terms")
            .add_signer("Tenant", "tenant@example.com", "tenant")
            .add_signer("Guarantor", "guarantor@example.com", "guarantor")
            .add_signer("Landlord", "landlord@example.com", "landlord")
            .finalise(&EngineConfig::default())
            .unwrap()
    }

    #[test]
    fn first_pending_signer_is_eligible() {
        let doc = three_signers();
        assert_eq!(eligible_signer(&doc).map(Signer::sequence), Some(1));
    }

    #[test]
    fn signed_signers_are_skipped() {
        let mut doc = three_signers();
        doc.signers[0].status = SignerStatus::Signed;
        doc.signers[1].status = SignerStatus::Signed;

        assert_eq!(eligible_signer(&doc).map(Signer::sequence), Some(3));
    }

    #[test]
    fn rejection_leaves_nobody_eligible() {
        let mut doc = three_signers();
        doc.signers[0].status = SignerStatus::Signed;
        doc.signers[1].status = SignerStatus::Rejected;

        assert!(eligible_signer(&doc).is_none());
    }

    #[test]
    fn fully_signed_document_has_no_eligible_signer() {
        let mut doc = three_signers();
        for signer in doc.signers.iter_mut() {
            signer.status = SignerStatus::Signed;
        }
        assert!(eligible_signer(&doc).is_none());
    }

    #[test]
    fn order_follows_sequence_not_storage_position() {
        let mut doc = three_signers();
        doc.signers.reverse();

        assert_eq!(eligible_signer(&doc).map(Signer::name), Some("Tenant"));
    }

    #[test]
    fn authorize_separates_unknown_from_out_of_turn() {
        let doc = three_signers();
        let second = doc.signers()[1].id().to_string();

        assert!(authorize(&doc, doc.signers()[0].id()).is_ok());
        assert!(matches!(
            authorize(&doc, &second),
            Err(SignatureError::SequenceViolation { eligible: Some(_), .. })
        ));
        assert!(matches!(
            authorize(&doc, "signer_unknown"),
            Err(SignatureError::NotFound { kind: "signer", .. })
        ));
    }

    #[test]
    fn unsigned_document_is_trivially_in_sequence() {
        assert!(signed_in_sequence(&three_signers()));
    }
}
