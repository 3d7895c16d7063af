//! Property-based tests for the signing state machine and its evidence chain
//!
//! Random signer counts are driven through random sequences of commands from
//! random actors. Whatever the sequence, the invariants below must hold after
//! every step. These tests focus on the pure workflow; persistence is covered
//! by the scenarios.

use doc_signing::{
    config::EngineConfig,
    document::{DocumentDraft, DocumentStatus, SignatureDocument, SignerStatus},
    error::SignatureError,
    evidence,
    sequencing,
    timestamp::TimeStamp,
    workflow::{self, Command},
};
use proptest::prelude::*;

// These property tests cover:
//
// 1. Chain verification after any sequence of accepted commands
// 2. Only the eligible signer can act, everyone else gets SequenceViolation
// 3. Signed iff every signer signed, in sequence order
// 4. Terminal states are stable
// 5. Refused commands leave the aggregate untouched
//

#[derive(Debug, Clone)]
enum Action {
    Send,
    View(usize),
    Sign(usize, Vec<u8>),
    Reject(usize),
}

fn action_strategy(signers: usize) -> impl Strategy<Value = Action> {
    prop_oneof![
        1 => Just(Action::Send),
        3 => (0..signers).prop_map(Action::View),
        5 => (0..signers, prop::collection::vec(any::<u8>(), 0..8))
            .prop_map(|(i, sig)| Action::Sign(i, sig)),
        1 => (0..signers).prop_map(Action::Reject),
    ]
}

fn workflow_strategy() -> impl Strategy<Value = (usize, Vec<Action>)> {
    (1usize..=5).prop_flat_map(|n| (Just(n), prop::collection::vec(action_strategy(n), 0..=20)))
}

fn document(signers: usize) -> SignatureDocument {
    let draft = (0..signers).fold(
        DocumentDraft::new()
            .set_title("Property document")
            .set_content("generated content"),
        |draft, i| draft.add_signer(&format!("Signer {i}"), &format!("s{i}@example.com"), "party"),
    );
    draft.finalise(&EngineConfig::default()).unwrap()
}

fn to_command(doc: &SignatureDocument, action: &Action) -> Command {
    let id = |i: usize| doc.signers()[i].id().to_string();
    match action {
        Action::Send => Command::SendForSigning {
            actor_id: "admin".into(),
        },
        Action::View(i) => Command::RecordView {
            signer_id: id(*i),
            actor_address: "10.0.0.1".into(),
        },
        Action::Sign(i, sig) => Command::ApplySignature {
            signer_id: id(*i),
            signature: sig.clone(),
            actor_address: "10.0.0.1".into(),
        },
        Action::Reject(i) => Command::RejectSignature {
            signer_id: id(*i),
            reason: "declined".into(),
            actor_address: "10.0.0.1".into(),
        },
    }
}

proptest! {
    /// Property: every reachable document verifies, whatever was attempted
    #[test]
    fn prop_chain_always_verifies((signers, actions) in workflow_strategy()) {
        let config = EngineConfig::default();
        let mut doc = document(signers);

        for action in &actions {
            let command = to_command(&doc, action);
            if let Ok(t) = workflow::apply(&doc, &command, &config, TimeStamp::new()) {
                doc = t.document;
            }
            prop_assert!(evidence::verify_chain(&doc).is_ok());
            prop_assert!(doc.check_invariants().is_ok());
            prop_assert_eq!(doc.version() as usize + 1, doc.evidence().len());
            prop_assert_eq!(doc.current_hash(), doc.evidence().head());
        }
    }

    /// Property: a signer command succeeds only for the eligible signer
    ///
    /// Anyone else acting on a document that is awaiting action must get a
    /// SequenceViolation, and the document must not change.
    #[test]
    fn prop_only_eligible_signer_can_act((signers, actions) in workflow_strategy()) {
        let config = EngineConfig::default();
        let mut doc = document(signers);

        for action in &actions {
            let command = to_command(&doc, action);
            let eligible = sequencing::eligible_signer(&doc).map(|s| s.id().to_string());
            let before = doc.clone();
            let result = workflow::apply(&doc, &command, &config, TimeStamp::new());

            let actor = match &command {
                Command::SendForSigning { .. } => None,
                Command::RecordView { signer_id, .. }
                | Command::ApplySignature { signer_id, .. }
                | Command::RejectSignature { signer_id, .. } => Some(signer_id.clone()),
            };

            match (&result, actor) {
                (Ok(_), Some(actor)) => prop_assert_eq!(Some(actor), eligible),
                (Err(SignatureError::SequenceViolation { .. }), Some(actor)) => {
                    prop_assert!(doc.status().is_awaiting_action());
                    prop_assert_ne!(Some(actor), eligible);
                }
                _ => {}
            }

            match result {
                Ok(t) => {
                    prop_assert_eq!(t.document.version(), before.version() + 1);
                    prop_assert_eq!(t.document.evidence().len(), before.evidence().len() + 1);
                    doc = t.document;
                }
                Err(_) => prop_assert_eq!(&doc, &before),
            }
        }
    }

    /// Property: Signed iff every signer signed, Rejected iff someone rejected
    #[test]
    fn prop_status_follows_signers((signers, actions) in workflow_strategy()) {
        let config = EngineConfig::default();
        let mut doc = document(signers);

        for action in &actions {
            let command = to_command(&doc, action);
            if let Ok(t) = workflow::apply(&doc, &command, &config, TimeStamp::new()) {
                doc = t.document;
            }

            let all_signed = doc.signers().iter().all(|s| s.status() == SignerStatus::Signed);
            let any_rejected = doc.signers().iter().any(|s| s.status() == SignerStatus::Rejected);
            prop_assert_eq!(doc.status() == DocumentStatus::Signed, all_signed);
            prop_assert_eq!(doc.status() == DocumentStatus::Rejected, any_rejected);
            prop_assert!(sequencing::signed_in_sequence(&doc));
        }
    }

    /// Property: once Signed or Rejected, every command is refused
    #[test]
    fn prop_terminal_states_are_stable(
        (signers, actions) in workflow_strategy(),
        reject_at_end in any::<bool>(),
        trailing in prop::collection::vec(action_strategy(5), 0..=10),
    ) {
        let config = EngineConfig::default();
        let mut doc = document(signers);

        let apply = |doc: &mut SignatureDocument, command: Command| {
            if let Ok(t) = workflow::apply(doc, &command, &config, TimeStamp::new()) {
                *doc = t.document;
            }
        };

        for action in &actions {
            let command = to_command(&doc, action);
            apply(&mut doc, command);
        }

        // drive the document to a terminal state
        apply(&mut doc, Command::SendForSigning { actor_id: "admin".into() });
        while let Some(signer_id) = sequencing::eligible_signer(&doc).map(|s| s.id().to_string()) {
            let command = if reject_at_end {
                Command::RejectSignature { signer_id, reason: "no".into(), actor_address: String::new() }
            } else {
                Command::ApplySignature { signer_id, signature: vec![1], actor_address: String::new() }
            };
            apply(&mut doc, command);
        }
        prop_assert!(doc.is_sealed());

        let sealed = doc.clone();
        for action in trailing.iter().filter(|a| match a {
            Action::Send => true,
            Action::View(i) | Action::Sign(i, _) | Action::Reject(i) => *i < signers,
        }) {
            let command = to_command(&doc, action);
            let result = workflow::apply(&doc, &command, &config, TimeStamp::new());
            let refused = matches!(result, Err(SignatureError::InvalidStateTransition { .. }));
            prop_assert!(refused);
        }
        prop_assert_eq!(&doc, &sealed);
    }
}
