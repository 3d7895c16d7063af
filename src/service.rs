//! Service layer API for the signing workflow
//!
//! Every mutating call follows the same round trip: load the aggregate at a
//! known version, verify its evidence chain, apply the command, save against
//! the version that was read, then publish domain events. Nothing is held
//! between calls, so one service can front any number of documents.
use super::config::EngineConfig;
use super::document::{DocumentDraft, SignatureDocument};
use super::error::SignatureError;
use super::events::NotificationSink;
use super::evidence;
use super::store::DocumentStore;
use super::timestamp::TimeStamp;
use super::workflow::{self, Command};

pub struct SignatureService<S, N = ()> {
    store: S,
    notifier: N,
    config: EngineConfig,
}

impl<S: DocumentStore> SignatureService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            notifier: (),
            config: EngineConfig::default(),
        }
    }
}

impl<S: DocumentStore, N: NotificationSink> SignatureService<S, N> {
    pub fn with_notifier<M: NotificationSink>(self, notifier: M) -> SignatureService<S, M> {
        SignatureService {
            store: self.store,
            notifier,
            config: self.config,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate a draft and store it as a new `Pending` document
    pub fn create_document(&self, draft: DocumentDraft) -> Result<SignatureDocument, SignatureError> {
        let doc = draft.finalise(&self.config)?;
        self.store.insert(&doc)?;
        tracing::info!(
            document_id = %doc.id(),
            signers = doc.signers().len(),
            "created document"
        );

        Ok(doc)
    }

    /// Run `command` against the stored document.
    ///
    /// With `expected_version` set, the command is refused with `Conflict`
    /// unless the caller's copy is still current.
    pub fn execute(
        &self,
        document_id: &str,
        expected_version: Option<u64>,
        command: Command,
    ) -> Result<SignatureDocument, SignatureError> {
        let (doc, version) = self.load_verified(document_id)?;
        if let Some(expected) = expected_version.filter(|v| *v != version) {
            tracing::warn!(document_id, expected, found = version, "stale command refused");
            return Err(SignatureError::Conflict {
                document_id: document_id.to_string(),
                expected: Some(expected),
                found: Some(version),
            });
        }

        let transition = workflow::apply(&doc, &command, &self.config, TimeStamp::new())
            .inspect_err(|e| {
                tracing::debug!(document_id, command = command.name(), error = %e, "command refused");
            })?;

        if let Err(e) = self.store.save(&transition.document, version) {
            if matches!(e, SignatureError::Conflict { .. }) {
                tracing::warn!(document_id, version, "concurrent update, caller must reload");
            }
            return Err(e);
        }
        tracing::info!(
            document_id,
            command = command.name(),
            version = transition.document.version(),
            status = ?transition.document.status(),
            "accepted command"
        );

        for event in transition.events {
            tracing::debug!(?event, "publishing domain event");
            self.notifier.publish(event);
        }

        Ok(transition.document)
    }

    pub fn send_for_signing(&self, document_id: &str, actor_id: &str) -> Result<SignatureDocument, SignatureError> {
        self.execute(
            document_id,
            None,
            Command::SendForSigning {
                actor_id: actor_id.to_string(),
            },
        )
    }

    pub fn record_view(
        &self,
        document_id: &str,
        signer_id: &str,
        actor_address: &str,
    ) -> Result<SignatureDocument, SignatureError> {
        self.execute(
            document_id,
            None,
            Command::RecordView {
                signer_id: signer_id.to_string(),
                actor_address: actor_address.to_string(),
            },
        )
    }

    pub fn apply_signature(
        &self,
        document_id: &str,
        signer_id: &str,
        signature: Vec<u8>,
        actor_address: &str,
    ) -> Result<SignatureDocument, SignatureError> {
        self.execute(
            document_id,
            None,
            Command::ApplySignature {
                signer_id: signer_id.to_string(),
                signature,
                actor_address: actor_address.to_string(),
            },
        )
    }

    pub fn reject_signature(
        &self,
        document_id: &str,
        signer_id: &str,
        reason: &str,
        actor_address: &str,
    ) -> Result<SignatureDocument, SignatureError> {
        self.execute(
            document_id,
            None,
            Command::RejectSignature {
                signer_id: signer_id.to_string(),
                reason: reason.to_string(),
                actor_address: actor_address.to_string(),
            },
        )
    }

    /// Administrative removal, delegated to the store. The evidence log stays
    /// in the store's archive.
    pub fn delete_document(
        &self,
        document_id: &str,
        actor_id: &str,
        expected_version: Option<u64>,
    ) -> Result<(), SignatureError> {
        let (_, version) = self.store.load(document_id)?;
        let expected = expected_version.unwrap_or(version);
        self.store.delete(document_id, expected)?;
        tracing::info!(document_id, actor_id, version = expected, "deleted document");

        Ok(())
    }

    /// Read-only view of the aggregate, including its full evidence log
    pub fn get_document(&self, document_id: &str) -> Result<SignatureDocument, SignatureError> {
        let (doc, _) = self.store.load(document_id)?;
        tracing::debug!(document_id, version = doc.version(), "loaded document");
        Ok(doc)
    }

    /// `Ok(false)` when the stored chain does not verify; other errors are
    /// lookup or storage failures.
    pub fn verify_chain(&self, document_id: &str) -> Result<bool, SignatureError> {
        let doc = self.get_document(document_id)?;
        match check(&doc) {
            Ok(()) => Ok(true),
            Err(SignatureError::ChainIntegrity { index, reason }) => {
                tracing::warn!(document_id, index, %reason, "evidence chain failed verification");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub fn list_documents(&self) -> Result<Vec<String>, SignatureError> {
        self.store.list()
    }

    pub fn get_archived_document(&self, document_id: &str) -> Result<SignatureDocument, SignatureError> {
        self.store.load_archived(document_id)
    }

    fn load_verified(&self, document_id: &str) -> Result<(SignatureDocument, u64), SignatureError> {
        let (doc, version) = self.store.load(document_id)?;
        if self.config.verify_chain_on_load {
            check(&doc).inspect_err(|e| {
                tracing::warn!(document_id, error = %e, "refusing command on a document with a broken chain");
            })?;
        }
        Ok((doc, version))
    }
}

fn check(doc: &SignatureDocument) -> Result<(), SignatureError> {
    evidence::verify_chain(doc)?;
    doc.check_invariants()
}
