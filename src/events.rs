//! Domain events for the notification collaborator
use std::sync::mpsc::Sender;

/// Emitted after a transition is stored. Turning these into emails or
/// messages is left to whoever receives them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    DocumentSent {
        document_id: String,
    },
    SignatureRequested {
        document_id: String,
        signer_id: String,
    },
    DocumentSigned {
        document_id: String,
    },
    DocumentRejected {
        document_id: String,
        signer_id: String,
        reason: String,
    },
}

impl DomainEvent {
    pub fn document_id(&self) -> &str {
        match self {
            Self::DocumentSent { document_id }
            | Self::SignatureRequested { document_id, .. }
            | Self::DocumentSigned { document_id }
            | Self::DocumentRejected { document_id, .. } => document_id,
        }
    }
}

pub trait NotificationSink {
    fn publish(&self, event: DomainEvent);
}

/// Drops every event.
impl NotificationSink for () {
    fn publish(&self, _: DomainEvent) {}
}

impl NotificationSink for Sender<DomainEvent> {
    fn publish(&self, event: DomainEvent) {
        if let Err(e) = self.send(event) {
            tracing::debug!(event = ?e.0, "notification receiver is gone, dropping event");
        }
    }
}
