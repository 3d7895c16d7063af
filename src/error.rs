use super::document::DocumentStatus;

/// Malformed input, rejected before anything is mutated.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Document title is empty")]
    EmptyTitle,
    #[error("Document content is empty")]
    EmptyContent,
    #[error("Document creator is not set")]
    MissingCreator,
    #[error("Document has no signers")]
    NoSigners,
    #[error("Document has {got} signers, the limit is {max}")]
    TooManySigners { max: usize, got: usize },
    #[error("Signer at position {0} has no name")]
    MissingSignerName(usize),
    #[error("Signer at position {0} has no email")]
    MissingSignerEmail(usize),
    #[error("Email {0} is used by more than one signer")]
    DuplicateEmail(String),
    #[error("Signature payload is empty")]
    EmptySignature,
}

#[derive(thiserror::Error, Debug)]
pub enum SignatureError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("Signer {signer_id} is not eligible to act, eligible signer: {eligible:?}")]
    SequenceViolation {
        signer_id: String,
        eligible: Option<String>,
    },
    #[error("Cannot {command} while document is {status:?}")]
    InvalidStateTransition {
        command: &'static str,
        status: DocumentStatus,
    },
    #[error("Version conflict on {document_id}: expected {expected:?}, found {found:?}")]
    Conflict {
        document_id: String,
        expected: Option<u64>,
        found: Option<u64>,
    },
    #[error("Evidence chain broken at entry {index}: {reason}")]
    ChainIntegrity { index: usize, reason: String },
    #[error("Failed to mint identifier: {0}")]
    Identifier(String),
    #[error(transparent)]
    Storage(#[from] sled::Error),
    #[error(transparent)]
    Encode(#[from] minicbor::encode::Error<std::convert::Infallible>),
    #[error(transparent)]
    Decode(#[from] minicbor::decode::Error),
}

impl SignatureError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
    pub(crate) fn broken_chain(index: usize, reason: impl Into<String>) -> Self {
        Self::ChainIntegrity {
            index,
            reason: reason.into(),
        }
    }
}
