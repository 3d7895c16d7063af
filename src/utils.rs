//! Identifier minting

use super::error::SignatureError;
use bech32::Bech32m;
use uuid7::uuid7;

pub const DOCUMENT_PREFIX: &str = "doc_";
pub const SIGNER_PREFIX: &str = "signer_";
pub const EVIDENCE_PREFIX: &str = "evidence_";

// construct a unique, time-ordered id then encode using bech32m
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, SignatureError> {
    let hrp = bech32::Hrp::parse(hrp).map_err(|e| SignatureError::Identifier(e.to_string()))?;
    bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| SignatureError::Identifier(e.to_string()))
}
