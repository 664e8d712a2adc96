//! Cache fingerprints
//!
//! A fingerprint is the SHA-256 over (version id, page id, ordered kind
//! tokens). Ids are hashed as raw UUID bytes and every token is length
//! prefixed, so no two distinct inputs share an encoding.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::document::{PageId, VersionId};
use crate::transform::TransformationKind;

const FINGERPRINT_SCHEME: &[u8] = b"folio-render-v1";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(version_id: VersionId, page_id: PageId, stack: &[TransformationKind]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_SCHEME);
        hasher.update(version_id.as_uuid().as_bytes());
        hasher.update(page_id.as_uuid().as_bytes());
        hasher.update((stack.len() as u64).to_be_bytes());
        for kind in stack {
            let token = kind.token();
            hasher.update((token.len() as u64).to_be_bytes());
            hasher.update(token.as_bytes());
        }
        Fingerprint(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 of arbitrary content, hex encoded
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
