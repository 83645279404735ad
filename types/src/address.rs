//! Account address and public key types.
//!
//! Voter identities arrive from the ledger as hex public keys; payout rows
//! and settlement transactions address recipients by derived address. The
//! derivation is a network-prefixed Blake2 digest of the key bytes.

use crate::error::TbwError;
use crate::network::NetworkId;
use blake2::{Blake2s256, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A ledger account address.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Derive the address owned by a public key on the given network.
    ///
    /// Fails with a data-integrity fault when the key is not valid hex —
    /// malformed vote history must surface to the operator, never be
    /// silently skipped.
    pub fn from_public_key(key: &PublicKey, network: NetworkId) -> Result<Self, TbwError> {
        let bytes = hex::decode(key.as_str())
            .map_err(|_| TbwError::DataIntegrity(format!("malformed public key: {key}")))?;
        if bytes.is_empty() {
            return Err(TbwError::DataIntegrity("empty public key".to_string()));
        }
        let digest = Blake2s256::digest(&bytes);
        Ok(Self(format!(
            "{}{}",
            network.address_prefix(),
            hex::encode(&digest[..20])
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A voter public key as it appears in vote transactions (hex encoded).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey(String);

impl PublicKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
