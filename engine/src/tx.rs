//! Settlement transaction construction and signing.

use crate::EngineError;
use blake2::{Blake2s256, Digest};
use ed25519_dalek::{Signer, SigningKey};
use tbw_types::{
    Address, Amount, DelegateConfig, PublicKey, Recipient, SettlementTransaction, TxId,
};

/// Builds and signs settlement transactions for one delegate.
///
/// Holds the delegate's ed25519 signing key and its derived address, which
/// is also the account whose nonce sequences every broadcast.
pub struct TransactionSigner {
    key: SigningKey,
    address: Address,
}

impl TransactionSigner {
    pub fn from_config(config: &DelegateConfig) -> Result<Self, EngineError> {
        let bytes = hex::decode(&config.signing_seed)
            .map_err(|_| EngineError::Config("signing_seed is not valid hex".into()))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EngineError::Config("signing_seed must be 32 bytes".into()))?;
        let key = SigningKey::from_bytes(&seed);
        let public = PublicKey::new(hex::encode(key.verifying_key().as_bytes()));
        let address = Address::from_public_key(&public, config.network)?;
        Ok(Self { key, address })
    }

    /// The signing account's address, used for nonce lookup.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Build and sign one transaction. The id is a digest over the signed
    /// payload, so identical recipients at a different nonce produce a
    /// distinct id.
    pub fn build(
        &self,
        nonce: u64,
        recipients: Vec<Recipient>,
        fee: Amount,
        memo: &str,
    ) -> SettlementTransaction {
        let payload = payload_bytes(nonce, &recipients, fee, memo);
        let signature = self.key.sign(&payload);
        let sig_hex = hex::encode(signature.to_bytes());

        let mut hasher = Blake2s256::new();
        hasher.update(&payload);
        hasher.update(sig_hex.as_bytes());
        let id = TxId::new(hex::encode(hasher.finalize()));

        SettlementTransaction {
            id,
            nonce,
            recipients,
            fee,
            memo: memo.to_string(),
            signature: sig_hex,
        }
    }
}

/// Canonical byte serialization of the signable fields. Length-prefixed per
/// leg so adjacent fields cannot alias across leg boundaries.
fn payload_bytes(nonce: u64, recipients: &[Recipient], fee: Amount, memo: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(64 + recipients.len() * 48);
    out.extend_from_slice(&nonce.to_be_bytes());
    out.extend_from_slice(&(recipients.len() as u32).to_be_bytes());
    for leg in recipients {
        let addr = leg.address.as_str().as_bytes();
        out.extend_from_slice(&(addr.len() as u32).to_be_bytes());
        out.extend_from_slice(addr);
        out.extend_from_slice(&leg.amount.raw().to_be_bytes());
    }
    out.extend_from_slice(&fee.raw().to_be_bytes());
    out.extend_from_slice(memo.as_bytes());
    out
}
