/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.
//!
//! The definitions and re-exports in this module provide two categories of cryptographic primitives:
//! 1. **Cryptographic Hashes**: provided by the [`sha2`] crate.
//! 2. **Digital Signatures**: provided by the [`ed25519_dalek`] crate.
//!
//! Every identifier in the ledger is a SHA-256 digest over the [Borsh](borsh) encoding of a short
//! specifier followed by the identified data, so that identifiers of different kinds never collide.

use borsh::BorshSerialize;

use super::basic::{CryptoHash, SignatureBytes, VerifyingKeyBytes};

// re-exports below.
pub use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

pub use ed25519_dalek::{Signature, SignatureError, Signer, SigningKey, Verifier, VerifyingKey};

/// Domain separators prepended to the data hashed into each kind of identifier.
pub(crate) mod specifiers {
    pub(crate) const BLOCK: &[u8; 8] = b"block\0\0\0";
    pub(crate) const TRANSACTION: &[u8; 8] = b"txn\0\0\0\0\0";
    pub(crate) const OUTPUT: &[u8; 8] = b"output\0\0";
    pub(crate) const CONTRACT: &[u8; 8] = b"contract";
    pub(crate) const MINER_PAYOUT: &[u8; 8] = b"payout\0\0";
    pub(crate) const VALID_PROOF: &[u8; 8] = b"pvalid\0\0";
    pub(crate) const MISSED_PROOF: &[u8; 8] = b"pmissed\0";
    pub(crate) const SIGNATURE: &[u8; 8] = b"sig\0\0\0\0\0";
    pub(crate) const UNLOCK: &[u8; 8] = b"unlock\0\0";
    pub(crate) const CHANGE: &[u8; 8] = b"change\0\0";
    pub(crate) const STORAGE_PROOF: &[u8; 8] = b"segment\0";
}

/// Borsh encoding of `value`.
pub fn encode<T: BorshSerialize + ?Sized>(value: &T) -> Vec<u8> {
    let mut bytes = Vec::new();
    // Writing into a Vec<u8> cannot fail.
    value
        .serialize(&mut bytes)
        .expect("serializing into a Vec<u8> is infallible");
    bytes
}

/// Length in bytes of the Borsh encoding of `value`. Used for every size limit in the ledger.
pub fn encoded_size<T: BorshSerialize + ?Sized>(value: &T) -> usize {
    encode(value).len()
}

/// SHA-256 over the concatenation of `parts`.
pub fn hash_parts(parts: &[&[u8]]) -> CryptoHash {
    let mut hasher = CryptoHasher::new();
    for part in parts {
        hasher.update(part);
    }
    CryptoHash::new(hasher.finalize().into())
}

/// A facade around [`SigningKey`] used by wallets (and tests) to sign transactions.
#[derive(Clone)]
pub struct Keypair(SigningKey);

impl Keypair {
    pub fn new(signing_key: SigningKey) -> Keypair {
        Keypair(signing_key)
    }

    /// Sign an arbitrary `message` with the `Keypair`.
    pub fn sign(&self, message: &[u8]) -> SignatureBytes {
        SignatureBytes::new(self.0.sign(message).to_bytes())
    }

    pub fn public(&self) -> VerifyingKeyBytes {
        VerifyingKeyBytes::new(self.0.verifying_key().to_bytes())
    }
}

/// Whether `signature` is a valid signature by `public_key` over `message`. Malformed keys are
/// treated as failing verification.
pub fn verify_signature(
    public_key: &VerifyingKeyBytes,
    message: &[u8],
    signature: &SignatureBytes,
) -> bool {
    match VerifyingKey::from_bytes(&public_key.bytes()) {
        Ok(verifying_key) => verifying_key
            .verify(message, &Signature::from_bytes(&signature.bytes()))
            .is_ok(),
        Err(_) => false,
    }
}
