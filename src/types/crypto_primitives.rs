/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.
//!
//! The definitions and re-exports in this module provide two categories of cryptographic primitives:
//! 1. **Cryptographic Hashes**: provided by the [`sha2`] crate.
//! 2. **Digital Signatures**: provided by the [`ed25519_dalek`] crate.

use super::data_types::{Address, CryptoHash, PublicKeyBytes, SignatureBytes};

// re-exports below.
pub use sha2::{Digest, Sha256};

pub use ed25519_dalek::{Signature, SignatureError, Signer, SigningKey, Verifier, VerifyingKey};

/// A facade around [`SigningKey`] that implements method for [`sign`](Self::sign)-ing messages as well
/// as getters for the [`public`](Self::public) key and the [`address`](Self::address) associated with
/// the signing key.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
    address: Address,
}

impl Keypair {
    /// Create a `Keypair` that wraps over `signing_key`.
    pub fn new(signing_key: SigningKey) -> Keypair {
        let address = Address::from_verifying_key(&signing_key.verifying_key());
        Keypair {
            signing_key,
            address,
        }
    }

    /// Sign an arbitrary `message` with the `Keypair`.
    pub fn sign(&self, message: &[u8]) -> SignatureBytes {
        SignatureBytes::new(self.signing_key.sign(message).to_bytes())
    }

    /// Get the `VerifyingKey` of this `Keypair`.
    pub fn public(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_bytes(&self) -> PublicKeyBytes {
        PublicKeyBytes::from(&self.public())
    }

    /// Get the account address derived from this `Keypair`'s verifying key.
    pub fn address(&self) -> &Address {
        &self.address
    }
}

/// Hash `bytes` twice with SHA256.
pub fn double_sha256(bytes: &[u8]) -> CryptoHash {
    let first = Sha256::digest(bytes);
    let second = Sha256::digest(first);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&second);
    CryptoHash::new(bytes)
}

/// Check that `signature` was produced over `message` by the key in `public_key`, and that `address`
/// is the address derived from that key.
pub(crate) fn verify_signature(
    address: &Address,
    public_key: &PublicKeyBytes,
    signature: &SignatureBytes,
    message: &[u8],
) -> bool {
    let verifying_key = match public_key.verifying_key() {
        Some(verifying_key) => verifying_key,
        None => return false,
    };

    if Address::from_verifying_key(&verifying_key) != *address {
        return false;
    }

    let signature = Signature::from_bytes(&signature.bytes());
    verifying_key.verify(message, &signature).is_ok()
}
