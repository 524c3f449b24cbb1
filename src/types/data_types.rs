/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes or numbers, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::{Add, Sub},
};

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use borsh::{BorshDeserialize, BorshSerialize};

use super::crypto_primitives::{Digest, Sha256, VerifyingKey};

/// Name of the blockchain (or shard) that an [`Smr`](crate::smr::Smr) instance replicates.
///
/// Every replica of the same chain must be configured with the same `ChainName`. Envelopes that
/// carry a different chain name are dropped by the dispatcher.
#[derive(Clone, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct ChainName(String);

impl ChainName {
    /// Create a new `ChainName` wrapping `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the inner `&str` of this `ChainName`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ChainName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for ChainName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

/// Round counter of the protocol. Each view has one designated leader.
///
/// View numbers are signed to stay compatible with ledgers that use the block height as the view,
/// where `-1` is occasionally used to denote "before genesis".
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct ViewNumber(i64);

impl ViewNumber {
    /// Create a new `ViewNumber` with an `int` value.
    pub const fn new(int: i64) -> Self {
        Self(int)
    }

    /// The view number that a freshly started replica has voted in.
    pub const fn init() -> Self {
        Self(0)
    }

    /// Get the `i64` value of this `ViewNumber`.
    pub const fn int(&self) -> i64 {
        self.0
    }
}

impl Display for ViewNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for ViewNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Add<i64> for ViewNumber {
    type Output = ViewNumber;
    fn add(self, rhs: i64) -> Self::Output {
        ViewNumber::new(self.0 + rhs)
    }
}

impl Sub<i64> for ViewNumber {
    type Output = ViewNumber;
    fn sub(self, rhs: i64) -> Self::Output {
        ViewNumber::new(self.0 - rhs)
    }
}

/// Opaque identifier of a proposal, as decided by the ledger layer (typically a block id).
#[derive(Clone, Default, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct ProposalId(Vec<u8>);

impl ProposalId {
    /// Create a new `ProposalId` wrapping `bytes`.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Get a reference to the inner bytes of this `ProposalId`.
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for ProposalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&STANDARD_NO_PAD.encode(&self.0))
    }
}

impl Debug for ProposalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ProposalId({})", self)
    }
}

/// Account address of a validator.
///
/// Addresses are derived from Ed25519 verifying keys with [`from_verifying_key`](Self::from_verifying_key).
/// A signature is only accepted if its [`SignInfo`](super::certificates::SignInfo) carries an address
/// that matches the signer's public key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct Address(String);

impl Address {
    /// Number of hash bytes that an address encodes.
    const ADDRESS_LEN: usize = 20;

    /// Create a new `Address` wrapping `address`. No check is made that it was derived from a key.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Derive the address of `verifying_key`: the unpadded base64 encoding of the first 20 bytes
    /// of the SHA256 hash of the key.
    pub fn from_verifying_key(verifying_key: &VerifyingKey) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(verifying_key.as_bytes());
        let digest = hasher.finalize();
        Self(STANDARD_NO_PAD.encode(&digest[..Self::ADDRESS_LEN]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

/// Transport endpoint of a validator, as understood by the [`Network`](crate::networking::Network)
/// implementation.
#[derive(Clone, Default, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct PeerAddr(String);

impl PeerAddr {
    pub fn new(peer_addr: impl Into<String>) -> Self {
        Self(peer_addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for PeerAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for PeerAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

/// Bytes of an Ed25519 verifying key, as carried in messages.
///
/// Unlike [`VerifyingKey`], instances of this type are not guaranteed to be valid curve points, so
/// conversion into a `VerifyingKey` with [`verifying_key`](Self::verifying_key) is fallible.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct PublicKeyBytes([u8; 32]);

impl PublicKeyBytes {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Try to interpret these bytes as an Ed25519 verifying key.
    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0).ok()
    }
}

impl From<&VerifyingKey> for PublicKeyBytes {
    fn from(value: &VerifyingKey) -> Self {
        Self(value.to_bytes())
    }
}

impl Debug for PublicKeyBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyBytes({})", STANDARD_NO_PAD.encode(self.0))
    }
}

/// Ed25519 digital signature.
#[derive(Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureBytes({})", STANDARD_NO_PAD.encode(self.0))
    }
}

/// 32-byte cryptographic hash. Always a double SHA256 within this crate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "CryptoHash({})", STANDARD_NO_PAD.encode(self.0))
    }
}
