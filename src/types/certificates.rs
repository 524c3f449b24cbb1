/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Quorum certificates and the signatures they aggregate.
//!
//! A [`QuorumCert`] serves as proof that a quorum of validators endorsed a proposal in a given view.
//! The three most recent certificates a replica tracks form its [`QcWindow`].

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    crypto_primitives::{verify_signature, Keypair},
    data_types::{Address, ProposalId, PublicKeyBytes, SignatureBytes, ViewNumber},
};

/// One validator's endorsement: its address, its public key, and its signature over some message.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignInfo {
    pub address: Address,
    pub public_key: PublicKeyBytes,
    pub signature: SignatureBytes,
}

impl SignInfo {
    /// Sign `message` with `keypair`.
    pub fn sign(keypair: &Keypair, message: &[u8]) -> SignInfo {
        SignInfo {
            address: keypair.address().clone(),
            public_key: keypair.public_bytes(),
            signature: keypair.sign(message),
        }
    }

    /// Check that `signature` is a signature over `message` by `public_key`, and that `address` is the
    /// address of `public_key`.
    pub fn verify(&self, message: &[u8]) -> bool {
        verify_signature(&self.address, &self.public_key, &self.signature, message)
    }
}

/// The signatures collected for a single proposal, deduplicated by signer address.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignatureSet(Vec<SignInfo>);

impl SignatureSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert `sign_info` into the set. Returns `false` and leaves the set unchanged if a signature
    /// from the same address is already present.
    pub fn insert(&mut self, sign_info: SignInfo) -> bool {
        if self.contains(&sign_info.address) {
            return false;
        }
        self.0.push(sign_info);
        true
    }

    /// Add every signature of `other` whose signer is not yet in the set.
    pub fn merge(&mut self, other: &SignatureSet) {
        for sign_info in other.iter() {
            self.insert(sign_info.clone());
        }
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.0.iter().any(|sign_info| &sign_info.address == address)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SignInfo> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check whether the set holds two signatures from the same address. Sets built with
    /// [`insert`](Self::insert) never do, but sets decoded off the wire might.
    pub(crate) fn has_duplicates(&self) -> bool {
        self.0
            .iter()
            .enumerate()
            .any(|(i, a)| self.0[i + 1..].iter().any(|b| a.address == b.address))
    }
}

impl From<Vec<SignInfo>> for SignatureSet {
    /// Build a set from `sign_infos`, keeping only the first signature of each address.
    fn from(sign_infos: Vec<SignInfo>) -> Self {
        let mut set = SignatureSet::new();
        for sign_info in sign_infos {
            set.insert(sign_info);
        }
        set
    }
}

/// Compute the number of signatures that a set of `validator_count` validators must *exceed* for a
/// certificate to count as a quorum: `floor((n - 1) * 2 / 3)`.
///
/// For `n = 4` the threshold is 2, i.e., three signatures form a quorum.
pub const fn quorum_threshold(validator_count: usize) -> usize {
    validator_count.saturating_sub(1) * 2 / 3
}

/// Check whether `signature_count` distinct signatures form a quorum in a set of `validator_count`
/// validators.
pub const fn is_quorum(signature_count: usize, validator_count: usize) -> bool {
    signature_count > quorum_threshold(validator_count)
}

/// The phase of the protocol a [`QuorumCert`] or phase message belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub enum Phase {
    NewView,
    Prepare,
    PreCommit,
    Commit,
    Decide,
}

/// Proof that a quorum of validators endorsed `proposal_id` in `view_number`.
///
/// The identity of a certificate is its `proposal_id`, and certificates are ordered by `view_number`.
/// `proposal_msg` holds the opaque proposal body, and may be empty when the certificate was
/// [`stripped`](Self::stripped) before transmission. Consumers that need the body re-fetch it from
/// [`ExternalConsensus`](crate::external::ExternalConsensus).
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct QuorumCert {
    pub proposal_id: ProposalId,
    pub proposal_msg: Vec<u8>,
    pub view_number: ViewNumber,
    pub phase: Phase,
    pub signatures: SignatureSet,
}

impl QuorumCert {
    /// Create a fresh, unsigned certificate in the [`Prepare`](Phase::Prepare) phase.
    pub fn new(view_number: ViewNumber, proposal_id: ProposalId, proposal_msg: Vec<u8>) -> Self {
        Self {
            proposal_id,
            proposal_msg,
            view_number,
            phase: Phase::Prepare,
            signatures: SignatureSet::new(),
        }
    }

    /// Check whether `self` and `other` certify the same proposal.
    pub fn is_same_proposal(&self, other: &QuorumCert) -> bool {
        self.proposal_id == other.proposal_id
    }

    /// Get a copy of this certificate without its proposal body.
    pub fn stripped(&self) -> QuorumCert {
        QuorumCert {
            proposal_msg: Vec::new(),
            ..self.clone()
        }
    }

    /// Get a copy of this certificate carrying `signatures` instead of its own.
    pub fn with_signatures(&self, signatures: SignatureSet) -> QuorumCert {
        QuorumCert {
            signatures,
            ..self.clone()
        }
    }
}

/// The three-deep window of certificates a replica tracks.
///
/// When all three are present, `locked_qc.view_number < generate_qc.view_number < proposal_qc.view_number`.
/// The block referenced by `locked_qc` is final once the window forms a contiguous chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QcWindow {
    pub proposal_qc: Option<QuorumCert>,
    pub generate_qc: Option<QuorumCert>,
    pub locked_qc: Option<QuorumCert>,
}

impl QcWindow {
    pub fn new(
        proposal_qc: Option<QuorumCert>,
        generate_qc: Option<QuorumCert>,
        locked_qc: Option<QuorumCert>,
    ) -> Self {
        Self {
            proposal_qc,
            generate_qc,
            locked_qc,
        }
    }

    /// A window with no certificates, as held by a replica of a chain at genesis.
    pub fn empty() -> Self {
        Self::default()
    }

    /// View number of the proposal certificate, or the initial view if there is none.
    pub fn proposal_view(&self) -> ViewNumber {
        view_or_init(&self.proposal_qc)
    }

    pub fn generate_view(&self) -> ViewNumber {
        view_or_init(&self.generate_qc)
    }

    pub fn locked_view(&self) -> ViewNumber {
        view_or_init(&self.locked_qc)
    }

    /// Check that the views of the certificates present in the window strictly increase from
    /// `locked_qc` to `generate_qc` to `proposal_qc`.
    pub fn is_ordered(&self) -> bool {
        let views = [&self.locked_qc, &self.generate_qc, &self.proposal_qc];
        let present: Vec<ViewNumber> = views
            .iter()
            .filter_map(|qc| qc.as_ref().map(|qc| qc.view_number))
            .collect();
        present.windows(2).all(|pair| pair[0] < pair[1])
    }
}

fn view_or_init(qc: &Option<QuorumCert>) -> ViewNumber {
    qc.as_ref()
        .map(|qc| qc.view_number)
        .unwrap_or(ViewNumber::init())
}
