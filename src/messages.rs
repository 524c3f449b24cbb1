/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for structured messages that are sent between replicas, and the checksummed
//! [`Envelope`] they travel in.
//!
//! There are exactly three kinds of message: [`NewView`], [`Proposal`], and [`Vote`]. `NewView` and
//! `Proposal` are "phase messages": their signature is over a digest of their phase, view, and the
//! certificates they carry. A `Vote`'s signature is over the bytes of the proposal id it endorses.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    certificates::{Phase, QuorumCert, SignInfo},
    crypto_primitives::{double_sha256, Keypair},
    data_types::{Address, ChainName, CryptoHash, ProposalId, ViewNumber},
};

/// Version of the envelope format produced by this crate.
pub const ENVELOPE_VERSION: u32 = 3;

/// All message variants used in the protocol.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum SmrMessage {
    NewView(NewView),
    Proposal(Proposal),
    Vote(Vote),
}

impl SmrMessage {
    /// Get the [`MessageType`] tag that envelopes carrying this message must have.
    pub fn msg_type(&self) -> MessageType {
        match self {
            SmrMessage::NewView(_) => MessageType::NewView,
            SmrMessage::Proposal(_) => MessageType::Proposal,
            SmrMessage::Vote(_) => MessageType::Vote,
        }
    }
}

impl From<NewView> for SmrMessage {
    fn from(value: NewView) -> Self {
        SmrMessage::NewView(value)
    }
}

impl From<Proposal> for SmrMessage {
    fn from(value: Proposal) -> Self {
        SmrMessage::Proposal(value)
    }
}

impl From<Vote> for SmrMessage {
    fn from(value: Vote) -> Self {
        SmrMessage::Vote(value)
    }
}

/// Tag in an [`EnvelopeHeader`] identifying the kind of message in the envelope's body. Also the unit
/// of [subscription](crate::networking::Network::subscribe).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub enum MessageType {
    NewView,
    Proposal,
    Vote,
}

/// Sent by a replica to the leader of the next view. The previous leader also attaches its best
/// certificate as `justify_qc`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NewView {
    pub view_number: ViewNumber,
    pub justify_qc: Option<QuorumCert>,
    pub signature: SignInfo,
}

impl NewView {
    pub fn new(keypair: &Keypair, view_number: ViewNumber, justify_qc: Option<QuorumCert>) -> Self {
        let digest = phase_digest(Phase::NewView, view_number, None, justify_qc.as_ref());
        NewView {
            view_number,
            justify_qc,
            signature: SignInfo::sign(keypair, &digest.bytes()),
        }
    }
}

/// Sent by the leader to every other validator.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Proposal {
    pub view_number: ViewNumber,
    pub proposal_qc: QuorumCert,
    pub signature: SignInfo,
}

impl Proposal {
    pub fn new(keypair: &Keypair, view_number: ViewNumber, proposal_qc: QuorumCert) -> Self {
        let digest = phase_digest(Phase::Prepare, view_number, Some(&proposal_qc), None);
        Proposal {
            view_number,
            proposal_qc,
            signature: SignInfo::sign(keypair, &digest.bytes()),
        }
    }
}

/// Sent by a replica to the leader that proposed `proposal_id`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Vote {
    pub proposal_id: ProposalId,
    pub signature: SignInfo,
}

impl Vote {
    pub fn new(keypair: &Keypair, proposal_id: ProposalId) -> Self {
        let signature = SignInfo::sign(keypair, proposal_id.bytes());
        Vote {
            proposal_id,
            signature,
        }
    }
}

/// Data types that contain: 1. A message, and 2. A [`SignInfo`] whose signature over said message can
/// be verified.
pub(crate) trait SignedMessage {
    /// Get the bytes that are passed as input into the signing function to form the signature.
    fn message_bytes(&self) -> Vec<u8>;

    /// Get the signer's endorsement.
    fn sign_info(&self) -> &SignInfo;

    /// Get the address of the signer.
    fn signer(&self) -> &Address {
        &self.sign_info().address
    }

    /// Verify that the signature is over `message_bytes`, and that it was created by the key whose
    /// address is `signer`.
    fn is_correct(&self) -> bool {
        self.sign_info().verify(&self.message_bytes())
    }
}

impl SignedMessage for NewView {
    fn message_bytes(&self) -> Vec<u8> {
        phase_digest(
            Phase::NewView,
            self.view_number,
            None,
            self.justify_qc.as_ref(),
        )
        .bytes()
        .to_vec()
    }

    fn sign_info(&self) -> &SignInfo {
        &self.signature
    }
}

impl SignedMessage for Proposal {
    fn message_bytes(&self) -> Vec<u8> {
        phase_digest(
            Phase::Prepare,
            self.view_number,
            Some(&self.proposal_qc),
            None,
        )
        .bytes()
        .to_vec()
    }

    fn sign_info(&self) -> &SignInfo {
        &self.signature
    }
}

impl SignedMessage for Vote {
    fn message_bytes(&self) -> Vec<u8> {
        self.proposal_id.bytes().to_vec()
    }

    fn sign_info(&self) -> &SignInfo {
        &self.signature
    }
}

/// Compute the digest that the signature of a phase message is over: the double SHA256 of the
/// Borsh-encoding of `(phase, view_number, proposal_qc, justify_qc)`.
fn phase_digest(
    phase: Phase,
    view_number: ViewNumber,
    proposal_qc: Option<&QuorumCert>,
    justify_qc: Option<&QuorumCert>,
) -> CryptoHash {
    let bytes = (phase, view_number, proposal_qc, justify_qc)
        .try_to_vec()
        .unwrap();
    double_sha256(&bytes)
}

/// Routing and integrity information of an [`Envelope`].
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct EnvelopeHeader {
    pub version: u32,
    pub chain_name: ChainName,
    /// Opaque identifier used to correlate log lines about the same message across replicas.
    pub logid: String,
    pub msg_type: MessageType,
    /// Double SHA256 of the envelope's body.
    pub data_checksum: CryptoHash,
}

/// A Borsh-encoded [`SmrMessage`] together with its [`EnvelopeHeader`].
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Envelope {
    pub header: EnvelopeHeader,
    pub body: Vec<u8>,
}

impl Envelope {
    /// Encode `msg` into a new envelope addressed to `chain_name`.
    pub fn new(chain_name: ChainName, logid: String, msg: &SmrMessage) -> Envelope {
        let body = msg.try_to_vec().unwrap();
        Envelope {
            header: EnvelopeHeader {
                version: ENVELOPE_VERSION,
                chain_name,
                logid,
                msg_type: msg.msg_type(),
                data_checksum: double_sha256(&body),
            },
            body,
        }
    }

    /// Check that the checksum in the header matches the body.
    pub fn verify_checksum(&self) -> bool {
        double_sha256(&self.body) == self.header.data_checksum
    }

    /// Decode the message in the body.
    pub fn decode(&self) -> std::io::Result<SmrMessage> {
        SmrMessage::try_from_slice(&self.body)
    }
}

/// Generate a fresh random log id for an outgoing envelope.
pub(crate) fn new_logid() -> String {
    format!("{:016x}", rand::random::<u64>())
}
