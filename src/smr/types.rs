/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Errors returned by the [`Smr`](super::Smr)'s operations and message handlers.

use std::fmt::{self, Display, Formatter};

use crate::{
    external::AdapterError,
    messages::MessageType,
    types::data_types::{Address, ProposalId, ViewNumber},
};

#[derive(Debug)]
pub enum SmrError {
    /// A new view message, or a request to send one, is for a view lower than the voted view.
    NewViewNum {
        view_number: ViewNumber,
        voted_view: ViewNumber,
    },

    /// A proposal is for a view that the replica has already moved past, or its view differs from the
    /// view of the certificate it carries.
    PropsViewNum {
        view_number: ViewNumber,
        qc_view: ViewNumber,
        voted_view: ViewNumber,
    },

    /// Voting for a proposal would violate safety.
    SafeProposal(SafetyViolation),

    /// The votes for a proposal have not been collected, so its certificate cannot be assembled.
    GetVotes(ProposalId),

    /// A certificate does not carry a quorum of valid signatures from the applicable validator set.
    JustifySignNotEnough(ProposalId),

    /// A quorum was reached for a proposal that this replica did not propose.
    GetLocalProposalQc(ProposalId),

    /// A locally proposed certificate reached a quorum, but is not newer than the locked certificate.
    StaleProposal {
        view_number: ViewNumber,
        locked_view: ViewNumber,
    },

    /// The signature of a message does not verify, or does not match the signer's address.
    VerifySign(Address),

    /// A signer already voted for the same proposal.
    DuplicateVote {
        address: Address,
        proposal_id: ProposalId,
    },

    /// The signer is not in the validator set applicable to the message.
    InValidateSets(Address),

    /// The checksum of an envelope does not match its body.
    CheckDataSum,

    /// An envelope's header announces a different message type than its body contains.
    MessageTypeMismatch {
        header: MessageType,
        body: MessageType,
    },

    /// An envelope's body could not be decoded.
    Decode(std::io::Error),

    /// The ledger layer could not resolve a certificate or proposal body.
    Adapter(AdapterError),
}

/// The ways in which a proposal can fail the safety check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyViolation {
    /// A proposal that is not the first has no justifying certificate.
    MissingAncestor,

    /// The justifying certificate does not carry a quorum of valid signatures.
    UncertifiedAncestor,

    /// The proposal neither extends the locked certificate nor is justified by a newer one.
    NotExtendingLock,

    /// Views would not strictly increase from the locked to the generate to the proposal certificate.
    ViewOrder,

    /// A different proposal for the same or a higher view is already held.
    Equivocation,
}

impl From<AdapterError> for SmrError {
    fn from(value: AdapterError) -> Self {
        SmrError::Adapter(value)
    }
}

impl From<std::io::Error> for SmrError {
    fn from(value: std::io::Error) -> Self {
        SmrError::Decode(value)
    }
}

impl From<SafetyViolation> for SmrError {
    fn from(value: SafetyViolation) -> Self {
        SmrError::SafeProposal(value)
    }
}

impl Display for SmrError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SmrError::NewViewNum {
                view_number,
                voted_view,
            } => write!(
                f,
                "new view number {} is lower than voted view {}",
                view_number, voted_view
            ),
            SmrError::PropsViewNum {
                view_number,
                qc_view,
                voted_view,
            } => write!(
                f,
                "proposal for view {} carrying a certificate for view {} is unusable, voted view is {}",
                view_number, qc_view, voted_view
            ),
            SmrError::SafeProposal(violation) => write!(f, "unsafe proposal: {:?}", violation),
            SmrError::GetVotes(id) => write!(f, "no votes collected for {}", id),
            SmrError::JustifySignNotEnough(id) => {
                write!(f, "certificate for {} lacks a valid quorum", id)
            }
            SmrError::GetLocalProposalQc(id) => write!(f, "{} was not proposed locally", id),
            SmrError::StaleProposal {
                view_number,
                locked_view,
            } => write!(
                f,
                "proposal of view {} is not newer than locked view {}",
                view_number, locked_view
            ),
            SmrError::VerifySign(address) => write!(f, "invalid signature from {}", address),
            SmrError::DuplicateVote {
                address,
                proposal_id,
            } => write!(f, "{} already voted for {}", address, proposal_id),
            SmrError::InValidateSets(address) => write!(f, "{} is not a validator", address),
            SmrError::CheckDataSum => f.write_str("envelope checksum mismatch"),
            SmrError::MessageTypeMismatch { header, body } => write!(
                f,
                "envelope announces {:?} but carries {:?}",
                header, body
            ),
            SmrError::Decode(err) => write!(f, "cannot decode message: {}", err),
            SmrError::Adapter(err) => write!(f, "external consensus error: {}", err),
        }
    }
}

impl std::error::Error for SmrError {}
