/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The interface through which the core reaches the ledger layer.
//!
//! A proposal's body belongs to the ledger, not to the state machine replication core. The core
//! therefore cannot walk a proposal's ancestry on its own: it asks an [`ExternalConsensus`]
//! implementation for the certificate that justifies a proposal, and for the body of a proposal
//! given its id.

use std::fmt::{self, Display, Formatter};

use crate::types::{certificates::QuorumCert, data_types::ProposalId};

pub trait ExternalConsensus: Send + Sync + 'static {
    /// Check whether `qc` certifies the first proposal of the chain, i.e., one that has no ancestor
    /// certificate.
    fn is_first_proposal(&self, qc: &QuorumCert) -> Result<bool, AdapterError>;

    /// Get the certificate that justifies the proposal certified by `qc`, i.e., its parent's
    /// certificate.
    fn call_pre_qc(&self, qc: &QuorumCert) -> Result<QuorumCert, AdapterError>;

    /// Get the body of the proposal identified by `proposal_id`.
    fn call_proposal_msg_with_proposal_id(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<Vec<u8>, AdapterError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// The ledger does not know the proposal.
    UnknownProposal(ProposalId),

    /// The proposal is known, but its body does not carry a justifying certificate.
    MissingJustify(ProposalId),

    /// Any other failure of the ledger layer.
    Ledger(String),
}

impl Display for AdapterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AdapterError::UnknownProposal(id) => write!(f, "unknown proposal {}", id),
            AdapterError::MissingJustify(id) => write!(f, "proposal {} carries no justify", id),
            AdapterError::Ledger(reason) => write!(f, "ledger error: {}", reason),
        }
    }
}

impl std::error::Error for AdapterError {}
