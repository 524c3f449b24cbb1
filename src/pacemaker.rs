/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A pacemaker that moves the [`Smr`] through views as the ledger produces proposals.
//!
//! The [`DefaultPacemaker`] uses the height of a proposal as its view, so the view of a chain advances
//! by one with every block. The ledger layer calls [`next_new_view`](DefaultPacemaker::next_new_view)
//! whenever the leader changes, and [`next_new_proposal`](DefaultPacemaker::next_new_proposal)
//! whenever the local replica produces a block.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use crate::{
    external::ExternalConsensus,
    logging::first_seven_base64_chars,
    networking::Network,
    smr::{Smr, SmrError},
    types::{
        certificates::QuorumCert,
        data_types::{Address, ProposalId, ViewNumber},
        validator_set::ValidatorSet,
    },
};

pub struct DefaultPacemaker<N: Network, E: ExternalConsensus> {
    first_proposal_view: ViewNumber,
    current_view: ViewNumber,
    smr: Arc<Smr<N, E>>,
}

impl<N: Network, E: ExternalConsensus> DefaultPacemaker<N, E> {
    /// Create a pacemaker for a chain whose consensus starts after the block at height `start_view`.
    /// The first proposal is therefore the one for view `start_view + 1`.
    pub fn new(smr: Arc<Smr<N, E>>, start_view: ViewNumber, current_view: ViewNumber) -> Self {
        Self {
            first_proposal_view: start_view + 1,
            current_view,
            smr,
        }
    }

    pub fn current_view(&self) -> ViewNumber {
        self.current_view
    }

    /// Get the view of the first proposal after the start of consensus.
    pub fn first_proposal_view(&self) -> ViewNumber {
        self.first_proposal_view
    }

    pub fn smr(&self) -> &Arc<Smr<N, E>> {
        &self.smr
    }

    /// Send a new view message for `view_number` to `leader`, and move to `view_number` if that
    /// succeeds.
    pub fn next_new_view(
        &mut self,
        view_number: ViewNumber,
        leader: &Address,
        prev_leader: &Address,
    ) -> Result<(), PacemakerError> {
        if view_number < self.current_view - 1 {
            return Err(PacemakerError::ViewTooLow {
                view_number,
                current_view: self.current_view,
            });
        }

        self.smr
            .process_new_view(view_number, leader, prev_leader)?;
        self.current_view = view_number;
        log::info!(
            "next_new_view: current view: {}, leader: {}",
            self.current_view,
            leader
        );
        Ok(())
    }

    /// Propose the block `proposal_id` at height `view_number` to the current validator set, and move
    /// to `view_number` if that succeeds.
    pub fn next_new_proposal(
        &mut self,
        view_number: ViewNumber,
        proposal_id: ProposalId,
        proposal_msg: Vec<u8>,
    ) -> Result<QuorumCert, PacemakerError> {
        if view_number < self.current_view - 1 {
            return Err(PacemakerError::ViewTooLow {
                view_number,
                current_view: self.current_view,
            });
        }

        let validators = self.smr.current_validators(view_number);
        let qc = self
            .smr
            .process_proposal(view_number, proposal_id, proposal_msg, &validators)?;
        self.current_view = view_number;
        log::info!(
            "next_new_proposal: current view: {}, proposal: {}",
            self.current_view,
            first_seven_base64_chars(qc.proposal_id.bytes())
        );
        Ok(qc)
    }

    /// Get the newest certificate that carries a quorum.
    pub fn current_qc_high(&self) -> Result<Option<QuorumCert>, PacemakerError> {
        Ok(self.smr.get_generate_qc()?)
    }

    pub fn update_validator_set(&self, validators: ValidatorSet) {
        self.smr.update_validate_sets(validators)
    }

    /// Check whether `qc` certifies the first proposal after the start of consensus.
    pub fn is_first_proposal(&self, qc: &QuorumCert) -> bool {
        qc.view_number == self.first_proposal_view
    }

    /// Check whether the block at the tip of the ledger, `tip_id`, is the one certified by the generate
    /// certificate.
    pub fn is_last_view_confirmed(&self, tip_id: &ProposalId) -> bool {
        match self.smr.get_generate_qc() {
            Ok(Some(qc)) => &qc.proposal_id == tip_id,
            Ok(None) => false,
            Err(err) => {
                log::warn!("is_last_view_confirmed: {}", err);
                false
            }
        }
    }

    pub fn update_smr_state(&self, generate_qc: QuorumCert) {
        self.smr.update_smr_state(generate_qc)
    }
}

#[derive(Debug)]
pub enum PacemakerError {
    /// The requested view is more than one view behind the current view.
    ViewTooLow {
        view_number: ViewNumber,
        current_view: ViewNumber,
    },

    Smr(SmrError),
}

impl From<SmrError> for PacemakerError {
    fn from(value: SmrError) -> Self {
        PacemakerError::Smr(value)
    }
}

impl Display for PacemakerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PacemakerError::ViewTooLow {
                view_number,
                current_view,
            } => write!(
                f,
                "view {} is too far behind current view {}",
                view_number, current_view
            ),
            PacemakerError::Smr(err) => Display::fmt(err, f),
        }
    }
}

impl std::error::Error for PacemakerError {}
