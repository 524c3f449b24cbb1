use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use chained_bft::{
    external::{AdapterError, ExternalConsensus},
    types::{certificates::QuorumCert, data_types::ProposalId},
};

#[derive(Default)]
struct Ledger {
    first: HashSet<ProposalId>,
    bodies: HashMap<ProposalId, Vec<u8>>,
    justifies: HashMap<ProposalId, QuorumCert>,
}

/// An in-memory ledger that records, for each proposal, its body and the certificate that justifies
/// it.
#[derive(Clone, Default)]
pub(crate) struct MockExternalConsensus {
    ledger: Arc<Mutex<Ledger>>,
}

impl MockExternalConsensus {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record the first proposal of the chain.
    pub(crate) fn add_first(&self, proposal_id: &ProposalId, body: &[u8]) {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.first.insert(proposal_id.clone());
        ledger.bodies.insert(proposal_id.clone(), body.to_vec());
    }

    /// Record a proposal justified by `justify`.
    pub(crate) fn add(&self, proposal_id: &ProposalId, body: &[u8], justify: QuorumCert) {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.bodies.insert(proposal_id.clone(), body.to_vec());
        ledger.justifies.insert(proposal_id.clone(), justify);
    }
}

impl ExternalConsensus for MockExternalConsensus {
    fn is_first_proposal(&self, qc: &QuorumCert) -> Result<bool, AdapterError> {
        Ok(self.ledger.lock().unwrap().first.contains(&qc.proposal_id))
    }

    fn call_pre_qc(&self, qc: &QuorumCert) -> Result<QuorumCert, AdapterError> {
        let ledger = self.ledger.lock().unwrap();
        match ledger.justifies.get(&qc.proposal_id) {
            Some(justify) => Ok(justify.stripped()),
            None if ledger.bodies.contains_key(&qc.proposal_id) => {
                Err(AdapterError::MissingJustify(qc.proposal_id.clone()))
            }
            None => Err(AdapterError::UnknownProposal(qc.proposal_id.clone())),
        }
    }

    fn call_proposal_msg_with_proposal_id(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<Vec<u8>, AdapterError> {
        self.ledger
            .lock()
            .unwrap()
            .bodies
            .get(proposal_id)
            .cloned()
            .ok_or_else(|| AdapterError::UnknownProposal(proposal_id.clone()))
    }
}
