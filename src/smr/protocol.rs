/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`Smr`] type, its public operations, and the handlers that the dispatcher routes inbound
//! messages to.

use std::{
    collections::HashMap,
    sync::{mpsc::Sender, Mutex, MutexGuard, PoisonError},
    time::SystemTime,
};

use crate::{
    chained_bft::Configuration,
    collectors::{NewViewCollector, VoteCollector},
    events::*,
    external::ExternalConsensus,
    logging::first_seven_base64_chars,
    messages::{Envelope, NewView, Proposal, SignedMessage, SmrMessage, Vote},
    networking::{sending::SenderHandle, Network},
    safety::{check_window_order, next_window_on_proposal, safe_proposal, Ancestry},
    types::{
        certificates::{is_quorum, QcWindow, QuorumCert, SignatureSet},
        crypto_primitives::Keypair,
        data_types::{Address, ChainName, ProposalId, ViewNumber},
        validator_set::{ValidatorSet, ValidatorSetState},
    },
};

use super::types::SmrError;

/// The most vote sets kept for proposal ids that are neither locally proposed and pending, nor the
/// proposal or generate certificate of the window. The oldest such sets are evicted first.
pub const MAX_UNTRACKED_VOTE_SETS: usize = 64;

/// The state machine replication core of one chain.
///
/// An `Smr` holds the replica's window of certificates, its validator sets, and the accumulators for
/// votes and new view messages. All of these live behind a single lock, so every handler observes and
/// updates them as one unit.
///
/// `Smr` is usually driven by a [`ChainedBft`](crate::chained_bft::ChainedBft), which feeds it inbound
/// envelopes from the network. It can also be driven directly through
/// [`handle_received_msg`](Self::handle_received_msg).
pub struct Smr<N: Network, E: ExternalConsensus> {
    chain_name: ChainName,
    keypair: Keypair,
    adapter: E,
    sender: SenderHandle<N>,
    state: Mutex<SmrState>,
    event_publisher: Option<Sender<Event>>,
}

struct SmrState {
    voted_view: ViewNumber,
    window: QcWindow,
    validator_sets: ValidatorSetState,
    votes: VoteCollector,
    new_views: NewViewCollector,
    local_proposals: HashMap<ProposalId, QuorumCert>,
}

impl<N: Network, E: ExternalConsensus> Smr<N, E> {
    /// Create the core of the chain named in `configuration`, starting from `initial_window` with
    /// `validators` as both the current and the previous validator set.
    pub fn new(
        configuration: &Configuration,
        network: N,
        adapter: E,
        validators: ValidatorSet,
        initial_window: QcWindow,
    ) -> Self {
        let smr = Self {
            chain_name: configuration.chain_name.clone(),
            keypair: Keypair::new(configuration.me.clone()),
            adapter,
            sender: SenderHandle::new(network, configuration.chain_name.clone()),
            state: Mutex::new(SmrState {
                voted_view: ViewNumber::init(),
                window: QcWindow::empty(),
                validator_sets: ValidatorSetState::new(validators, configuration.effective_delay),
                votes: VoteCollector::new(),
                new_views: NewViewCollector::new(),
                local_proposals: HashMap::new(),
            }),
            event_publisher: None,
        };
        smr.update_qc_status(&mut smr.state(), initial_window);
        smr
    }

    pub(crate) fn with_event_publisher(mut self, event_publisher: Option<Sender<Event>>) -> Self {
        self.event_publisher = event_publisher;
        self
    }

    /// Get the address of this replica.
    pub fn address(&self) -> &Address {
        self.keypair.address()
    }

    pub fn chain_name(&self) -> &ChainName {
        &self.chain_name
    }

    /// Get the highest view this replica has voted in or advanced past.
    pub fn voted_view(&self) -> ViewNumber {
        self.state().voted_view
    }

    /// Get the view in which the validator set last changed.
    pub fn vsc_view(&self) -> ViewNumber {
        self.state().validator_sets.vsc_view()
    }

    /// Get a copy of the current `(proposal_qc, generate_qc, locked_qc)` window.
    pub fn qc_window(&self) -> QcWindow {
        self.state().window.clone()
    }

    /// Get the signatures collected so far for `proposal_id`.
    pub fn votes_for(&self, proposal_id: &ProposalId) -> Option<SignatureSet> {
        self.state().votes.signatures(proposal_id).cloned()
    }

    /// Get the new view messages collected so far for `view`.
    pub fn new_views_collected(&self, view: ViewNumber) -> Vec<NewView> {
        self.state().new_views.get(view).to_vec()
    }

    /// Get the validator set that is authoritative for `for_view`.
    pub fn current_validators(&self, for_view: ViewNumber) -> ValidatorSet {
        self.state()
            .validator_sets
            .current_validators(for_view)
            .clone()
    }

    /// Check whether the votes collected for `proposal_id` form a quorum of the current validator set.
    pub fn quorum_reached(&self, proposal_id: &ProposalId) -> bool {
        let state = self.state();
        is_quorum(
            state.votes.count(proposal_id),
            state.validator_sets.validators().len(),
        )
    }

    /// Send a new view message for `view_number` to `leader`.
    ///
    /// If this replica is `prev_leader`, its generate certificate is attached as the justify. If this
    /// replica is `leader`, the message is collected locally instead of being sent.
    pub fn process_new_view(
        &self,
        view_number: ViewNumber,
        leader: &Address,
        prev_leader: &Address,
    ) -> Result<(), SmrError> {
        let (new_view, leader_peer) = {
            let state = self.state();
            if view_number < state.voted_view {
                log::warn!(
                    "process_new_view: view {} is lower than voted view {}",
                    view_number,
                    state.voted_view
                );
                return Err(SmrError::NewViewNum {
                    view_number,
                    voted_view: state.voted_view,
                });
            }

            let justify_qc = if prev_leader == self.address() {
                match self.generate_qc(&state) {
                    Ok(generate_qc) => generate_qc,
                    Err(err) => {
                        log::warn!("process_new_view: cannot attach justify: {}", err);
                        None
                    }
                }
            } else {
                None
            };

            let new_view = NewView::new(&self.keypair, view_number, justify_qc);
            if leader == self.address() {
                (new_view, None)
            } else {
                let leader_peer = state
                    .validator_sets
                    .validators()
                    .peer_addr(leader)
                    .cloned()
                    .ok_or_else(|| SmrError::InValidateSets(leader.clone()))?;
                (new_view, Some(leader_peer))
            }
        };

        Event::publish(
            &self.event_publisher,
            Event::NewView(NewViewEvent {
                timestamp: SystemTime::now(),
                new_view: new_view.clone(),
            }),
        );

        match leader_peer {
            Some(leader_peer) => {
                self.sender.send(leader_peer, new_view);
                Ok(())
            }
            None => self.handle_new_view(new_view),
        }
    }

    /// Create a certificate for a new proposal, remember it as locally proposed, and broadcast it to
    /// every member of `validators` except this replica.
    pub fn process_proposal(
        &self,
        view_number: ViewNumber,
        proposal_id: ProposalId,
        proposal_msg: Vec<u8>,
        validators: &ValidatorSet,
    ) -> Result<QuorumCert, SmrError> {
        let qc = QuorumCert::new(view_number, proposal_id, proposal_msg);
        self.state()
            .local_proposals
            .insert(qc.proposal_id.clone(), qc.clone());

        let proposal = Proposal::new(&self.keypair, view_number, qc.clone());
        Event::publish(
            &self.event_publisher,
            Event::Propose(ProposeEvent {
                timestamp: SystemTime::now(),
                proposal: proposal.clone(),
            }),
        );

        self.sender
            .broadcast(validators.peer_addrs_except(self.address()), proposal);
        Ok(qc)
    }

    /// Get the generate certificate without its proposal body, with the collected votes attached if it
    /// carries no signatures of its own.
    pub fn get_generate_qc(&self) -> Result<Option<QuorumCert>, SmrError> {
        self.generate_qc(&self.state())
    }

    /// Replace the validator set with `new_set`. See [`ValidatorSetState::update`].
    pub fn update_validate_sets(&self, new_set: ValidatorSet) {
        let mut state = self.state();
        let voted_view = state.voted_view;
        state
            .validator_sets
            .update(new_set.clone(), self.keypair.address(), voted_view);
        log::debug!(
            "update_validate_sets: {} validators, vsc_view: {}, voted_view: {}",
            new_set.len(),
            state.validator_sets.vsc_view(),
            voted_view
        );

        Event::publish(
            &self.event_publisher,
            Event::UpdateValidatorSet(UpdateValidatorSetEvent {
                timestamp: SystemTime::now(),
                validators: new_set,
                vsc_view: state.validator_sets.vsc_view(),
            }),
        );
    }

    /// Push a certificate that the ledger confirmed through another path into the window.
    ///
    /// `generate_qc` is only accepted if it is exactly one view above the current generate certificate.
    /// The current proposal certificate is kept if it is exactly one view above `generate_qc`.
    pub fn update_smr_state(&self, generate_qc: QuorumCert) {
        let mut state = self.state();
        let window = &state.window;
        if generate_qc.view_number != window.generate_view() + 1 {
            log::debug!(
                "update_smr_state: ignoring generate qc of view {}, local generate view is {}",
                generate_qc.view_number,
                window.generate_view()
            );
            return;
        }

        let keep_proposal = window.proposal_qc.is_some()
            && window.proposal_view() == generate_qc.view_number + 1;
        let next = QcWindow::new(
            if keep_proposal {
                window.proposal_qc.clone()
            } else {
                None
            },
            Some(generate_qc),
            window.generate_qc.clone(),
        );
        self.update_qc_status(&mut state, next);
    }

    /// Check that `qc` carries a quorum of distinct, valid signatures from the validator set that is
    /// authoritative for `qc.view_number`.
    pub fn verify_quorum_cert(&self, qc: &QuorumCert) -> Result<(), SmrError> {
        self.verify_qc(&self.state(), qc)
    }

    /// Verify an inbound envelope and route the message in it to its handler.
    ///
    /// Envelopes whose checksum does not match are rejected with [`SmrError::CheckDataSum`].
    /// Envelopes from another chain are dropped, returning `Ok(())`.
    pub fn handle_received_msg(&self, envelope: &Envelope) -> Result<(), SmrError> {
        let header = &envelope.header;
        log::trace!(
            "handle_received_msg: logid: {}, type: {:?}",
            header.logid,
            header.msg_type
        );

        if !envelope.verify_checksum() {
            log::warn!("handle_received_msg: checksum mismatch, logid: {}", header.logid);
            return Err(SmrError::CheckDataSum);
        }

        if header.chain_name != self.chain_name {
            log::warn!(
                "handle_received_msg: message from chain {} dropped, logid: {}",
                header.chain_name,
                header.logid
            );
            return Ok(());
        }

        let msg = envelope.decode()?;
        if msg.msg_type() != header.msg_type {
            return Err(SmrError::MessageTypeMismatch {
                header: header.msg_type,
                body: msg.msg_type(),
            });
        }

        let result = match msg {
            SmrMessage::NewView(new_view) => self.handle_new_view(new_view),
            SmrMessage::Proposal(proposal) => self.handle_proposal(proposal),
            SmrMessage::Vote(vote) => self.handle_vote(vote),
        };
        if let Err(err) = &result {
            log::warn!(
                "handle_received_msg: {:?} from logid {} rejected: {}",
                header.msg_type,
                header.logid,
                err
            );
        }
        result
    }

    /// Handle a new view message: verify it, collect it, and, if it hands over a certificate for this
    /// replica's proposal certificate, promote the proposal certificate to the generate certificate.
    fn handle_new_view(&self, new_view: NewView) -> Result<(), SmrError> {
        Event::publish(
            &self.event_publisher,
            Event::ReceiveNewView(ReceiveNewViewEvent {
                timestamp: SystemTime::now(),
                origin: new_view.signer().clone(),
                new_view: new_view.clone(),
            }),
        );

        if !new_view.is_correct() {
            return Err(SmrError::VerifySign(new_view.signer().clone()));
        }

        let mut state = self.state();
        self.add_new_view(&mut state, new_view)
    }

    fn add_new_view(&self, state: &mut SmrState, new_view: NewView) -> Result<(), SmrError> {
        if new_view.view_number < state.voted_view {
            return Err(SmrError::NewViewNum {
                view_number: new_view.view_number,
                voted_view: state.voted_view,
            });
        }

        if !state
            .validator_sets
            .current_validators(new_view.view_number)
            .contains(new_view.signer())
        {
            return Err(SmrError::InValidateSets(new_view.signer().clone()));
        }

        if let (Some(justify_qc), Some(proposal_qc)) =
            (&new_view.justify_qc, state.window.proposal_qc.clone())
        {
            if justify_qc.is_same_proposal(&proposal_qc) {
                match self.verify_qc(state, justify_qc) {
                    Ok(()) => {
                        let next =
                            QcWindow::new(None, Some(proposal_qc), state.window.generate_qc.clone());
                        check_window_order(&next)?;
                        log::debug!(
                            "add_new_view: promoting {} to generate qc as the new leader",
                            first_seven_base64_chars(justify_qc.proposal_id.bytes())
                        );
                        self.update_qc_status(state, next);
                        state
                            .votes
                            .collect_all(&justify_qc.proposal_id, &justify_qc.signatures);
                    }
                    Err(err) => log::warn!("add_new_view: justify qc rejected: {}", err),
                }
            }
        }

        if !state.new_views.collect(new_view) {
            log::debug!("add_new_view: duplicate new view message ignored");
        }
        Ok(())
    }

    /// Handle a proposal: resolve its ancestry, check that voting for it is safe, slide the window, and
    /// vote for it.
    fn handle_proposal(&self, proposal: Proposal) -> Result<(), SmrError> {
        Event::publish(
            &self.event_publisher,
            Event::ReceiveProposal(ReceiveProposalEvent {
                timestamp: SystemTime::now(),
                origin: proposal.signer().clone(),
                proposal: proposal.clone(),
            }),
        );

        if !proposal.is_correct() {
            return Err(SmrError::VerifySign(proposal.signer().clone()));
        }

        if proposal.view_number != proposal.proposal_qc.view_number {
            return Err(SmrError::PropsViewNum {
                view_number: proposal.view_number,
                qc_view: proposal.proposal_qc.view_number,
                voted_view: self.voted_view(),
            });
        }

        let proposer_peer = self
            .state()
            .validator_sets
            .current_validators(proposal.view_number)
            .peer_addr(proposal.signer())
            .cloned()
            .ok_or_else(|| SmrError::InValidateSets(proposal.signer().clone()))?;

        // The adapter may block, so ancestry is resolved before taking the lock.
        let props_qc = &proposal.proposal_qc;
        let (prev_qc, is_first) = self.call_pre_qc_with_status(props_qc)?;
        let prev_prev = prev_qc
            .as_ref()
            .map(|prev_qc| self.call_pre_qc_with_status(prev_qc).map(|(qc, _)| qc));
        let (prev_prev_qc, prev_prev_error) = match prev_prev {
            Some(Ok(prev_prev_qc)) => (prev_prev_qc, None),
            Some(Err(err)) => (None, Some(err)),
            None => (None, None),
        };

        {
            let mut state = self.state();
            let prev_certified = prev_qc
                .as_ref()
                .is_some_and(|prev_qc| self.verify_qc(&state, prev_qc).is_ok());
            let ancestry = Ancestry {
                props_qc,
                is_first,
                prev_qc: prev_qc.as_ref(),
                prev_certified,
                prev_prev_qc: prev_prev_qc.as_ref(),
            };

            safe_proposal(&state.window, state.voted_view, &ancestry)?;
            let next = next_window_on_proposal(&state.window, &ancestry, prev_prev_error)?;
            self.update_qc_status(&mut state, next);
        }

        let vote = Vote::new(&self.keypair, props_qc.proposal_id.clone());
        Event::publish(
            &self.event_publisher,
            Event::Vote(VoteEvent {
                timestamp: SystemTime::now(),
                vote: vote.clone(),
            }),
        );
        self.sender.send(proposer_peer, vote);
        Ok(())
    }

    /// Handle a vote: collect it and, once the votes for a locally proposed certificate form a quorum,
    /// make that certificate the generate certificate.
    fn handle_vote(&self, vote: Vote) -> Result<(), SmrError> {
        Event::publish(
            &self.event_publisher,
            Event::ReceiveVote(ReceiveVoteEvent {
                timestamp: SystemTime::now(),
                origin: vote.signer().clone(),
                vote: vote.clone(),
            }),
        );

        let mut state = self.state();
        self.add_vote(&mut state, &vote)?;

        let proposal_id = &vote.proposal_id;
        let signatures = match state.votes.signatures(proposal_id) {
            Some(signatures) => signatures.clone(),
            None => return Err(SmrError::GetVotes(proposal_id.clone())),
        };
        if !is_quorum(signatures.len(), state.validator_sets.validators().len()) {
            return Ok(());
        }

        let local_qc = state
            .local_proposals
            .get(proposal_id)
            .cloned()
            .ok_or_else(|| SmrError::GetLocalProposalQc(proposal_id.clone()))?;

        // Late votes for the current generate certificate only add signatures.
        if let Some(generate_qc) = state.window.generate_qc.as_mut() {
            if generate_qc.is_same_proposal(&local_qc) {
                generate_qc.signatures = signatures;
                return Ok(());
            }
        }

        if let Some(locked_qc) = &state.window.locked_qc {
            if local_qc.view_number <= locked_qc.view_number {
                return Err(SmrError::StaleProposal {
                    view_number: local_qc.view_number,
                    locked_view: locked_qc.view_number,
                });
            }
        }

        let collected_qc = local_qc.with_signatures(signatures);
        let next = QcWindow::new(
            None,
            Some(collected_qc.clone()),
            state.window.generate_qc.clone(),
        );
        check_window_order(&next)?;
        self.update_qc_status(&mut state, next);

        Event::publish(
            &self.event_publisher,
            Event::CollectQc(CollectQcEvent {
                timestamp: SystemTime::now(),
                quorum_cert: collected_qc,
            }),
        );
        Ok(())
    }

    /// Verify `vote` and add its signature to the votes for its proposal id.
    fn add_vote(&self, state: &mut SmrState, vote: &Vote) -> Result<(), SmrError> {
        if !state.validator_sets.validators().contains(vote.signer()) {
            return Err(SmrError::InValidateSets(vote.signer().clone()));
        }

        if !vote.is_correct() {
            return Err(SmrError::VerifySign(vote.signer().clone()));
        }

        if !state
            .votes
            .collect(&vote.proposal_id, vote.signature.clone())
        {
            return Err(SmrError::DuplicateVote {
                address: vote.signer().clone(),
                proposal_id: vote.proposal_id.clone(),
            });
        }

        let SmrState {
            votes,
            local_proposals,
            window,
            ..
        } = state;
        let (local_proposals, window) = (&*local_proposals, &*window);
        votes.evict_untracked(MAX_UNTRACKED_VOTE_SETS, |proposal_id| {
            is_tracked(proposal_id, local_proposals, window)
        });
        Ok(())
    }

    /// Get the certificate that justifies `qc`, with its proposal body, or `None` together with `true`
    /// if `qc` is the first proposal.
    fn call_pre_qc_with_status(
        &self,
        qc: &QuorumCert,
    ) -> Result<(Option<QuorumCert>, bool), SmrError> {
        if self.adapter.is_first_proposal(qc)? {
            return Ok((None, true));
        }

        let mut pre_qc = self.adapter.call_pre_qc(qc)?;
        pre_qc.proposal_msg = self
            .adapter
            .call_proposal_msg_with_proposal_id(&pre_qc.proposal_id)?;
        Ok((Some(pre_qc), false))
    }

    fn generate_qc(&self, state: &SmrState) -> Result<Option<QuorumCert>, SmrError> {
        let generate_qc = match &state.window.generate_qc {
            Some(generate_qc) => generate_qc.stripped(),
            None => return Ok(None),
        };

        if !generate_qc.signatures.is_empty() {
            return Ok(Some(generate_qc));
        }

        match state.votes.signatures(&generate_qc.proposal_id) {
            Some(signatures) => Ok(Some(generate_qc.with_signatures(signatures.clone()))),
            None => Err(SmrError::GetVotes(generate_qc.proposal_id)),
        }
    }

    fn verify_qc(&self, state: &SmrState, qc: &QuorumCert) -> Result<(), SmrError> {
        let validators = state.validator_sets.current_validators(qc.view_number);

        if qc.signatures.has_duplicates() {
            return Err(SmrError::JustifySignNotEnough(qc.proposal_id.clone()));
        }

        for sign_info in qc.signatures.iter() {
            if !validators.contains(&sign_info.address) {
                return Err(SmrError::InValidateSets(sign_info.address.clone()));
            }
            if !sign_info.verify(qc.proposal_id.bytes()) {
                return Err(SmrError::VerifySign(sign_info.address.clone()));
            }
        }

        if is_quorum(qc.signatures.len(), validators.len()) {
            Ok(())
        } else {
            Err(SmrError::JustifySignNotEnough(qc.proposal_id.clone()))
        }
    }

    /// Move to `window`. A proposal certificate equal to the new generate certificate is dropped, and
    /// `voted_view` follows the generate certificate's view without ever decreasing.
    fn update_qc_status(&self, state: &mut SmrState, mut window: QcWindow) {
        if let (Some(proposal_qc), Some(generate_qc)) = (&window.proposal_qc, &window.generate_qc) {
            if proposal_qc.is_same_proposal(generate_qc) {
                window.proposal_qc = None;
            }
        }

        state.voted_view = state.voted_view.max(window.generate_view());
        state.window = window;
        state.new_views.prune_below(state.voted_view);

        // Local proposals at or below the locked view can no longer advance the window.
        if let Some(locked_view) = state.window.locked_qc.as_ref().map(|qc| qc.view_number) {
            state
                .local_proposals
                .retain(|_, qc| qc.view_number > locked_view);
        }
        let SmrState {
            votes,
            local_proposals,
            window,
            ..
        } = &mut *state;
        let (local_proposals, window) = (&*local_proposals, &*window);
        votes.retain(|proposal_id| is_tracked(proposal_id, local_proposals, window));

        log::debug!(
            "update_qc_status: proposal: {:?}, generate: {:?}, locked: {:?}, voted_view: {}",
            state.window.proposal_qc.as_ref().map(|qc| qc.view_number),
            state.window.generate_qc.as_ref().map(|qc| qc.view_number),
            state.window.locked_qc.as_ref().map(|qc| qc.view_number),
            state.voted_view
        );

        Event::publish(
            &self.event_publisher,
            Event::UpdateQcWindow(UpdateQcWindowEvent {
                timestamp: SystemTime::now(),
                window: state.window.clone(),
                voted_view: state.voted_view,
            }),
        );
    }

    fn state(&self) -> MutexGuard<'_, SmrState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Check whether the votes for `proposal_id` are still needed: it is a pending local proposal, or the
/// proposal or generate certificate of `window`.
fn is_tracked(
    proposal_id: &ProposalId,
    local_proposals: &HashMap<ProposalId, QuorumCert>,
    window: &QcWindow,
) -> bool {
    local_proposals.contains_key(proposal_id)
        || [&window.proposal_qc, &window.generate_qc]
            .into_iter()
            .flatten()
            .any(|qc| qc.proposal_id == *proposal_id)
}
