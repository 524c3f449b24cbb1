/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Accumulators for votes and new view messages.
//!
//! Neither collector checks signatures or membership. Callers verify a message before collecting it,
//! and hold the [`Smr`](crate::smr::Smr) lock while doing so, so that collecting is atomic with the
//! window update that may follow.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::{
    messages::NewView,
    types::{
        certificates::{SignInfo, SignatureSet},
        data_types::{ProposalId, ViewNumber},
    },
};

/// Collects vote signatures per proposal id.
#[derive(Default)]
pub(crate) struct VoteCollector {
    signature_sets: HashMap<ProposalId, SignatureSet>,
    // Proposal ids in the order their signature sets were created.
    arrivals: VecDeque<ProposalId>,
}

impl VoteCollector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add `signature` to the set for `proposal_id`. Returns `false` and does nothing if the signer
    /// has already voted for `proposal_id`.
    pub(crate) fn collect(&mut self, proposal_id: &ProposalId, signature: SignInfo) -> bool {
        self.signature_set_mut(proposal_id).insert(signature)
    }

    /// Record every signature of `signatures` for `proposal_id`, for example those of a certificate
    /// handed over by the previous leader.
    pub(crate) fn collect_all(&mut self, proposal_id: &ProposalId, signatures: &SignatureSet) {
        self.signature_set_mut(proposal_id).merge(signatures)
    }

    pub(crate) fn signatures(&self, proposal_id: &ProposalId) -> Option<&SignatureSet> {
        self.signature_sets.get(proposal_id)
    }

    /// Get the number of distinct signers that voted for `proposal_id`.
    pub(crate) fn count(&self, proposal_id: &ProposalId) -> usize {
        self.signature_sets
            .get(proposal_id)
            .map_or(0, SignatureSet::len)
    }

    /// Keep only the signature sets whose proposal id satisfies `keep`.
    pub(crate) fn retain(&mut self, keep: impl Fn(&ProposalId) -> bool) {
        self.signature_sets.retain(|proposal_id, _| keep(proposal_id));
        self.arrivals.retain(|proposal_id| keep(proposal_id));
    }

    /// Drop the oldest signature sets whose proposal id is not `tracked` until at most `limit` of
    /// them remain. Sets of tracked proposal ids are never dropped.
    pub(crate) fn evict_untracked(&mut self, limit: usize, tracked: impl Fn(&ProposalId) -> bool) {
        let untracked = self
            .signature_sets
            .keys()
            .filter(|proposal_id| !tracked(*proposal_id))
            .count();
        let mut excess = untracked.saturating_sub(limit);
        if excess == 0 {
            return;
        }

        let signature_sets = &mut self.signature_sets;
        self.arrivals.retain(|proposal_id| {
            if excess > 0 && !tracked(proposal_id) {
                signature_sets.remove(proposal_id);
                excess -= 1;
                false
            } else {
                true
            }
        });
    }

    fn signature_set_mut(&mut self, proposal_id: &ProposalId) -> &mut SignatureSet {
        if !self.signature_sets.contains_key(proposal_id) {
            self.arrivals.push_back(proposal_id.clone());
        }
        self.signature_sets.entry(proposal_id.clone()).or_default()
    }
}

/// Collects new view messages per view.
#[derive(Default)]
pub(crate) struct NewViewCollector {
    new_views: BTreeMap<ViewNumber, Vec<NewView>>,
}

impl NewViewCollector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store `new_view`. Returns `false` and does nothing if a new view message from the same sender
    /// was already collected for the same view.
    pub(crate) fn collect(&mut self, new_view: NewView) -> bool {
        let collected = self.new_views.entry(new_view.view_number).or_default();
        if collected
            .iter()
            .any(|nv| nv.signature.address == new_view.signature.address)
        {
            return false;
        }
        collected.push(new_view);
        true
    }

    pub(crate) fn get(&self, view: ViewNumber) -> &[NewView] {
        self.new_views.get(&view).map_or(&[], Vec::as_slice)
    }

    /// Drop every message collected for a view lower than `view`.
    pub(crate) fn prune_below(&mut self, view: ViewNumber) {
        self.new_views = self.new_views.split_off(&view);
    }
}
