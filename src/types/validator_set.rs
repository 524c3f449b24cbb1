/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that store information about validator sets and validator set transitions.

use std::slice;

use borsh::{BorshDeserialize, BorshSerialize};

use super::data_types::{Address, PeerAddr, ViewNumber};

/// A validator's identity and the endpoint at which it can be reached.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct CandidateInfo {
    pub address: Address,
    pub peer_addr: PeerAddr,
}

impl CandidateInfo {
    pub fn new(address: Address, peer_addr: PeerAddr) -> Self {
        Self { address, peer_addr }
    }
}

/// Stores the identities and endpoints of validators.
///
/// ## Ordering of validators
///
/// `ValidatorSet` internally maintains the list of validators in ascending order of their
/// `Address`es. Each address appears at most once.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ValidatorSet {
    candidates: Vec<CandidateInfo>,
}

impl ValidatorSet {
    /// Create an empty validator set.
    pub fn new() -> ValidatorSet {
        Self {
            candidates: Vec::new(),
        }
    }

    /// Put `candidate` into the validator set, placing it in a position that preserves the
    /// [ordering of validators](Self#ordering-of-validators).
    ///
    /// If a candidate with the same address already exists in the validator set, this function
    /// replaces its peer address instead.
    pub fn put(&mut self, candidate: CandidateInfo) {
        match self.position(&candidate.address) {
            Some(pos) => self.candidates[pos] = candidate,
            None => {
                let insert_pos = self
                    .candidates
                    .binary_search_by(|c| c.address.cmp(&candidate.address))
                    .unwrap_err();
                self.candidates.insert(insert_pos, candidate);
            }
        }
    }

    /// Remove the validator with `address` from the validator set, returning it if it was there.
    pub fn remove(&mut self, address: &Address) -> Option<CandidateInfo> {
        self.position(address)
            .map(|pos| self.candidates.remove(pos))
    }

    /// Check whether the validator set contains a validator with `address`.
    pub fn contains(&self, address: &Address) -> bool {
        self.position(address).is_some()
    }

    /// Get the validator with `address`, if any.
    pub fn get(&self, address: &Address) -> Option<&CandidateInfo> {
        self.position(address).map(|pos| &self.candidates[pos])
    }

    /// Get the peer address of the validator with `address`, if any.
    pub fn peer_addr(&self, address: &Address) -> Option<&PeerAddr> {
        self.get(address).map(|candidate| &candidate.peer_addr)
    }

    /// Get the peer addresses of every validator except the one with address `except`.
    pub fn peer_addrs_except(&self, except: &Address) -> Vec<PeerAddr> {
        self.candidates
            .iter()
            .filter(|candidate| &candidate.address != except)
            .map(|candidate| candidate.peer_addr.clone())
            .collect()
    }

    /// Get an iterator through the validators, which walks through them in ascending order of address.
    pub fn iter(&self) -> slice::Iter<CandidateInfo> {
        self.candidates.iter()
    }

    /// Get the number of validators currently in the validator set.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Check whether the validator set is empty (i.e., `self.len() == 0`).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn position(&self, address: &Address) -> Option<usize> {
        self.candidates
            .binary_search_by(|c| c.address.cmp(address))
            .ok()
    }
}

impl FromIterator<CandidateInfo> for ValidatorSet {
    fn from_iter<T: IntoIterator<Item = CandidateInfo>>(iter: T) -> Self {
        let mut validator_set = ValidatorSet::new();
        for candidate in iter {
            validator_set.put(candidate);
        }
        validator_set
    }
}

/// The current and previous validator sets of a replica, and the view in which the set last changed.
///
/// ## Delayed effectivity
///
/// A validator set change takes effect with a lag of `effective_delay` views. For the single view
/// `vsc_view + effective_delay`, messages are still checked against the previous validator set. With
/// `effective_delay == 0` the new set is authoritative immediately.
#[derive(Clone, Debug)]
pub struct ValidatorSetState {
    validators: ValidatorSet,
    pre_validators: ValidatorSet,
    vsc_view: ViewNumber,
    effective_delay: i64,
}

impl ValidatorSetState {
    /// Create the validator set state of a freshly started replica. The previous validator set starts
    /// out equal to `initial_validators`.
    pub fn new(initial_validators: ValidatorSet, effective_delay: i64) -> Self {
        Self {
            pre_validators: initial_validators.clone(),
            validators: initial_validators,
            vsc_view: ViewNumber::init(),
            effective_delay,
        }
    }

    /// Get the validator set that is authoritative for `for_view`.
    pub fn current_validators(&self, for_view: ViewNumber) -> &ValidatorSet {
        if self.effective_delay > 0 && for_view == self.vsc_view + self.effective_delay {
            &self.pre_validators
        } else {
            &self.validators
        }
    }

    /// Replace the validator set with `new_set`.
    ///
    /// If `me` is not a member of the validator set being replaced, the change is recorded as
    /// happening in `voted_view + 1`, otherwise in `voted_view`.
    pub fn update(&mut self, new_set: ValidatorSet, me: &Address, voted_view: ViewNumber) {
        self.vsc_view = if self.validators.contains(me) {
            voted_view
        } else {
            voted_view + 1
        };
        self.pre_validators = std::mem::replace(&mut self.validators, new_set);
    }

    /// Get the newest validator set.
    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    /// Get the validator set that was replaced by the most recent update.
    pub fn pre_validators(&self) -> &ValidatorSet {
        &self.pre_validators
    }

    /// Get the view in which the validator set last changed.
    pub fn vsc_view(&self) -> ViewNumber {
        self.vsc_view
    }

    pub fn effective_delay(&self) -> i64 {
        self.effective_delay
    }
}
