/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of events for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::{
    messages::{NewView, Proposal, Vote},
    types::{
        certificates::{QcWindow, QuorumCert},
        data_types::{Address, ViewNumber},
        validator_set::ValidatorSet,
    },
};

pub enum Event {
    // Events that change the replica's state.
    UpdateQcWindow(UpdateQcWindowEvent),
    CollectQc(CollectQcEvent),
    UpdateValidatorSet(UpdateValidatorSetEvent),
    // Events that involve broadcasting/sending a message.
    Propose(ProposeEvent),
    Vote(VoteEvent),
    NewView(NewViewEvent),
    // Events that involve receiving a message.
    ReceiveProposal(ReceiveProposalEvent),
    ReceiveVote(ReceiveVoteEvent),
    ReceiveNewView(ReceiveNewViewEvent),
}

impl Event {
    /// Publish `event` if there is a subscriber. Events published after the event bus has shut down are
    /// dropped.
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(event);
        }
    }
}

/// The replica's window of certificates changed.
pub struct UpdateQcWindowEvent {
    pub timestamp: SystemTime,
    pub window: QcWindow,
    pub voted_view: ViewNumber,
}

/// A certificate proposed by this replica collected a quorum of votes and became its generate
/// certificate.
pub struct CollectQcEvent {
    pub timestamp: SystemTime,
    pub quorum_cert: QuorumCert,
}

pub struct UpdateValidatorSetEvent {
    pub timestamp: SystemTime,
    pub validators: ValidatorSet,
    pub vsc_view: ViewNumber,
}

pub struct ProposeEvent {
    pub timestamp: SystemTime,
    pub proposal: Proposal,
}

pub struct VoteEvent {
    pub timestamp: SystemTime,
    pub vote: Vote,
}

pub struct NewViewEvent {
    pub timestamp: SystemTime,
    pub new_view: NewView,
}

pub struct ReceiveProposalEvent {
    pub timestamp: SystemTime,
    pub origin: Address,
    pub proposal: Proposal,
}

pub struct ReceiveVoteEvent {
    pub timestamp: SystemTime,
    pub origin: Address,
    pub vote: Vote,
}

pub struct ReceiveNewViewEvent {
    pub timestamp: SystemTime,
    pub origin: Address,
    pub new_view: NewView,
}
