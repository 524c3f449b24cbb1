/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event bus thread, which receives [events](crate::events) from the core and fires the handlers
//! registered for them.

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::events::*;
use crate::logging::Logger;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// User-defined handlers and, if logging is enabled, the default logging handlers for every event
/// type.
pub(crate) struct EventHandlers {
    pub(crate) update_qc_window_handlers: Vec<HandlerPtr<UpdateQcWindowEvent>>,
    pub(crate) collect_qc_handlers: Vec<HandlerPtr<CollectQcEvent>>,
    pub(crate) update_validator_set_handlers: Vec<HandlerPtr<UpdateValidatorSetEvent>>,
    pub(crate) propose_handlers: Vec<HandlerPtr<ProposeEvent>>,
    pub(crate) vote_handlers: Vec<HandlerPtr<VoteEvent>>,
    pub(crate) new_view_handlers: Vec<HandlerPtr<NewViewEvent>>,
    pub(crate) receive_proposal_handlers: Vec<HandlerPtr<ReceiveProposalEvent>>,
    pub(crate) receive_vote_handlers: Vec<HandlerPtr<ReceiveVoteEvent>>,
    pub(crate) receive_new_view_handlers: Vec<HandlerPtr<ReceiveNewViewEvent>>,
}

// Push the default logger of `$event` if logging is enabled, then the user handler if there is one.
macro_rules! handlers {
    ($log_events:expr, $user_handler:expr, $event:ty) => {{
        let mut handlers: Vec<HandlerPtr<$event>> = Vec::new();
        if $log_events {
            handlers.push(<$event>::get_logger());
        }
        if let Some(handler) = $user_handler {
            handlers.push(handler);
        }
        handlers
    }};
}

impl EventHandlers {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        update_qc_window_handler: Option<HandlerPtr<UpdateQcWindowEvent>>,
        collect_qc_handler: Option<HandlerPtr<CollectQcEvent>>,
        update_validator_set_handler: Option<HandlerPtr<UpdateValidatorSetEvent>>,
        propose_handler: Option<HandlerPtr<ProposeEvent>>,
        vote_handler: Option<HandlerPtr<VoteEvent>>,
        new_view_handler: Option<HandlerPtr<NewViewEvent>>,
        receive_proposal_handler: Option<HandlerPtr<ReceiveProposalEvent>>,
        receive_vote_handler: Option<HandlerPtr<ReceiveVoteEvent>>,
        receive_new_view_handler: Option<HandlerPtr<ReceiveNewViewEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            update_qc_window_handlers: handlers!(log_events, update_qc_window_handler, UpdateQcWindowEvent),
            collect_qc_handlers: handlers!(log_events, collect_qc_handler, CollectQcEvent),
            update_validator_set_handlers: handlers!(log_events, update_validator_set_handler, UpdateValidatorSetEvent),
            propose_handlers: handlers!(log_events, propose_handler, ProposeEvent),
            vote_handlers: handlers!(log_events, vote_handler, VoteEvent),
            new_view_handlers: handlers!(log_events, new_view_handler, NewViewEvent),
            receive_proposal_handlers: handlers!(log_events, receive_proposal_handler, ReceiveProposalEvent),
            receive_vote_handlers: handlers!(log_events, receive_vote_handler, ReceiveVoteEvent),
            receive_new_view_handlers: handlers!(log_events, receive_new_view_handler, ReceiveNewViewEvent),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.update_qc_window_handlers.is_empty()
            && self.collect_qc_handlers.is_empty()
            && self.update_validator_set_handlers.is_empty()
            && self.propose_handlers.is_empty()
            && self.vote_handlers.is_empty()
            && self.new_view_handlers.is_empty()
            && self.receive_proposal_handlers.is_empty()
            && self.receive_vote_handlers.is_empty()
            && self.receive_new_view_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::UpdateQcWindow(update_qc_window_event) => self
                .update_qc_window_handlers
                .iter()
                .for_each(|handler| handler(&update_qc_window_event)),

            Event::CollectQc(collect_qc_event) => self
                .collect_qc_handlers
                .iter()
                .for_each(|handler| handler(&collect_qc_event)),

            Event::UpdateValidatorSet(update_validator_set_event) => self
                .update_validator_set_handlers
                .iter()
                .for_each(|handler| handler(&update_validator_set_event)),

            Event::Propose(propose_event) => self
                .propose_handlers
                .iter()
                .for_each(|handler| handler(&propose_event)),

            Event::Vote(vote_event) => self
                .vote_handlers
                .iter()
                .for_each(|handler| handler(&vote_event)),

            Event::NewView(new_view_event) => self
                .new_view_handlers
                .iter()
                .for_each(|handler| handler(&new_view_event)),

            Event::ReceiveProposal(receive_proposal_event) => self
                .receive_proposal_handlers
                .iter()
                .for_each(|handler| handler(&receive_proposal_event)),

            Event::ReceiveVote(receive_vote_event) => self
                .receive_vote_handlers
                .iter()
                .for_each(|handler| handler(&receive_vote_event)),

            Event::ReceiveNewView(receive_new_view_event) => self
                .receive_new_view_handlers
                .iter()
                .for_each(|handler| handler(&receive_new_view_event)),
        }
    }
}

/// Spawn the event bus thread. It runs until it receives on `shutdown_signal`, or until every
/// publisher of `event_subscriber` is dropped.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => (),
        }

        match event_subscriber.recv_timeout(Duration::from_millis(50)) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => return,
        }
    })
}
