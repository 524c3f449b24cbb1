/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the
//! [configuration](crate::chained_bft::Configuration).
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReceiveProposal](crate::events::ReceiveProposalEvent) is printed:
//!
//! ```text
//! ReceiveProposal, 1701329264, 3kPZ1cd, YmxvY2s, 7
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the address of the origin of the proposal.
//! - The fourth value is the first seven characters of the Base64 encoding of the proposal id.
//! - The fifth value is the view of the proposal.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::{
    events::*,
    types::{certificates::QuorumCert, data_types::Address},
};

// Names of each event in PascalCase for printing:
pub const UPDATE_QC_WINDOW: &str = "UpdateQcWindow";
pub const COLLECT_QC: &str = "CollectQc";
pub const UPDATE_VALIDATOR_SET: &str = "UpdateValidatorSet";

pub const PROPOSE: &str = "Propose";
pub const VOTE: &str = "Vote";
pub const NEW_VIEW: &str = "NewView";

pub const RECEIVE_PROPOSAL: &str = "ReceiveProposal";
pub const RECEIVE_VOTE: &str = "ReceiveVote";
pub const RECEIVE_NEW_VIEW: &str = "ReceiveNewView";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for UpdateQcWindowEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_qc_window_event: &UpdateQcWindowEvent| {
            let window = &update_qc_window_event.window;
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                UPDATE_QC_WINDOW,
                secs_since_unix_epoch(update_qc_window_event.timestamp),
                qc_info(&window.proposal_qc),
                qc_info(&window.generate_qc),
                qc_info(&window.locked_qc),
                update_qc_window_event.voted_view
            )
        };
        Box::new(logger)
    }
}

impl Logger for CollectQcEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |collect_qc_event: &CollectQcEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                COLLECT_QC,
                secs_since_unix_epoch(collect_qc_event.timestamp),
                first_seven_base64_chars(collect_qc_event.quorum_cert.proposal_id.bytes()),
                collect_qc_event.quorum_cert.view_number,
                collect_qc_event.quorum_cert.signatures.len()
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateValidatorSetEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_validator_set_event: &UpdateValidatorSetEvent| {
            log::info!(
                "{}, {}, {}, {}",
                UPDATE_VALIDATOR_SET,
                secs_since_unix_epoch(update_validator_set_event.timestamp),
                update_validator_set_event.validators.len(),
                update_validator_set_event.vsc_view
            )
        };
        Box::new(logger)
    }
}

impl Logger for ProposeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |propose_event: &ProposeEvent| {
            log::info!(
                "{}, {}, {}, {}",
                PROPOSE,
                secs_since_unix_epoch(propose_event.timestamp),
                first_seven_base64_chars(propose_event.proposal.proposal_qc.proposal_id.bytes()),
                propose_event.proposal.view_number
            )
        };
        Box::new(logger)
    }
}

impl Logger for VoteEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |vote_event: &VoteEvent| {
            log::info!(
                "{}, {}, {}",
                VOTE,
                secs_since_unix_epoch(vote_event.timestamp),
                first_seven_base64_chars(vote_event.vote.proposal_id.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for NewViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |new_view_event: &NewViewEvent| {
            log::info!(
                "{}, {}, {}, {}",
                NEW_VIEW,
                secs_since_unix_epoch(new_view_event.timestamp),
                new_view_event.new_view.view_number,
                qc_info(&new_view_event.new_view.justify_qc)
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveProposalEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_proposal_event: &ReceiveProposalEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_PROPOSAL,
                secs_since_unix_epoch(receive_proposal_event.timestamp),
                short_address(&receive_proposal_event.origin),
                first_seven_base64_chars(
                    receive_proposal_event.proposal.proposal_qc.proposal_id.bytes()
                ),
                receive_proposal_event.proposal.view_number
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveVoteEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_vote_event: &ReceiveVoteEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_VOTE,
                secs_since_unix_epoch(receive_vote_event.timestamp),
                short_address(&receive_vote_event.origin),
                first_seven_base64_chars(receive_vote_event.vote.proposal_id.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveNewViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_new_view_event: &ReceiveNewViewEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_NEW_VIEW,
                secs_since_unix_epoch(receive_new_view_event.timestamp),
                short_address(&receive_new_view_event.origin),
                receive_new_view_event.new_view.view_number,
                qc_info(&receive_new_view_event.new_view.justify_qc)
            )
        };
        Box::new(logger)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
pub(crate) fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

// Addresses are already base64, so they only need truncating.
fn short_address(address: &Address) -> String {
    address.as_str().chars().take(7).collect()
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

fn qc_info(qc: &Option<QuorumCert>) -> String {
    match qc {
        Some(qc) => format!(
            "{}@{}",
            first_seven_base64_chars(qc.proposal_id.bytes()),
            qc.view_number
        ),
        None => String::from("-"),
    }
}
