/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The state machine replication core of the three-chain protocol.
//!
//! ## Window of certificates
//!
//! Each replica keeps three certificates, from newest to oldest:
//! 1. `proposal_qc`: the certificate of the proposal the replica most recently voted for.
//! 2. `generate_qc`: the newest certificate known to carry a quorum of votes.
//! 3. `locked_qc`: the certificate the replica is locked on. The replica only votes for proposals that
//!    extend it, or that are justified by a certificate newer than it.
//!
//! Whenever all three are present, their views strictly decrease from `proposal_qc` to `locked_qc`.
//!
//! ## Message flow
//!
//! In every view, the leader [proposes](Smr::process_proposal) and broadcasts a proposal. Replicas
//! that find the proposal safe slide their window by one position and send a vote to the leader. Once
//! the leader collects votes from more than two thirds of the validators (not counting the leader),
//! the proposal's certificate becomes the leader's `generate_qc`.
//!
//! When a view ends, every replica sends a [new view](Smr::process_new_view) message to the next
//! leader. The previous leader attaches its `generate_qc` to it, which hands the collected
//! certificate over to the next leader.

mod protocol;
pub use protocol::{Smr, MAX_UNTRACKED_VOTE_SETS};

mod types;
pub use types::{SafetyViolation, SmrError};
