/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A Rust implementation of the state machine replication core of chained, three-chain HotStuff
//! for permissioned blockchains.
//!
//! The core does not own blocks. It certifies opaque proposals on behalf of a ledger layer, which it
//! reaches through the [`ExternalConsensus`](external::ExternalConsensus) trait, and talks to its
//! peers through a user-provided [`Network`](networking::Network).
//!
//! To get started, read the documentation of [`chained_bft`], which describes how to configure and
//! start the core, and of [`smr`], which describes the protocol.

pub mod chained_bft;

pub mod events;

pub mod logging;

pub mod external;

pub mod messages;

pub mod networking;

pub mod pacemaker;

pub mod smr;

pub mod types;

pub(crate) mod collectors;

pub(crate) mod event_bus;

pub(crate) mod safety;
