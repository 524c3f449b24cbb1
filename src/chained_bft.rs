/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and run the state machine replication core of one chain.
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the core](ChainedBftSpec) with:
//!   1. `ChainedBftSpec::builder` to construct a `ChainedBftSpecBuilder`,
//!   2. The setters of the `ChainedBftSpecBuilder`, and
//!   3. The `ChainedBftSpecBuilder::build` method to construct a [ChainedBftSpec],
//! - The function to [start](ChainedBftSpec::start) a [ChainedBft] given its specification,
//! - [The type](ChainedBft) which keeps the receive loop and the event bus alive.
//!
//! ## Starting the core
//!
//! ```ignore
//! let chained_bft =
//!     ChainedBftSpec::builder()
//!     .configuration(configuration)
//!     .network(network)
//!     .adapter(adapter)
//!     .validators(validators)
//!     .on_collect_qc(collect_qc_handler)
//!     .build()
//!     .start()?;
//! ```
//!
//! ### Required setters
//!
//! - `.configuration(...)`
//! - `.network(...)`
//! - `.adapter(...)`
//! - `.validators(...)`
//!
//! ### Optional setters
//!
//! - `.initial_window(...)`, which defaults to a window holding no certificates.
//! - The setters for registering user-defined event handlers for events from [crate::events]:
//!   `.on_update_qc_window(...)`, `.on_collect_qc(...)`, `.on_update_validator_set(...)`,
//!   `.on_propose(...)`, `.on_vote(...)`, `.on_new_view(...)`, `.on_receive_proposal(...)`,
//!   `.on_receive_vote(...)`, and `.on_receive_new_view(...)`.
//!
//! The core's [configuration](Configuration) is also defined using the builder pattern:
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .chain_name(ChainName::new("main"))
//!     .me(signing_key)
//!     .effective_delay(1)
//!     .log_events(true)
//!     .build()
//! ```

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use ed25519_dalek::SigningKey;
use typed_builder::TypedBuilder;

use crate::event_bus::*;
use crate::events::*;
use crate::external::ExternalConsensus;
use crate::networking::receiving::{register, start_receive_loop, unregister};
use crate::networking::{Network, NetworkError, SubscriptionId};
use crate::smr::Smr;
use crate::types::certificates::QcWindow;
use crate::types::data_types::ChainName;
use crate::types::validator_set::ValidatorSet;

/// The capacity of the inbound message queue if none is configured.
pub const DEFAULT_NET_MSG_CHAN_SIZE: usize = 1000;

/// Stores the user-defined parameters required to run the core, that is:
/// 1. The name of the chain.
/// 2. The replica's [keypair](ed25519_dalek::SigningKey).
/// 3. The effective delay of validator set changes.
/// 4. The capacity of the inbound message queue.
/// 5. The "Log Events" flag, if set to "true" then events are logged.
///
/// ## Chain name
///
/// Envelopes carry the name of the chain they belong to. Envelopes for any other chain are dropped, so
/// that several chains can share one transport.
///
/// ## Effective delay
///
/// If the effective delay is `d > 0`, then in the view `vsc_view + d` the replica still accepts
/// messages from members of the validator set that was replaced in `vsc_view`. See
/// [`ValidatorSetState`](crate::types::validator_set::ValidatorSetState).
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.chain_name(...)`
    - `.me(...)`
    - `.effective_delay(...)`
    - `.log_events(...)`

    Optional:
    - `.net_msg_chan_size(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the name of the chain. Required."))]
    pub chain_name: ChainName,
    #[builder(setter(doc = "Set the replica's keypair, used to sign messages. Required."))]
    pub me: SigningKey,
    #[builder(setter(doc = "Set the number of views after a validator set change during which the previous set stays authoritative. Required."))]
    pub effective_delay: i64,
    #[builder(default = DEFAULT_NET_MSG_CHAN_SIZE, setter(doc = "Set the capacity of the inbound message queue. Optional, defaults to 1000."))]
    pub net_msg_chan_size: usize,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}

/// Stores all necessary parameters and trait implementations required to run the [ChainedBft].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ChainedBftSpec]. On the builder call the following methods to construct a valid [ChainedBftSpec].

    Required:
    - `.configuration(...)`
    - `.network(...)`
    - `.adapter(...)`
    - `.validators(...)`

    Optional:
    - `.initial_window(...)`
    - `.on_update_qc_window(...)`
    - `.on_collect_qc(...)`
    - `.on_update_validator_set(...)`
    - `.on_propose(...)`
    - `.on_vote(...)`
    - `.on_new_view(...)`
    - `.on_receive_proposal(...)`
    - `.on_receive_vote(...)`
    - `.on_receive_new_view(...)`
"))]
pub struct ChainedBftSpec<N: Network, E: ExternalConsensus> {
    // Required parameters
    #[builder(setter(doc = "Set the [configuration](Configuration). Required."))]
    configuration: Configuration,
    #[builder(setter(doc = "Set the implementation of peer-to-peer networking. The argument must implement the [Network](crate::networking::Network) trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the ledger layer. The argument must implement the [ExternalConsensus](crate::external::ExternalConsensus) trait. Required."))]
    adapter: E,
    #[builder(setter(doc = "Set the initial validator set. Required."))]
    validators: ValidatorSet,
    // Optional parameters
    #[builder(default, setter(doc = "Set the window of certificates to start from, e.g., one restored from the ledger. Optional."))]
    initial_window: QcWindow,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateQcWindowEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateQcWindowEvent>),
    doc = "Register a handler closure to be invoked after the replica's window of certificates changes. Optional."))]
    on_update_qc_window: Option<HandlerPtr<UpdateQcWindowEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CollectQcEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CollectQcEvent>),
    doc = "Register a handler closure to be invoked after the replica collects a quorum for one of its proposals. Optional."))]
    on_collect_qc: Option<HandlerPtr<CollectQcEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateValidatorSetEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateValidatorSetEvent>),
    doc = "Register a handler closure to be invoked after the replica updates its validator set. Optional."))]
    on_update_validator_set: Option<HandlerPtr<UpdateValidatorSetEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ProposeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ProposeEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a proposal. Optional."))]
    on_propose: Option<HandlerPtr<ProposeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&VoteEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<VoteEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a vote. Optional."))]
    on_vote: Option<HandlerPtr<VoteEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&NewViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<NewViewEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a new view message to the next leader. Optional."))]
    on_new_view: Option<HandlerPtr<NewViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveProposalEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveProposalEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a proposal. Optional."))]
    on_receive_proposal: Option<HandlerPtr<ReceiveProposalEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveVoteEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveVoteEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a vote. Optional."))]
    on_receive_vote: Option<HandlerPtr<ReceiveVoteEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveNewViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveNewViewEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a new view message. Optional."))]
    on_receive_new_view: Option<HandlerPtr<ReceiveNewViewEvent>>,
}

impl<N: Network, E: ExternalConsensus> ChainedBftSpec<N, E> {
    /// Subscribe to the network, and start the receive loop and (if there are any handlers) the event
    /// bus. Returns the handles to them in a [ChainedBft] struct.
    pub fn start(mut self) -> Result<ChainedBft<N, E>, NetworkError> {
        let event_handlers = EventHandlers::new(
            self.configuration.log_events,
            self.on_update_qc_window,
            self.on_collect_qc,
            self.on_update_validator_set,
            self.on_propose,
            self.on_vote,
            self.on_new_view,
            self.on_receive_proposal,
            self.on_receive_vote,
            self.on_receive_new_view,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let smr = Arc::new(
            Smr::new(
                &self.configuration,
                self.network.clone(),
                self.adapter,
                self.validators,
                self.initial_window,
            )
            .with_event_publisher(event_publisher),
        );

        let (subscriptions, envelopes) =
            register(&mut self.network, self.configuration.net_msg_chan_size)?;

        let (receive_loop_shutdown, receive_loop_shutdown_receiver) = mpsc::channel();
        let receive_loop = start_receive_loop(
            Arc::clone(&smr),
            envelopes,
            receive_loop_shutdown_receiver,
        );

        let (event_bus, event_bus_shutdown) = match event_subscriber {
            Some(event_subscriber) => {
                let (event_bus_shutdown, event_bus_shutdown_receiver) = mpsc::channel();
                let event_bus = start_event_bus(
                    event_handlers,
                    event_subscriber,
                    event_bus_shutdown_receiver,
                );
                (Some(event_bus), Some(event_bus_shutdown))
            }
            None => (None, None),
        };

        log::info!(
            "chained bft started on chain {} as {}",
            self.configuration.chain_name,
            smr.address()
        );

        Ok(ChainedBft {
            smr,
            network: self.network,
            subscriptions,
            receive_loop: Some(receive_loop),
            receive_loop_shutdown,
            event_bus,
            event_bus_shutdown,
        })
    }
}

/// A handle to the background threads of the core. When this value is dropped, or when
/// [`stop`](Self::stop) is called, all background threads are gracefully shut down.
pub struct ChainedBft<N: Network, E: ExternalConsensus> {
    smr: Arc<Smr<N, E>>,
    network: N,
    subscriptions: Vec<SubscriptionId>,
    receive_loop: Option<JoinHandle<()>>,
    receive_loop_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl<N: Network, E: ExternalConsensus> ChainedBft<N, E> {
    /// Get the core that this handle drives, e.g., to hand it to a
    /// [`DefaultPacemaker`](crate::pacemaker::DefaultPacemaker).
    pub fn smr(&self) -> &Arc<Smr<N, E>> {
        &self.smr
    }

    /// Stop the receive loop, remove the network subscriptions, and stop the event bus. Calling `stop`
    /// more than once has no further effect.
    ///
    /// Messages that were already handed to a handler thread are still processed.
    pub fn stop(&mut self) {
        // The receive loop is stopped before the event bus, since the handlers it spawns publish events.
        if let Some(receive_loop) = self.receive_loop.take() {
            let _ = self.receive_loop_shutdown.send(());
            if receive_loop.join().is_err() {
                log::error!("receive loop panicked");
            }
            unregister(&mut self.network, &self.subscriptions);
            self.subscriptions.clear();
        }

        if let Some(event_bus) = self.event_bus.take() {
            self.event_bus_shutdown
                .iter()
                .for_each(|shutdown| {
                    let _ = shutdown.send(());
                });
            if event_bus.join().is_err() {
                log::error!("event bus panicked");
            }
        }
    }
}

impl<N: Network, E: ExternalConsensus> Drop for ChainedBft<N, E> {
    fn drop(&mut self) {
        self.stop()
    }
}
