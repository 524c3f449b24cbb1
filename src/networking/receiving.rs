//! Functions for receiving messages from the P2P network.

use std::{
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, TryRecvError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    external::ExternalConsensus,
    messages::{Envelope, MessageType},
    smr::Smr,
};

use super::network::{Network, NetworkError, SubscriptionId};

/// The message types that the receive loop subscribes to.
const SUBSCRIBED_TYPES: [MessageType; 3] = [
    MessageType::NewView,
    MessageType::Proposal,
    MessageType::Vote,
];

/// Subscribe a bounded inbox of capacity `capacity` to every message type the core handles.
///
/// If any subscription fails, those made before it are removed again.
pub(crate) fn register<N: Network>(
    network: &mut N,
    capacity: usize,
) -> Result<(Vec<SubscriptionId>, Receiver<Envelope>), NetworkError> {
    let (inbox, envelopes) = mpsc::sync_channel(capacity);
    let mut subscriptions = Vec::with_capacity(SUBSCRIBED_TYPES.len());
    for msg_type in SUBSCRIBED_TYPES {
        match network.subscribe(msg_type, inbox.clone()) {
            Ok(subscription) => subscriptions.push(subscription),
            Err(err) => {
                unregister(network, &subscriptions);
                return Err(err);
            }
        }
    }
    Ok((subscriptions, envelopes))
}

/// Remove every subscription in `subscriptions`. Failures are logged.
pub(crate) fn unregister<N: Network>(network: &mut N, subscriptions: &[SubscriptionId]) {
    for subscription in subscriptions {
        if let Err(err) = network.unsubscribe(*subscription) {
            log::warn!("unregister: {}", err);
        }
    }
}

/// Spawn the receive loop thread, which takes envelopes from `envelopes` and hands each one to the
/// [`Smr`]'s dispatcher on a thread of its own.
///
/// The loop runs until it receives on `shutdown_signal`. Errors returned by the dispatcher are logged
/// and never stop the loop.
pub(crate) fn start_receive_loop<N: Network, E: ExternalConsensus>(
    smr: Arc<Smr<N, E>>,
    envelopes: Receiver<Envelope>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("Receive loop disconnected from main thread")
            }
        }

        match envelopes.recv_timeout(Duration::from_millis(50)) {
            Ok(envelope) => {
                let smr = Arc::clone(&smr);
                thread::spawn(move || {
                    if let Err(err) = smr.handle_received_msg(&envelope) {
                        log::debug!(
                            "receive loop: logid {} dropped: {}",
                            envelope.header.logid,
                            err
                        );
                    }
                });
            }
            Err(RecvTimeoutError::Timeout) => (),
            // Every subscription was removed, so nothing will arrive until shutdown.
            Err(RecvTimeoutError::Disconnected) => thread::sleep(Duration::from_millis(50)),
        }
    })
}
