//! Functions and types for sending messages to the P2P network.

use std::thread;

use crate::{
    messages::{new_logid, Envelope, SmrMessage},
    types::data_types::{ChainName, PeerAddr},
};

use super::network::Network;

/// Handle for sending and broadcasting messages to the [`Network`].
///
/// Sends are fire-and-forget: each one runs on its own thread, and a failed send is logged and not
/// retried.
#[derive(Clone)]
pub(crate) struct SenderHandle<N: Network> {
    network: N,
    chain_name: ChainName,
}

impl<N: Network> SenderHandle<N> {
    pub(crate) fn new(network: N, chain_name: ChainName) -> Self {
        Self {
            network,
            chain_name,
        }
    }

    /// Wrap `msg` in an envelope for this handle's chain.
    pub(crate) fn envelope<S: Into<SmrMessage>>(&self, msg: S) -> Envelope {
        Envelope::new(self.chain_name.clone(), new_logid(), &msg.into())
    }

    pub(crate) fn send<S: Into<SmrMessage>>(&self, peer: PeerAddr, msg: S) {
        let envelope = self.envelope(msg);
        let mut network = self.network.clone();
        thread::spawn(move || {
            let logid = envelope.header.logid.clone();
            if let Err(err) = network.send(&peer, envelope) {
                log::warn!("send to {} failed, logid: {}, error: {}", peer, logid, err);
            }
        });
    }

    pub(crate) fn broadcast<S: Into<SmrMessage>>(&self, peers: Vec<PeerAddr>, msg: S) {
        let envelope = self.envelope(msg);
        let mut network = self.network.clone();
        thread::spawn(move || {
            let logid = envelope.header.logid.clone();
            if let Err(err) = network.broadcast(&peers, envelope) {
                log::warn!("broadcast failed, logid: {}, error: {}", logid, err);
            }
        });
    }
}
