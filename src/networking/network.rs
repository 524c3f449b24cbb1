use std::{
    fmt::{self, Display, Formatter},
    sync::mpsc::SyncSender,
};

use crate::{
    messages::{Envelope, MessageType},
    types::data_types::PeerAddr,
};

/// Handle to a peer-to-peer transport.
///
/// Implementations are expected to deliver only envelopes whose checksum is intact, but the
/// [dispatcher](crate::smr::Smr::handle_received_msg) checks again regardless.
pub trait Network: Clone + Send + Sync + 'static {
    /// Send `envelope` to the peer at `peer`.
    fn send(&mut self, peer: &PeerAddr, envelope: Envelope) -> Result<(), NetworkError>;

    /// Send `envelope` to every peer in `peers`.
    fn broadcast(&mut self, peers: &[PeerAddr], envelope: Envelope) -> Result<(), NetworkError>;

    /// Start delivering envelopes of `msg_type` into `inbox`. Implementations should not block if `inbox`
    /// is full, and may drop envelopes instead.
    fn subscribe(
        &mut self,
        msg_type: MessageType,
        inbox: SyncSender<Envelope>,
    ) -> Result<SubscriptionId, NetworkError>;

    /// Stop delivering envelopes for `subscription`.
    fn unsubscribe(&mut self, subscription: SubscriptionId) -> Result<(), NetworkError>;
}

/// Identifies a subscription made with [`Network::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// No connection to the peer could be established.
    PeerUnreachable(PeerAddr),

    /// The subscription does not exist, or was already removed.
    UnknownSubscription(SubscriptionId),

    /// The transport has shut down.
    Closed,
}

impl Display for NetworkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::PeerUnreachable(peer) => write!(f, "peer {} is unreachable", peer),
            NetworkError::UnknownSubscription(id) => write!(f, "unknown subscription {}", id.int()),
            NetworkError::Closed => f.write_str("network is closed"),
        }
    }
}

impl std::error::Error for NetworkError {}
