use std::{
    collections::{HashMap, HashSet},
    sync::{mpsc::SyncSender, Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use chained_bft::{
    messages::{Envelope, MessageType, SmrMessage},
    networking::{Network, NetworkError, SubscriptionId},
    types::data_types::PeerAddr,
};

/// An envelope that went through the mock network.
#[derive(Clone)]
pub(crate) struct SentEnvelope {
    pub(crate) from: PeerAddr,
    pub(crate) to: PeerAddr,
    pub(crate) envelope: Envelope,
}

impl SentEnvelope {
    pub(crate) fn msg(&self) -> SmrMessage {
        self.envelope.decode().unwrap()
    }
}

#[derive(Default)]
struct Hub {
    peers: HashSet<PeerAddr>,
    subscriptions: HashMap<PeerAddr, Vec<(SubscriptionId, MessageType, SyncSender<Envelope>)>>,
    sent: Vec<SentEnvelope>,
    next_subscription: u64,
}

/// A mock network stub which records every envelope sent through it, and delivers envelopes to the
/// inboxes the recipient subscribed, if any.
#[derive(Clone)]
pub(crate) struct NetworkStub {
    me: PeerAddr,
    hub: Arc<Mutex<Hub>>,
}

impl NetworkStub {
    /// Get every envelope this stub's owner has sent so far.
    pub(crate) fn sent(&self) -> Vec<SentEnvelope> {
        self.hub
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|sent| sent.from == self.me)
            .cloned()
            .collect()
    }

    /// Wait until this stub's owner has sent at least `count` envelopes, since sends happen on
    /// background threads.
    pub(crate) fn wait_for_sent(&self, count: usize) -> Vec<SentEnvelope> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let sent = self.sent();
            if sent.len() >= count || Instant::now() > deadline {
                return sent;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    pub(crate) fn subscription_count(&self) -> usize {
        self.hub
            .lock()
            .unwrap()
            .subscriptions
            .get(&self.me)
            .map_or(0, Vec::len)
    }

    fn deliver(&self, hub: &mut Hub, to: &PeerAddr, envelope: Envelope) -> Result<(), NetworkError> {
        if !hub.peers.contains(to) {
            return Err(NetworkError::PeerUnreachable(to.clone()));
        }

        if let Some(subscriptions) = hub.subscriptions.get(to) {
            for (_, msg_type, inbox) in subscriptions {
                if *msg_type == envelope.header.msg_type {
                    let _ = inbox.try_send(envelope.clone());
                }
            }
        }

        hub.sent.push(SentEnvelope {
            from: self.me.clone(),
            to: to.clone(),
            envelope,
        });
        Ok(())
    }
}

impl Network for NetworkStub {
    fn send(&mut self, peer: &PeerAddr, envelope: Envelope) -> Result<(), NetworkError> {
        let mut hub = self.hub.lock().unwrap();
        self.deliver(&mut hub, peer, envelope)
    }

    fn broadcast(&mut self, peers: &[PeerAddr], envelope: Envelope) -> Result<(), NetworkError> {
        let mut hub = self.hub.lock().unwrap();
        for peer in peers {
            self.deliver(&mut hub, peer, envelope.clone())?;
        }
        Ok(())
    }

    fn subscribe(
        &mut self,
        msg_type: MessageType,
        inbox: SyncSender<Envelope>,
    ) -> Result<SubscriptionId, NetworkError> {
        let mut hub = self.hub.lock().unwrap();
        hub.next_subscription += 1;
        let subscription = SubscriptionId::new(hub.next_subscription);
        hub.subscriptions
            .entry(self.me.clone())
            .or_default()
            .push((subscription, msg_type, inbox));
        Ok(subscription)
    }

    fn unsubscribe(&mut self, subscription: SubscriptionId) -> Result<(), NetworkError> {
        let mut hub = self.hub.lock().unwrap();
        let subscriptions = hub.subscriptions.entry(self.me.clone()).or_default();
        let before = subscriptions.len();
        subscriptions.retain(|(id, _, _)| *id != subscription);
        if subscriptions.len() == before {
            Err(NetworkError::UnknownSubscription(subscription))
        } else {
            Ok(())
        }
    }
}

/// Create one connected stub per peer in `peers`, in the same order.
pub(crate) fn mock_network(peers: impl Iterator<Item = PeerAddr>) -> Vec<NetworkStub> {
    let peers: Vec<PeerAddr> = peers.collect();
    let hub = Arc::new(Mutex::new(Hub {
        peers: peers.iter().cloned().collect(),
        ..Hub::default()
    }));

    peers
        .into_iter()
        .map(|me| NetworkStub {
            me,
            hub: Arc::clone(&hub),
        })
        .collect()
}
