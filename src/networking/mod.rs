//! Pluggable peer-to-peer (P2P) networking.
//!
//! The library user provides the transport by implementing [`Network`]. The core sends through it on
//! threads of its own, and receives from it through bounded inboxes that it subscribes with
//! [`Network::subscribe`].

pub mod network;

pub(crate) mod receiving;

pub(crate) mod sending;

pub use network::{Network, NetworkError, SubscriptionId};
