// Bidirectional payment channel state update engine
// Written in 2021-2022 by
//     Dr Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

//! Channel persistence interface.
//!
//! The store is the single source of truth for channel records and is
//! responsible for serializing concurrent access: no two engine calls may
//! run against the same channel at the same time. The byte layout of the
//! persisted records is the store's concern; [`crate::channel::Channel`]
//! provides strict-encoding support a store implementation may use.

use bitcoin::OutPoint;
use secp256k1::PublicKey;

use crate::channel::Channel;

/// Errors from the channel persistence layer
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum StoreError {
    /// no channel with funding outpoint {1} is known for peer {0}
    UnknownChannel(PublicKey, OutPoint),

    /// no channel with index {channel_idx} is known for peer index
    /// {peer_idx}
    UnknownChannelIdx { peer_idx: u32, channel_idx: u32 },

    /// peer {0} is not known to the store
    UnknownPeer(PublicKey),

    /// storage backend failure: {0}
    Backend(String),
}

/// Access to persistent channel records, indexed both by peer identity
/// plus funding outpoint and by peer/channel index pair
pub trait ChannelStore {
    /// Loads the channel record identified by the counterparty and the
    /// funding outpoint
    fn channel(
        &self,
        peer_id: PublicKey,
        funding_outpoint: OutPoint,
    ) -> Result<Channel, StoreError>;

    /// Loads the channel record by its peer and channel indexes
    fn channel_by_idx(
        &self,
        peer_idx: u32,
        channel_idx: u32,
    ) -> Result<Channel, StoreError>;

    /// Atomically persists the channel record, including both revocation
    /// trees
    fn save_channel(&mut self, channel: &Channel) -> Result<(), StoreError>;

    /// Refreshes the mutable state of the provided record from the store
    fn reload_channel(&self, channel: &mut Channel)
        -> Result<(), StoreError>;

    /// Resolves a peer identity key into the peer index
    fn peer_idx(&self, peer_id: PublicKey) -> Result<u32, StoreError>;
}
