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

//! Peer message delivery interface.
//!
//! The transport is an authenticated, ordered, reliable bytestream per
//! peer. Delivery failures surface as errors; the engine never retries on
//! its own and instead relies on reconnect plus
//! [`crate::engine::UpdateEngine::send_next_msg`].

use std::io;

use amplify::IoError;
use secp256k1::PublicKey;

use crate::p2p::{encoding, Messages};

/// Errors from message delivery
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum TransportError {
    /// I/O error
    #[from(io::Error)]
    #[display(inner)]
    Io(IoError),

    /// no connection to peer {0} is available
    Disconnected(PublicKey),

    /// message framing failure: {0}
    #[from]
    Frame(encoding::Error),
}

/// Delivers update messages to remote peers.
///
/// The peer identity is threaded through every call explicitly; the
/// engine never assumes an ambient "currently connected peer".
pub trait PeerTransport {
    /// Sends a single protocol message to the given peer
    fn send_message(
        &mut self,
        peer_id: PublicKey,
        message: Messages,
    ) -> Result<(), TransportError>;
}
