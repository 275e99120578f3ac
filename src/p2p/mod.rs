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

//! Peer-to-peer messages of the channel update protocol and their framing.
//!
//! A frame is a single type byte followed by the fixed-layout message body
//! (see [`encoding`] for the layouts). Framing into the underlying
//! bytestream is the transport's concern.

pub mod encoding;
mod msg;

pub use encoding::{WireDecode, WireEncode};
pub use msg::{
    AckSig, Revoke, Rts, SigRev, ACKSIG_BODY_MAX_LEN, ACKSIG_BODY_MIN_LEN,
    REVOKE_BODY_LEN, RTS_BODY_LEN, SIGREV_BODY_MAX_LEN, SIGREV_BODY_MIN_LEN,
};

use bitcoin::OutPoint;

/// Type byte of the [`Rts`] message
pub const MSG_TYPE_RTS: u8 = 0x30;

/// Type byte of the [`AckSig`] message
pub const MSG_TYPE_ACKSIG: u8 = 0x31;

/// Type byte of the [`SigRev`] message
pub const MSG_TYPE_SIGREV: u8 = 0x32;

/// Type byte of the [`Revoke`] message
pub const MSG_TYPE_REVOKE: u8 = 0x33;

/// Sum type over all messages of the channel update protocol
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, From)]
#[display(inner)]
#[non_exhaustive]
pub enum Messages {
    /// Proposal to shift balance towards the receiving peer
    #[from]
    Rts(Rts),

    /// Countersignature over the initiator's new commitment
    #[from]
    AckSig(AckSig),

    /// Countersignature over the receiver's new commitment plus revocation
    /// of the initiator's previous state
    #[from]
    SigRev(SigRev),

    /// Revocation of the receiver's previous state; terminates the round
    #[from]
    Revoke(Revoke),
}

impl Messages {
    /// Returns the wire type byte of the message
    pub fn msg_type(&self) -> u8 {
        match self {
            Messages::Rts(_) => MSG_TYPE_RTS,
            Messages::AckSig(_) => MSG_TYPE_ACKSIG,
            Messages::SigRev(_) => MSG_TYPE_SIGREV,
            Messages::Revoke(_) => MSG_TYPE_REVOKE,
        }
    }

    /// Returns the funding outpoint tagging the channel the message
    /// belongs to
    pub fn funding_outpoint(&self) -> OutPoint {
        match self {
            Messages::Rts(rts) => rts.funding_outpoint,
            Messages::AckSig(acksig) => acksig.funding_outpoint,
            Messages::SigRev(sigrev) => sigrev.funding_outpoint,
            Messages::Revoke(revoke) => revoke.funding_outpoint,
        }
    }

    /// Serializes the message into a frame (type byte followed by the
    /// message body)
    pub fn serialize(&self) -> Result<Vec<u8>, encoding::Error> {
        let body = match self {
            Messages::Rts(rts) => rts.wire_serialize()?,
            Messages::AckSig(acksig) => acksig.wire_serialize()?,
            Messages::SigRev(sigrev) => sigrev.wire_serialize()?,
            Messages::Revoke(revoke) => revoke.wire_serialize()?,
        };
        let mut frame = Vec::with_capacity(body.len() + 1);
        frame.push(self.msg_type());
        frame.extend(body);
        Ok(frame)
    }

    /// Deserializes a message from a frame, dispatching on the type byte.
    ///
    /// The body length is validated against the layout of the concrete
    /// message type before any field is parsed.
    pub fn deserialize(frame: &[u8]) -> Result<Messages, encoding::Error> {
        let (&msg_type, body) =
            frame.split_first().ok_or(encoding::Error::EmptyFrame)?;
        Ok(match msg_type {
            MSG_TYPE_RTS => Messages::Rts(Rts::wire_deserialize(body)?),
            MSG_TYPE_ACKSIG => {
                Messages::AckSig(AckSig::wire_deserialize(body)?)
            }
            MSG_TYPE_SIGREV => {
                Messages::SigRev(SigRev::wire_deserialize(body)?)
            }
            MSG_TYPE_REVOKE => {
                Messages::Revoke(Revoke::wire_deserialize(body)?)
            }
            wrong => return Err(encoding::Error::UnknownMessageType(wrong)),
        })
    }
}
