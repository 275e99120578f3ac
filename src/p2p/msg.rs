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

use std::io::{self, Read, Write};

use amplify::Slice32;
use bitcoin::OutPoint;
use secp256k1::ecdsa::Signature;
use secp256k1::PublicKey;

use super::encoding::{
    Error, WireDecode, WireEncode, DER_SIG_MAX_LEN, DER_SIG_MIN_LEN,
    OUTPOINT_LEN, PUBKEY_LEN, SECRET_LEN,
};

/// Body length of an [`Rts`] message
pub const RTS_BODY_LEN: usize = OUTPOINT_LEN + 4 + PUBKEY_LEN;

/// Minimum body length of an [`AckSig`] message
pub const ACKSIG_BODY_MIN_LEN: usize =
    OUTPOINT_LEN + PUBKEY_LEN + DER_SIG_MIN_LEN;

/// Maximum body length of an [`AckSig`] message
pub const ACKSIG_BODY_MAX_LEN: usize =
    OUTPOINT_LEN + PUBKEY_LEN + DER_SIG_MAX_LEN;

/// Minimum body length of a [`SigRev`] message
pub const SIGREV_BODY_MIN_LEN: usize =
    OUTPOINT_LEN + SECRET_LEN + DER_SIG_MIN_LEN;

/// Maximum body length of a [`SigRev`] message
pub const SIGREV_BODY_MAX_LEN: usize =
    OUTPOINT_LEN + SECRET_LEN + DER_SIG_MAX_LEN;

/// Body length of a [`Revoke`] message
pub const REVOKE_BODY_LEN: usize = OUTPOINT_LEN + SECRET_LEN;

/// Request-to-send: proposes adding `push_sat` satoshis to the balance of
/// the receiving peer, opening a new update round.
///
/// `hakd_pubkey` is the revocable-output public key the receiver must use
/// for its next commitment transaction; it is derived by the sender from
/// the receiver's key base, so the receiver learns it only from this
/// message.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
#[display("rts({funding_outpoint}, {push_sat} sat, ...)")]
pub struct Rts {
    /// The funding outpoint identifying the channel
    pub funding_outpoint: OutPoint,

    /// Proposed balance shift towards the receiver, in satoshis
    pub push_sat: u32,

    /// Revocable-output pubkey for the receiver's next commitment
    pub hakd_pubkey: PublicKey,
}

/// Acknowledges an [`Rts`] by countersigning the initiator's new
/// commitment transaction.
///
/// Carries the signature over the *initiator's* new commitment (so the
/// initiator can close unilaterally from this point on) together with the
/// initiator's next revocable-output pubkey.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
#[display("acksig({funding_outpoint}, ...)")]
pub struct AckSig {
    /// The funding outpoint identifying the channel
    pub funding_outpoint: OutPoint,

    /// Revocable-output pubkey for the initiator's next commitment
    pub hakd_pubkey: PublicKey,

    /// Signature over the initiator's new commitment transaction
    pub commitment_sig: Signature,
}

/// Completes the initiator's half of the round: countersigns the
/// receiver's new commitment and revokes the initiator's previous state by
/// revealing its revocation secret.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
#[display("sigrev({funding_outpoint}, ...)")]
pub struct SigRev {
    /// The funding outpoint identifying the channel
    pub funding_outpoint: OutPoint,

    /// Revocation secret for the initiator's previous commitment state
    pub revocation_secret: Slice32,

    /// Signature over the receiver's new commitment transaction
    pub commitment_sig: Signature,
}

/// Terminal message of a round: revokes the receiver's previous commitment
/// state by revealing its revocation secret.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
#[display("revoke({funding_outpoint}, ...)")]
pub struct Revoke {
    /// The funding outpoint identifying the channel
    pub funding_outpoint: OutPoint,

    /// Revocation secret for the receiver's previous commitment state
    pub revocation_secret: Slice32,
}

impl WireEncode for Rts {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        Ok(self.funding_outpoint.wire_encode(&mut e)?
            + self.push_sat.wire_encode(&mut e)?
            + self.hakd_pubkey.wire_encode(&mut e)?)
    }
}

impl WireDecode for Rts {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut body = vec![];
        d.read_to_end(&mut body)?;
        if body.len() != RTS_BODY_LEN {
            return Err(Error::LengthMismatch {
                expected: RTS_BODY_LEN,
                found: body.len(),
            });
        }
        let mut cursor = io::Cursor::new(body);
        Ok(Rts {
            funding_outpoint: OutPoint::wire_decode(&mut cursor)?,
            push_sat: u32::wire_decode(&mut cursor)?,
            hakd_pubkey: PublicKey::wire_decode(&mut cursor)?,
        })
    }
}

impl WireEncode for AckSig {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        Ok(self.funding_outpoint.wire_encode(&mut e)?
            + self.hakd_pubkey.wire_encode(&mut e)?
            + self.commitment_sig.wire_encode(&mut e)?)
    }
}

impl WireDecode for AckSig {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut body = vec![];
        d.read_to_end(&mut body)?;
        if body.len() < ACKSIG_BODY_MIN_LEN || body.len() > ACKSIG_BODY_MAX_LEN
        {
            return Err(Error::LengthOutOfRange {
                min: ACKSIG_BODY_MIN_LEN,
                max: ACKSIG_BODY_MAX_LEN,
                found: body.len(),
            });
        }
        let mut cursor = io::Cursor::new(body);
        Ok(AckSig {
            funding_outpoint: OutPoint::wire_decode(&mut cursor)?,
            hakd_pubkey: PublicKey::wire_decode(&mut cursor)?,
            commitment_sig: Signature::wire_decode(&mut cursor)?,
        })
    }
}

impl WireEncode for SigRev {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        Ok(self.funding_outpoint.wire_encode(&mut e)?
            + self.revocation_secret.wire_encode(&mut e)?
            + self.commitment_sig.wire_encode(&mut e)?)
    }
}

impl WireDecode for SigRev {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut body = vec![];
        d.read_to_end(&mut body)?;
        if body.len() < SIGREV_BODY_MIN_LEN || body.len() > SIGREV_BODY_MAX_LEN
        {
            return Err(Error::LengthOutOfRange {
                min: SIGREV_BODY_MIN_LEN,
                max: SIGREV_BODY_MAX_LEN,
                found: body.len(),
            });
        }
        let mut cursor = io::Cursor::new(body);
        Ok(SigRev {
            funding_outpoint: OutPoint::wire_decode(&mut cursor)?,
            revocation_secret: Slice32::wire_decode(&mut cursor)?,
            commitment_sig: Signature::wire_decode(&mut cursor)?,
        })
    }
}

impl WireEncode for Revoke {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        Ok(self.funding_outpoint.wire_encode(&mut e)?
            + self.revocation_secret.wire_encode(&mut e)?)
    }
}

impl WireDecode for Revoke {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut body = vec![];
        d.read_to_end(&mut body)?;
        if body.len() != REVOKE_BODY_LEN {
            return Err(Error::LengthMismatch {
                expected: REVOKE_BODY_LEN,
                found: body.len(),
            });
        }
        let mut cursor = io::Cursor::new(body);
        Ok(Revoke {
            funding_outpoint: OutPoint::wire_decode(&mut cursor)?,
            revocation_secret: Slice32::wire_decode(&mut cursor)?,
        })
    }
}
