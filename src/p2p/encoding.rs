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

//! Fixed-layout big-endian wire encoding for the channel update messages.
//!
//! Unlike TLV-based lightning encodings, every message here has a rigid
//! byte layout; decoders reject a wrong-length body before parsing any
//! field.

use std::io::{self, Read, Write};

use amplify::{IoError, Slice32, Wrapper};
use bitcoin::hashes::Hash;
use bitcoin::{OutPoint, Txid};
use secp256k1::ecdsa::Signature;
use secp256k1::PublicKey;

/// Serialized length of a funding outpoint (32-byte txid + 4-byte vout)
pub const OUTPOINT_LEN: usize = 36;

/// Serialized length of a compressed secp256k1 public key
pub const PUBKEY_LEN: usize = 33;

/// Serialized length of a revocation secret
pub const SECRET_LEN: usize = 32;

/// Minimum accepted length of a DER-encoded ECDSA signature
pub const DER_SIG_MIN_LEN: usize = 66;

/// Maximum accepted length of a DER-encoded ECDSA signature
pub const DER_SIG_MAX_LEN: usize = 76;

/// Errors from wire (de)serialization of update messages
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// I/O error
    #[from(io::Error)]
    #[from(io::ErrorKind)]
    #[display(inner)]
    Io(IoError),

    /// message body is {found} bytes while this message type requires
    /// exactly {expected} bytes
    LengthMismatch { expected: usize, found: usize },

    /// message body is {found} bytes while this message type requires
    /// between {min} and {max} bytes
    LengthOutOfRange { min: usize, max: usize, found: usize },

    /// public key data does not represent a valid secp256k1 curve point
    InvalidPubkey,

    /// signature of {0} bytes does not parse as a DER-encoded ECDSA
    /// signature
    InvalidSignature(usize),

    /// not all provided data were consumed during decoding process
    DataNotEntirelyConsumed,

    /// unknown message type {0:#04x}
    UnknownMessageType(u8),

    /// message frame is empty and does not contain a type byte
    EmptyFrame,
}

/// Binary serialization of wire message data according to the fixed
/// big-endian layouts of the update protocol
pub trait WireEncode {
    /// Encode with the given [`io::Write`] instance; must return the number
    /// of bytes written
    fn wire_encode<E: Write>(&self, e: E) -> Result<usize, Error>;

    /// Serialize to an in-memory byte string
    fn wire_serialize(&self) -> Result<Vec<u8>, Error> {
        let mut encoder = io::Cursor::new(vec![]);
        self.wire_encode(&mut encoder)?;
        Ok(encoder.into_inner())
    }
}

/// Binary deserialization of wire message data according to the fixed
/// big-endian layouts of the update protocol
pub trait WireDecode
where
    Self: Sized,
{
    /// Decode with the given [`io::Read`] instance
    fn wire_decode<D: Read>(d: D) -> Result<Self, Error>;

    /// Deserialize from a byte string, erroring if not all of the data
    /// were consumed
    fn wire_deserialize(data: impl AsRef<[u8]>) -> Result<Self, Error> {
        let data = data.as_ref();
        let mut decoder = io::Cursor::new(data);
        let obj = Self::wire_decode(&mut decoder)?;
        if decoder.position() as usize != data.len() {
            return Err(Error::DataNotEntirelyConsumed);
        }
        Ok(obj)
    }
}

impl WireEncode for u32 {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let bytes = self.to_be_bytes();
        e.write_all(&bytes)?;
        Ok(bytes.len())
    }
}

impl WireDecode for u32 {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut buf = [0u8; 4];
        d.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }
}

impl WireEncode for Slice32 {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        e.write_all(self.as_inner())?;
        Ok(SECRET_LEN)
    }
}

impl WireDecode for Slice32 {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut buf = [0u8; SECRET_LEN];
        d.read_exact(&mut buf)?;
        Ok(Slice32::from_inner(buf))
    }
}

impl WireEncode for PublicKey {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        e.write_all(&self.serialize())?;
        Ok(PUBKEY_LEN)
    }
}

impl WireDecode for PublicKey {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut buf = [0u8; PUBKEY_LEN];
        d.read_exact(&mut buf)?;
        PublicKey::from_slice(&buf).map_err(|_| Error::InvalidPubkey)
    }
}

impl WireEncode for OutPoint {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        e.write_all(&self.txid.into_inner())?;
        self.vout.wire_encode(&mut e)?;
        Ok(OUTPOINT_LEN)
    }
}

impl WireDecode for OutPoint {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut buf = [0u8; 32];
        d.read_exact(&mut buf)?;
        let txid = Txid::from_inner(buf);
        let vout = u32::wire_decode(&mut d)?;
        Ok(OutPoint { txid, vout })
    }
}

impl WireEncode for Signature {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let der = self.serialize_der();
        e.write_all(&der)?;
        Ok(der.len())
    }
}

// NB: consumes the reader to its end; signatures are always the last field
// of the messages carrying them.
impl WireDecode for Signature {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut der = vec![];
        d.read_to_end(&mut der)?;
        if der.len() < DER_SIG_MIN_LEN || der.len() > DER_SIG_MAX_LEN {
            return Err(Error::LengthOutOfRange {
                min: DER_SIG_MIN_LEN,
                max: DER_SIG_MAX_LEN,
                found: der.len(),
            });
        }
        Signature::from_der(&der).map_err(|_| Error::InvalidSignature(der.len()))
    }
}
