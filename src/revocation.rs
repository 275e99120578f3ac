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

//! Per-state revocation secrets.
//!
//! The send side derives the secret for any past state from a single
//! 32-byte seed; the receive side keeps a fixed-size record which is able
//! to validate every newly revealed secret against all previously received
//! ones. Secrets form a reverse SHA-256 chain: hashing the secret for
//! state `i + 1` yields the secret for state `i`, so holding the latest
//! secret is sufficient to reconstruct (and therefore punish) every
//! earlier revoked state.

use amplify::{Slice32, Wrapper};
use bitcoin::hashes::{sha256, Hash};

/// Number of states a single revocation seed can serve
pub const REVOCATION_WINDOW: u64 = 0xFFFF;

/// Errors produced by revocation secret derivation and ingestion
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, Debug, Display, Error
)]
#[display(doc_comments)]
pub enum RevocationError {
    /// state index {0} is beyond the revocation window of the channel seed
    ChainExhausted(u64),

    /// revocation secret received for state {0} does not match the
    /// previously received secrets of the channel
    InconsistentSecret(u64),
}

/// Send side: derives revocation secrets for our own past states.
///
/// The secret for state `i` is the seed hashed `REVOCATION_WINDOW - i`
/// times, so secrets are revealed chain-upwards and each new one lets the
/// counterparty recompute all earlier ones.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[derive(StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct RevocationSeed {
    seed: Slice32,
}

impl RevocationSeed {
    /// Constructs the seed from 32 bytes of entropy fixed at channel
    /// funding time
    #[inline]
    pub fn with(seed: Slice32) -> RevocationSeed {
        RevocationSeed { seed }
    }

    /// Derives the revocation secret for the given state index
    pub fn secret_at(&self, index: u64) -> Result<Slice32, RevocationError> {
        if index >= REVOCATION_WINDOW {
            return Err(RevocationError::ChainExhausted(index));
        }
        let mut secret = self.seed.into_inner();
        for _ in 0..(REVOCATION_WINDOW - index) {
            secret = sha256::Hash::hash(&secret).into_inner();
        }
        Ok(Slice32::from_inner(secret))
    }
}

/// Receive side: fixed-size record of the counterparty's revealed
/// revocation secrets.
///
/// Only the most recent secret is stored; every earlier one is computable
/// from it by repeated hashing, which is also how a newly revealed secret
/// is validated for consistency.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[derive(StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct RevocationStore {
    last_secret: Option<Slice32>,
    received: u64,
}

impl RevocationStore {
    /// Creates an empty store for a fresh channel
    #[inline]
    pub fn new() -> RevocationStore {
        RevocationStore::default()
    }

    /// Number of distinct secrets received so far
    #[inline]
    pub fn received(&self) -> u64 {
        self.received
    }

    /// The most recently received secret, if any
    #[inline]
    pub fn last_secret(&self) -> Option<Slice32> {
        self.last_secret
    }

    /// Absorbs a newly revealed revocation secret.
    ///
    /// Re-ingesting the most recent secret is accepted silently, which
    /// makes message retransmission after reconnect idempotent. A secret
    /// whose hash does not produce the previously received one is
    /// inconsistent with the chain and must break the channel.
    pub fn ingest(&mut self, secret: Slice32) -> Result<(), RevocationError> {
        match self.last_secret {
            Some(last) if last == secret => Ok(()),
            Some(last) => {
                let digest = Slice32::from_inner(
                    sha256::Hash::hash(&secret.into_inner()).into_inner(),
                );
                if digest != last {
                    return Err(RevocationError::InconsistentSecret(
                        self.received,
                    ));
                }
                self.last_secret = Some(secret);
                self.received += 1;
                Ok(())
            }
            None => {
                self.last_secret = Some(secret);
                self.received += 1;
                Ok(())
            }
        }
    }
}
