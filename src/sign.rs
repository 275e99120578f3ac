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

//! Commitment signing interface.
//!
//! Commitment transaction construction, key derivation and signing live
//! outside of the update engine; the engine only needs the four
//! operations below. Each party holds an asymmetric commitment per state,
//! so "the counterparty's commitment" and "our commitment" are distinct
//! transactions built from the same channel record.

use bitcoin::Transaction;
use secp256k1::ecdsa::Signature;
use secp256k1::PublicKey;

use crate::channel::Channel;

/// Errors from the signing backend
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum SignError {
    /// counterparty signature does not verify against the local
    /// commitment transaction
    InvalidCommitmentSig,

    /// signing backend failure: {0}
    Backend(String),
}

/// Produces and verifies commitment signatures for a channel
pub trait CommitmentSigner {
    /// Signs the counterparty's commitment transaction built from the
    /// channel's current in-memory state
    fn sign_commitment(
        &self,
        channel: &Channel,
    ) -> Result<Signature, SignError>;

    /// Verifies a counterparty signature against our own commitment
    /// transaction at the channel's current in-memory state
    fn verify_commitment_sig(
        &self,
        channel: &Channel,
        sig: &Signature,
    ) -> Result<(), SignError>;

    /// Derives the counterparty's revocable-output public key for the
    /// given state index.
    ///
    /// The derivation must be deterministic: resends after reconnect
    /// reproduce the key byte for byte.
    fn their_hakd_pubkey(
        &self,
        channel: &Channel,
        state_idx: u64,
    ) -> Result<PublicKey, SignError>;

    /// Produces a broadcastable unilateral-close transaction spending the
    /// funding output at the current committed state.
    ///
    /// Output addresses were fixed at channel creation; the local output
    /// of the counterparty is CSV-delayed and revocable.
    fn sign_break_tx(
        &self,
        channel: &Channel,
    ) -> Result<Transaction, SignError>;
}
