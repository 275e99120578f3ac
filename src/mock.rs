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

//! In-memory doubles of the external collaborators, used by the engine
//! tests to drive both peers of a channel inside a single process.

use std::collections::{HashMap, VecDeque};

use bitcoin::hashes::{sha256, Hash, HashEngine};
use bitcoin::{
    OutPoint, PackedLockTime, Script, Sequence, Transaction, TxIn, TxOut,
    Witness,
};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};

use crate::channel::Channel;
use crate::p2p::Messages;
use crate::sign::{CommitmentSigner, SignError};
use crate::store::{ChannelStore, StoreError};
use crate::transport::{PeerTransport, TransportError};

/// Hash-map backed channel store
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    channels: HashMap<(PublicKey, OutPoint), Channel>,
    index: HashMap<(u32, u32), (PublicKey, OutPoint)>,
    peers: HashMap<PublicKey, u32>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Registers a channel record under the given peer and channel
    /// indexes
    pub fn insert(&mut self, peer_idx: u32, channel_idx: u32, channel: Channel) {
        self.peers.insert(channel.peer_id, peer_idx);
        self.index.insert(
            (peer_idx, channel_idx),
            (channel.peer_id, channel.funding_outpoint),
        );
        self.channels
            .insert((channel.peer_id, channel.funding_outpoint), channel);
    }
}

impl ChannelStore for MemoryStore {
    fn channel(
        &self,
        peer_id: PublicKey,
        funding_outpoint: OutPoint,
    ) -> Result<Channel, StoreError> {
        self.channels
            .get(&(peer_id, funding_outpoint))
            .cloned()
            .ok_or(StoreError::UnknownChannel(peer_id, funding_outpoint))
    }

    fn channel_by_idx(
        &self,
        peer_idx: u32,
        channel_idx: u32,
    ) -> Result<Channel, StoreError> {
        let key = self
            .index
            .get(&(peer_idx, channel_idx))
            .ok_or(StoreError::UnknownChannelIdx {
                peer_idx,
                channel_idx,
            })?;
        self.channel(key.0, key.1)
    }

    fn save_channel(&mut self, channel: &Channel) -> Result<(), StoreError> {
        self.channels.insert(
            (channel.peer_id, channel.funding_outpoint),
            channel.clone(),
        );
        Ok(())
    }

    fn reload_channel(
        &self,
        channel: &mut Channel,
    ) -> Result<(), StoreError> {
        *channel = self.channel(channel.peer_id, channel.funding_outpoint)?;
        Ok(())
    }

    fn peer_idx(&self, peer_id: PublicKey) -> Result<u32, StoreError> {
        self.peers
            .get(&peer_id)
            .copied()
            .ok_or(StoreError::UnknownPeer(peer_id))
    }
}

/// Deterministic signer substituting the wallet backend.
///
/// Commitment "transactions" are reduced to a digest over the channel
/// outpoint, state index and the amount owed to the commitment holder, so
/// two mock signers sharing each other's public keys produce mutually
/// verifiable signatures with the same asymmetry as the real commitments.
pub struct MockSigner {
    local_key: SecretKey,
    remote_pubkey: PublicKey,
}

impl MockSigner {
    pub fn with(local_key: SecretKey, remote_pubkey: PublicKey) -> MockSigner {
        MockSigner {
            local_key,
            remote_pubkey,
        }
    }

    fn commitment_digest(channel: &Channel, holder_amt_sat: u64) -> Message {
        let mut engine = sha256::Hash::engine();
        engine.input(b"commitment");
        engine.input(&channel.funding_outpoint.txid.into_inner());
        engine.input(&channel.funding_outpoint.vout.to_be_bytes());
        engine.input(&channel.state.state_idx.to_be_bytes());
        engine.input(&holder_amt_sat.to_be_bytes());
        Message::from_slice(&sha256::Hash::from_engine(engine)[..])
            .expect("sha256 digest is always a valid message")
    }
}

impl CommitmentSigner for MockSigner {
    fn sign_commitment(
        &self,
        channel: &Channel,
    ) -> Result<Signature, SignError> {
        let digest =
            Self::commitment_digest(channel, channel.their_amt_sat());
        Ok(SECP256K1.sign_ecdsa(&digest, &self.local_key))
    }

    fn verify_commitment_sig(
        &self,
        channel: &Channel,
        sig: &Signature,
    ) -> Result<(), SignError> {
        let digest =
            Self::commitment_digest(channel, channel.state.my_amt_sat);
        SECP256K1
            .verify_ecdsa(&digest, sig, &self.remote_pubkey)
            .map_err(|_| SignError::InvalidCommitmentSig)
    }

    fn their_hakd_pubkey(
        &self,
        channel: &Channel,
        state_idx: u64,
    ) -> Result<PublicKey, SignError> {
        let mut engine = sha256::Hash::engine();
        engine.input(b"hakd");
        engine.input(&channel.peer_id.serialize());
        engine.input(&state_idx.to_be_bytes());
        let sk =
            SecretKey::from_slice(&sha256::Hash::from_engine(engine)[..])
                .map_err(|_| {
                    SignError::Backend(s!("digest is not a valid scalar"))
                })?;
        Ok(PublicKey::from_secret_key(SECP256K1, &sk))
    }

    fn sign_break_tx(
        &self,
        channel: &Channel,
    ) -> Result<Transaction, SignError> {
        Ok(Transaction {
            version: 2,
            lock_time: PackedLockTime::ZERO,
            input: vec![TxIn {
                previous_output: channel.funding_outpoint,
                script_sig: Script::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![
                TxOut {
                    value: channel.state.my_amt_sat,
                    script_pubkey: Script::new(),
                },
                TxOut {
                    value: channel.their_amt_sat(),
                    script_pubkey: Script::new(),
                },
            ],
        })
    }
}

/// Transport collecting sent messages into a queue the test harness can
/// drain into the other peer
#[derive(Clone, Debug, Default)]
pub struct QueueTransport {
    pub sent: VecDeque<(PublicKey, Messages)>,
}

impl QueueTransport {
    pub fn new() -> QueueTransport {
        QueueTransport::default()
    }
}

impl PeerTransport for QueueTransport {
    fn send_message(
        &mut self,
        peer_id: PublicKey,
        message: Messages,
    ) -> Result<(), TransportError> {
        self.sent.push_back((peer_id, message));
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use amplify::{Slice32, Wrapper};

    use super::*;
    use crate::revocation::RevocationSeed;

    fn channel_for_tests() -> Channel {
        Channel::with(
            dumb_pubkey!(),
            OutPoint::default(),
            1_000_000,
            400_000,
            dumb_pubkey!(),
            RevocationSeed::with(Slice32::from_inner([0x33; 32])),
        )
    }

    #[test]
    fn store_roundtrip_and_reload() {
        let mut store = MemoryStore::new();
        let channel = channel_for_tests();
        store.insert(3, 7, channel.clone());

        assert_eq!(store.peer_idx(channel.peer_id), Ok(3));
        assert_eq!(store.channel_by_idx(3, 7), Ok(channel.clone()));

        let mut updated = channel.clone();
        updated.state.my_amt_sat = 390_000;
        store.save_channel(&updated).unwrap();

        let mut stale = channel;
        store.reload_channel(&mut stale).unwrap();
        assert_eq!(stale.state.my_amt_sat, 390_000);
    }

    #[test]
    fn store_reports_missing_records() {
        let store = MemoryStore::new();
        assert_eq!(
            store.channel_by_idx(0, 0),
            Err(StoreError::UnknownChannelIdx {
                peer_idx: 0,
                channel_idx: 0
            })
        );
        assert_eq!(
            store.peer_idx(dumb_pubkey!()),
            Err(StoreError::UnknownPeer(dumb_pubkey!()))
        );
    }

    #[test]
    fn signer_signatures_are_asymmetric() {
        let local = SecretKey::from_slice(&[0x01; 32]).unwrap();
        let remote = SecretKey::from_slice(&[0x02; 32]).unwrap();
        let remote_pub = PublicKey::from_secret_key(SECP256K1, &remote);
        let local_pub = PublicKey::from_secret_key(SECP256K1, &local);

        let ours = MockSigner::with(local, remote_pub);
        let theirs = MockSigner::with(remote, local_pub);

        let mut channel = channel_for_tests();
        let sig = theirs.sign_commitment(&channel).unwrap();
        // Their signature covers the commitment paying us 400k
        channel.state.my_amt_sat = 1_000_000 - 400_000;
        // ...which verifies only against the mirrored record
        assert_eq!(
            ours.verify_commitment_sig(&channel, &sig),
            Ok(())
        );
        channel.state.my_amt_sat = 123;
        assert_eq!(
            ours.verify_commitment_sig(&channel, &sig),
            Err(SignError::InvalidCommitmentSig)
        );
    }
}
