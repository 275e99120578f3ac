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

//! Channel record and update-state model.
//!
//! A [`Channel`] is a value-type snapshot of the persistent record kept by
//! the [`crate::store::ChannelStore`]: the update engine loads it, mutates
//! it and hands it back for atomic persistence. Both revocation trees are
//! part of the record and travel with it.

use amplify::DumbDefault;
use bitcoin::OutPoint;
use secp256k1::PublicKey;

use crate::revocation::{RevocationSeed, RevocationStore};

/// Minimum balance each side must retain after every applied update, in
/// satoshis.
///
/// Keeping both parties above this floor preserves the economic incentive
/// to punish a stale broadcast.
pub const CHANNEL_RESERVE_SAT: u64 = 10_000;

/// Upper bound for a single push, in satoshis
pub const MAX_PUSH_SAT: u64 = 100_000_000;

/// Errors indicating an inconsistent channel state record.
///
/// These signal programming errors or store corruption rather than peer
/// misbehavior: the engine refuses to persist or act upon such a record.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum StateError {
    /// channel state owes {my_amt_sat} sat to the local node, exceeding
    /// the channel capacity of {capacity_sat} sat
    AmountExceedsCapacity { my_amt_sat: u64, capacity_sat: u64 },

    /// pending delta of {delta_sat} sat combined with previous revocable
    /// key presence `{has_prev_hakd}` does not correspond to any update
    /// stage
    IllegalStateCombination { delta_sat: i32, has_prev_hakd: bool },

    /// channel at state index zero has no previous state to revoke
    NoPriorState,
}

/// Operational status of a channel
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub enum ChannelStatus {
    /// Channel is operational and may process updates
    #[display("active")]
    Active,

    /// A fatal revocation inconsistency was detected; the channel rejects
    /// further updates and awaits unilateral close
    #[display("broken")]
    Broken,

    /// Channel was closed; the record is retained for on-chain monitoring
    /// only
    #[display("closed")]
    Closed,
}

impl Default for ChannelStatus {
    #[inline]
    fn default() -> Self {
        ChannelStatus::Active
    }
}

impl ChannelStatus {
    /// Detects whether update messages may still be processed
    #[inline]
    pub fn is_operational(self) -> bool {
        self == ChannelStatus::Active
    }
}

/// Stage of the update round the channel is currently in, as derivable
/// from the persisted state record.
///
/// The stage is a total function of the pending delta sign and the
/// presence of the previous revocable-output key; this is what makes
/// resume-after-reconnect possible without any extra bookkeeping.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display)]
pub enum UpdateStage {
    /// No update in flight
    #[display("clean")]
    Clean,

    /// The local node proposed a push and awaits the counterparty
    /// countersignature
    #[display("rts-sent")]
    RtsSent,

    /// The local node countersigned an inbound push and awaits the
    /// counterparty revocation
    #[display("acksig-sent")]
    AcksigSent,

    /// The counterparty countersigned our push; we owe it the revocation
    /// of our previous state
    #[display("sigrev-owed")]
    SigrevOwed,
}

/// The mutable part of the channel record which the update engine
/// advances from one committed state to the next
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[derive(StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct ChannelState {
    /// Index of the last locally committed state; only ever increases
    pub state_idx: u64,

    /// Satoshis owed to the local node at `state_idx`; the counterparty
    /// is owed the rest of the channel capacity
    pub my_amt_sat: u64,

    /// Pending balance change of the in-flight update, in satoshis.
    ///
    /// Zero when nothing is in flight. Negative while an outbound push
    /// proposed by us still awaits the counterparty countersignature.
    /// Positive once an update is countersigned on our side but the final
    /// revocation of the counterparty is still outstanding.
    pub delta_sat: i32,

    /// Revocable-output public key of our commitment at `state_idx`,
    /// derived by the counterparty and handed to us over the wire
    pub my_hakd_pub: PublicKey,

    /// `my_hakd_pub` of the previous state while its revocation is still
    /// owed to the counterparty; `None` otherwise
    pub my_prev_hakd_pub: Option<PublicKey>,
}

impl DumbDefault for ChannelState {
    fn dumb_default() -> Self {
        ChannelState {
            state_idx: 0,
            my_amt_sat: 0,
            delta_sat: 0,
            my_hakd_pub: dumb_pubkey!(),
            my_prev_hakd_pub: None,
        }
    }
}

impl ChannelState {
    /// Classifies the record into the update stage it represents.
    ///
    /// The two combinations not covered by the stage table (a negative
    /// delta with a rotated key, a positive delta without one) can only be
    /// produced by a bug and are reported as errors.
    pub fn update_stage(&self) -> Result<UpdateStage, StateError> {
        match (self.delta_sat, self.my_prev_hakd_pub.is_some()) {
            (0, false) => Ok(UpdateStage::Clean),
            (delta, false) if delta < 0 => Ok(UpdateStage::RtsSent),
            (0, true) => Ok(UpdateStage::AcksigSent),
            (delta, true) if delta > 0 => Ok(UpdateStage::SigrevOwed),
            (delta_sat, has_prev_hakd) => {
                Err(StateError::IllegalStateCombination {
                    delta_sat,
                    has_prev_hakd,
                })
            }
        }
    }
}

/// Persistent record of a single payment channel with one counterparty
#[derive(Clone, PartialEq, Eq, Debug)]
#[derive(StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct Channel {
    /// Identity public key of the counterparty
    pub peer_id: PublicKey,

    /// The 2-of-2 funding output anchoring the channel on-chain
    pub funding_outpoint: OutPoint,

    /// Total satoshis locked in the funding output; immutable over the
    /// channel lifetime
    pub capacity_sat: u64,

    /// Operational status of the channel
    pub status: ChannelStatus,

    /// The mutable update-state record
    pub state: ChannelState,

    /// Emits revocation secrets for our own past states
    pub revoc_send: RevocationSeed,

    /// Validates and absorbs revocation secrets of the counterparty
    pub revoc_recv: RevocationStore,
}

impl Channel {
    /// Constructs the channel record produced by the funding handshake
    pub fn with(
        peer_id: PublicKey,
        funding_outpoint: OutPoint,
        capacity_sat: u64,
        my_amt_sat: u64,
        my_hakd_pub: PublicKey,
        revocation_seed: RevocationSeed,
    ) -> Channel {
        Channel {
            peer_id,
            funding_outpoint,
            capacity_sat,
            status: ChannelStatus::Active,
            state: ChannelState {
                state_idx: 0,
                my_amt_sat,
                delta_sat: 0,
                my_hakd_pub,
                my_prev_hakd_pub: None,
            },
            revoc_send: revocation_seed,
            revoc_recv: RevocationStore::new(),
        }
    }

    /// Satoshis owed to the counterparty at the current committed state
    #[inline]
    pub fn their_amt_sat(&self) -> u64 {
        self.capacity_sat - self.state.my_amt_sat
    }

    /// Detects whether update messages may still be processed
    #[inline]
    pub fn is_operational(&self) -> bool {
        self.status.is_operational()
    }

    /// Classifies the channel into its current update stage
    #[inline]
    pub fn update_stage(&self) -> Result<UpdateStage, StateError> {
        self.state.update_stage()
    }

    /// Checks the structural invariants of the record; called by the
    /// engine before every store write
    pub fn verify_state(&self) -> Result<(), StateError> {
        if self.state.my_amt_sat > self.capacity_sat {
            return Err(StateError::AmountExceedsCapacity {
                my_amt_sat: self.state.my_amt_sat,
                capacity_sat: self.capacity_sat,
            });
        }
        self.state.update_stage()?;
        Ok(())
    }
}
