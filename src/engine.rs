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

//! The channel update engine.
//!
//! Drives and consumes the four-message update sequence (RTS → ACKSIG →
//! SIGREV → REV) advancing both peers from committed state N to N+1, plus
//! the unilateral-close ("break") path. Every state advance is persisted
//! before the transmit depending on it, so a crash at any message boundary
//! leaves the channel resumable through [`UpdateEngine::send_next_msg`].
//!
//! Handlers are strict: validation failures reject the message without
//! touching the persisted record. Retransmissions of already-processed
//! messages are consumed idempotently, which is what makes the resume
//! entry point safe to call after every reconnect.

use bitcoin::{OutPoint, Transaction};
use log::{debug, info, warn};
use secp256k1::PublicKey;

use crate::channel::{
    Channel, ChannelStatus, StateError, UpdateStage, CHANNEL_RESERVE_SAT,
    MAX_PUSH_SAT,
};
use crate::p2p::{encoding, AckSig, Messages, Revoke, Rts, SigRev};
use crate::revocation::RevocationError;
use crate::sign::{CommitmentSigner, SignError};
use crate::store::{ChannelStore, StoreError};
use crate::transport::{PeerTransport, TransportError};

/// Errors from the update engine operations
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// Persistence failure
    #[from]
    #[display(inner)]
    Store(StoreError),

    /// Message delivery failure
    #[from]
    #[display(inner)]
    Transport(TransportError),

    /// Signing backend failure
    #[from]
    #[display(inner)]
    Sign(SignError),

    /// Inconsistent channel record
    #[from]
    #[display(inner)]
    State(StateError),

    /// Malformed message
    #[from]
    #[display(inner)]
    Encoding(encoding::Error),

    /// Local revocation chain failure
    #[from]
    #[display(inner)]
    Revocation(RevocationError),

    /// invalid revocation secret on channel {channel} ({details}); the
    /// channel is marked broken and must be closed unilaterally via the
    /// break path
    FatalRevocation {
        channel: OutPoint,
        details: RevocationError,
    },

    /// message attributed to peer {found} while the channel belongs to
    /// peer {expected}
    PeerMismatch {
        expected: PublicKey,
        found: PublicKey,
    },

    /// channel {0} has status {1} and does not accept updates
    ChannelInactive(OutPoint, ChannelStatus),

    /// another update is already in flight on channel {0} (stage {1})
    ConcurrentUpdate(OutPoint, UpdateStage),

    /// {message} message on channel {channel} is not valid in update
    /// stage {stage}
    UnexpectedMessage {
        channel: OutPoint,
        message: &'static str,
        stage: UpdateStage,
    },

    /// push amount of {0} sat is outside of the accepted range of
    /// 1..=100000000 sat
    PushAmountOutOfRange(u64),

    /// push of {push_sat} sat would drop the payer balance of
    /// {payer_amt_sat} sat below the channel reserve
    PayerReserveViolated { push_sat: u64, payer_amt_sat: u64 },

    /// push of {push_sat} sat onto the payee balance of {payee_amt_sat}
    /// sat would leave the payee below the channel reserve
    PayeeReserveViolated { push_sat: u64, payee_amt_sat: u64 },
}

/// The per-node update engine.
///
/// One logical engine instance serves a channel at a time; serializing
/// concurrent access to the same channel record is the store's
/// responsibility. The counterparty identity is threaded explicitly
/// through every inbound call.
pub struct UpdateEngine<S, W, T>
where
    S: ChannelStore,
    W: CommitmentSigner,
    T: PeerTransport,
{
    store: S,
    signer: W,
    transport: T,
}

impl<S, W, T> UpdateEngine<S, W, T>
where
    S: ChannelStore,
    W: CommitmentSigner,
    T: PeerTransport,
{
    /// Constructs the engine over its three external collaborators
    pub fn with(store: S, signer: W, transport: T) -> Self {
        UpdateEngine {
            store,
            signer,
            transport,
        }
    }

    /// Read access to the underlying channel store
    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Write access to the underlying channel store
    #[inline]
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Write access to the underlying transport
    #[inline]
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Initiates a push of `amount_sat` satoshis towards the counterparty
    /// of the given channel.
    ///
    /// Requires a clean channel with no other update in flight; the caller
    /// may retry after the current round completes. The committed state
    /// does not advance here: it advances once the counterparty
    /// countersignature arrives, so a lost proposal needs no revert.
    pub fn push_channel(
        &mut self,
        peer_idx: u32,
        channel_idx: u32,
        amount_sat: u64,
    ) -> Result<(), Error> {
        let mut channel = self.store.channel_by_idx(peer_idx, channel_idx)?;
        if !channel.is_operational() {
            return Err(Error::ChannelInactive(
                channel.funding_outpoint,
                channel.status,
            ));
        }
        let stage = channel.update_stage()?;
        if stage != UpdateStage::Clean {
            return Err(Error::ConcurrentUpdate(
                channel.funding_outpoint,
                stage,
            ));
        }
        if amount_sat < 1 || amount_sat > MAX_PUSH_SAT {
            return Err(Error::PushAmountOutOfRange(amount_sat));
        }
        if amount_sat + CHANNEL_RESERVE_SAT > channel.state.my_amt_sat {
            return Err(Error::PayerReserveViolated {
                push_sat: amount_sat,
                payer_amt_sat: channel.state.my_amt_sat,
            });
        }
        if amount_sat + channel.their_amt_sat() < CHANNEL_RESERVE_SAT {
            return Err(Error::PayeeReserveViolated {
                push_sat: amount_sat,
                payee_amt_sat: channel.their_amt_sat(),
            });
        }

        channel.state.delta_sat = -(amount_sat as i32);
        self.save(&channel)?;

        debug!(
            "proposing push of {} sat on channel {}",
            amount_sat, channel.funding_outpoint
        );
        let rts = self.compose_rts(&channel)?;
        self.transport
            .send_message(channel.peer_id, Messages::Rts(rts))?;
        Ok(())
    }

    /// Re-sends the message matching the current update stage of the
    /// channel; the resume entry point after reconnect.
    ///
    /// Idempotent against a counterparty which has already processed the
    /// resent message. Returns the message sent, or `None` for a fresh
    /// clean channel with nothing to revoke.
    pub fn send_next_msg(
        &mut self,
        peer_idx: u32,
        channel_idx: u32,
    ) -> Result<Option<Messages>, Error> {
        let channel = self.store.channel_by_idx(peer_idx, channel_idx)?;
        if !channel.is_operational() {
            return Err(Error::ChannelInactive(
                channel.funding_outpoint,
                channel.status,
            ));
        }
        let message = match channel.update_stage()? {
            UpdateStage::Clean if channel.state.state_idx == 0 => {
                return Ok(None)
            }
            UpdateStage::Clean => {
                Messages::Revoke(self.compose_revoke(&channel)?)
            }
            UpdateStage::RtsSent => Messages::Rts(self.compose_rts(&channel)?),
            UpdateStage::AcksigSent => {
                Messages::AckSig(self.compose_acksig(&channel)?)
            }
            UpdateStage::SigrevOwed => {
                Messages::SigRev(self.compose_sigrev(&channel)?)
            }
        };
        debug!(
            "resuming channel {} by re-sending {}",
            channel.funding_outpoint, message
        );
        self.transport.send_message(channel.peer_id, message)?;
        Ok(Some(message))
    }

    /// Unilaterally closes the channel by signing the commitment
    /// transaction for the last committed state.
    ///
    /// Callable in every update stage and on broken channels: a pending
    /// proposal is discarded and the last fully countersigned state is
    /// published. The returned transaction is ready for broadcast by the
    /// caller; the channel record is marked closed and retained for
    /// on-chain monitoring.
    pub fn break_channel(
        &mut self,
        peer_idx: u32,
        channel_idx: u32,
    ) -> Result<Transaction, Error> {
        let mut channel = self.store.channel_by_idx(peer_idx, channel_idx)?;
        if channel.status == ChannelStatus::Closed {
            return Err(Error::ChannelInactive(
                channel.funding_outpoint,
                channel.status,
            ));
        }

        channel.state.delta_sat = 0;
        let tx = self.signer.sign_break_tx(&channel)?;
        channel.status = ChannelStatus::Closed;
        self.save(&channel)?;
        info!(
            "breaking channel {} at state {} with local balance of {} sat",
            channel.funding_outpoint,
            channel.state.state_idx,
            channel.state.my_amt_sat
        );
        Ok(tx)
    }

    /// Decodes a wire frame received from the given peer and processes
    /// the message
    pub fn process_frame(
        &mut self,
        remote_peer: PublicKey,
        frame: &[u8],
    ) -> Result<(), Error> {
        let message = Messages::deserialize(frame)?;
        self.process_message(remote_peer, message)
    }

    /// Processes a single inbound protocol message from the given peer
    pub fn process_message(
        &mut self,
        remote_peer: PublicKey,
        message: Messages,
    ) -> Result<(), Error> {
        let mut channel = self
            .store
            .channel(remote_peer, message.funding_outpoint())?;
        if channel.peer_id != remote_peer {
            return Err(Error::PeerMismatch {
                expected: channel.peer_id,
                found: remote_peer,
            });
        }
        if !channel.is_operational() {
            return Err(Error::ChannelInactive(
                channel.funding_outpoint,
                channel.status,
            ));
        }
        match message {
            Messages::Rts(rts) => self.handle_rts(&mut channel, rts),
            Messages::AckSig(acksig) => {
                self.handle_acksig(&mut channel, acksig)
            }
            Messages::SigRev(sigrev) => {
                self.handle_sigrev(&mut channel, sigrev)
            }
            Messages::Revoke(revoke) => {
                self.handle_revoke(&mut channel, revoke)
            }
        }
    }

    /// Processes an inbound push proposal: validates amounts, adopts the
    /// proposed state, advances the committed index and replies with the
    /// countersignature.
    fn handle_rts(
        &mut self,
        channel: &mut Channel,
        rts: Rts,
    ) -> Result<(), Error> {
        match channel.update_stage()? {
            UpdateStage::Clean => {}
            UpdateStage::AcksigSent
                if rts.hakd_pubkey == channel.state.my_hakd_pub =>
            {
                // Retransmission of the proposal we have countersigned
                // already; our reply was lost.
                debug!(
                    "duplicate RTS on channel {}; re-sending ACKSIG",
                    channel.funding_outpoint
                );
                let acksig = self.compose_acksig(channel)?;
                self.transport
                    .send_message(channel.peer_id, Messages::AckSig(acksig))?;
                return Ok(());
            }
            stage => {
                return Err(Error::ConcurrentUpdate(
                    channel.funding_outpoint,
                    stage,
                ))
            }
        }

        let push_sat = rts.push_sat as u64;
        if push_sat < 1 {
            return Err(Error::PushAmountOutOfRange(push_sat));
        }
        if push_sat + CHANNEL_RESERVE_SAT > channel.their_amt_sat() {
            return Err(Error::PayerReserveViolated {
                push_sat,
                payer_amt_sat: channel.their_amt_sat(),
            });
        }
        if channel.state.my_amt_sat + push_sat < CHANNEL_RESERVE_SAT {
            return Err(Error::PayeeReserveViolated {
                push_sat,
                payee_amt_sat: channel.state.my_amt_sat,
            });
        }

        // Adopt the proposed state and advance the committed index in a
        // single persisted step: the transient applied-but-unsigned form
        // must never reach the store, or resume would misread the stage.
        channel.state.my_prev_hakd_pub = Some(channel.state.my_hakd_pub);
        channel.state.my_hakd_pub = rts.hakd_pubkey;
        channel.state.state_idx += 1;
        channel.state.my_amt_sat += push_sat;
        channel.state.delta_sat = 0;
        self.save(channel)?;

        let acksig = self.compose_acksig(channel)?;
        self.transport
            .send_message(channel.peer_id, Messages::AckSig(acksig))?;
        Ok(())
    }

    /// Processes the counterparty countersignature over our proposed
    /// push: verifies it, advances the committed index and replies with
    /// our own countersignature plus previous-state revocation.
    fn handle_acksig(
        &mut self,
        channel: &mut Channel,
        acksig: AckSig,
    ) -> Result<(), Error> {
        match channel.update_stage()? {
            UpdateStage::RtsSent => {}
            UpdateStage::SigrevOwed
                if acksig.hakd_pubkey == channel.state.my_hakd_pub =>
            {
                // Retransmission: the counterparty never saw our SIGREV.
                debug!(
                    "duplicate ACKSIG on channel {}; re-sending SIGREV",
                    channel.funding_outpoint
                );
                let sigrev = self.compose_sigrev(channel)?;
                self.transport
                    .send_message(channel.peer_id, Messages::SigRev(sigrev))?;
                return Ok(());
            }
            stage => {
                return Err(Error::UnexpectedMessage {
                    channel: channel.funding_outpoint,
                    message: "ACKSIG",
                    stage,
                })
            }
        }

        let push_sat = channel.state.delta_sat.unsigned_abs() as u64;
        channel.state.state_idx += 1;
        channel.state.my_prev_hakd_pub = Some(channel.state.my_hakd_pub);
        channel.state.my_hakd_pub = acksig.hakd_pubkey;
        channel.state.my_amt_sat -= push_sat;
        // The sign flip marks the countersigned update for which we still
        // owe the counterparty our previous-state revocation; the stage
        // table relies on it after a restart.
        channel.state.delta_sat = -channel.state.delta_sat;

        self.signer
            .verify_commitment_sig(channel, &acksig.commitment_sig)?;
        self.save(channel)?;

        let sigrev = self.compose_sigrev(channel)?;
        self.transport
            .send_message(channel.peer_id, Messages::SigRev(sigrev))?;
        Ok(())
    }

    /// Processes the counterparty countersignature over our new
    /// commitment together with the revocation of its previous state;
    /// replies with our own revocation.
    fn handle_sigrev(
        &mut self,
        channel: &mut Channel,
        sigrev: SigRev,
    ) -> Result<(), Error> {
        match channel.update_stage()? {
            UpdateStage::AcksigSent => {}
            // Retransmission after we already completed the round; the
            // secret re-ingests idempotently and REV is sent again.
            UpdateStage::Clean if channel.state.state_idx > 0 => {}
            stage => {
                return Err(Error::UnexpectedMessage {
                    channel: channel.funding_outpoint,
                    message: "SIGREV",
                    stage,
                })
            }
        }

        // Signature first: if the revocation secret turns out to be bad
        // we still hold a valid signature for the newer, more favorable
        // state.
        self.signer
            .verify_commitment_sig(channel, &sigrev.commitment_sig)?;
        if let Err(err) = channel.revoc_recv.ingest(sigrev.revocation_secret)
        {
            return self.break_on_bad_revocation(channel, err);
        }

        channel.state.my_prev_hakd_pub = None;
        self.save(channel)?;

        let revoke = self.compose_revoke(channel)?;
        self.transport
            .send_message(channel.peer_id, Messages::Revoke(revoke))?;
        Ok(())
    }

    /// Processes the terminal revocation of the round, returning the
    /// channel to the clean stage
    fn handle_revoke(
        &mut self,
        channel: &mut Channel,
        revoke: Revoke,
    ) -> Result<(), Error> {
        if channel.state.my_prev_hakd_pub.is_none()
            && channel.state.state_idx > 1
        {
            debug!(
                "duplicate REV on channel {}; dropping",
                channel.funding_outpoint
            );
            return Ok(());
        }
        match channel.update_stage()? {
            UpdateStage::SigrevOwed | UpdateStage::Clean => {}
            stage => {
                return Err(Error::UnexpectedMessage {
                    channel: channel.funding_outpoint,
                    message: "REV",
                    stage,
                })
            }
        }

        if let Err(err) = channel.revoc_recv.ingest(revoke.revocation_secret)
        {
            return self.break_on_bad_revocation(channel, err);
        }

        channel.state.delta_sat = 0;
        channel.state.my_prev_hakd_pub = None;
        self.save(channel)?;
        Ok(())
    }

    /// A revocation secret inconsistent with the chain is fatal for the
    /// channel: no further updates are accepted and the caller must close
    /// unilaterally. The signature received alongside was verified and
    /// kept, so the local commitment is at the newer state.
    fn break_on_bad_revocation(
        &mut self,
        channel: &mut Channel,
        details: RevocationError,
    ) -> Result<(), Error> {
        warn!(
            "channel {}: {}; marking as broken",
            channel.funding_outpoint, details
        );
        channel.status = ChannelStatus::Broken;
        self.save(channel)?;
        Err(Error::FatalRevocation {
            channel: channel.funding_outpoint,
            details,
        })
    }

    fn compose_rts(&self, channel: &Channel) -> Result<Rts, Error> {
        let hakd_pubkey = self
            .signer
            .their_hakd_pubkey(channel, channel.state.state_idx + 1)?;
        Ok(Rts {
            funding_outpoint: channel.funding_outpoint,
            push_sat: channel.state.delta_sat.unsigned_abs(),
            hakd_pubkey,
        })
    }

    fn compose_acksig(&self, channel: &Channel) -> Result<AckSig, Error> {
        let commitment_sig = self.signer.sign_commitment(channel)?;
        let hakd_pubkey = self
            .signer
            .their_hakd_pubkey(channel, channel.state.state_idx)?;
        Ok(AckSig {
            funding_outpoint: channel.funding_outpoint,
            hakd_pubkey,
            commitment_sig,
        })
    }

    fn compose_sigrev(&self, channel: &Channel) -> Result<SigRev, Error> {
        let commitment_sig = self.signer.sign_commitment(channel)?;
        let prev_idx = channel
            .state
            .state_idx
            .checked_sub(1)
            .ok_or(StateError::NoPriorState)?;
        Ok(SigRev {
            funding_outpoint: channel.funding_outpoint,
            revocation_secret: channel.revoc_send.secret_at(prev_idx)?,
            commitment_sig,
        })
    }

    fn compose_revoke(&self, channel: &Channel) -> Result<Revoke, Error> {
        let prev_idx = channel
            .state
            .state_idx
            .checked_sub(1)
            .ok_or(StateError::NoPriorState)?;
        Ok(Revoke {
            funding_outpoint: channel.funding_outpoint,
            revocation_secret: channel.revoc_send.secret_at(prev_idx)?,
        })
    }

    /// Persists the channel after checking its structural invariants;
    /// replies must be transmitted only after this returns
    fn save(&mut self, channel: &Channel) -> Result<(), Error> {
        channel.verify_state()?;
        self.store.save_channel(channel)?;
        Ok(())
    }
}
