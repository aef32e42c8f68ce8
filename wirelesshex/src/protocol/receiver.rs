//! Remote-node side of the transfer: assemble chunks into storage.

use log::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::frame::{self, FrameError, Reply, Request};
use crate::protocol::TransferConfig;
use crate::radio::{Packet, Radio};
use crate::storage::{FlashStorage, ImageWriter, IMAGE_REGION};
use crate::time::Clock;

/// Reboot hook fired after a committed image.
///
/// On real hardware the implementation arms a watchdog and never returns;
/// the bootloader then picks the image up from storage.
pub trait Watchdog {
    /// Restart the node.
    fn restart(&mut self);
}

/// Why a session ended without a committed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// No well-formed chunk for a full silence deadline.
    Timeout,
    /// The assembled image exceeds the configured limit.
    Overflow,
    /// A chunk header with a broken sequence field.
    BadFrame,
}

/// How a transfer session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Image stored and length committed.
    Committed {
        /// Committed image byte count.
        image_bytes: u16,
    },
    /// Session abandoned; the region holds partial data.
    Aborted(AbortReason),
}

/// Result of offering one inbound packet to the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Not a transfer packet; caller handles it as application traffic.
    Ignored,
    /// A stray `FLX?EOF` outside a session; its lost acknowledgement was
    /// resent and nothing else changed.
    AckResent,
    /// A full image was received and committed; the watchdog has been
    /// asked to restart the node.
    Committed {
        /// Committed image byte count.
        image_bytes: u16,
    },
    /// A session started and failed; the image region was erased.
    Aborted(AbortReason),
}

/// Transfer state machine for the node being reprogrammed.
///
/// The embedding application polls its radio as usual and offers each
/// packet to [`check_for_update`](Self::check_for_update); the receiver
/// takes over the radio only for the duration of a session.
pub struct Receiver<'a, R: Radio, S: FlashStorage, C: Clock, W: Watchdog> {
    radio: &'a mut R,
    storage: &'a mut S,
    clock: &'a C,
    watchdog: &'a mut W,
    config: TransferConfig,
}

impl<'a, R: Radio, S: FlashStorage, C: Clock, W: Watchdog> Receiver<'a, R, S, C, W> {
    /// Create a receiver with default timing limits.
    pub fn new(radio: &'a mut R, storage: &'a mut S, clock: &'a C, watchdog: &'a mut W) -> Self {
        Self::with_config(radio, storage, clock, watchdog, TransferConfig::default())
    }

    /// Create a receiver with explicit timing and size limits.
    pub fn with_config(
        radio: &'a mut R,
        storage: &'a mut S,
        clock: &'a C,
        watchdog: &'a mut W,
        config: TransferConfig,
    ) -> Self {
        Self {
            radio,
            storage,
            clock,
            watchdog,
            config,
        }
    }

    /// Inspect one inbound packet and run a transfer session if it opens
    /// one.
    ///
    /// `FLX?` enters the session loop and blocks until the transfer ends
    /// one way or the other. A stray `FLX?EOF` outside a session gets its
    /// `FLX?OK` acknowledgement resent, covering the case where the
    /// original one was lost after a commit was already made. Anything
    /// else is ignored.
    pub fn check_for_update(&mut self, packet: &Packet) -> Result<UpdateOutcome> {
        match Request::parse(&packet.payload) {
            Ok(Request::Handshake) => {},
            Ok(Request::Eof) => {
                debug!("stray EOF from node {}, resending ack", packet.sender);
                self.radio.send_ack(packet.sender, frame::HANDSHAKE_OK)?;
                return Ok(UpdateOutcome::AckResent);
            },
            Ok(Request::Data { .. }) | Err(_) => return Ok(UpdateOutcome::Ignored),
        }

        info!("transfer session opened by node {}", packet.sender);
        match self.receive_image(packet.sender) {
            Ok(SessionEnd::Committed { image_bytes }) => {
                info!("image committed ({image_bytes} bytes), restarting");
                self.watchdog.restart();
                Ok(UpdateOutcome::Committed { image_bytes })
            },
            Ok(SessionEnd::Aborted(reason)) => {
                warn!("session aborted ({reason:?}), erasing partial image");
                self.erase_partial();
                Ok(UpdateOutcome::Aborted(reason))
            },
            Err(e) => {
                self.erase_partial();
                Err(e)
            },
        }
    }

    /// Session loop: acknowledge the handshake, then assemble chunks in
    /// sequence order until EOF or the silence deadline.
    fn receive_image(&mut self, sender: u8) -> Result<SessionEnd> {
        self.radio.send_ack(sender, frame::HANDSHAKE_OK)?;

        let mut writer = ImageWriter::begin(&mut *self.storage)?;
        let mut expected: u16 = 0;
        let mut deadline = self.clock.now() + self.config.session_timeout;

        loop {
            if crate::is_interrupted_requested() {
                return Err(Error::Interrupted);
            }

            if let Some(packet) = self.radio.receive()? {
                if packet.sender == sender {
                    match Request::parse(&packet.payload) {
                        Ok(Request::Data { seq, payload }) => {
                            // Any well-formed chunk header counts as
                            // liveness, matching sequence or not.
                            deadline = self.clock.now() + self.config.session_timeout;
                            if seq == expected {
                                match writer.append(&payload) {
                                    Ok(()) => {},
                                    Err(Error::Overflow { written, limit }) => {
                                        warn!("chunk {seq} overruns region ({written}/{limit})");
                                        return Ok(SessionEnd::Aborted(AbortReason::Overflow));
                                    },
                                    Err(e) => return Err(e),
                                }
                                self.radio
                                    .send_ack(sender, &Reply::ChunkOk { seq }.encode())?;
                                expected += 1;
                            } else {
                                // Stale retransmit or a gap; either way the
                                // chunk is dropped without acknowledgement
                                // and the host retries.
                                trace!("dropping chunk {seq}, expecting {expected}");
                            }
                        },
                        Ok(Request::Handshake) => {
                            // Our handshake ack was lost; resend without
                            // extending the deadline.
                            self.radio.send_ack(sender, frame::HANDSHAKE_OK)?;
                        },
                        Ok(Request::Eof) => {
                            let image_len = writer.image_len();
                            if image_len > self.config.max_image_bytes {
                                warn!(
                                    "image of {image_len} bytes exceeds limit {}",
                                    self.config.max_image_bytes
                                );
                                return Ok(SessionEnd::Aborted(AbortReason::Overflow));
                            }
                            self.radio.send_ack(sender, frame::HANDSHAKE_OK)?;
                            let image_bytes = writer.commit()?;
                            return Ok(SessionEnd::Committed { image_bytes });
                        },
                        Err(FrameError::BadSequence) => {
                            return Ok(SessionEnd::Aborted(AbortReason::BadFrame));
                        },
                        Err(FrameError::Unrecognized) => {},
                    }
                }
            }

            if self.clock.now() >= deadline {
                return Ok(SessionEnd::Aborted(AbortReason::Timeout));
            }
        }
    }

    /// Best-effort erase of partially written image data.
    fn erase_partial(&mut self) {
        if let Err(e) = self.storage.erase_region(IMAGE_REGION) {
            warn!("failed to erase partial image: {e}");
        }
    }
}
