//! Host-node side of the transfer: validate serial records, forward chunks.

use std::time::Duration;

use log::{debug, info, trace};

use crate::error::{Error, Result};
use crate::hex;
use crate::protocol::frame::{self, FrameError, Reply, Request};
use crate::protocol::TransferConfig;
use crate::radio::{Packet, Radio};
use crate::serial::SerialLine;
use crate::time::Clock;

/// Poll granularity for the serial line inside a session.
const LINE_POLL: Duration = Duration::from_millis(100);

/// Transfer state machine for the host node attached to the serial line.
///
/// The embedding application reads its serial command line as usual and
/// offers each line to [`check_for_serial_hex`](Self::check_for_serial_hex);
/// the relay takes over the line and the radio only for the duration of a
/// session.
pub struct Relay<'a, R: Radio, L: SerialLine, C: Clock> {
    radio: &'a mut R,
    line: &'a mut L,
    clock: &'a C,
    target: u8,
    config: TransferConfig,
}

impl<'a, R: Radio, L: SerialLine, C: Clock> Relay<'a, R, L, C> {
    /// Create a relay towards node `target` with default timing limits.
    pub fn new(radio: &'a mut R, line: &'a mut L, clock: &'a C, target: u8) -> Self {
        Self::with_config(radio, line, clock, target, TransferConfig::default())
    }

    /// Create a relay towards node `target` with explicit timing limits.
    pub fn with_config(
        radio: &'a mut R,
        line: &'a mut L,
        clock: &'a C,
        target: u8,
        config: TransferConfig,
    ) -> Self {
        Self {
            radio,
            line,
            clock,
            target,
            config,
        }
    }

    /// Inspect one serial command line and run a transfer session if it
    /// opens one.
    ///
    /// Only an exact `FLX?` line starts a session; everything else is left
    /// to the embedding application and reported as `Ok(false)`. Returns
    /// `Ok(true)` when a complete image was relayed and acknowledged by
    /// the remote node.
    pub fn check_for_serial_hex(&mut self, input: &[u8]) -> Result<bool> {
        if input != frame::HANDSHAKE {
            return Ok(false);
        }

        info!("serial handshake, contacting node {}", self.target);
        if !self.handshake(false)? {
            return Ok(false);
        }
        self.line.write_line(frame::HANDSHAKE_OK)?;

        if self.relay_session()? {
            self.line.write_line(frame::HANDSHAKE_OK)?;
            info!("image relayed to node {}", self.target);
            Ok(true)
        } else {
            debug!("image relay to node {} failed", self.target);
            Ok(false)
        }
    }

    /// Repeat the handshake (or EOF) query until the remote acknowledges
    /// or the session deadline passes.
    fn handshake(&mut self, eof: bool) -> Result<bool> {
        let query = if eof { frame::EOF } else { frame::HANDSHAKE };
        let deadline = self.clock.now() + self.config.session_timeout;
        loop {
            if crate::is_interrupted_requested() {
                return Err(Error::Interrupted);
            }
            self.radio.send(self.target, query, true)?;
            if let Some(ack) = self.wait_for_ack()? {
                if Reply::parse(&ack.payload) == Some(Reply::HandshakeOk) {
                    return Ok(true);
                }
            }
            if self.clock.now() >= deadline {
                debug!("no handshake ack from node {}", self.target);
                return Ok(false);
            }
        }
    }

    /// Read chunk lines off the serial link until EOF, the silence
    /// deadline, or a failure the host must restart from.
    fn relay_session(&mut self) -> Result<bool> {
        let mut expected: u16 = 0;
        let mut deadline = self.clock.now() + self.config.session_timeout;

        loop {
            if crate::is_interrupted_requested() {
                return Err(Error::Interrupted);
            }

            if let Some(input) = self.line.read_line(LINE_POLL)? {
                if input.len() >= frame::MIN_CHUNK_HEADER {
                    match Request::parse(&input) {
                        Ok(Request::Data { seq, payload }) => {
                            deadline = self.clock.now() + self.config.session_timeout;
                            match hex::validate(&payload) {
                                Ok(byte_count) => {
                                    if seq == expected {
                                        if !self.forward_chunk(seq, &payload, byte_count)? {
                                            return Ok(false);
                                        }
                                        expected += 1;
                                    }
                                    // Retransmit of an already-relayed
                                    // chunk; the echo it waits for was
                                    // already printed.
                                },
                                Err(e) => {
                                    debug!("rejecting record {seq}: {e}");
                                    self.line.write_line(frame::INVALID)?;
                                },
                            }
                        },
                        Ok(Request::Eof) => return self.handshake(true),
                        Ok(Request::Handshake) => {},
                        Err(FrameError::BadSequence) => return Ok(false),
                        Err(FrameError::Unrecognized) => {},
                    }
                }
            }

            if self.clock.now() >= deadline {
                self.line
                    .write_line(b"Timeout receiving image over serial, aborting")?;
                return Ok(false);
            }
        }
    }

    /// Decode one validated record, push it over the radio, and echo the
    /// chunk acknowledgement back to the serial peer.
    fn forward_chunk(&mut self, seq: u16, record: &[u8], byte_count: u8) -> Result<bool> {
        let chunk = hex::decode(&record[hex::DATA_FIELD_OFFSET..], byte_count);
        let packet = Request::Data {
            seq,
            payload: chunk,
        }
        .encode();

        if !self.send_chunk(&packet, seq)? {
            return Ok(false);
        }
        self.line.write_line(&Reply::ChunkOk { seq }.encode())?;
        Ok(true)
    }

    /// Send one chunk with retries until the matching acknowledgement or
    /// the session deadline.
    ///
    /// An acknowledgement carrying the wrong sequence number fails the
    /// transfer immediately: the two sides no longer agree on progress.
    fn send_chunk(&mut self, packet: &[u8], seq: u16) -> Result<bool> {
        let deadline = self.clock.now() + self.config.session_timeout;
        loop {
            if crate::is_interrupted_requested() {
                return Err(Error::Interrupted);
            }
            trace!("radio > {}", hex::to_hex(packet));
            self.radio.send(self.target, packet, true)?;

            if let Some(ack) = self.wait_for_ack()? {
                trace!("radio ack > {}", hex::to_hex(&ack.payload));
                if let Some(Reply::ChunkOk { seq: acked }) = Reply::parse(&ack.payload) {
                    return Ok(acked == seq);
                }
            }

            if self.clock.now() >= deadline {
                self.line
                    .write_line(b"Timeout waiting for chunk ACK, aborting")?;
                return Ok(false);
            }
        }
    }

    /// Poll for a transport acknowledgement from the target within the
    /// acknowledgement window.
    fn wait_for_ack(&mut self) -> Result<Option<Packet>> {
        let deadline = self.clock.now() + self.config.ack_timeout;
        loop {
            if let Some(ack) = self.radio.poll_ack(self.target)? {
                return Ok(Some(ack));
            }
            if self.clock.now() >= deadline {
                return Ok(None);
            }
        }
    }
}
