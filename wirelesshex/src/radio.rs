//! Radio transceiver contract consumed by the protocol state machines.
//!
//! The transport is addressed, half-duplex, and provides its own per-packet
//! acknowledgement primitive. The acknowledgement may carry a piggybacked
//! payload, which this protocol uses for its `FLX?OK` / `FLX:<seq>:OK`
//! replies. The protocol layer stays hardware-agnostic; implementations
//! wrap a concrete transceiver driver.

use crate::error::Result;

/// One CRC-valid inbound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Node id of the sender.
    pub sender: u8,
    /// Packet payload, owned by the packet.
    pub payload: Vec<u8>,
}

impl Packet {
    /// Create a packet from a sender id and payload bytes.
    pub fn new(sender: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            sender,
            payload: payload.into(),
        }
    }
}

/// Addressed packet radio with a transport-level acknowledgement primitive.
pub trait Radio {
    /// Send `payload` to node `dest`. With `request_ack` the transport is
    /// asked to confirm delivery; the confirmation is observed later via
    /// [`poll_ack`](Self::poll_ack).
    fn send(&mut self, dest: u8, payload: &[u8], request_ack: bool) -> Result<()>;

    /// Reply to node `dest`, piggybacking `payload` on the transport-level
    /// acknowledgement for the packet just received from it.
    fn send_ack(&mut self, dest: u8, payload: &[u8]) -> Result<()>;

    /// Non-blocking poll for the next CRC-valid packet addressed to this
    /// node. Packets failing the transport CRC never surface here.
    fn receive(&mut self) -> Result<Option<Packet>>;

    /// Non-blocking poll for a transport acknowledgement from node `from`,
    /// returning its piggybacked payload.
    fn poll_ack(&mut self, from: u8) -> Result<Option<Packet>>;
}
