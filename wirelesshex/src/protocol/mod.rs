//! The FLX transfer protocol state machines.
//!
//! [`Relay`] runs on the host node: it accepts Intel-HEX records over the
//! serial command line, validates them, and forwards the decoded bytes to
//! the remote node chunk by chunk. [`Receiver`] runs on the remote node:
//! it assembles acknowledged chunks into the image storage region and
//! commits the image on a clean end-of-transfer.

use std::time::Duration;

pub mod frame;
pub mod receiver;
pub mod relay;

pub use receiver::{AbortReason, Receiver, SessionEnd, UpdateOutcome, Watchdog};
pub use relay::Relay;

/// Default silence deadline for an in-progress session.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_millis(3000);

/// Default wait for a single transport acknowledgement.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(50);

/// Timing and size limits shared by both state machines.
#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    /// A session aborts after this much silence.
    pub session_timeout: Duration,
    /// Upper bound on one acknowledgement round trip.
    pub ack_timeout: Duration,
    /// Largest image the receiver will commit.
    pub max_image_bytes: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            max_image_bytes: crate::storage::MAX_IMAGE_BYTES,
        }
    }
}
