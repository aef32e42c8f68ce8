//! # wirelesshex
//!
//! Over-the-air firmware delivery for small radio nodes.
//!
//! A host node attached to a serial line relays an Intel-HEX image, record
//! by record, to a remote node over an addressed packet radio. The remote
//! node assembles the image in a dedicated region of its external flash
//! and reboots into its bootloader once the image is committed. This crate
//! provides:
//!
//! - Intel-HEX record validation and conversion
//! - The FLX ASCII framing shared by the radio and serial links
//! - The host-side relay and remote-side receiver state machines
//! - The image storage layout and sequential writer
//!
//! Hardware stays behind traits ([`Radio`], [`FlashStorage`],
//! [`SerialLine`], [`Watchdog`]) so the state machines run unchanged
//! against real transceivers, host-side serial ports, or test fixtures.
//!
//! ## Features
//!
//! - `native` (default): host-side serial port support via the
//!   `serialport` crate
//!
//! ## Example
//!
//! ```rust,no_run
//! use wirelesshex::{Packet, Radio, Relay, Result, SystemClock};
//!
//! # struct MyRadio;
//! # impl Radio for MyRadio {
//! #     fn send(&mut self, _: u8, _: &[u8], _: bool) -> Result<()> { Ok(()) }
//! #     fn send_ack(&mut self, _: u8, _: &[u8]) -> Result<()> { Ok(()) }
//! #     fn receive(&mut self) -> Result<Option<Packet>> { Ok(None) }
//! #     fn poll_ack(&mut self, _: u8) -> Result<Option<Packet>> { Ok(None) }
//! # }
//! fn main() -> Result<()> {
//!     # let mut radio = MyRadio;
//!     let mut line = wirelesshex::serial::open_port("/dev/ttyUSB0", 115200)?;
//!     let clock = SystemClock;
//!     let mut relay = Relay::new(&mut radio, &mut line, &clock, 22);
//!
//!     // Offer each serial command line to the relay; `FLX?` starts a
//!     // transfer, anything else stays application traffic.
//!     # let input: Vec<u8> = vec![];
//!     if relay.check_for_serial_hex(&input)? {
//!         println!("image delivered");
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod error;
pub mod hex;
pub mod protocol;
pub mod radio;
pub mod serial;
pub mod storage;
pub mod time;

#[cfg(test)]
pub(crate) mod testutil;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by the session loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    use std::sync::atomic::{AtomicBool, Ordering};

    static TEST_INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    let flag = TEST_INTERRUPT_FLAG
        .get_or_init(|| {
            let shared = Arc::new(AtomicBool::new(false));
            let checker = Arc::clone(&shared);
            set_interrupt_checker(move || checker.load(Ordering::Relaxed));
            shared
        })
        .clone();

    flag.store(value, Ordering::Relaxed);
}

// Re-exports for convenience
pub use {
    error::{Error, Result},
    protocol::{
        AbortReason, Receiver, Relay, TransferConfig, UpdateOutcome, Watchdog,
        DEFAULT_ACK_TIMEOUT, DEFAULT_SESSION_TIMEOUT,
    },
    radio::{Packet, Radio},
    serial::{LineBuffered, SerialLine},
    storage::{FlashStorage, ImageWriter, DATA_OFFSET, MAX_IMAGE_BYTES, REGION_SIZE},
    time::{Clock, SystemClock},
};
