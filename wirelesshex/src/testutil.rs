//! Shared in-memory fakes for the protocol and storage tests.
//!
//! The scripted mocks share a virtual clock: every poll that would block
//! on real hardware instead advances the clock, so timeout behavior is
//! exercised without sleeping.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::protocol::Watchdog;
use crate::radio::{Packet, Radio};
use crate::serial::SerialLine;
use crate::storage::{FlashStorage, REGION_SIZE};
use crate::time::Clock;

/// In-memory flash with a single 32 KB region.
///
/// Enforces the erase-before-write contract and records erase calls.
pub struct MemFlash {
    pub mem: Vec<u8>,
    pub erase_count: usize,
    erased: bool,
}

impl MemFlash {
    pub fn new() -> Self {
        Self {
            mem: vec![0xFF; REGION_SIZE as usize],
            erase_count: 0,
            erased: false,
        }
    }
}

impl Default for MemFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashStorage for MemFlash {
    fn erase_region(&mut self, _region: u32) -> Result<()> {
        self.mem.fill(0xFF);
        self.erased = true;
        self.erase_count += 1;
        Ok(())
    }

    fn write_byte(&mut self, offset: u32, value: u8) -> Result<()> {
        self.write_bytes(offset, &[value])
    }

    fn write_bytes(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        if !self.erased {
            return Err(Error::Storage("write before erase".into()));
        }
        let start = offset as usize;
        let end = start + data.len();
        if end > self.mem.len() {
            return Err(Error::Storage(format!("write past region end: {end}")));
        }
        self.mem[start..end].copy_from_slice(data);
        Ok(())
    }
}

/// Manually advanced clock shared between a test and its mocks.
#[derive(Clone)]
pub struct MockClock {
    base: Instant,
    offset: Rc<Cell<Duration>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    pub fn handle(&self) -> Rc<Cell<Duration>> {
        Rc::clone(&self.offset)
    }

    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.base + self.offset.get()
    }
}

fn advance(offset: &Rc<Cell<Duration>>, by: Duration) {
    offset.set(offset.get() + by);
}

/// Scripted radio: inbound packets and acknowledgements carry the virtual
/// delay before they arrive; empty polls advance the clock by
/// [`idle_step`](Self::idle_step).
pub struct MockRadio {
    pub incoming: VecDeque<(Duration, Packet)>,
    pub ack_replies: VecDeque<(Duration, Packet)>,
    pub sent: Vec<(u8, Vec<u8>)>,
    pub acks: Vec<(u8, Vec<u8>)>,
    pub idle_step: Duration,
    clock: Rc<Cell<Duration>>,
}

impl MockRadio {
    pub fn new(clock: &MockClock) -> Self {
        Self {
            incoming: VecDeque::new(),
            ack_replies: VecDeque::new(),
            sent: Vec::new(),
            acks: Vec::new(),
            idle_step: Duration::from_millis(100),
            clock: clock.handle(),
        }
    }
}

impl Radio for MockRadio {
    fn send(&mut self, dest: u8, payload: &[u8], _request_ack: bool) -> Result<()> {
        self.sent.push((dest, payload.to_vec()));
        Ok(())
    }

    fn send_ack(&mut self, dest: u8, payload: &[u8]) -> Result<()> {
        self.acks.push((dest, payload.to_vec()));
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<Packet>> {
        match self.incoming.pop_front() {
            Some((delay, packet)) => {
                advance(&self.clock, delay);
                Ok(Some(packet))
            },
            None => {
                advance(&self.clock, self.idle_step);
                Ok(None)
            },
        }
    }

    fn poll_ack(&mut self, from: u8) -> Result<Option<Packet>> {
        match self.ack_replies.pop_front() {
            Some((delay, packet)) => {
                advance(&self.clock, delay);
                Ok((packet.sender == from).then_some(packet))
            },
            None => {
                advance(&self.clock, self.idle_step);
                Ok(None)
            },
        }
    }
}

/// Scripted serial line. Reading an empty script advances the virtual
/// clock by the caller's timeout, if a clock is attached.
pub struct MockLine {
    pub lines: VecDeque<(Duration, Vec<u8>)>,
    pub written: Vec<Vec<u8>>,
    clock: Option<Rc<Cell<Duration>>>,
}

impl MockLine {
    /// Lines delivered instantly; real time passes while polling.
    pub fn scripted(lines: Vec<Vec<u8>>) -> Self {
        Self {
            lines: lines.into_iter().map(|l| (Duration::ZERO, l)).collect(),
            written: Vec::new(),
            clock: None,
        }
    }

    /// Empty script tied to a virtual clock.
    pub fn with_clock(clock: &MockClock) -> Self {
        Self {
            lines: VecDeque::new(),
            written: Vec::new(),
            clock: Some(clock.handle()),
        }
    }

    /// Pop the next scripted line without going through the trait.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        self.lines.pop_front().map(|(_, line)| line)
    }
}

impl SerialLine for MockLine {
    fn read_line(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        match self.lines.pop_front() {
            Some((delay, line)) => {
                if let Some(clock) = &self.clock {
                    advance(clock, delay);
                }
                Ok(Some(line))
            },
            None => {
                if let Some(clock) = &self.clock {
                    advance(clock, timeout);
                }
                Ok(None)
            },
        }
    }

    fn write_line(&mut self, line: &[u8]) -> Result<()> {
        self.written.push(line.to_vec());
        Ok(())
    }
}

/// Counts restart requests instead of rebooting anything.
#[derive(Default)]
pub struct MockWatchdog {
    pub restarts: usize,
}

impl Watchdog for MockWatchdog {
    fn restart(&mut self) {
        self.restarts += 1;
    }
}

/// One end of an in-process radio link built on channels, for tests that
/// run both state machines on real threads.
pub struct ChannelRadio {
    id: u8,
    data_tx: mpsc::Sender<Packet>,
    ack_tx: mpsc::Sender<Packet>,
    data_rx: mpsc::Receiver<Packet>,
    ack_rx: mpsc::Receiver<Packet>,
}

/// Build a connected pair of radios with node ids `a` and `b`.
pub fn channel_radio_pair(a: u8, b: u8) -> (ChannelRadio, ChannelRadio) {
    let (a_data_tx, b_data_rx) = mpsc::channel();
    let (b_data_tx, a_data_rx) = mpsc::channel();
    let (a_ack_tx, b_ack_rx) = mpsc::channel();
    let (b_ack_tx, a_ack_rx) = mpsc::channel();
    (
        ChannelRadio {
            id: a,
            data_tx: a_data_tx,
            ack_tx: a_ack_tx,
            data_rx: a_data_rx,
            ack_rx: a_ack_rx,
        },
        ChannelRadio {
            id: b,
            data_tx: b_data_tx,
            ack_tx: b_ack_tx,
            data_rx: b_data_rx,
            ack_rx: b_ack_rx,
        },
    )
}

fn drain<T>(rx: &mpsc::Receiver<T>) -> Option<T> {
    // A hung-up peer is indistinguishable from silence on the air.
    rx.try_recv().ok()
}

impl Radio for ChannelRadio {
    fn send(&mut self, _dest: u8, payload: &[u8], _request_ack: bool) -> Result<()> {
        let _ = self.data_tx.send(Packet::new(self.id, payload));
        Ok(())
    }

    fn send_ack(&mut self, _dest: u8, payload: &[u8]) -> Result<()> {
        let _ = self.ack_tx.send(Packet::new(self.id, payload));
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<Packet>> {
        Ok(drain(&self.data_rx))
    }

    fn poll_ack(&mut self, from: u8) -> Result<Option<Packet>> {
        Ok(drain(&self.ack_rx).filter(|p| p.sender == from))
    }
}
