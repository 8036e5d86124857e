//! Transmitter: copies completed sentences through a one-byte staging slot
//! to the hardware UART.
//!
//! The state machine advances at most one step per scheduler column and
//! every staging write is gated on the slot being empty, so the column
//! budget holds regardless of UART back-pressure. The staging slot exists to
//! confine hardware-register writes to the UART-feeder step; the feeder runs
//! at its own point in the column and also enforces the inter-sentence gap.

use crate::bank::{BankId, BankPool};
use crate::queue::TxQueue;
use crate::settings::OutputBaud;

/// One-byte latch between the transmitter and the hardware UART.
#[derive(Clone, Copy, Debug, Default)]
pub struct Staging {
    byte: u8,
    full: bool,
}

impl Staging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch a byte if the slot is empty; `false` leaves the caller to retry
    /// next column.
    pub(crate) fn try_put(&mut self, byte: u8) -> bool {
        if self.full {
            return false;
        }
        self.byte = byte;
        self.full = true;
        true
    }

    pub(crate) fn take(&mut self) -> Option<u8> {
        if !self.full {
            return None;
        }
        self.full = false;
        Some(self.byte)
    }

    pub fn is_full(&self) -> bool {
        self.full
    }
}

/// Inter-sentence gap: roughly 30 bit times of silence after each `\n`,
/// measured in scheduler columns at the output baud.
#[derive(Clone, Copy, Debug, Default)]
pub struct GapTimer {
    remaining: u16,
}

impl GapTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn arm(&mut self, columns: u16) {
        self.remaining = columns;
    }

    pub(crate) fn step(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    pub fn expired(&self) -> bool {
        self.remaining == 0
    }
}

/// Columns of silence after a newline: 30 bit times at the output rate,
/// with one column being a quarter of a 38,400-baud bit.
pub(crate) fn gap_columns(baud: OutputBaud) -> u16 {
    match baud {
        OutputBaud::B115200 => 40,
        OutputBaud::B38400 => 120,
        OutputBaud::B4800 => 960,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TxState {
    Idle,
    SetupPrefix,
    SetupPointer,
    Stream,
    FinishA,
    FinishB,
}

/// Sentence transmitter state machine.
pub struct Transmitter {
    state: TxState,
    bank: BankId,
    pos: u8,
    end: u8,
}

impl Transmitter {
    pub fn new() -> Self {
        Self {
            state: TxState::Idle,
            bank: BankId::ZERO,
            pos: 0,
            end: 0,
        }
    }

    /// The bank currently being streamed, if any.
    pub fn active_bank(&self) -> Option<BankId> {
        if self.state == TxState::Idle {
            None
        } else {
            Some(self.bank)
        }
    }

    /// Advance one state step (one column's worth of work).
    pub(crate) fn step(
        &mut self,
        queue: &mut TxQueue,
        pool: &mut BankPool,
        staging: &mut Staging,
        prefix: bool,
        crlf: bool,
    ) {
        match self.state {
            TxState::Idle => {
                if let Some(id) = queue.pop() {
                    self.bank = id;
                    self.state = if prefix {
                        TxState::SetupPrefix
                    } else {
                        TxState::SetupPointer
                    };
                }
            }
            TxState::SetupPrefix => {
                let digit = b'1' + pool.get(self.bank).owner();
                if staging.try_put(digit) {
                    self.state = TxState::SetupPointer;
                }
            }
            TxState::SetupPointer => {
                self.pos = 0;
                self.end = pool.get(self.bank).len() as u8;
                self.state = TxState::Stream;
            }
            TxState::Stream => {
                if self.pos == self.end {
                    self.state = TxState::FinishA;
                } else {
                    let byte = pool.get(self.bank).payload()[self.pos as usize];
                    if staging.try_put(byte) {
                        self.pos += 1;
                    }
                }
            }
            TxState::FinishA => {
                if crlf {
                    if staging.try_put(b'\r') {
                        self.state = TxState::FinishB;
                    }
                } else if staging.try_put(b'\n') {
                    pool.release(self.bank);
                    self.state = TxState::Idle;
                }
            }
            TxState::FinishB => {
                if staging.try_put(b'\n') {
                    pool.release(self.bank);
                    self.state = TxState::Idle;
                }
            }
        }
    }
}

impl Default for Transmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Move the staged byte to the hardware UART when it is ready and the
/// inter-sentence gap has expired; re-arms the gap on each `\n`.
pub(crate) fn feed_uart(
    staging: &mut Staging,
    gap: &mut GapTimer,
    uart_ready: bool,
    baud: OutputBaud,
) -> Option<u8> {
    if !uart_ready || !gap.expired() {
        return None;
    }
    let byte = staging.take()?;
    if byte == b'\n' {
        gap.arm(gap_columns(baud));
    }
    Some(byte)
}
