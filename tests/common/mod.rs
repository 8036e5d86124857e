//! Shared host-test harness: waveform construction, a simulated output
//! UART, and a column-clock driver around the engine.

// Each test binary uses a different slice of the harness.
#![allow(dead_code)]

use nmea_mux::{Multiplexer, OutputBaud, PortPins, Settings, CHANNEL_COUNT};

/// Columns per bit for a fast (38,400 baud) input line.
pub const FAST_BIT: usize = 4;

/// Columns per bit for a slow (4,800 baud) input line.
pub const SLOW_BIT: usize = 32;

/// Columns one output byte (10 bits) occupies at the given baud, on the
/// 153,600 columns-per-second clock.
pub fn columns_per_byte(baud: OutputBaud) -> usize {
    match baud {
        OutputBaud::B115200 => 14,
        OutputBaud::B38400 => 40,
        OutputBaud::B4800 => 320,
    }
}

/// 8-N-1 waveform for a byte sequence, one entry per column, LSB first.
pub fn uart_frames(bytes: &[u8], columns_per_bit: usize) -> Vec<bool> {
    let mut wave = Vec::with_capacity(bytes.len() * 10 * columns_per_bit);
    for &byte in bytes {
        wave.extend(std::iter::repeat(false).take(columns_per_bit));
        for bit in 0..8 {
            let high = (byte >> bit) & 1 != 0;
            wave.extend(std::iter::repeat(high).take(columns_per_bit));
        }
        wave.extend(std::iter::repeat(true).take(columns_per_bit));
    }
    wave
}

/// Simulated hardware UART: busy for one byte time after each write.
pub struct SimUart {
    baud: OutputBaud,
    busy: usize,
    /// When false the UART never becomes ready (stalled consumer).
    pub enabled: bool,
}

impl SimUart {
    pub fn new(baud: OutputBaud) -> Self {
        Self {
            baud,
            busy: 0,
            enabled: true,
        }
    }

    pub fn ready(&self) -> bool {
        self.enabled && self.busy == 0
    }

    pub fn send(&mut self) {
        self.busy = columns_per_byte(self.baud);
    }

    pub fn step(&mut self) {
        self.busy = self.busy.saturating_sub(1);
    }
}

/// Column-clock driver: per-channel waveform feeds, engine, simulated UART,
/// and the collected output with column timestamps.
pub struct Harness {
    pub mux: Multiplexer,
    pub uart: SimUart,
    feeds: [Vec<bool>; CHANNEL_COUNT],
    cursor: [usize; CHANNEL_COUNT],
    pub out: Vec<u8>,
    /// Column index at which each output byte was handed to the UART.
    pub out_cols: Vec<usize>,
    pub col: usize,
    pub config_low: bool,
}

impl Harness {
    pub fn new(settings: Settings) -> Self {
        let baud = settings.baud;
        Self {
            mux: Multiplexer::new(settings),
            uart: SimUart::new(baud),
            feeds: Default::default(),
            cursor: [0; CHANNEL_COUNT],
            out: Vec::new(),
            out_cols: Vec::new(),
            col: 0,
            config_low: false,
        }
    }

    /// Append a waveform to a channel's feed.
    pub fn feed(&mut self, channel: usize, wave: Vec<bool>) {
        self.feeds[channel].extend(wave);
    }

    /// Append idle columns to a channel's feed.
    pub fn feed_idle(&mut self, channel: usize, columns: usize) {
        self.feeds[channel]
            .extend(std::iter::repeat(true).take(columns));
    }

    /// Queue a byte sequence on a channel at its configured rate.
    pub fn feed_bytes(&mut self, channel: usize, bytes: &[u8]) {
        let bit = if self.mux.settings().channel_fast(channel) {
            FAST_BIT
        } else {
            SLOW_BIT
        };
        self.feed(channel, uart_frames(bytes, bit));
    }

    fn line_bits(&mut self) -> u8 {
        let mut bits = 0u8;
        for channel in 0..CHANNEL_COUNT {
            let level = match self.feeds[channel].get(self.cursor[channel]) {
                Some(&level) => {
                    self.cursor[channel] += 1;
                    level
                }
                None => true, // exhausted feeds idle high
            };
            if level {
                bits |= 1 << channel;
            }
        }
        bits
    }

    /// Run one column.
    pub fn step(&mut self) -> bool {
        let bits = self.line_bits();
        let pins = PortPins {
            port_a: bits & 0x0F,
            port_b: bits >> 4,
        };
        let now_us = (self.col as i64) * 7;
        let ready = self.uart.ready();
        let out = self.mux.tick(now_us, pins, self.config_low, ready);
        if let Some(byte) = out.tx {
            self.uart.send();
            self.out.push(byte);
            self.out_cols.push(self.col);
        }
        self.uart.step();
        self.col += 1;
        out.enter_config
    }

    /// Run a fixed number of columns.
    pub fn run(&mut self, columns: usize) {
        for _ in 0..columns {
            self.step();
        }
    }

    /// Total columns queued on a channel's feed.
    pub fn feeds_len(&self, channel: usize) -> usize {
        self.feeds[channel].len()
    }

    /// True while any feed still has columns to deliver.
    pub fn feeding(&self) -> bool {
        (0..CHANNEL_COUNT).any(|c| self.cursor[c] < self.feeds[c].len())
    }

    /// Run until all feeds are exhausted and the engine has gone quiet.
    pub fn run_to_quiet(&mut self, cap: usize) {
        for _ in 0..cap {
            self.step();
            if !self.feeding() && !self.mux.is_active() && self.uart.ready() {
                // A few extra columns so trailing gap timers expire.
                for _ in 0..1024 {
                    self.step();
                }
                return;
            }
        }
        panic!("engine did not go quiet within {} columns", cap);
    }

    /// Split collected output into `\n`-terminated sentences.
    pub fn sentences(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut current = Vec::new();
        for &byte in &self.out {
            current.push(byte);
            if byte == b'\n' {
                out.push(std::mem::take(&mut current));
            }
        }
        assert!(current.is_empty(), "trailing partial sentence: {:?}", current);
        out
    }

    /// Assert that every bank is back in the free pool.
    pub fn assert_no_bank_leak(&self) {
        assert_eq!(self.mux.held_banks(), 0, "channels still hold banks");
        assert_eq!(self.mux.queued_banks(), 0, "queue still holds banks");
        assert_eq!(self.mux.streaming_bank(), None, "transmitter still busy");
        assert_eq!(self.mux.free_banks().count_ones(), 11);
    }

    /// Assert the pool partition invariant: every bank is in exactly one of
    /// {free, channel-held, queued, streaming}.
    pub fn assert_bank_partition(&self) {
        let free = self.mux.free_banks();
        let held = self.mux.held_banks();
        let queued = self.mux.queued_banks();
        let streaming = self
            .mux
            .streaming_bank()
            .map(|b| b.mask())
            .unwrap_or(0);
        let all = free | held | queued | streaming;
        assert_eq!(all, (1 << 11) - 1, "a bank is in no state");
        assert_eq!(free & held, 0);
        assert_eq!(free & queued, 0);
        assert_eq!(free & streaming, 0);
        assert_eq!(held & queued, 0);
        assert_eq!(held & streaming, 0);
        assert_eq!(queued & streaming, 0);
    }
}
