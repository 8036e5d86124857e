//! Error accounting and loop-time diagnostics.
//!
//! Nothing is reported inline on the data path: failures only move counters
//! and mark the offending channel in an 8-bit set, surfaced later through
//! the configuration dialogue's diagnostics command. Re-initialisation
//! clears everything.

/// Why a sentence (or channel) was charged an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Stop bit low or illegal line state.
    Frame,
    /// No free bank at sentence start.
    Congestion,
    /// More than the bank capacity of payload bytes.
    Overlong,
    /// Non-classifiable byte inside a sentence.
    Binary,
    /// Sentence stalled until the stuck-bank sweep reclaimed it.
    Slow,
}

/// Saturating 8-bit error counters plus the error-channel set.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stats {
    frame: u8,
    congestion: u8,
    overlong: u8,
    binary: u8,
    slow: u8,
    /// Bit *n* set: channel *n* has contributed to any error since init.
    err_channels: u8,
    loop_min_us: u32,
    loop_max_us: u32,
    loop_prev_us: Option<i64>,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            loop_min_us: u32::MAX,
            ..Self::default()
        }
    }

    /// Charge an error to a channel. Counters stick at 0xFF.
    pub fn record(&mut self, kind: ErrorKind, channel: u8) {
        let counter = match kind {
            ErrorKind::Frame => &mut self.frame,
            ErrorKind::Congestion => &mut self.congestion,
            ErrorKind::Overlong => &mut self.overlong,
            ErrorKind::Binary => &mut self.binary,
            ErrorKind::Slow => &mut self.slow,
        };
        if *counter != u8::MAX {
            *counter += 1;
        }
        self.err_channels |= 1 << channel;
    }

    /// Feed the loop-time profiler with the timestamp of the current
    /// housekeeping slot; tracks min/max of the deltas.
    pub fn record_loop_time(&mut self, now_us: i64) {
        if let Some(prev) = self.loop_prev_us {
            let delta = now_us.saturating_sub(prev).clamp(0, u32::MAX as i64) as u32;
            if delta < self.loop_min_us {
                self.loop_min_us = delta;
            }
            if delta > self.loop_max_us {
                self.loop_max_us = delta;
            }
        }
        self.loop_prev_us = Some(now_us);
    }

    /// Snapshot for the diagnostics command.
    pub fn snapshot(&self) -> Diagnostics {
        Diagnostics {
            frame: self.frame,
            congestion: self.congestion,
            overlong: self.overlong,
            binary: self.binary,
            slow: self.slow,
            err_channels: self.err_channels,
            loop_min_us: if self.loop_min_us == u32::MAX {
                0
            } else {
                self.loop_min_us
            },
            loop_max_us: self.loop_max_us,
        }
    }
}

/// Point-in-time view of the counters, as printed by `G`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub frame: u8,
    pub congestion: u8,
    pub overlong: u8,
    pub binary: u8,
    pub slow: u8,
    pub err_channels: u8,
    pub loop_min_us: u32,
    pub loop_max_us: u32,
}
