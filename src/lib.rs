//! # nmea-mux
//!
//! Eight-channel NMEA 0183 multiplexer core.
//!
//! Eight asynchronous serial inputs (38,400 or 4,800 baud) are received by
//! bit-banged oversampling, assembled into sentences in a fixed pool of
//! storage banks, and emitted serialised on a single output line, optionally
//! tagged with the originating channel digit.
//!
//! ## Architecture
//!
//! Everything real-time is pure logic driven by [`Multiplexer::tick`], one
//! call per scheduler column. Components are isolated along the data path:
//!
//! ```text
//! ports -> sampler -> bit parsers -> classifier -> assembler
//!       -> banks -> transmit queue -> transmitter -> staging -> UART
//! ```
//!
//! Control flow is a fixed cooperative rotation: no interrupts, no locks,
//! no allocation. Hardware sits behind the small traits in [`hal`]; the
//! configuration dialogue in [`console`] edits a [`Settings`] working copy
//! that reaches the engine through [`Multiplexer::reinit`].

#![cfg_attr(not(test), no_std)]

pub mod assemble;
pub mod bank;
pub mod classify;
pub mod console;
pub mod hal;
pub mod mux;
pub mod queue;
pub mod sample;
pub mod settings;
pub mod stats;
pub mod transmit;
pub mod uart;

pub use bank::{BankId, BANK_COUNT, BANK_LEN};
pub use mux::{Multiplexer, TickOutput, COLUMNS_PER_ROUND};
pub use sample::{LineLevels, PortPins, CHANNEL_COUNT};
pub use settings::{OutputBaud, Settings, SettingsStore, StoreError};
pub use stats::Diagnostics;
