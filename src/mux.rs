//! The multiplexer engine: a time-triggered cooperative scheduler tying the
//! sampler, bit parsers, assembler, transmit queue and transmitter together.
//!
//! # Scheduling model
//!
//! One call to [`Multiplexer::tick`] is one scheduler **column**: a quarter
//! of a 38,400-baud bit time (about 6.5 us when driven on schedule). Sixteen
//! columns form a round, two rounds form an outer cycle; reserved columns at
//! the end of each round host the housekeeping rotation. No
//! component preempts another and every shared piece of state has a single
//! writer per column, so the engine needs no locks.
//!
//! Within one column the order is fixed:
//!
//! 1. gap-timer step,
//! 2. UART feeder (staging slot -> hardware byte),
//! 3. transmitter step,
//! 4. sampling, bit parsing and sentence assembly for due channels,
//! 5. housekeeping for the current reserved column.
//!
//! The feeder runs before the transmitter and the transmitter before the
//! assembler, so a byte staged in column *t* reaches the UART no earlier
//! than *t+1* and a sentence completed in *t* starts streaming no earlier
//! than *t+1*.
//!
//! # Ordering guarantees
//!
//! - Bytes of a sentence are emitted in arrival order.
//! - Sentences are emitted in terminator order, FIFO.
//! - A prefix digit (when enabled) immediately precedes its payload; the
//!   terminator follows it; at least 30 bit times of silence follow each
//!   terminator.

use crate::assemble::{self, AssembleCtx, ChannelSentence};
use crate::bank::{BankId, BankPool, SentenceSlot};
use crate::classify::classify;
use crate::queue::TxQueue;
use crate::sample::{LineLevels, PortPins, CHANNEL_COUNT, SLOTS_PER_BIT, SLOW_DIVISOR};
use crate::settings::Settings;
use crate::stats::{Diagnostics, ErrorKind, Stats};
use crate::transmit::{feed_uart, GapTimer, Staging, Transmitter};
use crate::uart::{BitParser, RxEvent};

/// Columns per scheduler round.
pub const COLUMNS_PER_ROUND: u8 = 16;

/// Busy-timer decrement applied to each channel once per outer cycle;
/// drains `TIMER_HIGH` in roughly 2.5 s on schedule.
const TIMER_STEP: u16 = 5;

/// Sweep-slot invocations per stuck-bank window (about seven seconds).
const SWEEP_PERIOD: u16 = 16_384;

/// Per-channel state: receiver, sampling cadence and sentence lifecycle.
struct Channel {
    parser: BitParser,
    sentence: ChannelSentence,
    /// Free-running sub-bit slot counter.
    sub: u8,
    /// Column divider for slow channels; a sample is due at zero.
    div: u8,
    fast: bool,
}

impl Channel {
    fn new(index: usize, fast: bool) -> Self {
        Self {
            parser: BitParser::new(fast),
            sentence: ChannelSentence::default(),
            sub: 0,
            // Stagger slow channels across the divider so their samples do
            // not land in the same column.
            div: ((index & 3) as u8) * 2,
            fast,
        }
    }
}

/// Result of one engine column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickOutput {
    /// Byte handed to the hardware UART this column, if any.
    pub tx: Option<u8>,
    /// The configuration pin was sampled low at the poll slot; the caller
    /// should run the configuration dialogue and then [`Multiplexer::reinit`].
    pub enter_config: bool,
}

/// The eight-channel multiplexer core.
pub struct Multiplexer {
    settings: Settings,
    channels: [Channel; CHANNEL_COUNT],
    pool: BankPool,
    queue: TxQueue,
    tx: Transmitter,
    staging: Staging,
    gap: GapTimer,
    /// CH_BUSY: channels whose busy timer is non-zero.
    busy: u8,
    stats: Stats,
    /// Banks that received a byte during the current sweep window.
    witness: u16,
    /// Snapshot of the previous window.
    witness_prev: u16,
    /// Victim armed by the previous sweep, freed by the next one if still
    /// stalled.
    sweep_armed: Option<BankId>,
    sweep_count: u16,
    col: u8,
    /// Round parity within the outer cycle.
    round: u8,
}

impl Multiplexer {
    pub fn new(settings: Settings) -> Self {
        Self {
            channels: core::array::from_fn(|i| Channel::new(i, settings.channel_fast(i))),
            settings,
            pool: BankPool::new(),
            queue: TxQueue::new(),
            tx: Transmitter::new(),
            staging: Staging::new(),
            gap: GapTimer::new(),
            busy: 0,
            stats: Stats::new(),
            witness: 0,
            witness_prev: 0,
            sweep_armed: None,
            sweep_count: 0,
            col: 0,
            round: 0,
        }
    }

    /// Reinitialise all channel, bank, queue and transmitter state and clear
    /// the diagnostics counters. Called on leaving the configuration
    /// dialogue, whose edits arrive as the new `settings`.
    pub fn reinit(&mut self, settings: Settings) {
        *self = Self::new(settings);
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.stats.snapshot()
    }

    /// Run one scheduler column.
    ///
    /// * `now_us`: monotonic timestamp, used only by the loop-time profiler.
    /// * `pins`: raw read of both input ports, taken for this column.
    /// * `config_low`: configuration pin is asserted (pulled down).
    /// * `uart_ready`: the hardware UART can accept a byte.
    pub fn tick(
        &mut self,
        now_us: i64,
        pins: PortPins,
        config_low: bool,
        uart_ready: bool,
    ) -> TickOutput {
        let mut out = TickOutput::default();

        self.gap.step();
        out.tx = feed_uart(&mut self.staging, &mut self.gap, uart_ready, self.settings.baud);
        self.tx.step(
            &mut self.queue,
            &mut self.pool,
            &mut self.staging,
            self.settings.prefix,
            self.settings.crlf,
        );

        let levels = LineLevels::from_ports(pins, self.settings.invert_input);
        for channel in 0..CHANNEL_COUNT {
            self.run_channel(channel, levels);
        }

        self.housekeep(now_us, config_low, &mut out);

        self.col += 1;
        if self.col == COLUMNS_PER_ROUND {
            self.col = 0;
            self.round ^= 1;
        }
        out
    }

    fn run_channel(&mut self, index: usize, levels: LineLevels) {
        let slot = {
            let ch = &mut self.channels[index];
            if ch.fast {
                let s = ch.sub;
                ch.sub = (ch.sub + 1) % SLOTS_PER_BIT;
                s
            } else {
                ch.div = (ch.div + 1) % SLOW_DIVISOR;
                if ch.div != 0 {
                    return;
                }
                let s = ch.sub;
                ch.sub = (ch.sub + 1) % SLOTS_PER_BIT;
                s
            }
        };
        let high = levels.is_high(index);
        let event = self.channels[index].parser.sample(slot, high);
        match event {
            Some(RxEvent::Byte(byte)) => {
                let class = classify(byte);
                assemble::accept(
                    &mut AssembleCtx {
                        pool: &mut self.pool,
                        queue: &mut self.queue,
                        stats: &mut self.stats,
                        witness: &mut self.witness,
                        busy: &mut self.busy,
                        settings: &self.settings,
                    },
                    index as u8,
                    &mut self.channels[index].sentence,
                    class,
                );
            }
            Some(RxEvent::FrameError) => {
                assemble::frame_error(
                    &mut AssembleCtx {
                        pool: &mut self.pool,
                        queue: &mut self.queue,
                        stats: &mut self.stats,
                        witness: &mut self.witness,
                        busy: &mut self.busy,
                        settings: &self.settings,
                    },
                    index as u8,
                    &mut self.channels[index].sentence,
                );
            }
            None => {}
        }
    }

    /// Reserved-column rotation: five slots per outer cycle.
    fn housekeep(&mut self, now_us: i64, config_low: bool, out: &mut TickOutput) {
        match (self.round, self.col) {
            (0, 12) => self.stats.record_loop_time(now_us),
            (0, 13) => {
                if config_low {
                    out.enter_config = true;
                    #[cfg(feature = "log")]
                    log::info!("configuration pin asserted");
                }
            }
            (0, 14) => self.timer_step(0),
            (1, 14) => self.timer_step(4),
            (1, 15) => self.sweep_slot(),
            _ => {}
        }
    }

    /// Step the busy timers of four channels starting at `base`.
    fn timer_step(&mut self, base: usize) {
        for index in base..base + 4 {
            let sentence = &mut self.channels[index].sentence;
            if sentence.timer > 0 {
                sentence.timer = sentence.timer.saturating_sub(TIMER_STEP);
                if sentence.timer == 0 {
                    self.busy &= !(1 << index);
                }
            }
        }
    }

    /// Stuck-bank sweep: once per window, free the victim armed last window
    /// if it is still channel-held and still unwritten, then arm the next
    /// candidate and rotate the witness snapshot.
    ///
    /// The re-check before freeing is what keeps the sweep safe against a
    /// sentence completing between windows: completion moves the bank into
    /// the queue, the channel no longer holds it, and the sweep leaves it
    /// alone.
    fn sweep_slot(&mut self) {
        self.sweep_count += 1;
        if self.sweep_count < SWEEP_PERIOD {
            return;
        }
        self.sweep_count = 0;

        let idle = !(self.witness | self.witness_prev);

        if let Some(victim) = self.sweep_armed.take() {
            if idle & victim.mask() != 0 {
                let owner = self.pool.get(victim).owner() as usize;
                let held = self.channels[owner].sentence.slot.bank() == Some(victim);
                if held {
                    #[cfg(feature = "log")]
                    log::warn!("channel {}: stalled sentence reclaimed", owner + 1);
                    self.pool.release(victim);
                    self.channels[owner].sentence.slot = SentenceSlot::None;
                    self.stats.record(ErrorKind::Slow, owner as u8);
                }
            }
        }

        let mut held = 0u16;
        for channel in &self.channels {
            if let Some(id) = channel.sentence.slot.bank() {
                held |= id.mask();
            }
        }
        let candidates = held & idle;
        if candidates != 0 {
            self.sweep_armed = Some(BankId::new(candidates.trailing_zeros() as u8));
        }

        self.witness_prev = self.witness;
        self.witness = 0;
    }

    // --- Introspection for invariant checks and diagnostics ---

    /// Bitmap of banks currently in the free pool.
    pub fn free_banks(&self) -> u16 {
        self.pool.free_bits()
    }

    /// Bitmap of banks held by channels (in progress or draining).
    pub fn held_banks(&self) -> u16 {
        let mut held = 0u16;
        for channel in &self.channels {
            if let Some(id) = channel.sentence.slot.bank() {
                held |= id.mask();
            }
        }
        held
    }

    /// Bitmap of banks waiting in the transmit queue.
    pub fn queued_banks(&self) -> u16 {
        let mut queued = 0u16;
        for id in self.queue.iter() {
            queued |= id.mask();
        }
        queued
    }

    /// The bank currently being streamed, if any.
    pub fn streaming_bank(&self) -> Option<BankId> {
        self.tx.active_bank()
    }

    /// CH_BUSY bitmap: channels whose busy timer is running.
    pub fn busy_channels(&self) -> u8 {
        self.busy
    }

    /// True while any channel holds a partial sentence or the output path
    /// still has work.
    pub fn is_active(&self) -> bool {
        self.held_banks() != 0
            || !self.queue.is_empty()
            || self.tx.active_bank().is_some()
            || self.staging.is_full()
    }

    #[cfg(test)]
    pub(crate) fn force_busy_timer(&mut self, channel: usize, value: u16) {
        self.channels[channel].sentence.timer = value.min(crate::assemble::TIMER_HIGH);
        if value > 0 {
            self.busy |= 1 << channel;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_engine_is_quiet() {
        let mux = Multiplexer::new(Settings::default());
        assert_eq!(mux.free_banks().count_ones(), 11);
        assert_eq!(mux.held_banks(), 0);
        assert_eq!(mux.queued_banks(), 0);
        assert_eq!(mux.busy_channels(), 0);
        assert!(!mux.is_active());
    }

    #[test]
    fn test_idle_ticks_produce_nothing() {
        let mut mux = Multiplexer::new(Settings::default());
        for t in 0..10_000i64 {
            let out = mux.tick(t * 7, PortPins::IDLE, false, true);
            assert_eq!(out.tx, None);
            assert!(!out.enter_config);
        }
        assert!(!mux.is_active());
        assert_eq!(mux.diagnostics().err_channels, 0);
    }

    #[test]
    fn test_config_poll_reports_once_per_outer_cycle() {
        let mut mux = Multiplexer::new(Settings::default());
        let mut hits = 0;
        for t in 0..(2 * COLUMNS_PER_ROUND as i64 * 10) {
            if mux.tick(t, PortPins::IDLE, true, true).enter_config {
                hits += 1;
            }
        }
        assert_eq!(hits, 10);
    }

    #[test]
    fn test_busy_timer_drains_and_clears_mask() {
        let mut mux = Multiplexer::new(Settings::default());
        mux.force_busy_timer(2, TIMER_STEP * 3);
        assert_eq!(mux.busy_channels(), 0b100);
        // Three outer cycles step the timer to zero.
        for t in 0..(2 * COLUMNS_PER_ROUND as i64 * 3) {
            mux.tick(t, PortPins::IDLE, false, true);
        }
        assert_eq!(mux.busy_channels(), 0);
    }

    #[test]
    fn test_reinit_clears_counters_and_state() {
        let mut mux = Multiplexer::new(Settings::default());
        mux.force_busy_timer(1, 100);
        let mut settings = Settings::default();
        settings.prefix = true;
        mux.reinit(settings);
        assert_eq!(mux.busy_channels(), 0);
        assert!(mux.settings().prefix);
        assert_eq!(mux.diagnostics(), Diagnostics::default());
    }
}
