//! Soft-UART receive state machine, one instance per channel.
//!
//! Pure logic, no hardware dependencies. Consumes oversampled line levels,
//! produces completed bytes and frame-error events. Fully testable on host.
//!
//! # Sampling model
//!
//! The scheduler samples each line four times per bit time (slots 0-3 on a
//! free-running grid). Start-bit detection picks one of two phases:
//!
//! - **Phase A**: start edge seen at slot 0; data bits read at slot 1.
//! - **Phase B**: start edge seen at slot 2; data bits read at slot 3.
//!
//! The start edge always falls between the slot-2 sample of one window and
//! the slot-2 sample of the next, so the chosen data sample lies between
//! 25 % and 75 % of the nominal bit window. That margin covers a clock skew
//! of about +/-2.5 % over the ten bits of one frame. After a good stop bit
//! the watch re-arms immediately, so a sender running slightly fast has its
//! next start bit caught at the first slot-0 or slot-2 sample it reaches,
//! re-picking the phase per frame.

use crate::sample::SLOTS_PER_BIT;

/// Which of the two late-bit samples carries data for the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Data sampled at slot 1.
    A,
    /// Data sampled at slot 3.
    B,
}

/// Receive FSM state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RxState {
    /// Line idle, watching slot 0 / slot 2 for a start bit.
    Waiting,
    /// Shifting data bits at the phase's data slot.
    Receiving,
    /// Next data-slot sample is the stop bit.
    StopBit,
    /// After a frame error: require a run of idle samples before rearming.
    FrameErrorWait,
}

/// Event produced by one sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RxEvent {
    /// A complete byte was received (stop bit not yet checked).
    Byte(u8),
    /// Stop bit was low; the channel enters frame-error recovery.
    FrameError,
}

/// Marker bit seeding the build register; when it reaches bit 0 the next
/// data bit is the eighth.
const BUILD_SEED: u8 = 0x80;

/// Consecutive idle samples (slots 0/2) required to leave frame-error
/// recovery.
const RECOVER_FAST: u8 = 0x80;
const RECOVER_SLOW: u8 = 0x10;

/// Per-channel soft-UART receiver.
///
/// Feed it every scheduled sample for its channel via [`sample`](Self::sample)
/// together with the free-running slot index. A line held low forever never
/// satisfies frame-error recovery and therefore never produces bytes.
#[derive(Debug)]
pub struct BitParser {
    state: RxState,
    phase: Phase,
    /// Shift register building the current byte, LSB first, seeded with a
    /// marker at bit 7.
    build: u8,
    /// Skip one data-slot sample right after start detection (that sample
    /// still lies inside the start bit).
    skip_start: bool,
    /// Idle-run counter for frame-error recovery.
    recover: u8,
    /// Recovery threshold depends on the channel rate.
    recover_goal: u8,
}

impl BitParser {
    /// Create a parser for a fast (38,400 baud) or slow (4,800 baud) line.
    pub fn new(fast: bool) -> Self {
        Self {
            state: RxState::Waiting,
            phase: Phase::A,
            build: BUILD_SEED,
            skip_start: false,
            recover: 0,
            recover_goal: if fast { RECOVER_FAST } else { RECOVER_SLOW },
        }
    }

    /// Phase currently in effect (meaningful while receiving).
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True while the parser sits in frame-error recovery.
    pub fn in_error_recovery(&self) -> bool {
        self.state == RxState::FrameErrorWait
    }

    fn data_slot(&self) -> u8 {
        match self.phase {
            Phase::A => 1,
            Phase::B => 3,
        }
    }

    fn begin(&mut self, phase: Phase) {
        self.phase = phase;
        self.build = BUILD_SEED;
        // The first data-slot sample still lies inside the start bit.
        self.skip_start = true;
        self.state = RxState::Receiving;
    }

    /// Consume one sample taken at `slot` (0-3 on the free-running grid).
    ///
    /// Returns a completed byte at the eighth data bit, or a frame-error
    /// event at a low stop bit. The byte is reported before the stop bit is
    /// checked, matching the store-then-verify order of the receive path.
    pub fn sample(&mut self, slot: u8, high: bool) -> Option<RxEvent> {
        debug_assert!(slot < SLOTS_PER_BIT);
        match self.state {
            RxState::Waiting => {
                if slot == 0 && !high {
                    self.begin(Phase::A);
                } else if slot == 2 && !high {
                    self.begin(Phase::B);
                }
                None
            }
            RxState::Receiving => {
                if slot != self.data_slot() {
                    return None;
                }
                if self.skip_start {
                    self.skip_start = false;
                    return None;
                }
                if self.build & 1 != 0 {
                    // Marker reached bit 0: this sample is the eighth data bit.
                    let byte = (self.build >> 1) | ((high as u8) << 7);
                    self.state = RxState::StopBit;
                    return Some(RxEvent::Byte(byte));
                }
                self.build = (self.build >> 1) | ((high as u8) << 7);
                None
            }
            RxState::StopBit => {
                if slot != self.data_slot() {
                    return None;
                }
                if !high {
                    self.recover = 0;
                    self.state = RxState::FrameErrorWait;
                    return Some(RxEvent::FrameError);
                }
                // Back to watching slot 0 / slot 2. A sender running slightly
                // fast has its next start bit under way already; the watch
                // catches it at whichever slot it reaches first and re-picks
                // the phase to match.
                self.state = RxState::Waiting;
                None
            }
            RxState::FrameErrorWait => {
                if slot == 0 || slot == 2 {
                    if high {
                        self.recover = self.recover.saturating_add(1);
                        if self.recover >= self.recover_goal {
                            self.state = RxState::Waiting;
                        }
                    } else {
                        self.recover = 0;
                    }
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive a parser with a level waveform, one entry per column, starting
    /// at slot 0. Returns all events.
    fn run(parser: &mut BitParser, levels: &[bool]) -> Vec<RxEvent> {
        let mut events = Vec::new();
        for (col, &high) in levels.iter().enumerate() {
            if let Some(ev) = parser.sample((col % 4) as u8, high) {
                events.push(ev);
            }
        }
        events
    }

    /// 8-N-1 waveform for one byte, four columns per bit.
    fn frame(byte: u8) -> Vec<bool> {
        let mut out = vec![false; 4]; // start bit
        for bit in 0..8 {
            let high = (byte >> bit) & 1 != 0;
            out.extend([high; 4]);
        }
        out.extend([true; 4]); // stop bit
        out
    }

    #[test]
    fn test_receives_byte_phase_a() {
        let mut parser = BitParser::new(true);
        let mut wave = vec![true; 8];
        wave.extend(frame(0x55));
        wave.extend([true; 8]);
        assert_eq!(run(&mut parser, &wave), [RxEvent::Byte(0x55)]);
        assert_eq!(parser.phase(), Phase::A);
    }

    #[test]
    fn test_receives_byte_phase_b() {
        let mut parser = BitParser::new(true);
        // Idle run ending mid-window so the edge lands between slot 0 and
        // slot 2 of a window.
        let mut wave = vec![true; 6];
        wave.extend(frame(b'$'));
        wave.extend([true; 10]);
        assert_eq!(run(&mut parser, &wave), [RxEvent::Byte(b'$')]);
        assert_eq!(parser.phase(), Phase::B);
    }

    #[test]
    fn test_back_to_back_bytes() {
        let mut parser = BitParser::new(true);
        let mut wave = vec![true; 8];
        wave.extend(frame(b'A'));
        wave.extend(frame(b'B'));
        wave.extend([true; 8]);
        assert_eq!(
            run(&mut parser, &wave),
            [RxEvent::Byte(b'A'), RxEvent::Byte(b'B')]
        );
    }

    #[test]
    fn test_contiguous_stream_at_every_alignment() {
        // Wherever the first start edge lands on the slot grid, a gapless
        // byte stream must come through intact.
        for idle in 4..12 {
            let mut parser = BitParser::new(true);
            let mut wave = vec![true; idle];
            wave.extend(frame(b'G'));
            wave.extend(frame(b'P'));
            wave.extend(frame(b'S'));
            wave.extend([true; 8]);
            let events = run(&mut parser, &wave);
            assert_eq!(
                events,
                [RxEvent::Byte(b'G'), RxEvent::Byte(b'P'), RxEvent::Byte(b'S')],
                "idle offset {}",
                idle
            );
        }
    }

    #[test]
    fn test_low_stop_bit_is_frame_error() {
        let mut parser = BitParser::new(true);
        let mut wave = vec![true; 8];
        wave.extend(vec![false; 4]); // start
        for _ in 0..8 {
            wave.extend([true; 4]); // data 0xFF
        }
        wave.extend([false; 4]); // broken stop bit
        wave.extend([true; 4]);
        let events = run(&mut parser, &wave);
        assert_eq!(events, [RxEvent::Byte(0xFF), RxEvent::FrameError]);
        assert!(parser.in_error_recovery());
    }

    #[test]
    fn test_recovery_needs_idle_run() {
        let mut parser = BitParser::new(false); // slow: goal 0x10
        let mut wave = vec![true; 8];
        wave.extend(vec![false; 4]);
        for _ in 0..8 {
            wave.extend([true; 4]);
        }
        wave.extend([false; 4]); // frame error
        run(&mut parser, &wave);
        assert!(parser.in_error_recovery());

        // 0x10 idle slot-0/2 samples = 0x10 / 2 windows = 32 columns.
        let idle = vec![true; 32];
        run(&mut parser, &idle);
        assert!(!parser.in_error_recovery());

        // Reception works again afterwards.
        let mut wave = frame(b'X');
        wave.extend([true; 8]);
        assert_eq!(run(&mut parser, &wave), [RxEvent::Byte(b'X')]);
    }

    #[test]
    fn test_stuck_low_line_never_recovers() {
        let mut parser = BitParser::new(true);
        let mut wave = vec![true; 8];
        wave.extend(vec![false; 4]);
        for _ in 0..8 {
            wave.extend([false; 4]); // data all low
        }
        wave.extend([false; 4]); // stop low: frame error
        run(&mut parser, &wave);
        assert!(parser.in_error_recovery());

        // Ten thousand more low columns: still stuck, no events.
        let low = vec![false; 10_000];
        assert!(run(&mut parser, &low).is_empty());
        assert!(parser.in_error_recovery());
    }

    #[test]
    fn test_clock_skew_tolerated() {
        // Emulate a sender running 2% fast by dropping one column in fifty
        // from a nominal-rate waveform.
        let mut nominal = vec![true; 8];
        nominal.extend(frame(b'G'));
        nominal.extend(frame(b'P'));
        nominal.extend([true; 16]);
        let skewed: Vec<bool> = nominal
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 50 != 49)
            .map(|(_, &b)| b)
            .collect();
        let mut parser = BitParser::new(true);
        let events = run(&mut parser, &skewed);
        assert_eq!(events, [RxEvent::Byte(b'G'), RxEvent::Byte(b'P')]);
    }
}
