//! Sentence assembler: drives the per-channel sentence lifecycle from the
//! first byte through the terminator or a failure path.
//!
//! Every path out of [`accept`] is an explicit early return: stray
//! terminator, discard-start filter, binary first byte, suppression,
//! congestion, stored byte, completion, poisoning, drain. The assembler
//! never touches the parser; frame errors arrive separately through
//! [`frame_error`].

use crate::bank::{BankPool, SentenceSlot};
use crate::classify::{filter_value, ByteClass};
use crate::queue::TxQueue;
use crate::settings::Settings;
use crate::stats::{ErrorKind, Stats};

/// Busy-timer value armed on each completed sentence; ticked down by the
/// housekeeping rotation over roughly 2.5 s.
pub(crate) const TIMER_HIGH: u16 = 0xE800;

/// Assembler-owned part of a channel: its sentence reference and busy timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChannelSentence {
    pub(crate) slot: SentenceSlot,
    /// Non-zero means "busy": recently completed a sentence; contributes to
    /// other channels' suppression checks.
    pub(crate) timer: u16,
}

/// Shared state the assembler operates on, split out of the engine so the
/// per-channel call can borrow its channel independently.
pub(crate) struct AssembleCtx<'a> {
    pub pool: &'a mut BankPool,
    pub queue: &'a mut TxQueue,
    pub stats: &'a mut Stats,
    /// Banks written during the current sweep window.
    pub witness: &'a mut u16,
    /// CH_BUSY bitmap; completion sets this channel's bit.
    pub busy: &'a mut u8,
    pub settings: &'a Settings,
}

/// Feed one classified byte for `channel` through the sentence lifecycle.
pub(crate) fn accept(
    ctx: &mut AssembleCtx<'_>,
    channel: u8,
    ch: &mut ChannelSentence,
    class: ByteClass,
) {
    match ch.slot {
        SentenceSlot::None => {
            if class == ByteClass::Terminator {
                // Stray \r or \n between sentences.
                return;
            }
            let value = filter_value(class);
            if value == ctx.settings.discard_start[channel as usize] {
                ch.slot = SentenceSlot::Discard;
                return;
            }
            if class == ByteClass::Binary {
                ctx.stats.record(ErrorKind::Binary, channel);
                ch.slot = SentenceSlot::Discard;
                return;
            }
            if ctx.settings.suppress[channel as usize] & *ctx.busy != 0 {
                // A busy higher-priority channel pre-empts this one.
                ch.slot = SentenceSlot::Discard;
                return;
            }
            match ctx.pool.alloc(channel) {
                Some(id) => {
                    let stored = ctx.pool.get_mut(id).push(value);
                    debug_assert!(stored);
                    *ctx.witness |= id.mask();
                    ch.slot = SentenceSlot::InProgress(id);
                }
                None => {
                    #[cfg(feature = "log")]
                    log::warn!("channel {}: no free bank, sentence dropped", channel + 1);
                    ctx.stats.record(ErrorKind::Congestion, channel);
                    ch.slot = SentenceSlot::Discard;
                }
            }
        }
        SentenceSlot::InProgress(id) => match class {
            ByteClass::Terminator => {
                ch.timer = TIMER_HIGH;
                *ctx.busy |= 1 << channel;
                ctx.queue.push(id);
                ch.slot = SentenceSlot::None;
            }
            ByteClass::Binary => {
                ctx.stats.record(ErrorKind::Binary, channel);
                *ctx.witness |= id.mask();
                ch.slot = SentenceSlot::Invalid(id);
            }
            ByteClass::Pass(byte) => {
                if ctx.pool.get_mut(id).push(byte) {
                    *ctx.witness |= id.mask();
                } else {
                    ctx.stats.record(ErrorKind::Overlong, channel);
                    *ctx.witness |= id.mask();
                    ch.slot = SentenceSlot::Invalid(id);
                }
            }
        },
        SentenceSlot::Invalid(id) => {
            // Draining to the terminator; the bank is freed without emission.
            if class == ByteClass::Terminator {
                ctx.pool.release(id);
                ch.slot = SentenceSlot::None;
            } else {
                *ctx.witness |= id.mask();
            }
        }
        SentenceSlot::Discard => {
            if class == ByteClass::Terminator {
                ch.slot = SentenceSlot::None;
            }
        }
    }
}

/// Frame error on the channel: the sentence in flight, if any, is dropped.
pub(crate) fn frame_error(ctx: &mut AssembleCtx<'_>, channel: u8, ch: &mut ChannelSentence) {
    if let Some(id) = ch.slot.bank() {
        ctx.pool.release(id);
    }
    ch.slot = SentenceSlot::None;
    ctx.stats.record(ErrorKind::Frame, channel);
}
