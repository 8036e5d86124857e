//! Command handlers for the configuration dialogue.

use core::fmt::Write;

use super::error::CmdError;
use super::parser::{channel_digit, decimal_digit, hex_byte, hex_nibble, ParsedLine};
use super::VERSION;
use crate::sample::CHANNEL_COUNT;
use crate::settings::{OutputBaud, Settings, SettingsStore};
use crate::stats::Diagnostics;

/// Everything a command can touch: the working settings copy, the backing
/// store and a diagnostics snapshot taken on dialogue entry.
pub struct CommandCtx<'a> {
    pub settings: &'a mut Settings,
    pub store: &'a mut dyn SettingsStore,
    pub diag: Diagnostics,
}

/// Command descriptor.
pub struct CommandDescriptor {
    pub letter: u8,
    pub brief: &'static str,
    handler: fn(&ParsedLine<'_>, &mut CommandCtx<'_>, &mut dyn Write) -> Result<(), CmdError>,
}

/// All dialogue commands.
pub static COMMANDS: &[CommandDescriptor] = &[
    CommandDescriptor { letter: b'I', brief: "input inversion mask", handler: cmd_invert_input },
    CommandDescriptor { letter: b'J', brief: "output inversion", handler: cmd_invert_output },
    CommandDescriptor { letter: b'C', brief: "channel prefix on/off", handler: cmd_prefix },
    CommandDescriptor { letter: b'N', brief: "CRLF terminator on/off", handler: cmd_crlf },
    CommandDescriptor { letter: b'D', brief: "per-channel discard start byte", handler: cmd_discard },
    CommandDescriptor { letter: b'F', brief: "fast-channel mask", handler: cmd_fast },
    CommandDescriptor { letter: b'U', brief: "per-channel suppression mask", handler: cmd_suppress },
    CommandDescriptor { letter: b'H', brief: "Schmitt-trigger mask", handler: cmd_schmitt },
    CommandDescriptor { letter: b'B', brief: "output baud", handler: cmd_baud },
    CommandDescriptor { letter: b'P', brief: "print settings", handler: cmd_print },
    CommandDescriptor { letter: b'G', brief: "print diagnostics", handler: cmd_diag },
    CommandDescriptor { letter: b'L', brief: "reload user settings", handler: cmd_load },
    CommandDescriptor { letter: b'S', brief: "save user settings", handler: cmd_save },
    CommandDescriptor { letter: b'R', brief: "factory defaults and save", handler: cmd_factory },
];

/// Execute a parsed command line.
pub fn execute(
    line: &ParsedLine<'_>,
    ctx: &mut CommandCtx<'_>,
    out: &mut dyn Write,
) -> Result<(), CmdError> {
    let descriptor = COMMANDS
        .iter()
        .find(|c| c.letter == line.letter)
        .ok_or(CmdError::UnknownCommand)?;
    (descriptor.handler)(line, ctx, out)
}

// --- Command Implementations ---

fn flag(args: &[u8]) -> Result<bool, CmdError> {
    match decimal_digit(args) {
        Some(0) => Ok(false),
        Some(1) => Ok(true),
        _ => Err(CmdError::BadArgument),
    }
}

fn cmd_invert_input(
    line: &ParsedLine<'_>,
    ctx: &mut CommandCtx<'_>,
    _out: &mut dyn Write,
) -> Result<(), CmdError> {
    ctx.settings.invert_input = hex_byte(line.args).ok_or(CmdError::BadArgument)?;
    Ok(())
}

fn cmd_invert_output(
    line: &ParsedLine<'_>,
    ctx: &mut CommandCtx<'_>,
    _out: &mut dyn Write,
) -> Result<(), CmdError> {
    ctx.settings.invert_output = flag(line.args)?;
    Ok(())
}

fn cmd_prefix(
    line: &ParsedLine<'_>,
    ctx: &mut CommandCtx<'_>,
    _out: &mut dyn Write,
) -> Result<(), CmdError> {
    ctx.settings.prefix = flag(line.args)?;
    Ok(())
}

fn cmd_crlf(
    line: &ParsedLine<'_>,
    ctx: &mut CommandCtx<'_>,
    _out: &mut dyn Write,
) -> Result<(), CmdError> {
    ctx.settings.crlf = flag(line.args)?;
    Ok(())
}

fn cmd_discard(
    line: &ParsedLine<'_>,
    ctx: &mut CommandCtx<'_>,
    _out: &mut dyn Write,
) -> Result<(), CmdError> {
    let (&ch, rest) = line.args.split_first().ok_or(CmdError::BadArgument)?;
    let channel = channel_digit(ch).ok_or(CmdError::BadArgument)?;
    ctx.settings.discard_start[channel] = hex_byte(rest).ok_or(CmdError::BadArgument)?;
    Ok(())
}

fn cmd_fast(
    line: &ParsedLine<'_>,
    ctx: &mut CommandCtx<'_>,
    _out: &mut dyn Write,
) -> Result<(), CmdError> {
    match line.args {
        [digit] => {
            ctx.settings.fast_mask = hex_nibble(*digit).ok_or(CmdError::BadArgument)?;
            Ok(())
        }
        _ => Err(CmdError::BadArgument),
    }
}

fn cmd_suppress(
    line: &ParsedLine<'_>,
    ctx: &mut CommandCtx<'_>,
    _out: &mut dyn Write,
) -> Result<(), CmdError> {
    let (&ch, rest) = line.args.split_first().ok_or(CmdError::BadArgument)?;
    let channel = channel_digit(ch).ok_or(CmdError::BadArgument)?;
    ctx.settings.suppress[channel] = hex_byte(rest).ok_or(CmdError::BadArgument)?;
    Ok(())
}

fn cmd_schmitt(
    line: &ParsedLine<'_>,
    ctx: &mut CommandCtx<'_>,
    _out: &mut dyn Write,
) -> Result<(), CmdError> {
    ctx.settings.schmitt = hex_byte(line.args).ok_or(CmdError::BadArgument)?;
    Ok(())
}

fn cmd_baud(
    line: &ParsedLine<'_>,
    ctx: &mut CommandCtx<'_>,
    _out: &mut dyn Write,
) -> Result<(), CmdError> {
    let index = decimal_digit(line.args).ok_or(CmdError::BadArgument)?;
    ctx.settings.baud = OutputBaud::from_index(index).ok_or(CmdError::BadArgument)?;
    Ok(())
}

fn cmd_print(
    line: &ParsedLine<'_>,
    ctx: &mut CommandCtx<'_>,
    out: &mut dyn Write,
) -> Result<(), CmdError> {
    if !line.args.is_empty() {
        return Err(CmdError::BadArgument);
    }
    let s = &*ctx.settings;
    let _ = writeln!(
        out,
        "I{:02X} J{} C{} N{} F{:X} B{} H{:02X}",
        s.invert_input,
        s.invert_output as u8,
        s.prefix as u8,
        s.crlf as u8,
        s.fast_mask,
        s.baud.index(),
        s.schmitt,
    );
    for channel in 0..CHANNEL_COUNT {
        let _ = writeln!(
            out,
            "D{}{:02X} U{}{:02X}",
            channel + 1,
            s.discard_start[channel],
            channel + 1,
            s.suppress[channel],
        );
    }
    Ok(())
}

fn cmd_diag(
    line: &ParsedLine<'_>,
    ctx: &mut CommandCtx<'_>,
    out: &mut dyn Write,
) -> Result<(), CmdError> {
    if !line.args.is_empty() {
        return Err(CmdError::BadArgument);
    }
    let d = &ctx.diag;
    let _ = writeln!(out, "Version: {}", VERSION);
    let _ = writeln!(out, "Loop: {}/{} us", d.loop_min_us, d.loop_max_us);
    let _ = writeln!(
        out,
        "Mode: B{} F{:X}",
        ctx.settings.baud.index(),
        ctx.settings.fast_mask,
    );
    let _ = writeln!(
        out,
        "Frame {} Cong {} Long {} Slow {} Bin {}",
        d.frame, d.congestion, d.overlong, d.slow, d.binary,
    );
    let _ = writeln!(out, "ErrCh {:02X}", d.err_channels);
    Ok(())
}

fn cmd_load(
    line: &ParsedLine<'_>,
    ctx: &mut CommandCtx<'_>,
    _out: &mut dyn Write,
) -> Result<(), CmdError> {
    if !line.args.is_empty() {
        return Err(CmdError::BadArgument);
    }
    let blob = ctx.store.load_user().ok_or(CmdError::Store)?;
    *ctx.settings = Settings::from_blob(&blob).map_err(|_| CmdError::Store)?;
    Ok(())
}

fn cmd_save(
    line: &ParsedLine<'_>,
    ctx: &mut CommandCtx<'_>,
    _out: &mut dyn Write,
) -> Result<(), CmdError> {
    if !line.args.is_empty() {
        return Err(CmdError::BadArgument);
    }
    ctx.store
        .save_user(&ctx.settings.to_blob())
        .map_err(|_| CmdError::Store)
}

fn cmd_factory(
    line: &ParsedLine<'_>,
    ctx: &mut CommandCtx<'_>,
    _out: &mut dyn Write,
) -> Result<(), CmdError> {
    if !line.args.is_empty() {
        return Err(CmdError::BadArgument);
    }
    let blob = ctx.store.factory();
    *ctx.settings = Settings::from_blob(&blob).map_err(|_| CmdError::Store)?;
    ctx.store
        .save_user(&ctx.settings.to_blob())
        .map_err(|_| CmdError::Store)
}
