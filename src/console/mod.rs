//! Interactive configuration dialogue.
//!
//! Entered when the configuration pin is pulled down and left when it is
//! released; both transitions are managed by the platform glue, which feeds
//! received bytes into [`Dialogue::input`] and applies the edited settings
//! through [`crate::Multiplexer::reinit`] on exit.
//!
//! The dialogue is strictly line-oriented: one command letter, positional
//! digit or hex arguments, terminated by `\n` or `\r\n`. Every line answers
//! `Ok` or `Error`.

pub mod commands;
pub mod error;
pub mod parser;

pub use commands::{execute, CommandCtx, COMMANDS};
pub use error::CmdError;
pub use parser::{parse_line, ParsedLine};

use core::fmt::Write;

use heapless::Vec;

/// Version string (set by build.rs).
pub const VERSION: &str = env!("VERSION_STRING");

/// Longest accepted command line, terminator excluded.
pub const LINE_MAX: usize = 32;

/// Byte-fed front end accumulating command lines.
pub struct Dialogue {
    line: Vec<u8, LINE_MAX>,
    overflow: bool,
}

impl Dialogue {
    pub const fn new() -> Self {
        Self {
            line: Vec::new(),
            overflow: false,
        }
    }

    /// Process one received byte; runs a command when a terminator arrives.
    pub fn input<W: Write>(&mut self, byte: u8, ctx: &mut CommandCtx<'_>, out: &mut W) {
        if byte != b'\n' {
            if self.line.push(byte).is_err() {
                self.overflow = true;
            }
            return;
        }

        let overflowed = core::mem::replace(&mut self.overflow, false);
        let result = if overflowed {
            Err(CmdError::BadArgument)
        } else {
            self.process_line(ctx, out)
        };
        self.line.clear();
        match result {
            Ok(()) => {
                let _ = writeln!(out, "Ok");
            }
            Err(_e) => {
                #[cfg(feature = "log")]
                log::debug!("dialogue rejected line: {}", _e);
                let _ = writeln!(out, "Error");
            }
        }
    }

    fn process_line<W: Write>(
        &mut self,
        ctx: &mut CommandCtx<'_>,
        out: &mut W,
    ) -> Result<(), CmdError> {
        match parse_line(&self.line) {
            Some(parsed) => execute(&parsed, ctx, out),
            // A bare terminator is not a command.
            None => Err(CmdError::UnknownCommand),
        }
    }
}

impl Default for Dialogue {
    fn default() -> Self {
        Self::new()
    }
}
