//! Dialogue error types.
//!
//! Every failure answers with the same `Error` line; the variants exist for
//! internal routing and logging.

/// Why a command line was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdError {
    /// Letter not in the command table.
    UnknownCommand,
    /// Argument count or format did not match the grammar.
    BadArgument,
    /// The settings store refused a load or save.
    Store,
}

impl core::fmt::Display for CmdError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CmdError::UnknownCommand => write!(f, "unknown command"),
            CmdError::BadArgument => write!(f, "bad argument"),
            CmdError::Store => write!(f, "settings store error"),
        }
    }
}
