//! Device settings: the immutable per-run configuration and its persisted
//! 24-byte blob.
//!
//! The engine consumes a [`Settings`] value as an immutable input across one
//! sentence lifetime; the configuration dialogue edits a working copy and
//! persists it through a [`SettingsStore`]. Factory and user copies live in
//! separate store blocks, and the user copy is written as one
//! erase-then-program operation (a single `save_user` call).
//!
//! # Blob layout
//!
//! ```text
//! [0..8)    per-channel suppression masks
//! [8..16)   per-channel discard start bytes
//! [16]      channel-prefix flag
//! [17]      fast-channel mask (channels 1-4, bits 0-3)
//! [18]      CRLF terminator flag
//! [19]      input-inversion mask
//! [20]      output-inversion flag
//! [21]      output baud index (0=4800, 1=38400, 2=115200)
//! [22]      Schmitt-trigger mask
//! [23]      reserved, zero
//! ```

use crate::sample::CHANNEL_COUNT;

/// Size of the persisted settings blob.
pub const BLOB_LEN: usize = 24;

/// Output line rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OutputBaud {
    #[default]
    B4800,
    B38400,
    B115200,
}

impl OutputBaud {
    /// Index as persisted and as taken by the `B` command.
    pub fn index(self) -> u8 {
        match self {
            OutputBaud::B4800 => 0,
            OutputBaud::B38400 => 1,
            OutputBaud::B115200 => 2,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(OutputBaud::B4800),
            1 => Some(OutputBaud::B38400),
            2 => Some(OutputBaud::B115200),
            _ => None,
        }
    }

    pub fn bits_per_second(self) -> u32 {
        match self {
            OutputBaud::B4800 => 4_800,
            OutputBaud::B38400 => 38_400,
            OutputBaud::B115200 => 115_200,
        }
    }
}

/// Complete device configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Per channel: while any of the masked channels is busy, discard new
    /// sentences on this channel.
    pub suppress: [u8; CHANNEL_COUNT],
    /// Per channel: a sentence whose first byte equals this is dropped.
    /// Zero never matches a classified byte, so zero disables the filter.
    pub discard_start: [u8; CHANNEL_COUNT],
    /// Emit the originating channel digit before each sentence.
    pub prefix: bool,
    /// Channels 1-4 run at 38,400 baud when their bit is set, 4,800
    /// otherwise. Channels 5-8 are always slow.
    pub fast_mask: u8,
    /// Terminate output sentences with `\r\n` instead of `\n`.
    pub crlf: bool,
    /// Per-channel input inversion (optocoupled inverting stages).
    pub invert_input: u8,
    /// Invert the output line, applied at hardware init.
    pub invert_output: bool,
    /// Output rate.
    pub baud: OutputBaud,
    /// Input Schmitt-trigger enable mask, applied at hardware init.
    pub schmitt: u8,
}

impl Default for Settings {
    /// Factory defaults: all filters off, channels 1-4 fast, plain `\n`,
    /// 4,800 baud out.
    fn default() -> Self {
        Self {
            suppress: [0; CHANNEL_COUNT],
            discard_start: [0; CHANNEL_COUNT],
            prefix: false,
            fast_mask: 0x0F,
            crlf: false,
            invert_input: 0,
            invert_output: false,
            baud: OutputBaud::B4800,
            schmitt: 0,
        }
    }
}

impl Settings {
    /// Whether a channel runs at the fast rate.
    pub fn channel_fast(&self, channel: usize) -> bool {
        channel < 4 && (self.fast_mask >> channel) & 1 != 0
    }

    /// Serialise into the persisted layout.
    pub fn to_blob(&self) -> [u8; BLOB_LEN] {
        let mut blob = [0u8; BLOB_LEN];
        blob[..8].copy_from_slice(&self.suppress);
        blob[8..16].copy_from_slice(&self.discard_start);
        blob[16] = self.prefix as u8;
        blob[17] = self.fast_mask;
        blob[18] = self.crlf as u8;
        blob[19] = self.invert_input;
        blob[20] = self.invert_output as u8;
        blob[21] = self.baud.index();
        blob[22] = self.schmitt;
        blob
    }

    /// Parse a persisted blob, rejecting out-of-range fields.
    pub fn from_blob(blob: &[u8; BLOB_LEN]) -> Result<Self, BlobError> {
        let flag = |offset: usize| -> Result<bool, BlobError> {
            match blob[offset] {
                0 => Ok(false),
                1 => Ok(true),
                v => Err(BlobError::BadFlag { offset, value: v }),
            }
        };
        if blob[17] & !0x0F != 0 {
            return Err(BlobError::BadFastMask(blob[17]));
        }
        let baud = OutputBaud::from_index(blob[21]).ok_or(BlobError::BadBaud(blob[21]))?;
        let mut suppress = [0u8; CHANNEL_COUNT];
        suppress.copy_from_slice(&blob[..8]);
        let mut discard_start = [0u8; CHANNEL_COUNT];
        discard_start.copy_from_slice(&blob[8..16]);
        Ok(Self {
            suppress,
            discard_start,
            prefix: flag(16)?,
            fast_mask: blob[17],
            crlf: flag(18)?,
            invert_input: blob[19],
            invert_output: flag(20)?,
            baud,
            schmitt: blob[22],
        })
    }
}

/// Rejected persisted blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlobError {
    /// A boolean field held something other than 0 or 1.
    BadFlag { offset: usize, value: u8 },
    /// Fast mask had bits outside channels 1-4.
    BadFastMask(u8),
    /// Baud index outside 0..=2.
    BadBaud(u8),
}

impl core::fmt::Display for BlobError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BlobError::BadFlag { offset, value } => {
                write!(f, "bad flag at byte {}: {:#04x}", offset, value)
            }
            BlobError::BadFastMask(v) => write!(f, "bad fast mask: {:#04x}", v),
            BlobError::BadBaud(v) => write!(f, "bad baud index: {}", v),
        }
    }
}

/// Persistence error from a [`SettingsStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// The erase-then-program cycle failed.
    WriteFailed,
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StoreError::WriteFailed => write!(f, "settings write failed"),
        }
    }
}

/// Backing store holding the factory and user settings blocks.
///
/// Implemented by the platform (flash, EEPROM, a file); an in-memory
/// implementation backs the tests.
pub trait SettingsStore {
    /// Read the user block; `None` if absent or unreadable.
    fn load_user(&mut self) -> Option<[u8; BLOB_LEN]>;

    /// Replace the user block in one erase-then-program operation.
    fn save_user(&mut self, blob: &[u8; BLOB_LEN]) -> Result<(), StoreError>;

    /// Read the factory block.
    fn factory(&self) -> [u8; BLOB_LEN] {
        Settings::default().to_blob()
    }
}
