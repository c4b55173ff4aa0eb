//! Bootloader command codes and status bytes.
//!
//! ## Command Format
//!
//! ```text
//! +----------+---------+------------------+
//! | Main CMD | Sub CMD |    Arguments     |
//! +----------+---------+------------------+
//! |  1 byte  | 1 byte  |     variable     |
//! +----------+---------+------------------+
//! ```
//!
//! The response always starts with a status byte, `0xAA` on success.

use std::fmt;

/// Bootloader commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Set device mode (enter/exit bootloader).
    SetMode,
    /// Load the 11-byte nonce.
    SetIv,
    /// Load the 16-byte authentication tag.
    SetAuth,
    /// Announce the number of pages to be written.
    SetNumPages,
    /// Erase the application area.
    EraseApp,
    /// Write one page (payload and checksum).
    WritePage,
    /// Load an AES key and AAD.
    SetKeyAad,
    /// Read the bootloader version.
    GetVersion,
    /// Read the flash page size.
    GetPageSize,
    /// Read the unique serial number.
    GetUsn,
    /// Persist configuration to flash.
    SaveSettings,
    /// Update one configuration item.
    EntryConfig,
    /// Update the exit behaviour.
    ExitConfig,
    /// Read the whole configuration word.
    ReadAllConfig,
    /// Read the platform (part) id.
    GetPlatformType,
}

impl Command {
    /// Main command byte.
    pub fn main(self) -> u8 {
        match self {
            Self::SetMode => 0x01,
            Self::SetIv
            | Self::SetAuth
            | Self::SetNumPages
            | Self::EraseApp
            | Self::WritePage
            | Self::SetKeyAad => 0x80,
            Self::GetVersion | Self::GetPageSize | Self::GetUsn => 0x81,
            Self::SaveSettings | Self::EntryConfig | Self::ExitConfig => 0x82,
            Self::ReadAllConfig => 0x83,
            Self::GetPlatformType => 0xFF,
        }
    }

    /// Sub command byte.
    pub fn sub(self) -> u8 {
        match self {
            Self::SetMode
            | Self::SetIv
            | Self::GetVersion
            | Self::SaveSettings
            | Self::GetPlatformType => 0x00,
            Self::SetAuth | Self::GetPageSize | Self::EntryConfig => 0x01,
            Self::SetNumPages | Self::GetUsn | Self::ExitConfig => 0x02,
            Self::EraseApp => 0x03,
            Self::WritePage => 0x04,
            Self::SetKeyAad => 0x07,
            Self::ReadAllConfig => 0xFF,
        }
    }

    /// Build the command bytes followed by `args`.
    pub fn with_args(self, args: &[u8]) -> Vec<u8> {
        let mut cmd = Vec::with_capacity(args.len() + 2);
        cmd.push(self.main());
        cmd.push(self.sub());
        cmd.extend_from_slice(args);
        cmd
    }
}

/// `SetMode` argument that enters bootloader mode.
pub const MODE_BOOTLOADER: u8 = 0x08;

/// `SetMode` argument that leaves bootloader mode.
pub const MODE_APPLICATION: u8 = 0x00;

/// Status byte returned by the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// `0x00`
    Success,
    /// `0xAA`, the bootloader's success status.
    BootloaderSuccess,
    /// `0x01`
    BadCommand,
    /// `0x02`
    Unavailable,
    /// `0x03`
    BadDataFormat,
    /// `0x04`
    BadInputValue,
    /// `0x80`
    General,
    /// `0x81`
    Checksum,
    /// `0x82`
    Auth,
    /// `0x83`
    InvalidApp,
    /// `0x84`
    AppNotErased,
    /// `0x85`
    Decryption,
    /// `0x86`
    KeyExists,
    /// `0x87`
    NoKeyMemory,
    /// `0xAB`
    PartialAck,
    /// `0xFE`, the target is busy.
    TryAgain,
    /// `0xFF`
    Unknown,
    /// Any other byte.
    Other(u8),
}

impl Status {
    /// Raw status byte.
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::BootloaderSuccess => 0xAA,
            Self::BadCommand => 0x01,
            Self::Unavailable => 0x02,
            Self::BadDataFormat => 0x03,
            Self::BadInputValue => 0x04,
            Self::General => 0x80,
            Self::Checksum => 0x81,
            Self::Auth => 0x82,
            Self::InvalidApp => 0x83,
            Self::AppNotErased => 0x84,
            Self::Decryption => 0x85,
            Self::KeyExists => 0x86,
            Self::NoKeyMemory => 0x87,
            Self::PartialAck => 0xAB,
            Self::TryAgain => 0xFE,
            Self::Unknown => 0xFF,
            Self::Other(code) => code,
        }
    }

    /// Short description.
    pub fn description(self) -> &'static str {
        match self {
            Self::Success | Self::BootloaderSuccess => "success",
            Self::BadCommand => "bad command",
            Self::Unavailable => "unavailable",
            Self::BadDataFormat => "bad data format",
            Self::BadInputValue => "bad input value",
            Self::General => "general bootloader error",
            Self::Checksum => "checksum error",
            Self::Auth => "authentication error",
            Self::InvalidApp => "invalid application",
            Self::AppNotErased => "application not erased",
            Self::Decryption => "decryption error",
            Self::KeyExists => "key already exists",
            Self::NoKeyMemory => "no key memory",
            Self::PartialAck => "partial ack",
            Self::TryAgain => "try again",
            Self::Unknown => "unknown",
            Self::Other(_) => "unrecognised status",
        }
    }
}

impl From<u8> for Status {
    fn from(code: u8) -> Self {
        match code {
            0x00 => Self::Success,
            0xAA => Self::BootloaderSuccess,
            0x01 => Self::BadCommand,
            0x02 => Self::Unavailable,
            0x03 => Self::BadDataFormat,
            0x04 => Self::BadInputValue,
            0x80 => Self::General,
            0x81 => Self::Checksum,
            0x82 => Self::Auth,
            0x83 => Self::InvalidApp,
            0x84 => Self::AppNotErased,
            0x85 => Self::Decryption,
            0x86 => Self::KeyExists,
            0x87 => Self::NoKeyMemory,
            0xAB => Self::PartialAck,
            0xFE => Self::TryAgain,
            0xFF => Self::Unknown,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X} ({})", self.code(), self.description())
    }
}
