//! JBOD operation words.
//!
//! Layout of the 32-bit opcode, shared by encoder and decoder:
//!
//! | bits  | field    |
//! |-------|----------|
//! | 0-3   | disk id  |
//! | 4-11  | block id |
//! | 12-13 | reserved |
//! | 14-19 | command  |
//! | 20-31 | reserved |

use std::fmt;

const DISK_SHIFT: u32 = 0;
const DISK_MASK: u32 = 0xf;
const BLOCK_SHIFT: u32 = 4;
const BLOCK_MASK: u32 = 0xff;
const COMMAND_SHIFT: u32 = 14;
const COMMAND_MASK: u32 = 0x3f;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Mount = 0,
    Unmount = 1,
    SeekToDisk = 2,
    SeekToBlock = 3,
    ReadBlock = 4,
    WriteBlock = 5,
    SignBlock = 6,
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Mount,
            1 => Self::Unmount,
            2 => Self::SeekToDisk,
            3 => Self::SeekToBlock,
            4 => Self::ReadBlock,
            5 => Self::WriteBlock,
            6 => Self::SignBlock,
            other => return Err(other),
        })
    }
}

/// An encoded operation word.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode(u32);

impl Opcode {
    /// Pack a command with its target disk and block. Indices wider than
    /// their fields are truncated to the field width.
    pub fn encode(disk: u32, block: u32, command: Command) -> Self {
        Self(
            (disk & DISK_MASK) << DISK_SHIFT
                | (block & BLOCK_MASK) << BLOCK_SHIFT
                | (command as u32 & COMMAND_MASK) << COMMAND_SHIFT,
        )
    }

    /// Operation that carries no disk or block target.
    pub fn control(command: Command) -> Self {
        Self::encode(0, 0, command)
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn disk(self) -> u32 {
        (self.0 >> DISK_SHIFT) & DISK_MASK
    }

    pub fn block(self) -> u32 {
        (self.0 >> BLOCK_SHIFT) & BLOCK_MASK
    }

    /// Raw value of the command field.
    pub fn command_bits(self) -> u8 {
        ((self.0 >> COMMAND_SHIFT) & COMMAND_MASK) as u8
    }

    /// Decoded command, or `None` if the field holds an unknown selector.
    pub fn command(self) -> Option<Command> {
        Command::try_from(self.command_bits()).ok()
    }
}

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opcode")
            .field("raw", &format_args!("{:#010x}", self.0))
            .field("command", &self.command())
            .field("disk", &self.disk())
            .field("block", &self.block())
            .finish()
    }
}
