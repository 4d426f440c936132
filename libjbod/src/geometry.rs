//! Array geometry: the fixed block grid of the remote array and the mapping
//! from flat volume addresses onto it.

use crate::error::{JbodError, Result};

pub const NUM_DISKS: u32 = 16;
pub const BLOCKS_PER_DISK: u32 = 256;
pub const BLOCK_SIZE: usize = 256;
pub const DISK_SIZE: u32 = BLOCKS_PER_DISK * BLOCK_SIZE as u32;
/// Total addressable bytes of the volume.
pub const VOLUME_SIZE: u64 = NUM_DISKS as u64 * DISK_SIZE as u64;
/// Largest transfer a single read or write call accepts.
pub const MAX_IO_SIZE: usize = 1024;

pub type Block = [u8; BLOCK_SIZE];

/// A block on the array, identified by disk and block index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockAddr {
    pub disk: u32,
    pub block: u32,
}

impl BlockAddr {
    pub fn new(disk: u32, block: u32) -> Result<Self> {
        let addr = Self { disk, block };
        if addr.in_range() {
            Ok(addr)
        } else {
            Err(JbodError::BlockOutOfRange { disk, block })
        }
    }

    pub fn in_range(&self) -> bool {
        self.disk < NUM_DISKS && self.block < BLOCKS_PER_DISK
    }

    /// Decompose a linear volume address into its block and the byte offset
    /// inside that block.
    pub fn locate(addr: u32) -> (Self, usize) {
        let disk = addr / DISK_SIZE;
        let block = (addr % DISK_SIZE) / BLOCK_SIZE as u32;
        let offset = addr as usize % BLOCK_SIZE;
        (Self { disk, block }, offset)
    }
}

/// The part of a volume range that falls inside one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    pub addr: BlockAddr,
    pub offset_in_block: usize,
    pub len: usize,
}

/// Reject ranges that are too long for one call or that run past the end of
/// the volume.
pub fn check_range(addr: u32, len: usize) -> Result<()> {
    if len > MAX_IO_SIZE {
        return Err(JbodError::TransferTooLarge(len));
    }
    if addr as u64 + len as u64 > VOLUME_SIZE {
        return Err(JbodError::AddressOutOfRange { addr, len });
    }
    Ok(())
}

/// Split the volume range `[addr, addr + len)` into per-block spans, in
/// address order. Each span covers `min(remaining, BLOCK_SIZE - offset)`
/// bytes.
pub fn split_range_into_blocks(mut addr: u32, len: usize) -> Vec<BlockSpan> {
    let mut remaining = len;
    let mut out = Vec::new();
    while remaining > 0 {
        let (block, offset_in_block) = BlockAddr::locate(addr);
        let take = remaining.min(BLOCK_SIZE - offset_in_block);
        out.push(BlockSpan {
            addr: block,
            offset_in_block,
            len: take,
        });
        addr += take as u32;
        remaining -= take;
    }
    out
}
