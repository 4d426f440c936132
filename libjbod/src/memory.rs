//! In-process JBOD emulator, for local development and tests.
//!
//! It keeps the array in memory and follows the server's rules: everything
//! but mount needs a mounted array, seeks move a head, and reading or writing
//! a block moves the head to the next block.

use tracing::debug;

use crate::error::{JbodError, Result};
use crate::geometry::{BLOCK_SIZE, BLOCKS_PER_DISK, Block, BlockAddr, NUM_DISKS};
use crate::net::client::Transport;
use crate::opcode::{Command, Opcode};

/// Return code for a successful operation.
pub const RC_OK: u16 = 0;
/// Return code for a failed operation (-1 on the wire).
pub const RC_FAILED: u16 = u16::MAX;

pub struct InMemoryJbod {
    blocks: Vec<Block>,
    mounted: bool,
    head: BlockAddr,
    log: Vec<Opcode>,
    fail_at: Option<usize>,
}

impl Default for InMemoryJbod {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJbod {
    pub fn new() -> Self {
        Self {
            blocks: vec![[0u8; BLOCK_SIZE]; (NUM_DISKS * BLOCKS_PER_DISK) as usize],
            mounted: false,
            head: BlockAddr { disk: 0, block: 0 },
            log: Vec::new(),
            fail_at: None,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Block under the head.
    pub fn head(&self) -> BlockAddr {
        self.head
    }

    /// Stored content of a block, bypassing the protocol.
    pub fn block(&self, addr: BlockAddr) -> Option<&Block> {
        addr.in_range().then(|| &self.blocks[Self::slot(addr)])
    }

    /// Every operation received so far, in order.
    pub fn operations(&self) -> &[Opcode] {
        &self.log
    }

    pub fn count(&self, command: Command) -> usize {
        self.log
            .iter()
            .filter(|op| op.command() == Some(command))
            .count()
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
        self.fail_at = None;
    }

    /// Make the `n`-th operation from now (0-based) fail without effect.
    pub fn fail_after(&mut self, n: usize) {
        self.fail_at = Some(self.log.len() + n);
    }

    /// Run one operation and return its wire return code.
    pub fn execute(&mut self, op: Opcode, block: Option<&mut Block>) -> u16 {
        let seq = self.log.len();
        self.log.push(op);
        if self.fail_at == Some(seq) {
            self.fail_at = None;
            debug!(?op, "injected failure");
            return RC_FAILED;
        }
        if self.apply(op, block) {
            RC_OK
        } else {
            debug!(?op, "operation refused");
            RC_FAILED
        }
    }

    fn apply(&mut self, op: Opcode, block: Option<&mut Block>) -> bool {
        let Some(command) = op.command() else {
            return false;
        };
        match command {
            Command::Mount => !std::mem::replace(&mut self.mounted, true),
            Command::Unmount => std::mem::replace(&mut self.mounted, false),
            _ if !self.mounted => false,
            Command::SeekToDisk => {
                if op.disk() >= NUM_DISKS {
                    return false;
                }
                self.head = BlockAddr {
                    disk: op.disk(),
                    block: 0,
                };
                true
            }
            Command::SeekToBlock => {
                if op.block() >= BLOCKS_PER_DISK {
                    return false;
                }
                self.head.block = op.block();
                true
            }
            Command::ReadBlock => match block {
                Some(out) if self.head.in_range() => {
                    out.copy_from_slice(&self.blocks[Self::slot(self.head)]);
                    self.advance();
                    true
                }
                _ => false,
            },
            Command::WriteBlock => match block {
                Some(data) if self.head.in_range() => {
                    let slot = Self::slot(self.head);
                    self.blocks[slot].copy_from_slice(data);
                    self.advance();
                    true
                }
                _ => false,
            },
            Command::SignBlock => false,
        }
    }

    fn advance(&mut self) {
        self.head.block += 1;
        if self.head.block == BLOCKS_PER_DISK {
            self.head.block = 0;
            self.head.disk += 1;
        }
    }

    fn slot(addr: BlockAddr) -> usize {
        (addr.disk * BLOCKS_PER_DISK + addr.block) as usize
    }
}

impl Transport for InMemoryJbod {
    fn perform_operation(&mut self, op: Opcode, block: Option<&mut Block>) -> Result<()> {
        match self.execute(op, block) {
            RC_OK => Ok(()),
            code => Err(JbodError::Rejected {
                command: op.command(),
                code,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_mount() {
        let mut jbod = InMemoryJbod::new();
        let mut buf = [0u8; BLOCK_SIZE];
        assert_eq!(
            jbod.execute(Opcode::encode(0, 0, Command::ReadBlock), Some(&mut buf)),
            RC_FAILED
        );
        assert_eq!(jbod.execute(Opcode::control(Command::Unmount), None), RC_FAILED);
        assert_eq!(jbod.execute(Opcode::control(Command::Mount), None), RC_OK);
        assert_eq!(jbod.execute(Opcode::control(Command::Mount), None), RC_FAILED);
    }

    #[test]
    fn test_read_and_write_advance_head() {
        let mut jbod = InMemoryJbod::new();
        jbod.perform_operation(Opcode::control(Command::Mount), None)
            .unwrap();
        jbod.perform_operation(Opcode::encode(2, 0, Command::SeekToDisk), None)
            .unwrap();
        jbod.perform_operation(Opcode::encode(2, 255, Command::SeekToBlock), None)
            .unwrap();
        let mut data = [0x42u8; BLOCK_SIZE];
        jbod.perform_operation(Opcode::encode(2, 255, Command::WriteBlock), Some(&mut data))
            .unwrap();
        assert_eq!(jbod.head(), BlockAddr { disk: 3, block: 0 });
        assert_eq!(
            jbod.block(BlockAddr {
                disk: 2,
                block: 255
            }),
            Some(&[0x42u8; BLOCK_SIZE])
        );
    }

    #[test]
    fn test_injected_failure_has_no_effect() {
        let mut jbod = InMemoryJbod::new();
        jbod.fail_after(0);
        assert!(matches!(
            jbod.perform_operation(Opcode::control(Command::Mount), None),
            Err(JbodError::Rejected {
                command: Some(Command::Mount),
                code: RC_FAILED
            })
        ));
        assert!(!jbod.is_mounted());
        jbod.perform_operation(Opcode::control(Command::Mount), None)
            .unwrap();
        assert_eq!(jbod.count(Command::Mount), 2);
    }
}
