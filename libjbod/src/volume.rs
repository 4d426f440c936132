//! The linear volume: mount lifecycle, byte-range reads and writes spliced
//! onto the array's block grid, and the optional block cache.

use tracing::{info, instrument, warn};

use crate::cache::{BlockCache, CacheStats};
use crate::config::ClientConfig;
use crate::error::{JbodError, Result};
use crate::geometry::{BLOCK_SIZE, Block, BlockAddr, check_range, split_range_into_blocks};
use crate::net::client::{JbodClient, Transport};
use crate::opcode::{Command, Opcode};

/// A mounted-or-not view of the whole array as one flat disk.
///
/// Owns its transport, its cache and its mount flag, so independent volumes
/// never share state.
pub struct Volume<T: Transport> {
    transport: T,
    cache: Option<BlockCache>,
    mounted: bool,
}

impl<T: Transport> Volume<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            cache: None,
            mounted: false,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn mount(&mut self) -> Result<()> {
        if self.mounted {
            return Err(JbodError::AlreadyMounted);
        }
        self.transport
            .perform_operation(Opcode::control(Command::Mount), None)?;
        self.mounted = true;
        info!("volume mounted");
        Ok(())
    }

    /// Unmount. If the server refuses, the volume stays mounted.
    pub fn unmount(&mut self) -> Result<()> {
        if !self.mounted {
            return Err(JbodError::NotMounted);
        }
        self.transport
            .perform_operation(Opcode::control(Command::Unmount), None)?;
        self.mounted = false;
        info!("volume unmounted");
        Ok(())
    }

    pub fn cache_create(&mut self, capacity: usize) -> Result<()> {
        if self.cache.is_some() {
            return Err(JbodError::CacheAlreadyCreated);
        }
        self.cache = Some(BlockCache::new(capacity)?);
        info!(capacity, "block cache created");
        Ok(())
    }

    pub fn cache_destroy(&mut self) -> Result<()> {
        match self.cache.take() {
            Some(cache) => {
                info!(stats = %cache.stats(), "block cache destroyed");
                Ok(())
            }
            None => Err(JbodError::CacheNotCreated),
        }
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub fn cache(&self) -> Option<&BlockCache> {
        self.cache.as_ref()
    }

    /// Log the cache hit rate and return the counters behind it.
    pub fn cache_report_hit_rate(&self) -> Option<CacheStats> {
        let stats = self.cache.as_ref()?.stats();
        info!(queries = stats.queries, hits = stats.hits, "{stats}");
        Some(stats)
    }

    /// Read `buf.len()` bytes starting at volume address `addr`.
    ///
    /// On a mid-range failure the call fails; bytes already copied into `buf`
    /// for earlier blocks are left there.
    #[instrument(level = "debug", skip(self, buf), fields(len = buf.len()))]
    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.check_io(addr, buf.len())?;

        let mut pos = 0;
        for span in split_range_into_blocks(addr, buf.len()) {
            let mut block = [0u8; BLOCK_SIZE];
            if !self.lookup_cached(span.addr, &mut block) {
                self.fetch_block(span.addr, &mut block)
                    .inspect_err(|e| warn!(addr, pos, error = %e, "read aborted"))?;
                self.cache_insert(span.addr, &block);
            }
            let src = &block[span.offset_in_block..span.offset_in_block + span.len];
            buf[pos..pos + span.len].copy_from_slice(src);
            pos += span.len;
        }
        Ok(pos)
    }

    /// Write `buf` starting at volume address `addr`.
    ///
    /// Every touched block is read, patched and written back whole. There is
    /// no rollback: blocks written before a failure stay written.
    #[instrument(level = "debug", skip(self, buf), fields(len = buf.len()))]
    pub fn write(&mut self, addr: u32, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.check_io(addr, buf.len())?;

        let mut pos = 0;
        for span in split_range_into_blocks(addr, buf.len()) {
            let mut block = [0u8; BLOCK_SIZE];
            let hit = self.lookup_cached(span.addr, &mut block);
            let patch = &buf[pos..pos + span.len];
            self.patch_block(span.addr, hit, &mut block, span.offset_in_block, patch)
                .inspect_err(|e| warn!(addr, pos, error = %e, "write aborted"))?;
            if hit {
                if let Some(cache) = self.cache.as_mut() {
                    cache.update(span.addr, &block);
                }
            } else {
                self.cache_insert(span.addr, &block);
            }
            pos += span.len;
        }
        Ok(pos)
    }

    fn check_io(&self, addr: u32, len: usize) -> Result<()> {
        if !self.mounted {
            return Err(JbodError::NotMounted);
        }
        check_range(addr, len)
    }

    fn lookup_cached(&mut self, addr: BlockAddr, out: &mut Block) -> bool {
        self.cache
            .as_mut()
            .is_some_and(|cache| cache.lookup(addr, out))
    }

    fn cache_insert(&mut self, addr: BlockAddr, block: &Block) {
        if let Some(cache) = self.cache.as_mut() {
            if let Err(e) = cache.insert(addr, block) {
                warn!(disk = addr.disk, block = addr.block, error = %e, "cache insert skipped");
            }
        }
    }

    fn seek(&mut self, addr: BlockAddr) -> Result<()> {
        self.transport.perform_operation(
            Opcode::encode(addr.disk, addr.block, Command::SeekToDisk),
            None,
        )?;
        self.transport.perform_operation(
            Opcode::encode(addr.disk, addr.block, Command::SeekToBlock),
            None,
        )
    }

    fn fetch_block(&mut self, addr: BlockAddr, out: &mut Block) -> Result<()> {
        self.seek(addr)?;
        self.transport.perform_operation(
            Opcode::encode(addr.disk, addr.block, Command::ReadBlock),
            Some(out),
        )
    }

    /// Read-modify-write of one block. `block` already holds the cached
    /// content when `cached` is set.
    fn patch_block(
        &mut self,
        addr: BlockAddr,
        cached: bool,
        block: &mut Block,
        offset: usize,
        patch: &[u8],
    ) -> Result<()> {
        if !cached {
            self.fetch_block(addr, block)?;
        }
        block[offset..offset + patch.len()].copy_from_slice(patch);
        // The read left the head one block further on.
        self.seek(addr)?;
        self.transport.perform_operation(
            Opcode::encode(addr.disk, addr.block, Command::WriteBlock),
            Some(block),
        )
    }
}

impl Volume<JbodClient> {
    /// Connect to the configured server and create the cache if one is
    /// configured. The volume is returned unmounted.
    pub fn open(config: &ClientConfig) -> Result<Self> {
        let mut volume = Self::new(JbodClient::new());
        volume.connect(&config.server.host, config.server.port)?;
        if let Some(cache) = &config.cache {
            volume.cache_create(cache.entries)?;
        }
        Ok(volume)
    }

    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        self.transport.connect(host, port)
    }

    pub fn disconnect(&mut self) {
        self.transport.disconnect();
    }
}
