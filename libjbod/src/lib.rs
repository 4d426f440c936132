//! libjbod: a client-side block driver for a remote JBOD disk array.
//!
//! The array is reached through a small request/response protocol over TCP.
//! `Volume` presents it as one flat, byte-addressable disk: byte ranges are
//! split onto the array's fixed block grid, unaligned writes go through a
//! read-modify-write cycle, and recently used blocks are kept in an optional
//! `BlockCache`.

pub mod cache;
pub mod config;
pub mod error;
pub mod geometry;
pub mod memory;
pub mod net;
pub mod opcode;
pub mod volume;

pub use cache::{BlockCache, CacheStats};
pub use config::{ClientConfig, load_config};
pub use error::{ErrorKind, JbodError, Result};
pub use geometry::{BLOCK_SIZE, Block, BlockAddr};
pub use memory::InMemoryJbod;
pub use net::client::{JbodClient, Transport};
pub use opcode::{Command, Opcode};
pub use volume::Volume;
